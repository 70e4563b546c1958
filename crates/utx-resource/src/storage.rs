use crate::config::PeriodConfig;
use crate::types::{
    DatasetPayload, DatasetRecord, OracleScore, PayBalance, PayKind, RoundState, Submission,
    UsageHistoryEntry,
};
use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use utx_types::{AccountName, Checksum256};

/// Keyed-table persistence for the resource engine.
///
/// A transaction covers every table; `rollback_transaction` restores the
/// state captured by `begin_transaction`.
#[async_trait]
pub trait ResourceStorage: Send + Sync {
    async fn get_config(&self) -> Result<Option<PeriodConfig>>;
    async fn put_config(&self, config: PeriodConfig) -> Result<()>;

    async fn get_round(&self) -> Result<RoundState>;
    async fn put_round(&self, round: RoundState) -> Result<()>;

    async fn get_submission(&self, oracle: &AccountName) -> Result<Option<Submission>>;
    async fn put_submission(&self, submission: Submission) -> Result<()>;
    async fn clear_submissions(&self) -> Result<()>;

    /// Secondary-index lookup by content hash.
    async fn find_dataset(&self, hash: &Checksum256) -> Result<Option<DatasetRecord>>;
    /// Insert unless a record with this hash exists; returns the record id.
    async fn insert_dataset(&self, hash: Checksum256, payload: DatasetPayload) -> Result<u64>;
    async fn clear_datasets(&self) -> Result<()>;

    async fn append_history(&self, entry: UsageHistoryEntry) -> Result<()>;
    /// Up to `limit` most recent entries, oldest first.
    async fn recent_history(&self, limit: usize) -> Result<Vec<UsageHistoryEntry>>;
    async fn history_len(&self) -> Result<usize>;
    async fn clear_history(&self) -> Result<()>;

    async fn get_balance(&self, kind: PayKind, account: &AccountName) -> Result<Option<PayBalance>>;
    async fn put_balance(&self, kind: PayKind, balance: PayBalance) -> Result<()>;
    async fn remove_balance(&self, kind: PayKind, account: &AccountName) -> Result<()>;
    async fn list_balances(&self, kind: PayKind) -> Result<Vec<PayBalance>>;
    async fn clear_balances(&self) -> Result<()>;

    async fn get_score(&self, oracle: &AccountName) -> Result<Option<OracleScore>>;
    async fn put_score(&self, oracle: &AccountName, score: OracleScore) -> Result<()>;
    async fn list_scores(&self) -> Result<Vec<(AccountName, OracleScore)>>;
    async fn clear_scores(&self) -> Result<()>;

    async fn begin_transaction(&self) -> Result<()>;
    async fn commit_transaction(&self) -> Result<()>;
    async fn rollback_transaction(&self) -> Result<()>;
}

#[derive(Debug, Clone, Default)]
struct Tables {
    config: Option<PeriodConfig>,
    round: RoundState,
    submissions: BTreeMap<AccountName, Submission>,
    datasets: BTreeMap<u64, DatasetRecord>,
    dataset_hash_index: HashMap<Checksum256, u64>,
    next_dataset_id: u64,
    history: Vec<UsageHistoryEntry>,
    balances: BTreeMap<(PayKind, AccountName), PayBalance>,
    scores: BTreeMap<AccountName, OracleScore>,
}

pub struct MemoryResourceStorage {
    tables: Arc<RwLock<Tables>>,
    transaction_backup: Arc<RwLock<Option<Tables>>>,
}

impl Default for MemoryResourceStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryResourceStorage {
    pub fn new() -> Self {
        Self {
            tables: Arc::new(RwLock::new(Tables::default())),
            transaction_backup: Arc::new(RwLock::new(None)),
        }
    }
}

#[async_trait]
impl ResourceStorage for MemoryResourceStorage {
    async fn get_config(&self) -> Result<Option<PeriodConfig>> {
        Ok(self.tables.read().await.config.clone())
    }

    async fn put_config(&self, config: PeriodConfig) -> Result<()> {
        self.tables.write().await.config = Some(config);
        Ok(())
    }

    async fn get_round(&self) -> Result<RoundState> {
        Ok(self.tables.read().await.round.clone())
    }

    async fn put_round(&self, round: RoundState) -> Result<()> {
        self.tables.write().await.round = round;
        Ok(())
    }

    async fn get_submission(&self, oracle: &AccountName) -> Result<Option<Submission>> {
        Ok(self.tables.read().await.submissions.get(oracle).cloned())
    }

    async fn put_submission(&self, submission: Submission) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables
            .submissions
            .insert(submission.oracle_id.clone(), submission);
        Ok(())
    }

    async fn clear_submissions(&self) -> Result<()> {
        self.tables.write().await.submissions.clear();
        Ok(())
    }

    async fn find_dataset(&self, hash: &Checksum256) -> Result<Option<DatasetRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .dataset_hash_index
            .get(hash)
            .and_then(|id| tables.datasets.get(id))
            .cloned())
    }

    async fn insert_dataset(&self, hash: Checksum256, payload: DatasetPayload) -> Result<u64> {
        let mut tables = self.tables.write().await;
        if let Some(&id) = tables.dataset_hash_index.get(&hash) {
            match tables.datasets.get(&id) {
                Some(existing) if existing.payload == payload => return Ok(id),
                _ => bail!("Dataset {} already stored with a different payload", hash),
            }
        }
        let id = tables.next_dataset_id;
        tables.next_dataset_id += 1;
        tables.dataset_hash_index.insert(hash, id);
        tables.datasets.insert(id, DatasetRecord { id, hash, payload });
        debug!(dataset_id = id, hash = %hash, storage_type = "memory", "💾 Dataset stored");
        Ok(id)
    }

    async fn clear_datasets(&self) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.datasets.clear();
        tables.dataset_hash_index.clear();
        Ok(())
    }

    async fn append_history(&self, entry: UsageHistoryEntry) -> Result<()> {
        let mut tables = self.tables.write().await;
        if let Some(last) = tables.history.last() {
            if entry.day != last.day + 1 {
                bail!(
                    "History day must advance by one: last {}, new {}",
                    last.day,
                    entry.day
                );
            }
        }
        tables.history.push(entry);
        Ok(())
    }

    async fn recent_history(&self, limit: usize) -> Result<Vec<UsageHistoryEntry>> {
        let tables = self.tables.read().await;
        let start = tables.history.len().saturating_sub(limit);
        Ok(tables.history[start..].to_vec())
    }

    async fn history_len(&self) -> Result<usize> {
        Ok(self.tables.read().await.history.len())
    }

    async fn clear_history(&self) -> Result<()> {
        self.tables.write().await.history.clear();
        Ok(())
    }

    async fn get_balance(&self, kind: PayKind, account: &AccountName) -> Result<Option<PayBalance>> {
        let tables = self.tables.read().await;
        Ok(tables.balances.get(&(kind, account.clone())).cloned())
    }

    async fn put_balance(&self, kind: PayKind, balance: PayBalance) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables
            .balances
            .insert((kind, balance.account.clone()), balance);
        Ok(())
    }

    async fn remove_balance(&self, kind: PayKind, account: &AccountName) -> Result<()> {
        self.tables
            .write()
            .await
            .balances
            .remove(&(kind, account.clone()));
        Ok(())
    }

    async fn list_balances(&self, kind: PayKind) -> Result<Vec<PayBalance>> {
        let tables = self.tables.read().await;
        Ok(tables
            .balances
            .iter()
            .filter(|((k, _), _)| *k == kind)
            .map(|(_, b)| b.clone())
            .collect())
    }

    async fn clear_balances(&self) -> Result<()> {
        self.tables.write().await.balances.clear();
        Ok(())
    }

    async fn get_score(&self, oracle: &AccountName) -> Result<Option<OracleScore>> {
        Ok(self.tables.read().await.scores.get(oracle).cloned())
    }

    async fn put_score(&self, oracle: &AccountName, score: OracleScore) -> Result<()> {
        self.tables.write().await.scores.insert(oracle.clone(), score);
        Ok(())
    }

    async fn list_scores(&self) -> Result<Vec<(AccountName, OracleScore)>> {
        let tables = self.tables.read().await;
        Ok(tables
            .scores
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    async fn clear_scores(&self) -> Result<()> {
        self.tables.write().await.scores.clear();
        Ok(())
    }

    async fn begin_transaction(&self) -> Result<()> {
        let tables = self.tables.read().await;
        let mut backup = self.transaction_backup.write().await;
        if backup.is_some() {
            bail!("Transaction already in progress");
        }
        *backup = Some(tables.clone());
        debug!(
            submissions = tables.submissions.len(),
            datasets = tables.datasets.len(),
            history = tables.history.len(),
            storage_type = "memory",
            "📝 Transaction began (snapshot created)"
        );
        Ok(())
    }

    async fn commit_transaction(&self) -> Result<()> {
        if self.transaction_backup.write().await.take().is_some() {
            debug!(storage_type = "memory", "✅ Transaction committed (snapshot discarded)");
        }
        Ok(())
    }

    async fn rollback_transaction(&self) -> Result<()> {
        let snapshot = self.transaction_backup.write().await.take();
        if let Some(snapshot) = snapshot {
            *self.tables.write().await = snapshot;
            info!(storage_type = "memory", "❌ Transaction rolled back (snapshot restored)");
        }
        Ok(())
    }
}
