use crate::types::TokenAmount;
use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use tracing::{debug, info};
use utx_types::AccountName;

/// A committed token movement. Issuance is recorded with `from` set to the issuer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub from: AccountName,
    pub to: AccountName,
    pub amount: TokenAmount,
    pub memo: String,
    pub timestamp: DateTime<Utc>,
    pub tx_hash: String,
}

impl TransactionRecord {
    fn touches(&self, account: &AccountName) -> bool {
        &self.from == account || &self.to == account
    }
}

/// Balance persistence for the token module. A single snapshot transaction
/// may be open at a time.
#[async_trait]
pub trait EconomicsStorage: Send + Sync {
    async fn get_balance(&self, account: &AccountName) -> Result<TokenAmount>;
    /// Setting a zero balance removes the account.
    async fn set_balance(&self, account: &AccountName, balance: TokenAmount) -> Result<()>;
    /// Accounts holding a non-zero balance, sorted by name.
    async fn get_all_accounts(&self) -> Result<Vec<AccountName>>;

    async fn begin_transaction(&self) -> Result<()>;
    async fn commit_transaction(&self) -> Result<()>;
    async fn rollback_transaction(&self) -> Result<()>;

    async fn record_transaction(&self, tx: TransactionRecord) -> Result<()>;
    async fn get_transaction_history(&self, account: &AccountName) -> Result<Vec<TransactionRecord>>;
}

#[derive(Default)]
struct LedgerState {
    balances: BTreeMap<AccountName, TokenAmount>,
    snapshot: Option<BTreeMap<AccountName, TokenAmount>>,
    journal: Vec<TransactionRecord>,
}

/// Process-local token storage.
#[derive(Default)]
pub struct MemoryStorage {
    state: RwLock<LedgerState>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EconomicsStorage for MemoryStorage {
    async fn get_balance(&self, account: &AccountName) -> Result<TokenAmount> {
        let state = self.state.read().await;
        Ok(state.balances.get(account).copied().unwrap_or_default())
    }

    async fn set_balance(&self, account: &AccountName, balance: TokenAmount) -> Result<()> {
        let mut state = self.state.write().await;
        let previous = if balance.is_zero() {
            state.balances.remove(account)
        } else {
            state.balances.insert(account.clone(), balance)
        }
        .unwrap_or_default();

        if previous != balance {
            debug!(
                account = %account,
                before = previous.to_utx(),
                after = balance.to_utx(),
                "💾 Token balance written"
            );
        }
        Ok(())
    }

    async fn get_all_accounts(&self) -> Result<Vec<AccountName>> {
        let state = self.state.read().await;
        Ok(state.balances.keys().cloned().collect())
    }

    async fn begin_transaction(&self) -> Result<()> {
        let mut state = self.state.write().await;
        if state.snapshot.is_some() {
            bail!("Token storage transaction already open");
        }
        state.snapshot = Some(state.balances.clone());
        debug!(accounts = state.balances.len(), "📝 Token snapshot taken");
        Ok(())
    }

    async fn commit_transaction(&self) -> Result<()> {
        if self.state.write().await.snapshot.take().is_some() {
            debug!("✅ Token snapshot released");
        }
        Ok(())
    }

    async fn rollback_transaction(&self) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(snapshot) = state.snapshot.take() {
            let discarded = state.balances.len();
            state.balances = snapshot;
            info!(
                discarded,
                restored = state.balances.len(),
                "❌ Token balances restored from snapshot"
            );
        }
        Ok(())
    }

    async fn record_transaction(&self, tx: TransactionRecord) -> Result<()> {
        let mut state = self.state.write().await;
        debug!(
            from = %tx.from,
            to = %tx.to,
            amount = tx.amount.to_utx(),
            tx_hash = %tx.tx_hash,
            journal_len = state.journal.len() + 1,
            "📦 Token transfer journaled"
        );
        state.journal.push(tx);
        Ok(())
    }

    async fn get_transaction_history(&self, account: &AccountName) -> Result<Vec<TransactionRecord>> {
        let state = self.state.read().await;
        Ok(state
            .journal
            .iter()
            .filter(|tx| tx.touches(account))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> AccountName {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_memory_storage() {
        let storage = MemoryStorage::new();
        let alice = name("alice");

        assert_eq!(storage.get_balance(&alice).await.unwrap(), TokenAmount::ZERO);

        let amount = TokenAmount::from_whole(100);
        storage.set_balance(&alice, amount).await.unwrap();
        assert_eq!(storage.get_balance(&alice).await.unwrap(), amount);
        assert_eq!(storage.get_all_accounts().await.unwrap(), vec![alice.clone()]);

        // zero balances are pruned
        storage.set_balance(&alice, TokenAmount::ZERO).await.unwrap();
        assert!(storage.get_all_accounts().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transaction_rollback() {
        let storage = MemoryStorage::new();
        let bob = name("bob");
        let initial = TokenAmount::from_whole(100);
        storage.set_balance(&bob, initial).await.unwrap();

        storage.begin_transaction().await.unwrap();
        storage.set_balance(&bob, TokenAmount::from_whole(200)).await.unwrap();
        assert_eq!(storage.get_balance(&bob).await.unwrap(), TokenAmount::from_whole(200));
        storage.rollback_transaction().await.unwrap();

        assert_eq!(storage.get_balance(&bob).await.unwrap(), initial);
    }

    #[tokio::test]
    async fn test_nested_transaction_rejected() {
        let storage = MemoryStorage::new();
        storage.begin_transaction().await.unwrap();
        assert!(storage.begin_transaction().await.is_err());
        storage.commit_transaction().await.unwrap();
        assert!(storage.begin_transaction().await.is_ok());
    }
}
