use crate::error::{ResourceError, Result};
use anyhow::bail;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use utx_types::AccountName;

/// A network operator as seen by the election.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorInfo {
    pub owner: AccountName,
    /// Stake-weighted vote total.
    pub total_votes: u64,
    pub is_active: bool,
}

/// Source of operator standings, consumed by the oracle registry.
#[async_trait]
pub trait OperatorRegistry: Send + Sync {
    async fn operators(&self) -> anyhow::Result<Vec<OperatorInfo>>;
    /// Size of the most recently elected operator schedule.
    async fn last_schedule_size(&self) -> anyhow::Result<usize>;
}

/// Decides which operators may report usage and which receive operator pay.
///
/// Eligibility is the top `set_size` active operators ranked by votes
/// (ties broken by name), evaluated on every call.
pub struct OracleRegistry {
    registry: Arc<dyn OperatorRegistry>,
    set_size: usize,
}

impl OracleRegistry {
    pub fn new(registry: Arc<dyn OperatorRegistry>, set_size: usize) -> Self {
        Self { registry, set_size }
    }

    pub fn set_size(&self) -> usize {
        self.set_size
    }

    /// The current top-N active operators, highest votes first.
    pub async fn active_operators(&self) -> Result<Vec<AccountName>> {
        let mut operators: Vec<OperatorInfo> = self
            .registry
            .operators()
            .await
            .map_err(ResourceError::storage)?
            .into_iter()
            .filter(|o| o.is_active)
            .collect();
        operators.sort_by(|a, b| {
            b.total_votes
                .cmp(&a.total_votes)
                .then_with(|| a.owner.cmp(&b.owner))
        });
        Ok(operators
            .into_iter()
            .take(self.set_size)
            .map(|o| o.owner)
            .collect())
    }

    pub async fn is_eligible(&self, account: &AccountName) -> Result<bool> {
        let eligible = self.active_operators().await?.contains(account);
        debug!(account = %account, eligible, "Oracle eligibility checked");
        Ok(eligible)
    }

    pub async fn last_schedule_size(&self) -> Result<usize> {
        self.registry
            .last_schedule_size()
            .await
            .map_err(ResourceError::storage)
    }
}

/// In-memory operator registry with an explicit election step.
pub struct ProducerSchedule {
    operators: RwLock<BTreeMap<AccountName, OperatorInfo>>,
    schedule_size: RwLock<usize>,
    set_size: usize,
}

impl ProducerSchedule {
    pub fn new(set_size: usize) -> Self {
        Self {
            operators: RwLock::new(BTreeMap::new()),
            schedule_size: RwLock::new(0),
            set_size,
        }
    }

    pub async fn register(&self, owner: AccountName, total_votes: u64) {
        let mut operators = self.operators.write().await;
        info!(operator = %owner, total_votes, "🆕 Operator registered");
        operators.insert(
            owner.clone(),
            OperatorInfo {
                owner,
                total_votes,
                is_active: true,
            },
        );
    }

    pub async fn set_votes(&self, owner: &AccountName, total_votes: u64) -> anyhow::Result<()> {
        let mut operators = self.operators.write().await;
        match operators.get_mut(owner) {
            Some(info) => {
                info.total_votes = total_votes;
                Ok(())
            }
            None => bail!("Unknown operator {}", owner),
        }
    }

    pub async fn set_active(&self, owner: &AccountName, is_active: bool) -> anyhow::Result<()> {
        let mut operators = self.operators.write().await;
        match operators.get_mut(owner) {
            Some(info) => {
                info.is_active = is_active;
                info!(operator = %owner, is_active, "Operator status changed");
                Ok(())
            }
            None => bail!("Unknown operator {}", owner),
        }
    }

    /// Record the size of the schedule the current standings would elect.
    pub async fn elect(&self) -> usize {
        let active = self
            .operators
            .read()
            .await
            .values()
            .filter(|o| o.is_active)
            .count();
        let size = active.min(self.set_size);
        *self.schedule_size.write().await = size;
        info!(schedule_size = size, "🗳️ Operator schedule elected");
        size
    }
}

#[async_trait]
impl OperatorRegistry for ProducerSchedule {
    async fn operators(&self) -> anyhow::Result<Vec<OperatorInfo>> {
        Ok(self.operators.read().await.values().cloned().collect())
    }

    async fn last_schedule_size(&self) -> anyhow::Result<usize> {
        Ok(*self.schedule_size.read().await)
    }
}
