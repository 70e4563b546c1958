use crate::types::{TokenAmount, TransferEvent, TransferKind};
use anyhow::{bail, Result};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;
use utx_types::AccountName;

const MAX_HISTORY: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupplyMetrics {
    pub total_supply: TokenAmount,
    pub max_supply: TokenAmount,
    pub genesis_amount: TokenAmount,
    pub issued_amount: TokenAmount,
}

pub struct TokenSupply {
    metrics: Arc<RwLock<SupplyMetrics>>,
    history: Arc<RwLock<Vec<TransferEvent>>>,
}

impl Default for TokenSupply {
    fn default() -> Self {
        Self::new(TokenAmount::DEFAULT_MAX_SUPPLY)
    }
}

impl TokenSupply {
    pub fn new(max_supply: TokenAmount) -> Self {
        Self {
            metrics: Arc::new(RwLock::new(SupplyMetrics {
                total_supply: TokenAmount::ZERO,
                max_supply,
                genesis_amount: TokenAmount::ZERO,
                issued_amount: TokenAmount::ZERO,
            })),
            history: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub async fn mint_genesis(&self, to: &AccountName, amount: TokenAmount) -> Result<()> {
        let mut metrics = self.metrics.write().await;

        if metrics.total_supply != TokenAmount::ZERO {
            bail!("Genesis already minted");
        }
        if amount > metrics.max_supply {
            bail!(
                "Genesis amount {} exceeds max supply {}",
                amount,
                metrics.max_supply
            );
        }

        metrics.total_supply = amount;
        metrics.genesis_amount = amount;
        drop(metrics);

        self.push_event(TransferKind::Issue, to, amount, "genesis").await;
        info!(amount = amount.to_utx(), "🌱 Genesis mint completed");
        Ok(())
    }

    /// Increase supply by `amount`, refusing to cross the max supply.
    pub async fn issue(&self, to: &AccountName, amount: TokenAmount, memo: &str) -> Result<()> {
        let mut metrics = self.metrics.write().await;

        let new_supply = metrics
            .total_supply
            .checked_add(amount)
            .ok_or_else(|| anyhow::anyhow!("Supply overflow"))?;

        if new_supply > metrics.max_supply {
            bail!(
                "Cannot issue {}: would exceed max supply of {}",
                amount,
                metrics.max_supply
            );
        }

        metrics.total_supply = new_supply;
        metrics.issued_amount = metrics.issued_amount.saturating_add(amount);
        drop(metrics);

        self.push_event(TransferKind::Issue, to, amount, memo).await;
        info!(
            amount = amount.to_utx(),
            total_supply = new_supply.to_utx(),
            memo,
            "🪙 Tokens issued"
        );
        Ok(())
    }

    async fn push_event(&self, kind: TransferKind, to: &AccountName, amount: TokenAmount, memo: &str) {
        let mut history = self.history.write().await;
        history.push(TransferEvent {
            kind,
            to: to.clone(),
            amount,
            timestamp: chrono::Utc::now().timestamp(),
            memo: memo.to_string(),
        });

        if history.len() > MAX_HISTORY {
            history.drain(0..1000);
        }
    }

    pub async fn get_total_supply(&self) -> TokenAmount {
        self.metrics.read().await.total_supply
    }

    pub async fn get_max_supply(&self) -> TokenAmount {
        self.metrics.read().await.max_supply
    }

    pub async fn get_metrics(&self) -> SupplyMetrics {
        self.metrics.read().await.clone()
    }

    pub async fn get_history(&self, limit: usize) -> Vec<TransferEvent> {
        let history = self.history.read().await;
        let start = history.len().saturating_sub(limit);
        history[start..].to_vec()
    }

    pub async fn can_issue(&self, amount: TokenAmount) -> bool {
        let metrics = self.metrics.read().await;
        metrics
            .total_supply
            .checked_add(amount)
            .map_or(false, |s| s <= metrics.max_supply)
    }

    pub async fn remaining_issuable(&self) -> TokenAmount {
        let metrics = self.metrics.read().await;
        metrics.max_supply.saturating_sub(metrics.total_supply)
    }
}
