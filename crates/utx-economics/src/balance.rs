use crate::storage::{EconomicsStorage, TransactionRecord};
use crate::types::TokenAmount;
use anyhow::{bail, Result};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use utx_types::AccountName;

pub struct BalanceManager {
    storage: Arc<dyn EconomicsStorage>,
    // storage holds one snapshot at a time, so writers take turns
    write_lock: Mutex<()>,
}

impl BalanceManager {
    pub fn new(storage: Arc<dyn EconomicsStorage>) -> Self {
        Self {
            storage,
            write_lock: Mutex::new(()),
        }
    }

    pub async fn get_balance(&self, account: &AccountName) -> Result<TokenAmount> {
        self.storage.get_balance(account).await
    }

    pub async fn credit(&self, account: &AccountName, amount: TokenAmount) -> Result<()> {
        if amount.is_zero() {
            return Ok(());
        }
        let _guard = self.write_lock.lock().await;

        let current = self.storage.get_balance(account).await?;
        let new_balance = current
            .checked_add(amount)
            .ok_or_else(|| anyhow::anyhow!("Balance overflow for {}", account))?;

        self.storage.set_balance(account, new_balance).await?;

        info!(
            account = %account,
            amount = amount.to_utx(),
            balance_before = current.to_utx(),
            balance_after = new_balance.to_utx(),
            "💰 Balance credited"
        );
        Ok(())
    }

    pub async fn debit(&self, account: &AccountName, amount: TokenAmount) -> Result<()> {
        if amount.is_zero() {
            return Ok(());
        }
        let _guard = self.write_lock.lock().await;

        let current = self.storage.get_balance(account).await?;
        let new_balance = current.checked_sub(amount).ok_or_else(|| {
            anyhow::anyhow!(
                "Insufficient balance for {}: has {}, needs {}",
                account,
                current,
                amount
            )
        })?;

        self.storage.set_balance(account, new_balance).await?;

        info!(
            account = %account,
            amount = amount.to_utx(),
            balance_before = current.to_utx(),
            balance_after = new_balance.to_utx(),
            "💸 Balance debited"
        );
        Ok(())
    }

    /// Move `amount` between accounts atomically; returns the transaction hash.
    pub async fn transfer(
        &self,
        from: &AccountName,
        to: &AccountName,
        amount: TokenAmount,
        memo: &str,
    ) -> Result<String> {
        if amount.is_zero() {
            bail!("Transfer amount must be positive");
        }
        if from == to {
            bail!("Cannot transfer to self");
        }
        let _guard = self.write_lock.lock().await;

        debug!(
            from = %from,
            to = %to,
            amount = amount.to_utx(),
            "📝 Beginning transfer transaction"
        );
        self.storage.begin_transaction().await?;

        match self.transfer_internal(from, to, amount, memo).await {
            Ok(tx_hash) => {
                self.storage.commit_transaction().await?;

                let record = TransactionRecord {
                    from: from.clone(),
                    to: to.clone(),
                    amount,
                    memo: memo.to_string(),
                    timestamp: Utc::now(),
                    tx_hash: tx_hash.clone(),
                };
                if let Err(e) = self.storage.record_transaction(record).await {
                    debug!(tx_hash = %tx_hash, error = %e, "Failed to record transaction");
                }

                info!(
                    from = %from,
                    to = %to,
                    amount = amount.to_utx(),
                    memo,
                    tx_hash = %tx_hash,
                    "✅ Transfer committed"
                );
                Ok(tx_hash)
            }
            Err(e) => {
                warn!(
                    from = %from,
                    to = %to,
                    amount = amount.to_utx(),
                    error = %e,
                    "❌ Transfer rolled back"
                );
                self.storage.rollback_transaction().await?;
                Err(e)
            }
        }
    }

    async fn transfer_internal(
        &self,
        from: &AccountName,
        to: &AccountName,
        amount: TokenAmount,
        memo: &str,
    ) -> Result<String> {
        let from_balance = self.storage.get_balance(from).await?;
        if from_balance < amount {
            bail!(
                "Insufficient balance: {} has {}, needs {}",
                from,
                from_balance,
                amount
            );
        }
        let to_balance = self.storage.get_balance(to).await?;

        let new_from_balance = from_balance.saturating_sub(amount);
        let new_to_balance = to_balance
            .checked_add(amount)
            .ok_or_else(|| anyhow::anyhow!("Balance overflow for recipient"))?;

        self.storage.set_balance(from, new_from_balance).await?;
        self.storage.set_balance(to, new_to_balance).await?;

        let now = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let mut hasher = blake3::Hasher::new();
        hasher.update(from.as_str().as_bytes());
        hasher.update(to.as_str().as_bytes());
        hasher.update(&amount.to_base_units().to_le_bytes());
        hasher.update(memo.as_bytes());
        hasher.update(&now.to_le_bytes());
        Ok(hex::encode(hasher.finalize().as_bytes()))
    }

    pub async fn get_all_accounts(&self) -> Result<Vec<(AccountName, TokenAmount)>> {
        let mut result = Vec::new();
        for account in self.storage.get_all_accounts().await? {
            let balance = self.storage.get_balance(&account).await?;
            result.push((account, balance));
        }
        Ok(result)
    }

    pub async fn get_transaction_history(&self, account: &AccountName) -> Result<Vec<TransactionRecord>> {
        self.storage.get_transaction_history(account).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn name(s: &str) -> AccountName {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_basic_operations() {
        let manager = BalanceManager::new(Arc::new(MemoryStorage::new()));
        let alice = name("alice");
        let bob = name("bob");

        manager.credit(&alice, TokenAmount::from_whole(100)).await.unwrap();
        assert_eq!(manager.get_balance(&alice).await.unwrap(), TokenAmount::from_whole(100));

        let tx_hash = manager
            .transfer(&alice, &bob, TokenAmount::from_whole(30), "rent")
            .await
            .unwrap();
        assert_eq!(tx_hash.len(), 64);
        assert_eq!(manager.get_balance(&alice).await.unwrap(), TokenAmount::from_whole(70));
        assert_eq!(manager.get_balance(&bob).await.unwrap(), TokenAmount::from_whole(30));

        manager.debit(&alice, TokenAmount::from_whole(20)).await.unwrap();
        assert_eq!(manager.get_balance(&alice).await.unwrap(), TokenAmount::from_whole(50));

        let history = manager.get_transaction_history(&bob).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].memo, "rent");
    }

    #[tokio::test]
    async fn test_insufficient_balance() {
        let manager = BalanceManager::new(Arc::new(MemoryStorage::new()));
        let alice = name("alice");
        let bob = name("bob");

        manager.credit(&alice, TokenAmount::from_whole(50)).await.unwrap();
        assert!(manager
            .transfer(&alice, &bob, TokenAmount::from_whole(100), "")
            .await
            .is_err());
        assert!(manager.debit(&bob, TokenAmount::from_whole(1)).await.is_err());

        assert_eq!(manager.get_balance(&alice).await.unwrap(), TokenAmount::from_whole(50));
        assert_eq!(manager.get_balance(&bob).await.unwrap(), TokenAmount::ZERO);
    }

    #[tokio::test]
    async fn test_transfer_rejects_self_and_zero() {
        let manager = BalanceManager::new(Arc::new(MemoryStorage::new()));
        let alice = name("alice");
        manager.credit(&alice, TokenAmount::from_whole(5)).await.unwrap();

        assert!(manager
            .transfer(&alice, &alice, TokenAmount::from_whole(1), "")
            .await
            .is_err());
        assert!(manager
            .transfer(&alice, &name("bob"), TokenAmount::ZERO, "")
            .await
            .is_err());
    }
}
