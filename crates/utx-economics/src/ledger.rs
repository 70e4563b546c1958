use crate::balance::BalanceManager;
use crate::storage::{EconomicsStorage, MemoryStorage};
use crate::supply::TokenSupply;
use crate::types::TokenAmount;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;
use utx_types::AccountName;

/// Token primitives consumed by the resource engine.
#[async_trait]
pub trait TokenLedger: Send + Sync {
    /// The account newly issued tokens are credited to.
    fn issuer(&self) -> &AccountName;

    async fn issue(&self, amount: TokenAmount, memo: &str) -> Result<()>;
    async fn transfer(
        &self,
        from: &AccountName,
        to: &AccountName,
        amount: TokenAmount,
        memo: &str,
    ) -> Result<()>;

    async fn supply(&self) -> Result<TokenAmount>;
    async fn max_supply(&self) -> Result<TokenAmount>;
    async fn balance(&self, account: &AccountName) -> Result<TokenAmount>;
}

/// In-process token module: supply tracking plus balances.
pub struct TokenBank {
    issuer: AccountName,
    pub supply: Arc<TokenSupply>,
    pub balances: Arc<BalanceManager>,
}

impl TokenBank {
    pub fn new(issuer: AccountName, max_supply: TokenAmount, storage: Arc<dyn EconomicsStorage>) -> Self {
        Self {
            issuer,
            supply: Arc::new(TokenSupply::new(max_supply)),
            balances: Arc::new(BalanceManager::new(storage)),
        }
    }

    pub fn in_memory(issuer: AccountName, max_supply: TokenAmount) -> Self {
        Self::new(issuer, max_supply, Arc::new(MemoryStorage::new()))
    }

    /// Mint the initial supply into the issuer account.
    pub async fn initialize_genesis(&self, amount: TokenAmount) -> Result<()> {
        self.supply.mint_genesis(&self.issuer, amount).await?;
        self.balances.credit(&self.issuer, amount).await?;
        info!(
            issuer = %self.issuer,
            amount = amount.to_utx(),
            "🏦 Token bank initialized"
        );
        Ok(())
    }
}

#[async_trait]
impl TokenLedger for TokenBank {
    fn issuer(&self) -> &AccountName {
        &self.issuer
    }

    async fn issue(&self, amount: TokenAmount, memo: &str) -> Result<()> {
        if amount.is_zero() {
            return Ok(());
        }
        self.supply.issue(&self.issuer, amount, memo).await?;
        self.balances.credit(&self.issuer, amount).await
    }

    async fn transfer(
        &self,
        from: &AccountName,
        to: &AccountName,
        amount: TokenAmount,
        memo: &str,
    ) -> Result<()> {
        self.balances.transfer(from, to, amount, memo).await.map(|_| ())
    }

    async fn supply(&self) -> Result<TokenAmount> {
        Ok(self.supply.get_total_supply().await)
    }

    async fn max_supply(&self) -> Result<TokenAmount> {
        Ok(self.supply.get_max_supply().await)
    }

    async fn balance(&self, account: &AccountName) -> Result<TokenAmount> {
        self.balances.get_balance(account).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> AccountName {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_issue_credits_issuer() {
        let bank = TokenBank::in_memory(name("utxio"), TokenAmount::from_whole(1_000));
        bank.initialize_genesis(TokenAmount::from_whole(100)).await.unwrap();

        bank.issue(TokenAmount::from_whole(10), "inflation").await.unwrap();
        assert_eq!(bank.supply().await.unwrap(), TokenAmount::from_whole(110));
        assert_eq!(
            bank.balance(&name("utxio")).await.unwrap(),
            TokenAmount::from_whole(110)
        );
    }

    #[tokio::test]
    async fn test_issue_beyond_max_fails_without_credit() {
        let bank = TokenBank::in_memory(name("utxio"), TokenAmount::from_whole(100));
        bank.initialize_genesis(TokenAmount::from_whole(100)).await.unwrap();

        assert!(bank.issue(TokenAmount::from_base_units(1), "x").await.is_err());
        assert_eq!(
            bank.balance(&name("utxio")).await.unwrap(),
            TokenAmount::from_whole(100)
        );
    }
}
