use crate::error::{ResourceError, Result};
use crate::oracle::OracleRegistry;
use crate::storage::ResourceStorage;
use crate::types::{
    AllocationSummary, ClaimReceipt, IssuanceReceipt, PayBalance, PayKind, UsageEntry,
    UsageHistoryEntry,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info};
use utx_economics::{TokenAmount, TokenLedger};
use utx_types::AccountName;

/// A token-module call, deferred until every state change of an operation
/// has been validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenAction {
    Issue {
        amount: TokenAmount,
        memo: String,
    },
    Transfer {
        from: AccountName,
        to: AccountName,
        amount: TokenAmount,
        memo: String,
    },
}

/// Token amounts cleared for issuance in one period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IssuancePlan {
    pub operator: TokenAmount,
    pub usage: TokenAmount,
}

impl IssuancePlan {
    pub fn total(&self) -> TokenAmount {
        self.operator.saturating_add(self.usage)
    }
}

/// Apply the per-period ceiling and the supply headroom to the model amounts.
pub fn plan_issuance(
    operator: TokenAmount,
    usage: TokenAmount,
    supply: TokenAmount,
    max_supply: TokenAmount,
    ceiling: TokenAmount,
) -> Result<IssuancePlan> {
    let total = operator
        .checked_add(usage)
        .ok_or(ResourceError::Arithmetic("issuance total overflow"))?;
    if total > ceiling {
        return Err(ResourceError::IssuanceCapExceeded {
            requested: total.to_base_units(),
            ceiling: ceiling.to_base_units(),
        });
    }
    if supply >= max_supply {
        return Err(ResourceError::SupplyCapExceeded {
            supply: supply.to_base_units(),
            max_supply: max_supply.to_base_units(),
        });
    }

    let headroom = max_supply.saturating_sub(supply);
    if total <= headroom {
        return Ok(IssuancePlan { operator, usage });
    }
    Ok(IssuancePlan {
        operator: proportion(operator, headroom.to_base_units(), total.to_base_units()),
        usage: proportion(usage, headroom.to_base_units(), total.to_base_units()),
    })
}

/// `amount × part / whole`, truncated. Zero when `whole` is zero.
pub fn proportion(amount: TokenAmount, part: u64, whole: u64) -> TokenAmount {
    if whole == 0 {
        return TokenAmount::ZERO;
    }
    let scaled = u128::from(amount.to_base_units()) * u128::from(part) / u128::from(whole);
    TokenAmount::from_base_units(u64::try_from(scaled).unwrap_or(u64::MAX))
}

/// Even share of operator pay; the remainder stays in the pool.
pub fn split_even(total: TokenAmount, recipients: usize) -> TokenAmount {
    match u64::try_from(recipients) {
        Ok(n) if n > 0 => TokenAmount::from_base_units(total.to_base_units() / n),
        _ => TokenAmount::ZERO,
    }
}

/// Turns period outputs into pending balances and token movements.
pub struct RewardDistributor {
    storage: Arc<dyn ResourceStorage>,
    token: Arc<dyn TokenLedger>,
    oracles: Arc<OracleRegistry>,
    operator_pool: AccountName,
    usage_pool: AccountName,
    max_period_issuance: TokenAmount,
}

impl RewardDistributor {
    pub fn new(
        storage: Arc<dyn ResourceStorage>,
        token: Arc<dyn TokenLedger>,
        oracles: Arc<OracleRegistry>,
        operator_pool: AccountName,
        usage_pool: AccountName,
        max_period_issuance: TokenAmount,
    ) -> Self {
        Self {
            storage,
            token,
            oracles,
            operator_pool,
            usage_pool,
            max_period_issuance,
        }
    }

    /// Cap the model amounts, credit operators and fill in the issued fields
    /// of `entry`. Returns the token actions that fund both pools.
    pub async fn issue_period(
        &self,
        entry: &mut UsageHistoryEntry,
        now: DateTime<Utc>,
    ) -> Result<(IssuanceReceipt, Vec<TokenAction>)> {
        let supply = self.token.supply().await.map_err(ResourceError::token)?;
        let max_supply = self.token.max_supply().await.map_err(ResourceError::token)?;
        let plan = plan_issuance(
            entry.operator_tokens,
            entry.usage_tokens,
            supply,
            max_supply,
            self.max_period_issuance,
        )?;

        let operators = self.oracles.active_operators().await?;
        if operators.is_empty() {
            return Err(ResourceError::NoActiveOperators);
        }
        let expected = self.oracles.last_schedule_size().await?;
        if operators.len() != expected {
            return Err(ResourceError::OperatorCountMismatch {
                active: operators.len(),
                expected,
            });
        }

        let per_operator = split_even(plan.operator, operators.len());
        if !per_operator.is_zero() {
            for operator in &operators {
                self.credit(PayKind::Operator, operator, per_operator, now)
                    .await?;
            }
        }

        entry.issued_operator_tokens = plan.operator;
        entry.issued_usage_tokens = plan.usage;
        entry.issued = true;

        let issuer = self.token.issuer().clone();
        let actions = vec![
            TokenAction::Issue {
                amount: plan.total(),
                memo: format!("resource inflation day {}", entry.day),
            },
            TokenAction::Transfer {
                from: issuer.clone(),
                to: self.operator_pool.clone(),
                amount: plan.operator,
                memo: "fund operator pay".to_string(),
            },
            TokenAction::Transfer {
                from: issuer,
                to: self.usage_pool.clone(),
                amount: plan.usage,
                memo: "fund usage pay".to_string(),
            },
        ];

        info!(
            day = entry.day,
            operator_tokens = plan.operator.to_utx(),
            usage_tokens = plan.usage.to_utx(),
            per_operator = per_operator.to_utx(),
            operators = operators.len(),
            "💸 Period inflation issued"
        );

        let receipt = IssuanceReceipt {
            day: entry.day,
            operator_tokens: plan.operator,
            usage_tokens: plan.usage,
            per_operator,
            operators_paid: operators.len(),
            issued: true,
        };
        Ok((receipt, actions))
    }

    /// Credit each account its CPU share of the period's issued usage pay.
    pub async fn allocate_batch(
        &self,
        entries: &[UsageEntry],
        period: &UsageHistoryEntry,
        now: DateTime<Utc>,
    ) -> Result<AllocationSummary> {
        let mut summary = AllocationSummary {
            accounts: 0,
            credited: TokenAmount::ZERO,
        };
        for entry in entries {
            let amount = proportion(
                period.issued_usage_tokens,
                entry.cpu_us,
                period.total_cpu_us,
            );
            if amount.is_zero() {
                continue;
            }
            self.credit(PayKind::Usage, &entry.account, amount, now)
                .await?;
            summary.accounts += 1;
            summary.credited = summary.credited.saturating_add(amount);
        }
        debug!(
            accounts = summary.accounts,
            credited = summary.credited.to_utx(),
            "Usage pay allocated"
        );
        Ok(summary)
    }

    /// Remove both pending balances of `account` and return the payouts.
    pub async fn claim(&self, account: &AccountName) -> Result<(ClaimReceipt, Vec<TokenAction>)> {
        let usage = self.balance(PayKind::Usage, account).await?;
        let operator = self.balance(PayKind::Operator, account).await?;
        if usage.is_zero() && operator.is_zero() {
            return Err(ResourceError::NothingToClaim(account.clone()));
        }

        let mut actions = Vec::with_capacity(2);
        for (kind, amount, pool) in [
            (PayKind::Usage, usage, &self.usage_pool),
            (PayKind::Operator, operator, &self.operator_pool),
        ] {
            if amount.is_zero() {
                continue;
            }
            self.storage
                .remove_balance(kind, account)
                .await
                .map_err(ResourceError::storage)?;
            actions.push(TokenAction::Transfer {
                from: pool.clone(),
                to: account.clone(),
                amount,
                memo: match kind {
                    PayKind::Usage => "usage pay claim".to_string(),
                    PayKind::Operator => "operator pay claim".to_string(),
                },
            });
        }

        let receipt = ClaimReceipt {
            account: account.clone(),
            usage,
            operator,
        };
        info!(
            account = %account,
            usage = usage.to_utx(),
            operator = operator.to_utx(),
            "🏧 Rewards claimed"
        );
        Ok((receipt, actions))
    }

    /// Execute deferred token actions in order. Zero amounts are skipped.
    pub async fn apply(&self, actions: Vec<TokenAction>) -> Result<()> {
        for action in actions {
            match action {
                TokenAction::Issue { amount, memo } => {
                    if amount.is_zero() {
                        continue;
                    }
                    self.token
                        .issue(amount, &memo)
                        .await
                        .map_err(ResourceError::token)?;
                }
                TokenAction::Transfer {
                    from,
                    to,
                    amount,
                    memo,
                } => {
                    if amount.is_zero() {
                        continue;
                    }
                    self.token
                        .transfer(&from, &to, amount, &memo)
                        .await
                        .map_err(ResourceError::token)?;
                }
            }
        }
        Ok(())
    }

    pub async fn balance(&self, kind: PayKind, account: &AccountName) -> Result<TokenAmount> {
        Ok(self
            .storage
            .get_balance(kind, account)
            .await
            .map_err(ResourceError::storage)?
            .map(|b| b.amount)
            .unwrap_or(TokenAmount::ZERO))
    }

    async fn credit(
        &self,
        kind: PayKind,
        account: &AccountName,
        amount: TokenAmount,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut balance = self
            .storage
            .get_balance(kind, account)
            .await
            .map_err(ResourceError::storage)?
            .unwrap_or_else(|| PayBalance {
                account: account.clone(),
                amount: TokenAmount::ZERO,
                updated: now,
            });
        balance.amount = balance
            .amount
            .checked_add(amount)
            .ok_or(ResourceError::Arithmetic("balance overflow"))?;
        balance.updated = now;
        debug!(account = %account, kind = ?kind, amount = amount.to_utx(), "💰 Pay credited");
        self.storage
            .put_balance(kind, balance)
            .await
            .map_err(ResourceError::storage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::ProducerSchedule;
    use crate::storage::MemoryResourceStorage;
    use utx_economics::TokenBank;

    fn name(s: &str) -> AccountName {
        s.parse().unwrap()
    }

    fn units(n: u64) -> TokenAmount {
        TokenAmount::from_base_units(n)
    }

    fn now() -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_600_000_000, 0).unwrap()
    }

    async fn setup(operators: &[&str]) -> (RewardDistributor, Arc<TokenBank>, Arc<ProducerSchedule>) {
        let schedule = Arc::new(ProducerSchedule::new(21));
        for (i, op) in operators.iter().enumerate() {
            schedule.register(name(op), 100 - i as u64).await;
        }
        schedule.elect().await;
        let bank = Arc::new(TokenBank::in_memory(name("utxio"), TokenAmount::from_whole(1_000_000)));
        bank.initialize_genesis(TokenAmount::from_whole(1_000)).await.unwrap();
        let distributor = RewardDistributor::new(
            Arc::new(MemoryResourceStorage::new()),
            bank.clone(),
            Arc::new(OracleRegistry::new(schedule.clone(), 21)),
            name("utxio.bpay"),
            name("utxio.upay"),
            TokenAmount::from_whole(1_000),
        );
        (distributor, bank, schedule)
    }

    #[test]
    fn test_plan_within_limits() {
        let plan = plan_issuance(units(30), units(70), units(1_000), units(10_000), units(500)).unwrap();
        assert_eq!(plan, IssuancePlan { operator: units(30), usage: units(70) });
    }

    #[test]
    fn test_plan_ceiling_and_supply_cap() {
        assert!(matches!(
            plan_issuance(units(300), units(300), units(0), units(10_000), units(500)),
            Err(ResourceError::IssuanceCapExceeded { requested: 600, ceiling: 500 })
        ));
        assert!(matches!(
            plan_issuance(units(1), units(1), units(10_000), units(10_000), units(500)),
            Err(ResourceError::SupplyCapExceeded { .. })
        ));
    }

    #[test]
    fn test_plan_scaled_to_headroom() {
        let plan = plan_issuance(units(30), units(70), units(9_950), units(10_000), units(500)).unwrap();
        assert_eq!(plan.operator, units(15));
        assert_eq!(plan.usage, units(35));
        assert!(plan.total() <= units(50));
    }

    #[test]
    fn test_split_and_proportion_truncate() {
        assert_eq!(split_even(units(10), 3), units(3));
        assert_eq!(split_even(units(10), 0), TokenAmount::ZERO);
        assert_eq!(proportion(units(100), 1, 3), units(33));
        assert_eq!(proportion(units(100), 1, 0), TokenAmount::ZERO);
        assert_eq!(proportion(units(u64::MAX), u64::MAX, u64::MAX), units(u64::MAX));
    }

    #[tokio::test]
    async fn test_issue_period_credits_operators() {
        let (distributor, bank, _) = setup(&["op.a", "op.b", "op.c"]).await;
        let mut entry = UsageHistoryEntry::genesis(now());
        entry.day = 1;
        entry.operator_tokens = units(100);
        entry.usage_tokens = units(200);

        let (receipt, actions) = distributor.issue_period(&mut entry, now()).await.unwrap();
        assert_eq!(receipt.per_operator, units(33));
        assert_eq!(receipt.operators_paid, 3);
        assert!(entry.issued);
        assert_eq!(entry.issued_usage_tokens, units(200));
        assert_eq!(actions.len(), 3);
        assert_eq!(
            distributor.balance(PayKind::Operator, &name("op.b")).await.unwrap(),
            units(33)
        );

        distributor.apply(actions).await.unwrap();
        assert_eq!(bank.balance(&name("utxio.bpay")).await.unwrap(), units(100));
        assert_eq!(bank.balance(&name("utxio.upay")).await.unwrap(), units(200));
    }

    #[tokio::test]
    async fn test_issue_period_operator_checks() {
        let (distributor, _, _) = setup(&[]).await;
        let mut entry = UsageHistoryEntry::genesis(now());
        assert!(matches!(
            distributor.issue_period(&mut entry, now()).await,
            Err(ResourceError::NoActiveOperators)
        ));

        let (distributor, _, schedule) = setup(&["op.a", "op.b"]).await;
        schedule.set_active(&name("op.b"), false).await.unwrap();
        assert!(matches!(
            distributor.issue_period(&mut entry, now()).await,
            Err(ResourceError::OperatorCountMismatch { active: 1, expected: 2 })
        ));
    }

    #[tokio::test]
    async fn test_allocate_and_claim() {
        let (distributor, _, _) = setup(&["op.a"]).await;
        let mut period = UsageHistoryEntry::genesis(now());
        period.total_cpu_us = 1_000;
        period.issued_usage_tokens = units(999);

        let summary = distributor
            .allocate_batch(
                &[
                    UsageEntry::new(name("alice"), 600),
                    UsageEntry::new(name("bob"), 400),
                    UsageEntry::new(name("carol"), 1),
                ],
                &period,
                now(),
            )
            .await
            .unwrap();
        assert_eq!(summary.accounts, 2);
        assert_eq!(summary.credited, units(599 + 399));

        let (receipt, actions) = distributor.claim(&name("alice")).await.unwrap();
        assert_eq!(receipt.usage, units(599));
        assert_eq!(receipt.operator, TokenAmount::ZERO);
        assert_eq!(actions.len(), 1);
        assert!(matches!(
            distributor.claim(&name("alice")).await,
            Err(ResourceError::NothingToClaim(_))
        ));
        assert!(matches!(
            distributor.claim(&name("carol")).await,
            Err(ResourceError::NothingToClaim(_))
        ));
    }
}
