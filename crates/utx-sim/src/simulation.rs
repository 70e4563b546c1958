//! Full in-memory run of the engine: operators, token bank, manual clock.

use crate::config::SimConfig;
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};
use utx_economics::{TokenAmount, TokenBank, TokenLedger};
use utx_resource::{
    batch_hash, period_commitment, totals_hash, Authorization, ManualClock,
    MemoryResourceStorage, OracleScore, ProducerSchedule, ResourceEngine, ResourceError,
    ResourceParams, UsageEntry,
};
use utx_types::AccountName;

#[derive(Debug, Clone, Serialize)]
pub struct OracleSummary {
    pub oracle: AccountName,
    pub points: u64,
    pub submissions: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub days_closed: u64,
    pub genesis_supply: TokenAmount,
    pub final_supply: TokenAmount,
    pub issued: TokenAmount,
    pub claimed_usage: TokenAmount,
    pub claimed_operator: TokenAmount,
    pub operator_pool: TokenAmount,
    pub usage_pool: TokenAmount,
    pub last_inflation: Decimal,
    pub oracles: Vec<OracleSummary>,
}

/// `{prefix}.{letters}` where letters spell `index` in base 26.
pub fn numbered(prefix: &str, index: usize) -> Result<AccountName> {
    let mut letters = Vec::new();
    let mut n = index;
    loop {
        letters.push((b'a' + (n % 26) as u8) as char);
        n /= 26;
        if n == 0 {
            break;
        }
        n -= 1;
    }
    let suffix: String = letters.into_iter().rev().collect();
    Ok(format!("{}.{}", prefix, suffix).parse()?)
}

/// Share of capacity for day `day`: the configured mean scaled by 0.8 to 1.2.
fn daily_amount(capacity: u64, mean: Decimal, day: u64) -> Result<u64> {
    let wobble = Decimal::new(8 + (day % 5) as i64, 1);
    (Decimal::from(capacity) * mean * wobble)
        .trunc()
        .to_u64()
        .filter(|v| *v > 0)
        .ok_or_else(|| anyhow!("daily usage out of range"))
}

/// Split `total` across accounts by weight `i + 1`; the last takes the remainder.
fn account_usage(accounts: &[AccountName], total: u64) -> Vec<UsageEntry> {
    let weights: u64 = (1..=accounts.len() as u64).sum();
    let mut remaining = total;
    let mut entries = Vec::with_capacity(accounts.len());
    for (i, account) in accounts.iter().enumerate() {
        let cpu = if i + 1 == accounts.len() {
            remaining
        } else {
            (u128::from(total) * (i as u128 + 1) / u128::from(weights)) as u64
        };
        remaining -= cpu;
        if cpu > 0 {
            entries.push(UsageEntry::new(account.clone(), cpu));
        }
    }
    entries
}

pub async fn run_simulation(config: &SimConfig) -> Result<SimulationReport> {
    config.validate()?;
    let sim = &config.simulation;
    let settings = config.resource.clone();
    let start = DateTime::<Utc>::from_timestamp(sim.start_timestamp, 0)
        .ok_or_else(|| anyhow!("invalid start timestamp"))?;

    let schedule = Arc::new(ProducerSchedule::new(settings.oracle_set_size));
    let mut oracles = Vec::with_capacity(sim.oracles);
    for i in 0..sim.oracles {
        let oracle = numbered("oracle", i)?;
        schedule.register(oracle.clone(), 1_000_000 - i as u64).await;
        oracles.push(oracle);
    }
    schedule.elect().await;
    let accounts = (0..sim.accounts)
        .map(|i| numbered("user", i))
        .collect::<Result<Vec<_>>>()?;

    let bank = Arc::new(TokenBank::in_memory(
        settings.system_account.clone(),
        TokenAmount::DEFAULT_MAX_SUPPLY,
    ));
    bank.initialize_genesis(sim.genesis_supply).await?;
    let clock = Arc::new(ManualClock::new(start));
    let engine = ResourceEngine::new(
        settings.clone(),
        Arc::new(MemoryResourceStorage::new()),
        bank.clone(),
        schedule.clone(),
        clock.clone(),
    )?;

    let system = Authorization::signed_by(settings.system_account.clone());
    engine
        .init_resource(
            &system,
            ResourceParams {
                batch_size: sim.batch_size,
                quorum_threshold: sim.threshold,
                period_start: start,
                period_seconds: sim.period_seconds,
                value_transfer_rate: sim.value_transfer_rate,
                max_pay_constant: sim.max_pay_constant,
            },
        )
        .await?;
    engine.set_active(&system, true).await?;

    let (cpu_capacity, net_capacity) = engine.capacity().await?;
    let faulty_from = sim.oracles - sim.faulty_oracles;
    let mut days_closed = 0;

    for day in 0..sim.days {
        let period_start = engine.config().await?.period_start;
        let cpu_us = daily_amount(cpu_capacity, sim.cpu_utilization, day)?;
        let net_words = daily_amount(net_capacity / 8, sim.net_utilization, day)?;
        let usage = account_usage(&accounts, cpu_us);
        let batches: Vec<Vec<UsageEntry>> = usage
            .chunks(usize::from(sim.batch_size))
            .map(|c| c.to_vec())
            .collect();

        for (i, oracle) in oracles.iter().enumerate() {
            let reported_cpu = if i >= faulty_from { cpu_us + 1 } else { cpu_us };
            let mut hashes = vec![totals_hash(reported_cpu, net_words)];
            hashes.extend(batches.iter().map(|b| batch_hash(b)));

            let auth = Authorization::signed_by(oracle.clone());
            match engine
                .submit_total(
                    &auth,
                    oracle,
                    reported_cpu,
                    net_words,
                    period_commitment(&hashes),
                    period_start,
                )
                .await
            {
                Ok(_) => {}
                Err(e @ ResourceError::InflationPeriodExpired { .. }) => {
                    warn!(day, error = %e, "🛑 Inflation window closed, stopping");
                    return report(&engine, &bank, &oracles, &accounts, sim.genesis_supply, days_closed).await;
                }
                Err(e) => return Err(e).context(format!("submit_total by {}", oracle)),
            }
        }

        for oracle in &oracles {
            let auth = Authorization::signed_by(oracle.clone());
            for (i, batch) in batches.iter().enumerate() {
                engine
                    .submit_batch(&auth, oracle, (i + 1) as u16, batch.clone(), period_start)
                    .await
                    .with_context(|| format!("submit_batch {} by {}", i + 1, oracle))?;
            }
        }

        clock.advance(Duration::seconds(i64::from(sim.period_seconds)));
        let receipt = engine.advance_period().await?;
        days_closed += 1;
        info!(
            day,
            cpu_us,
            net_words,
            full_matches = receipt.full_matches,
            "📅 Simulated period closed"
        );
    }

    report(&engine, &bank, &oracles, &accounts, sim.genesis_supply, days_closed).await
}

async fn report(
    engine: &ResourceEngine,
    bank: &TokenBank,
    oracles: &[AccountName],
    accounts: &[AccountName],
    genesis_supply: TokenAmount,
    days_closed: u64,
) -> Result<SimulationReport> {
    let mut claimed_usage = TokenAmount::ZERO;
    let mut claimed_operator = TokenAmount::ZERO;
    for account in accounts.iter().chain(oracles) {
        match engine
            .claim(&Authorization::signed_by(account.clone()), account)
            .await
        {
            Ok(receipt) => {
                claimed_usage = claimed_usage.saturating_add(receipt.usage);
                claimed_operator = claimed_operator.saturating_add(receipt.operator);
            }
            Err(ResourceError::NothingToClaim(_)) => {}
            Err(e) => return Err(e.into()),
        }
    }

    let settings = engine.settings();
    let final_supply = bank.supply().await?;
    let scores: BTreeMap<AccountName, OracleScore> =
        engine.oracle_scores().await?.into_iter().collect();
    let summaries = oracles
        .iter()
        .map(|oracle| {
            let score = scores.get(oracle).cloned().unwrap_or_default();
            OracleSummary {
                oracle: oracle.clone(),
                points: score.points,
                submissions: score.submissions,
            }
        })
        .collect();
    let last_inflation = engine
        .history(1)
        .await?
        .last()
        .map(|e| e.inflation)
        .unwrap_or_default();

    Ok(SimulationReport {
        days_closed,
        genesis_supply,
        final_supply,
        issued: final_supply.saturating_sub(genesis_supply),
        claimed_usage,
        claimed_operator,
        operator_pool: bank.balance(&settings.operator_pay_account).await?,
        usage_pool: bank.balance(&settings.usage_pay_account).await?,
        last_inflation,
        oracles: summaries,
    })
}

impl SimulationReport {
    pub fn render(&self) -> String {
        let mut out = format!(
            "periods closed   {}\n\
             genesis supply   {}\n\
             final supply     {}\n\
             issued           {}\n\
             claimed usage    {}\n\
             claimed operator {}\n\
             operator pool    {}\n\
             usage pool       {}\n\
             last inflation   {}%\n\n\
             {:<14} {:>8} {:>12}\n",
            self.days_closed,
            self.genesis_supply,
            self.final_supply,
            self.issued,
            self.claimed_usage,
            self.claimed_operator,
            self.operator_pool,
            self.usage_pool,
            (self.last_inflation * Decimal::ONE_HUNDRED).round_dp(4),
            "oracle",
            "points",
            "submissions",
        );
        for o in &self.oracles {
            out.push_str(&format!("{:<14} {:>8} {:>12}\n", o.oracle.as_str(), o.points, o.submissions));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numbered_names() {
        assert_eq!(numbered("oracle", 0).unwrap().as_str(), "oracle.a");
        assert_eq!(numbered("oracle", 25).unwrap().as_str(), "oracle.z");
        assert_eq!(numbered("oracle", 26).unwrap().as_str(), "oracle.aa");
        assert_eq!(numbered("user", 27).unwrap().as_str(), "user.ab");
    }

    #[test]
    fn test_account_usage_sums_to_total() {
        let accounts: Vec<AccountName> = (0..4).map(|i| numbered("user", i).unwrap()).collect();
        let entries = account_usage(&accounts, 1_001);
        assert_eq!(entries.iter().map(|e| e.cpu_us).sum::<u64>(), 1_001);
        assert_eq!(entries[0].cpu_us, 100);
    }

    #[test]
    fn test_daily_amount_wobbles() {
        let mean = Decimal::new(1, 1);
        assert_eq!(daily_amount(1_000, mean, 0).unwrap(), 80);
        assert_eq!(daily_amount(1_000, mean, 4).unwrap(), 120);
        assert!(daily_amount(1, mean, 0).is_err());
    }
}
