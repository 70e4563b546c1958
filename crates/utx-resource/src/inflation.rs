//! Utilization-driven inflation curve.
//!
//! Everything here is pure: given the usage history and today's measured
//! utilization it produces the next [`UsageHistoryEntry`]. Arithmetic uses
//! `rust_decimal` throughout, including software `ln`/`exp`, so every
//! process computing the same period gets bit-identical results.

use crate::config::{PeriodConfig, ResourceSettings};
use crate::error::{ResourceError, Result};
use crate::types::UsageHistoryEntry;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, MathematicalOps};
use tracing::debug;
use utx_economics::TokenAmount;

pub const DAYS_PER_YEAR: u64 = 365;

// 1e-24; the library default for exp stops at 2e-7
const EXP_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 24);

/// Curve parameters taken from the period configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InflationParams {
    pub value_transfer_rate: Decimal,
    pub max_pay_constant: Decimal,
    pub ema_drag_limit: u32,
}

impl From<&PeriodConfig> for InflationParams {
    fn from(config: &PeriodConfig) -> Self {
        Self {
            value_transfer_rate: config.value_transfer_rate,
            max_pay_constant: config.max_pay_constant,
            ema_drag_limit: config.ema_drag_limit,
        }
    }
}

/// One period's agreed measurements expressed as capacity shares.
#[derive(Debug, Clone, PartialEq)]
pub struct UsageSample {
    pub timestamp: DateTime<Utc>,
    pub total_cpu_us: u64,
    pub total_net_words: u64,
    pub use_cpu: Decimal,
    pub use_net: Decimal,
}

#[derive(Debug, Clone)]
pub struct InflationModel {
    usage_floor: Decimal,
    day_cap: u64,
}

impl InflationModel {
    pub fn new(usage_floor: Decimal, day_cap: u64) -> Self {
        Self {
            usage_floor,
            day_cap,
        }
    }

    pub fn from_settings(settings: &ResourceSettings) -> Self {
        Self::new(settings.usage_floor, settings.inflation_day_cap)
    }

    pub fn day_cap(&self) -> u64 {
        self.day_cap
    }

    /// `used / capacity`, floored at the usage floor and capped at 1.
    pub fn usage_share(&self, used: u64, capacity: u64) -> Result<Decimal> {
        if capacity == 0 {
            return Err(ResourceError::Arithmetic("zero capacity"));
        }
        let share = Decimal::from(used) / Decimal::from(capacity);
        Ok(share.clamp(self.usage_floor, Decimal::ONE))
    }

    /// Build a sample from raw totals. NET is measured in words, capacity in bytes.
    pub fn sample(
        &self,
        timestamp: DateTime<Utc>,
        total_cpu_us: u64,
        total_net_words: u64,
        cpu_capacity: u64,
        net_capacity: u64,
    ) -> Result<UsageSample> {
        Ok(UsageSample {
            timestamp,
            total_cpu_us,
            total_net_words,
            use_cpu: self.usage_share(total_cpu_us, cpu_capacity)?,
            use_net: self.usage_share(total_net_words.saturating_mul(8), net_capacity)?,
        })
    }

    /// Compute the next history entry.
    ///
    /// `history` holds the most recent entries, oldest first, and must end with
    /// the previous period (at least `ema_drag_limit` entries when available).
    /// Token amounts are shares of `supply`, truncated; issuance fields are left
    /// at zero for the distributor to fill in.
    pub fn step(
        &self,
        history: &[UsageHistoryEntry],
        sample: &UsageSample,
        params: InflationParams,
        supply: TokenAmount,
    ) -> Result<UsageHistoryEntry> {
        let prev = history.last().ok_or(ResourceError::NotInitialized)?;
        let day = prev.day + 1;
        if day > self.day_cap {
            return Err(ResourceError::InflationPeriodExpired {
                day,
                cap: self.day_cap,
            });
        }
        let elapsed = prev.day;

        let use_cpu = sample.use_cpu.clamp(self.usage_floor, Decimal::ONE);
        let use_net = sample.use_net.clamp(self.usage_floor, Decimal::ONE);
        let cpu_percent_total = use_cpu / (use_cpu + use_net);
        let net_percent_total = use_net / (use_cpu + use_net);

        let drag = u64::from(params.ema_drag_limit.max(1));
        let window = (elapsed + 1).min(drag) as usize;
        let earlier = &history[history.len().saturating_sub(window - 1)..];

        let ma_cpu = moving_average(earlier.iter().map(|e| e.use_cpu), use_cpu);
        let ma_net = moving_average(earlier.iter().map(|e| e.use_net), use_net);

        // simple average until the window has filled; afterwards the EMA
        // steps from the previous period's moving average
        let (ema_cpu, ema_net) = if elapsed + 1 >= drag {
            (
                exponential_average(prev.ma_cpu, use_cpu, params.ema_drag_limit),
                exponential_average(prev.ma_net, use_net, params.ema_drag_limit),
            )
        } else {
            (ma_cpu, ma_net)
        };

        let utilization = ((ema_cpu + ema_net) / Decimal::TWO)
            .clamp(self.usage_floor, Decimal::ONE - self.usage_floor);

        let c = concavity(utilization)?;
        let vt = value_transfer(params.value_transfer_rate, elapsed)?;

        let denominator = Decimal::ONE - utilization - c * vt;
        if denominator <= Decimal::ZERO {
            return Err(ResourceError::InvalidConfig(format!(
                "inflation curve diverges at utilization {} with value transfer {}",
                utilization, vt
            )));
        }
        let inflation = (Decimal::ONE - utilization) / denominator - Decimal::ONE;

        let operator_weight = params.max_pay_constant * c;
        let usage_pay_gross =
            pow(Decimal::ONE + inflation, Decimal::ONE - operator_weight)? - Decimal::ONE;
        let operator_gross = inflation - usage_pay_gross;

        // waterfall: operators get at most the idle-capacity share
        let waterfall = inflation * (Decimal::ONE - utilization);
        let operator_pay = operator_gross.min(waterfall).max(Decimal::ZERO);
        let usage_pay = inflation - operator_pay;

        let inflation_daily = pow(
            Decimal::ONE + inflation,
            Decimal::ONE / Decimal::from(DAYS_PER_YEAR),
        )? - Decimal::ONE;

        let (operator_pay_daily, usage_pay_daily) = if inflation.is_zero() {
            (Decimal::ZERO, Decimal::ZERO)
        } else {
            (
                operator_pay * inflation_daily / inflation,
                usage_pay * inflation_daily / inflation,
            )
        };

        let operator_tokens = share_of(operator_pay_daily, supply)?;
        let usage_tokens = share_of(usage_pay_daily, supply)?;

        debug!(
            day,
            use_cpu = %use_cpu,
            use_net = %use_net,
            ma_cpu = %ma_cpu,
            ema_cpu = %ema_cpu,
            utilization = %utilization,
            inflation = %inflation,
            operator_pay = %operator_pay,
            usage_pay = %usage_pay,
            inflation_daily = %inflation_daily,
            operator_tokens = operator_tokens.to_base_units(),
            usage_tokens = usage_tokens.to_base_units(),
            "📈 Inflation computed"
        );

        Ok(UsageHistoryEntry {
            day,
            timestamp: sample.timestamp,
            total_cpu_us: sample.total_cpu_us,
            total_net_words: sample.total_net_words,
            use_cpu,
            use_net,
            cpu_percent_total,
            net_percent_total,
            ma_cpu,
            ma_net,
            ema_cpu,
            ema_net,
            ema_util_total: utilization,
            inflation,
            inflation_daily,
            usage_pay_gross,
            operator_pay,
            usage_pay,
            operator_pay_daily,
            usage_pay_daily,
            operator_tokens,
            usage_tokens,
            issued_operator_tokens: TokenAmount::ZERO,
            issued_usage_tokens: TokenAmount::ZERO,
            issued: false,
        })
    }

    /// Run the curve for `days` periods at constant utilization, starting from a
    /// fresh history. Supply grows by each day's model tokens.
    pub fn project(
        &self,
        utilization: Decimal,
        days: u64,
        params: InflationParams,
        start: DateTime<Utc>,
        mut supply: TokenAmount,
    ) -> Result<Vec<UsageHistoryEntry>> {
        let keep = params.ema_drag_limit.max(1) as usize;
        let mut history = vec![UsageHistoryEntry::genesis(start)];
        let mut out = Vec::with_capacity(days as usize);

        for _ in 0..days {
            let day = history.last().map_or(0, |e| e.day) + 1;
            let sample = UsageSample {
                timestamp: start + Duration::days(day as i64),
                total_cpu_us: 0,
                total_net_words: 0,
                use_cpu: utilization,
                use_net: utilization,
            };
            let entry = self.step(&history, &sample, params, supply)?;
            supply = supply
                .saturating_add(entry.operator_tokens)
                .saturating_add(entry.usage_tokens);
            history.push(entry.clone());
            if history.len() > keep {
                history.remove(0);
            }
            out.push(entry);
        }
        Ok(out)
    }
}

/// `C(u) = -u ln(u) e`: zero at the edges, 1 at `u = 1/e`.
pub fn concavity(utilization: Decimal) -> Result<Decimal> {
    let ln = utilization
        .checked_ln()
        .ok_or(ResourceError::Arithmetic("ln of utilization"))?;
    Ok(-utilization * ln * Decimal::E)
}

/// `rate / 2^(elapsed_days / 365)`.
pub fn value_transfer(rate: Decimal, elapsed_days: u64) -> Result<Decimal> {
    let halvings = Decimal::from(elapsed_days) / Decimal::from(DAYS_PER_YEAR);
    Ok(rate / pow(Decimal::TWO, halvings)?)
}

/// Mean of `earlier` values plus `latest`.
pub fn moving_average(earlier: impl Iterator<Item = Decimal>, latest: Decimal) -> Decimal {
    let (sum, count) = earlier.fold((latest, 1u64), |(s, n), v| (s + v, n + 1));
    sum / Decimal::from(count)
}

pub fn exponential_average(previous: Decimal, latest: Decimal, drag_limit: u32) -> Decimal {
    let multiplier = Decimal::TWO / Decimal::from(u64::from(drag_limit) + 1);
    previous + (latest - previous) * multiplier
}

/// `base^exponent` for positive `base`.
pub fn pow(base: Decimal, exponent: Decimal) -> Result<Decimal> {
    if base <= Decimal::ZERO {
        return Err(ResourceError::Arithmetic("non-positive power base"));
    }
    if exponent.is_zero() {
        return Ok(Decimal::ONE);
    }
    base.checked_ln()
        .and_then(|ln| ln.checked_mul(exponent))
        .and_then(|x| x.checked_exp_with_tolerance(EXP_TOLERANCE))
        .ok_or(ResourceError::Arithmetic("power overflow"))
}

fn share_of(rate: Decimal, supply: TokenAmount) -> Result<TokenAmount> {
    (rate * Decimal::from(supply.to_base_units()))
        .trunc()
        .to_u64()
        .map(TokenAmount::from_base_units)
        .ok_or(ResourceError::Arithmetic("token amount out of range"))
}
