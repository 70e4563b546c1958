use crate::config::SimConfig;
use anyhow::Result;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt::Write;
use utx_economics::TokenAmount;
use utx_resource::{InflationModel, InflationParams, UsageHistoryEntry};

/// Elapsed-day markers reported by default.
pub const DEFAULT_MARKERS: [u64; 6] = [91, 182, 365, 638, 912, 1095];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectionRow {
    /// Days elapsed since genesis when the period was computed.
    pub elapsed_days: u64,
    pub utilization: Decimal,
    pub inflation: Decimal,
    pub inflation_daily: Decimal,
    pub operator_pay_daily: Decimal,
    pub usage_pay_daily: Decimal,
    pub operator_tokens: TokenAmount,
    pub usage_tokens: TokenAmount,
}

impl From<&UsageHistoryEntry> for ProjectionRow {
    fn from(entry: &UsageHistoryEntry) -> Self {
        Self {
            elapsed_days: entry.day.saturating_sub(1),
            utilization: entry.ema_util_total,
            inflation: entry.inflation,
            inflation_daily: entry.inflation_daily,
            operator_pay_daily: entry.operator_pay_daily,
            usage_pay_daily: entry.usage_pay_daily,
            operator_tokens: entry.operator_tokens,
            usage_tokens: entry.usage_tokens,
        }
    }
}

/// Run the inflation curve at constant utilization with the configured parameters.
pub fn project(config: &SimConfig, utilization: Decimal, days: u64) -> Result<Vec<UsageHistoryEntry>> {
    let model = InflationModel::from_settings(&config.resource);
    let params = InflationParams {
        value_transfer_rate: config.simulation.value_transfer_rate,
        max_pay_constant: config.simulation.max_pay_constant,
        ema_drag_limit: config.resource.ema_drag_limit,
    };
    let start = DateTime::<Utc>::from_timestamp(config.simulation.start_timestamp, 0)
        .ok_or_else(|| anyhow::anyhow!("invalid start timestamp"))?;
    Ok(model.project(
        utilization,
        days,
        params,
        start,
        config.simulation.genesis_supply,
    )?)
}

/// Rows for the first period, each marker within range, and the final period.
pub fn marker_rows(entries: &[UsageHistoryEntry], markers: &[u64]) -> Vec<ProjectionRow> {
    let last = entries.len().saturating_sub(1);
    entries
        .iter()
        .enumerate()
        .filter(|(i, _)| *i == 0 || *i == last || markers.contains(&(*i as u64)))
        .map(|(_, e)| ProjectionRow::from(e))
        .collect()
}

pub fn render_table(rows: &[ProjectionRow]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:>6}  {:>6}  {:>10}  {:>12}  {:>12}  {:>12}  {:>16}  {:>16}",
        "day", "util", "inflation", "daily", "operator/day", "usage/day", "operator tokens", "usage tokens"
    );
    for row in rows {
        let _ = writeln!(
            out,
            "{:>6}  {:>6}  {:>9.4}%  {:>12.4e}  {:>12.4e}  {:>12.4e}  {:>16}  {:>16}",
            row.elapsed_days,
            row.utilization.round_dp(4),
            (row.inflation * Decimal::ONE_HUNDRED).round_dp(4),
            to_f64(row.inflation_daily),
            to_f64(row.operator_pay_daily),
            to_f64(row.usage_pay_daily),
            row.operator_tokens.to_string(),
            row.usage_tokens.to_string(),
        );
    }
    out
}

fn to_f64(value: Decimal) -> f64 {
    use rust_decimal::prelude::ToPrimitive;
    value.to_f64().unwrap_or(f64::NAN)
}
