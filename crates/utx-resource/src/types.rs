use crate::commitment::{batch_hash, period_commitment, totals_hash};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use utx_economics::TokenAmount;
use utx_types::{AccountName, Checksum256};

/// One account's CPU usage within a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageEntry {
    pub account: AccountName,
    pub cpu_us: u64,
}

impl UsageEntry {
    pub fn new(account: AccountName, cpu_us: u64) -> Self {
        Self { account, cpu_us }
    }
}

/// Raw values behind a submitted content hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DatasetPayload {
    Totals { cpu_us: u64, net_words: u64 },
    Batch(Vec<UsageEntry>),
}

impl DatasetPayload {
    pub fn content_hash(&self) -> Checksum256 {
        match self {
            DatasetPayload::Totals { cpu_us, net_words } => totals_hash(*cpu_us, *net_words),
            DatasetPayload::Batch(entries) => batch_hash(entries),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetRecord {
    pub id: u64,
    pub hash: Checksum256,
    pub payload: DatasetPayload,
}

/// Mutable state of the open period.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundState {
    /// Oracles that submitted a total, in submission order.
    pub submitting_oracles: Vec<AccountName>,
    pub inflation_issued: bool,
    pub batches_distributed: BTreeSet<u16>,
}

/// An oracle's reports for the open period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub oracle_id: AccountName,
    pub declared_cpu_total: u64,
    pub declared_net_total: u64,
    pub allocated_cpu: u64,
    /// Index 0 is the totals hash, index i >= 1 the hash of batch i.
    pub commit_hashes: Vec<Checksum256>,
    pub period_commitment: Checksum256,
}

impl Submission {
    pub fn next_batch_index(&self) -> usize {
        self.commit_hashes.len()
    }

    pub fn unallocated_cpu(&self) -> u64 {
        self.declared_cpu_total.saturating_sub(self.allocated_cpu)
    }

    /// Commitment recomputed from what was actually submitted.
    pub fn revealed_commitment(&self) -> Checksum256 {
        period_commitment(&self.commit_hashes)
    }
}

/// Closed-period record. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageHistoryEntry {
    pub day: u64,
    pub timestamp: DateTime<Utc>,
    pub total_cpu_us: u64,
    pub total_net_words: u64,
    pub use_cpu: Decimal,
    pub use_net: Decimal,
    pub cpu_percent_total: Decimal,
    pub net_percent_total: Decimal,
    pub ma_cpu: Decimal,
    pub ma_net: Decimal,
    pub ema_cpu: Decimal,
    pub ema_net: Decimal,
    pub ema_util_total: Decimal,
    pub inflation: Decimal,
    pub inflation_daily: Decimal,
    pub usage_pay_gross: Decimal,
    pub operator_pay: Decimal,
    pub usage_pay: Decimal,
    pub operator_pay_daily: Decimal,
    pub usage_pay_daily: Decimal,
    /// Token amounts from the model, before issuance caps.
    pub operator_tokens: TokenAmount,
    pub usage_tokens: TokenAmount,
    /// Token amounts actually issued.
    pub issued_operator_tokens: TokenAmount,
    pub issued_usage_tokens: TokenAmount,
    pub issued: bool,
}

impl UsageHistoryEntry {
    /// Day-zero seed written on first initialization.
    pub fn genesis(timestamp: DateTime<Utc>) -> Self {
        Self {
            day: 0,
            timestamp,
            total_cpu_us: 0,
            total_net_words: 0,
            use_cpu: Decimal::ZERO,
            use_net: Decimal::ZERO,
            cpu_percent_total: Decimal::ZERO,
            net_percent_total: Decimal::ZERO,
            ma_cpu: Decimal::ZERO,
            ma_net: Decimal::ZERO,
            ema_cpu: Decimal::ZERO,
            ema_net: Decimal::ZERO,
            ema_util_total: Decimal::ZERO,
            inflation: Decimal::ZERO,
            inflation_daily: Decimal::ZERO,
            usage_pay_gross: Decimal::ZERO,
            operator_pay: Decimal::ZERO,
            usage_pay: Decimal::ZERO,
            operator_pay_daily: Decimal::ZERO,
            usage_pay_daily: Decimal::ZERO,
            operator_tokens: TokenAmount::ZERO,
            usage_tokens: TokenAmount::ZERO,
            issued_operator_tokens: TokenAmount::ZERO,
            issued_usage_tokens: TokenAmount::ZERO,
            issued: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PayKind {
    Usage,
    Operator,
}

/// Pending claim held for an account or operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayBalance {
    pub account: AccountName,
    pub amount: TokenAmount,
    pub updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleScore {
    pub points: u64,
    pub submissions: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuanceReceipt {
    pub day: u64,
    pub operator_tokens: TokenAmount,
    pub usage_tokens: TokenAmount,
    pub per_operator: TokenAmount,
    pub operators_paid: usize,
    pub issued: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitTotalReceipt {
    pub hash: Checksum256,
    /// Present on the call that reached quorum.
    pub issuance: Option<IssuanceReceipt>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationSummary {
    pub accounts: usize,
    pub credited: TokenAmount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReceipt {
    pub batch_index: u16,
    pub hash: Checksum256,
    /// Present on the call that reached quorum for this index.
    pub allocation: Option<AllocationSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseReceipt {
    pub closed_period_start: DateTime<Utc>,
    pub next_period_start: DateTime<Utc>,
    pub modal_commitment: Checksum256,
    pub awards: Vec<(AccountName, u64)>,
    pub full_matches: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimReceipt {
    pub account: AccountName,
    pub usage: TokenAmount,
    pub operator: TokenAmount,
}

impl ClaimReceipt {
    pub fn total(&self) -> TokenAmount {
        self.usage.saturating_add(self.operator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submission_reveal_matches_commitment() {
        let totals = totals_hash(1000, 10);
        let batch = batch_hash(&[UsageEntry::new("alice".parse().unwrap(), 1000)]);
        let sub = Submission {
            oracle_id: "oracle1".parse().unwrap(),
            declared_cpu_total: 1000,
            declared_net_total: 10,
            allocated_cpu: 1000,
            commit_hashes: vec![totals, batch],
            period_commitment: period_commitment(&[totals, batch]),
        };
        assert_eq!(sub.revealed_commitment(), sub.period_commitment);
        assert_eq!(sub.next_batch_index(), 2);
        assert_eq!(sub.unallocated_cpu(), 0);
    }

    #[test]
    fn test_payload_hash() {
        let totals = DatasetPayload::Totals { cpu_us: 5, net_words: 6 };
        assert_eq!(totals.content_hash(), totals_hash(5, 6));
    }
}
