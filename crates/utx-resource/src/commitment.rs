//! Content hashes shared with off-chain oracle agents.
//!
//! All three are SHA-256 over ASCII text so that agents written in any
//! language derive the same digests.

use crate::types::UsageEntry;
use utx_types::Checksum256;

/// Hash of a totals submission: `"{cpu_us}-{net_words}"`.
pub fn totals_hash(cpu_us: u64, net_words: u64) -> Checksum256 {
    Checksum256::digest(format!("{}-{}", cpu_us, net_words))
}

/// Hash of a usage batch: `"{account}:{cpu_us};"` for each entry, concatenated in order.
///
/// `:` and `;` never occur in account names or decimal digits, so distinct
/// batches always produce distinct text.
pub fn batch_hash(entries: &[UsageEntry]) -> Checksum256 {
    let text: String = entries
        .iter()
        .map(|entry| format!("{}:{};", entry.account, entry.cpu_us))
        .collect();
    Checksum256::digest(text)
}

/// Commitment over every hash an oracle submits in a period: lower-case hex joined by `-`.
pub fn period_commitment(commit_hashes: &[Checksum256]) -> Checksum256 {
    let text = commit_hashes
        .iter()
        .map(Checksum256::to_hex)
        .collect::<Vec<_>>()
        .join("-");
    Checksum256::digest(text)
}
