use crate::{ModalOutcome, QuorumError, Result};
use std::collections::HashSet;
use std::hash::Hash;
use tracing::{debug, info};
use utx_types::Checksum256;

/// Find the most frequent hash among `reports`.
///
/// Each reporter counts once; repeated entries from the same reporter are
/// ignored. When two hashes share the highest count the one that appeared
/// first in the input wins, so the outcome depends only on the input order
/// and never on hashing or map iteration order.
pub fn modal_agreement<R, I>(reports: I) -> Option<ModalOutcome>
where
    R: Eq + Hash,
    I: IntoIterator<Item = (R, Checksum256)>,
{
    // (hash, count) in first-seen order
    let mut tally: Vec<(Checksum256, usize)> = Vec::new();
    let mut seen = HashSet::new();

    for (reporter, hash) in reports {
        if !seen.insert(reporter) {
            debug!(hash = %hash, "Duplicate report ignored");
            continue;
        }
        match tally.iter_mut().find(|(h, _)| *h == hash) {
            Some((_, count)) => *count += 1,
            None => tally.push((hash, 1)),
        }
    }

    let mut best: Option<ModalOutcome> = None;
    for (hash, count) in tally {
        if best.map_or(true, |b| count > b.count) {
            best = Some(ModalOutcome { hash, count });
        }
    }
    best
}

pub fn has_quorum(count: usize, threshold: usize) -> bool {
    count >= threshold
}

/// Tallies a slot and enforces the quorum threshold.
pub struct QuorumVerifier;

impl QuorumVerifier {
    /// Returns the modal outcome only if it reaches `threshold`.
    pub fn verify<R, I>(slot: &str, reports: I, threshold: usize) -> Result<ModalOutcome>
    where
        R: Eq + Hash,
        I: IntoIterator<Item = (R, Checksum256)>,
    {
        if threshold == 0 {
            return Err(QuorumError::InvalidThreshold(threshold));
        }

        let outcome = modal_agreement(reports).ok_or(QuorumError::NoReports)?;
        let passed = outcome.reaches(threshold);
        let emoji = if passed { "✅" } else { "❌" };

        info!(
            slot,
            modal_hash = %outcome.hash,
            count = outcome.count,
            threshold,
            passed,
            "{} Modal hash tallied",
            emoji
        );

        if !passed {
            return Err(QuorumError::ThresholdNotMet {
                count: outcome.count,
                threshold,
            });
        }
        Ok(outcome)
    }
}
