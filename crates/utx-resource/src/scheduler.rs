//! Period lifecycle: phase derivation and the closing protocol.

use crate::config::PeriodConfig;
use crate::error::{ResourceError, Result};
use crate::storage::ResourceStorage;
use crate::types::{CloseReceipt, OracleScore, RoundState, Submission};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use utx_quorum::modal_agreement;
use utx_types::{AccountName, Checksum256};

/// Awarded when an oracle's submitted hashes reproduce its commitment.
pub const REVEAL_POINTS: u64 = 1;
/// Awarded on top of [`REVEAL_POINTS`] when the commitment is also the modal one.
pub const MAJORITY_POINTS: u64 = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// No totals submitted yet.
    Open,
    /// Totals arriving, quorum not reached.
    AwaitingQuorum,
    /// Inflation handled; accepting batches.
    InflationIssued,
    /// Boundary reached; `advance_period` may be called.
    Closeable,
}

pub fn phase(config: &PeriodConfig, round: &RoundState, now: DateTime<Utc>) -> Phase {
    if now >= config.period_end() {
        Phase::Closeable
    } else if round.inflation_issued {
        Phase::InflationIssued
    } else if round.submitting_oracles.is_empty() {
        Phase::Open
    } else {
        Phase::AwaitingQuorum
    }
}

/// Scores for a period that may close.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseOutcome {
    pub modal_commitment: Checksum256,
    /// Points per submitting oracle, in submission order.
    pub awards: Vec<(AccountName, u64)>,
    pub full_matches: usize,
}

/// Score every submission against the modal period commitment.
///
/// `submissions` must be in submission order; it decides modal ties.
pub fn evaluate_close(submissions: &[Submission], threshold: u16) -> Result<CloseOutcome> {
    let modal = modal_agreement(
        submissions
            .iter()
            .map(|s| (s.oracle_id.clone(), s.period_commitment)),
    );
    let modal = match modal {
        Some(m) if m.reaches(usize::from(threshold)) => m,
        other => {
            return Err(ResourceError::NoModalCommitment {
                count: other.map_or(0, |m| m.count),
                threshold,
            })
        }
    };

    let mut awards = Vec::with_capacity(submissions.len());
    let mut full_matches = 0;
    for submission in submissions {
        let mut points = 0;
        if submission.revealed_commitment() == submission.period_commitment {
            points += REVEAL_POINTS;
            if submission.period_commitment == modal.hash {
                points += MAJORITY_POINTS;
                full_matches += 1;
            }
        }
        debug!(oracle = %submission.oracle_id, points, "Oracle scored");
        awards.push((submission.oracle_id.clone(), points));
    }

    if full_matches < usize::from(threshold) {
        return Err(ResourceError::IncompleteModalData {
            full_matches,
            threshold,
        });
    }

    Ok(CloseOutcome {
        modal_commitment: modal.hash,
        awards,
        full_matches,
    })
}

/// Applies a successful close: scores, cleared period tables, next window.
pub struct PeriodScheduler {
    storage: Arc<dyn ResourceStorage>,
}

impl PeriodScheduler {
    pub fn new(storage: Arc<dyn ResourceStorage>) -> Self {
        Self { storage }
    }

    /// Fails `PeriodNotElapsed` before the boundary.
    pub fn ensure_closeable(config: &PeriodConfig, now: DateTime<Utc>) -> Result<()> {
        let ends_at = config.period_end();
        if now < ends_at {
            return Err(ResourceError::PeriodNotElapsed { ends_at });
        }
        Ok(())
    }

    /// Persist scores and roll the period forward. Dataset and submission
    /// tables are cleared by the caller.
    pub async fn close(
        &self,
        mut config: PeriodConfig,
        outcome: CloseOutcome,
    ) -> Result<CloseReceipt> {
        for (oracle, points) in &outcome.awards {
            let mut score = self.score(oracle).await?;
            score.points += points;
            score.submissions += 1;
            self.storage
                .put_score(oracle, score)
                .await
                .map_err(ResourceError::storage)?;
        }

        let closed_period_start = config.period_start;
        config.period_start = config.period_end();
        let next_period_start = config.period_start;
        self.storage
            .put_config(config)
            .await
            .map_err(ResourceError::storage)?;
        self.storage
            .put_round(RoundState::default())
            .await
            .map_err(ResourceError::storage)?;

        info!(
            closed = %closed_period_start,
            next = %next_period_start,
            modal_commitment = %outcome.modal_commitment,
            full_matches = outcome.full_matches,
            "⏭️ Period advanced"
        );

        Ok(CloseReceipt {
            closed_period_start,
            next_period_start,
            modal_commitment: outcome.modal_commitment,
            awards: outcome.awards,
            full_matches: outcome.full_matches,
        })
    }

    pub async fn score(&self, oracle: &AccountName) -> Result<OracleScore> {
        Ok(self
            .storage
            .get_score(oracle)
            .await
            .map_err(ResourceError::storage)?
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commitment::{period_commitment, totals_hash};
    use crate::storage::MemoryResourceStorage;
    use chrono::Duration;
    use rust_decimal::Decimal;

    fn name(s: &str) -> AccountName {
        s.parse().unwrap()
    }

    fn honest(oracle: &str, cpu: u64) -> Submission {
        let hashes = vec![totals_hash(cpu, 10)];
        Submission {
            oracle_id: name(oracle),
            declared_cpu_total: cpu,
            declared_net_total: 10,
            allocated_cpu: 0,
            period_commitment: period_commitment(&hashes),
            commit_hashes: hashes,
        }
    }

    fn config() -> PeriodConfig {
        PeriodConfig {
            period_seconds: 60,
            period_start: DateTime::<Utc>::from_timestamp(1_600_000_000, 0).unwrap(),
            quorum_threshold: 2,
            batch_size: 10,
            value_transfer_rate: Decimal::new(1, 1),
            max_pay_constant: Decimal::new(2947, 4),
            ema_drag_limit: 2,
            active: true,
        }
    }

    #[test]
    fn test_phase_progression() {
        let config = config();
        let mut round = RoundState::default();
        let t = config.period_start;
        assert_eq!(phase(&config, &round, t), Phase::Open);

        round.submitting_oracles.push(name("oracle1"));
        assert_eq!(phase(&config, &round, t), Phase::AwaitingQuorum);

        round.inflation_issued = true;
        assert_eq!(phase(&config, &round, t), Phase::InflationIssued);
        assert_eq!(phase(&config, &round, t + Duration::seconds(60)), Phase::Closeable);
    }

    #[test]
    fn test_scoring() {
        let mut liar = honest("oracle3", 100);
        liar.period_commitment = Checksum256::digest("something else");
        let dissenter = honest("oracle4", 999);

        let outcome = evaluate_close(
            &[honest("oracle1", 100), honest("oracle2", 100), liar, dissenter],
            2,
        )
        .unwrap();
        assert_eq!(outcome.full_matches, 2);
        assert_eq!(
            outcome.awards,
            vec![
                (name("oracle1"), 10),
                (name("oracle2"), 10),
                (name("oracle3"), 0),
                (name("oracle4"), 1),
            ]
        );
    }

    #[test]
    fn test_no_modal_commitment() {
        assert!(matches!(
            evaluate_close(&[], 2),
            Err(ResourceError::NoModalCommitment { count: 0, threshold: 2 })
        ));
        assert!(matches!(
            evaluate_close(&[honest("oracle1", 1), honest("oracle2", 2)], 2),
            Err(ResourceError::NoModalCommitment { count: 1, threshold: 2 })
        ));
    }

    #[test]
    fn test_incomplete_modal_data() {
        // both agree on a commitment that neither can reproduce
        let fake = Checksum256::digest("fake");
        let mut a = honest("oracle1", 100);
        let mut b = honest("oracle2", 100);
        a.period_commitment = fake;
        b.period_commitment = fake;
        assert!(matches!(
            evaluate_close(&[a, b], 2),
            Err(ResourceError::IncompleteModalData { full_matches: 0, threshold: 2 })
        ));
    }

    #[tokio::test]
    async fn test_close_accumulates_scores() {
        let storage = Arc::new(MemoryResourceStorage::new());
        let scheduler = PeriodScheduler::new(storage.clone());
        let subs = [honest("oracle1", 100), honest("oracle2", 100)];

        let start = config().period_start;
        let receipt = scheduler
            .close(config(), evaluate_close(&subs, 2).unwrap())
            .await
            .unwrap();
        assert_eq!(receipt.closed_period_start, start);
        assert_eq!(receipt.next_period_start, start + Duration::seconds(60));

        scheduler
            .close(config(), evaluate_close(&subs, 2).unwrap())
            .await
            .unwrap();
        let score = scheduler.score(&name("oracle1")).await.unwrap();
        assert_eq!(score, OracleScore { points: 20, submissions: 2 });
        assert!(PeriodScheduler::ensure_closeable(&config(), start).is_err());
        assert!(PeriodScheduler::ensure_closeable(&config(), start + Duration::seconds(60)).is_ok());
    }
}
