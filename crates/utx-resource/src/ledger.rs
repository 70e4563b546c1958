use crate::commitment::{batch_hash, totals_hash};
use crate::error::{ResourceError, Result};
use crate::storage::ResourceStorage;
use crate::types::{Submission, UsageEntry};
use std::sync::Arc;
use tracing::debug;
use utx_types::{AccountName, Checksum256};

/// Validate a batch against an oracle's submission and fold it in.
///
/// On error `submission` is left untouched. Returns the batch hash.
pub fn apply_batch(
    submission: &mut Submission,
    batch_index: u16,
    entries: &[UsageEntry],
) -> Result<Checksum256> {
    let expected = submission.next_batch_index();
    if usize::from(batch_index) != expected {
        return Err(ResourceError::BatchIndexMismatch {
            expected,
            actual: batch_index,
        });
    }

    let mut allocated = submission.allocated_cpu;
    for entry in entries {
        if entry.cpu_us == 0 {
            return Err(ResourceError::InvalidMeasurement(format!(
                "cpu for {} must be greater than 0",
                entry.account
            )));
        }
        let unallocated = submission.declared_cpu_total.saturating_sub(allocated);
        if entry.cpu_us > unallocated {
            return Err(ResourceError::OverAllocation {
                requested: entry.cpu_us,
                unallocated,
            });
        }
        allocated += entry.cpu_us;
    }

    let hash = batch_hash(entries);
    submission.allocated_cpu = allocated;
    submission.commit_hashes.push(hash);
    Ok(hash)
}

/// Per-oracle record of what was reported in the open period.
pub struct SubmissionLedger {
    storage: Arc<dyn ResourceStorage>,
}

impl SubmissionLedger {
    pub fn new(storage: Arc<dyn ResourceStorage>) -> Self {
        Self { storage }
    }

    pub async fn get(&self, oracle: &AccountName) -> Result<Option<Submission>> {
        self.storage
            .get_submission(oracle)
            .await
            .map_err(ResourceError::storage)
    }

    pub async fn ensure_absent(&self, oracle: &AccountName) -> Result<()> {
        match self.get(oracle).await? {
            Some(_) => Err(ResourceError::Duplicate(oracle.clone())),
            None => Ok(()),
        }
    }

    pub async fn record_total(
        &self,
        oracle: &AccountName,
        cpu_us: u64,
        net_words: u64,
        period_commitment: Checksum256,
    ) -> Result<Submission> {
        self.ensure_absent(oracle).await?;
        let submission = Submission {
            oracle_id: oracle.clone(),
            declared_cpu_total: cpu_us,
            declared_net_total: net_words,
            allocated_cpu: 0,
            commit_hashes: vec![totals_hash(cpu_us, net_words)],
            period_commitment,
        };
        self.put(submission.clone()).await?;
        Ok(submission)
    }

    pub async fn record_batch(
        &self,
        oracle: &AccountName,
        batch_index: u16,
        entries: &[UsageEntry],
    ) -> Result<Submission> {
        let mut submission = self
            .get(oracle)
            .await?
            .ok_or_else(|| ResourceError::NoPriorTotal(oracle.clone()))?;
        apply_batch(&mut submission, batch_index, entries)?;
        debug!(
            oracle = %oracle,
            batch_index,
            allocated_cpu = submission.allocated_cpu,
            declared_cpu_total = submission.declared_cpu_total,
            "Batch recorded"
        );
        self.put(submission.clone()).await?;
        Ok(submission)
    }

    /// `(oracle, hash)` at `slot` for every oracle that has reached it, in `oracles` order.
    pub async fn slot_reports(
        &self,
        oracles: &[AccountName],
        slot: usize,
    ) -> Result<Vec<(AccountName, Checksum256)>> {
        let mut reports = Vec::with_capacity(oracles.len());
        for submission in self.submissions(oracles).await? {
            if let Some(hash) = submission.commit_hashes.get(slot) {
                reports.push((submission.oracle_id.clone(), *hash));
            }
        }
        Ok(reports)
    }

    pub async fn submissions(&self, oracles: &[AccountName]) -> Result<Vec<Submission>> {
        let mut out = Vec::with_capacity(oracles.len());
        for oracle in oracles {
            if let Some(submission) = self.get(oracle).await? {
                out.push(submission);
            }
        }
        Ok(out)
    }

    pub async fn clear(&self) -> Result<()> {
        self.storage
            .clear_submissions()
            .await
            .map_err(ResourceError::storage)
    }

    async fn put(&self, submission: Submission) -> Result<()> {
        self.storage
            .put_submission(submission)
            .await
            .map_err(ResourceError::storage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryResourceStorage;

    fn name(s: &str) -> AccountName {
        s.parse().unwrap()
    }

    fn entry(account: &str, cpu_us: u64) -> UsageEntry {
        UsageEntry::new(name(account), cpu_us)
    }

    #[tokio::test]
    async fn test_duplicate_total_rejected() {
        let ledger = SubmissionLedger::new(Arc::new(MemoryResourceStorage::new()));
        let oracle = name("oracle1");
        ledger
            .record_total(&oracle, 1000, 10, Checksum256::ZERO)
            .await
            .unwrap();
        assert!(matches!(
            ledger.record_total(&oracle, 1000, 10, Checksum256::ZERO).await,
            Err(ResourceError::Duplicate(_))
        ));
    }

    #[tokio::test]
    async fn test_batch_requires_prior_total() {
        let ledger = SubmissionLedger::new(Arc::new(MemoryResourceStorage::new()));
        assert!(matches!(
            ledger.record_batch(&name("oracle1"), 1, &[entry("alice", 5)]).await,
            Err(ResourceError::NoPriorTotal(_))
        ));
    }

    #[tokio::test]
    async fn test_over_allocation_on_second_batch() {
        let ledger = SubmissionLedger::new(Arc::new(MemoryResourceStorage::new()));
        let oracle = name("oracle1");
        ledger
            .record_total(&oracle, 1000, 10, Checksum256::ZERO)
            .await
            .unwrap();

        ledger
            .record_batch(&oracle, 1, &[entry("alice", 600)])
            .await
            .unwrap();
        let err = ledger
            .record_batch(&oracle, 2, &[entry("bob", 600)])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ResourceError::OverAllocation { requested: 600, unallocated: 400 }
        ));

        // rejected batch left no trace
        let sub = ledger.get(&oracle).await.unwrap().unwrap();
        assert_eq!(sub.allocated_cpu, 600);
        assert_eq!(sub.next_batch_index(), 2);
    }

    #[test]
    fn test_apply_batch_index_and_measurement() {
        let mut sub = Submission {
            oracle_id: name("oracle1"),
            declared_cpu_total: 100,
            declared_net_total: 1,
            allocated_cpu: 0,
            commit_hashes: vec![totals_hash(100, 1)],
            period_commitment: Checksum256::ZERO,
        };
        assert!(matches!(
            apply_batch(&mut sub, 0, &[entry("alice", 1)]),
            Err(ResourceError::BatchIndexMismatch { expected: 1, actual: 0 })
        ));
        assert!(matches!(
            apply_batch(&mut sub, 1, &[entry("alice", 0)]),
            Err(ResourceError::InvalidMeasurement(_))
        ));
        let hash = apply_batch(&mut sub, 1, &[entry("alice", 40), entry("bob", 60)]).unwrap();
        assert_eq!(sub.commit_hashes[1], hash);
        assert_eq!(sub.unallocated_cpu(), 0);
    }

    #[tokio::test]
    async fn test_slot_reports_skip_oracles_behind() {
        let ledger = SubmissionLedger::new(Arc::new(MemoryResourceStorage::new()));
        let (a, b) = (name("oracle1"), name("oracle2"));
        ledger.record_total(&a, 100, 1, Checksum256::ZERO).await.unwrap();
        ledger.record_total(&b, 100, 1, Checksum256::ZERO).await.unwrap();
        ledger.record_batch(&b, 1, &[entry("alice", 10)]).await.unwrap();

        let oracles = vec![a.clone(), b.clone()];
        assert_eq!(ledger.slot_reports(&oracles, 0).await.unwrap().len(), 2);
        let slot1 = ledger.slot_reports(&oracles, 1).await.unwrap();
        assert_eq!(slot1.len(), 1);
        assert_eq!(slot1[0].0, b);
    }
}
