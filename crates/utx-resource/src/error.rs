use chrono::{DateTime, Utc};
use thiserror::Error;
use utx_types::AccountName;

pub type Result<T> = std::result::Result<T, ResourceError>;

/// Coarse classification of failures, for callers deciding how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Authorization,
    StateConsistency,
    Quorum,
    Timing,
    Capacity,
    NotFound,
    Configuration,
    Backend,
}

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("Unauthorized: {account} {reason}")]
    Unauthorized { account: AccountName, reason: String },

    #[error("Invalid period: submitted {submitted}, current {current}")]
    InvalidPeriod {
        submitted: DateTime<Utc>,
        current: DateTime<Utc>,
    },

    #[error("Period mismatch: submitted {submitted}, current {current}")]
    PeriodMismatch {
        submitted: DateTime<Utc>,
        current: DateTime<Utc>,
    },

    #[error("Total already submitted by {0} this period")]
    Duplicate(AccountName),

    #[error("Measurement out of range: {resource} {value} exceeds capacity {capacity}")]
    OutOfRange {
        resource: &'static str,
        value: u64,
        capacity: u64,
    },

    #[error("Invalid measurement: {0}")]
    InvalidMeasurement(String),

    #[error("Inflation not yet issued for this period")]
    InflationNotReady,

    #[error("Batch is empty")]
    EmptyBatch,

    #[error("Batch too large: {size} entries, limit {limit}")]
    BatchTooLarge { size: usize, limit: u16 },

    #[error("No total submitted by {0} this period")]
    NoPriorTotal(AccountName),

    #[error("Batch index mismatch: expected {expected}, got {actual}")]
    BatchIndexMismatch { expected: usize, actual: u16 },

    #[error("Over allocation: {requested} cpu us requested, {unallocated} unallocated")]
    OverAllocation { requested: u64, unallocated: u64 },

    #[error("Inflation period expired: day {day} exceeds cap {cap}")]
    InflationPeriodExpired { day: u64, cap: u64 },

    #[error("Issuance cap exceeded: {requested} base units requested, ceiling {ceiling}")]
    IssuanceCapExceeded { requested: u64, ceiling: u64 },

    #[error("Supply cap reached: supply {supply}, max {max_supply}")]
    SupplyCapExceeded { supply: u64, max_supply: u64 },

    #[error("No active operators")]
    NoActiveOperators,

    #[error("Operator count mismatch: {active} active, last schedule had {expected}")]
    OperatorCountMismatch { active: usize, expected: usize },

    #[error("Period not elapsed: ends at {ends_at}")]
    PeriodNotElapsed { ends_at: DateTime<Utc> },

    #[error("No modal commitment: {count} agreeing of {threshold} required")]
    NoModalCommitment { count: usize, threshold: u16 },

    #[error("Incomplete modal data: {full_matches} full matches of {threshold} required")]
    IncompleteModalData { full_matches: usize, threshold: u16 },

    #[error("Nothing to claim for {0}")]
    NothingToClaim(AccountName),

    #[error("Dataset missing for hash {0}")]
    DatasetMissing(String),

    #[error("Dataset conflict: hash {0} already stored with a different payload")]
    DatasetConflict(String),

    #[error("Resource issuance active flag already {active}")]
    AlreadyInState { active: bool },

    #[error("Operation requires resource issuance to be inactive")]
    EngineActive,

    #[error("Resource engine not initialized")]
    NotInitialized,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Arithmetic failure: {0}")]
    Arithmetic(&'static str),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Token ledger error: {0}")]
    Token(String),
}

impl ResourceError {
    pub fn category(&self) -> ErrorCategory {
        use ResourceError::*;
        match self {
            Unauthorized { .. } => ErrorCategory::Authorization,
            InvalidPeriod { .. }
            | PeriodMismatch { .. }
            | Duplicate(_)
            | InvalidMeasurement(_)
            | InflationNotReady
            | EmptyBatch
            | BatchTooLarge { .. }
            | BatchIndexMismatch { .. }
            | OverAllocation { .. }
            | OperatorCountMismatch { .. }
            | AlreadyInState { .. }
            | DatasetConflict(_)
            | EngineActive => ErrorCategory::StateConsistency,
            NoModalCommitment { .. } | IncompleteModalData { .. } => ErrorCategory::Quorum,
            PeriodNotElapsed { .. } | InflationPeriodExpired { .. } => ErrorCategory::Timing,
            OutOfRange { .. } | IssuanceCapExceeded { .. } | SupplyCapExceeded { .. } => {
                ErrorCategory::Capacity
            }
            NothingToClaim(_) | NoPriorTotal(_) | DatasetMissing(_) | NoActiveOperators => {
                ErrorCategory::NotFound
            }
            NotInitialized | InvalidConfig(_) | Arithmetic(_) => ErrorCategory::Configuration,
            Storage(_) | Token(_) => ErrorCategory::Backend,
        }
    }

    pub(crate) fn storage(e: anyhow::Error) -> Self {
        Self::Storage(format!("{:#}", e))
    }

    pub(crate) fn token(e: anyhow::Error) -> Self {
        Self::Token(format!("{:#}", e))
    }
}

impl From<utx_types::TypesError> for ResourceError {
    fn from(e: utx_types::TypesError) -> Self {
        Self::InvalidConfig(e.to_string())
    }
}
