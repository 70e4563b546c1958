use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QuorumError {
    #[error("No reports to tally")]
    NoReports,

    #[error("Quorum threshold not met: {count} < {threshold}")]
    ThresholdNotMet { count: usize, threshold: usize },

    #[error("Invalid quorum threshold: {0}")]
    InvalidThreshold(usize),
}

pub type Result<T> = std::result::Result<T, QuorumError>;
