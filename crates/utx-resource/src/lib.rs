//! Resource accounting engine.
//!
//! Eligible oracles report each period's aggregate CPU and NET usage. Once a
//! quorum agrees on the totals, a utilization-driven inflation curve decides
//! how many tokens to issue; the issuance is split between network operators
//! and, via per-account usage batches that also need quorum, the accounts
//! that consumed the resources. Oracles are scored at period close on whether
//! their committed reports were honest and agreed with the majority.
//!
//! [`ResourceEngine`] is the entry point. Persistence, the token module, the
//! operator registry and the clock are collaborators behind traits
//! ([`ResourceStorage`], [`utx_economics::TokenLedger`], [`OperatorRegistry`],
//! [`Clock`]).

pub mod auth;
pub mod clock;
pub mod commitment;
pub mod config;
pub mod dataset;
pub mod distributor;
pub mod engine;
pub mod error;
pub mod inflation;
pub mod ledger;
pub mod oracle;
pub mod scheduler;
pub mod storage;
pub mod types;

pub use auth::Authorization;
pub use clock::{Clock, ManualClock, SystemClock};
pub use commitment::{batch_hash, period_commitment, totals_hash};
pub use config::{ChainLimits, PeriodConfig, ResourceSettings};
pub use dataset::DatasetStore;
pub use distributor::{plan_issuance, IssuancePlan, RewardDistributor, TokenAction};
pub use engine::{ResourceEngine, ResourceParams};
pub use error::{ErrorCategory, ResourceError, Result};
pub use inflation::{InflationModel, InflationParams, UsageSample};
pub use ledger::{apply_batch, SubmissionLedger};
pub use oracle::{OperatorInfo, OperatorRegistry, OracleRegistry, ProducerSchedule};
pub use scheduler::{evaluate_close, CloseOutcome, Phase, PeriodScheduler};
pub use storage::{MemoryResourceStorage, ResourceStorage};
pub use types::{
    AllocationSummary, BatchReceipt, ClaimReceipt, CloseReceipt, DatasetPayload, DatasetRecord,
    IssuanceReceipt, OracleScore, PayBalance, PayKind, RoundState, Submission,
    SubmitTotalReceipt, UsageEntry, UsageHistoryEntry,
};
