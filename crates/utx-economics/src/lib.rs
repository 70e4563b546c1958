//! UTX token module.
//!
//! Integer base-unit amounts ([`TokenAmount`]), a capped [`TokenSupply`],
//! transactional [`BalanceManager`] transfers over an [`EconomicsStorage`]
//! backend, and the [`TokenLedger`] seam through which the resource engine
//! issues and moves tokens.

pub mod balance;
pub mod ledger;
pub mod storage;
pub mod supply;
pub mod types;

pub use balance::BalanceManager;
pub use ledger::{TokenBank, TokenLedger};
pub use storage::{EconomicsStorage, MemoryStorage, TransactionRecord};
pub use supply::{SupplyMetrics, TokenSupply};
pub use types::{TokenAmount, TransferEvent, TransferKind, UTX_BASE_UNIT, UTX_DECIMALS, UTX_SYMBOL};
