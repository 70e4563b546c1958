pub mod error;
pub mod modal;
pub mod types;

pub use error::{QuorumError, Result};
pub use modal::{has_quorum, modal_agreement, QuorumVerifier};
pub use types::ModalOutcome;
