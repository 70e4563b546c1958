use serde::{Deserialize, Serialize};
use utx_types::Checksum256;

/// The most frequent hash for a slot and how many reporters submitted it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModalOutcome {
    pub hash: Checksum256,
    pub count: usize,
}

impl ModalOutcome {
    pub fn reaches(&self, threshold: usize) -> bool {
        crate::has_quorum(self.count, threshold)
    }
}
