use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TypesError {
    #[error("Invalid account name '{name}': {reason}")]
    InvalidAccountName { name: String, reason: String },

    #[error("Invalid checksum: {0}")]
    InvalidChecksum(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for TypesError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<hex::FromHexError> for TypesError {
    fn from(e: hex::FromHexError) -> Self {
        Self::InvalidChecksum(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TypesError>;
