//! Primitive types shared by every UTX crate.
//!
//! [`AccountName`] identifies oracles, operators, end users and pool accounts.
//! [`Checksum256`] is the SHA-256 digest used for every content hash and
//! commitment in the resource engine.

pub mod error;
pub mod hash;
pub mod name;

pub use error::{Result, TypesError};
pub use hash::Checksum256;
pub use name::AccountName;
