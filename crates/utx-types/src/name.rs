use crate::error::{Result, TypesError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const MAX_NAME_LEN: usize = 12;

/// An on-chain account identity: 1 to 12 characters drawn from `a-z`, `1-5` and `.`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountName(String);

impl AccountName {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        validate(&name)?;
        Ok(Self(name))
    }

    /// Build a name from a literal known to be valid.
    ///
    /// # Panics
    ///
    /// Panics if `name` is not a valid account name.
    pub fn from_static(name: &'static str) -> Self {
        match validate(name) {
            Ok(()) => Self(name.to_string()),
            Err(e) => panic!("{}", e),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn validate(name: &str) -> Result<()> {
    let reject = |reason: &str| TypesError::InvalidAccountName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(reject("name is empty"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(reject("name longer than 12 characters"));
    }
    if let Some(c) = name
        .chars()
        .find(|c| !matches!(c, 'a'..='z' | '1'..='5' | '.'))
    {
        return Err(reject(&format!("character '{}' not allowed", c)));
    }
    Ok(())
}

impl FromStr for AccountName {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for AccountName {
    type Error = TypesError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<AccountName> for String {
    fn from(name: AccountName) -> Self {
        name.0
    }
}

impl AsRef<str> for AccountName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccountName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountName({})", self.0)
    }
}

impl fmt::Display for AccountName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        for n in ["eosio", "utxio.upay", "oracle1", "a", "zzzzzzzzzzzz"] {
            assert!(AccountName::new(n).is_ok(), "{} should be valid", n);
        }
    }

    #[test]
    fn test_invalid_names() {
        assert!(AccountName::new("").is_err());
        assert!(AccountName::new("thisnameistoolong").is_err());
        assert!(AccountName::new("Upper").is_err());
        assert!(AccountName::new("oracle6").is_err());
        assert!(AccountName::new("has space").is_err());
    }

    #[test]
    #[should_panic]
    fn test_from_static_panics_on_invalid() {
        let _ = AccountName::from_static("Bad Name");
    }

    #[test]
    fn test_serde_rejects_invalid() {
        let ok: AccountName = serde_json::from_str("\"alice\"").unwrap();
        assert_eq!(ok.as_str(), "alice");
        assert!(serde_json::from_str::<AccountName>("\"ALICE\"").is_err());
    }
}
