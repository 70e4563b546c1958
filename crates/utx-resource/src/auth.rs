use crate::error::{ResourceError, Result};
use utx_types::AccountName;

/// The set of accounts that authorized a call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Authorization {
    signers: Vec<AccountName>,
}

impl Authorization {
    pub fn signed_by(account: AccountName) -> Self {
        Self {
            signers: vec![account],
        }
    }

    /// No signatures; enough for operations anyone may call.
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with(mut self, account: AccountName) -> Self {
        if !self.signers.contains(&account) {
            self.signers.push(account);
        }
        self
    }

    pub fn has(&self, account: &AccountName) -> bool {
        self.signers.contains(account)
    }

    pub fn signers(&self) -> &[AccountName] {
        &self.signers
    }

    pub fn require(&self, account: &AccountName) -> Result<()> {
        if self.has(account) {
            Ok(())
        } else {
            Err(ResourceError::Unauthorized {
                account: account.clone(),
                reason: "did not authorize this call".to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require() {
        let alice: AccountName = "alice".parse().unwrap();
        let bob: AccountName = "bob".parse().unwrap();

        let auth = Authorization::signed_by(alice.clone());
        assert!(auth.require(&alice).is_ok());
        assert!(matches!(
            auth.require(&bob),
            Err(ResourceError::Unauthorized { .. })
        ));

        let both = auth.with(bob.clone()).with(bob.clone());
        assert!(both.require(&bob).is_ok());
        assert_eq!(both.signers().len(), 2);

        assert!(Authorization::anonymous().require(&alice).is_err());
    }
}
