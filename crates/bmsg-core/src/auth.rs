//! Admin secret handling
//!
//! Operator actions are authorized by a single shared secret. The secret
//! is zeroized on drop and compared in constant time.

use std::fmt;

use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

/// Shared operator secret
pub struct AdminSecret(Zeroizing<String>);

impl AdminSecret {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(Zeroizing::new(secret.into()))
    }

    /// Constant-time comparison against a presented secret.
    ///
    /// An empty configured secret never matches.
    pub fn verify(&self, presented: &str) -> bool {
        if self.0.is_empty() {
            return false;
        }
        self.0.as_bytes().ct_eq(presented.as_bytes()).into()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for AdminSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AdminSecret(***)")
    }
}

impl From<String> for AdminSecret {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for AdminSecret {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify() {
        let secret = AdminSecret::from("s3cret");
        assert!(secret.verify("s3cret"));
        assert!(!secret.verify("s3cre"));
        assert!(!secret.verify("s3cret!"));
        assert!(!secret.verify(""));
    }

    #[test]
    fn test_empty_secret_never_matches() {
        let secret = AdminSecret::from("");
        assert!(secret.is_empty());
        assert!(!secret.verify(""));
    }

    #[test]
    fn test_debug_redacts() {
        let secret = AdminSecret::from("s3cret");
        assert_eq!(format!("{:?}", secret), "AdminSecret(***)");
    }
}
