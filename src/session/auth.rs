//! Login authentication.

use std::collections::HashMap;

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::config::UserConfig;
use crate::session::capability::{CapabilityParseError, CapabilitySet};

/// Identity established by a successful login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Entity tag, e.g. "user-admin".
    pub tag: String,
    pub capabilities: CapabilitySet,
}

/// Checks login credentials.
///
/// Called only after the login has passed admission control.
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, tag: &str, password: &str) -> Option<Identity>;
}

/// SHA-256 of a password. Comparing digests keeps the comparison length independent.
type PasswordDigest = [u8; 32];

fn digest(password: &str) -> PasswordDigest {
    Sha256::digest(password.as_bytes()).into()
}

/// Authenticator backed by the users listed in configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticAuthenticator {
    users: HashMap<String, (PasswordDigest, CapabilitySet)>,
}

impl StaticAuthenticator {
    pub fn from_config(users: &[UserConfig]) -> Result<Self, CapabilityParseError> {
        let mut map = HashMap::with_capacity(users.len());
        for user in users {
            let capabilities = CapabilitySet::parse(&user.capabilities)?;
            map.insert(user.tag.clone(), (digest(&user.password), capabilities));
        }
        Ok(Self { users: map })
    }

    pub fn add_user(&mut self, tag: impl Into<String>, password: &str, capabilities: CapabilitySet) {
        self.users.insert(tag.into(), (digest(password), capabilities));
    }
}

impl Authenticator for StaticAuthenticator {
    fn authenticate(&self, tag: &str, password: &str) -> Option<Identity> {
        let (expected, capabilities) = self.users.get(tag)?;
        if !bool::from(expected[..].ct_eq(&digest(password)[..])) {
            return None;
        }
        Some(Identity {
            tag: tag.to_string(),
            capabilities: capabilities.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authenticator() -> StaticAuthenticator {
        StaticAuthenticator::from_config(&[UserConfig {
            tag: "user-admin".into(),
            password: "very very secret".into(),
            capabilities: vec!["*".into()],
        }])
        .unwrap()
    }

    #[test]
    fn test_valid_login() {
        let id = authenticator()
            .authenticate("user-admin", "very very secret")
            .unwrap();
        assert_eq!(id.tag, "user-admin");
        assert!(id.capabilities.allows("Ping", "Echo"));
    }

    #[test]
    fn test_bad_credentials() {
        let auth = authenticator();
        assert!(auth.authenticate("user-admin", "wrong").is_none());
        assert!(auth.authenticate("user-nobody", "very very secret").is_none());
    }

    #[test]
    fn test_password_compared_in_full() {
        let auth = authenticator();
        // Same length, prefix, and extension of the stored password.
        assert!(auth.authenticate("user-admin", "very very secreT").is_none());
        assert!(auth.authenticate("user-admin", "very very").is_none());
        assert!(auth.authenticate("user-admin", "very very secret!").is_none());
        assert!(auth.authenticate("user-admin", "").is_none());
    }

    #[test]
    fn test_stored_password_is_digest() {
        let auth = authenticator();
        let (stored, _) = &auth.users["user-admin"];
        assert_eq!(*stored, digest("very very secret"));
        assert_ne!(&stored[..], b"very very secret".as_slice());
    }
}
