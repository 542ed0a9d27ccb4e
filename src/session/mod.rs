//! Connection sessions.
//!
//! # Lifecycle
//! ```text
//! connection accepted → Admin.Login admitted → authenticate → Session
//! Session dropped when the connection closes or the server is killed
//! ```
//!
//! A session is owned by its connection worker and never outlives it.

pub mod auth;
pub mod capability;

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use uuid::Uuid;

pub use auth::{Authenticator, Identity, StaticAuthenticator};
pub use capability::{Capability, CapabilityParseError, CapabilitySet};

/// Unique identifier for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Authenticated per-connection context.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    identity: Identity,
    versions: Mutex<HashMap<String, u32>>,
}

impl Session {
    pub fn new(identity: Identity) -> Self {
        Self {
            id: SessionId::new(),
            identity,
            versions: Mutex::new(HashMap::new()),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Entity tag of the caller.
    pub fn tag(&self) -> &str {
        &self.identity.tag
    }

    pub fn capabilities(&self) -> &CapabilitySet {
        &self.identity.capabilities
    }

    /// Record the version a facade was first called at.
    ///
    /// Returns the version negotiated for this session, which stays the
    /// first one used.
    pub fn negotiate(&self, facade: &str, version: u32) -> u32 {
        let mut versions = self.versions.lock().unwrap_or_else(PoisonError::into_inner);
        *versions.entry(facade.to_string()).or_insert(version)
    }

    /// Version negotiated for `facade`, if it has been called.
    pub fn negotiated_version(&self, facade: &str) -> Option<u32> {
        self.versions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(facade)
            .copied()
    }
}
