//! Capability grants.

use std::collections::HashSet;
use std::str::FromStr;

use thiserror::Error;

/// Error type for malformed capability grants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid capability {grant:?}: expected \"*\", \"<Facade>\" or \"<Facade>.<Method>\"")]
pub struct CapabilityParseError {
    pub grant: String,
}

/// Permission to call some part of the facade surface.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Every facade and method.
    All,
    /// Every method of one facade, any version.
    Facade(String),
    /// One method of one facade, any version.
    Method { facade: String, method: String },
}

impl FromStr for Capability {
    type Err = CapabilityParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CapabilityParseError {
            grant: s.to_string(),
        };
        if s == "*" {
            return Ok(Capability::All);
        }
        if s.is_empty() || s.chars().any(char::is_whitespace) {
            return Err(invalid());
        }
        let parts: Vec<&str> = s.split('.').collect();
        match parts.as_slice() {
            [facade] => Ok(Capability::Facade((*facade).to_string())),
            [facade, method] if !facade.is_empty() && !method.is_empty() => Ok(Capability::Method {
                facade: (*facade).to_string(),
                method: (*method).to_string(),
            }),
            _ => Err(invalid()),
        }
    }
}

/// The capabilities granted to one session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilitySet {
    grants: HashSet<Capability>,
}

impl CapabilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Full access.
    pub fn all() -> Self {
        Self::from_iter([Capability::All])
    }

    /// Parse a list of grants as found in configuration.
    pub fn parse<S: AsRef<str>>(grants: &[S]) -> Result<Self, CapabilityParseError> {
        grants
            .iter()
            .map(|g| g.as_ref().parse::<Capability>())
            .collect()
    }

    /// Whether the set allows any method of `facade`.
    pub fn allows_facade(&self, facade: &str) -> bool {
        self.grants.iter().any(|grant| match grant {
            Capability::All => true,
            Capability::Facade(f) => f == facade,
            Capability::Method { facade: f, .. } => f == facade,
        })
    }

    /// Whether the set allows `facade.method`.
    pub fn allows(&self, facade: &str, method: &str) -> bool {
        self.grants.iter().any(|grant| match grant {
            Capability::All => true,
            Capability::Facade(f) => f == facade,
            Capability::Method {
                facade: f,
                method: m,
            } => f == facade && m == method,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        Self {
            grants: iter.into_iter().collect(),
        }
    }
}
