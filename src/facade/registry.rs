//! Facade registration.
//!
//! # Design Decisions
//! - Handlers are registered explicitly per method with a typed signature
//! - Parameters are decoded before the handler runs; a decode failure is a
//!   `bad-request` error and the handler never sees it
//! - Duplicate (name, version) pairs are rejected while building, never at
//!   dispatch time

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::rpc::{FacadeVersions, RpcError};
use crate::session::{CapabilitySet, Session};

/// Context handed to every handler invocation.
#[derive(Debug, Clone)]
pub struct CallContext {
    /// Session the call arrived on.
    pub session: Arc<Session>,
    /// Correlation id of the request.
    pub request_id: u64,
}

/// Type-erased method handler.
pub type Handler = Arc<dyn Fn(CallContext, Value) -> BoxFuture<'static, Result<Value, RpcError>> + Send + Sync>;

/// Error type for registry construction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("facade {name}({version}) registered twice")]
    DuplicateFacade { name: String, version: u32 },

    #[error("method {facade}({version}).{method} registered twice")]
    DuplicateMethod {
        facade: String,
        version: u32,
        method: String,
    },
}

/// One version of one facade, as registered.
pub struct FacadeSpec {
    name: String,
    version: u32,
    methods: HashMap<String, Handler>,
    duplicate_methods: Vec<String>,
}

impl FacadeSpec {
    pub fn new(name: impl Into<String>, version: u32) -> Self {
        Self {
            name: name.into(),
            version,
            methods: HashMap::new(),
            duplicate_methods: Vec::new(),
        }
    }

    /// Register a method with a typed handler.
    pub fn method<P, R, F, Fut>(mut self, name: &str, handler: F) -> Self
    where
        P: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        F: Fn(CallContext, P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, RpcError>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let erased: Handler = Arc::new(move |ctx: CallContext, params: Value| -> BoxFuture<'static, Result<Value, RpcError>> {
            let handler = Arc::clone(&handler);
            Box::pin(async move {
                let params: P = serde_json::from_value(params)
                    .map_err(|e| RpcError::bad_request(format!("invalid params: {e}")))?;
                let result = handler(ctx, params).await?;
                serde_json::to_value(result)
                    .map_err(|e| RpcError::internal(format!("cannot encode result: {e}")))
            })
        });

        if self.methods.insert(name.to_string(), erased).is_some() {
            self.duplicate_methods.push(name.to_string());
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> u32 {
        self.version
    }
}

/// Builds an immutable [`FacadeRegistry`].
#[derive(Default)]
pub struct RegistryBuilder {
    facades: HashMap<String, BTreeMap<u32, HashMap<String, Handler>>>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, spec: FacadeSpec) -> Result<Self, RegistryError> {
        if let Some(method) = spec.duplicate_methods.into_iter().next() {
            return Err(RegistryError::DuplicateMethod {
                facade: spec.name,
                version: spec.version,
                method,
            });
        }

        let versions = self.facades.entry(spec.name.clone()).or_default();
        if versions.contains_key(&spec.version) {
            return Err(RegistryError::DuplicateFacade {
                name: spec.name,
                version: spec.version,
            });
        }
        tracing::debug!(
            facade = %spec.name,
            version = spec.version,
            methods = spec.methods.len(),
            "Facade registered"
        );
        versions.insert(spec.version, spec.methods);
        Ok(self)
    }

    pub fn build(self) -> FacadeRegistry {
        FacadeRegistry {
            facades: self.facades,
        }
    }
}

/// Result of resolving a facade name and version.
pub(crate) enum Resolved<'a> {
    UnknownFacade,
    UnknownVersion,
    Found(&'a HashMap<String, Handler>),
}

/// Immutable table of (facade name, version) → method handlers.
pub struct FacadeRegistry {
    facades: HashMap<String, BTreeMap<u32, HashMap<String, Handler>>>,
}

impl FacadeRegistry {
    pub(crate) fn resolve(&self, facade: &str, version: u32) -> Resolved<'_> {
        match self.facades.get(facade) {
            None => Resolved::UnknownFacade,
            Some(versions) => match versions.get(&version) {
                None => Resolved::UnknownVersion,
                Some(methods) => Resolved::Found(methods),
            },
        }
    }

    /// Registered versions of `facade`, ascending.
    pub fn versions(&self, facade: &str) -> Vec<u32> {
        self.facades
            .get(facade)
            .map(|versions| versions.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Facades (and their versions) that `capabilities` may call, by name.
    pub fn available_to(&self, capabilities: &CapabilitySet) -> Vec<FacadeVersions> {
        let mut list: Vec<FacadeVersions> = self
            .facades
            .iter()
            .filter(|(name, _)| capabilities.allows_facade(name))
            .map(|(name, versions)| FacadeVersions {
                name: name.clone(),
                versions: versions.keys().copied().collect(),
            })
            .collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        list
    }

    pub fn len(&self) -> usize {
        self.facades.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.facades.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo(version: u32) -> FacadeSpec {
        FacadeSpec::new("Ping", version)
            .method("Echo", |_ctx, text: String| async move { Ok::<_, RpcError>(text) })
    }

    #[test]
    fn test_duplicate_facade_rejected() {
        let err = RegistryBuilder::new()
            .register(echo(1))
            .unwrap()
            .register(echo(1))
            .err()
            .unwrap();
        assert_eq!(
            err,
            RegistryError::DuplicateFacade {
                name: "Ping".into(),
                version: 1
            }
        );
    }

    #[test]
    fn test_duplicate_method_rejected() {
        let spec = echo(1).method("Echo", |_ctx, (): ()| async move { Ok::<_, RpcError>(()) });
        let err = RegistryBuilder::new().register(spec).err().unwrap();
        assert!(matches!(err, RegistryError::DuplicateMethod { ref method, .. } if method == "Echo"));
    }

    #[test]
    fn test_versions_listed_per_capability() {
        let registry = RegistryBuilder::new()
            .register(echo(2))
            .unwrap()
            .register(echo(1))
            .unwrap()
            .register(FacadeSpec::new("Secret", 1))
            .unwrap()
            .build();

        assert_eq!(registry.versions("Ping"), vec![1, 2]);
        assert_eq!(registry.len(), 3);

        let ping_only = CapabilitySet::parse(&["Ping.Echo"]).unwrap();
        assert_eq!(
            registry.available_to(&ping_only),
            vec![FacadeVersions {
                name: "Ping".into(),
                versions: vec![1, 2]
            }]
        );
        assert_eq!(registry.available_to(&CapabilitySet::all()).len(), 2);
    }
}
