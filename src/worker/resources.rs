//! Scoped resource acquisition with ordered release.
//!
//! Resources are pushed as they are acquired and released most recent
//! first. A stack dropped without `release()` (an early `?` return during
//! setup) still drops every captured resource in reverse order.

use std::future::Future;

use futures_util::future::BoxFuture;

use super::error::{SharedError, WorkerError, WorkerResult};

type ReleaseFn = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), SharedError>> + Send>;

struct Entry {
    name: String,
    release: ReleaseFn,
}

/// Ordered set of resources owned by one worker.
pub struct ResourceStack {
    owner: String,
    entries: Vec<Entry>,
}

impl ResourceStack {
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            entries: Vec::new(),
        }
    }

    /// Register a resource together with its release action.
    pub fn push<F, Fut>(&mut self, name: impl Into<String>, release: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), SharedError>> + Send + 'static,
    {
        let name = name.into();
        tracing::trace!(worker = %self.owner, resource = %name, "Resource acquired");
        self.entries.push(Entry {
            name,
            release: Box::new(move || Box::pin(release())),
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Release every resource, most recently acquired first.
    ///
    /// All resources are released even if one fails; the first failure is
    /// returned as a runtime fault of the owner.
    pub async fn release(mut self) -> WorkerResult {
        let mut first_error = None;
        while let Some(entry) = self.entries.pop() {
            tracing::debug!(worker = %self.owner, resource = %entry.name, "Releasing resource");
            if let Err(source) = (entry.release)().await {
                tracing::warn!(
                    worker = %self.owner,
                    resource = %entry.name,
                    error = %source,
                    "Resource release failed"
                );
                if first_error.is_none() {
                    first_error = Some(WorkerError::Runtime {
                        worker: self.owner.clone(),
                        source,
                    });
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl Drop for ResourceStack {
    fn drop(&mut self) {
        while let Some(entry) = self.entries.pop() {
            tracing::debug!(worker = %self.owner, resource = %entry.name, "Dropping unreleased resource");
            drop(entry);
        }
    }
}
