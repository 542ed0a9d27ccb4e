//! Worker groups: fail-fast composition of supervised workers.
//!
//! # Rules
//! - Killing the group kills every child (no ordering between siblings)
//! - A child failing with an error kills every sibling
//! - The group is dead only once every child is dead
//! - The outcome is the first child error in registration order

use std::sync::Arc;

use futures_util::future::join_all;

use super::error::WorkerResult;
use super::lifecycle::Lifecycle;
use super::supervised::Supervised;
use super::Worker;

struct Child {
    name: String,
    worker: Arc<dyn Worker>,
}

/// Collects the children of a group before it starts.
pub struct GroupBuilder {
    name: String,
    children: Vec<Child>,
}

impl GroupBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            children: Vec::new(),
        }
    }

    /// Add a child. Registration order decides which error the group reports.
    pub fn add<W>(mut self, name: impl Into<String>, worker: W) -> Self
    where
        W: Worker + 'static,
    {
        self.children.push(Child {
            name: name.into(),
            worker: Arc::new(worker),
        });
        self
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Start supervising the children as one worker.
    pub fn start(self) -> Supervised {
        let children: Arc<[Child]> = self.children.into();
        Supervised::spawn(self.name, move |lifecycle| run_group(lifecycle, children))
    }
}

async fn run_group(lifecycle: Arc<Lifecycle>, children: Arc<[Child]>) -> WorkerResult {
    tracing::debug!(group = %lifecycle.name(), children = children.len(), "Group started");

    let waits = join_all(children.iter().map(|child| {
        let lifecycle = &lifecycle;
        async move {
            let result = child.worker.wait().await;
            if let Err(err) = &result {
                tracing::warn!(
                    group = %lifecycle.name(),
                    child = %child.name,
                    error = %err,
                    "Child failed, stopping siblings"
                );
                lifecycle.kill(None);
            }
            result
        }
    }));
    tokio::pin!(waits);

    let results = tokio::select! {
        results = &mut waits => results,
        _ = lifecycle.dying() => {
            for child in children.iter() {
                child.worker.kill();
            }
            waits.await
        }
    };

    results.into_iter().find_map(Result::err).map_or(Ok(()), Err)
}
