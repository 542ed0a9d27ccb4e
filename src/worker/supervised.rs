//! Supervised worker runtime.
//!
//! # Responsibilities
//! - Run a worker body on the tokio runtime
//! - Turn the body's return value into the worker's outcome
//! - Convert panics into `WorkerError::Panicked`
//! - Publish the outcome only after the body has returned

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use super::error::{WorkerError, WorkerResult};
use super::lifecycle::{Lifecycle, WorkerState};
use super::Worker;
use crate::observability::metrics;

/// Handle to a worker body running under a [`Lifecycle`].
///
/// Cloning the handle does not clone the worker; all clones control the
/// same unit.
#[derive(Debug, Clone)]
pub struct Supervised {
    lifecycle: Arc<Lifecycle>,
}

impl Supervised {
    /// Spawn `body` as a supervised worker.
    ///
    /// The body receives the worker's lifecycle. It is expected to acquire
    /// its resources, wait for [`Lifecycle::dying`], release everything in
    /// reverse order and return `Ok(())`, or return the first fatal error it
    /// hit. The outcome becomes visible to waiters only once the body has
    /// returned.
    pub fn spawn<F, Fut>(name: impl Into<String>, body: F) -> Self
    where
        F: FnOnce(Arc<Lifecycle>) -> Fut,
        Fut: Future<Output = WorkerResult> + Send + 'static,
    {
        let lifecycle = Arc::new(Lifecycle::new(name));
        let run = body(lifecycle.clone());
        let task_lifecycle = lifecycle.clone();

        tokio::spawn(async move {
            let name = task_lifecycle.name().to_string();
            tracing::debug!(worker = %name, "Worker started");

            let result = match AssertUnwindSafe(run).catch_unwind().await {
                Ok(result) => result,
                Err(panic) => Err(WorkerError::Panicked {
                    worker: name.clone(),
                    message: panic_message(panic.as_ref()),
                }),
            };

            match &result {
                Ok(()) => tracing::debug!(worker = %name, "Worker stopped"),
                Err(err) => tracing::warn!(worker = %name, error = %err, "Worker failed"),
            }
            metrics::record_worker_exit(&name, &result);

            if let Err(err) = result {
                task_lifecycle.kill(Some(err));
            }
            task_lifecycle.done();
        });

        Self { lifecycle }
    }

    pub fn name(&self) -> &str {
        self.lifecycle.name()
    }

    pub fn state(&self) -> WorkerState {
        self.lifecycle.state()
    }
}

impl Worker for Supervised {
    fn kill(&self) {
        self.lifecycle.kill(None);
    }

    fn kill_with(&self, reason: WorkerError) {
        self.lifecycle.kill(Some(reason));
    }

    fn wait(&self) -> BoxFuture<'_, WorkerResult> {
        Box::pin(self.lifecycle.wait())
    }

    fn is_alive(&self) -> bool {
        self.lifecycle.is_alive()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
