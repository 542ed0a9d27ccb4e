//! Caller-side termination disciplines.
//!
//! Both disciplines kill the worker and wait a bounded time for it to die.
//! They differ only in how the outcome is judged:
//! - `clean_kill`: any error outcome is a failure
//! - `dirty_kill`: the outcome is returned for inspection, never judged

use std::time::Duration;

use thiserror::Error;

use super::error::{WorkerError, WorkerResult};
use super::Worker;

/// Failure of a termination discipline.
#[derive(Debug, Error)]
pub enum TerminationError {
    /// The worker was still alive when the bound expired.
    #[error("worker did not stop within {0:?}")]
    StillAlive(Duration),

    /// The worker stopped, but with an error.
    #[error("worker stopped with error: {0}")]
    Failed(#[source] WorkerError),
}

/// Kill `worker` and require a clean stop within `within`.
pub async fn clean_kill<W>(worker: &W, within: Duration) -> Result<(), TerminationError>
where
    W: Worker + ?Sized,
{
    dirty_kill(worker, within)
        .await?
        .map_err(TerminationError::Failed)
}

/// Kill `worker` and wait up to `within`, tolerating any outcome.
pub async fn dirty_kill<W>(worker: &W, within: Duration) -> Result<WorkerResult, TerminationError>
where
    W: Worker + ?Sized,
{
    worker.kill();
    tokio::time::timeout(within, worker.wait())
        .await
        .map_err(|_| TerminationError::StillAlive(within))
}
