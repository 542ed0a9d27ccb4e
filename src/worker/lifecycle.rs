//! Lifecycle signal shared between a supervised unit and its owner.
//!
//! # States
//! ```text
//! Active → Dying: kill() called (by owner or by the unit itself)
//! Dying  → Dead:  done() called once every owned resource is released
//! ```
//!
//! # Design Decisions
//! - The kill flag is a `CancellationToken`: fires once, wakes every waiter
//! - The outcome is a write-once watch slot: readers block until `done()`
//! - The first non-`None` kill reason wins; `None` never erases a reason

use std::sync::{Mutex, PoisonError};
use tokio::sync::watch;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use super::error::{WorkerError, WorkerResult};

/// Observable state of a supervised unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Running; no kill requested yet.
    Active,
    /// Kill requested; resources are being released.
    Dying,
    /// Fully stopped; the outcome is published.
    Dead,
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerState::Active => write!(f, "active"),
            WorkerState::Dying => write!(f, "dying"),
            WorkerState::Dead => write!(f, "dead"),
        }
    }
}

/// Kill request + final outcome for one supervised unit.
#[derive(Debug)]
pub struct Lifecycle {
    name: String,
    dying: CancellationToken,
    reason: Mutex<Option<WorkerError>>,
    outcome: watch::Sender<Option<WorkerResult>>,
}

impl Lifecycle {
    pub fn new(name: impl Into<String>) -> Self {
        let (outcome, _) = watch::channel(None);
        Self {
            name: name.into(),
            dying: CancellationToken::new(),
            reason: Mutex::new(None),
            outcome,
        }
    }

    /// Name of the unit, for logging.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Request termination. Idempotent and never blocks.
    pub fn kill(&self, reason: Option<WorkerError>) {
        if let Some(err) = reason {
            let mut slot = self.reason.lock().unwrap_or_else(PoisonError::into_inner);
            if slot.is_none() {
                tracing::debug!(worker = %self.name, error = %err, "Kill reason recorded");
                *slot = Some(err);
            }
        }
        if !self.dying.is_cancelled() {
            tracing::trace!(worker = %self.name, "Kill requested");
            self.dying.cancel();
        }
    }

    /// Resolves once `kill` has been called.
    pub fn dying(&self) -> WaitForCancellationFuture<'_> {
        self.dying.cancelled()
    }

    /// Non-blocking check for a pending kill request.
    ///
    /// Setup code calls this between resource acquisitions.
    pub fn is_dying(&self) -> bool {
        self.dying.is_cancelled()
    }

    /// Publish the final outcome. Only the first call has an effect.
    pub fn done(&self) {
        self.dying.cancel();
        let outcome = match self
            .reason
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
        {
            Some(err) => Err(err),
            None => Ok(()),
        };
        self.outcome.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(outcome);
            true
        });
    }

    /// Block until `done` has been called and return the published outcome.
    pub async fn wait(&self) -> WorkerResult {
        let mut rx = self.outcome.subscribe();
        let published = match rx.wait_for(Option::is_some).await {
            Ok(slot) => slot.clone(),
            Err(_) => None,
        };
        published.unwrap_or_else(|| self.recorded_outcome())
    }

    /// Current state, without blocking.
    pub fn state(&self) -> WorkerState {
        if self.outcome.borrow().is_some() {
            WorkerState::Dead
        } else if self.dying.is_cancelled() {
            WorkerState::Dying
        } else {
            WorkerState::Active
        }
    }

    pub fn is_alive(&self) -> bool {
        self.state() != WorkerState::Dead
    }

    fn recorded_outcome(&self) -> WorkerResult {
        match self
            .reason
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
        {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
