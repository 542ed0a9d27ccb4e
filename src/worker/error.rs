//! Worker outcome errors.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Error source shared between every reader of a worker outcome.
pub type SharedError = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Result reported by [`Worker::wait`](super::Worker::wait).
///
/// `Ok(())` means the worker stopped because it was asked to, or because its
/// work was complete. It never carries a "was killed" sentinel.
pub type WorkerResult = Result<(), WorkerError>;

/// Fatal outcome of a supervised worker.
///
/// Cloneable so that any number of concurrent waiters observe the same value.
#[derive(Debug, Clone, Error)]
pub enum WorkerError {
    /// A resource could not be acquired; the worker never became active.
    #[error("{worker}: setup failed: {source}")]
    Setup {
        worker: String,
        #[source]
        source: SharedError,
    },

    /// A resource failed asynchronously while the worker was active.
    #[error("{worker}: {source}")]
    Runtime {
        worker: String,
        #[source]
        source: SharedError,
    },

    /// A deadline layered on top of the worker expired.
    #[error("{worker}: timed out after {timeout:?}")]
    Timeout { worker: String, timeout: Duration },

    /// The worker body panicked.
    #[error("{worker}: panicked: {message}")]
    Panicked { worker: String, message: String },

    /// Killed by a caller that supplied its own reason.
    #[error("killed: {reason}")]
    Killed { reason: String },
}

impl WorkerError {
    pub fn setup<E>(worker: impl Into<String>, err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        WorkerError::Setup {
            worker: worker.into(),
            source: Arc::new(err),
        }
    }

    pub fn runtime<E>(worker: impl Into<String>, err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        WorkerError::Runtime {
            worker: worker.into(),
            source: Arc::new(err),
        }
    }

    pub fn killed(reason: impl Into<String>) -> Self {
        WorkerError::Killed {
            reason: reason.into(),
        }
    }

    /// Returns a short stable label for logs and metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            WorkerError::Setup { .. } => "setup_failure",
            WorkerError::Runtime { .. } => "runtime_fault",
            WorkerError::Timeout { .. } => "timeout",
            WorkerError::Panicked { .. } => "panicked",
            WorkerError::Killed { .. } => "killed",
        }
    }

    /// Whether `other` is the same failure as `self`.
    ///
    /// Shared sources compare by identity, so an error that travelled through
    /// a group or a lifecycle slot still matches the value originally raised.
    pub fn same_as(&self, other: &WorkerError) -> bool {
        match (self, other) {
            (WorkerError::Setup { source: a, .. }, WorkerError::Setup { source: b, .. })
            | (WorkerError::Runtime { source: a, .. }, WorkerError::Runtime { source: b, .. }) => {
                Arc::ptr_eq(a, b)
            }
            _ => self.as_label() == other.as_label() && self.to_string() == other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_error_display() {
        let err = WorkerError::setup("storage", io::Error::new(io::ErrorKind::AddrInUse, "in use"));
        assert_eq!(err.to_string(), "storage: setup failed: in use");
        assert_eq!(err.as_label(), "setup_failure");

        let err = WorkerError::Timeout {
            worker: "api".into(),
            timeout: Duration::from_secs(2),
        };
        assert!(err.to_string().contains("2s"));
    }

    #[test]
    fn test_same_as_follows_clones() {
        let err = WorkerError::runtime("pool", io::Error::other("boom"));
        let copy = err.clone();
        assert!(err.same_as(&copy));

        let lookalike = WorkerError::runtime("pool", io::Error::other("boom"));
        assert!(!err.same_as(&lookalike));
    }
}
