//! Deadlines layered on top of the kernel.
//!
//! The kernel itself waits indefinitely. A deadline watches a worker and,
//! if it is still alive when the timeout expires, kills it with
//! `WorkerError::Timeout`.

use std::sync::Arc;
use std::time::Duration;

use super::error::WorkerError;
use super::supervised::Supervised;
use super::Worker;

/// Kill `worker` with a timeout error unless it dies within `timeout`.
///
/// The watcher is itself a supervised worker; killing it cancels the
/// deadline without touching the watched worker.
pub fn with_deadline(name: impl Into<String>, worker: Arc<dyn Worker>, timeout: Duration) -> Supervised {
    let name = name.into();
    let watcher = format!("deadline:{name}");
    Supervised::spawn(watcher, move |lifecycle| async move {
        tokio::select! {
            _ = worker.wait() => {}
            _ = lifecycle.dying() => {}
            _ = tokio::time::sleep(timeout) => {
                tracing::warn!(worker = %name, timeout = ?timeout, "Deadline expired, killing worker");
                worker.kill_with(WorkerError::Timeout { worker: name, timeout });
            }
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stuck() -> Supervised {
        Supervised::spawn("stuck", |lc| async move {
            lc.dying().await;
            Ok(())
        })
    }

    #[tokio::test]
    async fn test_deadline_kills_with_timeout() {
        let worker = stuck();
        let _deadline = with_deadline("stuck", Arc::new(worker.clone()), Duration::from_millis(20));

        let err = worker.wait().await.unwrap_err();
        assert!(matches!(err, WorkerError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_cancelled_deadline_leaves_worker_alone() {
        let worker = stuck();
        let deadline = with_deadline("stuck", Arc::new(worker.clone()), Duration::from_millis(20));
        deadline.kill();
        deadline.wait().await.unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(worker.is_alive());

        worker.kill();
        assert!(worker.wait().await.is_ok());
    }
}
