//! Supervised worker kernel.
//!
//! # Data Flow
//! ```text
//! Supervised::spawn(body)
//!     → body acquires resources (ResourceStack)
//!     → body awaits Lifecycle::dying()
//!     → body releases resources, most recent first
//!     → body returns Ok(()) or its first fatal error
//!     → Lifecycle::done() publishes the outcome
//!     → every Worker::wait() caller receives it
//!
//! GroupBuilder::add(..).start()
//!     → children run independently
//!     → one child error ⇒ kill all siblings
//!     → outcome = first child error in registration order
//! ```
//!
//! # Design Decisions
//! - Requested shutdown reports `Ok(())`; only real faults are errors
//! - Workers are polymorphic only over kill/wait (`Worker` trait)
//! - Timeouts live outside the kernel (`deadline`)
//! - Clean vs. dirty termination is caller policy (`termination`)

pub mod deadline;
pub mod error;
pub mod group;
pub mod lifecycle;
pub mod resources;
pub mod supervised;
pub mod termination;

use std::sync::Arc;

use futures_util::future::BoxFuture;

pub use deadline::with_deadline;
pub use error::{SharedError, WorkerError, WorkerResult};
pub use group::GroupBuilder;
pub use lifecycle::{Lifecycle, WorkerState};
pub use resources::ResourceStack;
pub use supervised::Supervised;
pub use termination::{clean_kill, dirty_kill, TerminationError};

/// A unit of long-running concurrent execution with a kill/wait lifecycle.
pub trait Worker: Send + Sync {
    /// Request termination. Fire-and-forget, idempotent.
    fn kill(&self);

    /// Request termination, recording `reason` as the outcome unless an
    /// earlier reason was already recorded.
    fn kill_with(&self, reason: WorkerError);

    /// Wait for the worker to stop and return its outcome.
    fn wait(&self) -> BoxFuture<'_, WorkerResult>;

    /// Whether the worker has not yet published its outcome.
    fn is_alive(&self) -> bool;
}

impl<W: Worker + ?Sized> Worker for Arc<W> {
    fn kill(&self) {
        (**self).kill()
    }

    fn kill_with(&self, reason: WorkerError) {
        (**self).kill_with(reason)
    }

    fn wait(&self) -> BoxFuture<'_, WorkerResult> {
        (**self).wait()
    }

    fn is_alive(&self) -> bool {
        (**self).is_alive()
    }
}
