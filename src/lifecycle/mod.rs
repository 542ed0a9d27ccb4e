//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Config snapshot → facade registry → server state
//!         → API server worker + storage worker → controller group
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT/SIGQUIT → caller kills the controller
//!
//! Shutdown:
//!     controller.kill() → group kills every child
//!         → API server kills its connections, then closes its listener
//!         → storage closes shared listener, then storage listener
//!         → controller.wait() returns the first child error, if any
//! ```
//!
//! # Design Decisions
//! - Fail fast: a construction error is returned before any worker runs
//! - A child dying with an error takes the whole controller down
//! - Shutdown is bounded by the caller (`clean_kill`), not here

pub mod signals;
pub mod startup;

pub use signals::wait_for_shutdown_signal;
pub use startup::{start_controller, Controller, StartupError};
