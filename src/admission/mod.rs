//! Admission control subsystem.
//!
//! # Data Flow
//! ```text
//! New TCP connection:
//!     → try_admit_from("connection", peer ip)
//!     → rejected: one AdmissionRejected frame, close (no auth work)
//! Login frame:
//!     → try_admit("login")
//!     → rejected: AdmissionRejected error, connection stays unauthenticated
//!     → admitted: authenticate → session
//! ```
//!
//! # Design Decisions
//! - Budgets are per caller class, with an optional per-key split
//! - Never blocks, never queues: a rejection is immediate
//! - Token accounting is a single atomic per bucket (no lock on the hot path)
//! - Established sessions' RPC traffic is not charged here

pub mod controller;
pub mod rate_limit;

pub use controller::{AdmissionConfigError, AdmissionController};
pub use rate_limit::TokenBucket;

/// Class charged for every accepted TCP connection, keyed by peer IP.
pub const CONNECTION_CLASS: &str = "connection";

/// Class charged for every login attempt.
pub const LOGIN_CLASS: &str = "login";
