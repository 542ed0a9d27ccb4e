//! API server subsystem.
//!
//! # Data Flow
//! ```text
//! Listener::accept
//!     → admission (class "connection", keyed by peer IP)
//!     → connection worker (child of the server worker)
//!         → login phase: Admin.Login → admission ("login") → authenticate → Session
//!         → request loop: Dispatcher::dispatch per frame, concurrently
//! ```
//!
//! # Design Decisions
//! - The server worker owns every connection worker; killing the server
//!   tears all sessions down before it reports Dead
//! - Connection failures are logged, never propagated to the server

pub mod api_server;
pub(crate) mod connection;

pub use api_server::{ApiServer, ServerError, ServerState};
