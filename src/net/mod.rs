//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → API server admission check
//!     → connection.rs (id, owned connection worker, live count)
//! ```
//!
//! # Design Decisions
//! - A semaphore permit per connection caps concurrent sockets
//! - Every connection worker is owned so shutdown can kill and await it

pub mod connection;
pub mod listener;

pub use connection::{ConnectionCount, ConnectionId, ConnectionSet};
pub use listener::{ConnectionPermit, Listener, ListenerError};
