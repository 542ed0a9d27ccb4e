//! Server-side facade registry and dispatch.
//!
//! # Data Flow
//! ```text
//! Request {facade, version, method, params}
//!     → registry.rs (name → version → method table)
//!     → dispatch.rs (resolution order + capability check)
//!     → typed handler (params decoded, result encoded)
//!     → Response {result | error}
//! ```

pub mod dispatch;
pub mod registry;

pub use dispatch::Dispatcher;
pub use registry::{CallContext, FacadeRegistry, FacadeSpec, Handler, RegistryBuilder, RegistryError};
