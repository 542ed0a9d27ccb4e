//! RPC wire layer.
//!
//! # Data Flow
//! ```text
//! Request  {id, facade, version, method, params}  ──▶  server
//! Response {id, result} | {id, error: {kind, message}}  ◀──  server
//! ```
//!
//! # Design Decisions
//! - One JSON value per line over a plain TCP stream
//! - The correlation id round-trips unmodified
//! - Error kinds are open-ended strings so handler kinds survive transit

pub mod codec;
pub mod error;
pub mod message;

pub use codec::{CodecError, FrameReader, FrameWriter};
pub use error::{ErrorCode, RpcError};
pub use message::{FacadeVersions, LoginRequest, LoginResult, Request, Response};
