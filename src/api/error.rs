//! Client-side error type.

use thiserror::Error;

use crate::rpc::{CodecError, ErrorCode, RpcError};

/// Error type for client API calls.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Failed to reach the server.
    #[error("Failed to connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// Transport or framing failure.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The server answered with a structured error.
    #[error("Remote error: {0}")]
    Remote(#[from] RpcError),

    /// The connection closed before a response arrived.
    #[error("Connection closed")]
    ConnectionClosed,

    /// The server offers no version of the facade this client can speak.
    #[error("No compatible version of facade {facade:?}")]
    NoCompatibleVersion { facade: String },

    /// Parameters could not be encoded.
    #[error("Failed to encode parameters: {0}")]
    Encode(#[source] serde_json::Error),

    /// The result did not have the expected shape.
    #[error("Failed to decode result: {0}")]
    Decode(#[source] serde_json::Error),
}

impl ApiError {
    /// Kind of the remote error, if the server produced one.
    pub fn remote_kind(&self) -> Option<&ErrorCode> {
        match self {
            ApiError::Remote(err) => Some(&err.kind),
            _ => None,
        }
    }
}
