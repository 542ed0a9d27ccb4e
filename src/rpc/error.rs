//! Structured RPC errors carried on the wire.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Kind of a structured RPC error.
///
/// Serialized as a kebab-case string. Kinds this build does not know are
/// kept verbatim in `Other` so they survive a round trip unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ErrorCode {
    /// No facade with the requested name.
    NotFound,
    /// Known facade, unknown version.
    NotSupported,
    /// The session lacks the capability for this call.
    Unauthorized,
    /// Known facade and version, unknown method.
    NotImplemented,
    /// Malformed request or parameters.
    BadRequest,
    /// An admission budget is exhausted.
    AdmissionRejected,
    /// A call was made before login completed.
    LoginRequired,
    /// Handler failed without a more specific kind.
    Internal,
    /// Handler-defined kind.
    Other(String),
}

impl ErrorCode {
    pub fn as_str(&self) -> &str {
        match self {
            ErrorCode::NotFound => "not-found",
            ErrorCode::NotSupported => "not-supported",
            ErrorCode::Unauthorized => "unauthorized",
            ErrorCode::NotImplemented => "not-implemented",
            ErrorCode::BadRequest => "bad-request",
            ErrorCode::AdmissionRejected => "admission-rejected",
            ErrorCode::LoginRequired => "login-required",
            ErrorCode::Internal => "internal",
            ErrorCode::Other(kind) => kind,
        }
    }
}

impl From<String> for ErrorCode {
    fn from(kind: String) -> Self {
        match kind.as_str() {
            "not-found" => ErrorCode::NotFound,
            "not-supported" => ErrorCode::NotSupported,
            "unauthorized" => ErrorCode::Unauthorized,
            "not-implemented" => ErrorCode::NotImplemented,
            "bad-request" => ErrorCode::BadRequest,
            "admission-rejected" => ErrorCode::AdmissionRejected,
            "login-required" => ErrorCode::LoginRequired,
            "internal" => ErrorCode::Internal,
            _ => ErrorCode::Other(kind),
        }
    }
}

impl From<ErrorCode> for String {
    fn from(code: ErrorCode) -> Self {
        match code {
            ErrorCode::Other(kind) => kind,
            known => known.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured error returned in place of a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{message} ({kind})")]
pub struct RpcError {
    pub kind: ErrorCode,
    pub message: String,
}

impl RpcError {
    pub fn new(kind: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn not_supported(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotSupported, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadRequest, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }

    /// Protocol errors are resolution failures reported to the caller; they
    /// never affect the connection.
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self.kind,
            ErrorCode::NotFound
                | ErrorCode::NotSupported
                | ErrorCode::Unauthorized
                | ErrorCode::NotImplemented
                | ErrorCode::BadRequest
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_serializes_kebab_case() {
        let err = RpcError::not_supported("Ping(7) not supported");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "not-supported");
        assert_eq!(err.to_string(), "Ping(7) not supported (not-supported)");
    }

    #[test]
    fn test_unknown_kind_is_preserved() {
        let err: RpcError =
            serde_json::from_str(r#"{"kind":"quota-exceeded","message":"too many offers"}"#).unwrap();
        assert_eq!(err.kind, ErrorCode::Other("quota-exceeded".into()));
        assert_eq!(serde_json::to_value(&err).unwrap()["kind"], "quota-exceeded");
        assert!(!err.is_protocol_error());
    }
}
