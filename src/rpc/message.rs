//! Wire messages.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::{ErrorCode, RpcError};

/// Facade that carries the login exchange.
pub const ADMIN_FACADE: &str = "Admin";
/// Version of the login exchange.
pub const ADMIN_VERSION: u32 = 3;
/// Login method name.
pub const LOGIN_METHOD: &str = "Login";

/// A facade call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Correlation id, echoed unchanged in the response.
    pub id: u64,
    pub facade: String,
    pub version: u32,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// Reply to a [`Request`]: exactly one of `result` or `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl Response {
    pub fn ok(id: u64, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn err(id: u64, error: RpcError) -> Self {
        Self {
            id,
            result: None,
            error: Some(error),
        }
    }

    pub fn from_result(id: u64, result: Result<Value, RpcError>) -> Self {
        match result {
            Ok(value) => Self::ok(id, value),
            Err(error) => Self::err(id, error),
        }
    }

    /// Split into the call outcome.
    ///
    /// A `null` result deserializes as an absent one, so a response without
    /// an error is a success carrying `Value::Null` at worst. A response with
    /// both fields set is malformed.
    pub fn into_result(self) -> Result<Value, RpcError> {
        match (self.result, self.error) {
            (Some(_), Some(_)) => Err(RpcError::new(
                ErrorCode::BadRequest,
                "response carries both result and error",
            )),
            (_, Some(error)) => Err(error),
            (result, None) => Ok(result.unwrap_or(Value::Null)),
        }
    }
}

/// Parameters of `Admin.Login`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub tag: String,
    pub password: String,
}

/// Versions of one facade available to a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacadeVersions {
    pub name: String,
    pub versions: Vec<u32>,
}

/// Result of `Admin.Login`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResult {
    pub tag: String,
    pub session_id: String,
    pub facades: Vec<FacadeVersions>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_response_shapes() {
        let ok = serde_json::to_value(Response::ok(7, json!("hello"))).unwrap();
        assert_eq!(ok, json!({"id": 7, "result": "hello"}));

        let err = serde_json::to_value(Response::err(8, RpcError::not_found("no facade"))).unwrap();
        assert_eq!(
            err,
            json!({"id": 8, "error": {"kind": "not-found", "message": "no facade"}})
        );
    }

    #[test]
    fn test_null_result_is_success() {
        let resp: Response = serde_json::from_str(r#"{"id":1,"result":null}"#).unwrap();
        assert_eq!(resp.into_result().unwrap(), Value::Null);
    }

    #[test]
    fn test_both_fields_is_malformed() {
        let resp: Response = serde_json::from_value(json!({
            "id": 1,
            "result": 1,
            "error": {"kind": "internal", "message": "x"}
        }))
        .unwrap();
        assert_eq!(resp.into_result().unwrap_err().kind, ErrorCode::BadRequest);
    }

    #[test]
    fn test_request_params_default_to_null() {
        let req: Request =
            serde_json::from_str(r#"{"id":3,"facade":"Ping","version":1,"method":"Ping"}"#).unwrap();
        assert_eq!(req.params, Value::Null);
    }
}
