//! `Ping` facade: liveness and round-trip checks.

use crate::facade::{CallContext, FacadeSpec};
use crate::rpc::RpcError;

pub const PING_FACADE: &str = "Ping";

/// `Ping` v1: `Echo(text) -> text`, `Ping() -> null`.
pub fn ping_v1() -> FacadeSpec {
    FacadeSpec::new(PING_FACADE, 1)
        .method("Echo", |_ctx: CallContext, text: String| async move { Ok::<_, RpcError>(text) })
        .method("Ping", |ctx: CallContext, (): ()| async move {
            tracing::trace!(tag = %ctx.session.tag(), request_id = ctx.request_id, "Ping");
            Ok::<_, RpcError>(())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facade::{Dispatcher, RegistryBuilder};
    use crate::rpc::Request;
    use crate::session::{CapabilitySet, Identity, Session};
    use serde_json::{json, Value};
    use std::sync::Arc;

    fn dispatcher() -> Dispatcher {
        let registry = RegistryBuilder::new().register(ping_v1()).unwrap().build();
        Dispatcher::new(Arc::new(registry))
    }

    fn session() -> Arc<Session> {
        Arc::new(Session::new(Identity {
            tag: "user-admin".into(),
            capabilities: CapabilitySet::all(),
        }))
    }

    fn request(method: &str, params: Value) -> Request {
        Request {
            id: 1,
            facade: PING_FACADE.into(),
            version: 1,
            method: method.into(),
            params,
        }
    }

    #[tokio::test]
    async fn test_echo_returns_text() {
        let response = dispatcher().dispatch(session(), request("Echo", json!("hello"))).await;
        assert_eq!(response.into_result().unwrap(), json!("hello"));
    }

    #[tokio::test]
    async fn test_ping_returns_null() {
        let response = dispatcher().dispatch(session(), request("Ping", Value::Null)).await;
        assert_eq!(response.into_result().unwrap(), Value::Null);
    }
}
