//! Request dispatch against the facade registry.
//!
//! # Resolution Order
//! ```text
//! facade name unknown            → not-found
//! version unknown for the facade → not-supported
//! session lacks the capability   → unauthorized   (handler never runs)
//! method unknown                 → not-implemented
//! params do not decode           → bad-request
//! otherwise                      → handler result / handler error
//! ```

use std::sync::Arc;
use std::time::Instant;

use crate::facade::registry::{CallContext, FacadeRegistry, Resolved};
use crate::observability::metrics;
use crate::rpc::{ErrorCode, Request, Response, RpcError};
use crate::session::Session;

/// Resolves requests and invokes handlers under a session.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<FacadeRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<FacadeRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &FacadeRegistry {
        &self.registry
    }

    /// Dispatch one request. Always produces a response for `request.id`.
    pub async fn dispatch(&self, session: Arc<Session>, request: Request) -> Response {
        let start = Instant::now();
        let Request {
            id,
            facade,
            version,
            method,
            params,
        } = request;

        let handler = match self.registry.resolve(&facade, version) {
            Resolved::UnknownFacade => Err(RpcError::not_found(format!("unknown facade {facade:?}"))),
            Resolved::UnknownVersion => Err(RpcError::not_supported(format!(
                "facade {facade:?} does not support version {version}"
            ))),
            Resolved::Found(methods) => {
                if !session.capabilities().allows(&facade, &method) {
                    Err(RpcError::unauthorized(format!(
                        "{} may not call {facade}.{method}",
                        session.tag()
                    )))
                } else {
                    methods.get(&method).cloned().ok_or_else(|| {
                        RpcError::new(
                            ErrorCode::NotImplemented,
                            format!("no such request - method {facade}({version}).{method} is not implemented"),
                        )
                    })
                }
            }
        };

        let result = match handler {
            Ok(handler) => {
                session.negotiate(&facade, version);
                let ctx = CallContext {
                    session: Arc::clone(&session),
                    request_id: id,
                };
                handler(ctx, params).await
            }
            Err(err) => Err(err),
        };

        let outcome = match &result {
            Ok(_) => "ok",
            Err(err) => err.kind.as_str(),
        };
        tracing::debug!(
            session = %session.id(),
            request_id = id,
            facade = %facade,
            version,
            method = %method,
            outcome,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Request dispatched"
        );
        if let Err(err) = &result {
            if !err.is_protocol_error() {
                tracing::warn!(
                    facade = %facade,
                    method = %method,
                    error = %err,
                    "Handler failed"
                );
            }
        }
        metrics::record_rpc(&facade, &method, outcome, start);

        Response::from_result(id, result)
    }
}
