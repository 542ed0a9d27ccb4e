//! Multiplexed client connection.
//!
//! # Data Flow
//! ```text
//! call() ─→ pending.insert(id, oneshot) ─→ FrameWriter (mutex) ─→ socket
//! socket ─→ reader worker ─→ pending.remove(id) ─→ oneshot ─→ call() returns
//! ```
//!
//! # Design Decisions
//! - Any number of calls may be in flight; responses are matched by id
//! - Responses for ids nobody waits for are logged and dropped
//! - When the reader stops (close, EOF, transport error) every pending
//!   call fails with `ConnectionClosed`

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex};

use crate::api::error::ApiError;
use crate::rpc::message::{ADMIN_FACADE, ADMIN_VERSION, LOGIN_METHOD};
use crate::rpc::{CodecError, FrameReader, FrameWriter, LoginRequest, LoginResult, Request, Response, RpcError};
use crate::worker::{Lifecycle, Supervised, Worker, WorkerError, WorkerResult};

/// Largest frame the client accepts from the server.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 2 * 1024 * 1024;

#[derive(Default)]
struct Shared {
    pending: DashMap<u64, oneshot::Sender<Result<Value, RpcError>>>,
    closed: AtomicBool,
}

impl Shared {
    fn fail_pending(&self) {
        // Flag first: a caller that registers after this point sees it.
        self.closed.store(true, Ordering::SeqCst);
        self.pending.clear();
    }
}

/// Removes a pending entry when its call finishes or is dropped.
struct PendingGuard<'a> {
    shared: &'a Shared,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.shared.pending.remove(&self.id);
    }
}

struct Inner {
    addr: SocketAddr,
    login: LoginResult,
    next_id: AtomicU64,
    shared: Arc<Shared>,
    writer: Mutex<FrameWriter<OwnedWriteHalf>>,
    reader: Supervised,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.reader.kill();
    }
}

/// An authenticated connection to the API server.
///
/// Cheap to clone; all clones share the socket and the pending-call table.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

impl Connection {
    /// Connect to `address` and log in as `tag`.
    pub async fn open(address: &str, tag: &str, password: &str) -> Result<Self, ApiError> {
        let connect_error = |source| ApiError::Connect {
            address: address.to_string(),
            source,
        };
        let stream = TcpStream::connect(address).await.map_err(connect_error)?;
        let addr = stream.peer_addr().map_err(connect_error)?;

        let (read_half, write_half) = stream.into_split();
        let mut frames = FrameReader::new(read_half, DEFAULT_MAX_FRAME_BYTES);
        let mut writer = FrameWriter::new(write_half);

        let params = serde_json::to_value(LoginRequest {
            tag: tag.to_string(),
            password: password.to_string(),
        })
        .map_err(ApiError::Encode)?;
        writer
            .send(&Request {
                id: 0,
                facade: ADMIN_FACADE.to_string(),
                version: ADMIN_VERSION,
                method: LOGIN_METHOD.to_string(),
                params,
            })
            .await?;

        let response: Response = frames.next_frame().await?.ok_or(ApiError::ConnectionClosed)?;
        let login: LoginResult = serde_json::from_value(response.into_result()?).map_err(ApiError::Decode)?;
        tracing::debug!(server = %addr, tag = %login.tag, session_id = %login.session_id, "Logged in");

        let shared = Arc::new(Shared::default());
        let reader = Supervised::spawn(format!("api-client:{addr}"), {
            let shared = shared.clone();
            move |lc| read_responses(lc, frames, shared)
        });

        Ok(Self {
            inner: Arc::new(Inner {
                addr,
                login,
                next_id: AtomicU64::new(1),
                shared,
                writer: Mutex::new(writer),
                reader,
            }),
        })
    }

    /// Issue one call and wait for its outcome.
    pub async fn call(&self, facade: &str, version: u32, method: &str, params: Value) -> Result<Value, ApiError> {
        let shared: &Shared = &self.inner.shared;
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        shared.pending.insert(id, tx);
        let _guard = PendingGuard { shared, id };
        if shared.closed.load(Ordering::SeqCst) {
            return Err(ApiError::ConnectionClosed);
        }

        let request = Request {
            id,
            facade: facade.to_string(),
            version,
            method: method.to_string(),
            params,
        };
        let sent = self.inner.writer.lock().await.send(&request).await;
        match sent {
            Ok(()) => {}
            Err(CodecError::Io(err)) => {
                tracing::debug!(server = %self.inner.addr, error = %err, "Request write failed");
                return Err(ApiError::ConnectionClosed);
            }
            Err(err) => return Err(err.into()),
        }

        match rx.await {
            Ok(result) => result.map_err(ApiError::Remote),
            Err(_) => Err(ApiError::ConnectionClosed),
        }
    }

    /// Close the connection, failing every in-flight call. Idempotent.
    pub async fn close(&self) {
        self.inner.reader.kill();
        let _ = self.inner.reader.wait().await;
        let _ = self.inner.writer.lock().await.shutdown().await;
    }

    /// Whether the connection can no longer carry calls.
    pub fn is_closed(&self) -> bool {
        self.inner.shared.closed.load(Ordering::SeqCst)
    }

    /// Server address.
    pub fn addr(&self) -> SocketAddr {
        self.inner.addr
    }

    /// Entity tag the session was authenticated as.
    pub fn tag(&self) -> &str {
        &self.inner.login.tag
    }

    pub fn session_id(&self) -> &str {
        &self.inner.login.session_id
    }

    /// Facade versions the server offered at login.
    pub fn facades(&self) -> &[crate::rpc::FacadeVersions] {
        &self.inner.login.facades
    }

    /// Versions of `facade` the server offered at login.
    pub fn facade_versions(&self, facade: &str) -> &[u32] {
        self.inner
            .login
            .facades
            .iter()
            .find(|f| f.name == facade)
            .map(|f| f.versions.as_slice())
            .unwrap_or(&[])
    }

    /// Highest version of `facade` both sides support. An empty `supported`
    /// list accepts any version the server offers.
    pub fn best_facade_version(&self, facade: &str, supported: &[u32]) -> Option<u32> {
        self.facade_versions(facade)
            .iter()
            .copied()
            .filter(|v| supported.is_empty() || supported.contains(v))
            .max()
    }
}

async fn read_responses(lc: Arc<Lifecycle>, mut frames: FrameReader<OwnedReadHalf>, shared: Arc<Shared>) -> WorkerResult {
    let result = loop {
        tokio::select! {
            _ = lc.dying() => break Ok(()),
            frame = frames.next_frame::<Response>() => match frame {
                Ok(Some(response)) => match shared.pending.remove(&response.id) {
                    Some((_, tx)) => {
                        let _ = tx.send(response.into_result());
                    }
                    None => tracing::warn!(id = response.id, "Response for unknown request ignored"),
                },
                Ok(None) => break Ok(()),
                Err(err) => break Err(WorkerError::runtime(lc.name(), err)),
            }
        }
    };

    shared.fail_pending();
    tracing::debug!(worker = %lc.name(), "Client connection closed");
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::{ErrorCode, FacadeVersions};
    use serde_json::json;
    use tokio::net::TcpListener;

    /// A scripted server: answers the login, then hands the frames to `script`.
    async fn scripted<F, Fut>(script: F) -> String
    where
        F: FnOnce(FrameReader<OwnedReadHalf>, FrameWriter<OwnedWriteHalf>) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, write_half) = stream.into_split();
            let mut reader = FrameReader::new(read_half, 1024 * 1024);
            let mut writer = FrameWriter::new(write_half);

            let login: Request = reader.next_frame().await.unwrap().unwrap();
            let result = LoginResult {
                tag: "user-admin".into(),
                session_id: "session-test".into(),
                facades: vec![FacadeVersions {
                    name: "Ping".into(),
                    versions: vec![1, 2],
                }],
            };
            writer
                .send(&Response::ok(login.id, serde_json::to_value(result).unwrap()))
                .await
                .unwrap();
            script(reader, writer).await;
        });
        addr
    }

    #[tokio::test]
    async fn test_out_of_order_responses_are_matched() {
        let addr = scripted(|mut reader, mut writer| async move {
            let first: Request = reader.next_frame().await.unwrap().unwrap();
            let second: Request = reader.next_frame().await.unwrap().unwrap();
            writer.send(&Response::ok(second.id, second.params)).await.unwrap();
            writer.send(&Response::ok(first.id, first.params)).await.unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        })
        .await;

        let conn = Connection::open(&addr, "user-admin", "secret").await.unwrap();
        assert_eq!(conn.best_facade_version("Ping", &[]), Some(2));
        assert_eq!(conn.best_facade_version("Ping", &[1]), Some(1));

        let (a, b) = tokio::join!(
            conn.call("Ping", 1, "Echo", json!("a")),
            conn.call("Ping", 1, "Echo", json!("b")),
        );
        assert_eq!(a.unwrap(), json!("a"));
        assert_eq!(b.unwrap(), json!("b"));
    }

    #[tokio::test]
    async fn test_unknown_id_is_ignored() {
        let addr = scripted(|mut reader, mut writer| async move {
            let request: Request = reader.next_frame().await.unwrap().unwrap();
            writer.send(&Response::ok(9_999, json!("stray"))).await.unwrap();
            writer.send(&Response::ok(request.id, json!("mine"))).await.unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        })
        .await;

        let conn = Connection::open(&addr, "user-admin", "secret").await.unwrap();
        assert_eq!(conn.call("Ping", 1, "Echo", json!(null)).await.unwrap(), json!("mine"));
    }

    #[tokio::test]
    async fn test_remote_error_kind_preserved() {
        let addr = scripted(|mut reader, mut writer| async move {
            let request: Request = reader.next_frame().await.unwrap().unwrap();
            let err = RpcError::new(ErrorCode::Other("quota-exceeded".into()), "too many offers");
            writer.send(&Response::err(request.id, err)).await.unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        })
        .await;

        let conn = Connection::open(&addr, "user-admin", "secret").await.unwrap();
        let err = conn.call("Ping", 1, "Ping", json!(null)).await.unwrap_err();
        assert_eq!(err.remote_kind(), Some(&ErrorCode::Other("quota-exceeded".into())));
    }

    #[tokio::test]
    async fn test_close_fails_in_flight_calls() {
        let addr = scripted(|mut reader, _writer| async move {
            // Read the request and never answer.
            let _: Option<Request> = reader.next_frame().await.unwrap();
            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
        })
        .await;

        let conn = Connection::open(&addr, "user-admin", "secret").await.unwrap();
        let caller = conn.clone();
        let call = tokio::spawn(async move { caller.call("Ping", 1, "Ping", json!(null)).await });

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        conn.close().await;
        conn.close().await;

        assert!(matches!(call.await.unwrap(), Err(ApiError::ConnectionClosed)));
        assert!(conn.is_closed());
        assert!(matches!(
            conn.call("Ping", 1, "Ping", json!(null)).await,
            Err(ApiError::ConnectionClosed)
        ));
    }
}
