//! Per-connection worker.
//!
//! # Data Flow
//! ```text
//! socket ─→ FrameReader ─→ login phase (Admin.Login only, bounded by login timeout)
//!                       └→ request loop ─→ JoinSet<dispatch> ─┐
//! socket ←─ writer task ←─ mpsc<Response> ←───────────────────┘
//! ```
//!
//! # Design Decisions
//! - Requests of one session run concurrently, bounded by a semaphore
//! - All responses go through one writer task so frames never interleave
//! - Teardown aborts in-flight requests first, then closes the writer
//! - Malformed frames are answered with `bad-request`; only transport
//!   failures end the connection

use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures_util::FutureExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinHandle, JoinSet};

use crate::admission::LOGIN_CLASS;
use crate::net::{ConnectionId, ConnectionPermit};
use crate::observability::metrics;
use crate::rpc::message::{ADMIN_FACADE, ADMIN_VERSION, LOGIN_METHOD};
use crate::rpc::{
    CodecError, ErrorCode, FacadeVersions, FrameReader, FrameWriter, LoginRequest, LoginResult, Request,
    Response, RpcError,
};
use crate::server::ServerState;
use crate::session::Session;
use crate::worker::{Lifecycle, Supervised, WorkerError, WorkerResult};

/// Spawn the worker serving one admitted connection.
///
/// The permit is held until the worker has released the socket.
pub(crate) fn spawn(
    id: ConnectionId,
    stream: TcpStream,
    peer: SocketAddr,
    permit: ConnectionPermit,
    state: ServerState,
) -> Supervised {
    Supervised::spawn(id.to_string(), move |lc| async move {
        let result = serve(&lc, stream, peer, &state).await;
        drop(permit);
        result
    })
}

async fn serve(lc: &Lifecycle, stream: TcpStream, peer: SocketAddr, state: &ServerState) -> WorkerResult {
    let (read_half, write_half) = stream.into_split();
    let mut reader = FrameReader::new(read_half, state.limits.max_frame_bytes);
    let (tx, writer) = spawn_writer(write_half, state.limits.max_concurrent_requests);

    let result = match login(lc, &mut reader, &tx, state, peer).await {
        Ok(Some(session)) => {
            tracing::info!(
                connection = %lc.name(),
                peer_addr = %peer,
                tag = %session.tag(),
                session_id = %session.id(),
                "Session started"
            );
            serve_requests(lc, &mut reader, &tx, state, Arc::new(session)).await
        }
        Ok(None) => Ok(()),
        Err(err) => Err(err),
    };

    // The writer was acquired first, so it goes last.
    drop(tx);
    if let Err(err) = writer.await {
        tracing::warn!(connection = %lc.name(), error = %err, "Writer task failed");
    }
    tracing::debug!(connection = %lc.name(), peer_addr = %peer, "Connection closed");
    result
}

fn spawn_writer(write_half: OwnedWriteHalf, depth: usize) -> (mpsc::Sender<Response>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<Response>(depth.max(1));
    let handle = tokio::spawn(async move {
        let mut writer = FrameWriter::new(write_half);
        while let Some(response) = rx.recv().await {
            if let Err(err) = writer.send(&response).await {
                tracing::debug!(error = %err, "Response write failed");
                return;
            }
        }
        let _ = writer.shutdown().await;
    });
    (tx, handle)
}

async fn reply(tx: &mpsc::Sender<Response>, response: Response) {
    if tx.send(response).await.is_err() {
        tracing::trace!("Writer gone, response dropped");
    }
}

fn malformed(err: &serde_json::Error) -> Response {
    Response::err(0, RpcError::bad_request(format!("malformed frame: {err}")))
}

/// Run the login phase.
///
/// `Ok(None)` means no session was established: the peer left, the worker
/// was killed, or the login timeout expired.
async fn login(
    lc: &Lifecycle,
    reader: &mut FrameReader<OwnedReadHalf>,
    tx: &mpsc::Sender<Response>,
    state: &ServerState,
    peer: SocketAddr,
) -> Result<Option<Session>, WorkerError> {
    let deadline = tokio::time::sleep(state.login_timeout);
    tokio::pin!(deadline);

    loop {
        let frame = tokio::select! {
            _ = lc.dying() => return Ok(None),
            _ = &mut deadline => {
                tracing::info!(connection = %lc.name(), peer_addr = %peer, "Login timed out");
                return Ok(None);
            }
            frame = reader.next_frame::<Request>() => frame,
        };

        let request = match frame {
            Ok(Some(request)) => request,
            Ok(None) => return Ok(None),
            Err(CodecError::Json(err)) => {
                reply(tx, malformed(&err)).await;
                continue;
            }
            Err(err) => return Err(WorkerError::runtime(lc.name(), err)),
        };

        let start = Instant::now();
        match authenticate(request, state) {
            Ok((session, response)) => {
                metrics::record_rpc(ADMIN_FACADE, LOGIN_METHOD, "ok", start);
                reply(tx, response).await;
                return Ok(Some(session));
            }
            Err(response) => {
                let outcome = response.error.as_ref().map_or("error", |e| e.kind.as_str()).to_string();
                tracing::debug!(connection = %lc.name(), peer_addr = %peer, outcome = %outcome, "Login refused");
                metrics::record_rpc(ADMIN_FACADE, LOGIN_METHOD, &outcome, start);
                reply(tx, response).await;
            }
        }
    }
}

/// Handle one frame received before login.
///
/// Admission is charged before any credential is looked at.
pub(crate) fn authenticate(request: Request, state: &ServerState) -> Result<(Session, Response), Response> {
    let id = request.id;
    if request.facade != ADMIN_FACADE || request.method != LOGIN_METHOD {
        return Err(Response::err(
            id,
            RpcError::new(
                ErrorCode::LoginRequired,
                format!("{}.{} called before login", request.facade, request.method),
            ),
        ));
    }
    if request.version != ADMIN_VERSION {
        return Err(Response::err(
            id,
            RpcError::not_supported(format!(
                "facade {ADMIN_FACADE:?} does not support version {}",
                request.version
            )),
        ));
    }
    if !state.admission.try_admit(LOGIN_CLASS) {
        return Err(Response::err(
            id,
            RpcError::new(ErrorCode::AdmissionRejected, "login rate exceeded, try again later"),
        ));
    }

    let params: LoginRequest = serde_json::from_value(request.params)
        .map_err(|e| Response::err(id, RpcError::bad_request(format!("invalid login parameters: {e}"))))?;
    let identity = state
        .authenticator
        .authenticate(&params.tag, &params.password)
        .ok_or_else(|| Response::err(id, RpcError::unauthorized("invalid entity name or password")))?;

    let session = Session::new(identity);
    let mut facades = vec![FacadeVersions {
        name: ADMIN_FACADE.to_string(),
        versions: vec![ADMIN_VERSION],
    }];
    facades.extend(state.dispatcher.registry().available_to(session.capabilities()));

    let result = LoginResult {
        tag: session.tag().to_string(),
        session_id: session.id().to_string(),
        facades,
    };
    let value = serde_json::to_value(&result).map_err(|e| Response::err(id, RpcError::internal(e.to_string())))?;
    Ok((session, Response::ok(id, value)))
}

async fn serve_requests(
    lc: &Lifecycle,
    reader: &mut FrameReader<OwnedReadHalf>,
    tx: &mpsc::Sender<Response>,
    state: &ServerState,
    session: Arc<Session>,
) -> WorkerResult {
    let limit = Arc::new(Semaphore::new(state.limits.max_concurrent_requests.max(1)));
    let mut in_flight = JoinSet::new();

    let result = 'serve: loop {
        tokio::select! {
            _ = lc.dying() => break 'serve Ok(()),
            frame = reader.next_frame::<Request>() => match frame {
                Ok(Some(request)) => {
                    if request.facade == ADMIN_FACADE && request.method == LOGIN_METHOD {
                        reply(tx, Response::err(request.id, RpcError::bad_request("already logged in"))).await;
                        continue 'serve;
                    }

                    let permit = tokio::select! {
                        _ = lc.dying() => break 'serve Ok(()),
                        permit = limit.clone().acquire_owned() => match permit {
                            Ok(permit) => permit,
                            Err(_) => break 'serve Ok(()),
                        },
                    };

                    let dispatcher = state.dispatcher.clone();
                    let session = session.clone();
                    let tx = tx.clone();
                    in_flight.spawn(async move {
                        let id = request.id;
                        let response = AssertUnwindSafe(dispatcher.dispatch(session, request))
                            .catch_unwind()
                            .await
                            .unwrap_or_else(|_| Response::err(id, RpcError::internal("handler panicked")));
                        reply(&tx, response).await;
                        drop(permit);
                    });
                }
                Ok(None) => break 'serve Ok(()),
                Err(CodecError::Json(err)) => reply(tx, malformed(&err)).await,
                Err(err) => break 'serve Err(WorkerError::runtime(lc.name(), err)),
            },
            Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                if let Err(err) = joined {
                    tracing::warn!(connection = %lc.name(), error = %err, "Request task failed");
                }
            }
        }
    };

    in_flight.shutdown().await;
    tracing::debug!(connection = %lc.name(), session_id = %session.id(), "Session ended");
    result
}
