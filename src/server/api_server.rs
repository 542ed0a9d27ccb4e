//! API server worker.
//!
//! # Responsibilities
//! - Accept TCP connections on a bounded listener
//! - Charge every connection to admission control before any other work
//! - Run each admitted connection as a supervised child worker
//! - On kill, stop accepting, kill and await every connection, then
//!   release the listener

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;

use crate::admission::{AdmissionConfigError, AdmissionController, CONNECTION_CLASS};
use crate::config::{ControllerConfig, LimitsConfig, ListenerConfig};
use crate::facade::{Dispatcher, FacadeRegistry};
use crate::net::{ConnectionCount, ConnectionId, ConnectionSet, Listener, ListenerError};
use crate::rpc::{ErrorCode, FrameWriter, Response, RpcError};
use crate::server::connection;
use crate::session::{Authenticator, CapabilityParseError, StaticAuthenticator};
use crate::worker::{Lifecycle, Supervised, Worker, WorkerError, WorkerResult};

/// Interval between reaping finished connections and pruning idle buckets.
const HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(30);

/// Pause after a failed accept (e.g. file descriptor exhaustion).
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Upper bound on writing the rejection frame to a refused connection.
const REJECT_WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// Error type for API server construction.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("Failed to read listener address: {0}")]
    LocalAddr(#[source] std::io::Error),

    #[error(transparent)]
    Admission(#[from] AdmissionConfigError),

    #[error("Invalid user capabilities: {0}")]
    Capability(#[from] CapabilityParseError),
}

/// Shared state handed to every connection worker.
#[derive(Clone)]
pub struct ServerState {
    pub admission: Arc<AdmissionController>,
    pub dispatcher: Dispatcher,
    pub authenticator: Arc<dyn Authenticator>,
    /// Maximum unauthenticated lifetime of a connection.
    pub login_timeout: Duration,
    pub limits: LimitsConfig,
}

impl ServerState {
    /// Build the server state from configuration and a finished registry.
    pub fn from_config(config: &ControllerConfig, registry: Arc<FacadeRegistry>) -> Result<Self, ServerError> {
        let authenticator = StaticAuthenticator::from_config(&config.sessions.users)?;
        Ok(Self {
            admission: Arc::new(AdmissionController::new(&config.admission)?),
            dispatcher: Dispatcher::new(registry),
            authenticator: Arc::new(authenticator),
            login_timeout: Duration::from_secs(config.sessions.login_timeout_secs),
            limits: config.limits.clone(),
        })
    }
}

/// The API server: a worker owning the listener and every connection.
pub struct ApiServer {
    worker: Supervised,
    addr: SocketAddr,
    live: ConnectionCount,
}

impl ApiServer {
    /// Bind the configured address and start serving.
    pub async fn bind(config: &ListenerConfig, state: ServerState) -> Result<Self, ServerError> {
        let listener = Listener::bind(config).await?;
        Self::start(listener, state)
    }

    /// Start serving on an already bound listener.
    pub fn start(listener: Listener, state: ServerState) -> Result<Self, ServerError> {
        let addr = listener.local_addr().map_err(ServerError::LocalAddr)?;
        let live = ConnectionCount::default();
        let connections = ConnectionSet::new(live.clone());
        let worker = Supervised::spawn("api-server", move |lc| run(lc, listener, state, connections));

        Ok(Self { worker, addr, live })
    }

    /// Address the server accepts connections on.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Number of connections being served, as of the last housekeeping pass.
    pub fn active_connections(&self) -> u64 {
        self.live.get()
    }
}

impl Worker for ApiServer {
    fn kill(&self) {
        self.worker.kill();
    }

    fn kill_with(&self, reason: WorkerError) {
        self.worker.kill_with(reason);
    }

    fn wait(&self) -> BoxFuture<'_, WorkerResult> {
        self.worker.wait()
    }

    fn is_alive(&self) -> bool {
        self.worker.is_alive()
    }
}

async fn run(
    lc: Arc<Lifecycle>,
    listener: Listener,
    state: ServerState,
    mut connections: ConnectionSet,
) -> WorkerResult {
    tracing::info!(address = ?listener.local_addr().ok(), "API server started");

    let mut rejections = JoinSet::new();
    let mut housekeeping = tokio::time::interval(HOUSEKEEPING_INTERVAL);
    housekeeping.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let result = loop {
        tokio::select! {
            _ = lc.dying() => break Ok(()),
            accepted = listener.accept() => match accepted {
                Ok((stream, peer, permit)) => {
                    if !state.admission.try_admit_from(CONNECTION_CLASS, &peer.ip().to_string()) {
                        tracing::debug!(peer_addr = %peer, "Connection rejected by admission control");
                        rejections.spawn(reject(stream));
                        continue;
                    }
                    let id = ConnectionId::next();
                    tracing::debug!(connection_id = %id, peer_addr = %peer, "Connection admitted");
                    connections.insert(id, peer, connection::spawn(id, stream, peer, permit, state.clone()));
                }
                Err(ListenerError::Accept(err)) => {
                    tracing::warn!(error = %err, "Accept failed");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
                Err(err) => break Err(WorkerError::runtime(lc.name(), err)),
            },
            _ = housekeeping.tick() => {
                let reaped = connections.reap();
                let pruned = state.admission.prune();
                tracing::trace!(connections = connections.len(), reaped, pruned_buckets = pruned, "Housekeeping");
            }
            Some(_) = rejections.join_next(), if !rejections.is_empty() => {}
        }
    };

    // Reverse acquisition: connections first, the listener last.
    tracing::info!(connections = connections.len(), "API server stopping");
    connections.shutdown().await;
    rejections.shutdown().await;
    drop(listener);

    tracing::info!("API server stopped");
    result
}

/// Tell a refused peer why, then close. No authentication work happens.
async fn reject(stream: TcpStream) {
    let mut writer = FrameWriter::new(stream);
    let response = Response::err(
        0,
        RpcError::new(ErrorCode::AdmissionRejected, "connection rate exceeded, try again later"),
    );
    let _ = tokio::time::timeout(REJECT_WRITE_TIMEOUT, async {
        if writer.send(&response).await.is_ok() {
            let _ = writer.shutdown().await;
        }
    })
    .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AdmissionPolicy;
    use crate::rpc::FrameReader;
    use tokio::net::TcpListener;

    async fn server(config: ControllerConfig) -> ApiServer {
        let registry = Arc::new(crate::facade::RegistryBuilder::new().build());
        let state = ServerState::from_config(&config, registry).unwrap();
        let listener = Listener::from_listener(TcpListener::bind("127.0.0.1:0").await.unwrap(), 16).unwrap();
        ApiServer::start(listener, state).unwrap()
    }

    #[tokio::test]
    async fn test_kill_closes_open_connections() {
        let server = server(ControllerConfig::default()).await;
        let stream = TcpStream::connect(server.addr()).await.unwrap();

        // Give the accept loop a moment to hand the socket to a worker.
        while server.active_connections() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        server.kill();
        server.wait().await.unwrap();
        assert_eq!(server.active_connections(), 0);

        let mut reader = FrameReader::new(stream, 1024);
        assert!(reader.next_frame::<Response>().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_connection_over_budget_is_rejected() {
        let mut config = ControllerConfig::default();
        config.admission.classes.insert(
            CONNECTION_CLASS.to_string(),
            AdmissionPolicy {
                capacity: 1,
                refill_interval_ms: 60_000,
            },
        );
        let server = server(config).await;

        let _first = TcpStream::connect(server.addr()).await.unwrap();
        let second = TcpStream::connect(server.addr()).await.unwrap();

        let mut reader = FrameReader::new(second, 1024);
        let response: Response = reader.next_frame().await.unwrap().unwrap();
        assert_eq!(response.into_result().unwrap_err().kind, ErrorCode::AdmissionRejected);
        assert!(reader.next_frame::<Response>().await.unwrap().is_none());

        server.kill();
        server.wait().await.unwrap();
    }
}
