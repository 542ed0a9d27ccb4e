//! Controller assembly.
//!
//! # Responsibilities
//! - Build the facade registry and server state from a config snapshot
//! - Bind the API listener (fail fast on a bad address)
//! - Start the API server and, when configured, the storage worker as one
//!   supervised group

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use thiserror::Error;

use crate::config::ControllerConfig;
use crate::facade::RegistryError;
use crate::facades::build_registry;
use crate::server::{ApiServer, ServerError, ServerState};
use crate::storage::{StorageAddrs, StorageWorker};
use crate::worker::{GroupBuilder, Supervised, Worker, WorkerError, WorkerResult};

/// Error type for controller startup.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Failed to build facade registry: {0}")]
    Registry(#[from] RegistryError),

    #[error("Failed to start API server: {0}")]
    Server(#[from] ServerError),
}

/// The running controller: a group of the API server and its siblings.
pub struct Controller {
    group: Supervised,
    api_addr: SocketAddr,
    storage: Option<Arc<StorageWorker>>,
}

impl Controller {
    /// Address the API server accepts connections on.
    pub fn api_addr(&self) -> SocketAddr {
        self.api_addr
    }

    /// Storage addresses once both listeners are bound; `None` when storage
    /// is not configured or failed to start.
    pub async fn storage_addrs(&self) -> Option<StorageAddrs> {
        match &self.storage {
            Some(storage) => storage.ready().await,
            None => None,
        }
    }
}

impl Worker for Controller {
    fn kill(&self) {
        self.group.kill();
    }

    fn kill_with(&self, reason: WorkerError) {
        self.group.kill_with(reason);
    }

    fn wait(&self) -> BoxFuture<'_, WorkerResult> {
        self.group.wait()
    }

    fn is_alive(&self) -> bool {
        self.group.is_alive()
    }
}

/// Start every controller worker described by `config`.
pub async fn start_controller(config: &ControllerConfig) -> Result<Controller, StartupError> {
    let registry = Arc::new(build_registry(&config.facades)?);
    tracing::info!(facades = registry.len(), "Facade registry built");

    let state = ServerState::from_config(config, registry)?;
    let server = ApiServer::bind(&config.listener, state).await?;
    let api_addr = server.addr();

    let mut group = GroupBuilder::new("controller").add("api-server", server);
    let mut storage = None;
    if let Some(storage_config) = &config.storage {
        let worker = Arc::new(StorageWorker::start(storage_config.clone()));
        group = group.add("storage", worker.clone());
        storage = Some(worker);
    }

    tracing::info!(
        api_address = %api_addr,
        storage = storage.is_some(),
        workers = group.len(),
        "Controller started"
    );

    Ok(Controller {
        group: group.start(),
        api_addr,
        storage,
    })
}
