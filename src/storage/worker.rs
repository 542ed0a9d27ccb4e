//! Storage worker: the storage and shared-storage file servers as one unit.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use tokio::sync::watch;

use crate::config::StorageConfig;
use crate::storage::server::FileServer;
use crate::worker::{Lifecycle, ResourceStack, Supervised, Worker, WorkerError, WorkerResult};

/// Addresses the storage worker is serving on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageAddrs {
    pub storage: SocketAddr,
    pub shared_storage: SocketAddr,
}

pub struct StorageWorker {
    worker: Supervised,
    ready: watch::Receiver<Option<StorageAddrs>>,
}

impl StorageWorker {
    pub fn start(config: StorageConfig) -> Self {
        let (ready_tx, ready) = watch::channel(None);
        let worker = Supervised::spawn("storage", move |lc| run(lc, config, ready_tx));
        Self { worker, ready }
    }

    /// Wait until both listeners are bound.
    ///
    /// Returns `None` if the worker stopped before that.
    pub async fn ready(&self) -> Option<StorageAddrs> {
        let mut ready = self.ready.clone();
        if ready.wait_for(Option::is_some).await.is_err() {
            tracing::debug!("Storage worker stopped before binding");
        }
        let addrs = *ready.borrow();
        addrs
    }
}

impl Worker for StorageWorker {
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

async fn run(lc: Arc<Lifecycle>, config: StorageConfig, ready: watch::Sender<Option<StorageAddrs>>) -> WorkerResult {
    let mut resources = ResourceStack::new(lc.name());

    let storage = match FileServer::bind(&config.storage_address, &config.storage_dir).await {
        Ok(server) => server,
        Err(err) => {
            tracing::error!(error = %err, "Error with local storage");
            return Err(WorkerError::setup(lc.name(), err));
        }
    };
    let storage_addr = storage.addr();
    resources.push("storage listener", move || storage.close());

    if lc.is_dying() {
        return resources.release().await;
    }

    let shared = match FileServer::bind(&config.shared_storage_address, &config.shared_storage_dir).await {
        Ok(server) => server,
        Err(err) => {
            tracing::error!(error = %err, "Error with shared storage");
            // Release the first listener before reporting.
            if let Err(release_err) = resources.release().await {
                tracing::warn!(error = %release_err, "Failed to release storage listener");
            }
            return Err(WorkerError::setup(lc.name(), err));
        }
    };
    let shared_addr = shared.addr();
    resources.push("shared storage listener", move || shared.close());

    ready.send_replace(Some(StorageAddrs {
        storage: storage_addr,
        shared_storage: shared_addr,
    }));
    tracing::info!("Storage routines started, awaiting death");

    lc.dying().await;

    tracing::info!("Dying, closing storage listeners");
    resources.release().await
}
