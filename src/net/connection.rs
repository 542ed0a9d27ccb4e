//! Live API connections.
//!
//! # Responsibilities
//! - Give each admitted connection an id used as its worker name
//! - Own the connection workers so the server can reap and kill them
//! - Publish the live-connection count
//!
//! # Design Decisions
//! - The set is owned by the server's accept loop; only the count is shared
//! - The count is refreshed on insert, on reap and on shutdown

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::future::join_all;

use crate::observability::metrics;
use crate::worker::{Supervised, Worker};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique connection id, rendered as `conn-N`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Read handle on the number of connections a [`ConnectionSet`] holds.
#[derive(Debug, Clone, Default)]
pub struct ConnectionCount(Arc<AtomicU64>);

impl ConnectionCount {
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    fn publish(&self, live: usize) {
        let live = live as u64;
        self.0.store(live, Ordering::Release);
        metrics::record_active_connections(live);
    }
}

struct Entry {
    peer: SocketAddr,
    worker: Supervised,
}

/// Connection workers owned by the API server.
pub struct ConnectionSet {
    entries: HashMap<ConnectionId, Entry>,
    count: ConnectionCount,
}

impl ConnectionSet {
    pub fn new(count: ConnectionCount) -> Self {
        Self {
            entries: HashMap::new(),
            count,
        }
    }

    pub fn insert(&mut self, id: ConnectionId, peer: SocketAddr, worker: Supervised) {
        self.entries.insert(id, Entry { peer, worker });
        self.count.publish(self.entries.len());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forget connections whose workers have stopped. Returns how many.
    pub fn reap(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|id, entry| {
            let alive = entry.worker.is_alive();
            if !alive {
                tracing::trace!(connection_id = %id, peer_addr = %entry.peer, "Connection reaped");
            }
            alive
        });
        self.count.publish(self.entries.len());
        before - self.entries.len()
    }

    /// Kill every connection and wait for all of them to stop.
    ///
    /// Connection failures are logged; one client's error is not the server's.
    pub async fn shutdown(&mut self) {
        for entry in self.entries.values() {
            entry.worker.kill();
        }
        let outcomes = join_all(
            self.entries
                .iter()
                .map(|(id, entry)| async move { (*id, entry.peer, entry.worker.wait().await) }),
        )
        .await;
        for (id, peer, outcome) in outcomes {
            if let Err(err) = outcome {
                tracing::debug!(connection_id = %id, peer_addr = %peer, error = %err, "Connection ended with error");
            }
        }
        self.entries.clear();
        self.count.publish(0);
    }
}
