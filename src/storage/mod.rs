//! Local storage worker.
//!
//! # Data Flow
//! ```text
//! StorageWorker::start(config)
//!     → bind storage listener        (released last)
//!     → bind shared storage listener (released first)
//!     → await kill
//!     → close listeners in reverse order
//! ```
//!
//! # Wire Protocol
//! ```text
//! client: <relative file name>\n
//! server: OK\n<file bytes>   then close
//!     or: ERR <reason>\n     then close
//! ```
//!
//! # Design Decisions
//! - Names are resolved under the served directory only; absolute paths
//!   and `..` components are refused before touching the filesystem
//! - A failed second bind releases the first listener before the setup
//!   error is reported

pub mod server;
pub mod worker;

use thiserror::Error;

pub use server::{fetch, FileServer};
pub use worker::{StorageAddrs, StorageWorker};

/// Error type for storage serving.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot serve directory {dir}: {source}")]
    Directory {
        dir: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Refused file name {0:?}")]
    InvalidName(String),

    #[error("Storage server error: {0}")]
    Remote(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
