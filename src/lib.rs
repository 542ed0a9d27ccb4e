//! Fleet controller runtime library.

pub mod admission;
pub mod api;
pub mod config;
pub mod facade;
pub mod facades;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod rpc;
pub mod server;
pub mod session;
pub mod storage;
pub mod worker;

pub use config::schema::ControllerConfig;
pub use lifecycle::{start_controller, Controller};
pub use worker::{Worker, WorkerError, WorkerResult};
