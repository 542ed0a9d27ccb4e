//! Metrics collection and exposition.
//!
//! # Metrics
//! - `controller_rpc_requests_total` (counter): requests by facade, method, outcome
//! - `controller_rpc_duration_seconds` (histogram): dispatch latency by facade
//! - `controller_admission_rejected_total` (counter): rejections by class
//! - `controller_active_connections` (gauge): live API connections
//! - `controller_worker_exits_total` (counter): worker exits by worker, outcome
//!
//! # Design Decisions
//! - Low-overhead metric updates through the `metrics` facade
//! - Without an installed recorder every call is a no-op

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::worker::WorkerResult;

/// Install the Prometheus exporter on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_rpc(facade: &str, method: &str, outcome: &str, start: Instant) {
    counter!(
        "controller_rpc_requests_total",
        "facade" => facade.to_string(),
        "method" => method.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
    histogram!("controller_rpc_duration_seconds", "facade" => facade.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_admission_rejected(class: &str) {
    counter!("controller_admission_rejected_total", "class" => class.to_string()).increment(1);
}

pub fn record_active_connections(count: u64) {
    gauge!("controller_active_connections").set(count as f64);
}

pub fn record_worker_exit(worker: &str, result: &WorkerResult) {
    let outcome = match result {
        Ok(()) => "clean",
        Err(err) => err.as_label(),
    };
    counter!(
        "controller_worker_exits_total",
        "worker" => worker.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}
