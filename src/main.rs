//! Fleet controller daemon (fleetd).
//!
//! # Architecture Overview
//!
//! ```text
//!                         ┌──────────────────────────────────────────────────────┐
//!                         │                  controller (group)                  │
//!                         │                                                      │
//!   Client connection     │  ┌──────────┐   ┌───────────┐   ┌────────────────┐   │
//!   ──────────────────────┼─▶│ listener │──▶│ admission │──▶│ connection     │   │
//!                         │  │          │   │ (conn)    │   │ worker         │   │
//!                         │  └──────────┘   └───────────┘   └───────┬────────┘   │
//!                         │                                         │            │
//!                         │                      Admin.Login ──▶ admission       │
//!                         │                                   (login) + auth     │
//!                         │                                         │            │
//!                         │                                         ▼            │
//!   Response              │                                 ┌────────────────┐   │
//!   ◀─────────────────────┼─────────────────────────────────│ dispatcher     │   │
//!                         │                                 │ + registry     │   │
//!                         │                                 └────────────────┘   │
//!                         │                                                      │
//!                         │  ┌────────────────────────────────────────────────┐  │
//!                         │  │ storage worker: storage + shared listeners     │  │
//!                         │  └────────────────────────────────────────────────┘  │
//!                         └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use fleet_controller::config::resolve_config;
use fleet_controller::lifecycle::{start_controller, wait_for_shutdown_signal};
use fleet_controller::observability::{logging, metrics};
use fleet_controller::worker::{clean_kill, Worker};

/// Bound on the time the controller gets to tear down after a signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "fleetd")]
#[command(about = "Fleet controller daemon", long_about = None)]
struct Args {
    /// Path to the TOML configuration file (defaults apply when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Validate the configuration and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = resolve_config(args.config.as_deref())?;
    if args.check {
        println!("configuration ok");
        return Ok(());
    }

    logging::init(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "fleetd starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        users = config.sessions.users.len(),
        storage = config.storage.is_some(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let controller = start_controller(&config).await?;

    tokio::select! {
        signal = wait_for_shutdown_signal() => signal?,
        outcome = controller.wait() => {
            tracing::error!(outcome = ?outcome, "Controller stopped unexpectedly");
        }
    }

    clean_kill(&controller, SHUTDOWN_GRACE).await?;
    tracing::info!("Shutdown complete");
    Ok(())
}
