//! OS signal handling.
//!
//! # Responsibilities
//! - Register termination signal listeners (SIGINT, SIGTERM, SIGQUIT)
//! - Resolve once the first of them arrives
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - Each call registers its own listeners; nothing is global
//! - Non-unix platforms fall back to Ctrl-C only

/// Wait for a termination signal.
///
/// Returns `Err` only if a listener cannot be registered.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut quit = signal(SignalKind::quit())?;

    let name = tokio::select! {
        _ = interrupt.recv() => "SIGINT",
        _ = terminate.recv() => "SIGTERM",
        _ = quit.recv() => "SIGQUIT",
    };
    tracing::info!(signal = name, "Shutdown signal received");
    Ok(())
}

/// Wait for a termination signal.
#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await?;
    tracing::info!(signal = "ctrl-c", "Shutdown signal received");
    Ok(())
}
