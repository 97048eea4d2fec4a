//! hubhook entry point.
//!
//! This binary is the composition root. Responsibilities:
//!
//! 1. **Load configuration** from the environment (and `.env`, if present).
//! 2. **Wire observability**: a JSON `tracing-subscriber` layer, an optional
//!    OpenTelemetry OTLP exporter, and a panic hook that logs backtraces.
//! 3. **Build the dispatcher** with the configured secret, signature
//!    algorithm, and fault isolation policy, and register the built-in
//!    handlers.
//! 4. **Serve** the webhook endpoint until Ctrl-C or SIGTERM.

mod config;
mod hooks;
mod observability;

use std::sync::Arc;

use anyhow::{Context, Result};
use dispatch::EventDispatcher;
use tokio::signal;
use tracing::{error, info};

use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env().context("Failed to load configuration")?;

    let _telemetry = observability::init(config.otlp_endpoint.as_deref())?;
    observability::install_panic_hook();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        algorithm = %config.algorithm,
        fault_isolation = %config.fault_isolation,
        "Starting hubhook"
    );

    let dispatcher = Arc::new(
        EventDispatcher::new(config.secret)
            .with_algorithm(config.algorithm)
            .with_fault_isolation(config.fault_isolation),
    );
    hooks::register_builtin(&dispatcher, &config.log_events);

    listener::serve(dispatcher, &config.listener, shutdown_signal())
        .await
        .context("Webhook listener failed")?;

    info!("Shutdown complete");
    Ok(())
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!(error = %err, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl-C, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}
