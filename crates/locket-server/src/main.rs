//! Main entry point for the Locket server.

use std::sync::Arc;

use locket_common::SystemClock;
use locket_server::config::Configuration;
use locket_server::startup::{self, ShutdownSignal};
use locket_server::{LocketServer, Settings};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let configuration = Configuration::new()?;
    startup::init_logging(&configuration.log_level())?;

    // Initialize metrics for observability
    locket_core::init_metrics();

    let database_connection = configuration.database_connection().await?;

    let shutdown = ShutdownSignal::new();
    startup::listen_for_signals(shutdown.clone());

    let settings = Settings {
        retry_interval: configuration.retry_interval(),
        metrics_interval: configuration.metrics_interval(),
    };
    info!(?settings, "Starting Locket");

    let server = LocketServer::start(
        database_connection,
        Arc::new(SystemClock),
        settings,
        shutdown,
    )
    .await?;
    server.run().await?;

    Ok(())
}
