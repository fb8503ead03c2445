pub mod config;
pub mod http;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::serve;
use ptb_bus::{DevicePublisher, NatsBusClient};
use ptb_core::{
    CallbackReceiver, DeviceErrorReporter, ExchangeCoordinator, MemoryExchangeLog,
    SharedDirectory, SharedExchangeLog, SqliteExchangeLog, StaticDirectory,
};
use ptb_correlation::{Correlations, store_from_config};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::config::GatewayConfig;
pub use crate::http::{GatewayState, build_router};

/// Wires the production collaborators described by `config`.
pub async fn build_state(config: &GatewayConfig) -> Result<GatewayState> {
    let store = store_from_config(&config.correlation)
        .await
        .context("open correlation store")?;
    let correlations = Correlations::new(store, config.exchange.record_ttl);

    let directory: SharedDirectory = match &config.directory_path {
        Some(path) => {
            let directory = StaticDirectory::from_yaml_file(path)?;
            if directory.is_empty() {
                warn!(path = %path.display(), "device directory lists no devices");
            }
            info!(devices = directory.len(), path = %path.display(), "device directory loaded");
            Arc::new(directory)
        }
        None => {
            warn!("DEVICE_DIRECTORY_PATH not set; every participant will be unknown");
            Arc::new(StaticDirectory::new())
        }
    };

    let journal: SharedExchangeLog = match &config.exchange_log_path {
        Some(path) => Arc::new(SqliteExchangeLog::open(path)?),
        None => {
            warn!("EXCHANGE_LOG_PATH not set; exchange log kept in memory only");
            Arc::new(MemoryExchangeLog::new())
        }
    };

    let publisher = DevicePublisher::new(Arc::new(NatsBusClient::new(config.broker.clone())));
    Ok(GatewayState {
        coordinator: ExchangeCoordinator::new(
            correlations.clone(),
            directory,
            publisher,
            journal.clone(),
            config.exchange.clone(),
        ),
        receiver: CallbackReceiver::new(correlations, journal.clone()),
        device_errors: DeviceErrorReporter::new(journal),
    })
}

/// Serves the gateway until ctrl-c.
pub async fn run(config: GatewayConfig) -> Result<()> {
    let router = build_router(build_state(&config).await?);
    let listener = TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("bind {}", config.addr))?;
    info!(
        addr = %config.addr,
        broker = %config.broker.server_url(),
        timeout_secs = config.exchange.timeout.as_secs(),
        otel = ptb_telemetry::telemetry_enabled(),
        "terminal-gateway listening"
    );

    serve(listener, router)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;

    Ok(())
}
