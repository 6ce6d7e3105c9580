//! Courier HTTP server
//!
//! Usage: `courier-server [config.yaml]`

mod error;
mod routes;
mod sms;
mod twiml;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use courier_core::config::{LogFormat, LoggingSettings};
use courier_core::{load_config, Courier, GenaiModel, Logger, McpConnector, TracingLogger};

use crate::error::ServerError;

fn init_tracing(settings: &LoggingSettings) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.level));
    match settings.format {
        LogFormat::Compact => fmt().with_env_filter(filter).with_target(false).compact().init(),
        LogFormat::Json => fmt().with_env_filter(filter).with_target(false).json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let explicit = std::env::args_os().nth(1).map(PathBuf::from);
    let (config, source) = load_config(explicit.as_deref()).context("loading configuration")?;

    init_tracing(&config.logging);
    match &source {
        Some(path) => info!(path = %path.display(), "Configuration loaded"),
        None => warn!("No configuration file found, using defaults"),
    }

    let logger: Arc<dyn Logger> = Arc::new(TracingLogger::new());
    if config.model.resolve_api_key().is_none() {
        warn!(
            variable = %config.model.api_key_variable(),
            "No model API key configured"
        );
    }

    let connector = Arc::new(McpConnector::new(Arc::clone(&logger)));
    let model = Arc::new(GenaiModel::new(config.model.clone(), Arc::clone(&logger)));
    let courier = Arc::new(
        Courier::start(config, connector, model, logger)
            .await
            .context("starting courier")?,
    );

    let server = courier.config().server.clone();
    let maintenance = courier.spawn_maintenance(Duration::from_secs(server.maintenance_interval_secs.max(1)));

    let addr: SocketAddr = format!("{}:{}", server.bind_address, server.port)
        .parse()
        .map_err(|_| ServerError::Address(format!("{}:{}", server.bind_address, server.port)))?;
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;
    info!(%addr, "Listening");

    axum::serve(listener, routes::router(Arc::clone(&courier)))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await
        .map_err(ServerError::Serve)?;

    maintenance.abort();
    Ok(())
}
