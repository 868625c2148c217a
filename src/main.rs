//! # News Gateway - Main Entry Point
//!
//! Loads configuration, installs logging and metrics, and serves until
//! SIGINT or SIGTERM.

use tracing::{error, info};

use news_gateway::core::config::GatewayConfig;
use news_gateway::gateway::server::{shutdown_signal, GatewayServer};
use news_gateway::observability::{init_logging, install_prometheus_recorder};
use news_gateway::GatewayResult;

#[tokio::main]
async fn main() -> GatewayResult<()> {
    let config_path = std::env::var("GATEWAY_CONFIG_PATH")
        .unwrap_or_else(|_| "config/gateway.yaml".to_string());

    let config = match GatewayConfig::load_or_default(&config_path).await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration from {}: {}", config_path, e);
            std::process::exit(1);
        }
    };

    init_logging(&config.observability.logging)?;

    info!("Starting News Gateway");
    info!(version = env!("CARGO_PKG_VERSION"), config_path = %config_path, "Configuration loaded");
    info!(
        news_key_set = config.upstreams.news.api_key.is_set(),
        rewrite_key_set = config.upstreams.rewrite.api_key.is_set(),
        "Upstream credentials"
    );

    let metrics = if config.observability.metrics.enabled {
        Some(install_prometheus_recorder()?)
    } else {
        None
    };

    let server = GatewayServer::new(config, metrics).map_err(|e| {
        error!(error = %e, "Failed to build gateway server");
        e
    })?;

    server.start(shutdown_signal()).await?;

    info!("News Gateway shutdown complete");
    Ok(())
}
