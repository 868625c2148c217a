//! # HTTP Server Module
//!
//! Wires configuration into the shared state, builds the axum application,
//! and runs it until a shutdown signal arrives.
//!
//! ## Rust Concepts Used
//!
//! - `Arc<T>` for sharing server state across async tasks
//! - `tokio::net::TcpListener` for accepting incoming connections
//! - `tokio::sync::Notify` to learn when graceful shutdown has begun

use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::Notify;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument, warn};

use super::admission::{AdmissionConfig, AdmissionController};
use super::routes::{create_router, AppState};
use crate::caching::{spawn_cleanup_task, CacheStore, InMemoryCache, InMemoryCacheConfig};
use crate::core::config::GatewayConfig;
use crate::core::error::{GatewayError, GatewayResult};
use crate::traffic::RateLimiter;
use crate::upstream::Upstreams;

/// The gateway HTTP server
pub struct GatewayServer {
    state: AppState,
}

impl GatewayServer {
    /// Build the server from validated configuration
    pub fn new(config: GatewayConfig, metrics: Option<PrometheusHandle>) -> GatewayResult<Self> {
        let upstreams = Upstreams::from_config(&config.upstreams)?;
        Ok(Self {
            state: build_state(Arc::new(config), upstreams, metrics),
        })
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// The application with its middleware stack
    pub fn router(&self) -> Router {
        create_router(self.state.clone())
            .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
    }

    /// Bind, serve, and stop once `shutdown` resolves.
    ///
    /// In-flight requests get `server.shutdown_grace` to finish before the
    /// server task is aborted.
    #[instrument(skip_all)]
    pub async fn start<S>(self, shutdown: S) -> GatewayResult<()>
    where
        S: Future<Output = ()> + Send + 'static,
    {
        let server_config = &self.state.config.server;
        let bind_addr = format!("{}:{}", server_config.bind_address, server_config.http_port);
        let grace = server_config.shutdown_grace;

        let listener = TcpListener::bind(&bind_addr).await.map_err(|e| {
            GatewayError::internal(format!("Failed to bind gateway server to {}: {}", bind_addr, e))
        })?;
        info!(address = %bind_addr, "Gateway HTTP server listening");

        let cache: Arc<dyn CacheStore> = self.state.admission.cache().clone();
        let cleanup = spawn_cleanup_task(cache, self.state.config.cache.cleanup_interval);

        let app = self.router();
        let draining = Arc::new(Notify::new());
        let trigger = draining.clone();
        let mut server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown.await;
                    trigger.notify_one();
                })
                .await
        });

        let finished = tokio::select! {
            joined = &mut server => Some(flatten(joined)),
            _ = draining.notified() => None,
        };

        let result = match finished {
            Some(result) => result,
            None => {
                info!(grace = ?grace, "Waiting for in-flight requests to complete");
                match tokio::time::timeout(grace, &mut server).await {
                    Ok(joined) => flatten(joined),
                    Err(_) => {
                        warn!(grace = ?grace, "Shutdown grace period elapsed, aborting server");
                        server.abort();
                        Ok(())
                    }
                }
            }
        };

        cleanup.abort();
        result
    }
}

/// Assemble the shared state handlers run against
pub fn build_state(
    config: Arc<GatewayConfig>,
    upstreams: Upstreams,
    metrics: Option<PrometheusHandle>,
) -> AppState {
    let cache: Arc<dyn CacheStore> = Arc::new(InMemoryCache::new(InMemoryCacheConfig {
        max_entries: config.cache.max_entries,
    }));
    let limiter = Arc::new(RateLimiter::new(config.rate_limit.clone(), config.identities()));
    let admission = Arc::new(AdmissionController::new(
        cache,
        limiter,
        AdmissionConfig {
            fetch_timeout: config.upstreams.news.timeout,
            coalesce_misses: config.cache.coalesce_misses,
        },
    ));

    AppState {
        config,
        admission,
        upstreams: Arc::new(upstreams),
        metrics,
    }
}

fn flatten(
    joined: Result<std::io::Result<()>, tokio::task::JoinError>,
) -> GatewayResult<()> {
    match joined {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(GatewayError::internal(format!("Gateway server error: {}", e))),
        Err(e) => Err(GatewayError::internal(format!("Gateway server task failed: {}", e))),
    }
}

/// Resolves on SIGINT or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install SIGINT handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT, initiating graceful shutdown"),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_start_stops_on_shutdown() {
        let mut config = GatewayConfig::default();
        config.server.bind_address = "127.0.0.1".to_string();
        config.server.http_port = 0;

        let server = GatewayServer::new(config, None).unwrap();
        let result = server.start(async {}).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_state_opens_a_window_per_identity() {
        let config = Arc::new(GatewayConfig::default());
        let upstreams = Upstreams::from_config(&config.upstreams).unwrap();
        let state = build_state(config, upstreams, None);

        let identities: Vec<String> = state
            .admission
            .limiter()
            .snapshot()
            .into_iter()
            .map(|s| s.identity.to_string())
            .collect();
        assert_eq!(identities, vec!["english", "rewrite", "search", "telugu"]);
    }
}
