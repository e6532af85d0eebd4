pub mod health;
pub mod metrics;

use axum::{Router, routing::get};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::{Result, RotatorError};

/// HTTP server state shared across all handlers
#[derive(Clone)]
pub struct HttpState {
    pub metrics_registry: Arc<prometheus::Registry>,
    pub service_start_time: Instant,
    /// Set once the first scan cycle has started
    pub ready: Arc<AtomicBool>,
}

impl HttpState {
    pub fn new(metrics_registry: Arc<prometheus::Registry>, ready: Arc<AtomicBool>) -> Self {
        Self {
            metrics_registry,
            service_start_time: Instant::now(),
            ready,
        }
    }
}

/// Create the HTTP router with all endpoints
pub fn create_router(state: HttpState) -> Router {
    Router::new()
        .route("/live", get(health::live_handler))
        .route("/ready", get(health::ready_handler))
        .route("/health", get(health::health_handler))
        .route("/metrics", get(metrics::metrics_handler))
        .with_state(state)
}

/// Bind the health and metrics server.
pub async fn bind(listen: &str) -> Result<TcpListener> {
    TcpListener::bind(listen)
        .await
        .map_err(|e| RotatorError::Network(format!("Failed to bind HTTP server on {listen}: {e}")))
}

/// Serve until `shutdown` is cancelled.
pub async fn run_http_server(
    listener: TcpListener,
    state: HttpState,
    shutdown: CancellationToken,
) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("Starting HTTP server on {}", addr);
    }

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(|e| RotatorError::Network(format!("HTTP server error: {e}")))?;

    info!("HTTP server stopped");
    Ok(())
}
