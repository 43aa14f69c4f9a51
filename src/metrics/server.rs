//! Pull endpoint serving the registry in Prometheus text format.

use anyhow::{Context, Result};
use axum::{Router, extract::State, http::header, response::IntoResponse, routing::get};
use log::info;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use super::MetricsRegistry;

const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

async fn metrics_endpoint(State(registry): State<MetricsRegistry>) -> impl IntoResponse {
    ([(header::CONTENT_TYPE, CONTENT_TYPE)], registry.export_prometheus())
}

pub fn router(registry: MetricsRegistry) -> Router {
    Router::new()
        .route("/metrics", get(metrics_endpoint))
        .with_state(registry)
}

/// Binds the metrics port on all interfaces.
pub async fn bind(port: u16) -> Result<TcpListener> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind metrics endpoint to {}", addr))
}

/// Serves `/metrics` until `shutdown` is cancelled.
pub async fn serve(
    listener: TcpListener,
    registry: MetricsRegistry,
    shutdown: CancellationToken,
) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("Serving metrics on http://{}/metrics", addr);
    }

    axum::serve(listener, router(registry))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("Metrics server error")
}
