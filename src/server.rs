//! HTTP server for exposing Prometheus metrics.
//!
//! This module provides an Axum-based HTTP server that serves the `/metrics`
//! endpoint for Prometheus scraping and a `/health` endpoint for health checks.
//! Scrapes never call the Commvault API; they render whatever the poller last
//! published.

use crate::error::{CommvaultError, Result};
use crate::metrics::MetricsCollector;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

/// Content type of the Prometheus text exposition format.
const EXPOSITION_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Shared application state.
#[derive(Clone)]
struct AppState {
    metrics: Arc<MetricsCollector>,
}

/// Bind `listen_address` and serve until the process is stopped.
///
/// # Examples
///
/// ```no_run
/// use commvault_exporter::metrics::MetricsCollector;
/// use commvault_exporter::server::start_server;
/// use commvault_exporter::snapshot::SnapshotStore;
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() {
///     let snapshots = Arc::new(SnapshotStore::new());
///     let metrics = MetricsCollector::new(snapshots, "commvault.example.com").unwrap();
///     start_server("0.0.0.0:8000", metrics).await.unwrap();
/// }
/// ```
pub async fn start_server(listen_address: &str, metrics: MetricsCollector) -> Result<()> {
    info!("Starting HTTP server on {}", listen_address);
    let listener = TcpListener::bind(listen_address).await?;
    serve(listener, metrics).await
}

/// Serve on an already bound listener.
pub async fn serve(listener: TcpListener, metrics: MetricsCollector) -> Result<()> {
    let app = router(metrics);

    if let Ok(addr) = listener.local_addr() {
        info!("Serving metrics on http://{}/metrics", addr);
    }

    axum::serve(listener, app)
        .await
        .map_err(|e| CommvaultError::Server(e.to_string()))?;

    Ok(())
}

fn router(metrics: MetricsCollector) -> Router {
    let state = AppState {
        metrics: Arc::new(metrics),
    };

    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .route("/", get(root_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Handler for /metrics endpoint.
async fn metrics_handler(State(state): State<AppState>) -> Response {
    debug!("Received metrics scrape request");

    match state.metrics.render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, EXPOSITION_CONTENT_TYPE)],
            body,
        )
            .into_response(),
        Err(e) => {
            warn!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
                .into_response()
        }
    }
}

/// Handler for /health endpoint.
async fn health_handler() -> Response {
    (StatusCode::OK, "OK").into_response()
}

/// Handler for root endpoint.
async fn root_handler() -> Html<&'static str> {
    Html(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>Commvault Exporter</title>
    <style>
        body { font-family: Arial, sans-serif; margin: 40px; }
        h1 { color: #333; }
        a { color: #0066cc; text-decoration: none; }
        a:hover { text-decoration: underline; }
        .info { background: #f0f0f0; padding: 15px; border-radius: 5px; margin: 20px 0; }
    </style>
</head>
<body>
    <h1>Commvault Exporter</h1>
    <div class="info">
        <p>Prometheus metrics exporter for Commvault VM and disk storage status</p>
        <p><strong>Endpoints:</strong></p>
        <ul>
            <li><a href="/metrics">/metrics</a> - Prometheus metrics</li>
            <li><a href="/health">/health</a> - Health check</li>
        </ul>
    </div>
</body>
</html>
"#,
    )
}
