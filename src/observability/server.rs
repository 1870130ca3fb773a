//! # Metrics & Health Server
//!
//! Minimal `axum` server exposing `/healthz` (liveness, always 200 once the
//! process is up), `/readyz` (flips once the agent loop has completed its
//! first successful tick, or immediately in `--once` mode) and `/metrics`
//! (Prometheus text exposition). The readiness flag is a plain
//! `Arc<AtomicBool>` flipped by the caller once it considers itself ready.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

#[derive(Debug, Clone)]
pub struct ServerState {
    pub is_ready: Arc<AtomicBool>,
}

impl ServerState {
    pub fn new() -> Self {
        Self {
            is_ready: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl Default for ServerState {
    fn default() -> Self {
        Self::new()
    }
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn readyz(State(state): State<ServerState>) -> StatusCode {
    if state.is_ready.load(Ordering::Relaxed) {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn metrics() -> (StatusCode, String) {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let families = super::metrics::REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&families, &mut buffer) {
        error!(error = %e, "failed to encode Prometheus metrics");
        return (StatusCode::INTERNAL_SERVER_ERROR, String::new());
    }
    match String::from_utf8(buffer) {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => {
            error!(error = %e, "encoded metrics were not valid UTF-8");
            (StatusCode::INTERNAL_SERVER_ERROR, String::new())
        }
    }
}

/// Binds and serves until the process exits. Bind failures return
/// immediately so the caller's startup sequence, which spawns this under
/// `tokio::spawn` and polls `/healthz` on the caller side, can treat them
/// as fatal.
pub async fn serve(port: u16, state: ServerState) -> anyhow::Result<()> {
    let router = Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "metrics/health server listening");
    axum::serve(listener, router).await?;
    Ok(())
}
