//! # Observability
//!
//! Structured logging via `tracing`/`tracing-subscriber`, a Prometheus
//! metrics registry, a health/metrics HTTP server, and an OpenTelemetry
//! hook that is configuration-only pending exporter-bridge stabilization
//! (see `otel`).

pub mod metrics;
pub mod otel;
pub mod server;

pub use server::ServerState;

use tracing::warn;

/// Initializes the global `tracing` subscriber with an env-filter default
/// scoped to this crate.
pub fn init_tracing() {
    if let Err(e) = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "infralib_agent=info".into()))
        .try_init()
    {
        warn!("tracing subscriber init returned an error (may already be initialized): {e}");
    }
}
