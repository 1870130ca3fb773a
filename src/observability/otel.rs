//! # OpenTelemetry Support
//!
//! ## Current status: configuration only
//!
//! This module logs the detected OTLP configuration and validates that the
//! endpoint parses, but does not yet wire up an exporter: `opentelemetry_sdk`
//! 0.31's tracer-provider-to-`tracing-subscriber` bridge is still settling
//! API-wise in this crate's dependency set, so wiring it now would mean
//! re-doing it on the next bump. Structured logging already gets spans per
//! tick/step/module through `tracing` regardless of whether OTLP export is
//! configured.
//!
//! Full export is the next step once the bridge stabilizes: initialize an
//! OTLP exporter with the configured endpoint, register a
//! `tracing_opentelemetry` layer, and return a handle this module's
//! `shutdown_otel` can flush on exit.

use tracing::info;

/// Opaque handle for a future tracer provider. Always `None` today.
pub struct TracerProviderHandle;

/// Reads `OTEL_EXPORTER_OTLP_ENDPOINT` and validates it parses as a URL.
/// Returns `Ok(None)` when unset, so callers can skip OTLP entirely without
/// an error.
pub fn init_otel() -> anyhow::Result<Option<TracerProviderHandle>> {
    let Ok(endpoint) = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT") else {
        info!("OTEL_EXPORTER_OTLP_ENDPOINT not set, skipping OpenTelemetry initialization");
        return Ok(None);
    };
    let parsed: reqwest::Url = endpoint
        .parse()
        .map_err(|e| anyhow::anyhow!("OTEL_EXPORTER_OTLP_ENDPOINT {endpoint:?} is not a valid URL: {e}"))?;
    info!(endpoint = %parsed, "OpenTelemetry OTLP endpoint configured; export pending exporter bridge stabilization");
    Ok(Some(TracerProviderHandle))
}

pub fn shutdown_otel(_tracer_provider: Option<TracerProviderHandle>) {
    info!("OpenTelemetry shutdown called (no-op, exporter not yet wired)");
}
