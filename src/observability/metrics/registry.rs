//! # Metrics Registry
//!
//! Global Prometheus registry every metric in this crate registers into.

use anyhow::Result;
use prometheus::Registry;
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

/// Registers every metric family with the global registry. Called once at
/// startup, before the metrics HTTP server starts accepting scrapes.
pub fn register_metrics() -> Result<()> {
    super::agent_metrics::register_agent_metrics()?;
    Ok(())
}
