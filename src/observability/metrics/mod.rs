//! # Metrics
//!
//! Prometheus metric registration, grouped by domain under one shared
//! `registry`.

mod agent_metrics;
mod registry;

pub use agent_metrics::*;
pub use registry::register_metrics;

pub(crate) use registry::REGISTRY;
