//! # Agent Metrics
//!
//! Tick, step, module and pipeline counters/histograms. Mirrors the
//! teacher's per-domain metrics module (one file per concern, `LazyLock`
//! statics, a single `register_*` entry point plus plain increment/observe
//! functions callable from the rest of the crate without importing
//! `prometheus` directly).

use super::registry::REGISTRY;
use anyhow::Result;
use prometheus::{Histogram, IntCounter, IntCounterVec};
use std::sync::LazyLock;

static TICKS_TOTAL: LazyLock<IntCounter> =
    LazyLock::new(|| IntCounter::new("infralib_ticks_total", "Total number of agent loop ticks run").expect("metric name and help are valid"));

static TICK_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new("infralib_tick_duration_seconds", "Duration of a full agent loop tick in seconds")
            .buckets(vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0]),
    )
    .expect("metric name, help and buckets are valid")
});

static TICK_ERRORS_TOTAL: LazyLock<IntCounter> =
    LazyLock::new(|| IntCounter::new("infralib_tick_errors_total", "Total number of ticks that returned a core error").expect("metric name and help are valid"));

static STEPS_APPLIED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new("infralib_steps_applied_total", "Total number of step pipelines that reached Succeeded"),
        &["step"],
    )
    .expect("metric name, help and labels are valid")
});

static STEP_DURATION: LazyLock<prometheus::HistogramVec> = LazyLock::new(|| {
    prometheus::HistogramVec::new(
        prometheus::HistogramOpts::new("infralib_step_duration_seconds", "Duration of one step's pipeline run in seconds")
            .buckets(vec![5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0]),
        &["step"],
    )
    .expect("metric name, help, buckets and labels are valid")
});

static MODULE_VERSION_BUMPS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new("infralib_module_version_bumps_total", "Total number of modules the resolver advanced to a new version"),
        &["step", "module"],
    )
    .expect("metric name, help and labels are valid")
});

static PIPELINE_AUTO_APPROVALS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("infralib_pipeline_auto_approvals_total", "Total number of step pipelines approved automatically by policy")
        .expect("metric name and help are valid")
});

static PIPELINE_MANUAL_APPROVALS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("infralib_pipeline_manual_approvals_total", "Total number of step pipelines that waited on a human verdict")
        .expect("metric name and help are valid")
});

static PLAN_SCRAPE_RETRIES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("infralib_plan_scrape_retries_total", "Total number of backoff retries while scraping a plan log for a change summary")
        .expect("metric name and help are valid")
});

pub(crate) fn register_agent_metrics() -> Result<()> {
    REGISTRY.register(Box::new(TICKS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(TICK_DURATION.clone()))?;
    REGISTRY.register(Box::new(TICK_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(STEPS_APPLIED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(STEP_DURATION.clone()))?;
    REGISTRY.register(Box::new(MODULE_VERSION_BUMPS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(PIPELINE_AUTO_APPROVALS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(PIPELINE_MANUAL_APPROVALS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(PLAN_SCRAPE_RETRIES_TOTAL.clone()))?;
    Ok(())
}

pub fn increment_ticks_total() {
    TICKS_TOTAL.inc();
}

pub fn observe_tick_duration(seconds: f64) {
    TICK_DURATION.observe(seconds);
}

pub fn increment_tick_errors_total() {
    TICK_ERRORS_TOTAL.inc();
}

pub fn increment_steps_applied_total(step: &str) {
    STEPS_APPLIED_TOTAL.with_label_values(&[step]).inc();
}

pub fn observe_step_duration(step: &str, seconds: f64) {
    STEP_DURATION.with_label_values(&[step]).observe(seconds);
}

pub fn increment_module_version_bumps_total(step: &str, module: &str) {
    MODULE_VERSION_BUMPS_TOTAL.with_label_values(&[step, module]).inc();
}

pub fn increment_pipeline_auto_approvals_total() {
    PIPELINE_AUTO_APPROVALS_TOTAL.inc();
}

pub fn increment_pipeline_manual_approvals_total() {
    PIPELINE_MANUAL_APPROVALS_TOTAL.inc();
}

pub fn increment_plan_scrape_retries_total() {
    PLAN_SCRAPE_RETRIES_TOTAL.inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increment_ticks_total_increases_counter() {
        let before = TICKS_TOTAL.get();
        increment_ticks_total();
        assert_eq!(TICKS_TOTAL.get(), before + 1);
    }

    #[test]
    fn observe_tick_duration_does_not_panic() {
        observe_tick_duration(12.5);
    }

    #[test]
    fn steps_applied_total_is_labelled_per_step() {
        let before = STEPS_APPLIED_TOTAL.with_label_values(&["net"]).get();
        increment_steps_applied_total("net");
        assert_eq!(STEPS_APPLIED_TOTAL.with_label_values(&["net"]).get(), before + 1);
    }

    #[test]
    fn module_version_bumps_are_labelled_per_step_and_module() {
        let before = MODULE_VERSION_BUMPS_TOTAL.with_label_values(&["net", "main"]).get();
        increment_module_version_bumps_total("net", "main");
        assert_eq!(MODULE_VERSION_BUMPS_TOTAL.with_label_values(&["net", "main"]).get(), before + 1);
    }
}
