//! # Command-Line Interface
//!
//! `infralib-agent run|tick|validate|status`, a thin `clap`-derived
//! dispatcher over the agent loop's lifecycle.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::watch;

#[derive(Debug, Parser)]
#[command(name = "infralib-agent", about = "Runs the infrastructure release reconciliation agent loop")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Runs the agent loop until cancelled, sleeping between ticks per
    /// `schedule.update_cron`.
    Run,
    /// Runs exactly one tick and exits.
    Tick,
    /// Loads and validates `config.yaml` without running a tick.
    Validate,
    /// Prints the persisted state document for the configured prefix.
    Status,
}

pub async fn dispatch(command: Command) -> Result<()> {
    let runtime_cfg = crate::runtime::RuntimeConfig::from_env().context("loading runtime configuration from the environment")?;

    match command {
        Command::Validate => validate(&runtime_cfg).await,
        Command::Status => status(&runtime_cfg).await,
        Command::Tick => run(&runtime_cfg, true).await,
        Command::Run => run(&runtime_cfg, false).await,
    }
}

async fn load_config_for_cli(runtime_cfg: &crate::runtime::RuntimeConfig, ports: &crate::ports::Ports, account_id: &str) -> Result<crate::model::Config> {
    let location = match &runtime_cfg.config_source {
        crate::agent::ConfigSource::Local(path) => crate::config::ConfigLocation::Local(path),
        crate::agent::ConfigSource::Object(key) => crate::config::ConfigLocation::Object(key),
    };
    crate::config::load(location, ports.object_store.as_ref(), ports.release_catalog.as_ref(), ports.parameter_store.as_ref(), account_id)
        .await
        .context("loading and validating config")
}

async fn validate(runtime_cfg: &crate::runtime::RuntimeConfig) -> Result<()> {
    let ports = crate::runtime::build_ports(runtime_cfg).await?;
    let account_id = crate::runtime::resolve_account_id(runtime_cfg).await?;
    let config = load_config_for_cli(runtime_cfg, &ports, &account_id).await?;
    println!("config is valid: {} step(s) across {} source(s)", config.steps.len(), config.sources.len());
    Ok(())
}

async fn status(runtime_cfg: &crate::runtime::RuntimeConfig) -> Result<()> {
    let ports = crate::runtime::build_ports(runtime_cfg).await?;
    let account_id = crate::runtime::resolve_account_id(runtime_cfg).await?;
    let config = load_config_for_cli(runtime_cfg, &ports, &account_id).await?;

    let key = format!("{}/state.yaml", config.prefix);
    match ports.object_store.get(&key).await? {
        Some(bytes) => {
            let text = String::from_utf8(bytes).context("state.yaml is not UTF-8")?;
            print!("{text}");
        }
        None => println!("no state persisted yet for prefix {}", config.prefix),
    }
    Ok(())
}

async fn run(runtime_cfg: &crate::runtime::RuntimeConfig, once: bool) -> Result<()> {
    let observability = crate::runtime::start_observability(runtime_cfg).await?;
    let ports = crate::runtime::build_ports(runtime_cfg).await?;
    let account_id = crate::runtime::resolve_account_id(runtime_cfg).await?;
    let settings = crate::runtime::agent_settings(runtime_cfg, account_id);

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("received interrupt, cancelling after the current step");
            let _ = cancel_tx.send(true);
        }
    });
    let result = crate::agent::run_loop(
        ports.object_store.as_ref(),
        ports.parameter_store.as_ref(),
        ports.builder.as_ref(),
        ports.pipeline.as_ref(),
        ports.log_stream_factory.as_ref(),
        ports.release_catalog.as_ref(),
        ports.notifier.as_ref(),
        &settings,
        once,
        observability.is_ready.clone(),
        cancel_rx,
    )
    .await;

    crate::observability::otel::shutdown_otel(observability.tracer_handle);
    result.map_err(anyhow::Error::from)
}
