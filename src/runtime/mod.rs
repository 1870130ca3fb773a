//! # Runtime Bootstrap
//!
//! Reads the environment, builds the `Ports` bundle for the selected
//! provider (only AWS has concrete adapters; GCP/Azure/Local resolve to a
//! stub that fails on first use), starts the observability server, and
//! hands off to the Agent Loop.

use crate::agent::{AgentSettings, ConfigSource};
use crate::materializer::MaterializerSettings;
use crate::observability::ServerState;
use crate::ports::aws::{
    CloudWatchLogStreamFactory, CodePipelineDriver, EventBridgeScheduler, S3ObjectStore, SsmParameterStore, WebhookNotifier,
};
use crate::ports::{Ports, ProviderType};
use anyhow::{Context, Result};
use std::env;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

/// Everything `bootstrap` reads from the process environment, centralized
/// here rather than scattering `env::var` calls through the rest of the
/// runtime.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub provider: ProviderType,
    pub region: String,
    pub state_bucket: String,
    pub lock_table: String,
    pub artifact_bucket: String,
    pub codebuild_role_arn: String,
    pub schedule_group: String,
    pub webhook_url: String,
    pub code_repo_ssh_url: String,
    pub approval_link_base: String,
    pub account_id: Option<String>,
    pub ssm_encryption_key_id: Option<String>,
    pub config_source: ConfigSource,
    pub metrics_port: u16,
    pub startup_timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub allow_parallel: bool,
}

fn env_var(name: &str) -> Result<String> {
    env::var(name).with_context(|| format!("required environment variable {name} is not set"))
}

fn env_var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

impl RuntimeConfig {
    pub fn from_env() -> Result<Self> {
        let config_source = match env::var("INFRALIB_CONFIG_KEY") {
            Ok(key) => ConfigSource::Object(key),
            Err(_) => ConfigSource::Local(env_var_or("INFRALIB_CONFIG_PATH", "config.yaml").into()),
        };

        let provider = match env_var_or("INFRALIB_PROVIDER", "aws").as_str() {
            "aws" => ProviderType::Aws,
            "gcp" => ProviderType::Gcp,
            "azure" => ProviderType::Azure,
            "local" => ProviderType::Local,
            other => anyhow::bail!("unknown INFRALIB_PROVIDER {other:?}, expected aws, gcp, azure or local"),
        };

        Ok(Self {
            provider,
            region: env_var_or("INFRALIB_REGION", "eu-west-1"),
            state_bucket: env_var("INFRALIB_STATE_BUCKET")?,
            lock_table: env_var_or("INFRALIB_LOCK_TABLE", "infralib-locks"),
            artifact_bucket: env_var_or("INFRALIB_ARTIFACT_BUCKET", "infralib-pipeline-artifacts"),
            codebuild_role_arn: env_var("INFRALIB_CODEBUILD_ROLE_ARN")?,
            schedule_group: env_var_or("INFRALIB_SCHEDULE_GROUP", "default"),
            webhook_url: env_var_or("INFRALIB_WEBHOOK_URL", ""),
            code_repo_ssh_url: env_var_or("INFRALIB_CODE_REPO_SSH_URL", ""),
            approval_link_base: env_var_or("INFRALIB_APPROVAL_LINK_BASE", "https://console.aws.amazon.com/codesuite/codepipeline/pipelines"),
            account_id: env::var("INFRALIB_ACCOUNT_ID").ok(),
            ssm_encryption_key_id: env::var("INFRALIB_SSM_KEY_ID").ok(),
            config_source,
            metrics_port: env_var_or("INFRALIB_METRICS_PORT", "8080").parse().context("INFRALIB_METRICS_PORT must be a port number")?,
            startup_timeout_secs: env_var_or("INFRALIB_STARTUP_TIMEOUT_SECS", "30").parse().context("INFRALIB_STARTUP_TIMEOUT_SECS must be a number")?,
            poll_interval_ms: env_var_or("INFRALIB_POLL_INTERVAL_MS", "250").parse().context("INFRALIB_POLL_INTERVAL_MS must be a number")?,
            allow_parallel: env_var_or("INFRALIB_ALLOW_PARALLEL", "false").parse().unwrap_or(false),
        })
    }
}

/// Builds the `Ports` bundle for `cfg.provider`. Only AWS has concrete
/// adapters; `Gcp`/`Azure`/`Local` resolve to `UnsupportedProvider`, which
/// fails the first port call instead of silently behaving like AWS.
pub async fn build_ports(cfg: &RuntimeConfig) -> Result<Ports> {
    match cfg.provider {
        ProviderType::Aws => build_aws_ports(cfg).await,
        ProviderType::Gcp => Ok(unsupported_ports("gcp")),
        ProviderType::Azure => Ok(unsupported_ports("azure")),
        ProviderType::Local => Ok(unsupported_ports("local")),
    }
}

fn unsupported_ports(name: &'static str) -> Ports {
    use crate::ports::unsupported::UnsupportedProvider;
    let provider = UnsupportedProvider::new(name);
    Ports {
        object_store: Box::new(provider),
        parameter_store: Box::new(provider),
        builder: Box::new(provider),
        pipeline: Box::new(provider),
        log_stream_factory: Box::new(provider),
        release_catalog: Box::new(provider),
        notifier: Box::new(provider),
        scheduler: Box::new(provider),
    }
}

async fn build_aws_ports(cfg: &RuntimeConfig) -> Result<Ports> {
    let object_store = S3ObjectStore::from_region(&cfg.region, &cfg.state_bucket).await;
    object_store.ensure_retention_policy().await.context("applying S3 bucket retention policy")?;

    let parameter_store = SsmParameterStore::from_region(&cfg.region, cfg.ssm_encryption_key_id.clone()).await;

    let sdk_config = crate::ports::aws::load_sdk_config(&cfg.region).await;
    let pipeline = CodePipelineDriver::new(
        aws_sdk_codebuild::Client::new(&sdk_config),
        aws_sdk_codepipeline::Client::new(&sdk_config),
        cfg.codebuild_role_arn.clone(),
        cfg.artifact_bucket.clone(),
    );

    let log_stream_factory = CloudWatchLogStreamFactory::from_region(&cfg.region).await;
    let release_catalog = crate::catalog::GitSourceCatalog::new();
    let notifier = WebhookNotifier::new(cfg.webhook_url.clone());
    let scheduler = EventBridgeScheduler::from_region(&cfg.region, cfg.schedule_group.clone()).await;

    Ok(Ports {
        object_store: Box::new(object_store),
        parameter_store: Box::new(parameter_store),
        builder: Box::new(pipeline.clone()),
        pipeline: Box::new(pipeline),
        log_stream_factory: Box::new(log_stream_factory),
        release_catalog: Box::new(release_catalog),
        notifier: Box::new(notifier),
        scheduler: Box::new(scheduler),
    })
}

/// Resolves the account id the agent runs as: the configured override if
/// one was given, otherwise (AWS only) an STS `GetCallerIdentity` call.
pub async fn resolve_account_id(cfg: &RuntimeConfig) -> Result<String> {
    if let Some(account_id) = &cfg.account_id {
        return Ok(account_id.clone());
    }
    if cfg.provider != ProviderType::Aws {
        anyhow::bail!("INFRALIB_ACCOUNT_ID must be set explicitly for provider {:?}", cfg.provider);
    }
    let sdk_config = crate::ports::aws::load_sdk_config(&cfg.region).await;
    let identity = aws_sdk_sts::Client::new(&sdk_config)
        .get_caller_identity()
        .send()
        .await
        .context("resolving account id via sts:GetCallerIdentity")?;
    identity.account().map(str::to_string).context("sts:GetCallerIdentity response had no account id")
}

pub fn agent_settings(cfg: &RuntimeConfig, account_id: String) -> AgentSettings {
    AgentSettings {
        config_source: cfg.config_source.clone(),
        account_id,
        materializer: MaterializerSettings {
            state_bucket: cfg.state_bucket.clone(),
            lock_table: cfg.lock_table.clone(),
            code_repo_ssh_url: cfg.code_repo_ssh_url.clone(),
            cloud_provider: match cfg.provider {
                ProviderType::Aws => "aws",
                ProviderType::Gcp => "gcp",
                ProviderType::Azure => "azure",
                ProviderType::Local => "local",
            }
            .to_string(),
        },
        approval_link_base: cfg.approval_link_base.clone(),
        allow_parallel: cfg.allow_parallel,
    }
}

/// What `start_observability` hands back: the shared readiness flag (the
/// agent loop flips it after its first successful tick) and the
/// OpenTelemetry handle `shutdown_otel` needs at process exit.
pub struct Observability {
    pub is_ready: Arc<AtomicBool>,
    pub tracer_handle: Option<crate::observability::otel::TracerProviderHandle>,
}

/// Starts `tracing`, OpenTelemetry (configuration-only), the Prometheus
/// registry and the health/metrics HTTP server, then polls `/healthz`
/// until the listener accepts connections. `/readyz` itself stays down
/// until the agent loop reports its first successful tick, so bootstrap
/// does not wait on it.
pub async fn start_observability(cfg: &RuntimeConfig) -> Result<Observability> {
    crate::observability::init_tracing();
    let tracer_handle = crate::observability::otel::init_otel()?;
    crate::observability::metrics::register_metrics()?;

    let is_ready = Arc::new(AtomicBool::new(false));
    let state = ServerState { is_ready: is_ready.clone() };
    let port = cfg.metrics_port;
    tokio::spawn(async move {
        if let Err(e) = crate::observability::server::serve(port, state).await {
            tracing::error!("observability server exited: {e}");
        }
    });

    wait_for_listener(port, Duration::from_secs(cfg.startup_timeout_secs), Duration::from_millis(cfg.poll_interval_ms)).await?;
    Ok(Observability { is_ready, tracer_handle })
}

async fn wait_for_listener(port: u16, timeout: Duration, poll_interval: Duration) -> Result<()> {
    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{port}/healthz");
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if let Ok(response) = client.get(&url).send().await {
            if response.status().is_success() {
                info!("observability server is listening");
                return Ok(());
            }
        }
        tokio::time::sleep(poll_interval).await;
    }
    anyhow::bail!("observability server did not start listening within {timeout:?}")
}
