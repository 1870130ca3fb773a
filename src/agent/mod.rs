//! # Agent Loop
//!
//! Ties every other component together into one tick: load and validate
//! config and state, resolve the release window, materialize and drive
//! each step's pipeline for each release in that window in declared
//! order, and persist state after each step that actually applies.
//! `run_loop` wraps a single tick into a tick-and-sleep loop driven by
//! the config's cron schedule.

pub mod cron;

use crate::config::{self, ConfigLocation};
use crate::errors::{CoreError, CoreResult, TransportError, Warning};
use crate::materializer::{self, MaterializerSettings};
use crate::model::{Config, ModuleVersion, State, StepState};
use crate::observability::metrics;
use crate::pipeline::{ArgoCdPlanParser, PipelineDriver, TerraformPlanParser};
use crate::ports::{Builder, LogStreamFactory, Notifier, ObjectStore, ParameterStore, Pipeline, ProjectSpec, ReleaseCatalog};
use crate::resolver::{self, ReleaseIteration, StepDecision};
use crate::template::{TemplateContext, TemplateEngine};
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::watch;
use tracing::{info, warn};

/// Where `config.yaml` lives and where `state.yaml` is persisted.
#[derive(Debug, Clone)]
pub enum ConfigSource {
    Local(std::path::PathBuf),
    Object(String),
}

/// Everything the loop needs beyond the ports: where the config lives,
/// what account it runs as, and the settings the Materializer and
/// Pipeline Driver need to do their jobs.
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub config_source: ConfigSource,
    pub account_id: String,
    pub materializer: MaterializerSettings,
    pub approval_link_base: String,
    /// Allow concurrent steps to run their pipelines in parallel. Default
    /// is strictly sequential.
    pub allow_parallel: bool,
}

#[derive(Debug, Default)]
pub struct TickReport {
    pub steps_applied: Vec<String>,
    pub warnings: Vec<Warning>,
}

fn state_key(prefix: &str) -> String {
    format!("{prefix}/state.yaml")
}

async fn load_state(object_store: &dyn ObjectStore, prefix: &str) -> CoreResult<State> {
    match object_store.get(&state_key(prefix)).await? {
        Some(bytes) => {
            let text = String::from_utf8(bytes).map_err(|e| TransportError::new(format!("state.yaml is not UTF-8: {e}")))?;
            serde_yaml::from_str(&text).map_err(|e| CoreError::Transport(TransportError::new(format!("state.yaml does not parse: {e}"))))
        }
        None => Ok(State::default()),
    }
}

async fn save_state(object_store: &dyn ObjectStore, prefix: &str, state: &State) -> CoreResult<()> {
    let text = serde_yaml::to_string(state).map_err(|e| TransportError::new(format!("serializing state.yaml: {e}")))?;
    object_store.put(&state_key(prefix), text.as_bytes()).await
}

/// Runs a single tick: one full pass over the release window this moment
/// in time implies. Returns as soon as every step in the window has either
/// applied cleanly or the window is exhausted; a step that rejects or
/// fails aborts the whole tick.
#[tracing::instrument(skip_all)]
pub async fn run_tick(
    object_store: &dyn ObjectStore,
    parameter_store: &dyn ParameterStore,
    builder: &dyn Builder,
    pipeline: &dyn Pipeline,
    log_stream_factory: &dyn LogStreamFactory,
    release_catalog: &dyn ReleaseCatalog,
    notifier: &dyn Notifier,
    settings: &AgentSettings,
    cancel: watch::Receiver<bool>,
) -> CoreResult<TickReport> {
    let start = std::time::Instant::now();
    metrics::increment_ticks_total();

    let location = match &settings.config_source {
        ConfigSource::Local(path) => ConfigLocation::Local(path),
        ConfigSource::Object(key) => ConfigLocation::Object(key),
    };
    let config = config::load(location, object_store, release_catalog, parameter_store, &settings.account_id).await?;

    let result = run_tick_for_config(
        &config,
        object_store,
        parameter_store,
        builder,
        pipeline,
        log_stream_factory,
        release_catalog,
        notifier,
        settings,
        cancel,
    )
    .await;

    metrics::observe_tick_duration(start.elapsed().as_secs_f64());
    if result.is_err() {
        metrics::increment_tick_errors_total();
    }
    result
}

#[allow(clippy::too_many_arguments)]
async fn run_tick_for_config(
    config: &Config,
    object_store: &dyn ObjectStore,
    parameter_store: &dyn ParameterStore,
    builder: &dyn Builder,
    pipeline: &dyn Pipeline,
    log_stream_factory: &dyn LogStreamFactory,
    release_catalog: &dyn ReleaseCatalog,
    notifier: &dyn Notifier,
    settings: &AgentSettings,
    cancel: watch::Receiver<bool>,
) -> CoreResult<TickReport> {
    let mut state = load_state(object_store, &config.prefix).await?;
    let mut report = TickReport::default();

    let source_url = config
        .primary_source()
        .map(|s| s.url.as_str())
        .ok_or_else(|| CoreError::Config(crate::errors::ConfigError::single("config has no primary source")))?;
    let stable_release = release_catalog.latest_release(source_url).await?;
    let stable = stable_release.version.clone();

    let (oldest, newest) = resolver::release_window(config, &state, &stable);
    let window_releases = release_catalog.releases_between(source_url, &oldest, &newest).await?;
    if window_releases.is_empty() {
        info!(oldest = %oldest, newest = %newest, "no releases in window, nothing to do this tick");
        return Ok(report);
    }

    let iterations = resolver::resolve_window(config, &state, &window_releases, &stable);
    let driver = PipelineDriver::new(builder, pipeline, notifier, cancel.clone());

    for iteration in &iterations {
        for step_decision in &iteration.steps {
            if *cancel.borrow() {
                return Err(CoreError::Cancelled);
            }
            let Some(step) = config.step(&step_decision.step) else { continue };
            if !step_decision.any_changed() {
                continue;
            }

            let resolved_versions = resolved_versions_for(iteration);
            let project_spec = project_spec_for(config, step, settings);
            driver.ensure_pipeline(&step.name, &project_spec).await?;

            let mut engine = TemplateEngine::new(
                TemplateContext {
                    config,
                    account_id: &settings.account_id,
                    resolved_versions: &resolved_versions,
                    current_step: Some(step.name.as_str()),
                    current_step_is_terraform: step.step_type.is_terraform(),
                },
                object_store,
                parameter_store,
            );

            materializer::materialize_step(
                config,
                step,
                step_decision,
                iteration.is_creation,
                &settings.materializer,
                object_store,
                release_catalog,
                &mut engine,
            )
            .await?;
            report.warnings.extend(engine.take_warnings());

            let plan_parser: Box<dyn crate::pipeline::PlanParser> = if step.step_type.is_terraform() {
                Box::new(TerraformPlanParser)
            } else {
                Box::new(ArgoCdPlanParser)
            };
            let approval_link = format!("{}/{}", settings.approval_link_base, step.name);
            let log_group = project_spec.log_group.clone();

            let previous_execution = state.step(&step.name).and_then(|s| s.pending_execution_id.clone());
            let execution_id = pipeline.start(&step.name).await?;
            set_pending_execution(&mut state, &step.name, Some(execution_id.clone()));
            save_state(object_store, &config.prefix, &state).await?;

            let step_start = std::time::Instant::now();
            let run_result = run_step_with_logs(
                &driver,
                step,
                step_decision,
                &execution_id,
                previous_execution.as_deref(),
                log_stream_factory,
                &log_group,
                plan_parser.as_ref(),
                &approval_link,
            )
            .await;
            metrics::observe_step_duration(&step.name, step_start.elapsed().as_secs_f64());

            match run_result {
                Ok(()) => {
                    metrics::increment_steps_applied_total(&step.name);
                    if step_decision.auto_approve() {
                        metrics::increment_pipeline_auto_approvals_total();
                    } else {
                        metrics::increment_pipeline_manual_approvals_total();
                    }
                    apply_decision_to_state(&mut state, step_decision);
                    set_pending_execution(&mut state, &step.name, None);
                    save_state(object_store, &config.prefix, &state).await?;
                    report.steps_applied.push(step.name.clone());
                }
                Err(e) => {
                    warn!(step = %step.name, error = %e, "step pipeline did not reach Succeeded, aborting tick");
                    set_pending_execution(&mut state, &step.name, None);
                    save_state(object_store, &config.prefix, &state).await?;
                    return Err(e);
                }
            }
        }
    }

    Ok(report)
}

/// Opens the log stream for a step's already-started execution and hands
/// it to the driver. Kept separate from `run_tick_for_config`'s loop body
/// only to avoid one more level of nesting there.
#[allow(clippy::too_many_arguments)]
async fn run_step_with_logs(
    driver: &PipelineDriver<'_>,
    step: &crate::model::Step,
    decision: &StepDecision,
    execution_id: &str,
    previous_execution: Option<&str>,
    log_stream_factory: &dyn LogStreamFactory,
    log_group: &str,
    plan_parser: &dyn crate::pipeline::PlanParser,
    approval_link: &str,
) -> CoreResult<()> {
    let mut log_stream = log_stream_factory.open(log_group, &step.name).await?;
    driver
        .run_step(step, decision, execution_id, previous_execution, log_stream.as_mut(), plan_parser, approval_link)
        .await
}

/// Records the execution id currently in flight for a step, so a
/// cancelled or crashed tick leaves behind enough state for the next
/// tick's `PipelineDriver` to find and stop it if it's still sitting in
/// `WaitApproval` once a new execution for the same step reaches `Plan`.
fn set_pending_execution(state: &mut State, step_name: &str, execution_id: Option<String>) {
    let step_state = match state.step_mut(step_name) {
        Some(s) => s,
        None => {
            state.steps.push(StepState::new(step_name.to_string(), String::new()));
            state.steps.last_mut().unwrap()
        }
    };
    step_state.pending_execution_id = execution_id;
}

fn resolved_versions_for(iteration: &ReleaseIteration) -> HashMap<(String, String), ModuleVersion> {
    iteration
        .steps
        .iter()
        .flat_map(|step_decision| {
            step_decision
                .modules
                .iter()
                .map(|m| ((step_decision.step.clone(), m.module.clone()), ModuleVersion::Exact(m.version.clone())))
        })
        .collect()
}

fn project_spec_for(config: &Config, step: &crate::model::Step, settings: &AgentSettings) -> ProjectSpec {
    let vpc = step.vpc.clone().unwrap_or_default();
    let mut environment = HashMap::from([
        ("WORKSPACE".to_string(), step.workspace.clone()),
        (
            "COMMAND".to_string(),
            if step.step_type.is_terraform() { "terraform".to_string() } else { "argocd".to_string() },
        ),
        ("PREFIX".to_string(), config.prefix.clone()),
        ("BUCKET".to_string(), settings.materializer.state_bucket.clone()),
    ]);
    if let Some(cluster) = &step.kubernetes_cluster_name {
        environment.insert("CLUSTER".to_string(), cluster.clone());
    }
    if let Some(namespace) = &step.argocd_namespace {
        environment.insert("NAMESPACE".to_string(), namespace.clone());
    }
    for module in &step.modules {
        if !module.is_client_module() {
            continue;
        }
        if let Some(username) = &module.http_username {
            environment.insert("HTTP_USERNAME".to_string(), username.clone());
        }
        if let Some(password) = &module.http_password {
            environment.insert("HTTP_PASSWORD".to_string(), password.clone());
        }
    }
    ProjectSpec {
        name: format!("{}-{}", config.prefix, step.name),
        image: "hashicorp/terraform:light".to_string(),
        environment,
        vpc_id: vpc.id,
        subnets: vpc.subnets,
        security_groups: vpc.security_groups,
        log_group: format!("/infralib/{}/{}", config.prefix, step.name),
    }
}

fn apply_decision_to_state(state: &mut State, decision: &StepDecision) {
    let step_state = match state.step_mut(&decision.step) {
        Some(s) => s,
        None => {
            state.steps.push(StepState::new(decision.step.clone(), String::new()));
            state.steps.last_mut().unwrap()
        }
    };
    step_state.applied_at = Some(Utc::now());
    for module_decision in &decision.modules {
        let module_state = match step_state.module_mut(&module_decision.module) {
            Some(m) => m,
            None => {
                step_state.modules.push(crate::model::ModuleState::new(module_decision.module.clone(), module_decision.module_type.clone()));
                step_state.modules.last_mut().unwrap()
            }
        };
        if module_decision.changed {
            metrics::increment_module_version_bumps_total(&decision.step, &module_decision.module);
        }
        module_state.version = Some(ModuleVersion::Exact(module_decision.version.clone()));
        module_state.applied_version = Some(ModuleVersion::Exact(module_decision.version.clone()));
        module_state.auto_approve = module_decision.auto_approve;
    }
}

/// Runs ticks forever (or once, for `--once`/CLI `tick`), sleeping between
/// them according to `config.schedule.update_cron` when one is set, or
/// returning after the first tick when none is.
#[allow(clippy::too_many_arguments)]
pub async fn run_loop(
    object_store: &dyn ObjectStore,
    parameter_store: &dyn ParameterStore,
    builder: &dyn Builder,
    pipeline: &dyn Pipeline,
    log_stream_factory: &dyn LogStreamFactory,
    release_catalog: &dyn ReleaseCatalog,
    notifier: &dyn Notifier,
    settings: &AgentSettings,
    once: bool,
    ready: std::sync::Arc<std::sync::atomic::AtomicBool>,
    mut cancel: watch::Receiver<bool>,
) -> CoreResult<()> {
    loop {
        if *cancel.borrow() {
            return Ok(());
        }
        let report = run_tick(
            object_store,
            parameter_store,
            builder,
            pipeline,
            log_stream_factory,
            release_catalog,
            notifier,
            settings,
            cancel.clone(),
        )
        .await?;
        for warning in &report.warnings {
            warn!("{warning}");
        }
        info!(steps_applied = report.steps_applied.len(), "tick complete");
        ready.store(true, std::sync::atomic::Ordering::Relaxed);

        if once {
            return Ok(());
        }

        let location = match &settings.config_source {
            ConfigSource::Local(path) => ConfigLocation::Local(path),
            ConfigSource::Object(key) => ConfigLocation::Object(key),
        };
        let config = config::load(location, object_store, release_catalog, parameter_store, &settings.account_id).await?;
        let Some(schedule) = config.schedule.as_ref() else {
            info!("no schedule configured, exiting after one tick");
            return Ok(());
        };
        let parsed = cron::CronSchedule::parse(&schedule.update_cron)
            .map_err(|e| CoreError::Config(crate::errors::ConfigError::single(format!("invalid schedule.update_cron: {e}"))))?;
        let Some(next) = parsed.next_after(Utc::now()) else {
            return Err(CoreError::Config(crate::errors::ConfigError::single("schedule.update_cron never matches")));
        };
        let sleep_for = (next - Utc::now()).to_std().unwrap_or_default();
        info!(next_tick = %next, "sleeping until next scheduled tick");

        tokio::select! {
            _ = tokio::time::sleep(sleep_for) => {}
            _ = cancel.changed() => {
                if *cancel.borrow() {
                    return Ok(());
                }
            }
        }
    }
}
