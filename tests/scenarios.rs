//! End-to-end `agent::run_tick` scenarios against the full fake port
//! bundle: a single Terraform step carried through every path the
//! Pipeline Driver can take.

mod support;

use chrono::{TimeZone, Utc};
use infralib_agent::agent::{run_tick, AgentSettings, ConfigSource};
use infralib_agent::errors::CoreError;
use infralib_agent::materializer::MaterializerSettings;
use infralib_agent::model::Release;
use infralib_agent::ports::PipelineState;
use support::{FakeBuilder, FakeLogStreamFactory, FakeNotifier, FakeObjectStore, FakeParameterStore, FakePipeline, FakeReleaseCatalog};
use tokio::sync::watch;

const SOURCE_URL: &str = "https://git.example.com/org/infra";

fn config_yaml(approve: &str) -> Vec<u8> {
    format!(
        "sources:\n  - url: \"{SOURCE_URL}\"\nprefix: demo\nsteps:\n  - name: net\n    type: terraform\n    workspace: dev\n    approve: {approve}\n    modules:\n      - name: main\n        source: aws/vpc\n        version: stable\n"
    )
    .into_bytes()
}

fn argocd_config_yaml(approve: &str) -> Vec<u8> {
    format!(
        "sources:\n  - url: \"{SOURCE_URL}\"\nprefix: demo\nsteps:\n  - name: apps\n    type: argocd-apps\n    workspace: dev\n    approve: {approve}\n    kubernetes_cluster_name: prod\n    modules:\n      - name: main\n        source: dashboard\n        version: stable\n"
    )
    .into_bytes()
}

fn settings() -> AgentSettings {
    AgentSettings {
        config_source: ConfigSource::Object("config.yaml".to_string()),
        account_id: "111122223333".to_string(),
        materializer: MaterializerSettings {
            state_bucket: "tf-state".to_string(),
            lock_table: "tf-locks".to_string(),
            code_repo_ssh_url: "git@example.com:org/infra.git".to_string(),
            cloud_provider: "aws".to_string(),
        },
        approval_link_base: "https://console.example.com/approvals".to_string(),
        allow_parallel: false,
    }
}

struct Harness {
    object_store: FakeObjectStore,
    parameter_store: FakeParameterStore,
    builder: FakeBuilder,
    pipeline: FakePipeline,
    log_stream_factory: FakeLogStreamFactory,
    release_catalog: FakeReleaseCatalog,
    notifier: FakeNotifier,
}

impl Harness {
    fn new(approve: &str) -> Self {
        Self::from_config_yaml(config_yaml(approve))
    }

    fn from_config_yaml(config_yaml: Vec<u8>) -> Self {
        let object_store = FakeObjectStore::new();
        object_store.seed("config.yaml", config_yaml);

        let release_catalog = FakeReleaseCatalog::new();
        release_catalog.seed_releases(
            SOURCE_URL,
            vec![Release::new("v1.0.0", semver::Version::new(1, 0, 0), Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap())],
        );

        Self {
            object_store,
            parameter_store: FakeParameterStore::new(),
            builder: FakeBuilder::new(),
            pipeline: FakePipeline::new(),
            log_stream_factory: FakeLogStreamFactory::new(),
            release_catalog,
            notifier: FakeNotifier::new(),
        }
    }

    async fn run_tick(&self) -> infralib_agent::errors::CoreResult<infralib_agent::agent::TickReport> {
        let (_tx, rx) = watch::channel(false);
        run_tick(
            &self.object_store,
            &self.parameter_store,
            &self.builder,
            &self.pipeline,
            &self.log_stream_factory,
            &self.release_catalog,
            &self.notifier,
            &settings(),
            rx,
        )
        .await
    }

    async fn run_tick_cancelled(&self) -> infralib_agent::errors::CoreResult<infralib_agent::agent::TickReport> {
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();
        run_tick(
            &self.object_store,
            &self.parameter_store,
            &self.builder,
            &self.pipeline,
            &self.log_stream_factory,
            &self.release_catalog,
            &self.notifier,
            &settings(),
            rx,
        )
        .await
    }
}

#[tokio::test]
async fn creation_tick_auto_approves_and_persists_state() {
    let harness = Harness::new("minor");
    harness.pipeline.queue_states("net", vec![PipelineState::Plan, PipelineState::Succeeded]);
    harness
        .log_stream_factory
        .set_lines("net", vec!["Plan: 1 to add, 0 to change, 0 to destroy.".to_string()]);

    let report = harness.run_tick().await.unwrap();

    assert_eq!(report.steps_applied, vec!["net".to_string()]);
    assert_eq!(harness.pipeline.approvals().len(), 1);
    assert!(harness.notifier.manual_approvals.lock().unwrap().is_empty());
    assert!(harness.object_store.contains(&format!("{}/state.yaml", "demo")));
}

#[tokio::test]
async fn tick_with_a_major_bump_is_gated_on_manual_approval() {
    let harness = Harness::new("minor");
    // Existing state one major version behind the only release in the
    // catalog, so the resolver's Minor policy gates instead of
    // auto-approving.
    harness.object_store.seed(
        "demo/state.yaml",
        b"steps:\n  - name: net\n    workspace: dev\n    modules:\n      - name: main\n        type: vpc\n        version: \"0.1.0\"\n"
            .to_vec(),
    );
    harness
        .pipeline
        .queue_states("net", vec![PipelineState::Plan, PipelineState::Succeeded, PipelineState::Succeeded]);
    harness
        .log_stream_factory
        .set_lines("net", vec!["Plan: 0 to add, 1 to change, 0 to destroy.".to_string()]);

    let report = harness.run_tick().await.unwrap();

    assert_eq!(report.steps_applied, vec!["net".to_string()]);
    assert_eq!(harness.notifier.manual_approvals.lock().unwrap().len(), 1);
    assert!(harness.pipeline.approvals().is_empty());
}

#[tokio::test]
async fn reject_policy_stops_the_pipeline_and_surfaces_an_error() {
    let harness = Harness::new("reject");
    harness.pipeline.queue_states("net", vec![PipelineState::Plan]);
    harness
        .log_stream_factory
        .set_lines("net", vec!["Plan: 1 to add, 0 to change, 0 to destroy.".to_string()]);

    let err = harness.run_tick().await.unwrap_err();

    assert!(matches!(err, CoreError::PipelineRejected { step } if step == "net"));
    assert_eq!(harness.pipeline.stops().len(), 1);
}

#[tokio::test]
async fn destructive_change_is_gated_even_when_the_version_decision_auto_approves() {
    let harness = Harness::new("minor");
    harness
        .pipeline
        .queue_states("net", vec![PipelineState::Plan, PipelineState::Succeeded, PipelineState::Succeeded]);
    harness
        .log_stream_factory
        .set_lines("net", vec!["Plan: 0 to add, 0 to change, 1 to destroy.".to_string()]);

    let report = harness.run_tick().await.unwrap();

    assert_eq!(report.steps_applied, vec!["net".to_string()]);
    assert_eq!(harness.notifier.manual_approvals.lock().unwrap().len(), 1);
    assert!(harness.pipeline.approvals().is_empty());
}

#[tokio::test]
async fn a_no_op_plan_completes_without_any_approval_step() {
    let harness = Harness::new("minor");
    harness.pipeline.queue_states("net", vec![PipelineState::Plan, PipelineState::Succeeded]);
    harness
        .log_stream_factory
        .set_lines("net", vec!["No changes. Your infrastructure matches the configuration.".to_string()]);

    let report = harness.run_tick().await.unwrap();

    assert_eq!(report.steps_applied, vec!["net".to_string()]);
    assert!(harness.pipeline.approvals().is_empty());
    assert!(harness.notifier.manual_approvals.lock().unwrap().is_empty());
}

#[tokio::test]
async fn an_argocd_apps_step_materializes_and_auto_approves() {
    let harness = Harness::from_config_yaml(argocd_config_yaml("force"));
    harness.pipeline.queue_states("apps", vec![PipelineState::Plan, PipelineState::Succeeded]);
    harness
        .release_catalog
        .seed_file(SOURCE_URL, "modules/k8s/dashboard/argo-apps.yaml", "v1.0.0", b"{}\n".to_vec());
    harness
        .log_stream_factory
        .set_lines("apps", vec!["ArgoCD Applications: 1 has changed objects, 0 has RequiredPruning objects".to_string()]);

    let report = harness.run_tick().await.unwrap();

    assert_eq!(report.steps_applied, vec!["apps".to_string()]);
    assert_eq!(harness.pipeline.approvals().len(), 1);
    assert!(harness.object_store.contains("demo-apps/dev/main-app.yaml"));
}

#[tokio::test]
async fn a_new_execution_supersedes_a_stale_manual_approval_wait() {
    let harness = Harness::new("minor");
    harness.object_store.seed(
        "demo/state.yaml",
        b"steps:\n  - name: net\n    workspace: dev\n    pending_execution_id: \"net-exec-stale\"\n".to_vec(),
    );
    harness.pipeline.pin_state("net", "net-exec-stale", PipelineState::WaitApproval);
    harness.pipeline.queue_states("net", vec![PipelineState::Plan, PipelineState::Succeeded]);
    harness
        .log_stream_factory
        .set_lines("net", vec!["No changes. Your infrastructure matches the configuration.".to_string()]);

    let report = harness.run_tick().await.unwrap();

    assert_eq!(report.steps_applied, vec!["net".to_string()]);
    let stops = harness.pipeline.stops();
    assert_eq!(stops, vec![("net".to_string(), "new pipeline execution started".to_string())]);
}

#[tokio::test]
async fn a_cancelled_tick_returns_immediately_without_touching_the_pipeline() {
    let harness = Harness::new("minor");

    let err = harness.run_tick_cancelled().await.unwrap_err();

    assert!(matches!(err, CoreError::Cancelled));
    assert_eq!(harness.pipeline.approvals().len(), 0);
    assert_eq!(harness.pipeline.stops().len(), 0);
}
