//! # External Ports
//!
//! Cloud-agnostic interfaces the core depends on. Every
//! capability the agent needs from the outside world — object storage,
//! parameter store, build/pipeline orchestration, log streaming, release
//! listing, notification and scheduling — is an `async_trait` here. The
//! core never imports a cloud SDK directly; concrete adapters live under
//! `ports::aws`.

pub mod aws;
pub mod unsupported;

use crate::errors::{CoreResult, TransportError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Cloud provider a set of port adapters targets. Behavioural differences
/// between clouds live entirely inside each port implementation, never in
/// the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    Aws,
    Gcp,
    Azure,
    Local,
}

/// Versioned blob storage. Backs `config.yaml`, `state.yaml`, generated
/// per-step artefact trees and the agent's own `tf.tar.gz` pipeline
/// source bundle.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, bytes: &[u8]) -> CoreResult<()>;
    async fn get(&self, key: &str) -> CoreResult<Option<Vec<u8>>>;
    async fn delete(&self, keys: &[String]) -> CoreResult<()>;
    async fn list(&self, prefix: &str, exclude_folders: bool) -> CoreResult<Vec<String>>;
    async fn folder_exists(&self, prefix: &str) -> CoreResult<bool>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterType {
    String,
    StringList,
}

#[derive(Debug, Clone)]
pub struct Parameter {
    pub value: String,
    pub param_type: ParameterType,
}

impl Parameter {
    /// `StringList` values use comma as the separator.
    pub fn as_list(&self) -> Vec<String> {
        match self.param_type {
            ParameterType::StringList => self.value.split(',').map(|s| s.trim().to_string()).collect(),
            ParameterType::String => vec![self.value.clone()],
        }
    }
}

/// Keyed parameter storage, used both as a fallback for module outputs
/// (when the output cache has no entry) and for free-standing
/// `ssm-custom`/`gcsm-custom`/`output-custom` template tags.
#[async_trait]
pub trait ParameterStore: Send + Sync {
    async fn get(&self, name: &str) -> CoreResult<Option<Parameter>>;
    async fn put(&self, name: &str, value: &str, param_type: ParameterType) -> CoreResult<()>;
    async fn delete(&self, name: &str) -> CoreResult<()>;
    async fn list_tagged(&self) -> CoreResult<Vec<String>>;
}

/// A build project: the compute side of a pipeline (image, env vars, VPC
/// attachment, log destination, build spec). One project backs both the
/// apply pipeline and its destroy twin.
#[derive(Debug, Clone)]
pub struct ProjectSpec {
    pub name: String,
    pub image: String,
    pub environment: HashMap<String, String>,
    pub vpc_id: Option<String>,
    pub subnets: Vec<String>,
    pub security_groups: Vec<String>,
    pub log_group: String,
}

#[async_trait]
pub trait Builder: Send + Sync {
    async fn create_project(&self, spec: &ProjectSpec) -> CoreResult<()>;
    async fn update_project(&self, spec: &ProjectSpec) -> CoreResult<()>;
    async fn get_project(&self, name: &str) -> CoreResult<Option<ProjectSpec>>;
    async fn delete_project(&self, name: &str) -> CoreResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    SourceFetch,
    Plan,
    WaitApproval,
    Apply,
    Succeeded,
    Failed,
    Stopped,
    Superseded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalVerdict {
    Approved,
    Rejected,
}

/// Per-step (or per-step-destroy) pipeline orchestration.
#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn create_apply_pipeline(&self, step: &str, spec: &ProjectSpec) -> CoreResult<()>;
    async fn create_destroy_pipeline(&self, step: &str, spec: &ProjectSpec) -> CoreResult<()>;
    async fn update_pipeline(&self, step: &str, spec: &ProjectSpec) -> CoreResult<()>;
    async fn start(&self, step: &str) -> CoreResult<String>;
    async fn get_state(&self, step: &str, execution_id: &str) -> CoreResult<PipelineState>;
    async fn wait(&self, step: &str, execution_id: &str) -> CoreResult<PipelineState>;
    async fn stop(&self, step: &str, execution_id: &str, reason: &str) -> CoreResult<()>;
    async fn approve(&self, step: &str, token: &str, verdict: ApprovalVerdict) -> CoreResult<()>;
    async fn disable_stage_transition(&self, step: &str, stage: &str) -> CoreResult<()>;
}

/// Lazy sequence of log lines for a single build/run. The driver feeds
/// lines through a `PlanParser` until a match is found or a time budget
/// elapses.
#[async_trait]
pub trait LogStream: Send + Sync {
    async fn next_line(&mut self) -> CoreResult<Option<String>>;
}

/// Opens a fresh `LogStream` for one pipeline execution. A `LogStream`
/// itself is stateful (cursor into one log group/stream), so the agent
/// loop asks for a new one per step execution rather than the `Ports`
/// bundle holding a single shared instance.
#[async_trait]
pub trait LogStreamFactory: Send + Sync {
    async fn open(&self, log_group: &str, log_stream: &str) -> CoreResult<Box<dyn LogStream>>;
}

/// Lists/sorts/retrieves upstream releases and raw files at a tag.
#[async_trait]
pub trait ReleaseCatalog: Send + Sync {
    async fn latest_release(&self, source: &str) -> CoreResult<crate::model::Release>;
    async fn release_by_tag(&self, source: &str, tag: &str) -> CoreResult<crate::model::Release>;
    async fn releases_between(
        &self,
        source: &str,
        oldest: &semver::Version,
        newest: &semver::Version,
    ) -> CoreResult<Vec<crate::model::Release>>;
    async fn raw_file(&self, source: &str, path: &str, reference: &str) -> CoreResult<Vec<u8>>;
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn message(&self, text: &str) -> CoreResult<()>;
    async fn manual_approval(&self, pipeline: &str, changes: &crate::model::PipelineChangeSummary, link: &str)
        -> CoreResult<()>;
    async fn step_state(&self, status: &str, step: &str) -> CoreResult<()>;
}

#[async_trait]
pub trait Scheduler: Send + Sync {
    async fn get_schedule(&self, name: &str) -> CoreResult<Option<String>>;
    async fn create_schedule(&self, name: &str, cron: &str, target: &str) -> CoreResult<()>;
    async fn update_schedule(&self, name: &str, cron: &str, target: &str) -> CoreResult<()>;
    async fn delete_schedule(&self, name: &str) -> CoreResult<()>;
}

/// Bundles every port an agent run needs. Constructed once at startup by
/// `runtime::bootstrap` from the selected `ProviderType`.
pub struct Ports {
    pub object_store: Box<dyn ObjectStore>,
    pub parameter_store: Box<dyn ParameterStore>,
    pub builder: Box<dyn Builder>,
    pub pipeline: Box<dyn Pipeline>,
    pub log_stream_factory: Box<dyn LogStreamFactory>,
    pub release_catalog: Box<dyn ReleaseCatalog>,
    pub notifier: Box<dyn Notifier>,
    pub scheduler: Box<dyn Scheduler>,
}

pub(crate) fn unsupported(op: &str) -> TransportError {
    TransportError::new(format!("{op} is not implemented for this provider"))
}
