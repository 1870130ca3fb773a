//! In-memory fakes for every port trait, shared by the integration test
//! binaries. Each fake is deliberately simple: enough state to drive the
//! Pipeline Driver and Agent Loop through a specific path without a real
//! sleep or network call anywhere.

#![allow(dead_code)]

use async_trait::async_trait;
use infralib_agent::errors::{CoreResult, NotFoundKind};
use infralib_agent::model::{PipelineChangeSummary, Release};
use infralib_agent::ports::{
    ApprovalVerdict, Builder, LogStream, LogStreamFactory, Notifier, Parameter, ParameterStore, ParameterType, Pipeline,
    PipelineState, ProjectSpec, ObjectStore, ReleaseCatalog,
};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

#[derive(Default)]
pub struct FakeObjectStore {
    data: Mutex<HashMap<String, Vec<u8>>>,
}

impl FakeObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, key: &str, bytes: Vec<u8>) {
        self.data.lock().unwrap().insert(key.to_string(), bytes);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.data.lock().unwrap().contains_key(key)
    }
}

#[async_trait]
impl ObjectStore for FakeObjectStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> CoreResult<()> {
        self.data.lock().unwrap().insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn get(&self, key: &str) -> CoreResult<Option<Vec<u8>>> {
        Ok(self.data.lock().unwrap().get(key).cloned())
    }

    async fn delete(&self, keys: &[String]) -> CoreResult<()> {
        let mut data = self.data.lock().unwrap();
        for key in keys {
            data.remove(key);
        }
        Ok(())
    }

    async fn list(&self, prefix: &str, _exclude_folders: bool) -> CoreResult<Vec<String>> {
        Ok(self.data.lock().unwrap().keys().filter(|k| k.starts_with(prefix)).cloned().collect())
    }

    async fn folder_exists(&self, prefix: &str) -> CoreResult<bool> {
        Ok(self.data.lock().unwrap().keys().any(|k| k.starts_with(prefix)))
    }
}

#[derive(Default)]
pub struct FakeParameterStore {
    data: Mutex<HashMap<String, Parameter>>,
}

impl FakeParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, name: &str, value: &str, param_type: ParameterType) {
        self.data.lock().unwrap().insert(
            name.to_string(),
            Parameter {
                value: value.to_string(),
                param_type,
            },
        );
    }
}

#[async_trait]
impl ParameterStore for FakeParameterStore {
    async fn get(&self, name: &str) -> CoreResult<Option<Parameter>> {
        Ok(self.data.lock().unwrap().get(name).cloned())
    }

    async fn put(&self, name: &str, value: &str, param_type: ParameterType) -> CoreResult<()> {
        self.data.lock().unwrap().insert(
            name.to_string(),
            Parameter {
                value: value.to_string(),
                param_type,
            },
        );
        Ok(())
    }

    async fn delete(&self, name: &str) -> CoreResult<()> {
        self.data.lock().unwrap().remove(name);
        Ok(())
    }

    async fn list_tagged(&self) -> CoreResult<Vec<String>> {
        Ok(self.data.lock().unwrap().keys().cloned().collect())
    }
}

#[derive(Default)]
pub struct FakeBuilder {
    projects: Mutex<HashMap<String, ProjectSpec>>,
}

impl FakeBuilder {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Builder for FakeBuilder {
    async fn create_project(&self, spec: &ProjectSpec) -> CoreResult<()> {
        self.projects.lock().unwrap().insert(spec.name.clone(), spec.clone());
        Ok(())
    }

    async fn update_project(&self, spec: &ProjectSpec) -> CoreResult<()> {
        self.projects.lock().unwrap().insert(spec.name.clone(), spec.clone());
        Ok(())
    }

    async fn get_project(&self, name: &str) -> CoreResult<Option<ProjectSpec>> {
        Ok(self.projects.lock().unwrap().get(name).cloned())
    }

    async fn delete_project(&self, name: &str) -> CoreResult<()> {
        self.projects.lock().unwrap().remove(name);
        Ok(())
    }
}

/// Pipeline fake driven entirely off a per-step queue of states: each
/// `get_state`/`wait` call pops the front, so a test controls the exact
/// transition sequence `PipelineDriver` observes without any real delay.
/// An empty queue answers `Succeeded` forever.
#[derive(Default)]
pub struct FakePipeline {
    queues: Mutex<HashMap<String, VecDeque<PipelineState>>>,
    /// Fixed answer for a specific (step, execution_id) pair, checked
    /// before the sequential queue — used to give a stale/superseded
    /// execution a state of its own, independent of the queue driving the
    /// current execution's polling.
    pinned: Mutex<HashMap<(String, String), PipelineState>>,
    approvals: Mutex<Vec<(String, ApprovalVerdict)>>,
    stops: Mutex<Vec<(String, String)>>,
    executions: Mutex<u64>,
}

impl FakePipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_states(&self, step: &str, states: Vec<PipelineState>) {
        self.queues.lock().unwrap().insert(step.to_string(), states.into_iter().collect());
    }

    pub fn pin_state(&self, step: &str, execution_id: &str, state: PipelineState) {
        self.pinned.lock().unwrap().insert((step.to_string(), execution_id.to_string()), state);
    }

    pub fn approvals(&self) -> Vec<(String, ApprovalVerdict)> {
        self.approvals.lock().unwrap().clone()
    }

    pub fn stops(&self) -> Vec<(String, String)> {
        self.stops.lock().unwrap().clone()
    }
}

#[async_trait]
impl Pipeline for FakePipeline {
    async fn create_apply_pipeline(&self, _step: &str, _spec: &ProjectSpec) -> CoreResult<()> {
        Ok(())
    }

    async fn create_destroy_pipeline(&self, _step: &str, _spec: &ProjectSpec) -> CoreResult<()> {
        Ok(())
    }

    async fn update_pipeline(&self, _step: &str, _spec: &ProjectSpec) -> CoreResult<()> {
        Ok(())
    }

    async fn start(&self, step: &str) -> CoreResult<String> {
        let mut n = self.executions.lock().unwrap();
        *n += 1;
        Ok(format!("{step}-exec-{n}"))
    }

    async fn get_state(&self, step: &str, execution_id: &str) -> CoreResult<PipelineState> {
        if let Some(state) = self.pinned.lock().unwrap().get(&(step.to_string(), execution_id.to_string())) {
            return Ok(*state);
        }
        let mut queues = self.queues.lock().unwrap();
        let queue = queues.entry(step.to_string()).or_default();
        Ok(queue.pop_front().unwrap_or(PipelineState::Succeeded))
    }

    async fn wait(&self, step: &str, execution_id: &str) -> CoreResult<PipelineState> {
        self.get_state(step, execution_id).await
    }

    async fn stop(&self, step: &str, _execution_id: &str, reason: &str) -> CoreResult<()> {
        self.stops.lock().unwrap().push((step.to_string(), reason.to_string()));
        Ok(())
    }

    async fn approve(&self, step: &str, _execution_id: &str, verdict: ApprovalVerdict) -> CoreResult<()> {
        self.approvals.lock().unwrap().push((step.to_string(), verdict));
        Ok(())
    }

    async fn disable_stage_transition(&self, _step: &str, _stage: &str) -> CoreResult<()> {
        Ok(())
    }
}

struct FakeLogStream {
    lines: VecDeque<String>,
}

#[async_trait]
impl LogStream for FakeLogStream {
    async fn next_line(&mut self) -> CoreResult<Option<String>> {
        Ok(self.lines.pop_front())
    }
}

#[derive(Default)]
pub struct FakeLogStreamFactory {
    lines: Mutex<HashMap<String, Vec<String>>>,
}

impl FakeLogStreamFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_lines(&self, step: &str, lines: Vec<String>) {
        self.lines.lock().unwrap().insert(step.to_string(), lines);
    }
}

#[async_trait]
impl LogStreamFactory for FakeLogStreamFactory {
    async fn open(&self, _log_group: &str, log_stream: &str) -> CoreResult<Box<dyn LogStream>> {
        let lines = self.lines.lock().unwrap().get(log_stream).cloned().unwrap_or_default();
        Ok(Box::new(FakeLogStream { lines: lines.into() }))
    }
}

#[derive(Default)]
pub struct FakeNotifier {
    pub messages: Mutex<Vec<String>>,
    pub manual_approvals: Mutex<Vec<String>>,
    pub step_states: Mutex<Vec<(String, String)>>,
}

impl FakeNotifier {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Notifier for FakeNotifier {
    async fn message(&self, text: &str) -> CoreResult<()> {
        self.messages.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn manual_approval(&self, pipeline: &str, _changes: &PipelineChangeSummary, _link: &str) -> CoreResult<()> {
        self.manual_approvals.lock().unwrap().push(pipeline.to_string());
        Ok(())
    }

    async fn step_state(&self, status: &str, step: &str) -> CoreResult<()> {
        self.step_states.lock().unwrap().push((step.to_string(), status.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeReleaseCatalog {
    releases: Mutex<HashMap<String, Vec<Release>>>,
    files: Mutex<HashMap<(String, String, String), Vec<u8>>>,
}

impl FakeReleaseCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_releases(&self, source: &str, releases: Vec<Release>) {
        self.releases.lock().unwrap().insert(source.to_string(), releases);
    }

    pub fn seed_file(&self, source: &str, path: &str, reference: &str, bytes: Vec<u8>) {
        self.files
            .lock()
            .unwrap()
            .insert((source.to_string(), path.to_string(), reference.to_string()), bytes);
    }
}

#[async_trait]
impl ReleaseCatalog for FakeReleaseCatalog {
    async fn latest_release(&self, source: &str) -> CoreResult<Release> {
        let releases = self.releases.lock().unwrap();
        let list = releases.get(source).cloned().unwrap_or_default();
        infralib_agent::catalog::latest(&list).ok_or_else(|| {
            NotFoundKind::Release {
                source: source.to_string(),
                tag: "latest".to_string(),
            }
            .into()
        })
    }

    async fn release_by_tag(&self, source: &str, tag: &str) -> CoreResult<Release> {
        let releases = self.releases.lock().unwrap();
        releases
            .get(source)
            .and_then(|list| list.iter().find(|r| r.tag == tag))
            .cloned()
            .ok_or_else(|| {
                NotFoundKind::Release {
                    source: source.to_string(),
                    tag: tag.to_string(),
                }
                .into()
            })
    }

    async fn releases_between(&self, source: &str, oldest: &semver::Version, newest: &semver::Version) -> CoreResult<Vec<Release>> {
        let releases = self.releases.lock().unwrap();
        let list = releases.get(source).cloned().unwrap_or_default();
        Ok(infralib_agent::catalog::releases_between(&list, oldest, newest))
    }

    async fn raw_file(&self, source: &str, path: &str, reference: &str) -> CoreResult<Vec<u8>> {
        self.files
            .lock()
            .unwrap()
            .get(&(source.to_string(), path.to_string(), reference.to_string()))
            .cloned()
            .ok_or_else(|| {
                NotFoundKind::File {
                    source: source.to_string(),
                    reference: reference.to_string(),
                    path: path.to_string(),
                }
                .into()
            })
    }
}
