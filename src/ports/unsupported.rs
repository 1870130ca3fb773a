//! A port bundle that implements every trait in `ports::mod` by returning
//! `TransportError`. Used for provider variants (`Gcp`, `Azure`) that are
//! modeled in `ProviderType` but have no concrete adapter shipped yet —
//! selecting one fails loudly at the first port call instead of the core
//! silently assuming AWS.

use super::{
    unsupported, ApprovalVerdict, Builder, LogStream, LogStreamFactory, Notifier, Parameter, ParameterStore, ParameterType,
    Pipeline, PipelineState, ProjectSpec, ReleaseCatalog, Scheduler,
};
use crate::errors::CoreResult;
use crate::model::{PipelineChangeSummary, Release};
use async_trait::async_trait;

#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedProvider {
    pub name: &'static str,
}

impl UnsupportedProvider {
    pub fn new(name: &'static str) -> Self {
        Self { name }
    }

    fn err(&self, op: &str) -> crate::errors::CoreError {
        unsupported(&format!("{} ({op})", self.name)).into()
    }
}

#[async_trait]
impl super::ObjectStore for UnsupportedProvider {
    async fn put(&self, _key: &str, _bytes: &[u8]) -> CoreResult<()> {
        Err(self.err("ObjectStore::put"))
    }
    async fn get(&self, _key: &str) -> CoreResult<Option<Vec<u8>>> {
        Err(self.err("ObjectStore::get"))
    }
    async fn delete(&self, _keys: &[String]) -> CoreResult<()> {
        Err(self.err("ObjectStore::delete"))
    }
    async fn list(&self, _prefix: &str, _exclude_folders: bool) -> CoreResult<Vec<String>> {
        Err(self.err("ObjectStore::list"))
    }
    async fn folder_exists(&self, _prefix: &str) -> CoreResult<bool> {
        Err(self.err("ObjectStore::folder_exists"))
    }
}

#[async_trait]
impl ParameterStore for UnsupportedProvider {
    async fn get(&self, _name: &str) -> CoreResult<Option<Parameter>> {
        Err(self.err("ParameterStore::get"))
    }
    async fn put(&self, _name: &str, _value: &str, _param_type: ParameterType) -> CoreResult<()> {
        Err(self.err("ParameterStore::put"))
    }
    async fn delete(&self, _name: &str) -> CoreResult<()> {
        Err(self.err("ParameterStore::delete"))
    }
    async fn list_tagged(&self) -> CoreResult<Vec<String>> {
        Err(self.err("ParameterStore::list_tagged"))
    }
}

#[async_trait]
impl Builder for UnsupportedProvider {
    async fn create_project(&self, _spec: &ProjectSpec) -> CoreResult<()> {
        Err(self.err("Builder::create_project"))
    }
    async fn update_project(&self, _spec: &ProjectSpec) -> CoreResult<()> {
        Err(self.err("Builder::update_project"))
    }
    async fn get_project(&self, _name: &str) -> CoreResult<Option<ProjectSpec>> {
        Err(self.err("Builder::get_project"))
    }
    async fn delete_project(&self, _name: &str) -> CoreResult<()> {
        Err(self.err("Builder::delete_project"))
    }
}

#[async_trait]
impl Pipeline for UnsupportedProvider {
    async fn create_apply_pipeline(&self, _step: &str, _spec: &ProjectSpec) -> CoreResult<()> {
        Err(self.err("Pipeline::create_apply_pipeline"))
    }
    async fn create_destroy_pipeline(&self, _step: &str, _spec: &ProjectSpec) -> CoreResult<()> {
        Err(self.err("Pipeline::create_destroy_pipeline"))
    }
    async fn update_pipeline(&self, _step: &str, _spec: &ProjectSpec) -> CoreResult<()> {
        Err(self.err("Pipeline::update_pipeline"))
    }
    async fn start(&self, _step: &str) -> CoreResult<String> {
        Err(self.err("Pipeline::start"))
    }
    async fn get_state(&self, _step: &str, _execution_id: &str) -> CoreResult<PipelineState> {
        Err(self.err("Pipeline::get_state"))
    }
    async fn wait(&self, _step: &str, _execution_id: &str) -> CoreResult<PipelineState> {
        Err(self.err("Pipeline::wait"))
    }
    async fn stop(&self, _step: &str, _execution_id: &str, _reason: &str) -> CoreResult<()> {
        Err(self.err("Pipeline::stop"))
    }
    async fn approve(&self, _step: &str, _token: &str, _verdict: ApprovalVerdict) -> CoreResult<()> {
        Err(self.err("Pipeline::approve"))
    }
    async fn disable_stage_transition(&self, _step: &str, _stage: &str) -> CoreResult<()> {
        Err(self.err("Pipeline::disable_stage_transition"))
    }
}

struct UnsupportedLogStream;

#[async_trait]
impl LogStream for UnsupportedLogStream {
    async fn next_line(&mut self) -> CoreResult<Option<String>> {
        Err(unsupported("LogStream::next_line").into())
    }
}

#[async_trait]
impl LogStreamFactory for UnsupportedProvider {
    async fn open(&self, _log_group: &str, _log_stream: &str) -> CoreResult<Box<dyn LogStream>> {
        Err(self.err("LogStreamFactory::open"))
    }
}

#[async_trait]
impl ReleaseCatalog for UnsupportedProvider {
    async fn latest_release(&self, _source: &str) -> CoreResult<Release> {
        Err(self.err("ReleaseCatalog::latest_release"))
    }
    async fn release_by_tag(&self, _source: &str, _tag: &str) -> CoreResult<Release> {
        Err(self.err("ReleaseCatalog::release_by_tag"))
    }
    async fn releases_between(&self, _source: &str, _oldest: &semver::Version, _newest: &semver::Version) -> CoreResult<Vec<Release>> {
        Err(self.err("ReleaseCatalog::releases_between"))
    }
    async fn raw_file(&self, _source: &str, _path: &str, _reference: &str) -> CoreResult<Vec<u8>> {
        Err(self.err("ReleaseCatalog::raw_file"))
    }
}

#[async_trait]
impl Notifier for UnsupportedProvider {
    async fn message(&self, _text: &str) -> CoreResult<()> {
        Err(self.err("Notifier::message"))
    }
    async fn manual_approval(&self, _pipeline: &str, _changes: &PipelineChangeSummary, _link: &str) -> CoreResult<()> {
        Err(self.err("Notifier::manual_approval"))
    }
    async fn step_state(&self, _status: &str, _step: &str) -> CoreResult<()> {
        Err(self.err("Notifier::step_state"))
    }
}

#[async_trait]
impl Scheduler for UnsupportedProvider {
    async fn get_schedule(&self, _name: &str) -> CoreResult<Option<String>> {
        Err(self.err("Scheduler::get_schedule"))
    }
    async fn create_schedule(&self, _name: &str, _cron: &str, _target: &str) -> CoreResult<()> {
        Err(self.err("Scheduler::create_schedule"))
    }
    async fn update_schedule(&self, _name: &str, _cron: &str, _target: &str) -> CoreResult<()> {
        Err(self.err("Scheduler::update_schedule"))
    }
    async fn delete_schedule(&self, _name: &str) -> CoreResult<()> {
        Err(self.err("Scheduler::delete_schedule"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn every_call_fails_with_transport_error() {
        let provider = UnsupportedProvider::new("gcp");
        let err = provider.get("anything").await.unwrap_err();
        assert!(matches!(err, crate::errors::CoreError::Transport(_)));
    }
}
