//! Persisted state document: per-step, per-module applied versions, and
//! the change summary parsed out of a plan log.

use super::ModuleVersion;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleState {
    pub name: String,
    #[serde(rename = "type")]
    pub module_type: String,
    /// Set the first time a version is chosen for this module.
    #[serde(default)]
    pub version: Option<ModuleVersion>,
    /// Set only after the apply leg for this module's step has succeeded.
    #[serde(default)]
    pub applied_version: Option<ModuleVersion>,
    #[serde(default)]
    pub auto_approve: bool,
}

impl ModuleState {
    pub fn new(name: impl Into<String>, module_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            module_type: module_type.into(),
            version: None,
            applied_version: None,
            auto_approve: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepState {
    pub name: String,
    pub workspace: String,
    #[serde(default)]
    pub applied_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub modules: Vec<ModuleState>,
    /// Execution id of a run this step started but hasn't yet resolved to
    /// a terminal state. Set right after `Pipeline::start`, cleared once
    /// the run reaches Succeeded/Failed/Stopped/Superseded or errors out.
    /// Lets a later tick detect and stop a stale run still sitting in
    /// `WaitApproval` after a cancelled or crashed tick.
    #[serde(default)]
    pub pending_execution_id: Option<String>,
}

impl StepState {
    pub fn new(name: impl Into<String>, workspace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            workspace: workspace.into(),
            applied_at: None,
            modules: Vec::new(),
            pending_execution_id: None,
        }
    }

    pub fn module(&self, name: &str) -> Option<&ModuleState> {
        self.modules.iter().find(|m| m.name == name)
    }

    pub fn module_mut(&mut self, name: &str) -> Option<&mut ModuleState> {
        self.modules.iter_mut().find(|m| m.name == name)
    }

    /// Overall auto-approve classification: a step is `auto_approve` iff
    /// every module in it is.
    pub fn auto_approve(&self) -> bool {
        !self.modules.is_empty() && self.modules.iter().all(|m| m.auto_approve)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct State {
    #[serde(default)]
    pub steps: Vec<StepState>,
}

impl State {
    pub fn step(&self, name: &str) -> Option<&StepState> {
        self.steps.iter().find(|s| s.name == name)
    }

    pub fn step_mut(&mut self, name: &str) -> Option<&mut StepState> {
        self.steps.iter_mut().find(|s| s.name == name)
    }
}

/// Parsed out of a plan log by a `PlanParser`. Absence (`None` at the call
/// site) means "not yet observed", distinct from a summary of all zeros.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineChangeSummary {
    pub added: u32,
    pub changed: u32,
    pub destroyed: u32,
}

impl PipelineChangeSummary {
    pub fn no_changes(&self) -> bool {
        self.added == 0 && self.changed == 0 && self.destroyed == 0
    }
}
