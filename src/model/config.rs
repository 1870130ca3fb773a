//! Resolved configuration types: `Config`, its `Step`s, and each step's
//! `Module`s.

use super::ModuleVersion;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A releasable upstream repository a config references.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub url: String,
    #[serde(default)]
    pub version: Option<ModuleVersion>,
}

/// Top-level configuration document (`config.yaml`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub sources: Vec<Source>,

    #[serde(default)]
    pub base_config: Option<BaseConfig>,

    pub prefix: String,

    #[serde(default)]
    pub version: Option<ModuleVersion>,

    #[serde(default)]
    pub agent_version: Option<String>,

    #[serde(default)]
    pub schedule: Option<Schedule>,

    pub steps: Vec<Step>,
}

impl Config {
    /// The first configured source, which `stable` resolves against.
    pub fn primary_source(&self) -> Option<&Source> {
        self.sources.first()
    }

    pub fn step(&self, name: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.name == name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseConfig {
    pub profile: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub update_cron: String,
}

/// Engine a step is driven by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepType {
    Terraform,
    TerraformCustom,
    ArgocdApps,
}

impl StepType {
    pub fn is_terraform(self) -> bool {
        matches!(self, StepType::Terraform | StepType::TerraformCustom)
    }
}

/// Approval policy for a step's modules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovePolicy {
    Never,
    Minor,
    Major,
    Always,
    Reject,
    Force,
}

impl Default for ApprovePolicy {
    fn default() -> Self {
        ApprovePolicy::Minor
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Vpc {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub subnets: Vec<String>,
    #[serde(default)]
    pub security_groups: Vec<String>,
}

/// Inline literal file attached to a step or module, copied or
/// template-substituted verbatim depending on its extension.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InlineFile {
    pub path: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub name: String,
    #[serde(rename = "type")]
    pub step_type: StepType,
    pub workspace: String,
    #[serde(default)]
    pub approve: ApprovePolicy,
    #[serde(default)]
    pub version: Option<ModuleVersion>,
    #[serde(default)]
    pub vpc: Option<Vpc>,
    #[serde(default)]
    pub kubernetes_cluster_name: Option<String>,
    #[serde(default)]
    pub argocd_namespace: Option<String>,
    #[serde(default)]
    pub provider: Option<serde_yaml::Value>,
    #[serde(default)]
    pub modules: Vec<Module>,
    #[serde(default)]
    pub files: Vec<InlineFile>,
    #[serde(default)]
    pub before: Vec<String>,
    #[serde(default)]
    pub after: Vec<String>,
}

impl Step {
    pub fn module(&self, name: &str) -> Option<&Module> {
        self.modules.iter().find(|m| m.name == name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Module {
    pub name: String,
    pub source: String,
    #[serde(default)]
    pub version: Option<ModuleVersion>,
    #[serde(default)]
    pub http_username: Option<String>,
    #[serde(default)]
    pub http_password: Option<String>,
    /// A client (custom git) module that needs no http credentials — a
    /// public repository, or one reachable without auth (e.g. an SSH deploy
    /// key configured outside this config). Exempts the module from the
    /// client-module-credentials validation rule.
    #[serde(default)]
    pub public: bool,
    #[serde(default)]
    pub inputs: HashMap<String, serde_yaml::Value>,
    #[serde(default)]
    pub files: Vec<InlineFile>,
}

impl Module {
    /// The slash-suffix of `source` — `aws/vpc` → `vpc` — used by the
    /// `toutput`/`tmodule` template lookups which address modules by type
    /// rather than by name.
    pub fn module_type(&self) -> &str {
        self.source.rsplit('/').next().unwrap_or(&self.source)
    }

    pub fn is_client_module(&self) -> bool {
        self.source.contains("://") || self.source.ends_with(".git")
    }
}
