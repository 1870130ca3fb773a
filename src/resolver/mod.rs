//! # Version Resolver
//!
//! Pure and synchronous: no port calls, no clock reads beyond what the
//! caller passes in. Given a config, the persisted state and the
//! concrete releases a tick will visit, it decides — per module, per
//! release in the window — which version applies and whether that
//! application auto-approves. `tracing::instrument` spans are the only
//! ambient addition; the algorithm itself takes no dependency on the
//! rest of the crate beyond the data model.

use crate::model::{ApprovePolicy, Config, Module, Release, State, Step};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct ModuleDecision {
    pub module: String,
    pub module_type: String,
    pub version: semver::Version,
    pub auto_approve: bool,
    pub changed: bool,
}

#[derive(Debug, Clone)]
pub struct StepDecision {
    pub step: String,
    pub modules: Vec<ModuleDecision>,
}

impl StepDecision {
    /// A step is `auto_approve` overall iff every module in it is.
    pub fn auto_approve(&self) -> bool {
        !self.modules.is_empty() && self.modules.iter().all(|m| m.auto_approve)
    }

    pub fn any_changed(&self) -> bool {
        self.modules.iter().any(|m| m.changed)
    }
}

/// One release's worth of per-step decisions. The first iteration in a
/// tick's window is the creation iteration (artefacts and pipelines are
/// created from scratch); later iterations only rewrite what changed.
#[derive(Debug, Clone)]
pub struct ReleaseIteration {
    pub release: Release,
    pub is_creation: bool,
    pub steps: Vec<StepDecision>,
}

/// `oldest = min(all module_target, all state.version)`, `newest = max(all
/// module_target)`; `newest` collapses to `stable` if any module resolves
/// its target through `stable`.
#[tracing::instrument(skip_all)]
pub fn release_window(config: &Config, state: &State, stable: &semver::Version) -> (semver::Version, semver::Version) {
    let mut targets = Vec::new();
    let mut any_stable = false;

    for step in &config.steps {
        for module in &step.modules {
            if matches!(effective_raw_version(module, step, config), None | Some(crate::model::ModuleVersion::Stable)) {
                any_stable = true;
            }
            targets.push(module_target(module, step, config, stable));
        }
    }

    let mut floor_candidates = targets.clone();
    for step_state in &state.steps {
        for module_state in &step_state.modules {
            if let Some(crate::model::ModuleVersion::Exact(v)) = &module_state.version {
                floor_candidates.push(v.clone());
            }
        }
    }

    let oldest = floor_candidates.into_iter().min().unwrap_or_else(|| stable.clone());
    let mut newest = targets.into_iter().max().unwrap_or_else(|| stable.clone());
    if any_stable {
        newest = stable.clone();
    }
    (oldest, newest)
}

/// Walks `releases` (already fetched, ascending, bounded to the window)
/// simulating the per-module state machine across iterations. Nothing
/// here is persisted; the Agent Loop commits the result of an iteration
/// to real state only after that iteration's pipeline apply succeeds.
#[tracing::instrument(skip_all)]
pub fn resolve_window(config: &Config, state: &State, releases: &[Release], stable: &semver::Version) -> Vec<ReleaseIteration> {
    let mut working: HashMap<(String, String), semver::Version> = HashMap::new();
    for step_state in &state.steps {
        for module_state in &step_state.modules {
            if let Some(crate::model::ModuleVersion::Exact(v)) = &module_state.version {
                working.insert((step_state.name.clone(), module_state.name.clone()), v.clone());
            }
        }
    }

    releases
        .iter()
        .enumerate()
        .map(|(i, release)| {
            let steps = config
                .steps
                .iter()
                .map(|step| resolve_step(step, config, &mut working, release, stable))
                .collect();
            ReleaseIteration {
                release: release.clone(),
                is_creation: i == 0,
                steps,
            }
        })
        .collect()
}

fn resolve_step(
    step: &Step,
    config: &Config,
    working: &mut HashMap<(String, String), semver::Version>,
    release: &Release,
    stable: &semver::Version,
) -> StepDecision {
    let modules = step
        .modules
        .iter()
        .map(|module| {
            let target = module_target(module, step, config, stable);
            let key = (step.name.clone(), module.name.clone());
            let existing = working.get(&key).cloned();
            let (version, auto_approve, changed) = decide(existing.as_ref(), &target, &release.version, step.approve);
            working.insert(key, version.clone());
            ModuleDecision {
                module: module.name.clone(),
                module_type: module.module_type().to_string(),
                version,
                auto_approve,
                changed,
            }
        })
        .collect();

    StepDecision {
        step: step.name.clone(),
        modules,
    }
}

fn effective_raw_version<'a>(module: &'a Module, step: &'a Step, config: &'a Config) -> Option<&'a crate::model::ModuleVersion> {
    module.version.as_ref().or(step.version.as_ref()).or(config.version.as_ref())
}

fn module_target(module: &Module, step: &Step, config: &Config, stable: &semver::Version) -> semver::Version {
    match effective_raw_version(module, step, config) {
        None | Some(crate::model::ModuleVersion::Stable) => stable.clone(),
        Some(crate::model::ModuleVersion::Exact(v)) => v.clone(),
    }
}

/// Per-module version decision, checked in order: no recorded version,
/// already at target below the release tag, ahead of the release tag,
/// or (falling through) advance and classify by policy.
fn decide(
    existing: Option<&semver::Version>,
    target: &semver::Version,
    release_tag: &semver::Version,
    policy: ApprovePolicy,
) -> (semver::Version, bool, bool) {
    match existing {
        None => (std::cmp::min(target.clone(), release_tag.clone()), true, true),
        Some(v) if v == target && target < release_tag => (v.clone(), false, false),
        Some(v) if v > release_tag => (v.clone(), false, false),
        Some(v) => {
            let auto_approve = classify(Some(v), release_tag, policy);
            (release_tag.clone(), auto_approve, true)
        }
    }
}

/// Whether a bump from `existing` to `release_tag` auto-approves under
/// `policy`. `Major`/`Minor` name the granularity a bump has to reach
/// before it gates: `Minor` auto-approves only a patch-only bump, `Major`
/// auto-approves anything short of a major bump.
fn classify(existing: Option<&semver::Version>, release_tag: &semver::Version, policy: ApprovePolicy) -> bool {
    match policy {
        ApprovePolicy::Never => true,
        ApprovePolicy::Always => false,
        ApprovePolicy::Force => true,
        ApprovePolicy::Reject => false,
        ApprovePolicy::Major => existing.map(|e| release_tag.major == e.major).unwrap_or(true),
        ApprovePolicy::Minor => existing
            .map(|e| release_tag.major == e.major && release_tag.minor == e.minor)
            .unwrap_or(true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModuleVersion, Source, StepType};
    use chrono::{TimeZone, Utc};

    fn release(tag: &str, major: u64, minor: u64, patch: u64, day: u32) -> Release {
        Release::new(tag, semver::Version::new(major, minor, patch), Utc.with_ymd_and_hms(2026, 1, day, 0, 0, 0).unwrap())
    }

    fn config_with_module(version: Option<ModuleVersion>, approve: ApprovePolicy) -> Config {
        Config {
            sources: vec![Source {
                url: "https://git.example.com/org/repo".into(),
                version: None,
            }],
            base_config: None,
            prefix: "p".into(),
            version: None,
            agent_version: None,
            schedule: None,
            steps: vec![Step {
                name: "net".into(),
                step_type: StepType::Terraform,
                workspace: "dev".into(),
                approve,
                version: None,
                vpc: None,
                kubernetes_cluster_name: None,
                argocd_namespace: None,
                provider: None,
                modules: vec![Module {
                    name: "main".into(),
                    source: "aws/vpc".into(),
                    version,
                    http_username: None,
                    http_password: None,
                    public: false,
                    inputs: Default::default(),
                    files: vec![],
                }],
                files: vec![],
                before: vec![],
                after: vec![],
            }],
        }
    }

    #[test]
    fn first_apply_chooses_min_of_target_and_release_and_auto_approves() {
        let config = config_with_module(Some(ModuleVersion::Stable), ApprovePolicy::Minor);
        let state = State::default();
        let stable = semver::Version::new(1, 4, 0);
        let releases = vec![release("v1.4.0", 1, 4, 0, 1)];

        let iterations = resolve_window(&config, &state, &releases, &stable);
        let decision = &iterations[0].steps[0].modules[0];
        assert_eq!(decision.version, stable);
        assert!(decision.auto_approve);
        assert!(decision.changed);
        assert!(iterations[0].is_creation);
    }

    #[test]
    fn minor_policy_gates_a_minor_bump() {
        let config = config_with_module(Some(ModuleVersion::Exact(semver::Version::new(1, 3, 0))), ApprovePolicy::Minor);
        let mut state = State::default();
        let mut step_state = crate::model::StepState::new("net", "dev");
        let mut module_state = crate::model::ModuleState::new("main", "vpc");
        module_state.version = Some(ModuleVersion::Exact(semver::Version::new(1, 2, 3)));
        step_state.modules.push(module_state);
        state.steps.push(step_state);

        let stable = semver::Version::new(1, 3, 0);
        let releases = vec![release("v1.3.0", 1, 3, 0, 1)];
        let iterations = resolve_window(&config, &state, &releases, &stable);
        let decision = &iterations[0].steps[0].modules[0];
        assert_eq!(decision.version, semver::Version::new(1, 3, 0));
        assert!(!decision.auto_approve);
        assert!(decision.changed);
    }

    #[test]
    fn resolving_twice_on_identical_inputs_is_deterministic() {
        let config = config_with_module(Some(ModuleVersion::Stable), ApprovePolicy::Minor);
        let state = State::default();
        let stable = semver::Version::new(1, 4, 0);
        let releases = vec![release("v1.4.0", 1, 4, 0, 1)];

        let a = resolve_window(&config, &state, &releases, &stable);
        let b = resolve_window(&config, &state, &releases, &stable);
        assert_eq!(a[0].steps[0].modules[0].version, b[0].steps[0].modules[0].version);
        assert_eq!(a[0].steps[0].modules[0].auto_approve, b[0].steps[0].modules[0].auto_approve);
    }
}
