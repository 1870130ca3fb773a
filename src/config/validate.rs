//! Composite validator: every problem is collected before returning,
//! rather than failing on the first one found, so a single run tells an
//! operator everything wrong with a config at once.

use crate::errors::ConfigError;
use crate::model::{Config, StepType};
use crate::template::{self, ReplaceType, Tag};
use std::collections::HashSet;

pub fn validate(config: &Config) -> Result<(), ConfigError> {
    let mut problems = Vec::new();

    check_unique_names(config, &mut problems);
    check_template_references(config, &mut problems);
    check_client_module_credentials(config, &mut problems);
    check_argocd_cluster_name(config, &mut problems);

    if problems.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::new(problems))
    }
}

fn check_unique_names(config: &Config, problems: &mut Vec<String>) {
    let mut seen_steps = HashSet::new();
    for step in &config.steps {
        if !seen_steps.insert(step.name.as_str()) {
            problems.push(format!("duplicate step name {}", step.name));
        }
        let mut seen_modules = HashSet::new();
        for module in &step.modules {
            if !seen_modules.insert(module.name.as_str()) {
                problems.push(format!("step {}: duplicate module name {}", step.name, module.name));
            }
        }
    }
}

/// Collects every literal blob a step can carry — inline files and
/// serialized module inputs — and checks that `output`/`toutput`/
/// `tmodule` tags reference a step and module that actually exist.
/// `config.*`, `agent.*` and the custom parameter tags need no such
/// check: they resolve against facts the agent always has.
fn check_template_references(config: &Config, problems: &mut Vec<String>) {
    for step in &config.steps {
        let mut texts: Vec<String> = step.files.iter().map(|f| f.content.clone()).collect();
        for module in &step.modules {
            texts.extend(module.files.iter().map(|f| f.content.clone()));
            if let Ok(serialized) = serde_yaml::to_string(&module.inputs) {
                texts.push(serialized);
            }
        }

        for text in &texts {
            for t in template::scan(text) {
                let Tag::Reference { replace_type, key, .. } = t else {
                    continue;
                };
                match replace_type {
                    ReplaceType::Lookup(_) => {
                        check_step_module_reference(config, step, &key, problems);
                    }
                    ReplaceType::TOutput { .. } | ReplaceType::TModule => {
                        let module_type = key.split('.').next().unwrap_or("");
                        if !step.modules.iter().any(|m| m.module_type() == module_type) {
                            problems.push(format!(
                                "step {}: no module of type {module_type} for template reference",
                                step.name
                            ));
                        }
                    }
                    _ => {}
                }
            }
        }
    }
}

fn check_step_module_reference(config: &Config, referring_step: &crate::model::Step, key: &str, problems: &mut Vec<String>) {
    let mut parts = key.splitn(3, '.');
    let (Some(ref_step), Some(ref_module), Some(_)) = (parts.next(), parts.next(), parts.next()) else {
        problems.push(format!("step {}: malformed template key {key}", referring_step.name));
        return;
    };
    if config.step(ref_step).and_then(|s| s.module(ref_module)).is_none() {
        problems.push(format!(
            "step {}: template references unknown step/module {ref_step}.{ref_module}",
            referring_step.name
        ));
    }
}

fn check_client_module_credentials(config: &Config, problems: &mut Vec<String>) {
    for step in &config.steps {
        for module in &step.modules {
            if module.is_client_module() && !module.public && module.http_username.is_none() && module.http_password.is_none() {
                problems.push(format!(
                    "step {}: client module {} ({}) has no http credentials",
                    step.name, module.name, module.source
                ));
            }
        }
    }
}

fn check_argocd_cluster_name(config: &Config, problems: &mut Vec<String>) {
    for step in &config.steps {
        if step.step_type == StepType::ArgocdApps && step.kubernetes_cluster_name.is_none() {
            problems.push(format!("step {}: argocd-apps step has no kubernetes_cluster_name", step.name));
        }
    }
}
