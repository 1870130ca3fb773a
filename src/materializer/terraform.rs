//! Per-step Terraform file emission: `main.tf`, `provider.tf`,
//! `backend.conf`, plus any inline `files[]` declared on the step or its
//! modules.

use super::hcl;
use crate::errors::{CoreError, CoreResult};
use crate::model::{Config, Step};
use std::collections::HashMap;
use std::fmt::Write as _;

pub fn render_main_tf(config: &Config, step: &Step, versions: &HashMap<String, semver::Version>) -> CoreResult<String> {
    let source_url = config
        .primary_source()
        .map(|s| s.url.as_str())
        .ok_or_else(|| CoreError::Config(crate::errors::ConfigError::single("config has no primary source")))?;

    let mut out = String::new();
    for module in &step.modules {
        let version = versions.get(&module.name).ok_or_else(|| {
            CoreError::Config(crate::errors::ConfigError::single(format!(
                "no resolved version for module {} in step {}",
                module.name, step.name
            )))
        })?;

        writeln!(out, "module \"{}\" {{", module.name).ok();
        if module.is_client_module() {
            writeln!(out, "  source = \"git::{}?ref=v{version}\"", module.source).ok();
        } else {
            writeln!(out, "  source = \"git::{source_url}.git//modules/{}?ref=v{version}\"", module.source).ok();
        }
        writeln!(out, "  prefix = \"{}-{}-{}\"", config.prefix, step.name, module.name).ok();
        for (key, value) in &module.inputs {
            writeln!(out, "  {key} = {}", hcl::value(value)).ok();
        }
        writeln!(out, "}}\n").ok();
    }
    Ok(out)
}

pub fn render_provider_tf(step: &Step) -> Option<String> {
    let serde_yaml::Value::Mapping(providers) = step.provider.as_ref()? else {
        return None;
    };
    let mut out = String::new();
    for (name, attrs) in providers {
        let label = name.as_str().unwrap_or_default();
        let serde_yaml::Value::Mapping(attrs) = attrs else {
            continue;
        };
        out.push_str(&hcl::block("provider", Some(label), attrs));
        out.push('\n');
    }
    Some(out)
}

pub fn render_backend_conf(prefix: &str, step: &str, state_bucket: &str, lock_table: &str) -> String {
    format!(
        "bucket         = \"{state_bucket}\"\nkey            = \"{prefix}-{step}/terraform.tfstate\"\ndynamodb_table = \"{lock_table}\"\nencrypt        = true\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Module, Source, StepType};

    fn sample_step() -> (Config, Step) {
        let module = Module {
            name: "main".into(),
            source: "aws/vpc".into(),
            version: None,
            http_username: None,
            http_password: None,
            public: false,
            inputs: Default::default(),
            files: vec![],
        };
        let step = Step {
            name: "net".into(),
            step_type: StepType::Terraform,
            workspace: "dev".into(),
            approve: Default::default(),
            version: None,
            vpc: None,
            kubernetes_cluster_name: None,
            argocd_namespace: None,
            provider: None,
            modules: vec![module],
            files: vec![],
            before: vec![],
            after: vec![],
        };
        let config = Config {
            sources: vec![Source {
                url: "https://git.example.com/org/modules".into(),
                version: None,
            }],
            base_config: None,
            prefix: "p".into(),
            version: None,
            agent_version: None,
            schedule: None,
            steps: vec![step.clone()],
        };
        (config, step)
    }

    #[test]
    fn main_tf_embeds_module_source_and_ref() {
        let (config, step) = sample_step();
        let mut versions = HashMap::new();
        versions.insert("main".to_string(), semver::Version::new(1, 4, 0));
        let rendered = render_main_tf(&config, &step, &versions).unwrap();
        assert!(rendered.contains("module \"main\" {"));
        assert!(rendered.contains("git::https://git.example.com/org/modules.git//modules/aws/vpc?ref=v1.4.0"));
        assert!(rendered.contains("prefix = \"p-net-main\""));
    }

    #[test]
    fn main_tf_for_a_client_module_does_not_duplicate_its_source() {
        let (mut config, mut step) = sample_step();
        let module = Module {
            name: "custom".into(),
            source: "https://git.example.com/org/custom-vpc.git".into(),
            version: None,
            http_username: Some("ci".into()),
            http_password: Some("token".into()),
            public: false,
            inputs: Default::default(),
            files: vec![],
        };
        step.modules = vec![module];
        config.steps = vec![step.clone()];

        let mut versions = HashMap::new();
        versions.insert("custom".to_string(), semver::Version::new(2, 1, 0));
        let rendered = render_main_tf(&config, &step, &versions).unwrap();

        assert!(rendered.contains("source = \"git::https://git.example.com/org/custom-vpc.git?ref=v2.1.0\""));
        assert!(!rendered.contains("//modules/https://"));
    }
}
