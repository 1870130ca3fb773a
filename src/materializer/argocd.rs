//! Per-step Argo CD manifest emission: fetches `modules/k8s/<source>/
//! argo-apps.yaml` at the module's resolved version, deep-merges it onto
//! an embedded base application manifest, and substitutes the
//! placeholder set `{{moduleName}}`, `{{moduleVersion}}`,
//! `{{moduleSource}}`, `{{moduleSourceURL}}`, `{{moduleValues}}`,
//! `{{codeRepoSSHUrl}}`, `{{cloudProvider}}`.

use crate::config::merge;
use crate::errors::{CoreError, CoreResult, TransportError};
use crate::model::{Module, Step};
use crate::ports::ReleaseCatalog;
use std::collections::HashMap;

const BASE_APPLICATION_YAML: &str = r#"apiVersion: argoproj.io/v1alpha1
kind: Application
metadata:
  name: "{{moduleName}}"
  namespace: argocd
spec:
  project: default
  source:
    repoURL: "{{moduleSourceURL}}"
    path: "{{moduleSource}}"
    targetRevision: "{{moduleVersion}}"
    helm:
      values: |
        {{moduleValues}}
  destination:
    server: https://kubernetes.default.svc
  syncPolicy:
    automated:
      prune: true
      selfHeal: true
"#;

pub struct ArgoCdContext<'a> {
    pub code_repo_ssh_url: &'a str,
    pub cloud_provider: &'a str,
}

pub async fn render_module_application(
    step: &Step,
    module: &Module,
    version: &semver::Version,
    source_url: &str,
    release_tag: &str,
    release_catalog: &dyn ReleaseCatalog,
    ctx: &ArgoCdContext<'_>,
) -> CoreResult<String> {
    let path = format!("modules/k8s/{}/argo-apps.yaml", module.source);
    let raw = release_catalog.raw_file(source_url, &path, release_tag).await?;
    let fetched_text =
        String::from_utf8(raw).map_err(|e| CoreError::Transport(TransportError::new(format!("{path} is not UTF-8: {e}"))))?;

    let fetched_value: serde_yaml::Value = serde_yaml::from_str(&fetched_text)
        .map_err(|e| CoreError::Transport(TransportError::new(format!("{path} is not valid YAML: {e}"))))?;
    let base_value: serde_yaml::Value = serde_yaml::from_str(BASE_APPLICATION_YAML).expect("embedded base application manifest is valid YAML");

    let merged = merge::merge(base_value, fetched_value);
    let rendered = serde_yaml::to_string(&merged)
        .map_err(|e| CoreError::Transport(TransportError::new(format!("re-serializing merged application for {}: {e}", module.name))))?;

    let values_block = module_values_block(module);
    let substitutions: HashMap<&str, String> = HashMap::from([
        ("{{moduleName}}", module.name.clone()),
        ("{{moduleVersion}}", format!("v{version}")),
        ("{{moduleSource}}", module.source.clone()),
        ("{{moduleSourceURL}}", source_url.to_string()),
        ("{{moduleValues}}", values_block),
        ("{{codeRepoSSHUrl}}", ctx.code_repo_ssh_url.to_string()),
        ("{{cloudProvider}}", ctx.cloud_provider.to_string()),
    ]);

    let mut out = rendered;
    for (placeholder, value) in substitutions {
        out = out.replace(placeholder, &value);
    }

    let _: serde_yaml::Value = serde_yaml::from_str(&out)
        .map_err(|e| CoreError::Transport(TransportError::new(format!("application manifest for {} does not parse after substitution: {e}", module.name))))?;
    Ok(out)
}

/// Helm `values.yaml` content for a module, indented to fit inside the
/// `helm.values: |` block without disturbing the surrounding YAML.
fn module_values_block(module: &Module) -> String {
    if module.inputs.is_empty() {
        return "        {}".to_string();
    }
    let serialized = serde_yaml::to_string(&module.inputs).unwrap_or_default();
    serialized
        .lines()
        .map(|line| format!("        {line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Per-module `<module>-values.yaml`, emitted only when the module has
/// inputs at all.
pub fn render_module_values_yaml(module: &Module) -> CoreResult<Option<String>> {
    if module.inputs.is_empty() {
        return Ok(None);
    }
    serde_yaml::to_string(&module.inputs)
        .map(Some)
        .map_err(|e| CoreError::Transport(TransportError::new(format!("serializing values for module {}: {e}", module.name))))
}
