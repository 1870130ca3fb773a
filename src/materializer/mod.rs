//! # Artefact Materializer
//!
//! Renders a step's Terraform or Argo CD file set for one release
//! iteration and publishes it to the object store. The first iteration
//! in a tick's window (`is_creation`) always writes every file; later
//! iterations only publish files whose rendered content actually
//! changed, so an update tick doesn't needlessly retrigger a pipeline
//! over an unrelated step's unchanged artefacts.

mod argocd;
mod hcl;
mod terraform;

pub use argocd::ArgoCdContext;

use crate::errors::{CoreError, CoreResult};
use crate::model::{Config, InlineFile, Step};
use crate::ports::{ObjectStore, ReleaseCatalog};
use crate::resolver::StepDecision;
use crate::template::TemplateEngine;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct MaterializerSettings {
    pub state_bucket: String,
    pub lock_table: String,
    pub code_repo_ssh_url: String,
    pub cloud_provider: String,
}

#[derive(Debug, Clone)]
pub struct MaterializedArtifact {
    pub key: String,
    pub contents: Vec<u8>,
}

pub async fn materialize_step(
    config: &Config,
    step: &Step,
    decision: &StepDecision,
    is_creation: bool,
    settings: &MaterializerSettings,
    object_store: &dyn ObjectStore,
    release_catalog: &dyn ReleaseCatalog,
    engine: &mut TemplateEngine<'_>,
) -> CoreResult<Vec<MaterializedArtifact>> {
    let base = format!("{}-{}/{}", config.prefix, step.name, step.workspace);
    let mut artifacts = Vec::new();

    if step.step_type.is_terraform() {
        render_terraform_artifacts(config, step, decision, settings, &base, engine, &mut artifacts).await?;
    } else {
        render_argocd_artifacts(config, step, decision, release_catalog, settings, &base, engine, &mut artifacts).await?;
    }

    for file in &step.files {
        artifacts.push(materialize_inline_file(&base, file, engine).await?);
    }
    for module in &step.modules {
        for file in &module.files {
            artifacts.push(materialize_inline_file(&base, file, engine).await?);
        }
    }

    if !is_creation {
        artifacts = only_changed(artifacts, object_store).await?;
    }

    for artifact in &artifacts {
        object_store.put(&artifact.key, &artifact.contents).await?;
    }

    Ok(artifacts)
}

async fn render_terraform_artifacts(
    config: &Config,
    step: &Step,
    decision: &StepDecision,
    settings: &MaterializerSettings,
    base: &str,
    engine: &mut TemplateEngine<'_>,
    artifacts: &mut Vec<MaterializedArtifact>,
) -> CoreResult<()> {
    let versions: HashMap<String, semver::Version> = decision.modules.iter().map(|m| (m.module.clone(), m.version.clone())).collect();

    let main_tf = terraform::render_main_tf(config, step, &versions)?;
    let main_tf = engine.render(&main_tf).await?;
    artifacts.push(MaterializedArtifact {
        key: format!("{base}/main.tf"),
        contents: main_tf.into_bytes(),
    });

    if let Some(provider_tf) = terraform::render_provider_tf(step) {
        artifacts.push(MaterializedArtifact {
            key: format!("{base}/provider.tf"),
            contents: provider_tf.into_bytes(),
        });
    }

    let backend_conf = terraform::render_backend_conf(&config.prefix, &step.name, &settings.state_bucket, &settings.lock_table);
    artifacts.push(MaterializedArtifact {
        key: format!("{base}/backend.conf"),
        contents: backend_conf.into_bytes(),
    });
    Ok(())
}

async fn render_argocd_artifacts(
    config: &Config,
    step: &Step,
    decision: &StepDecision,
    release_catalog: &dyn ReleaseCatalog,
    settings: &MaterializerSettings,
    base: &str,
    engine: &mut TemplateEngine<'_>,
    artifacts: &mut Vec<MaterializedArtifact>,
) -> CoreResult<()> {
    let source_url = config
        .primary_source()
        .map(|s| s.url.as_str())
        .ok_or_else(|| CoreError::Config(crate::errors::ConfigError::single("config has no primary source")))?;
    let ctx = ArgoCdContext {
        code_repo_ssh_url: &settings.code_repo_ssh_url,
        cloud_provider: &settings.cloud_provider,
    };

    for module_decision in &decision.modules {
        let module = step.module(&module_decision.module).ok_or_else(|| {
            CoreError::Config(crate::errors::ConfigError::single(format!(
                "resolved module {} not found in step {}",
                module_decision.module, step.name
            )))
        })?;
        let release_tag = format!("v{}", module_decision.version);

        let app_yaml = argocd::render_module_application(step, module, &module_decision.version, source_url, &release_tag, release_catalog, &ctx).await?;
        artifacts.push(MaterializedArtifact {
            key: format!("{base}/{}-app.yaml", module.name),
            contents: app_yaml.into_bytes(),
        });

        if let Some(values_yaml) = argocd::render_module_values_yaml(module)? {
            let substituted = engine.render(&values_yaml).await?;
            artifacts.push(MaterializedArtifact {
                key: format!("{base}/{}-values.yaml", module.name),
                contents: substituted.into_bytes(),
            });
        }
    }
    Ok(())
}

async fn materialize_inline_file(base: &str, file: &InlineFile, engine: &mut TemplateEngine<'_>) -> CoreResult<MaterializedArtifact> {
    let is_templated = [".tf", ".yaml", ".yml", ".hcl"].iter().any(|ext| file.path.ends_with(ext));
    let contents = if is_templated {
        let rendered = engine.render(&file.content).await?;
        validate_rendered(&file.path, &rendered)?;
        rendered
    } else {
        file.content.clone()
    };
    Ok(MaterializedArtifact {
        key: format!("{base}/{}", file.path),
        contents: contents.into_bytes(),
    })
}

fn validate_rendered(path: &str, text: &str) -> CoreResult<()> {
    if path.ends_with(".yaml") || path.ends_with(".yml") {
        serde_yaml::from_str::<serde_yaml::Value>(text)
            .map_err(|e| CoreError::Config(crate::errors::ConfigError::single(format!("{path} does not parse as YAML after substitution: {e}"))))?;
    }
    if path.ends_with(".tf") || path.ends_with(".hcl") {
        check_balanced_braces(path, text)?;
    }
    Ok(())
}

/// No HCL parser is pulled in for validation (see the materializer's
/// design note on HCL emission); a brace-balance check catches the
/// common templating mistake of a substitution swallowing a closing
/// brace.
fn check_balanced_braces(path: &str, text: &str) -> CoreResult<()> {
    let mut depth = 0i32;
    for c in text.chars() {
        match c {
            '{' => depth += 1,
            '}' => depth -= 1,
            _ => {}
        }
        if depth < 0 {
            return Err(CoreError::Config(crate::errors::ConfigError::single(format!("{path} has unbalanced braces after substitution"))));
        }
    }
    if depth != 0 {
        return Err(CoreError::Config(crate::errors::ConfigError::single(format!("{path} has unbalanced braces after substitution"))));
    }
    Ok(())
}

async fn only_changed(artifacts: Vec<MaterializedArtifact>, object_store: &dyn ObjectStore) -> CoreResult<Vec<MaterializedArtifact>> {
    let mut changed = Vec::with_capacity(artifacts.len());
    for artifact in artifacts {
        let existing = object_store.get(&artifact.key).await?;
        if existing.as_deref() != Some(artifact.contents.as_slice()) {
            changed.push(artifact);
        }
    }
    Ok(changed)
}
