//! # Config Loader & Validator
//!
//! Loads a local or remote `config.yaml`, optionally merges it with a
//! named base profile fetched from the primary source, re-runs
//! root-level template substitution, and validates the result.

pub(crate) mod merge;
mod validate;

pub use validate::validate;

use crate::errors::{CoreError, CoreResult, TransportError};
use crate::model::{Config, ModuleVersion};
use crate::ports::{ObjectStore, ParameterStore, ReleaseCatalog};
use crate::template::{TemplateContext, TemplateEngine};
use std::collections::HashMap;
use std::path::Path;

/// Where the top-level config document lives.
pub enum ConfigLocation<'a> {
    Local(&'a Path),
    Object(&'a str),
}

pub async fn load(
    location: ConfigLocation<'_>,
    object_store: &dyn ObjectStore,
    release_catalog: &dyn ReleaseCatalog,
    parameter_store: &dyn ParameterStore,
    account_id: &str,
) -> CoreResult<Config> {
    let raw = read(location, object_store).await?;
    let user_value: serde_yaml::Value = serde_yaml::from_str(&raw)
        .map_err(|e| CoreError::Transport(TransportError::new(format!("config is not valid YAML: {e}"))))?;

    let merged_value = match user_value.get("base_config").and_then(|b| b.get("profile")) {
        Some(serde_yaml::Value::String(profile)) => {
            let profile_text = fetch_profile(&user_value, profile, release_catalog).await?;
            let base_value: serde_yaml::Value = serde_yaml::from_str(&profile_text)
                .map_err(|e| CoreError::Transport(TransportError::new(format!("base profile {profile} is not valid YAML: {e}"))))?;
            merge::merge(base_value, user_value)
        }
        _ => user_value,
    };

    let mut config: Config = serde_yaml::from_value(merged_value)
        .map_err(|e| CoreError::Transport(TransportError::new(format!("merged config does not match the schema: {e}"))))?;

    substitute_root(&mut config, object_store, parameter_store, account_id).await?;
    validate::validate(&config)?;
    Ok(config)
}

async fn read(location: ConfigLocation<'_>, object_store: &dyn ObjectStore) -> CoreResult<String> {
    match location {
        ConfigLocation::Local(path) => tokio::fs::read_to_string(path)
            .await
            .map_err(|e| CoreError::Transport(TransportError::new(format!("reading {}: {e}", path.display())))),
        ConfigLocation::Object(key) => {
            let bytes = object_store
                .get(key)
                .await?
                .ok_or_else(|| CoreError::NotFound(crate::errors::NotFoundKind::Parameter { name: key.to_string() }))?;
            String::from_utf8(bytes).map_err(|e| CoreError::Transport(TransportError::new(format!("config at {key} is not UTF-8: {e}"))))
        }
    }
}

async fn fetch_profile(user_value: &serde_yaml::Value, profile: &str, release_catalog: &dyn ReleaseCatalog) -> CoreResult<String> {
    let source_url = user_value
        .get("sources")
        .and_then(|s| s.as_sequence())
        .and_then(|seq| seq.first())
        .and_then(|s| s.get("url"))
        .and_then(|u| u.as_str())
        .ok_or_else(|| CoreError::Transport(TransportError::new("config has no primary source to load a base profile from")))?;

    let configured_version = user_value.get("version").and_then(|v| v.as_str()).and_then(|raw| ModuleVersion::parse(raw).ok());

    let release = match configured_version {
        Some(ModuleVersion::Exact(version)) => release_catalog.release_by_tag(source_url, &format!("v{version}")).await?,
        _ => release_catalog.latest_release(source_url).await?,
    };

    let bytes = release_catalog
        .raw_file(source_url, &format!("profiles/{profile}.yaml"), &release.tag)
        .await?;
    String::from_utf8(bytes).map_err(|e| CoreError::Transport(TransportError::new(format!("base profile {profile} is not UTF-8: {e}"))))
}

/// Re-runs template substitution over every config field that can carry
/// a tag, resolving only `config.*`/`agent.accountid`/custom parameter
/// tags. Step-scoped tags are left untouched for the Materializer.
async fn substitute_root(
    config: &mut Config,
    object_store: &dyn ObjectStore,
    parameter_store: &dyn ParameterStore,
    account_id: &str,
) -> CoreResult<()> {
    let snapshot = config.clone();
    let empty_versions: HashMap<(String, String), ModuleVersion> = HashMap::new();
    let ctx = TemplateContext {
        config: &snapshot,
        account_id,
        resolved_versions: &empty_versions,
        current_step: None,
        current_step_is_terraform: false,
    };
    let mut engine = TemplateEngine::new(ctx, object_store, parameter_store);

    config.prefix = engine.render_matching(&config.prefix, TemplateEngine::is_root_tag).await?;

    for step in &mut config.steps {
        for module in &mut step.modules {
            for value in module.inputs.values_mut() {
                substitute_yaml_value(value, &mut engine).await?;
            }
        }
    }
    Ok(())
}

fn substitute_yaml_value<'a>(
    value: &'a mut serde_yaml::Value,
    engine: &'a mut TemplateEngine<'_>,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = CoreResult<()>> + 'a>> {
    Box::pin(async move {
        match value {
            serde_yaml::Value::String(s) => {
                *s = engine.render_matching(s, TemplateEngine::is_root_tag).await?;
            }
            serde_yaml::Value::Sequence(items) => {
                for item in items {
                    substitute_yaml_value(item, engine).await?;
                }
            }
            serde_yaml::Value::Mapping(map) => {
                for (_, v) in map.iter_mut() {
                    substitute_yaml_value(v, engine).await?;
                }
            }
            _ => {}
        }
        Ok(())
    })
}
