//! Dispatches each discovered tag by replace type and splices the
//! resolved text back into the source string. Evaluation order: all
//! tags in a file are discovered up front, then each is resolved against
//! a per-tick cache of output blobs — an error resolving any tag aborts
//! the whole file, never leaving a partial substitution behind.

use super::config_table::ConfigTable;
use super::output::OutputCache;
use super::tag::{self, Index, ReplaceType, Source, Tag};
use crate::errors::{CoreError, CoreResult, NotFoundKind, Warning};
use crate::model::{Config, ModuleVersion};
use crate::ports::{ObjectStore, ParameterStore};
use std::collections::HashMap;

/// Per-tick facts the engine needs beyond the ports: the config being
/// rendered, the resolved version of every module this tick, and (when
/// rendering a Terraform step's own files) which step that is, so
/// same-step `output.*` tags can be rewritten into HCL module
/// references instead of resolved eagerly.
pub struct TemplateContext<'a> {
    pub config: &'a Config,
    pub account_id: &'a str,
    pub resolved_versions: &'a HashMap<(String, String), ModuleVersion>,
    pub current_step: Option<&'a str>,
    pub current_step_is_terraform: bool,
}

pub struct TemplateEngine<'a> {
    ctx: TemplateContext<'a>,
    object_store: &'a dyn ObjectStore,
    parameter_store: &'a dyn ParameterStore,
    output_cache: OutputCache,
    config_table: ConfigTable,
    warnings: Vec<Warning>,
}

enum Resolved {
    Scalar(String),
    List(Vec<String>),
    Map(serde_json::Value),
}

impl Resolved {
    fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Array(items) => {
                Resolved::List(items.iter().map(scalar_string).collect())
            }
            serde_json::Value::Object(_) => Resolved::Map(value.clone()),
            other => Resolved::Scalar(scalar_string(other)),
        }
    }

    fn format(self, index: Option<&Index>, warnings: &mut Vec<Warning>) -> CoreResult<String> {
        match (self, index) {
            (Resolved::Scalar(s), None) => Ok(s),
            (Resolved::Scalar(_), Some(_)) => {
                Err(CoreError::Config(crate::errors::ConfigError::single("index used on a scalar template value")))
            }
            (Resolved::List(items), None) => Ok(items.join(",")),
            (Resolved::List(items), Some(Index::One(i))) => at(&items, *i),
            (Resolved::List(items), Some(Index::Range(lo, hi))) => {
                let slice = range(&items, *lo, *hi)?;
                Ok(slice.join(","))
            }
            (Resolved::Map(value), _) => {
                warnings.push(Warning::new("template value is a map; emitted as JSON"));
                serde_json::to_string(&value)
                    .map_err(|e| CoreError::Config(crate::errors::ConfigError::single(format!("map value not serializable: {e}"))))
            }
        }
    }
}

fn scalar_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn at(items: &[String], i: i64) -> CoreResult<String> {
    usize::try_from(i)
        .ok()
        .and_then(|i| items.get(i))
        .cloned()
        .ok_or_else(|| CoreError::Config(crate::errors::ConfigError::single(format!("index {i} out of range"))))
}

fn range(items: &[String], lo: i64, hi: i64) -> CoreResult<Vec<String>> {
    let (lo, hi) = (usize::try_from(lo), usize::try_from(hi));
    match (lo, hi) {
        (Ok(lo), Ok(hi)) if lo <= hi && hi < items.len() => Ok(items[lo..=hi].to_vec()),
        _ => Err(CoreError::Config(crate::errors::ConfigError::single(format!(
            "index range [{lo:?}-{hi:?}] out of bounds for {} item(s)",
            items.len()
        )))),
    }
}

impl<'a> TemplateEngine<'a> {
    pub fn new(ctx: TemplateContext<'a>, object_store: &'a dyn ObjectStore, parameter_store: &'a dyn ParameterStore) -> Self {
        let config_table = ConfigTable::build(ctx.config);
        Self {
            ctx,
            object_store,
            parameter_store,
            output_cache: OutputCache::new(),
            config_table,
            warnings: Vec::new(),
        }
    }

    pub fn take_warnings(&mut self) -> Vec<Warning> {
        std::mem::take(&mut self.warnings)
    }

    /// Renders every tag in `text`. Tags are replaced from the last span
    /// to the first so earlier byte offsets stay valid as the string
    /// shrinks or grows.
    pub async fn render(&mut self, text: &str) -> CoreResult<String> {
        self.render_matching(text, |_| true).await
    }

    /// Renders only tags whose replace type satisfies `include`, leaving
    /// every other tag's original `{{ ... }}` text untouched. Used at
    /// config-load time: `config.*`, `agent.accountid` and the `*-custom`
    /// parameter lookups resolve against the merged config immediately,
    /// while step-scoped tags (`output`, `agent.version`, `toutput`,
    /// `tmodule`) wait for the Resolver to run and the Materializer to
    /// render them per step.
    pub async fn render_matching(
        &mut self,
        text: &str,
        include: impl Fn(&ReplaceType) -> bool,
    ) -> CoreResult<String> {
        let tags = tag::scan(text);
        let mut out = text.to_string();
        for t in tags.into_iter().rev() {
            let replacement = match &t {
                Tag::Literal { text, .. } => Some(text.clone()),
                Tag::Reference { replace_type, key, index, .. } if include(replace_type) => {
                    Some(self.resolve(replace_type, key, index.as_ref()).await?)
                }
                Tag::Reference { .. } => None,
            };
            if let Some(replacement) = replacement {
                out.replace_range(t.span(), &replacement);
            }
        }
        Ok(out)
    }

    /// The root-substitution predicate config loading uses: `config.*`,
    /// `agent.accountid`, and the custom parameter-store tags.
    pub fn is_root_tag(replace_type: &ReplaceType) -> bool {
        matches!(
            replace_type,
            ReplaceType::Config | ReplaceType::AgentAccountId | ReplaceType::LookupCustom(_)
        )
    }

    async fn resolve(&mut self, replace_type: &ReplaceType, key: &str, index: Option<&Index>) -> CoreResult<String> {
        match replace_type {
            ReplaceType::Config => self.resolve_config(key),
            ReplaceType::AgentVersion => self.resolve_agent_version(key),
            ReplaceType::AgentAccountId => Ok(self.ctx.account_id.to_string()),
            ReplaceType::Lookup(source) => self.resolve_lookup(*source, key, index, false).await,
            ReplaceType::OutputOptional => self.resolve_lookup(Source::Output, key, index, true).await,
            ReplaceType::LookupCustom(source) => self.resolve_custom(*source, key, index).await,
            ReplaceType::TOutput { optional } => self.resolve_toutput(key, index, *optional).await,
            ReplaceType::TModule => self.resolve_tmodule(key),
        }
    }

    fn resolve_config(&self, key: &str) -> CoreResult<String> {
        let path = key.strip_prefix("config.").unwrap_or(key);
        self.config_table
            .get(path)
            .map(scalar_string)
            .ok_or_else(|| CoreError::Config(crate::errors::ConfigError::single(format!("unknown config path {path}"))))
    }

    fn resolve_agent_version(&self, key: &str) -> CoreResult<String> {
        let (step, module) = key
            .split_once('.')
            .ok_or_else(|| CoreError::Config(crate::errors::ConfigError::single(format!("malformed agent.version key {key}"))))?;
        self.ctx
            .resolved_versions
            .get(&(step.to_string(), module.to_string()))
            .map(ModuleVersion::to_string)
            .ok_or_else(|| {
                CoreError::Config(crate::errors::ConfigError::single(format!(
                    "no resolved version for {step}.{module} this tick"
                )))
            })
    }

    async fn resolve_lookup(&mut self, source: Source, key: &str, index: Option<&Index>, optional: bool) -> CoreResult<String> {
        let mut parts = key.splitn(3, '.');
        let (Some(step), Some(module), Some(field)) = (parts.next(), parts.next(), parts.next()) else {
            return Err(CoreError::Config(crate::errors::ConfigError::single(format!("malformed lookup key {key}"))));
        };

        if self.ctx.current_step_is_terraform && self.ctx.current_step == Some(step) && matches!(source, Source::Output) {
            let suffix = match index {
                None => String::new(),
                Some(Index::One(i)) => format!("[{i}]"),
                Some(Index::Range(lo, hi)) => format!("[{lo}-{hi}]"),
            };
            return Ok(format!("module.{module}.{field}{suffix}"));
        }

        let output_key = format!("{module}.{field}");
        let step_config = self.ctx.config.step(step);
        let workspace = step_config.map(|s| s.workspace.as_str()).unwrap_or(step);

        let cache = self
            .output_cache
            .get(self.object_store, &self.ctx.config.prefix, step, workspace)
            .await?;
        if let Some(entry) = cache.get(&output_key) {
            return Resolved::from_json(&entry.value).format(index, &mut self.warnings);
        }

        let param_name = parameter_path(source, &self.ctx.config.prefix, step, module, field);
        match self.parameter_store.get(&param_name).await? {
            Some(param) => {
                let resolved = if matches!(param.param_type, crate::ports::ParameterType::StringList) {
                    Resolved::List(param.as_list())
                } else {
                    Resolved::Scalar(param.value)
                };
                resolved.format(index, &mut self.warnings)
            }
            None if optional => Ok(String::new()),
            None => Err(NotFoundKind::Parameter { name: param_name }.into()),
        }
    }

    async fn resolve_custom(&mut self, source: Source, key: &str, index: Option<&Index>) -> CoreResult<String> {
        let param_name = match source {
            Source::Ssm | Source::Gcsm => key.to_string(),
            Source::Output => key.to_string(),
        };
        match self.parameter_store.get(&param_name).await? {
            Some(param) => {
                let resolved = if matches!(param.param_type, crate::ports::ParameterType::StringList) {
                    Resolved::List(param.as_list())
                } else {
                    Resolved::Scalar(param.value)
                };
                resolved.format(index, &mut self.warnings)
            }
            None => Err(NotFoundKind::Parameter { name: param_name }.into()),
        }
    }

    async fn resolve_toutput(&mut self, key: &str, index: Option<&Index>, optional: bool) -> CoreResult<String> {
        let (module_type, field) = key
            .split_once('.')
            .ok_or_else(|| CoreError::Config(crate::errors::ConfigError::single(format!("malformed toutput key {key}"))))?;

        let Some(step) = self.ctx.current_step.and_then(|s| self.ctx.config.step(s)) else {
            return Err(CoreError::Config(crate::errors::ConfigError::single("toutput used outside a step context")));
        };

        let matches: Vec<&crate::model::Module> = step.modules.iter().filter(|m| m.module_type() == module_type).collect();
        let module = match matches.as_slice() {
            [] if optional => return Ok(String::new()),
            [] => {
                return Err(CoreError::Config(crate::errors::ConfigError::single(format!(
                    "no module of type {module_type} in step {}",
                    step.name
                ))))
            }
            [single] => *single,
            _ => {
                return Err(CoreError::Config(crate::errors::ConfigError::single(format!(
                    "ambiguous module type {module_type} in step {}: matches {} modules",
                    step.name,
                    matches.len()
                ))))
            }
        };

        let lookup_key = format!("{}.{}.{}", step.name, module.name, field);
        self.resolve_lookup(Source::Output, &lookup_key, index, optional).await
    }

    fn resolve_tmodule(&self, module_type: &str) -> CoreResult<String> {
        let step = self
            .ctx
            .current_step
            .and_then(|s| self.ctx.config.step(s))
            .ok_or_else(|| CoreError::Config(crate::errors::ConfigError::single("tmodule used outside a step context")))?;

        let matches: Vec<&str> = step
            .modules
            .iter()
            .filter(|m| m.module_type() == module_type)
            .map(|m| m.name.as_str())
            .collect();

        match matches.as_slice() {
            [single] => Ok(single.to_string()),
            [] => Err(CoreError::Config(crate::errors::ConfigError::single(format!(
                "no module of type {module_type} in step {}",
                step.name
            )))),
            _ => Err(CoreError::Config(crate::errors::ConfigError::single(format!(
                "ambiguous module type {module_type} in step {}",
                step.name
            )))),
        }
    }
}

fn parameter_path(source: Source, prefix: &str, step: &str, module: &str, field: &str) -> String {
    match source {
        Source::Ssm | Source::Output => format!("/infralib/{prefix}-{step}-{module}/{field}"),
        Source::Gcsm => format!("infralib-{prefix}-{step}-{module}-{field}"),
    }
}
