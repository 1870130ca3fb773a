//! `terraform-output.json`: the per-step blob a pipeline's apply leg
//! writes back, consumed here for self-referential and downstream
//! template resolution on the next tick.

use crate::errors::{CoreResult, TransportError};
use crate::ports::ObjectStore;
use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Deserialize)]
pub struct OutputEntry {
    #[serde(default)]
    pub sensitive: bool,
    #[serde(rename = "type", default)]
    pub value_type: serde_json::Value,
    pub value: serde_json::Value,
}

pub type OutputMap = HashMap<String, OutputEntry>;

/// Lazily-populated, per-tick cache of each step's output blob. A step
/// with no published outputs yet (first apply not run) caches an empty
/// map rather than re-fetching on every lookup.
#[derive(Debug, Default)]
pub struct OutputCache {
    by_step: HashMap<String, OutputMap>,
}

impl OutputCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(
        &mut self,
        object_store: &dyn ObjectStore,
        prefix: &str,
        step: &str,
        workspace: &str,
    ) -> CoreResult<&OutputMap> {
        if !self.by_step.contains_key(step) {
            let key = format!("{prefix}-{step}/{workspace}/terraform-output.json");
            let parsed = match object_store.get(&key).await? {
                Some(bytes) => serde_json::from_slice(&bytes)
                    .map_err(|e| TransportError::new(format!("malformed output cache at {key}: {e}")))?,
                None => OutputMap::new(),
            };
            self.by_step.insert(step.to_string(), parsed);
        }
        Ok(self.by_step.get(step).expect("just inserted"))
    }
}
