//! Precomputed dotted-path table for `config.<path>` lookups, built once
//! per tick from the resolved config's own `serde_json::Value`
//! projection rather than by reflecting over the `Config` struct.

use std::collections::HashMap;

pub struct ConfigTable {
    paths: HashMap<String, serde_json::Value>,
}

impl ConfigTable {
    pub fn build<T: serde::Serialize>(config: &T) -> Self {
        let mut paths = HashMap::new();
        if let Ok(value) = serde_json::to_value(config) {
            flatten(String::new(), &value, &mut paths);
        }
        Self { paths }
    }

    pub fn get(&self, dotted_path: &str) -> Option<&serde_json::Value> {
        self.paths.get(dotted_path)
    }
}

fn flatten(prefix: String, value: &serde_json::Value, out: &mut HashMap<String, serde_json::Value>) {
    match value {
        serde_json::Value::Object(map) => {
            for (k, v) in map {
                let path = if prefix.is_empty() { k.clone() } else { format!("{prefix}.{k}") };
                flatten(path, v, out);
            }
        }
        serde_json::Value::Array(items) => {
            for (i, v) in items.iter().enumerate() {
                let path = format!("{prefix}.{i}");
                flatten(path, v, out);
            }
            if !prefix.is_empty() {
                out.insert(prefix, value.clone());
            }
        }
        _ => {
            if !prefix.is_empty() {
                out.insert(prefix, value.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flattens_nested_paths() {
        let table = ConfigTable::build(&json!({
            "prefix": "p",
            "schedule": { "update_cron": "0 3 * * ? *" },
        }));
        assert_eq!(table.get("prefix").unwrap(), "p");
        assert_eq!(table.get("schedule.update_cron").unwrap(), "0 3 * * ? *");
    }
}
