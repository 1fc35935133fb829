//! Configuration merge logic
//!
//! Implements the layered merge with:
//! - Objects: deep-merge by key
//! - Arrays: REPLACE (last wins)
//! - Scalars: override (last wins)

use serde_json::{Map, Value};

use super::defaults::ENV_PREFIX;

/// Deep merge two JSON values.
///
/// Objects merge recursively by key; arrays and scalars from `overlay`
/// replace the base value outright, `null` included.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => overlay_value,
                };
                base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }
        (_, overlay) => overlay,
    }
}

/// Merge multiple config layers in order (first is base, last has highest precedence)
pub fn merge_layers(layers: Vec<Value>) -> Value {
    layers.into_iter().fold(Value::Null, deep_merge)
}

/// Build the environment layer from `PACKAGER_*` variables.
///
/// Unknown variables and empty values are ignored. Returns `None` when no
/// variable contributed.
pub fn env_layer<I>(vars: I) -> Option<Value>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut root = Map::new();
    let mut package = Map::new();

    for (name, raw) in vars {
        let Some(key) = name.strip_prefix(ENV_PREFIX) else {
            continue;
        };
        let value = raw.trim();
        if value.is_empty() {
            continue;
        }
        match key {
            "RELEASE_DIR" | "WORKING_DIR" | "PACKAGE_DIR" | "MANIFEST_DIR" | "STORE_PATH"
            | "BASE_URL" | "VERSION_METADATA" => {
                root.insert(key.to_lowercase(), Value::String(value.to_string()));
            }
            "DEFERRED_PATTERNS" => {
                let patterns = value
                    .split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(|p| Value::String(p.to_string()))
                    .collect();
                package.insert("deferred_patterns".to_string(), Value::Array(patterns));
            }
            _ => {}
        }
    }

    if !package.is_empty() {
        root.insert("package".to_string(), Value::Object(package));
    }
    if root.is_empty() {
        None
    } else {
        Some(Value::Object(root))
    }
}
