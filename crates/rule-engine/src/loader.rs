use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::debug;

use crate::config::EngineConfig;
use crate::errors::ConfigError;

const ENV_PREFIX: &str = "CALLGUARD__";
const ENV_JSON: &str = "CALLGUARD_CONFIG_JSON";

#[derive(Debug, Default)]
pub struct LoadOptions {
    pub paths: Vec<PathBuf>,
    pub include_env: bool,
}

impl LoadOptions {
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            paths: vec![path.into()],
            include_env: true,
        }
    }
}

pub fn load_config(path: Option<&Path>) -> Result<EngineConfig, ConfigError> {
    let mut options = LoadOptions {
        include_env: true,
        ..LoadOptions::default()
    };
    if let Some(p) = path {
        options.paths.push(p.to_path_buf());
    }
    load_document(&options)
}

/// Loads any policy document: YAML files merged in order, then
/// `CALLGUARD__SECTION__KEY=value` variables, then the
/// `CALLGUARD_CONFIG_JSON` blob.
pub fn load_document<T: DeserializeOwned>(options: &LoadOptions) -> Result<T, ConfigError> {
    let mut document = Value::Object(Map::new());

    for path in &options.paths {
        let content = fs::read_to_string(path)
            .map_err(|err| ConfigError::Io(format!("{}: {}", path.display(), err)))?;
        let overlay = parse_yaml(&content)?;
        merge(&mut document, overlay);
        debug!(path = %path.display(), "policy file merged");
    }

    if options.include_env {
        for overlay in overlays_from_env()? {
            apply_override(&mut document, &overlay.path, overlay.value)?;
        }
    }

    serde_json::from_value(document).map_err(|err| ConfigError::Invalid(err.to_string()))
}

pub fn parse_document<T: DeserializeOwned>(content: &str) -> Result<T, ConfigError> {
    serde_json::from_value(parse_yaml(content)?).map_err(|err| ConfigError::Invalid(err.to_string()))
}

fn parse_yaml(content: &str) -> Result<Value, ConfigError> {
    let yaml_value: serde_yaml::Value =
        serde_yaml::from_str(content).map_err(|err| ConfigError::Invalid(format!("{}", err)))?;
    let value =
        serde_json::to_value(yaml_value).map_err(|err| ConfigError::Invalid(format!("{}", err)))?;
    Ok(match value {
        Value::Null => Value::Object(Map::new()),
        other => other,
    })
}

struct Overlay {
    path: String,
    value: Value,
}

fn overlays_from_env() -> Result<Vec<Overlay>, ConfigError> {
    let mut overlays = Vec::new();
    for (key, raw) in env::vars() {
        if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
            let path = stripped
                .split("__")
                .filter(|segment| !segment.is_empty())
                .map(|segment| segment.to_ascii_lowercase())
                .collect::<Vec<_>>()
                .join(".");
            if path.is_empty() {
                continue;
            }
            overlays.push(Overlay {
                path,
                value: parse_env_value(&raw),
            });
        }
    }
    // Variable order is unspecified; apply shallow paths first.
    overlays.sort_by(|a, b| a.path.cmp(&b.path));

    if let Ok(raw_json) = env::var(ENV_JSON) {
        if !raw_json.trim().is_empty() {
            let json_value: Value = serde_json::from_str(&raw_json)
                .map_err(|err| ConfigError::Invalid(format!("{}: {}", ENV_JSON, err)))?;
            overlays.extend(flatten_value(json_value, None));
        }
    }

    Ok(overlays)
}

fn parse_env_value(raw: &str) -> Value {
    if raw.is_empty() {
        return Value::Null;
    }
    if let Ok(parsed) = serde_json::from_str::<Value>(raw) {
        return parsed;
    }
    if let Ok(boolean) = raw.parse::<bool>() {
        return Value::Bool(boolean);
    }
    if let Ok(int_val) = raw.parse::<i64>() {
        return Value::Number(int_val.into());
    }
    Value::String(raw.to_string())
}

fn flatten_value(value: Value, prefix: Option<String>) -> Vec<Overlay> {
    match value {
        Value::Object(map) => {
            let mut result = Vec::new();
            for (key, value) in map {
                let key_segment = key.trim().to_ascii_lowercase();
                let next_prefix = match &prefix {
                    Some(prefix) if !prefix.is_empty() => format!("{}.{}", prefix, key_segment),
                    _ => key_segment,
                };
                result.extend(flatten_value(value, Some(next_prefix)));
            }
            result
        }
        other => match prefix {
            Some(path) => vec![Overlay { path, value: other }],
            None => Vec::new(),
        },
    }
}

/// Sets `value` at the dotted `path`, creating intermediate objects.
fn apply_override(document: &mut Value, path: &str, value: Value) -> Result<(), ConfigError> {
    let mut cursor = document;
    let mut segments = path.split('.').peekable();
    while let Some(segment) = segments.next() {
        let Value::Object(map) = cursor else {
            return Err(ConfigError::InvalidOverride {
                path: path.to_string(),
                reason: format!("'{segment}' is below a non-object value"),
            });
        };
        if segments.peek().is_none() {
            map.insert(segment.to_string(), value);
            return Ok(());
        }
        cursor = map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    Ok(())
}

fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}
