use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};

use super::defaults::default_config;
use super::error::ConfigError;
use super::paths::AppPaths;
use super::settings::{AppConfig, GenerationBackend};
use super::validation::validate_config;

const REDACT_PLACEHOLDER: &str = "****";

const SENSITIVE_PATTERNS: [&str; 10] = [
    "api_key",
    "secret",
    "password",
    "_token",
    "token_",
    "credential",
    "private_key",
    "auth_",
    "access_key",
    "bearer",
];

const SENSITIVE_WHITELIST: [&str; 7] = [
    "max_tokens",
    "total_tokens",
    "input_tokens",
    "output_tokens",
    "token_cost",
    "tokenizer_path",
    "auth_url",
];

/// Environment variable → dotted config path.
const ENV_OVERRIDES: [(&str, &str); 10] = [
    ("TELEGRAM_TOKEN", "telegram.token"),
    ("GIGACHAT_API_KEY", "generation.api_key"),
    ("GIGACHAT_SCOPE", "generation.scope"),
    ("GIGACHAT_CA_BUNDLE", "generation.ca_bundle_path"),
    ("EMBEDDING_MODEL_DIR", "embedding.model_dir"),
    ("GENERATION_API_KEY", "generation.api_key"),
    ("EMBEDDING_API_KEY", "embedding.api_key"),
    ("DOCUMENT_URL", "document_url"),
    ("CHAT_LOG_PATH", "chat_log_path"),
    ("ASSIST_PORT", "server.port"),
];

#[derive(Clone)]
pub struct ConfigService {
    paths: Arc<AppPaths>,
}

impl ConfigService {
    pub fn new(paths: Arc<AppPaths>) -> Self {
        Self { paths }
    }

    pub fn config_path(&self) -> Option<PathBuf> {
        self.paths
            .config_candidates()
            .into_iter()
            .find(|path| path.exists())
    }

    pub fn secrets_path(&self) -> PathBuf {
        self.paths.data_dir.join("secrets.yaml")
    }

    /// Merges defaults, the YAML config, the secrets file and the process
    /// environment, in that order of precedence.
    pub fn load_tree(&self) -> Result<Value, ConfigError> {
        let mut merged = default_config();
        if let Some(path) = self.config_path() {
            merged = deep_merge(&merged, &load_yaml_file(&path)?);
        }
        let secrets_path = self.secrets_path();
        if secrets_path.exists() {
            merged = deep_merge(&merged, &load_yaml_file(&secrets_path)?);
        }
        let overrides = env_overrides(|key| env::var(key).ok());
        Ok(deep_merge(&merged, &overrides))
    }

    /// Builds the immutable [`AppConfig`], failing on anything a running bot cannot do without.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let tree = self.load_tree()?;
        let config = config_from_tree(&tree)?;
        require_startup_values(&config)?;
        Ok(config)
    }

    pub fn redact_sensitive_values(&self, value: &Value) -> Value {
        redact_sensitive_values(value)
    }
}

pub fn config_from_tree(tree: &Value) -> Result<AppConfig, ConfigError> {
    validate_config(tree)?;
    Ok(serde_json::from_value(tree.clone())?)
}

pub fn require_startup_values(config: &AppConfig) -> Result<(), ConfigError> {
    if is_blank(config.telegram.token.as_deref()) {
        return Err(ConfigError::MissingRequired("TELEGRAM_TOKEN"));
    }
    if config.generation.provider == GenerationBackend::Gigachat
        && is_blank(config.generation.api_key.as_deref())
    {
        return Err(ConfigError::MissingRequired("GIGACHAT_API_KEY"));
    }
    if is_blank(config.document_url.as_deref()) {
        return Err(ConfigError::MissingRequired("DOCUMENT_URL"));
    }
    Ok(())
}

fn is_blank(value: Option<&str>) -> bool {
    value.map(|v| v.trim().is_empty()).unwrap_or(true)
}

fn load_yaml_file(path: &Path) -> Result<Value, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let value = serde_yaml::from_str::<Value>(&contents).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })?;
    match value {
        Value::Object(_) => Ok(value),
        Value::Null => Ok(Value::Object(Map::new())),
        _ => Err(ConfigError::invalid(
            &path.display().to_string(),
            "top level must be a mapping",
        )),
    }
}

pub(crate) fn env_overrides<F>(lookup: F) -> Value
where
    F: Fn(&str) -> Option<String>,
{
    let mut overrides = Value::Object(Map::new());
    for (var, dotted) in ENV_OVERRIDES {
        let Some(raw) = lookup(var) else {
            continue;
        };
        if raw.trim().is_empty() {
            continue;
        }
        let value = if dotted == "server.port" {
            raw.trim()
                .parse::<u64>()
                .map(Value::from)
                .unwrap_or(Value::String(raw))
        } else {
            Value::String(raw)
        };
        set_dotted(&mut overrides, dotted, value);
    }
    overrides
}

fn set_dotted(target: &mut Value, dotted: &str, value: Value) {
    let parts: Vec<&str> = dotted.split('.').collect();
    let Some((last, parents)) = parts.split_last() else {
        return;
    };

    let mut current = target;
    for part in parents {
        current = match current {
            Value::Object(map) => map
                .entry(part.to_string())
                .or_insert_with(|| Value::Object(Map::new())),
            _ => return,
        };
    }
    if let Value::Object(map) = current {
        map.insert(last.to_string(), value);
    }
}

fn deep_merge(base: &Value, override_value: &Value) -> Value {
    match (base, override_value) {
        (Value::Object(base_map), Value::Object(override_map)) => {
            let mut merged: Map<String, Value> = base_map.clone();
            for (key, value) in override_map {
                let merged_value = match merged.get(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value.clone(),
                };
                merged.insert(key.clone(), merged_value);
            }
            Value::Object(merged)
        }
        _ => override_value.clone(),
    }
}

fn redact_sensitive_values(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut redacted = Map::new();
            for (key, val) in map {
                if is_sensitive_key(key) && !val.is_null() {
                    redacted.insert(key.clone(), Value::String(REDACT_PLACEHOLDER.to_string()));
                } else {
                    redacted.insert(key.clone(), redact_sensitive_values(val));
                }
            }
            Value::Object(redacted)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact_sensitive_values).collect()),
        _ => value.clone(),
    }
}

fn is_sensitive_key(key: &str) -> bool {
    let key_lower = key.to_lowercase();
    if SENSITIVE_WHITELIST
        .iter()
        .any(|allowed| *allowed == key_lower)
    {
        return false;
    }
    key_lower == "token"
        || SENSITIVE_PATTERNS
            .iter()
            .any(|pattern| key_lower.contains(pattern))
}
