use serde_json::{Map, Value};

use super::error::ConfigError;

pub fn validate_config(config: &Value) -> Result<(), ConfigError> {
    let root = config
        .as_object()
        .ok_or_else(|| config_type_error("root", "object"))?;

    validate_u64_field(root, "chunk_size", "chunk_size", 1, 1_000_000)?;
    validate_u64_field(root, "chunk_overlap", "chunk_overlap", 0, 1_000_000)?;
    if let (Some(size), Some(overlap)) = (
        root.get("chunk_size").and_then(Value::as_u64),
        root.get("chunk_overlap").and_then(Value::as_u64),
    ) {
        if overlap >= size {
            return Err(ConfigError::invalid(
                "chunk_overlap",
                format!("must be smaller than chunk_size ({})", size),
            ));
        }
    }
    validate_separators(root, "separators")?;
    validate_f64_field(root, "token_cost", "token_cost", 0.0, f64::MAX)?;
    validate_optional_string_field(root, "document_url", "document_url")?;
    validate_optional_string_field(root, "chat_log_path", "chat_log_path")?;

    if let Some(embedding) = expect_optional_object(root, "embedding")? {
        validate_choice_field(embedding, "embedding.backend", "backend", &["local", "http"])?;
        validate_required_string_field(embedding, "embedding.model", "model")?;
        validate_optional_string_field(embedding, "embedding.model_dir", "model_dir")?;
        validate_u64_field(embedding, "embedding.max_length", "max_length", 8, 8192)?;
        validate_required_string_field(embedding, "embedding.base_url", "base_url")?;
        validate_optional_string_field(embedding, "embedding.api_key", "api_key")?;
        validate_u64_field(embedding, "embedding.batch_size", "batch_size", 1, 4096)?;
        validate_u64_field(embedding, "embedding.timeout_secs", "timeout_secs", 1, 3600)?;
    }

    if let Some(generation) = expect_optional_object(root, "generation")? {
        validate_choice_field(
            generation,
            "generation.provider",
            "provider",
            &["gigachat", "openai"],
        )?;
        validate_required_string_field(generation, "generation.model", "model")?;
        validate_required_string_field(generation, "generation.base_url", "base_url")?;
        validate_optional_string_field(generation, "generation.api_key", "api_key")?;
        validate_required_string_field(generation, "generation.auth_url", "auth_url")?;
        validate_required_string_field(generation, "generation.scope", "scope")?;
        validate_optional_string_field(generation, "generation.ca_bundle_path", "ca_bundle_path")?;
        validate_bool_field(generation, "generation.accept_invalid_certs", "accept_invalid_certs")?;
        validate_f64_field(generation, "generation.temperature", "temperature", 0.0, 1.0)?;
        validate_u64_field(generation, "generation.max_tokens", "max_tokens", 1, 1_000_000)?;
        validate_u64_field(generation, "generation.timeout_secs", "timeout_secs", 1, 3600)?;
        validate_optional_string_field(generation, "generation.tokenizer_path", "tokenizer_path")?;
        validate_optional_string_field(
            generation,
            "generation.system_prompt_path",
            "system_prompt_path",
        )?;
    }

    if let Some(retrieval) = expect_optional_object(root, "retrieval")? {
        validate_u64_field(retrieval, "retrieval.top_k", "top_k", 1, 100)?;
    }

    if let Some(loader) = expect_optional_object(root, "loader")? {
        validate_u64_field(loader, "loader.timeout_secs", "timeout_secs", 1, 3600)?;
    }

    if let Some(telegram) = expect_optional_object(root, "telegram")? {
        validate_optional_string_field(telegram, "telegram.token", "token")?;
        validate_required_string_field(telegram, "telegram.api_base", "api_base")?;
        validate_u64_field(
            telegram,
            "telegram.poll_timeout_secs",
            "poll_timeout_secs",
            0,
            600,
        )?;
        validate_u64_field(telegram, "telegram.poll_retry_secs", "poll_retry_secs", 1, 3600)?;
    }

    if let Some(server) = expect_optional_object(root, "server")? {
        validate_bool_field(server, "server.enabled", "enabled")?;
        validate_optional_string_field(server, "server.host", "host")?;
        validate_u64_field(server, "server.port", "port", 0, 65535)?;
    }

    Ok(())
}

fn expect_optional_object<'a>(
    root: &'a Map<String, Value>,
    key: &str,
) -> Result<Option<&'a Map<String, Value>>, ConfigError> {
    match root.get(key) {
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(_) => Err(config_type_error(key, "object")),
        None => Ok(None),
    }
}

fn validate_bool_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ConfigError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    if value.as_bool().is_some() {
        return Ok(());
    }
    Err(config_type_error(path, "boolean"))
}

fn validate_choice_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    choices: &[&str],
) -> Result<(), ConfigError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(text) = value.as_str() else {
        return Err(config_type_error(path, "string"));
    };
    if choices.contains(&text) {
        return Ok(());
    }
    Err(ConfigError::invalid(
        path,
        format!("must be one of: {}", choices.join(", ")),
    ))
}

fn validate_u64_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    min: u64,
    max: u64,
) -> Result<(), ConfigError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    if value.is_null() {
        return Ok(());
    }
    let Some(number) = value.as_u64() else {
        return Err(config_type_error(path, "integer"));
    };
    if number < min || number > max {
        return Err(ConfigError::invalid(
            path,
            format!("must be between {} and {}", min, max),
        ));
    }
    Ok(())
}

fn validate_f64_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    min: f64,
    max: f64,
) -> Result<(), ConfigError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(number) = value.as_f64() else {
        return Err(config_type_error(path, "number"));
    };
    if !number.is_finite() || number < min || number > max {
        return Err(ConfigError::invalid(
            path,
            format!("must be between {} and {}", min, max),
        ));
    }
    Ok(())
}

fn validate_required_string_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ConfigError> {
    let value = section
        .get(key)
        .ok_or_else(|| ConfigError::invalid(path, "value is required"))?;
    let Some(text) = value.as_str() else {
        return Err(config_type_error(path, "string"));
    };
    if text.trim().is_empty() {
        return Err(ConfigError::invalid(path, "value cannot be empty"));
    }
    Ok(())
}

fn validate_optional_string_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ConfigError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    if value.is_null() || value.as_str().is_some() {
        return Ok(());
    }
    Err(config_type_error(path, "string"))
}

/// Separators may be pure whitespace (`"\n"`, `" "`) but never empty.
fn validate_separators(section: &Map<String, Value>, key: &str) -> Result<(), ConfigError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(items) = value.as_array() else {
        return Err(config_type_error(key, "array of strings"));
    };
    if items.is_empty() {
        return Err(ConfigError::invalid(key, "at least one separator is required"));
    }
    for (index, item) in items.iter().enumerate() {
        let path = format!("{}[{}]", key, index);
        let Some(text) = item.as_str() else {
            return Err(config_type_error(&path, "string"));
        };
        if text.is_empty() {
            return Err(ConfigError::invalid(&path, "value cannot be empty"));
        }
    }
    Ok(())
}

fn config_type_error(path: &str, expected: &str) -> ConfigError {
    ConfigError::invalid(path, format!("expected {}", expected))
}
