//! Typed, immutable application configuration.
//!
//! Built once by [`ConfigService::load`](super::ConfigService::load) from the
//! merged defaults / YAML / environment tree and passed by reference into every
//! component constructor.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub separators: Vec<String>,
    /// Currency units per token.
    pub token_cost: f64,
    pub document_url: Option<String>,
    pub chat_log_path: PathBuf,
    pub embedding: EmbeddingSettings,
    pub generation: GenerationSettings,
    pub retrieval: RetrievalSettings,
    pub loader: LoaderSettings,
    pub telegram: TelegramSettings,
    pub server: ServerSettings,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// In-process BERT encoder loaded from `model_dir`.
    #[default]
    Local,
    /// OpenAI-compatible `/embeddings` endpoint at `base_url`.
    Http,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingSettings {
    #[serde(default)]
    pub backend: EmbeddingBackend,
    pub model: String,
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Directory holding `config.json`, `tokenizer.json` and `model.safetensors`.
    #[serde(default)]
    pub model_dir: Option<PathBuf>,
    #[serde(default = "default_max_length")]
    pub max_length: usize,
    pub batch_size: usize,
    pub timeout_secs: u64,
}

fn default_max_length() -> usize {
    128
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationBackend {
    #[default]
    Gigachat,
    Openai,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationSettings {
    #[serde(default)]
    pub provider: GenerationBackend,
    pub model: String,
    pub base_url: String,
    /// GigaChat authorization key, or the bearer key of an OpenAI-compatible server.
    #[serde(default)]
    pub api_key: Option<String>,
    /// GigaChat OAuth endpoint.
    pub auth_url: String,
    pub scope: String,
    /// Extra PEM root certificate, e.g. the Russian Trusted Root CA.
    #[serde(default)]
    pub ca_bundle_path: Option<PathBuf>,
    #[serde(default)]
    pub accept_invalid_certs: bool,
    pub temperature: f64,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    pub timeout_secs: u64,
    /// `tokenizer.json` used for cost estimation instead of the built-in counter.
    #[serde(default)]
    pub tokenizer_path: Option<PathBuf>,
    /// Replaces the built-in support-engineer instructions.
    #[serde(default)]
    pub system_prompt_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalSettings {
    pub top_k: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderSettings {
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramSettings {
    #[serde(default)]
    pub token: Option<String>,
    pub api_base: String,
    pub poll_timeout_secs: u64,
    pub poll_retry_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

impl AppConfig {
    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation.timeout_secs)
    }

    pub fn loader_timeout(&self) -> Duration {
        Duration::from_secs(self.loader.timeout_secs)
    }

    pub fn embedding_timeout(&self) -> Duration {
        Duration::from_secs(self.embedding.timeout_secs)
    }
}
