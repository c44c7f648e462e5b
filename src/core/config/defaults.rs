use serde_json::{json, Value};

pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 100;
pub const DEFAULT_TOP_K: usize = 4;
/// 25 000 ₽ per 125 M tokens.
pub const DEFAULT_TOKEN_COST: f64 = 25_000.0 / 125_000_000.0;

/// Header-first separator order used by the recursive chunker.
pub const DEFAULT_SEPARATORS: [&str; 6] = ["\n# ", "\n## ", "\n### ", "\n- ", "\n", " "];

pub fn default_config() -> Value {
    json!({
        "chunk_size": DEFAULT_CHUNK_SIZE,
        "chunk_overlap": DEFAULT_CHUNK_OVERLAP,
        "separators": DEFAULT_SEPARATORS,
        "token_cost": DEFAULT_TOKEN_COST,
        "chat_log_path": "chat_logs.csv",
        "embedding": {
            "backend": "local",
            "model": "sentence-transformers/paraphrase-multilingual-MiniLM-L12-v2",
            "model_dir": "models/paraphrase-multilingual-MiniLM-L12-v2",
            "max_length": 128,
            "base_url": "http://127.0.0.1:8090/v1",
            "batch_size": 32,
            "timeout_secs": 60
        },
        "generation": {
            "provider": "gigachat",
            "model": "GigaChat",
            "base_url": "https://gigachat.devices.sberbank.ru/api/v1",
            "auth_url": "https://ngw.devices.sberbank.ru:9443/api/v2/oauth",
            "scope": "GIGACHAT_API_PERS",
            "accept_invalid_certs": false,
            "temperature": 0.7,
            "timeout_secs": 60
        },
        "retrieval": {
            "top_k": DEFAULT_TOP_K
        },
        "loader": {
            "timeout_secs": 30
        },
        "telegram": {
            "api_base": "https://api.telegram.org",
            "poll_timeout_secs": 30,
            "poll_retry_secs": 5
        },
        "server": {
            "enabled": true,
            "host": "127.0.0.1",
            "port": 8080
        }
    })
}
