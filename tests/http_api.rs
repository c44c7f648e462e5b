use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use support_assist::core::config::defaults::default_config;
use support_assist::core::config::service::config_from_tree;
use support_assist::llm::{ChatRequest, GenerationError, GenerationProvider};
use support_assist::rag::{EmbeddingProvider, RagError};
use support_assist::server::router::router;
use support_assist::state::error::InitializationError;
use support_assist::state::AppState;

const MANUAL: &str = "# Руководство Unilight\n\
## Питание\n\
- Если индикатор не горит, проверьте кабель питания.\n\
## Сеть\n\
- Если нет связи, перезагрузите маршрутизатор.\n";

/// Bag-of-letters embedding: texts sharing words land close together.
struct LetterEmbedder;

#[async_trait]
impl EmbeddingProvider for LetterEmbedder {
    fn model(&self) -> &str {
        "letters"
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        Ok(inputs
            .iter()
            .map(|text| {
                let mut v = vec![0.0f32; 64];
                for c in text.to_lowercase().chars().filter(|c| c.is_alphabetic()) {
                    v[(c as usize) % 64] += 1.0;
                }
                v[63] += 0.01;
                v
            })
            .collect())
    }
}

struct CannedProvider;

#[async_trait]
impl GenerationProvider for CannedProvider {
    fn name(&self) -> &str {
        "canned"
    }

    fn model(&self) -> &str {
        "canned-model"
    }

    async fn chat(&self, request: ChatRequest) -> Result<String, GenerationError> {
        if request.messages[1].content.contains("Фрагменты документации:") {
            Ok("🛠️ Решение: проверьте кабель питания.".to_string())
        } else {
            Ok("Информация не найдена в документации.".to_string())
        }
    }
}

fn config_for(dir: &tempfile::TempDir, document_url: &str) -> Arc<support_assist::core::config::AppConfig> {
    let mut tree = default_config();
    tree["document_url"] = json!(document_url);
    tree["chat_log_path"] = json!(dir.path().join("chat_logs.csv"));
    tree["chunk_size"] = json!(80);
    tree["chunk_overlap"] = json!(10);
    tree["retrieval"]["top_k"] = json!(2);
    Arc::new(config_from_tree(&tree).unwrap())
}

async fn serve(state: Arc<AppState>) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn started() -> (tempfile::TempDir, Arc<AppState>) {
    let dir = tempfile::tempdir().unwrap();
    let doc = dir.path().join("manual.md");
    std::fs::write(&doc, MANUAL).unwrap();

    let config = config_for(&dir, doc.to_str().unwrap());
    let state = AppState::with_providers(config, Arc::new(LetterEmbedder), Arc::new(CannedProvider))
        .await
        .unwrap();
    (dir, state)
}

#[tokio::test]
async fn startup_builds_the_index_from_a_local_document() {
    let (_dir, state) = started().await;

    assert!(state.index.is_ready());
    let index = state.index.get().unwrap();
    assert!(index.len() >= 2);
    assert_eq!(index.embedding_model(), "letters");
}

#[tokio::test]
async fn status_and_commands() {
    let (_dir, state) = started().await;
    let base = serve(state).await;
    let client = reqwest::Client::new();

    let health: Value = client.get(format!("{}/health", base)).send().await.unwrap().json().await.unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["initialized"], true);

    let status: Value = client
        .get(format!("{}/api/status", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["generation_model"], "canned-model");
    assert_eq!(status["top_k"], 2);
    assert!(status["chunks"].as_u64().unwrap() >= 2);

    let start: Value = client.get(format!("{}/api/start", base)).send().await.unwrap().json().await.unwrap();
    assert!(start["response"].as_str().unwrap().starts_with("🤖 Привет!"));

    let help: Value = client.get(format!("{}/api/help", base)).send().await.unwrap().json().await.unwrap();
    assert!(help["response"].as_str().unwrap().contains("/help"));
}

#[tokio::test]
async fn posted_message_is_answered_with_footer() {
    let (dir, state) = started().await;
    let base = serve(state).await;

    let reply: Value = reqwest::Client::new()
        .post(format!("{}/api/messages", base))
        .json(&json!({
            "chat_id": 10,
            "user_id": 20,
            "username": "operator",
            "text": "Индикатор не горит"
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let text = reply["response"].as_str().unwrap();
    assert!(text.starts_with("🛠️ Решение: проверьте кабель питания."));
    assert!(text.contains("⏱ Время обработки: "));
    assert_eq!(reply["answer"], "🛠️ Решение: проверьте кабель питания.");

    let log = std::fs::read_to_string(dir.path().join("chat_logs.csv")).unwrap();
    assert_eq!(log.lines().count(), 2);
    assert!(log.contains("operator"));
}

#[tokio::test]
async fn unwritable_chat_log_does_not_stop_the_assistant() {
    let dir = tempfile::tempdir().unwrap();
    let doc = dir.path().join("manual.md");
    std::fs::write(&doc, MANUAL).unwrap();
    std::fs::create_dir(dir.path().join("chat_logs.csv")).unwrap();

    let config = config_for(&dir, doc.to_str().unwrap());
    let state = AppState::with_providers(config, Arc::new(LetterEmbedder), Arc::new(CannedProvider))
        .await
        .unwrap();
    let base = serve(state).await;

    let reply: Value = reqwest::Client::new()
        .post(format!("{}/api/messages", base))
        .json(&json!({ "chat_id": 1, "user_id": 1, "text": "Индикатор не горит" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(reply["response"]
        .as_str()
        .unwrap()
        .starts_with("🛠️ Решение: проверьте кабель питания."));
}

#[tokio::test]
async fn empty_document_aborts_startup() {
    let dir = tempfile::tempdir().unwrap();
    let doc = dir.path().join("empty.txt");
    std::fs::write(&doc, "  \n\n ").unwrap();

    let config = config_for(&dir, doc.to_str().unwrap());
    let err = AppState::with_providers(config, Arc::new(LetterEmbedder), Arc::new(CannedProvider))
        .await
        .err()
        .unwrap();
    assert!(matches!(
        err,
        InitializationError::KnowledgeBase(RagError::EmptyDocument(_))
    ));
}

#[tokio::test]
async fn unreachable_document_aborts_startup() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(&dir, dir.path().join("missing.md").to_str().unwrap());
    let err = AppState::with_providers(config, Arc::new(LetterEmbedder), Arc::new(CannedProvider))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, InitializationError::KnowledgeBase(RagError::Load { .. })));
}

#[tokio::test]
async fn local_embedding_backend_needs_its_model_files() {
    let dir = tempfile::tempdir().unwrap();
    let mut tree = default_config();
    tree["document_url"] = json!(dir.path().join("manual.md"));
    tree["embedding"]["backend"] = json!("local");
    tree["embedding"]["model_dir"] = json!(dir.path().join("no-such-model"));
    let config = Arc::new(config_from_tree(&tree).unwrap());

    let err = AppState::initialize(config).await.err().unwrap();
    assert!(matches!(err, InitializationError::Embedding(_)));
    assert!(err.to_string().contains("config.json"));
}

#[tokio::test]
async fn gigachat_backend_needs_an_authorization_key() {
    let dir = tempfile::tempdir().unwrap();
    let mut tree = default_config();
    tree["document_url"] = json!(dir.path().join("manual.md"));
    tree["embedding"]["backend"] = json!("http");
    tree["generation"]["provider"] = json!("gigachat");
    let config = Arc::new(config_from_tree(&tree).unwrap());

    let err = AppState::initialize(config).await.err().unwrap();
    assert!(matches!(err, InitializationError::Generation(_)));
    assert!(err.to_string().contains("GIGACHAT_API_KEY"));
}
