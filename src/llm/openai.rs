//! OpenAI-compatible HTTP provider.
//!
//! Serves both capabilities the assistant consumes: `/chat/completions` for
//! generation and `/embeddings` for the vector index. LM Studio, llama.cpp
//! server and text-embeddings-inference all speak this dialect; GigaChat does
//! too once [`GigaChatProvider`](super::gigachat::GigaChatProvider) has
//! exchanged the authorization key for an access token.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};

use super::error::GenerationError;
use super::provider::GenerationProvider;
use super::types::ChatRequest;
use crate::rag::{EmbeddingProvider, RagError};

#[derive(Clone)]
pub struct OpenAiCompatibleProvider {
    base_url: String,
    model: String,
    client: Client,
}

impl OpenAiCompatibleProvider {
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: Option<&str>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(key) = api_key.map(str::trim).filter(|k| !k.is_empty()) {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", key))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client,
        })
    }
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

#[async_trait]
impl GenerationProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        "openai-compatible"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn chat(&self, request: ChatRequest) -> Result<String, GenerationError> {
        let url = format!("{}/chat/completions", self.base_url);

        let res = self
            .client
            .post(&url)
            .json(&chat_body(&self.model, &request))
            .send()
            .await
            .map_err(GenerationError::unavailable)?;

        read_chat_reply(res).await
    }
}

/// Non-streaming `/chat/completions` request body.
pub(crate) fn chat_body(model: &str, request: &ChatRequest) -> Value {
    let mut body = json!({
        "model": model,
        "messages": request.messages,
        "stream": false,
    });

    if let Some(obj) = body.as_object_mut() {
        if let Some(t) = request.temperature {
            obj.insert("temperature".to_string(), json!(t));
        }
        if let Some(n) = request.max_tokens {
            obj.insert("max_tokens".to_string(), json!(n));
        }
    }
    body
}

pub(crate) async fn read_chat_reply(res: Response) -> Result<String, GenerationError> {
    let status = res.status();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(GenerationError::Auth(status.as_u16()));
    }
    if !status.is_success() {
        let text = res.text().await.unwrap_or_default();
        return Err(GenerationError::status(status.as_u16(), &text));
    }

    let payload: ChatCompletionResponse = res
        .json()
        .await
        .map_err(|e| GenerationError::Malformed(e.to_string()))?;

    payload
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| GenerationError::Malformed("response has no message content".to_string()))
}

#[async_trait]
impl EmbeddingProvider for OpenAiCompatibleProvider {
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/embeddings", self.base_url);
        let body = json!({
            "model": self.model,
            "input": inputs,
        });

        let res = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(RagError::embedding)?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(RagError::Embedding(format!(
                "embedding endpoint returned {}: {}",
                status,
                text.chars().take(200).collect::<String>()
            )));
        }

        let payload: Value = res.json().await.map_err(RagError::embedding)?;
        let mut response: EmbeddingResponse =
            serde_json::from_value(payload).map_err(RagError::embedding)?;

        // providers may answer out of order; `index` restores input order
        if response.data.iter().all(|item| item.index.is_some()) {
            response.data.sort_by_key(|item| item.index);
        }

        Ok(response.data.into_iter().map(|item| item.embedding).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::ChatMessage;
    use axum::extract::State;
    use axum::http::{HeaderMap as AxumHeaders, StatusCode as AxumStatus};
    use axum::response::IntoResponse;
    use axum::routing::post;
    use axum::{Json, Router};
    use std::sync::{Arc, Mutex};

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}/v1", addr)
    }

    fn provider(base: &str, key: Option<&str>) -> OpenAiCompatibleProvider {
        OpenAiCompatibleProvider::new(base, "GigaChat", key, Duration::from_secs(5)).unwrap()
    }

    type Captured = Arc<Mutex<Vec<(Option<String>, Value)>>>;

    async fn capture_chat(
        State(captured): State<Captured>,
        headers: AxumHeaders,
        Json(body): Json<Value>,
    ) -> impl IntoResponse {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());
        captured.lock().unwrap().push((auth, body));
        Json(json!({
            "choices": [{ "message": { "role": "assistant", "content": "🔧 Проблема: ..." } }]
        }))
    }

    #[tokio::test]
    async fn chat_sends_model_messages_and_bearer_key() {
        let captured: Captured = Arc::new(Mutex::new(Vec::new()));
        let router = Router::new()
            .route("/v1/chat/completions", post(capture_chat))
            .with_state(captured.clone());
        let base = serve(router).await;

        let request = ChatRequest::new(vec![
            ChatMessage::system("prompt"),
            ChatMessage::user("question"),
        ])
        .with_temperature(0.7)
        .with_max_tokens(Some(256));
        let answer = provider(&base, Some("secret")).chat(request).await.unwrap();
        assert_eq!(answer, "🔧 Проблема: ...");

        let captured = captured.lock().unwrap();
        let (auth, body) = &captured[0];
        assert_eq!(auth.as_deref(), Some("Bearer secret"));
        assert_eq!(body["model"], "GigaChat");
        assert_eq!(body["stream"], false);
        assert_eq!(body["temperature"], 0.7);
        assert_eq!(body["max_tokens"], 256);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "question");
    }

    #[tokio::test]
    async fn unauthorized_maps_to_auth_error() {
        let router = Router::new().route(
            "/v1/chat/completions",
            post(|| async { (AxumStatus::UNAUTHORIZED, "bad key").into_response() }),
        );
        let base = serve(router).await;

        let err = provider(&base, Some("wrong"))
            .chat(ChatRequest::new(vec![ChatMessage::user("q")]))
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::Auth(401)));
    }

    #[tokio::test]
    async fn server_error_keeps_a_short_body() {
        let long_body = "x".repeat(5000);
        let router = Router::new().route(
            "/v1/chat/completions",
            post(move || {
                let body = long_body.clone();
                async move { (AxumStatus::BAD_GATEWAY, body).into_response() }
            }),
        );
        let base = serve(router).await;

        let err = provider(&base, None)
            .chat(ChatRequest::new(vec![ChatMessage::user("q")]))
            .await
            .unwrap_err();
        match err {
            GenerationError::Status { status, body } => {
                assert_eq!(status, 502);
                assert_eq!(body.chars().count(), 200);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn missing_choices_is_malformed() {
        let router = Router::new().route(
            "/v1/chat/completions",
            post(|| async { Json(json!({ "choices": [] })) }),
        );
        let base = serve(router).await;

        let err = provider(&base, None)
            .chat(ChatRequest::new(vec![ChatMessage::user("q")]))
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::Malformed(_)));
    }

    #[tokio::test]
    async fn unreachable_service_is_unavailable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = provider(&format!("http://{}/v1", addr), None)
            .chat(ChatRequest::new(vec![ChatMessage::user("q")]))
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::Unavailable(_)));
    }

    #[tokio::test]
    async fn embeddings_are_returned_in_input_order() {
        let router = Router::new().route(
            "/v1/embeddings",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["input"].as_array().map(|a| a.len()), Some(2));
                Json(json!({
                    "data": [
                        { "index": 1, "embedding": [0.0, 1.0] },
                        { "index": 0, "embedding": [1.0, 0.0] }
                    ]
                }))
            }),
        );
        let base = serve(router).await;

        let vectors = EmbeddingProvider::embed(
            &provider(&base, None),
            &["first".to_string(), "second".to_string()],
        )
        .await
        .unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[tokio::test]
    async fn embedding_failure_is_reported() {
        let router = Router::new().route(
            "/v1/embeddings",
            post(|| async { (AxumStatus::INTERNAL_SERVER_ERROR, "model not loaded").into_response() }),
        );
        let base = serve(router).await;

        let err = EmbeddingProvider::embed(&provider(&base, None), &["x".to_string()])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("model not loaded"));
    }
}
