//! GigaChat generation provider.
//!
//! GigaChat takes an authorization key only at its OAuth endpoint. The key is
//! exchanged for an access token valid for about 30 minutes, and that token is
//! the bearer credential for `/chat/completions`. Tokens are cached until
//! shortly before `expires_at` and refreshed once when the API rejects one.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Certificate, Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::error::GenerationError;
use super::openai::{chat_body, read_chat_reply};
use super::provider::GenerationProvider;
use super::types::ChatRequest;
use crate::core::config::settings::GenerationSettings;

/// A token this close to expiry is replaced before use.
const REFRESH_MARGIN_SECS: i64 = 60;

#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now + chrono::Duration::seconds(REFRESH_MARGIN_SECS) < self.expires_at
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    /// Unix time in milliseconds.
    expires_at: i64,
}

pub struct GigaChatProvider {
    base_url: String,
    auth_url: String,
    scope: String,
    model: String,
    authorization: HeaderValue,
    client: Client,
    token: Mutex<Option<AccessToken>>,
}

impl GigaChatProvider {
    pub fn new(settings: &GenerationSettings, timeout: Duration) -> anyhow::Result<Self> {
        let key = settings
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .context("GigaChat authorization key (GIGACHAT_API_KEY) is not configured")?;
        let mut authorization = HeaderValue::from_str(&format!("Basic {}", key))?;
        authorization.set_sensitive(true);

        let mut builder = Client::builder().timeout(timeout);
        if let Some(path) = &settings.ca_bundle_path {
            let pem = std::fs::read(path)
                .with_context(|| format!("Failed to read CA bundle {}", path.display()))?;
            for cert in Certificate::from_pem_bundle(&pem)? {
                builder = builder.add_root_certificate(cert);
            }
        }
        if settings.accept_invalid_certs {
            tracing::warn!("TLS certificate verification is disabled for GigaChat");
            builder = builder.danger_accept_invalid_certs(true);
        }

        Ok(Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            auth_url: settings.auth_url.clone(),
            scope: settings.scope.clone(),
            model: settings.model.clone(),
            authorization,
            client: builder.build()?,
            token: Mutex::new(None),
        })
    }

    /// Cached access token, or a new one when `refresh` is set or the cached
    /// one is about to expire.
    async fn access_token(&self, refresh: bool) -> Result<String, GenerationError> {
        let mut slot = self.token.lock().await;
        if !refresh {
            if let Some(token) = slot.as_ref().filter(|t| t.is_fresh(Utc::now())) {
                return Ok(token.value.clone());
            }
        }

        let token = self.request_token().await?;
        let value = token.value.clone();
        *slot = Some(token);
        Ok(value)
    }

    async fn request_token(&self) -> Result<AccessToken, GenerationError> {
        let res = self
            .client
            .post(&self.auth_url)
            .header(AUTHORIZATION, self.authorization.clone())
            .header("RqUID", Uuid::new_v4().to_string())
            .header(ACCEPT, "application/json")
            .form(&[("scope", self.scope.as_str())])
            .send()
            .await
            .map_err(GenerationError::unavailable)?;

        let status = res.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(GenerationError::Auth(status.as_u16()));
        }
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(GenerationError::status(status.as_u16(), &text));
        }

        let payload: TokenResponse = res
            .json()
            .await
            .map_err(|e| GenerationError::Malformed(format!("token response: {}", e)))?;
        let expires_at = DateTime::from_timestamp_millis(payload.expires_at).ok_or_else(|| {
            GenerationError::Malformed(format!("token expires_at {}", payload.expires_at))
        })?;

        tracing::debug!("GigaChat access token issued, expires at {}", expires_at);
        Ok(AccessToken {
            value: payload.access_token,
            expires_at,
        })
    }

    async fn post_chat(&self, token: &str, body: &Value) -> Result<Response, GenerationError> {
        self.client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .map_err(GenerationError::unavailable)
    }
}

#[async_trait]
impl GenerationProvider for GigaChatProvider {
    fn name(&self) -> &str {
        "gigachat"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn chat(&self, request: ChatRequest) -> Result<String, GenerationError> {
        let body = chat_body(&self.model, &request);

        let token = self.access_token(false).await?;
        let mut res = self.post_chat(&token, &body).await?;
        if res.status() == StatusCode::UNAUTHORIZED {
            tracing::debug!("GigaChat rejected the access token, requesting a new one");
            let token = self.access_token(true).await?;
            res = self.post_chat(&token, &body).await?;
        }

        read_chat_reply(res).await
    }
}
