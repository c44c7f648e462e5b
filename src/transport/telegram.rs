//! Telegram Bot API long-poll transport.
//!
//! Polls `getUpdates`, shows the typing indicator for queries, and hands every
//! message to its own task so a slow answer never holds up the receive loop.

use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use super::TransportError;
use crate::bot::{BotHandler, Command};
use crate::core::config::settings::TelegramSettings;
use crate::pipeline::IncomingMessage;

/// Telegram rejects longer `sendMessage` texts.
pub const MAX_MESSAGE_CHARS: usize = 4096;

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub chat: Chat,
    #[serde(default)]
    pub from: Option<User>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
}

impl From<Message> for IncomingMessage {
    fn from(message: Message) -> Self {
        let (user_id, username) = match message.from {
            Some(user) => (user.id, user.username),
            None => (message.chat.id, None),
        };
        IncomingMessage {
            chat_id: message.chat.id,
            user_id,
            username,
            text: message.text.unwrap_or_default(),
        }
    }
}

#[derive(Clone)]
pub struct TelegramClient {
    client: Client,
    endpoint: String,
}

impl TelegramClient {
    pub fn new(api_base: &str, token: &str, poll_timeout: Duration) -> Result<Self, TransportError> {
        // long polls must outlive the server-side wait
        let client = Client::builder()
            .timeout(poll_timeout + Duration::from_secs(10))
            .build()
            .map_err(|e| TransportError::Http(e.without_url().to_string()))?;

        Ok(Self {
            client,
            endpoint: format!("{}/bot{}", api_base.trim_end_matches('/'), token),
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, body: Value) -> Result<T, TransportError> {
        let url = format!("{}/{}", self.endpoint, method);
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| TransportError::Http(e.without_url().to_string()))?;

        let status = response.status();
        let payload: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| TransportError::Http(e.without_url().to_string()))?;

        if !payload.ok {
            return Err(TransportError::Api {
                method: method.to_string(),
                description: payload
                    .description
                    .unwrap_or_else(|| format!("HTTP {}", status)),
            });
        }

        payload.result.ok_or_else(|| TransportError::Api {
            method: method.to_string(),
            description: "response has no result".to_string(),
        })
    }

    pub async fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>, TransportError> {
        self.call(
            "getUpdates",
            json!({
                "offset": offset,
                "timeout": timeout_secs,
                "allowed_updates": ["message"],
            }),
        )
        .await
    }

    pub async fn send_typing(&self, chat_id: i64) -> Result<(), TransportError> {
        let _: bool = self
            .call("sendChatAction", json!({ "chat_id": chat_id, "action": "typing" }))
            .await?;
        Ok(())
    }

    /// Sends `text`, split into several messages when it is too long.
    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), TransportError> {
        for part in split_message(text, MAX_MESSAGE_CHARS) {
            let _: Value = self
                .call("sendMessage", json!({ "chat_id": chat_id, "text": part }))
                .await?;
        }
        Ok(())
    }
}

/// Splits on character boundaries, preferring the last newline in each window.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= limit {
        return vec![text.to_string()];
    }

    let mut parts = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let mut end = (start + limit).min(chars.len());
        if end < chars.len() {
            if let Some(newline) = chars[start..end].iter().rposition(|c| *c == '\n') {
                if newline > 0 {
                    end = start + newline + 1;
                }
            }
        }
        let part: String = chars[start..end].iter().collect();
        if !part.trim().is_empty() {
            parts.push(part);
        }
        start = end;
    }
    parts
}

pub struct TelegramPoller {
    client: TelegramClient,
    bot: BotHandler,
    poll_timeout_secs: u64,
    retry_delay: Duration,
}

impl TelegramPoller {
    pub fn new(settings: &TelegramSettings, bot: BotHandler) -> Result<Self, TransportError> {
        let token = settings
            .token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or(TransportError::MissingToken)?;

        Ok(Self {
            client: TelegramClient::new(
                &settings.api_base,
                token,
                Duration::from_secs(settings.poll_timeout_secs),
            )?,
            bot,
            poll_timeout_secs: settings.poll_timeout_secs,
            retry_delay: Duration::from_secs(settings.poll_retry_secs.max(1)),
        })
    }

    /// Polls until the task is dropped. Errors are logged and retried.
    pub async fn run(self) {
        let mut offset = 0;
        tracing::info!("Telegram polling started");

        loop {
            let updates = match self.client.get_updates(offset, self.poll_timeout_secs).await {
                Ok(updates) => updates,
                Err(e) => {
                    tracing::warn!("getUpdates failed: {}; retrying in {:?}", e, self.retry_delay);
                    tokio::time::sleep(self.retry_delay).await;
                    continue;
                }
            };

            for update in updates {
                offset = offset.max(update.update_id + 1);
                let Some(message) = update.message else {
                    continue;
                };

                let client = self.client.clone();
                let bot = self.bot.clone();
                tokio::spawn(async move {
                    handle_message(client, bot, message.into()).await;
                });
            }
        }
    }
}

/// Commands and empty messages are answered at once; only queries that reach
/// the pipeline get the typing indicator.
fn shows_typing(text: &str) -> bool {
    !text.trim().is_empty() && Command::parse(text).is_none()
}

async fn handle_message(client: TelegramClient, bot: BotHandler, message: IncomingMessage) {
    if shows_typing(&message.text) {
        if let Err(e) = client.send_typing(message.chat_id).await {
            tracing::debug!("sendChatAction failed: {}", e);
        }
    }

    let reply = bot.dispatch(&message).await;

    if let Err(e) = client.send_message(message.chat_id, &reply).await {
        tracing::error!(chat_id = message.chat_id, "Failed to deliver reply: {}", e);
    }
}
