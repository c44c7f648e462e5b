//! Chat transports delivering messages to the [`BotHandler`](crate::bot::BotHandler).

pub mod telegram;

use thiserror::Error;

pub use telegram::{TelegramClient, TelegramPoller};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("telegram token is not configured")]
    MissingToken,

    #[error("telegram request failed: {0}")]
    Http(String),

    #[error("telegram {method} failed: {description}")]
    Api { method: String, description: String },
}
