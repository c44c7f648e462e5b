use std::sync::Arc;

use super::commands::Command;
use crate::pipeline::prompt::{GREETING, HELP};
use crate::pipeline::{IncomingMessage, QueryPipeline};

/// Entry points shared by every chat transport.
#[derive(Clone)]
pub struct BotHandler {
    pipeline: Arc<QueryPipeline>,
}

impl BotHandler {
    pub fn new(pipeline: Arc<QueryPipeline>) -> Self {
        Self { pipeline }
    }

    pub fn on_start(&self) -> &'static str {
        GREETING
    }

    pub fn on_help(&self) -> &'static str {
        HELP
    }

    pub async fn on_message(&self, message: &IncomingMessage) -> String {
        self.pipeline.handle_message(message).await
    }

    pub async fn dispatch(&self, message: &IncomingMessage) -> String {
        match Command::parse(&message.text) {
            Some(Command::Start) => self.on_start().to_string(),
            Some(Command::Help) => self.on_help().to_string(),
            None => self.on_message(message).await,
        }
    }
}
