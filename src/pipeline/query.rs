use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::format::format_response;
use super::prompt::{error_reply, EMPTY_QUERY_REPLY};
use crate::chat_log::{ChatLogEntry, ChatLogger};
use crate::llm::{GenerationError, GenerationMetadata, GenerationService};
use crate::rag::{RagError, Retriever};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("empty query")]
    EmptyQuery,

    #[error("retrieval failed: {0}")]
    Retrieval(#[from] RagError),

    #[error(transparent)]
    Generation(#[from] GenerationError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStage {
    Received,
    Retrieving,
    Generating,
    Formatting,
    Completed,
    Failed,
}

impl QueryStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryStage::Received => "received",
            QueryStage::Retrieving => "retrieving",
            QueryStage::Generating => "generating",
            QueryStage::Formatting => "formatting",
            QueryStage::Completed => "completed",
            QueryStage::Failed => "failed",
        }
    }
}

/// A text message delivered by a chat transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingMessage {
    pub chat_id: i64,
    pub user_id: i64,
    #[serde(default)]
    pub username: Option<String>,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct QueryOutcome {
    /// Model answer without the footer.
    pub answer: String,
    pub display_text: String,
    pub metadata: GenerationMetadata,
}

pub struct QueryPipeline {
    retriever: Arc<dyn Retriever>,
    generator: GenerationService,
    chat_log: ChatLogger,
    system_prompt: String,
    top_k: usize,
}

impl QueryPipeline {
    pub fn new(
        retriever: Arc<dyn Retriever>,
        generator: GenerationService,
        chat_log: ChatLogger,
        system_prompt: String,
        top_k: usize,
    ) -> Self {
        Self {
            retriever,
            generator,
            chat_log,
            system_prompt,
            top_k,
        }
    }

    pub fn generator(&self) -> &GenerationService {
        &self.generator
    }

    pub fn chat_log(&self) -> &ChatLogger {
        &self.chat_log
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Retrieve, generate and format one answer. Writes nothing to the chat log.
    pub async fn process_query(&self, query: &str) -> Result<QueryOutcome, PipelineError> {
        let query = query.trim();
        trace_stage(QueryStage::Received);
        if query.is_empty() {
            return Err(PipelineError::EmptyQuery);
        }

        trace_stage(QueryStage::Retrieving);
        let hits = self.retriever.retrieve(query, self.top_k).await?;
        let context = hits
            .iter()
            .map(|hit| hit.chunk.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        tracing::debug!(hits = hits.len(), "Retrieved {} context chars", context.chars().count());

        trace_stage(QueryStage::Generating);
        let (answer, metadata) = self
            .generator
            .generate(&self.system_prompt, query, &context)
            .await?;

        trace_stage(QueryStage::Formatting);
        let display_text = format_response(&answer, &metadata);

        trace_stage(QueryStage::Completed);
        Ok(QueryOutcome {
            answer,
            display_text,
            metadata,
        })
    }

    /// Runs a chat message through the pipeline and returns the reply text.
    ///
    /// Completed answers are appended to the chat log; a failed log write is
    /// reported but does not change the reply.
    pub async fn handle_message(&self, message: &IncomingMessage) -> String {
        match self.process_query(&message.text).await {
            Ok(outcome) => {
                let entry = ChatLogEntry::new(
                    message.user_id,
                    message.username.as_deref().unwrap_or(""),
                    message.text.trim(),
                    &outcome.answer,
                    &outcome.metadata,
                );
                if let Err(e) = self.chat_log.append(&entry).await {
                    tracing::error!("Failed to write chat log: {}", e);
                }

                tracing::info!(
                    chat_id = message.chat_id,
                    user_id = message.user_id,
                    total_tokens = outcome.metadata.total_tokens,
                    "Answered in {:.2}s",
                    outcome.metadata.response_time
                );
                outcome.display_text
            }
            Err(PipelineError::EmptyQuery) => EMPTY_QUERY_REPLY.to_string(),
            Err(e) => {
                trace_stage(QueryStage::Failed);
                tracing::warn!(chat_id = message.chat_id, "Query failed: {}", e);
                error_reply(&e.to_string())
            }
        }
    }
}

fn trace_stage(stage: QueryStage) {
    tracing::debug!(stage = stage.as_str(), "query stage");
}
