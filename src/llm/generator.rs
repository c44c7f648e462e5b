use std::sync::Arc;
use std::time::{Duration, Instant};

use super::error::GenerationError;
use super::provider::GenerationProvider;
use super::tokens::TokenCounter;
use super::types::{ChatMessage, ChatRequest, GenerationMetadata};

/// Heading placed between the question and the retrieved fragments.
pub const CONTEXT_HEADING: &str = "Фрагменты документации:";

/// Wraps a [`GenerationProvider`] with prompt assembly, a timeout and
/// token/cost accounting.
#[derive(Clone)]
pub struct GenerationService {
    provider: Arc<dyn GenerationProvider>,
    counter: Arc<dyn TokenCounter>,
    token_cost: f64,
    temperature: f64,
    max_tokens: Option<u32>,
    timeout: Duration,
}

impl GenerationService {
    pub fn new(
        provider: Arc<dyn GenerationProvider>,
        counter: Arc<dyn TokenCounter>,
        token_cost: f64,
        temperature: f64,
        timeout: Duration,
    ) -> Self {
        Self {
            provider,
            counter,
            token_cost,
            temperature,
            max_tokens: None,
            timeout,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn provider(&self) -> &Arc<dyn GenerationProvider> {
        &self.provider
    }

    pub fn token_cost(&self) -> f64 {
        self.token_cost
    }

    /// Sends `system_prompt` as the system message and the query together with
    /// the retrieved `context` as the user message.
    ///
    /// Input tokens cover `system_prompt + query + context`; `response_time`
    /// is measured from the call until the provider answers.
    pub async fn generate(
        &self,
        system_prompt: &str,
        query: &str,
        context: &str,
    ) -> Result<(String, GenerationMetadata), GenerationError> {
        let started = Instant::now();

        let request = ChatRequest::new(vec![
            ChatMessage::system(system_prompt),
            ChatMessage::user(build_user_message(query, context)),
        ])
        .with_temperature(self.temperature)
        .with_max_tokens(self.max_tokens);

        let answer = tokio::time::timeout(self.timeout, self.provider.chat(request))
            .await
            .map_err(|_| GenerationError::Timeout(self.timeout.as_secs()))??;
        let response_time = started.elapsed().as_secs_f64();

        let answer = answer.trim().to_string();
        if answer.is_empty() {
            return Err(GenerationError::EmptyResponse);
        }

        let full_input = format!("{}{}{}", system_prompt, query, context);
        let metadata = GenerationMetadata::new(
            self.counter.count(&full_input),
            self.counter.count(&answer),
            self.token_cost,
            response_time,
        );

        tracing::debug!(
            provider = self.provider.name(),
            model = self.provider.model(),
            input_tokens = metadata.input_tokens,
            output_tokens = metadata.output_tokens,
            "Generation finished in {:.2}s",
            response_time
        );

        Ok((answer, metadata))
    }
}

pub fn build_user_message(query: &str, context: &str) -> String {
    let context = context.trim();
    if context.is_empty() {
        return query.to_string();
    }
    format!("{}\n\n{}\n{}", query, CONTEXT_HEADING, context)
}
