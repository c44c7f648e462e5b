use std::sync::Arc;
use std::time::Instant;

use crate::bot::BotHandler;
use crate::chat_log::ChatLogger;
use crate::core::config::settings::{EmbeddingBackend, GenerationBackend};
use crate::core::config::AppConfig;
use crate::llm::{
    GenerationProvider, GenerationService, GigaChatProvider, HfTokenCounter,
    OpenAiCompatibleProvider, RegexTokenCounter, TokenCounter,
};
use crate::pipeline::prompt::load_system_prompt;
use crate::pipeline::QueryPipeline;
use crate::rag::{
    ChunkerConfig, DocumentLoader, EmbeddingProvider, LocalEmbedder, RecursiveChunker,
    SharedIndex, VectorIndex,
};

pub mod error;

use error::InitializationError;

/// Everything the transports need once the knowledge base is ready.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub index: SharedIndex,
    pub pipeline: Arc<QueryPipeline>,
    pub bot: BotHandler,
    pub started_at: Instant,
}

impl AppState {
    /// Startup barrier: returns only after the document has been loaded,
    /// chunked and embedded.
    ///
    /// 1. Set up the configured embedding and generation backends
    /// 2. Build the index and the query pipeline
    pub async fn initialize(config: Arc<AppConfig>) -> Result<Arc<Self>, InitializationError> {
        let embedder = embedding_backend(&config).await?;
        let generator = generation_backend(&config)?;
        Self::with_providers(config, embedder, generator).await
    }

    pub async fn with_providers(
        config: Arc<AppConfig>,
        embedder: Arc<dyn EmbeddingProvider>,
        provider: Arc<dyn GenerationProvider>,
    ) -> Result<Arc<Self>, InitializationError> {
        let url = config
            .document_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or(InitializationError::MissingDocumentUrl)?;

        let loader = DocumentLoader::new(config.loader_timeout())?;
        let document = loader.load(url).await?;

        let chunker = RecursiveChunker::new(ChunkerConfig::from(config.as_ref()));
        let chunks = chunker.split(&document.text, &document.source)?;
        tracing::info!("Split {} into {} chunks", document.source, chunks.len());

        let index = VectorIndex::build(chunks, embedder, config.embedding.batch_size).await?;

        let shared = SharedIndex::new();
        shared.install(Arc::new(index));

        let counter: Arc<dyn TokenCounter> = match &config.generation.tokenizer_path {
            Some(path) => Arc::new(
                HfTokenCounter::from_file(path).map_err(InitializationError::Generation)?,
            ),
            None => Arc::new(RegexTokenCounter),
        };

        let generator = GenerationService::new(
            provider,
            counter,
            config.token_cost,
            config.generation.temperature,
            config.generation_timeout(),
        )
        .with_max_tokens(config.generation.max_tokens);

        let system_prompt = load_system_prompt(config.generation.system_prompt_path.as_deref())
            .map_err(InitializationError::Prompt)?;

        let chat_log = ChatLogger::open(&config.chat_log_path);

        let pipeline = Arc::new(QueryPipeline::new(
            Arc::new(shared.clone()),
            generator,
            chat_log,
            system_prompt,
            config.retrieval.top_k,
        ));

        Ok(Arc::new(Self {
            bot: BotHandler::new(pipeline.clone()),
            config,
            index: shared,
            pipeline,
            started_at: Instant::now(),
        }))
    }
}

async fn embedding_backend(
    config: &AppConfig,
) -> Result<Arc<dyn EmbeddingProvider>, InitializationError> {
    let settings = &config.embedding;
    match settings.backend {
        EmbeddingBackend::Local => {
            let model_dir = settings.model_dir.clone().ok_or_else(|| {
                InitializationError::Embedding(anyhow::anyhow!(
                    "embedding.model_dir is required for the local backend"
                ))
            })?;
            let model = settings.model.clone();
            let max_length = settings.max_length;

            let embedder = tokio::task::spawn_blocking(move || {
                LocalEmbedder::load(&model_dir, &model, max_length)
            })
            .await
            .map_err(|e| InitializationError::Embedding(e.into()))?
            .map_err(|e| InitializationError::Embedding(e.into()))?;
            Ok(Arc::new(embedder))
        }
        EmbeddingBackend::Http => {
            let embedder = OpenAiCompatibleProvider::new(
                &settings.base_url,
                &settings.model,
                settings.api_key.as_deref(),
                config.embedding_timeout(),
            )
            .map_err(InitializationError::Embedding)?;
            Ok(Arc::new(embedder))
        }
    }
}

fn generation_backend(
    config: &AppConfig,
) -> Result<Arc<dyn GenerationProvider>, InitializationError> {
    let settings = &config.generation;
    let provider: Arc<dyn GenerationProvider> = match settings.provider {
        GenerationBackend::Gigachat => Arc::new(
            GigaChatProvider::new(settings, config.generation_timeout())
                .map_err(InitializationError::Generation)?,
        ),
        GenerationBackend::Openai => Arc::new(
            OpenAiCompatibleProvider::new(
                &settings.base_url,
                &settings.model,
                settings.api_key.as_deref(),
                config.generation_timeout(),
            )
            .map_err(InitializationError::Generation)?,
        ),
    };
    tracing::info!("Generation provider: {} ({})", provider.name(), provider.model());
    Ok(provider)
}
