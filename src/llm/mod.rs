pub mod error;
pub mod generator;
pub mod gigachat;
pub mod openai;
pub mod provider;
pub mod tokens;
pub mod types;

pub use error::GenerationError;
pub use generator::GenerationService;
pub use gigachat::GigaChatProvider;
pub use openai::OpenAiCompatibleProvider;
pub use provider::GenerationProvider;
pub use tokens::{HfTokenCounter, RegexTokenCounter, TokenCounter};
pub use types::{ChatMessage, ChatRequest, GenerationMetadata};
