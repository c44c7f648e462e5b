//! Per-query orchestration: retrieval, generation, formatting and logging.

pub mod format;
pub mod prompt;
pub mod query;

pub use format::{format_response, parse_footer, strip_footer};
pub use query::{IncomingMessage, PipelineError, QueryOutcome, QueryPipeline, QueryStage};
