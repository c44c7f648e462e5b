pub mod bot;
pub mod chat_log;
pub mod core;
pub mod llm;
pub mod pipeline;
pub mod rag;
pub mod server;
pub mod state;
pub mod transport;
