pub mod commands;
pub mod handler;

pub use commands::Command;
pub use handler::BotHandler;
