//! Append-only CSV log of completed queries.
//!
//! One row per answered question. Rows are serialised in memory and written
//! with a single `write_all` while holding an exclusive lock on the file, so
//! concurrent writers (tasks or processes) never interleave.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Local;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::llm::GenerationMetadata;

pub const HEADER: [&str; 8] = [
    "timestamp",
    "user_id",
    "username",
    "message_text",
    "bot_response",
    "response_time",
    "total_tokens",
    "cost",
];

#[derive(Debug, Error)]
pub enum ChatLogError {
    #[error("chat log {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode chat log row: {0}")]
    Encode(#[from] csv::Error),

    #[error("chat log writer task failed: {0}")]
    Task(String),
}

impl ChatLogError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        ChatLogError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Field order matches [`HEADER`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatLogEntry {
    pub timestamp: String,
    pub user_id: i64,
    pub username: String,
    pub message_text: String,
    pub bot_response: String,
    pub response_time: f64,
    pub total_tokens: usize,
    pub cost: f64,
}

impl ChatLogEntry {
    /// Stamps the entry with the current local time.
    pub fn new(
        user_id: i64,
        username: &str,
        message_text: &str,
        bot_response: &str,
        metadata: &GenerationMetadata,
    ) -> Self {
        Self {
            timestamp: Local::now().to_rfc3339(),
            user_id,
            username: username.to_string(),
            message_text: message_text.to_string(),
            bot_response: bot_response.to_string(),
            response_time: metadata.response_time,
            total_tokens: metadata.total_tokens,
            cost: metadata.cost,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatLogger {
    path: Arc<PathBuf>,
}

impl ChatLogger {
    /// Creates parent directories and writes the header when the file is
    /// missing or empty.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, ChatLogError> {
        let path = path.into();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| ChatLogError::io(parent, e))?;
        }

        let mut file = open_append(&path)?;
        file.lock_exclusive().map_err(|e| ChatLogError::io(&path, e))?;
        let result = write_header_if_empty(&mut file, &path);
        let _ = file.unlock();
        result?;

        Ok(Self {
            path: Arc::new(path),
        })
    }

    /// Like [`new`](Self::new), but a log that cannot be prepared is reported
    /// and the logger is returned anyway. Appends then fail on their own
    /// until the path becomes writable.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match Self::new(path.clone()) {
            Ok(logger) => logger,
            Err(e) => {
                tracing::error!("Chat log is unavailable, answers will not be recorded: {}", e);
                Self {
                    path: Arc::new(path),
                }
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, entry: &ChatLogEntry) -> Result<(), ChatLogError> {
        let row = encode_row(entry)?;
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || append_locked(&path, &row))
            .await
            .map_err(|e| ChatLogError::Task(e.to_string()))?
    }
}

fn open_append(path: &Path) -> Result<File, ChatLogError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| ChatLogError::io(path, e))
}

fn write_header_if_empty(file: &mut File, path: &Path) -> Result<(), ChatLogError> {
    let len = file.metadata().map_err(|e| ChatLogError::io(path, e))?.len();
    if len > 0 {
        return Ok(());
    }

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(HEADER)?;
    let bytes = writer
        .into_inner()
        .map_err(|e| ChatLogError::io(path, e.into_error()))?;
    file.write_all(&bytes).map_err(|e| ChatLogError::io(path, e))
}

fn encode_row(entry: &ChatLogEntry) -> Result<Vec<u8>, ChatLogError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.serialize(entry)?;
    writer
        .into_inner()
        .map_err(|e| ChatLogError::Task(e.into_error().to_string()))
}

fn append_locked(path: &Path, row: &[u8]) -> Result<(), ChatLogError> {
    let mut file = open_append(path)?;
    file.lock_exclusive().map_err(|e| ChatLogError::io(path, e))?;
    let result = write_header_if_empty(&mut file, path).and_then(|_| {
        file.write_all(row)
            .and_then(|_| file.flush())
            .map_err(|e| ChatLogError::io(path, e))
    });
    let _ = file.unlock();
    result
}
