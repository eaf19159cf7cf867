use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProcessorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Probe error: {0}")]
    Probe(String),

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Rename {} -> {} failed: {reason}", from.display(), to.display())]
    Rename {
        from: PathBuf,
        to: PathBuf,
        reason: String,
    },

    #[error("Remote sync error: {0}")]
    Sync(String),

    #[error("Remote revision conflict on {0}")]
    SyncConflict(String),

    #[error("Insufficient space at {}: need {required} bytes, {available} available", location.display())]
    Resource {
        location: PathBuf,
        required: u64,
        available: u64,
    },

    #[error("{description} timed out after {secs}s")]
    Timeout { description: String, secs: u64 },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File not found: {0}")]
    FileNotFound(String),
}

impl ProcessorError {
    /// Whether the remote rejected a write because its revision token was stale.
    pub fn is_conflict(&self) -> bool {
        matches!(self, ProcessorError::SyncConflict(_))
    }
}

pub type Result<T> = std::result::Result<T, ProcessorError>;
