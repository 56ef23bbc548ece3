//! Error types for riskscope-core.

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised by configuration loading and persistence.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("Config file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    #[error("Status store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
