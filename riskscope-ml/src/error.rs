//! Error types for the riskscope-ml crate.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, MlError>;

/// Top-level error type for harness operations.
#[derive(Debug, Error)]
pub enum MlError {
    /// Missing column, bad identifier, invalid ratio, too few class members
    /// for the requested folds. Fatal to the request.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unknown algorithm '{0}'")]
    UnknownAlgorithm(String),

    /// A single fit/score failure. Recorded per entry by the evaluator.
    #[error("{0}")]
    Evaluation(String),

    /// Explainer unavailable or incompatible. Never surfaces as a run failure.
    #[error("Explanation unavailable: {0}")]
    Explain(String),

    #[error("Bundle error: {0}")]
    Bundle(String),

    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error("Persistence error: {0}")]
    Persistence(#[from] riskscope_core::CoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Encoding error: {0}")]
    Encode(#[from] bincode::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl MlError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn evaluation(msg: impl Into<String>) -> Self {
        Self::Evaluation(msg.into())
    }

    pub fn explain(msg: impl Into<String>) -> Self {
        Self::Explain(msg.into())
    }

    pub fn bundle(msg: impl Into<String>) -> Self {
        Self::Bundle(msg.into())
    }

    pub fn dataset(msg: impl Into<String>) -> Self {
        Self::Dataset(msg.into())
    }

    /// Stable tag used in structured error records.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) | Self::UnknownAlgorithm(_) => "configuration_error",
            Self::Evaluation(_) => "evaluation_error",
            Self::Explain(_) => "explainability_degradation",
            Self::Bundle(_) => "bundle_error",
            Self::Dataset(_) | Self::Csv(_) => "dataset_error",
            Self::Persistence(_) => "persistence_error",
            Self::Io(_) => "io_error",
            Self::Serde(_) | Self::Encode(_) => "serialization_error",
        }
    }
}
