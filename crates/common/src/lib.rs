/// Common types and utilities for the DermAI backend
pub mod config;

use thiserror::Error;

pub use config::{ConfigError, GeminiConfig, NormalizationScheme, ServiceConfig};

/// Service-level errors, one variant per failure class the HTTP layer distinguishes
#[derive(Debug, Error)]
pub enum DermError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    InvalidImage(String),

    #[error("Model load failed: {0}")]
    ModelLoad(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("{0}")]
    ExplanationFetch(String),

    #[error("Report rendering failed: {0}")]
    Report(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(String),
}

impl DermError {
    /// Whether the failure was caused by the caller's request rather than the service
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, DermError::InvalidInput(_))
    }
}

/// Result type for service operations
pub type Result<T> = std::result::Result<T, DermError>;
