use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the knowledge retriever
///
/// Only configuration and caller-input problems surface here. Failures inside
/// a running retrieval are absorbed by the stage that hit them.
#[derive(Error, Debug)]
pub enum RetrieverError {
    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration validation errors
    #[error("Configuration validation failed: {errors:?}")]
    ConfigValidation { errors: Vec<ValidationError> },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Invalid configuration value
    #[error("Invalid configuration value at {path}: {message}")]
    InvalidConfigValue { path: String, message: String },

    /// Query text rejected before the pipeline ran
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Retrieval options rejected before the pipeline ran
    #[error("Invalid retrieval options: {0}")]
    InvalidOptions(String),

    /// Embedding provider could not be constructed
    #[error("Embedding provider error: {0}")]
    Embedding(#[from] crate::embedding::EmbeddingError),

    /// Reranker could not be constructed
    #[error("Reranker error: {0}")]
    Rerank(#[from] crate::retrieval::RerankError),

    /// IO errors
    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    /// TOML deserialization errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSerialization(#[from] toml::ser::Error),

    /// JSON errors
    #[error("JSON error: {context}: {source}")]
    Json {
        source: serde_json::Error,
        context: String,
    },

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Generic errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Path to the configuration key that failed validation
    pub path: String,
    /// Error message describing the validation failure
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type for retriever operations
pub type Result<T> = std::result::Result<T, RetrieverError>;
