//! Crate-wide error type and result alias.

use thiserror::Error;

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, RaidoError>;

/// Errors produced by the raido runtime.
#[derive(Error, Debug)]
pub enum RaidoError {
    /// Configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An LLM provider call failed.
    #[error("Provider error: {0}")]
    Provider(String),

    /// Vault encryption, decryption or persistence failed.
    #[error("Vault error: {0}")]
    Vault(String),

    /// A cache backend call failed.
    #[error("Cache error: {0}")]
    Cache(String),

    /// An agent rejected or failed to process a request.
    #[error("Agent error: {0}")]
    Agent(String),

    /// SQLite storage failure.
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Filesystem failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<redis::RedisError> for RaidoError {
    fn from(err: redis::RedisError) -> Self {
        RaidoError::Cache(err.to_string())
    }
}
