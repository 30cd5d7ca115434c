//! Error types for the store.

use thiserror::Error;

/// Errors that can occur in store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Record could not be (de)serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Name cannot be used as a store key.
    #[error("invalid record name: {0}")]
    InvalidName(String),

    /// Write rejected by the backend.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}
