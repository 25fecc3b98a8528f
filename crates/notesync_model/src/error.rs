//! Error types for the model crate.

use thiserror::Error;

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors that can occur when decoding model payloads.
#[derive(Error, Debug)]
pub enum ModelError {
    /// The payload is not valid JSON.
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// The payload parsed but does not have the shape of a note.
    #[error("payload is not a note: {0}")]
    NotANote(String),
}
