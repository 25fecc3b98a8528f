//! Error types for local persistence.

use notesync_model::{EntryId, NoteId};
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in the local store or sync queue.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A persisted snapshot failed to decode.
    #[error("corrupt snapshot: {0}")]
    Corrupt(#[from] serde_json::Error),

    /// The note does not exist in the store.
    #[error("unknown note {0}")]
    UnknownNote(NoteId),

    /// The queue entry does not exist.
    #[error("unknown queue entry {0}")]
    UnknownEntry(EntryId),
}
