//! Engine error types.

use notesync_model::{EntryId, ModelError, NoteId};
use notesync_remote::RemoteError;
use notesync_store::StoreError;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors surfaced by the sync engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Local persistence failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Remote store failure.
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    /// Data model failure.
    #[error("model error: {0}")]
    Model(#[from] ModelError),

    /// Sync is halted until credentials are restored.
    #[error("authentication required")]
    AuthRequired,

    /// The engine is offline; no network operations are attempted.
    #[error("engine is offline")]
    Offline,

    /// The cycle was cancelled mid-flight.
    #[error("sync cancelled")]
    Cancelled,

    /// A cycle is already running.
    #[error("sync already in progress")]
    SyncInProgress,

    /// The note carries no conflict to resolve.
    #[error("note {0} is not in conflict")]
    NotInConflict(NoteId),

    /// The note has never been synced, so it has no remote history.
    #[error("note {0} has never been synced")]
    LocalOnly(NoteId),

    /// A queue entry is missing data its operation requires.
    #[error("queue entry {0} is malformed")]
    MalformedEntry(EntryId),
}

impl EngineError {
    /// Returns true if retrying the whole cycle may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Remote(e) if e.is_retryable())
    }
}
