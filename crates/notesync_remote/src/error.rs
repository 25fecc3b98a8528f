//! Remote error taxonomy.

use thiserror::Error;

/// Result type for remote operations.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Errors surfaced by the remote store adapter.
///
/// The taxonomy drives the engine's failure semantics: `Auth` halts the
/// whole queue, `Transient` is retried with bounded backoff, and the rest
/// resolve at the level of a single entry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// The access credential is invalid or expired. Halts all sync until
    /// re-authentication.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Access to a specific remote file was revoked. Per-entry terminal.
    #[error("access denied for remote file {file_id}")]
    Permission {
        /// The affected remote file ID.
        file_id: String,
    },

    /// The remote file or revision no longer exists.
    #[error("remote object not found: {0}")]
    NotFound(String),

    /// Optimistic concurrency violation: the remote changed since the
    /// caller's last known revision.
    #[error("revision conflict on remote file {file_id}")]
    Conflict {
        /// The affected remote file ID.
        file_id: String,
    },

    /// Network or server failure; retryable with backoff.
    #[error("transient remote failure: {message}")]
    Transient {
        /// Human-readable failure description.
        message: String,
    },

    /// Malformed request or response; not retryable.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl RemoteError {
    /// Creates a transient error.
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    /// Returns true if retrying the operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RemoteError::Transient { .. })
    }
}
