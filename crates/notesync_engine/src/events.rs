//! Engine event notifications.

use notesync_model::NoteId;
use notesync_store::QueueOperation;

/// A notable engine occurrence, buffered for the embedding application.
///
/// Events are drained with [`crate::SyncEngine::take_events`]; the engine
/// never blocks on a consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A remote edit collided with unacknowledged local edits. Both sides
    /// are retained on the note until resolved.
    ConflictDetected {
        /// The conflicted note.
        note_id: NoteId,
    },

    /// A queue entry was removed after a terminal failure.
    EntryFailed {
        /// The affected note.
        note_id: NoteId,
        /// The operation that failed.
        operation: QueueOperation,
        /// Attempts made before giving up.
        attempts: u32,
        /// Failure description.
        reason: String,
    },

    /// Credentials were rejected; sync is halted until
    /// [`crate::SyncEngine::credentials_restored`] is called.
    AuthRequired,

    /// A note deleted remotely had pending local edits and was converted
    /// back to a local-only note awaiting re-creation.
    NoteResurrected {
        /// The resurrected note.
        note_id: NoteId,
    },

    /// A note deleted remotely had no local edits and was removed locally.
    RemoteDeleted {
        /// The removed note.
        note_id: NoteId,
    },

    /// A remote file had neither note nor collection shape and was skipped.
    SkippedUnknown {
        /// The skipped remote file ID.
        file_id: String,
    },

    /// Access to a remote file was revoked; it was skipped without
    /// touching local state.
    AccessRevoked {
        /// The inaccessible remote file ID.
        file_id: String,
    },
}
