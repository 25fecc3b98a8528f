//! The remote store adapter contract.

use crate::error::RemoteResult;
use chrono::{DateTime, Utc};
use notesync_model::{NoteVersion, RevisionToken};
use serde::{Deserialize, Serialize};

/// Metadata of one remote file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    /// Remote file ID.
    pub id: String,
    /// File name, when the store provides one.
    pub name: Option<String>,
    /// Last remote modification time.
    pub modified_time: DateTime<Utc>,
    /// Current revision token.
    pub revision: RevisionToken,
    /// Content size in bytes, when known.
    pub size: Option<u64>,
}

/// One page of the remote change listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangePage {
    /// Files changed since the request cursor.
    pub files: Vec<FileMetadata>,
    /// Cursor to resume from on the next call.
    pub next_cursor: String,
    /// True if further pages are available immediately.
    pub has_more: bool,
}

/// Uniform interface over a remote document API.
///
/// Implementations operate on opaque files identified by remote IDs; they
/// know nothing about notes or collections. Every method makes exactly one
/// attempt — retry with backoff is the caller's responsibility.
///
/// # Errors
///
/// All methods use the [`crate::RemoteError`] taxonomy: `Auth` for
/// credential failures, `Transient` for network/5xx, and the per-file
/// variants as documented on each method.
pub trait RemoteStore: Send + Sync {
    /// Lists files changed since the given cursor (`None` for the initial
    /// full listing). Pages are bounded; follow `has_more`.
    fn list_changed_files(&self, cursor: Option<&str>) -> RemoteResult<ChangePage>;

    /// Downloads the current content of a file.
    ///
    /// Fails with `NotFound` if the file no longer exists and `Permission`
    /// if access was revoked.
    fn get_content(&self, file_id: &str) -> RemoteResult<Vec<u8>>;

    /// Uploads content.
    ///
    /// With `file_id = None` a new file is created and its assigned remote
    /// ID returned in the metadata. Updates carry the caller's last known
    /// revision token and fail with `Conflict` when the remote has advanced
    /// past it.
    fn put_content(
        &self,
        file_id: Option<&str>,
        base_revision: Option<&RevisionToken>,
        bytes: &[u8],
    ) -> RemoteResult<FileMetadata>;

    /// Deletes a file. Idempotent: deleting an already-deleted or unknown
    /// file succeeds silently.
    fn delete_file(&self, file_id: &str) -> RemoteResult<()>;

    /// Lists revisions of a file, newest first, bounded by `max` per
    /// request.
    fn list_revisions(&self, file_id: &str, max: usize) -> RemoteResult<Vec<NoteVersion>>;

    /// Downloads the content of a specific revision.
    ///
    /// Fails with `NotFound` if the revision was already pruned remotely.
    fn get_revision_content(&self, file_id: &str, revision_id: &str) -> RemoteResult<Vec<u8>>;
}
