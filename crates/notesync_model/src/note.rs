//! Note records and their sync lifecycle.

use crate::error::{ModelError, ModelResult};
use crate::ids::{NoteId, RevisionToken};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Synchronization status of a note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncStatus {
    /// The local version matches the last version acknowledged remotely.
    Synced,
    /// Local mutations are queued and not yet acknowledged.
    Pending,
    /// The remote advanced independently; both sides are retained until
    /// explicitly resolved.
    Conflict,
}

impl SyncStatus {
    /// Returns true if the note has unacknowledged local mutations.
    pub fn is_pending(&self) -> bool {
        matches!(self, SyncStatus::Pending)
    }

    /// Returns true if the note requires explicit conflict resolution.
    pub fn is_conflict(&self) -> bool {
        matches!(self, SyncStatus::Conflict)
    }
}

/// The content snapshot of a note as it travels over the wire.
///
/// This is exactly what is uploaded to (and downloaded from) the remote
/// document store, serialized as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotePayload {
    /// Note title.
    pub title: String,
    /// Note body.
    pub content: String,
}

impl NotePayload {
    /// Creates a payload from title and content.
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
        }
    }

    /// Serializes the payload to its JSON wire form.
    pub fn to_bytes(&self) -> ModelResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decodes a payload from downloaded bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::NotANote`] if the bytes parse as JSON but do
    /// not carry a note shape (see [`crate::classify`]).
    pub fn from_bytes(bytes: &[u8]) -> ModelResult<Self> {
        let value: serde_json::Value = serde_json::from_slice(bytes)?;
        Self::from_value(&value)
            .ok_or_else(|| ModelError::NotANote("no title or content field".into()))
    }

    /// Extracts a payload from a parsed JSON object, if it has note shape.
    ///
    /// An object qualifies when it carries a string `title` or a string
    /// `content`; a missing counterpart defaults to empty.
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        let obj = value.as_object()?;
        let title = obj.get("title").and_then(|v| v.as_str());
        let content = obj.get("content").and_then(|v| v.as_str());
        if title.is_none() && content.is_none() {
            return None;
        }
        Some(Self {
            title: title.unwrap_or_default().to_string(),
            content: content.unwrap_or_default().to_string(),
        })
    }
}

/// The remote side of an open conflict.
///
/// Stored alongside the untouched local content so that neither side of a
/// conflict is lost until the user (or a policy) resolves it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSnapshot {
    /// Revision token of the conflicting remote content.
    pub revision: RevisionToken,
    /// Remote modification time.
    pub modified_time: DateTime<Utc>,
    /// The conflicting remote payload.
    pub payload: NotePayload,
}

/// A partial update to a note, as issued by the local edit API.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotePatch {
    /// New title, if changed.
    pub title: Option<String>,
    /// New content, if changed.
    pub content: Option<String>,
}

impl NotePatch {
    /// Creates an empty patch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Sets the content.
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Returns true if the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.content.is_none()
    }
}

/// A single user document.
///
/// # Lifecycle
///
/// Created locally without a `remote_id`; the first successful sync assigns
/// one. Subsequent edits mutate in place and bump `version`. Deletion is a
/// tombstone operation in the sync queue; the record is removed only after
/// the remote delete is acknowledged (or immediately if never synced).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    /// Stable local identifier.
    pub id: NoteId,
    /// Remote file ID; `None` until the first sync.
    pub remote_id: Option<String>,
    /// Note title.
    pub title: String,
    /// Note body.
    pub content: String,
    /// Local modification time; bumped on every local mutation.
    pub updated_at: DateTime<Utc>,
    /// Local version counter; strictly increases per local mutation.
    pub version: u64,
    /// Current sync status.
    pub sync_status: SyncStatus,
    /// Last remote revision acknowledged for this note.
    pub remote_revision: Option<RevisionToken>,
    /// Remote snapshot of an open conflict, if any.
    pub conflict: Option<RemoteSnapshot>,
}

impl Note {
    /// Creates a new local-only note at version 1.
    pub fn new(title: impl Into<String>, content: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: NoteId::new(),
            remote_id: None,
            title: title.into(),
            content: content.into(),
            updated_at: now,
            version: 1,
            sync_status: SyncStatus::Pending,
            remote_revision: None,
            conflict: None,
        }
    }

    /// Returns the current content as a wire payload.
    pub fn payload(&self) -> NotePayload {
        NotePayload::new(self.title.clone(), self.content.clone())
    }

    /// Applies a local edit, bumping version and marking the note pending.
    pub fn apply_patch(&mut self, patch: &NotePatch, now: DateTime<Utc>) {
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if let Some(content) = &patch.content {
            self.content = content.clone();
        }
        self.version += 1;
        self.updated_at = now;
        self.sync_status = SyncStatus::Pending;
    }

    /// Records a remote acknowledgement, clearing any conflict snapshot.
    pub fn mark_synced(&mut self, revision: RevisionToken) {
        self.remote_revision = Some(revision);
        self.sync_status = SyncStatus::Synced;
        self.conflict = None;
    }

    /// Records a conflict, keeping the remote side accessible.
    pub fn mark_conflict(&mut self, snapshot: RemoteSnapshot) {
        self.conflict = Some(snapshot);
        self.sync_status = SyncStatus::Conflict;
    }

    /// Returns true if this note has never been synced to the remote store.
    pub fn is_local_only(&self) -> bool {
        self.remote_id.is_none()
    }
}
