//! Remote revision records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One remote revision of a note file.
///
/// Revisions are created by the remote document store and are immutable;
/// the retention policy decides which of them remain retrievable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteVersion {
    /// Remote revision ID.
    pub id: String,
    /// Remote file ID this revision belongs to.
    pub file_id: String,
    /// When the revision was written.
    pub modified_time: DateTime<Utc>,
    /// Attribution, when the remote store provides it.
    pub modified_by: Option<String>,
    /// Whether this revision is flagged as a must-keep checkpoint.
    pub is_checkpoint: bool,
}

impl NoteVersion {
    /// Creates a plain (non-checkpoint) revision record.
    pub fn new(
        id: impl Into<String>,
        file_id: impl Into<String>,
        modified_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            file_id: file_id.into(),
            modified_time,
            modified_by: None,
            is_checkpoint: false,
        }
    }

    /// Flags this revision as a checkpoint.
    pub fn checkpoint(mut self) -> Self {
        self.is_checkpoint = true;
        self
    }
}
