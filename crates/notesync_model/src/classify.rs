//! Entity classification at the data-model boundary.
//!
//! Raw JSON downloaded from the remote store is decoded into the
//! [`RemoteEntity`] sum type exactly once, immediately after fetch. Call
//! sites then match on the variant instead of re-probing the shape, which
//! makes treating a collection as a note a type error rather than a runtime
//! hazard.

use crate::note::NotePayload;

/// ID prefix reserved for collection files.
///
/// Identifiers carrying this prefix classify as collections before any
/// content fetch is attempted.
pub const COLLECTION_ID_PREFIX: &str = "collection-";

/// The classified form of a downloaded remote file.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteEntity {
    /// A user note with its extracted wire payload.
    Note(NotePayload),
    /// A grouping record; kept opaque, never merged into notes.
    Collection(CollectionBlob),
    /// Neither shape; logged and skipped, never surfaced.
    Unknown,
}

impl RemoteEntity {
    /// Returns true for the note variant.
    pub fn is_note(&self) -> bool {
        matches!(self, RemoteEntity::Note(_))
    }

    /// Returns true for the collection variant.
    pub fn is_collection(&self) -> bool {
        matches!(self, RemoteEntity::Collection(_))
    }
}

/// The classified content of a collection file.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionBlob {
    /// The raw JSON, stored verbatim.
    pub raw: serde_json::Value,
    /// Member note IDs extracted from the `noteIds` array, in order.
    /// Non-string members are skipped.
    pub note_ids: Vec<String>,
}

/// Classifies a parsed remote JSON document.
///
/// Rules, in precedence order:
/// 1. An object with an array-typed value under `noteIds` (even an empty
///    array) is a [`RemoteEntity::Collection`].
/// 2. Otherwise, an object with a string `title` or `content` is a
///    [`RemoteEntity::Note`].
/// 3. Anything else (null, scalars, arrays, foreign object shapes) is
///    [`RemoteEntity::Unknown`].
pub fn classify(value: &serde_json::Value) -> RemoteEntity {
    let Some(obj) = value.as_object() else {
        return RemoteEntity::Unknown;
    };

    if let Some(members) = obj.get("noteIds").and_then(|v| v.as_array()) {
        let note_ids = members
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect();
        return RemoteEntity::Collection(CollectionBlob {
            raw: value.clone(),
            note_ids,
        });
    }

    match NotePayload::from_value(value) {
        Some(payload) => RemoteEntity::Note(payload),
        None => RemoteEntity::Unknown,
    }
}

/// ID-level pre-filter: returns true for identifiers lexically tagged with
/// the collection-reserved prefix.
///
/// Checked before a content fetch so the engine never routes a collection
/// through the note-materialization path, and never decodes its shape as a
/// note.
pub fn is_collection_id(id: &str) -> bool {
    id.starts_with(COLLECTION_ID_PREFIX)
}
