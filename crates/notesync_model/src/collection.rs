//! Collection records.

use crate::ids::RevisionToken;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A grouping record, synchronized as an opaque JSON blob.
///
/// Collections are distinguished structurally by an array-typed `noteIds`
/// field in their raw JSON. The sync engine never decomposes a collection
/// into notes; it stores the blob verbatim and only extracts the member ID
/// list for lookup purposes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCollection {
    /// Remote file ID of the collection.
    pub remote_id: String,
    /// The raw JSON blob, stored verbatim.
    pub raw: serde_json::Value,
    /// Member note IDs extracted from the blob (remote IDs, in order).
    pub note_ids: Vec<String>,
    /// Remote modification time.
    pub modified_time: DateTime<Utc>,
    /// Last acknowledged remote revision.
    pub revision: RevisionToken,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_serde_roundtrip() {
        let collection = StoredCollection {
            remote_id: "collection-abc".into(),
            raw: serde_json::json!({"noteIds": ["n1", "n2"], "name": "Inbox"}),
            note_ids: vec!["n1".into(), "n2".into()],
            modified_time: "2026-08-30T12:00:00Z".parse().unwrap(),
            revision: RevisionToken::new("rev-1"),
        };

        let json = serde_json::to_string(&collection).unwrap();
        let back: StoredCollection = serde_json::from_str(&json).unwrap();
        assert_eq!(back, collection);
    }
}
