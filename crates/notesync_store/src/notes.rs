//! Persistent local note store.

use crate::backend::StorageBackend;
use crate::error::{StoreError, StoreResult};
use notesync_model::{Note, NoteId, StoredCollection};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreSnapshot {
    notes: Vec<Note>,
    collections: Vec<StoredCollection>,
    change_cursor: Option<String>,
}

struct StoreInner {
    notes: HashMap<NoteId, Note>,
    collections: HashMap<String, StoredCollection>,
    change_cursor: Option<String>,
}

/// The durable local note store.
///
/// Holds note records keyed by their stable local ID, collection blobs keyed
/// by remote ID, and the remote change cursor. The store is mutated only by
/// the sync engine (applying remote changes) and the note-edit API
/// (recording local edits); both persist through the backend before
/// returning.
pub struct NoteStore {
    backend: Box<dyn StorageBackend>,
    inner: RwLock<StoreInner>,
}

impl NoteStore {
    /// Opens the store, loading any persisted snapshot.
    pub fn open(backend: Box<dyn StorageBackend>) -> StoreResult<Self> {
        let snapshot = match backend.load()? {
            Some(bytes) => serde_json::from_slice::<StoreSnapshot>(&bytes)?,
            None => StoreSnapshot::default(),
        };

        Ok(Self {
            backend,
            inner: RwLock::new(StoreInner {
                notes: snapshot.notes.into_iter().map(|n| (n.id, n)).collect(),
                collections: snapshot
                    .collections
                    .into_iter()
                    .map(|c| (c.remote_id.clone(), c))
                    .collect(),
                change_cursor: snapshot.change_cursor,
            }),
        })
    }

    /// Returns a note by local ID.
    pub fn get(&self, id: NoteId) -> Option<Note> {
        self.inner.read().notes.get(&id).cloned()
    }

    /// Returns the note carrying the given remote ID, if any.
    pub fn find_by_remote_id(&self, remote_id: &str) -> Option<Note> {
        self.inner
            .read()
            .notes
            .values()
            .find(|n| n.remote_id.as_deref() == Some(remote_id))
            .cloned()
    }

    /// Inserts or replaces a note record.
    pub fn upsert(&self, note: Note) -> StoreResult<()> {
        let mut inner = self.inner.write();
        inner.notes.insert(note.id, note);
        self.persist(&inner)
    }

    /// Mutates a note in place and persists the result.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnknownNote`] if the note does not exist.
    pub fn update_with(
        &self,
        id: NoteId,
        f: impl FnOnce(&mut Note),
    ) -> StoreResult<Note> {
        let mut inner = self.inner.write();
        let mut updated = inner
            .notes
            .get(&id)
            .cloned()
            .ok_or(StoreError::UnknownNote(id))?;
        f(&mut updated);
        // Stage the mutation so a failed persist leaves the cached note
        // matching the last durable snapshot.
        let previous = inner.notes.insert(id, updated.clone());
        if let Err(e) = self.persist(&inner) {
            if let Some(previous) = previous {
                inner.notes.insert(id, previous);
            }
            return Err(e);
        }
        Ok(updated)
    }

    /// Removes a note record, returning it if present.
    pub fn remove(&self, id: NoteId) -> StoreResult<Option<Note>> {
        let mut inner = self.inner.write();
        let removed = inner.notes.remove(&id);
        if removed.is_some() {
            self.persist(&inner)?;
        }
        Ok(removed)
    }

    /// Returns all notes, in no particular order.
    pub fn list(&self) -> Vec<Note> {
        self.inner.read().notes.values().cloned().collect()
    }

    /// Returns the number of stored notes.
    pub fn len(&self) -> usize {
        self.inner.read().notes.len()
    }

    /// Returns true if no notes are stored.
    pub fn is_empty(&self) -> bool {
        self.inner.read().notes.is_empty()
    }

    /// Inserts or replaces a collection blob.
    pub fn upsert_collection(&self, collection: StoredCollection) -> StoreResult<()> {
        let mut inner = self.inner.write();
        inner
            .collections
            .insert(collection.remote_id.clone(), collection);
        self.persist(&inner)
    }

    /// Returns a collection blob by remote ID.
    pub fn get_collection(&self, remote_id: &str) -> Option<StoredCollection> {
        self.inner.read().collections.get(remote_id).cloned()
    }

    /// Removes a collection blob.
    pub fn remove_collection(&self, remote_id: &str) -> StoreResult<Option<StoredCollection>> {
        let mut inner = self.inner.write();
        let removed = inner.collections.remove(remote_id);
        if removed.is_some() {
            self.persist(&inner)?;
        }
        Ok(removed)
    }

    /// Returns all collection blobs.
    pub fn collections(&self) -> Vec<StoredCollection> {
        self.inner.read().collections.values().cloned().collect()
    }

    /// Returns the persisted remote change cursor.
    pub fn change_cursor(&self) -> Option<String> {
        self.inner.read().change_cursor.clone()
    }

    /// Persists a new remote change cursor.
    pub fn set_change_cursor(&self, cursor: impl Into<String>) -> StoreResult<()> {
        let mut inner = self.inner.write();
        inner.change_cursor = Some(cursor.into());
        self.persist(&inner)
    }

    fn persist(&self, inner: &StoreInner) -> StoreResult<()> {
        let snapshot = StoreSnapshot {
            notes: inner.notes.values().cloned().collect(),
            collections: inner.collections.values().cloned().collect(),
            change_cursor: inner.change_cursor.clone(),
        };
        let bytes = serde_json::to_vec(&snapshot)?;
        self.backend.persist(&bytes)
    }
}
