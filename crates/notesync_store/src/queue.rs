//! Durable sync queue with per-note coalescing.

use crate::backend::StorageBackend;
use crate::error::{StoreError, StoreResult};
use chrono::{DateTime, Utc};
use notesync_model::{EntryId, NoteId, NotePayload, RevisionToken};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use tracing::{debug, warn};

/// The kind of pending local mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueueOperation {
    /// First upload of a local-only note.
    Create,
    /// Content update of a previously-synced note.
    Update,
    /// Tombstone: remote delete of a previously-synced note.
    Delete,
}

/// One pending local mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncQueueEntry {
    /// Queue-assigned entry ID, monotonically increasing.
    pub entry_id: EntryId,
    /// The note this mutation belongs to.
    pub note_id: NoteId,
    /// The pending operation.
    pub operation: QueueOperation,
    /// Content snapshot at enqueue time; `None` for deletes.
    pub payload: Option<NotePayload>,
    /// Remote revision the mutation was based on (optimistic concurrency).
    pub base_revision: Option<RevisionToken>,
    /// When the entry was first enqueued.
    pub enqueued_at: DateTime<Utc>,
    /// Number of failed drain attempts so far.
    pub attempt_count: u32,
    /// Earliest time the entry becomes drain-eligible again after a failure.
    pub next_attempt_at: Option<DateTime<Utc>>,
    /// Transient in-flight marker; intentionally not persisted, so a restart
    /// leaves every entry pending.
    #[serde(skip)]
    pub(crate) in_flight: bool,
}

impl SyncQueueEntry {
    /// Returns true while the entry is being drained.
    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }
}

/// Result of an [`SyncQueue::enqueue`] call.
#[derive(Debug, Clone, PartialEq)]
pub enum EnqueueOutcome {
    /// A new entry was appended.
    Enqueued(EntryId),
    /// An existing queued entry absorbed the mutation.
    Coalesced(EntryId),
    /// A delete cancelled a never-flushed create; nothing remains queued
    /// and no remote call will ever be made for this note.
    CancelledCreate,
}

/// Result of a [`SyncQueue::mark_failed`] call.
#[derive(Debug, Clone, PartialEq)]
pub enum FailOutcome {
    /// The entry stays queued and becomes eligible again after backoff.
    Retained {
        /// The retained entry's ID.
        entry_id: EntryId,
        /// Attempt count including the failure just recorded.
        attempt_count: u32,
    },
    /// The entry was removed as a terminal failure and must be reported.
    Removed(Box<SyncQueueEntry>),
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct QueueSnapshot {
    next_entry_id: u64,
    entries: Vec<SyncQueueEntry>,
}

struct QueueInner {
    entries: VecDeque<SyncQueueEntry>,
    next_entry_id: u64,
}

/// A durable, FIFO-per-note log of pending local mutations.
///
/// # Invariants
///
/// - Entries for a single note drain in enqueue order
/// - At most one entry per note is in flight at a time
/// - Rapid consecutive updates coalesce to the latest payload
/// - A delete supersedes any queued create/update for the same note
/// - Every mutation persists through the backend before returning
pub struct SyncQueue {
    backend: Box<dyn StorageBackend>,
    inner: Mutex<QueueInner>,
}

impl SyncQueue {
    /// Opens the queue, loading any persisted entries.
    ///
    /// In-flight markers are not persisted: entries that were mid-drain at
    /// the last shutdown come back pending.
    pub fn open(backend: Box<dyn StorageBackend>) -> StoreResult<Self> {
        let snapshot = match backend.load()? {
            Some(bytes) => serde_json::from_slice::<QueueSnapshot>(&bytes)?,
            None => QueueSnapshot::default(),
        };

        Ok(Self {
            backend,
            inner: Mutex::new(QueueInner {
                entries: snapshot.entries.into(),
                next_entry_id: snapshot.next_entry_id.max(1),
            }),
        })
    }

    /// Enqueues a local mutation, coalescing against queued work for the
    /// same note.
    ///
    /// Coalescing rules (applied against the newest queued, not-in-flight
    /// entry for the note):
    /// - `Update` after a queued `Create` folds into the create's payload
    /// - `Update` after a queued `Update` replaces its payload
    /// - `Delete` after a queued `Create` cancels the entry outright
    /// - `Delete` after a queued `Update` turns the entry into a delete
    ///
    /// Entries already in flight are never touched; the mutation is
    /// appended behind them instead.
    pub fn enqueue(
        &self,
        note_id: NoteId,
        operation: QueueOperation,
        payload: Option<NotePayload>,
        base_revision: Option<RevisionToken>,
        now: DateTime<Utc>,
    ) -> StoreResult<EnqueueOutcome> {
        let mut inner = self.inner.lock();

        let existing = inner
            .entries
            .iter_mut()
            .rev()
            .find(|e| e.note_id == note_id && !e.in_flight);

        if let Some(entry) = existing {
            match (operation, entry.operation) {
                (QueueOperation::Update, QueueOperation::Create)
                | (QueueOperation::Update, QueueOperation::Update) => {
                    debug!(note = %note_id, entry = %entry.entry_id, "coalesced update");
                    entry.payload = payload;
                    let id = entry.entry_id;
                    self.persist(&inner)?;
                    return Ok(EnqueueOutcome::Coalesced(id));
                }
                (QueueOperation::Delete, QueueOperation::Create) => {
                    let id = entry.entry_id;
                    debug!(note = %note_id, entry = %id, "delete cancelled queued create");
                    inner.entries.retain(|e| e.entry_id != id);
                    self.persist(&inner)?;
                    return Ok(EnqueueOutcome::CancelledCreate);
                }
                (QueueOperation::Delete, QueueOperation::Update)
                | (QueueOperation::Delete, QueueOperation::Delete) => {
                    debug!(note = %note_id, entry = %entry.entry_id, "delete superseded queued entry");
                    entry.operation = QueueOperation::Delete;
                    entry.payload = None;
                    let id = entry.entry_id;
                    self.persist(&inner)?;
                    return Ok(EnqueueOutcome::Coalesced(id));
                }
                // Create never coalesces; updates behind a queued delete
                // cannot happen through the edit API.
                _ => {}
            }
        }

        let entry_id = EntryId::from_raw(inner.next_entry_id);
        inner.next_entry_id += 1;
        inner.entries.push_back(SyncQueueEntry {
            entry_id,
            note_id,
            operation,
            payload,
            base_revision,
            enqueued_at: now,
            attempt_count: 0,
            next_attempt_at: None,
            in_flight: false,
        });
        self.persist(&inner)?;
        Ok(EnqueueOutcome::Enqueued(entry_id))
    }

    /// Returns the next drain-eligible entry and marks it in flight.
    ///
    /// Entries come back in enqueue order across notes, skipping notes that
    /// already have work in flight or whose head entry is still inside its
    /// backoff window (later entries of a blocked note are never reordered
    /// ahead of its head).
    pub fn dequeue_next(&self, now: DateTime<Utc>) -> StoreResult<Option<SyncQueueEntry>> {
        let mut inner = self.inner.lock();

        let mut blocked: HashSet<NoteId> = inner
            .entries
            .iter()
            .filter(|e| e.in_flight)
            .map(|e| e.note_id)
            .collect();

        for entry in inner.entries.iter_mut() {
            if blocked.contains(&entry.note_id) {
                continue;
            }
            let eligible =
                !entry.in_flight && entry.next_attempt_at.is_none_or(|t| t <= now);
            if eligible {
                entry.in_flight = true;
                return Ok(Some(entry.clone()));
            }
            // Head entry for this note is not eligible; keep its successors
            // behind it.
            blocked.insert(entry.note_id);
        }

        Ok(None)
    }

    /// Removes an entry whose remote operation was acknowledged.
    pub fn mark_acknowledged(&self, entry_id: EntryId) -> StoreResult<SyncQueueEntry> {
        let mut inner = self.inner.lock();
        let pos = inner
            .entries
            .iter()
            .position(|e| e.entry_id == entry_id)
            .ok_or(StoreError::UnknownEntry(entry_id))?;
        let entry = inner.entries.remove(pos).expect("position just found");
        self.persist(&inner)?;
        Ok(entry)
    }

    /// Records a drain failure.
    ///
    /// Retryable failures keep the entry queued with an incremented attempt
    /// count and the given backoff eligibility time, unless `max_attempts`
    /// is exhausted. Non-retryable failures and exhausted entries are
    /// removed and handed back for reporting.
    pub fn mark_failed(
        &self,
        entry_id: EntryId,
        retryable: bool,
        next_attempt_at: DateTime<Utc>,
        max_attempts: u32,
    ) -> StoreResult<FailOutcome> {
        let mut inner = self.inner.lock();
        let pos = inner
            .entries
            .iter()
            .position(|e| e.entry_id == entry_id)
            .ok_or(StoreError::UnknownEntry(entry_id))?;

        let entry = &mut inner.entries[pos];
        entry.attempt_count += 1;
        entry.in_flight = false;

        if !retryable || entry.attempt_count >= max_attempts {
            let entry = inner.entries.remove(pos).expect("position just found");
            warn!(
                note = %entry.note_id,
                entry = %entry.entry_id,
                attempts = entry.attempt_count,
                "queue entry removed after terminal failure"
            );
            self.persist(&inner)?;
            return Ok(FailOutcome::Removed(Box::new(entry)));
        }

        entry.next_attempt_at = Some(next_attempt_at);
        let outcome = FailOutcome::Retained {
            entry_id,
            attempt_count: entry.attempt_count,
        };
        self.persist(&inner)?;
        Ok(outcome)
    }

    /// Drops every queued entry for a note, except ones currently in
    /// flight. Used when a detected conflict freezes the note until
    /// explicit resolution.
    pub fn remove_for(&self, note_id: NoteId) -> StoreResult<usize> {
        let mut inner = self.inner.lock();
        let before = inner.entries.len();
        inner
            .entries
            .retain(|e| e.note_id != note_id || e.in_flight);
        let removed = before - inner.entries.len();
        if removed > 0 {
            debug!(note = %note_id, removed, "dropped queued entries");
            self.persist(&inner)?;
        }
        Ok(removed)
    }

    /// Returns an in-flight entry to pending without recording an attempt.
    ///
    /// Used when a drain cycle is cancelled mid-flight.
    pub fn release(&self, entry_id: EntryId) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        let entry = inner
            .entries
            .iter_mut()
            .find(|e| e.entry_id == entry_id)
            .ok_or(StoreError::UnknownEntry(entry_id))?;
        entry.in_flight = false;
        Ok(())
    }

    /// Returns the true pending entry count.
    pub fn count(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Returns the pending entry count for one note.
    pub fn count_for(&self, note_id: NoteId) -> usize {
        self.inner
            .lock()
            .entries
            .iter()
            .filter(|e| e.note_id == note_id)
            .count()
    }

    /// Returns true if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    /// Returns true if the note has queued (or in-flight) work.
    pub fn has_pending_for(&self, note_id: NoteId) -> bool {
        self.inner
            .lock()
            .entries
            .iter()
            .any(|e| e.note_id == note_id)
    }

    /// Returns a snapshot of all entries, in queue order.
    pub fn entries(&self) -> Vec<SyncQueueEntry> {
        self.inner.lock().entries.iter().cloned().collect()
    }

    fn persist(&self, inner: &QueueInner) -> StoreResult<()> {
        let snapshot = QueueSnapshot {
            next_entry_id: inner.next_entry_id,
            entries: inner.entries.iter().cloned().collect(),
        };
        let bytes = serde_json::to_vec(&snapshot)?;
        self.backend.persist(&bytes)
    }
}
