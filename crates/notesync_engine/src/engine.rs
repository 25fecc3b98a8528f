//! The sync engine: local edit API, inbound reconciliation, and outbound
//! queue draining.

use crate::config::SyncConfig;
use crate::error::{EngineError, EngineResult};
use crate::events::EngineEvent;
use crate::retention::RetentionPlan;
use chrono::{DateTime, Utc};
use notesync_model::{
    classify, is_collection_id, ModelError, Note, NoteId, NotePatch, NotePayload, RemoteEntity,
    RemoteSnapshot, RevisionToken, StoredCollection, SyncStatus,
};
use notesync_remote::{FileMetadata, RemoteError, RemoteStore};
use notesync_store::{
    EnqueueOutcome, FailOutcome, NoteStore, QueueOperation, StoreError, SyncQueue, SyncQueueEntry,
};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, info, warn};

/// Lifecycle state of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// No cycle running; never synced or last cycle cancelled.
    Idle,
    /// Applying inbound remote changes.
    Reconciling,
    /// Pushing queued local mutations.
    Draining,
    /// Last cycle completed successfully.
    Synced,
    /// Halted until credentials are restored.
    AuthRequired,
    /// Last cycle failed.
    Error,
}

impl EngineState {
    /// Returns true while a cycle is running.
    pub fn is_active(&self) -> bool {
        matches!(self, EngineState::Reconciling | EngineState::Draining)
    }
}

/// How to resolve an open conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictChoice {
    /// Keep the local content and push it over the remote.
    KeepLocal,
    /// Adopt the remote content, discarding local edits.
    AcceptRemote,
}

/// Counters accumulated across cycles.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Completed sync cycles.
    pub cycles_completed: u64,
    /// Remote changes applied locally.
    pub files_pulled: u64,
    /// Queue entries acknowledged remotely.
    pub entries_pushed: u64,
    /// Conflicts detected.
    pub conflicts_detected: u64,
    /// Transient failures that scheduled a retry.
    pub retries: u64,
    /// Description of the last cycle failure, if any.
    pub last_error: Option<String>,
    /// Completion time of the last successful cycle.
    pub last_synced_at: Option<DateTime<Utc>>,
}

/// Outcome of one sync cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    /// Remote changes applied locally.
    pub pulled: u64,
    /// Queue entries acknowledged remotely.
    pub pushed: u64,
    /// Entries still queued (inside a backoff window) when the cycle ended.
    pub deferred: usize,
}

/// Entry-level failure routing during a drain.
enum EntryError {
    /// A remote failure, resolved per entry (retry, report, or halt).
    Remote(RemoteError),
    /// A local failure that aborts the whole cycle.
    Fatal(EngineError),
}

impl From<RemoteError> for EntryError {
    fn from(e: RemoteError) -> Self {
        EntryError::Remote(e)
    }
}

impl From<StoreError> for EntryError {
    fn from(e: StoreError) -> Self {
        EntryError::Fatal(e.into())
    }
}

impl From<ModelError> for EntryError {
    fn from(e: ModelError) -> Self {
        EntryError::Fatal(e.into())
    }
}

/// An offline-first note synchronization engine.
///
/// Local edits are applied to the [`NoteStore`] immediately and recorded in
/// the durable [`SyncQueue`]; a [`sync`](SyncEngine::sync) cycle reconciles
/// inbound remote changes first, then drains the queue against the remote
/// store with per-note ordering and bounded retry.
///
/// The engine is fully synchronous and safe to share across threads; at
/// most one cycle runs at a time.
pub struct SyncEngine<R: RemoteStore> {
    remote: Arc<R>,
    notes: NoteStore,
    queue: SyncQueue,
    config: SyncConfig,
    state: RwLock<EngineState>,
    stats: Mutex<SyncStats>,
    events: Mutex<Vec<EngineEvent>>,
    cancelled: AtomicBool,
    online: AtomicBool,
    auth_halted: AtomicBool,
}

impl<R: RemoteStore> SyncEngine<R> {
    /// Creates an engine over the given stores. Starts online and idle.
    pub fn new(remote: Arc<R>, notes: NoteStore, queue: SyncQueue, config: SyncConfig) -> Self {
        Self {
            remote,
            notes,
            queue,
            config,
            state: RwLock::new(EngineState::Idle),
            stats: Mutex::new(SyncStats::default()),
            events: Mutex::new(Vec::new()),
            cancelled: AtomicBool::new(false),
            online: AtomicBool::new(true),
            auth_halted: AtomicBool::new(false),
        }
    }

    // ---- local edit API ----------------------------------------------

    /// Creates a note locally and queues its first upload.
    pub fn create_note(
        &self,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> EngineResult<Note> {
        let now = Utc::now();
        let note = Note::new(title, content, now);
        self.notes.upsert(note.clone())?;
        self.queue.enqueue(
            note.id,
            QueueOperation::Create,
            Some(note.payload()),
            None,
            now,
        )?;
        debug!(note = %note.id, "note created");
        Ok(note)
    }

    /// Applies a local edit and queues its upload.
    ///
    /// Edits to a conflicted note land on the local side only; nothing is
    /// queued until the conflict is resolved.
    pub fn update_note(&self, id: NoteId, patch: &NotePatch) -> EngineResult<Note> {
        let now = Utc::now();
        let existing = self.notes.get(id).ok_or(StoreError::UnknownNote(id))?;

        if existing.sync_status.is_conflict() {
            let note = self.notes.update_with(id, |n| {
                if let Some(title) = &patch.title {
                    n.title = title.clone();
                }
                if let Some(content) = &patch.content {
                    n.content = content.clone();
                }
                n.version += 1;
                n.updated_at = now;
            })?;
            return Ok(note);
        }

        let note = self.notes.update_with(id, |n| n.apply_patch(patch, now))?;
        self.queue.enqueue(
            id,
            QueueOperation::Update,
            Some(note.payload()),
            note.remote_revision.clone(),
            now,
        )?;
        Ok(note)
    }

    /// Queues a note deletion.
    ///
    /// A never-uploaded note is removed immediately with no remote call;
    /// otherwise the record stays (as a pending tombstone) until the remote
    /// delete is acknowledged.
    pub fn delete_note(&self, id: NoteId) -> EngineResult<()> {
        let now = Utc::now();
        let note = self.notes.get(id).ok_or(StoreError::UnknownNote(id))?;

        let outcome = self.queue.enqueue(
            id,
            QueueOperation::Delete,
            None,
            note.remote_revision.clone(),
            now,
        )?;

        if outcome == EnqueueOutcome::CancelledCreate {
            self.notes.remove(id)?;
            debug!(note = %id, "delete cancelled a never-uploaded note");
        } else {
            self.notes.update_with(id, |n| {
                n.sync_status = SyncStatus::Pending;
                n.updated_at = now;
            })?;
        }
        Ok(())
    }

    /// Resolves an open conflict.
    ///
    /// `KeepLocal` re-queues the local content based on the conflicting
    /// remote revision; `AcceptRemote` adopts the remote side and marks the
    /// note synced.
    pub fn resolve_conflict(&self, id: NoteId, choice: ConflictChoice) -> EngineResult<Note> {
        let now = Utc::now();
        let note = self.notes.get(id).ok_or(StoreError::UnknownNote(id))?;
        let Some(snapshot) = note.conflict else {
            return Err(EngineError::NotInConflict(id));
        };

        match choice {
            ConflictChoice::KeepLocal => {
                let updated = self.notes.update_with(id, |n| {
                    n.conflict = None;
                    n.sync_status = SyncStatus::Pending;
                    n.updated_at = now;
                })?;
                self.queue.enqueue(
                    id,
                    QueueOperation::Update,
                    Some(updated.payload()),
                    Some(snapshot.revision),
                    now,
                )?;
                info!(note = %id, "conflict resolved: keeping local");
                Ok(updated)
            }
            ConflictChoice::AcceptRemote => {
                let updated = self.notes.update_with(id, |n| {
                    n.title = snapshot.payload.title.clone();
                    n.content = snapshot.payload.content.clone();
                    n.version += 1;
                    n.updated_at = snapshot.modified_time;
                    n.mark_synced(snapshot.revision.clone());
                })?;
                info!(note = %id, "conflict resolved: adopting remote");
                Ok(updated)
            }
        }
    }

    // ---- queries ------------------------------------------------------

    /// Returns a note by ID.
    pub fn note(&self, id: NoteId) -> Option<Note> {
        self.notes.get(id)
    }

    /// Returns all notes.
    pub fn notes(&self) -> Vec<Note> {
        self.notes.list()
    }

    /// Returns all stored collection blobs.
    pub fn collections(&self) -> Vec<StoredCollection> {
        self.notes.collections()
    }

    /// Returns the number of queued local mutations.
    pub fn pending_count(&self) -> usize {
        self.queue.count()
    }

    /// Returns the current engine state.
    pub fn state(&self) -> EngineState {
        *self.state.read()
    }

    /// Returns a snapshot of the accumulated counters.
    pub fn stats(&self) -> SyncStats {
        self.stats.lock().clone()
    }

    /// Drains and returns buffered events.
    pub fn take_events(&self) -> Vec<EngineEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    // ---- lifecycle ----------------------------------------------------

    /// Records a connectivity change. A transition to online triggers a
    /// sync cycle (unless halted for re-authentication) and returns its
    /// report.
    pub fn set_online(&self, online: bool) -> EngineResult<Option<SyncReport>> {
        let was_online = self.online.swap(online, Ordering::SeqCst);
        if online && !was_online {
            info!("back online");
            if !self.auth_halted.load(Ordering::SeqCst) {
                return self.sync().map(Some);
            }
        }
        Ok(None)
    }

    /// Returns true if network operations are currently attempted.
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Requests cancellation of the running cycle. In-flight entries are
    /// returned to the queue without an attempt recorded.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Drives sync cycles at the configured drain interval.
    ///
    /// Intended for a dedicated scheduler thread. Runs until
    /// [`cancel`](Self::cancel) is called or a cycle fails in a way that
    /// needs the caller (authentication, local storage). Offline and
    /// transient failures keep the loop alive; without a configured
    /// interval a single cycle is run.
    pub fn run(&self) -> EngineResult<()> {
        loop {
            if self.cancelled.load(Ordering::SeqCst) {
                return Ok(());
            }
            match self.sync() {
                Ok(_) | Err(EngineError::Offline) => {}
                Err(EngineError::Cancelled) => return Ok(()),
                Err(e) if e.is_retryable() => {
                    warn!(error = %e, "cycle failed; retrying at next drain");
                }
                Err(e) => return Err(e),
            }
            let Some(interval) = self.config.drain_interval else {
                return Ok(());
            };
            thread::sleep(interval);
        }
    }

    /// Clears the authentication halt after credentials were restored.
    pub fn credentials_restored(&self) {
        self.auth_halted.store(false, Ordering::SeqCst);
        let mut state = self.state.write();
        if *state == EngineState::AuthRequired {
            *state = EngineState::Idle;
        }
        info!("credentials restored; sync resumed");
    }

    // ---- sync cycle ---------------------------------------------------

    /// Runs one sync cycle: inbound reconciliation, then a queue drain.
    pub fn sync(&self) -> EngineResult<SyncReport> {
        if !self.online.load(Ordering::SeqCst) {
            return Err(EngineError::Offline);
        }
        if self.auth_halted.load(Ordering::SeqCst) {
            return Err(EngineError::AuthRequired);
        }
        {
            let mut state = self.state.write();
            if state.is_active() {
                return Err(EngineError::SyncInProgress);
            }
            *state = EngineState::Reconciling;
        }
        self.cancelled.store(false, Ordering::SeqCst);
        info!("sync cycle started");

        let result = self.run_cycle();
        match &result {
            Ok(report) => {
                let mut stats = self.stats.lock();
                stats.cycles_completed += 1;
                stats.files_pulled += report.pulled;
                stats.entries_pushed += report.pushed;
                stats.last_error = None;
                stats.last_synced_at = Some(Utc::now());
                *self.state.write() = EngineState::Synced;
                info!(
                    pulled = report.pulled,
                    pushed = report.pushed,
                    deferred = report.deferred,
                    "sync cycle finished"
                );
            }
            Err(EngineError::AuthRequired) => {
                self.stats.lock().last_error = Some("authentication required".into());
                *self.state.write() = EngineState::AuthRequired;
            }
            Err(EngineError::Cancelled) => {
                *self.state.write() = EngineState::Idle;
                info!("sync cycle cancelled");
            }
            Err(e) => {
                self.stats.lock().last_error = Some(e.to_string());
                *self.state.write() = EngineState::Error;
                warn!(error = %e, "sync cycle failed");
            }
        }
        result
    }

    /// Runs [`sync`](Self::sync), retrying the whole cycle on transient
    /// failures up to the configured attempt ceiling.
    pub fn sync_with_retry(&self) -> EngineResult<SyncReport> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.sync() {
                Err(e) if e.is_retryable() && attempt < self.config.retry.max_attempts => {
                    let delay = self.config.retry.delay_for_attempt(attempt);
                    warn!(attempt, ?delay, "sync cycle failed; retrying");
                    thread::sleep(delay);
                }
                other => return other,
            }
        }
    }

    fn run_cycle(&self) -> EngineResult<SyncReport> {
        let pulled = self.reconcile_inbound()?;
        self.check_cancelled()?;
        *self.state.write() = EngineState::Draining;
        let pushed = self.drain_queue()?;
        Ok(SyncReport {
            pulled,
            pushed,
            deferred: self.queue.count(),
        })
    }

    fn check_cancelled(&self) -> EngineResult<()> {
        if self.cancelled.load(Ordering::SeqCst) {
            Err(EngineError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn push_event(&self, event: EngineEvent) {
        self.events.lock().push(event);
    }

    fn halt_for_auth(&self, message: String) -> EngineError {
        warn!(reason = %message, "credentials rejected; halting sync");
        self.auth_halted.store(true, Ordering::SeqCst);
        self.push_event(EngineEvent::AuthRequired);
        EngineError::AuthRequired
    }

    // ---- inbound reconciliation --------------------------------------

    fn reconcile_inbound(&self) -> EngineResult<u64> {
        let mut pulled = 0u64;
        loop {
            self.check_cancelled()?;
            let cursor = self.notes.change_cursor();
            let page = match self.remote.list_changed_files(cursor.as_deref()) {
                Ok(page) => page,
                Err(RemoteError::Auth(msg)) => return Err(self.halt_for_auth(msg)),
                Err(e) => return Err(e.into()),
            };

            for meta in &page.files {
                self.check_cancelled()?;
                if self.apply_remote_change(meta)? {
                    pulled += 1;
                }
            }
            self.notes.set_change_cursor(page.next_cursor)?;
            if !page.has_more {
                break;
            }
        }
        Ok(pulled)
    }

    /// Applies one changed remote file. Returns true if local state moved.
    fn apply_remote_change(&self, meta: &FileMetadata) -> EngineResult<bool> {
        // ID-level pre-filter: collection-tagged files never reach the
        // note path, content fetch or not.
        if is_collection_id(&meta.id) {
            return self.apply_remote_collection(meta);
        }

        let bytes = match self.remote.get_content(&meta.id) {
            Ok(bytes) => bytes,
            Err(RemoteError::NotFound(_)) => return self.apply_remote_deletion(&meta.id),
            Err(RemoteError::Auth(msg)) => return Err(self.halt_for_auth(msg)),
            Err(RemoteError::Permission { file_id }) => {
                warn!(file = %file_id, "access revoked; skipping remote file");
                self.push_event(EngineEvent::AccessRevoked { file_id });
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        };

        let value: serde_json::Value = match serde_json::from_slice(&bytes) {
            Ok(value) => value,
            Err(e) => {
                warn!(file = %meta.id, error = %e, "remote file is not JSON; skipping");
                self.push_event(EngineEvent::SkippedUnknown {
                    file_id: meta.id.clone(),
                });
                return Ok(false);
            }
        };

        match classify(&value) {
            RemoteEntity::Note(payload) => self.merge_remote_note(meta, payload),
            RemoteEntity::Collection(blob) => {
                self.notes.upsert_collection(StoredCollection {
                    remote_id: meta.id.clone(),
                    raw: blob.raw,
                    note_ids: blob.note_ids,
                    modified_time: meta.modified_time,
                    revision: meta.revision.clone(),
                })?;
                Ok(true)
            }
            RemoteEntity::Unknown => {
                debug!(file = %meta.id, "unclassifiable remote file; skipping");
                self.push_event(EngineEvent::SkippedUnknown {
                    file_id: meta.id.clone(),
                });
                Ok(false)
            }
        }
    }

    /// Stores a collection blob verbatim; its shape is never interpreted
    /// beyond member extraction.
    fn apply_remote_collection(&self, meta: &FileMetadata) -> EngineResult<bool> {
        let bytes = match self.remote.get_content(&meta.id) {
            Ok(bytes) => bytes,
            Err(RemoteError::NotFound(_)) => {
                self.notes.remove_collection(&meta.id)?;
                return Ok(true);
            }
            Err(RemoteError::Auth(msg)) => return Err(self.halt_for_auth(msg)),
            Err(RemoteError::Permission { file_id }) => {
                warn!(file = %file_id, "access revoked; skipping collection");
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        };

        let value: serde_json::Value = match serde_json::from_slice(&bytes) {
            Ok(value) => value,
            Err(e) => {
                warn!(file = %meta.id, error = %e, "collection file is not JSON; skipping");
                return Ok(false);
            }
        };

        // The ID prefix wins over content shape.
        let note_ids = match classify(&value) {
            RemoteEntity::Collection(blob) => blob.note_ids,
            _ => Vec::new(),
        };
        self.notes.upsert_collection(StoredCollection {
            remote_id: meta.id.clone(),
            raw: value,
            note_ids,
            modified_time: meta.modified_time,
            revision: meta.revision.clone(),
        })?;
        Ok(true)
    }

    fn merge_remote_note(&self, meta: &FileMetadata, payload: NotePayload) -> EngineResult<bool> {
        let Some(note) = self.notes.find_by_remote_id(&meta.id) else {
            // New note from another client.
            let mut note = Note::new(payload.title, payload.content, meta.modified_time);
            note.remote_id = Some(meta.id.clone());
            note.mark_synced(meta.revision.clone());
            let id = note.id;
            self.notes.upsert(note)?;
            debug!(note = %id, file = %meta.id, "materialized remote note");
            return Ok(true);
        };

        if note.remote_revision.as_ref() == Some(&meta.revision) {
            // Our own acknowledged write echoing back.
            return Ok(false);
        }

        let has_local_edits = self.queue.has_pending_for(note.id)
            || note.sync_status.is_pending()
            || note.sync_status.is_conflict();

        if note.payload() == payload {
            // Same content on both sides; adopt the newer revision.
            self.notes
                .update_with(note.id, |n| n.mark_synced(meta.revision.clone()))?;
            return Ok(true);
        }

        if has_local_edits {
            self.record_conflict(
                note.id,
                RemoteSnapshot {
                    revision: meta.revision.clone(),
                    modified_time: meta.modified_time,
                    payload,
                },
            )?;
            return Ok(true);
        }

        // Locally clean: the remote edit wins.
        self.notes.update_with(note.id, |n| {
            n.title = payload.title.clone();
            n.content = payload.content.clone();
            n.version += 1;
            n.updated_at = meta.modified_time;
            n.mark_synced(meta.revision.clone());
        })?;
        debug!(note = %note.id, "applied remote edit");
        Ok(true)
    }

    /// Handles a file that disappeared remotely.
    fn apply_remote_deletion(&self, file_id: &str) -> EngineResult<bool> {
        let Some(note) = self.notes.find_by_remote_id(file_id) else {
            // An unprefixed collection, or something never materialized.
            self.notes.remove_collection(file_id)?;
            return Ok(false);
        };

        let has_local_edits = self.queue.has_pending_for(note.id)
            || note.sync_status.is_pending()
            || note.sync_status.is_conflict();

        if has_local_edits {
            // Pending local edits survive a remote delete: the note loses
            // its remote identity and re-uploads as a new file.
            self.notes.update_with(note.id, |n| {
                n.remote_id = None;
                n.remote_revision = None;
                n.conflict = None;
                n.sync_status = SyncStatus::Pending;
            })?;
            if !self.queue.has_pending_for(note.id) {
                self.queue.enqueue(
                    note.id,
                    QueueOperation::Create,
                    Some(note.payload()),
                    None,
                    Utc::now(),
                )?;
            }
            self.push_event(EngineEvent::NoteResurrected { note_id: note.id });
            info!(note = %note.id, file = %file_id, "remote delete lost to pending local edits");
        } else {
            self.notes.remove(note.id)?;
            self.push_event(EngineEvent::RemoteDeleted { note_id: note.id });
            debug!(note = %note.id, file = %file_id, "applied remote delete");
        }
        Ok(true)
    }

    fn record_conflict(&self, note_id: NoteId, snapshot: RemoteSnapshot) -> EngineResult<()> {
        // Freeze the note: queued work is dropped, both sides are retained
        // on the record until explicit resolution.
        self.queue.remove_for(note_id)?;
        self.notes
            .update_with(note_id, |n| n.mark_conflict(snapshot))?;
        self.stats.lock().conflicts_detected += 1;
        self.push_event(EngineEvent::ConflictDetected { note_id });
        warn!(note = %note_id, "conflict detected");
        Ok(())
    }

    // ---- outbound drain ----------------------------------------------

    fn drain_queue(&self) -> EngineResult<u64> {
        let pushed = AtomicU64::new(0);
        let failure: Mutex<Option<EngineError>> = Mutex::new(None);
        let workers = self.config.worker_count.max(1);

        thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| loop {
                    if self.cancelled.load(Ordering::SeqCst)
                        || self.auth_halted.load(Ordering::SeqCst)
                        || failure.lock().is_some()
                    {
                        break;
                    }
                    let entry = match self.queue.dequeue_next(Utc::now()) {
                        Ok(Some(entry)) => entry,
                        Ok(None) => break,
                        Err(e) => {
                            failure.lock().get_or_insert(e.into());
                            break;
                        }
                    };
                    match self.process_entry(&entry) {
                        Ok(true) => {
                            pushed.fetch_add(1, Ordering::Relaxed);
                        }
                        Ok(false) => {}
                        Err(e) => {
                            failure.lock().get_or_insert(e);
                            break;
                        }
                    }
                });
            }
        });

        if let Some(err) = failure.into_inner() {
            return Err(err);
        }
        self.check_cancelled()?;
        Ok(pushed.into_inner())
    }

    /// Drains one entry. Returns true if a remote write was acknowledged.
    fn process_entry(&self, entry: &SyncQueueEntry) -> EngineResult<bool> {
        if self.cancelled.load(Ordering::SeqCst) {
            self.queue.release(entry.entry_id)?;
            return Ok(false);
        }

        let result = match entry.operation {
            QueueOperation::Create => self.push_create(entry),
            QueueOperation::Update => self.push_update(entry),
            QueueOperation::Delete => self.push_delete(entry),
        };

        match result {
            Ok(acked) => Ok(acked),
            Err(EntryError::Remote(e)) => self.handle_entry_failure(entry, e),
            Err(EntryError::Fatal(e)) => Err(e),
        }
    }

    fn push_create(&self, entry: &SyncQueueEntry) -> Result<bool, EntryError> {
        let Some(note) = self.notes.get(entry.note_id) else {
            // The note vanished locally; nothing to upload.
            self.queue.mark_acknowledged(entry.entry_id)?;
            return Ok(false);
        };
        let payload = entry
            .payload
            .clone()
            .ok_or(EntryError::Fatal(EngineError::MalformedEntry(entry.entry_id)))?;
        let bytes = payload.to_bytes()?;

        let meta = match note.remote_id.as_deref() {
            // Replay of a create whose acknowledgement was lost: the file
            // exists and its identity is already persisted, so re-put in
            // place instead of forking a second file.
            Some(remote_id) => {
                match self
                    .remote
                    .put_content(Some(remote_id), note.remote_revision.as_ref(), &bytes)
                {
                    Ok(meta) => meta,
                    Err(RemoteError::Conflict { .. }) => {
                        return self.inspect_push_conflict(entry, remote_id, &bytes);
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            None => self.remote.put_content(None, None, &bytes)?,
        };
        self.record_push(entry, &meta, Some(meta.id.clone()))?;
        debug!(note = %entry.note_id, file = %meta.id, "created remote file");
        Ok(true)
    }

    fn push_update(&self, entry: &SyncQueueEntry) -> Result<bool, EntryError> {
        let Some(note) = self.notes.get(entry.note_id) else {
            self.queue.mark_acknowledged(entry.entry_id)?;
            return Ok(false);
        };
        let Some(remote_id) = note.remote_id.clone() else {
            // The note lost its remote identity (remote-deleted with
            // pending edits); upload as a fresh file.
            return self.push_create(entry);
        };
        let payload = entry
            .payload
            .clone()
            .ok_or(EntryError::Fatal(EngineError::MalformedEntry(entry.entry_id)))?;
        let bytes = payload.to_bytes()?;

        // The base captured at enqueue, or the latest acknowledged
        // revision when the entry predates the note's first upload.
        let base = entry
            .base_revision
            .clone()
            .or(note.remote_revision.clone());

        match self.remote.put_content(Some(&remote_id), base.as_ref(), &bytes) {
            Ok(meta) => {
                self.record_push(entry, &meta, None)?;
                debug!(note = %entry.note_id, revision = %meta.revision, "updated remote file");
                Ok(true)
            }
            Err(RemoteError::Conflict { .. }) => {
                self.inspect_push_conflict(entry, &remote_id, &bytes)
            }
            Err(RemoteError::NotFound(_)) => self.resurrect(entry, payload),
            Err(e) => Err(e.into()),
        }
    }

    fn push_delete(&self, entry: &SyncQueueEntry) -> Result<bool, EntryError> {
        let remote_id = self.notes.get(entry.note_id).and_then(|n| n.remote_id);
        let Some(remote_id) = remote_id else {
            // Never uploaded (or identity already gone); local-only removal.
            self.queue.mark_acknowledged(entry.entry_id)?;
            self.notes.remove(entry.note_id)?;
            return Ok(false);
        };

        match self.remote.delete_file(&remote_id) {
            Ok(()) | Err(RemoteError::NotFound(_)) => {
                self.queue.mark_acknowledged(entry.entry_id)?;
                self.notes.remove(entry.note_id)?;
                debug!(note = %entry.note_id, file = %remote_id, "deleted remote file");
                Ok(true)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Records the new revision, then acknowledges the queue entry.
    ///
    /// The remote identity must be durable before the entry is dropped: the
    /// reverse order can persist an entry removal, lose the assignment, and
    /// fork a duplicate remote file on the next edit. Losing the
    /// acknowledgement instead merely replays the upload against the same
    /// file.
    fn record_push(
        &self,
        entry: &SyncQueueEntry,
        meta: &FileMetadata,
        assign_remote_id: Option<String>,
    ) -> Result<(), EntryError> {
        let revision = meta.revision.clone();
        self.notes.update_with(entry.note_id, |n| {
            if let Some(remote_id) = assign_remote_id {
                n.remote_id = Some(remote_id);
            }
            n.remote_revision = Some(revision);
        })?;
        self.queue.mark_acknowledged(entry.entry_id)?;
        // Later entries for the note keep it pending.
        if !self.queue.has_pending_for(entry.note_id) {
            self.notes.update_with(entry.note_id, |n| {
                n.sync_status = SyncStatus::Synced;
                n.conflict = None;
            })?;
        }
        Ok(())
    }

    /// Distinguishes a real conflict from our own write echoing back.
    fn inspect_push_conflict(
        &self,
        entry: &SyncQueueEntry,
        remote_id: &str,
        local_bytes: &[u8],
    ) -> Result<bool, EntryError> {
        let remote_bytes = match self.remote.get_content(remote_id) {
            Ok(bytes) => bytes,
            Err(RemoteError::NotFound(_)) => {
                let payload = entry
                    .payload
                    .clone()
                    .ok_or(EntryError::Fatal(EngineError::MalformedEntry(entry.entry_id)))?;
                return self.resurrect(entry, payload);
            }
            Err(e) => return Err(e.into()),
        };

        let head = self
            .remote
            .list_revisions(remote_id, 1)?
            .into_iter()
            .next()
            .ok_or_else(|| {
                EntryError::Remote(RemoteError::Protocol(format!(
                    "no revisions for {remote_id}"
                )))
            })?;
        let revision = RevisionToken::new(head.id.clone());

        if remote_bytes == local_bytes {
            // False conflict: an earlier attempt landed but the response
            // was lost. Adopt the revision it created. Revision first,
            // acknowledgement second, as in `record_push`.
            self.notes.update_with(entry.note_id, |n| {
                n.remote_revision = Some(revision.clone());
            })?;
            self.queue.mark_acknowledged(entry.entry_id)?;
            if !self.queue.has_pending_for(entry.note_id) {
                self.notes.update_with(entry.note_id, |n| {
                    n.sync_status = SyncStatus::Synced;
                    n.conflict = None;
                })?;
            }
            debug!(note = %entry.note_id, "false conflict resolved");
            return Ok(true);
        }

        let remote_payload = NotePayload::from_bytes(&remote_bytes).map_err(|e| {
            EntryError::Remote(RemoteError::Protocol(format!(
                "conflicting content of {remote_id} is not a note: {e}"
            )))
        })?;

        self.queue.mark_acknowledged(entry.entry_id)?;
        self.record_conflict(
            entry.note_id,
            RemoteSnapshot {
                revision,
                modified_time: head.modified_time,
                payload: remote_payload,
            },
        )
        .map_err(EntryError::Fatal)?;
        Ok(false)
    }

    /// Converts an entry whose remote file disappeared into a fresh upload.
    fn resurrect(&self, entry: &SyncQueueEntry, payload: NotePayload) -> Result<bool, EntryError> {
        self.queue.mark_acknowledged(entry.entry_id)?;
        self.notes.update_with(entry.note_id, |n| {
            n.remote_id = None;
            n.remote_revision = None;
            n.sync_status = SyncStatus::Pending;
        })?;
        self.queue.enqueue(
            entry.note_id,
            QueueOperation::Create,
            Some(payload),
            None,
            Utc::now(),
        )?;
        self.push_event(EngineEvent::NoteResurrected {
            note_id: entry.note_id,
        });
        info!(note = %entry.note_id, "remote file gone; re-uploading as new");
        Ok(false)
    }

    fn handle_entry_failure(
        &self,
        entry: &SyncQueueEntry,
        error: RemoteError,
    ) -> EngineResult<bool> {
        let error = match error {
            RemoteError::Auth(msg) => {
                // The entry is untouched; it drains after re-authentication.
                self.queue.release(entry.entry_id)?;
                return Err(self.halt_for_auth(msg));
            }
            other => other,
        };

        let retryable = error.is_retryable();
        let delay = self.config.retry.delay_for_attempt(entry.attempt_count + 1);
        let next_attempt_at =
            Utc::now() + chrono::Duration::milliseconds(delay.as_millis() as i64);
        let outcome = self.queue.mark_failed(
            entry.entry_id,
            retryable,
            next_attempt_at,
            self.config.retry.max_attempts,
        )?;

        match outcome {
            FailOutcome::Retained {
                attempt_count,
                ..
            } => {
                self.stats.lock().retries += 1;
                debug!(
                    note = %entry.note_id,
                    attempt = attempt_count,
                    error = %error,
                    "entry failed; retry scheduled"
                );
            }
            FailOutcome::Removed(removed) => {
                warn!(
                    note = %removed.note_id,
                    attempts = removed.attempt_count,
                    error = %error,
                    "entry failed terminally"
                );
                self.push_event(EngineEvent::EntryFailed {
                    note_id: removed.note_id,
                    operation: removed.operation,
                    attempts: removed.attempt_count,
                    reason: error.to_string(),
                });
            }
        }
        Ok(false)
    }

    // ---- retention ----------------------------------------------------

    /// Plans revision pruning for a synced note: fetches its remote
    /// history and applies the retention policy.
    pub fn plan_retention(&self, id: NoteId, now: DateTime<Utc>) -> EngineResult<RetentionPlan> {
        let note = self.notes.get(id).ok_or(StoreError::UnknownNote(id))?;
        let remote_id = note.remote_id.ok_or(EngineError::LocalOnly(id))?;

        let revisions = match self
            .remote
            .list_revisions(&remote_id, self.config.revision_page_size)
        {
            Ok(revisions) => revisions,
            Err(RemoteError::Auth(msg)) => return Err(self.halt_for_auth(msg)),
            Err(e) => return Err(e.into()),
        };
        Ok(RetentionPlan::build(&revisions, now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notesync_remote::MockRemoteStore;
    use notesync_store::MemoryBackend;

    fn engine() -> SyncEngine<MockRemoteStore> {
        engine_with(Arc::new(MockRemoteStore::new()))
    }

    fn engine_with(remote: Arc<MockRemoteStore>) -> SyncEngine<MockRemoteStore> {
        let notes = NoteStore::open(Box::new(MemoryBackend::new())).unwrap();
        let queue = SyncQueue::open(Box::new(MemoryBackend::new())).unwrap();
        let config = SyncConfig::new()
            .with_worker_count(1)
            .with_retry(crate::RetryConfig::no_retry());
        SyncEngine::new(remote, notes, queue, config)
    }

    #[test]
    fn create_is_immediately_visible_and_queued() {
        let engine = engine();
        let note = engine.create_note("Title", "Body").unwrap();

        assert_eq!(engine.note(note.id).unwrap().title, "Title");
        assert_eq!(engine.pending_count(), 1);
        assert_eq!(note.sync_status, SyncStatus::Pending);
    }

    #[test]
    fn sync_uploads_created_note() {
        let remote = Arc::new(MockRemoteStore::new());
        let engine = engine_with(Arc::clone(&remote));

        let note = engine.create_note("Title", "Body").unwrap();
        let report = engine.sync().unwrap();

        assert_eq!(report.pushed, 1);
        assert_eq!(engine.pending_count(), 0);
        let synced = engine.note(note.id).unwrap();
        assert_eq!(synced.sync_status, SyncStatus::Synced);
        assert!(synced.remote_id.is_some());
        assert_eq!(engine.state(), EngineState::Synced);
    }

    #[test]
    fn offline_sync_is_refused() {
        let engine = engine();
        engine.set_online(false).unwrap();
        assert!(matches!(engine.sync(), Err(EngineError::Offline)));
    }

    #[test]
    fn delete_of_unsynced_note_never_hits_network() {
        let remote = Arc::new(MockRemoteStore::new());
        let engine = engine_with(Arc::clone(&remote));

        let note = engine.create_note("Title", "Body").unwrap();
        engine.delete_note(note.id).unwrap();

        assert!(engine.note(note.id).is_none());
        assert_eq!(engine.pending_count(), 0);
        engine.sync().unwrap();
        assert_eq!(remote.counts().puts, 0);
        assert_eq!(remote.counts().deletes, 0);
    }

    #[test]
    fn resolve_without_conflict_errors() {
        let engine = engine();
        let note = engine.create_note("Title", "Body").unwrap();
        let result = engine.resolve_conflict(note.id, ConflictChoice::KeepLocal);
        assert!(matches!(result, Err(EngineError::NotInConflict(_))));
    }

    #[test]
    fn cancel_leaves_queue_intact() {
        let engine = engine();
        engine.create_note("Title", "Body").unwrap();
        engine.cancel();
        // The flag is reset at the next sync start, so this cycle runs.
        engine.sync().unwrap();
        assert_eq!(engine.pending_count(), 0);
    }
}
