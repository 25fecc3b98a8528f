//! End-to-end engine behavior against the mock remote store.

use chrono::Duration;
use notesync_engine::{
    ConflictChoice, EngineError, EngineEvent, EngineState, RetryConfig, SyncConfig, SyncEngine,
    MAX_KEPT, RECENT_KEPT,
};
use notesync_model::{NotePatch, NotePayload, SyncStatus};
use notesync_remote::{MockOp, MockRemoteStore, RemoteError, RemoteStore};
use notesync_store::{
    MemoryBackend, NoteStore, StorageBackend, StoreError, StoreResult, SyncQueue,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

struct Harness {
    remote: Arc<MockRemoteStore>,
    notes_backend: MemoryBackend,
    queue_backend: MemoryBackend,
    engine: SyncEngine<MockRemoteStore>,
}

fn harness() -> Harness {
    harness_with_retry(RetryConfig::no_retry())
}

fn harness_with_retry(retry: RetryConfig) -> Harness {
    let remote = Arc::new(MockRemoteStore::new());
    let notes_backend = MemoryBackend::new();
    let queue_backend = MemoryBackend::new();
    let engine = build_engine(&remote, &notes_backend, &queue_backend, retry);
    Harness {
        remote,
        notes_backend,
        queue_backend,
        engine,
    }
}

fn build_engine(
    remote: &Arc<MockRemoteStore>,
    notes_backend: &MemoryBackend,
    queue_backend: &MemoryBackend,
    retry: RetryConfig,
) -> SyncEngine<MockRemoteStore> {
    let notes = NoteStore::open(Box::new(notes_backend.clone())).unwrap();
    let queue = SyncQueue::open(Box::new(queue_backend.clone())).unwrap();
    let config = SyncConfig::new().with_worker_count(2).with_retry(retry);
    SyncEngine::new(Arc::clone(remote), notes, queue, config)
}

fn payload_bytes(title: &str, content: &str) -> Vec<u8> {
    NotePayload::new(title, content).to_bytes().unwrap()
}

/// A memory backend whose next persist can be armed to fail once.
#[derive(Clone, Default)]
struct FlakyBackend {
    inner: MemoryBackend,
    fail_next: Arc<AtomicBool>,
}

impl FlakyBackend {
    fn arm_failure(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

impl StorageBackend for FlakyBackend {
    fn load(&self) -> StoreResult<Option<Vec<u8>>> {
        self.inner.load()
    }

    fn persist(&self, data: &[u8]) -> StoreResult<()> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Io(std::io::Error::other("disk full")));
        }
        self.inner.persist(data)
    }
}

#[test]
fn offline_edits_coalesce_to_one_upload() {
    let h = harness();
    let note = h.engine.create_note("List", "v0").unwrap();
    h.engine.sync().unwrap();
    assert_eq!(h.remote.counts().puts, 1);

    h.engine.set_online(false).unwrap();
    for i in 1..=5 {
        h.engine
            .update_note(note.id, &NotePatch::new().with_content(format!("v{i}")))
            .unwrap();
    }
    assert_eq!(h.engine.pending_count(), 1);

    let report = h.engine.set_online(true).unwrap().unwrap();
    assert_eq!(report.pushed, 1);
    assert_eq!(h.remote.counts().puts, 2);

    let remote_id = h.engine.note(note.id).unwrap().remote_id.unwrap();
    assert_eq!(
        h.remote.content_of(&remote_id).unwrap(),
        payload_bytes("List", "v5")
    );
}

#[test]
fn delete_after_offline_create_makes_no_remote_calls() {
    let h = harness();
    let note = h.engine.create_note("Ephemeral", "never uploaded").unwrap();
    h.engine.delete_note(note.id).unwrap();

    h.engine.sync().unwrap();
    assert_eq!(h.remote.counts().puts, 0);
    assert_eq!(h.remote.counts().deletes, 0);
    assert!(h.engine.note(note.id).is_none());
}

#[test]
fn delete_of_synced_note_reaches_remote() {
    let h = harness();
    let note = h.engine.create_note("Doomed", "body").unwrap();
    h.engine.sync().unwrap();
    let remote_id = h.engine.note(note.id).unwrap().remote_id.unwrap();
    assert!(h.remote.exists(&remote_id));

    h.engine.delete_note(note.id).unwrap();
    h.engine.sync().unwrap();
    assert!(!h.remote.exists(&remote_id));
    assert!(h.engine.note(note.id).is_none());
}

#[test]
fn concurrent_edit_surfaces_conflict_with_both_sides() {
    let h = harness();
    let note = h.engine.create_note("Shared", "local v1").unwrap();
    h.engine.sync().unwrap();
    let remote_id = h.engine.note(note.id).unwrap().remote_id.unwrap();

    // Another client rewrites the file while we edit offline.
    h.remote
        .set_content(&remote_id, &payload_bytes("Shared", "remote v2"));
    h.engine
        .update_note(note.id, &NotePatch::new().with_content("local v2"))
        .unwrap();

    h.engine.sync().unwrap();

    let conflicted = h.engine.note(note.id).unwrap();
    assert_eq!(conflicted.sync_status, SyncStatus::Conflict);
    assert_eq!(conflicted.content, "local v2");
    let snapshot = conflicted.conflict.unwrap();
    assert_eq!(snapshot.payload.content, "remote v2");
    assert_eq!(h.engine.pending_count(), 0);
    assert!(h
        .engine
        .take_events()
        .iter()
        .any(|e| matches!(e, EngineEvent::ConflictDetected { .. })));

    // Nothing was clobbered remotely.
    assert_eq!(
        h.remote.content_of(&remote_id).unwrap(),
        payload_bytes("Shared", "remote v2")
    );
}

#[test]
fn keep_local_resolution_pushes_local_content() {
    let h = harness();
    let note = h.engine.create_note("Shared", "local").unwrap();
    h.engine.sync().unwrap();
    let remote_id = h.engine.note(note.id).unwrap().remote_id.unwrap();

    h.remote
        .set_content(&remote_id, &payload_bytes("Shared", "remote"));
    h.engine
        .update_note(note.id, &NotePatch::new().with_content("local edited"))
        .unwrap();
    h.engine.sync().unwrap();
    assert!(h.engine.note(note.id).unwrap().sync_status.is_conflict());

    h.engine
        .resolve_conflict(note.id, ConflictChoice::KeepLocal)
        .unwrap();
    h.engine.sync().unwrap();

    let resolved = h.engine.note(note.id).unwrap();
    assert_eq!(resolved.sync_status, SyncStatus::Synced);
    assert_eq!(
        h.remote.content_of(&remote_id).unwrap(),
        payload_bytes("Shared", "local edited")
    );
}

#[test]
fn accept_remote_resolution_adopts_remote_content() {
    let h = harness();
    let note = h.engine.create_note("Shared", "local").unwrap();
    h.engine.sync().unwrap();
    let remote_id = h.engine.note(note.id).unwrap().remote_id.unwrap();

    h.remote
        .set_content(&remote_id, &payload_bytes("Shared", "remote wins"));
    h.engine
        .update_note(note.id, &NotePatch::new().with_content("local edited"))
        .unwrap();
    h.engine.sync().unwrap();

    let resolved = h
        .engine
        .resolve_conflict(note.id, ConflictChoice::AcceptRemote)
        .unwrap();
    assert_eq!(resolved.sync_status, SyncStatus::Synced);
    assert_eq!(resolved.content, "remote wins");
    assert!(resolved.conflict.is_none());
    assert_eq!(h.engine.pending_count(), 0);
}

#[test]
fn byte_identical_conflict_resolves_silently() {
    let h = harness();
    let note = h.engine.create_note("Note", "v1").unwrap();
    h.engine.sync().unwrap();
    let remote_id = h.engine.note(note.id).unwrap().remote_id.unwrap();

    // The remote already holds exactly what we are about to push, as after
    // a write whose acknowledgement was lost.
    h.remote.set_content(&remote_id, &payload_bytes("Note", "v2"));
    h.engine
        .update_note(note.id, &NotePatch::new().with_content("v2"))
        .unwrap();

    h.engine.sync().unwrap();

    let synced = h.engine.note(note.id).unwrap();
    assert_eq!(synced.sync_status, SyncStatus::Synced);
    assert!(synced.conflict.is_none());
    assert!(!h
        .engine
        .take_events()
        .iter()
        .any(|e| matches!(e, EngineEvent::ConflictDetected { .. })));
}

#[test]
fn auth_failure_halts_queue_until_restored() {
    let h = harness();
    h.engine.create_note("Held", "body").unwrap();
    h.remote
        .inject_failure(MockOp::Put, RemoteError::Auth("token expired".into()));

    let result = h.engine.sync();
    assert!(matches!(result, Err(EngineError::AuthRequired)));
    assert_eq!(h.engine.state(), EngineState::AuthRequired);
    assert_eq!(h.engine.pending_count(), 1);
    assert!(h
        .engine
        .take_events()
        .iter()
        .any(|e| matches!(e, EngineEvent::AuthRequired)));

    // Still halted: no network traffic is attempted.
    let puts_before = h.remote.counts().puts;
    assert!(matches!(h.engine.sync(), Err(EngineError::AuthRequired)));
    assert_eq!(h.remote.counts().puts, puts_before);

    h.engine.credentials_restored();
    let report = h.engine.sync().unwrap();
    assert_eq!(report.pushed, 1);
    assert_eq!(h.engine.pending_count(), 0);
}

#[test]
fn transient_failure_retries_within_cycle() {
    let h = harness_with_retry(
        RetryConfig::new(3).with_initial_delay(std::time::Duration::ZERO),
    );
    h.engine.create_note("Flaky", "body").unwrap();
    h.remote
        .inject_failure(MockOp::Put, RemoteError::transient("503"));

    let report = h.engine.sync().unwrap();
    assert_eq!(report.pushed, 1);
    assert_eq!(h.remote.counts().puts, 2);
    assert_eq!(h.engine.stats().retries, 1);
}

#[test]
fn terminal_failure_is_reported_not_dropped_silently() {
    let h = harness();
    let note = h.engine.create_note("Blocked", "body").unwrap();
    h.remote.inject_failure(
        MockOp::Put,
        RemoteError::Permission {
            file_id: "file-x".into(),
        },
    );

    let report = h.engine.sync().unwrap();
    assert_eq!(report.pushed, 0);
    assert_eq!(h.engine.pending_count(), 0);

    let events = h.engine.take_events();
    assert!(events.iter().any(|e| matches!(
        e,
        EngineEvent::EntryFailed { note_id, .. } if *note_id == note.id
    )));
    // The local record survives for the user to act on.
    assert_eq!(
        h.engine.note(note.id).unwrap().sync_status,
        SyncStatus::Pending
    );
}

#[test]
fn remote_delete_of_clean_note_removes_it_locally() {
    let h = harness();
    let note = h.engine.create_note("Gone", "body").unwrap();
    h.engine.sync().unwrap();
    let remote_id = h.engine.note(note.id).unwrap().remote_id.unwrap();

    h.remote.remove_file(&remote_id);
    h.engine.sync().unwrap();

    assert!(h.engine.note(note.id).is_none());
    assert!(h
        .engine
        .take_events()
        .iter()
        .any(|e| matches!(e, EngineEvent::RemoteDeleted { .. })));
}

#[test]
fn remote_delete_with_pending_edits_resurrects_note() {
    let h = harness();
    let note = h.engine.create_note("Survivor", "v1").unwrap();
    h.engine.sync().unwrap();
    let old_remote_id = h.engine.note(note.id).unwrap().remote_id.unwrap();

    h.remote.remove_file(&old_remote_id);
    h.engine
        .update_note(note.id, &NotePatch::new().with_content("v2"))
        .unwrap();

    h.engine.sync().unwrap();

    let revived = h.engine.note(note.id).unwrap();
    assert_eq!(revived.sync_status, SyncStatus::Synced);
    assert_eq!(revived.content, "v2");
    let new_remote_id = revived.remote_id.unwrap();
    assert_ne!(new_remote_id, old_remote_id);
    assert_eq!(
        h.remote.content_of(&new_remote_id).unwrap(),
        payload_bytes("Survivor", "v2")
    );
    assert!(h
        .engine
        .take_events()
        .iter()
        .any(|e| matches!(e, EngineEvent::NoteResurrected { .. })));
}

#[test]
fn remote_notes_and_collections_materialize_separately() {
    let h = harness();
    h.remote
        .seed_file("note-from-elsewhere", &payload_bytes("Imported", "hello"));
    h.remote.seed_file(
        "collection-inbox",
        br#"{"noteIds": ["a", "b"], "name": "Inbox"}"#,
    );
    h.remote.seed_file("stray", br#"{"foreign": true}"#);

    let report = h.engine.sync().unwrap();
    assert_eq!(report.pulled, 2);

    let notes = h.engine.notes();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].title, "Imported");
    assert_eq!(notes[0].sync_status, SyncStatus::Synced);

    let collections = h.engine.collections();
    assert_eq!(collections.len(), 1);
    assert_eq!(collections[0].note_ids, vec!["a".to_string(), "b".to_string()]);

    assert!(h.engine.take_events().iter().any(|e| matches!(
        e,
        EngineEvent::SkippedUnknown { file_id } if file_id == "stray"
    )));
}

#[test]
fn clean_remote_edit_wins_without_conflict() {
    let h = harness();
    let note = h.engine.create_note("Doc", "v1").unwrap();
    h.engine.sync().unwrap();
    let remote_id = h.engine.note(note.id).unwrap().remote_id.unwrap();

    h.remote
        .set_content(&remote_id, &payload_bytes("Doc", "edited elsewhere"));
    h.engine.sync().unwrap();

    let updated = h.engine.note(note.id).unwrap();
    assert_eq!(updated.content, "edited elsewhere");
    assert_eq!(updated.sync_status, SyncStatus::Synced);
}

#[test]
fn queue_survives_restart_and_drains() {
    let h = harness();
    h.engine.create_note("Durable", "body").unwrap();
    assert_eq!(h.engine.pending_count(), 1);

    // Simulate a process restart over the same persisted snapshots.
    let reborn = build_engine(
        &h.remote,
        &h.notes_backend,
        &h.queue_backend,
        RetryConfig::no_retry(),
    );
    drop(h.engine);

    assert_eq!(reborn.pending_count(), 1);
    let report = reborn.sync().unwrap();
    assert_eq!(report.pushed, 1);
    assert_eq!(reborn.notes()[0].sync_status, SyncStatus::Synced);
}

#[test]
fn many_notes_drain_in_parallel() {
    let h = harness();
    for i in 0..8 {
        h.engine.create_note(format!("Note {i}"), "body").unwrap();
    }

    let report = h.engine.sync().unwrap();
    assert_eq!(report.pushed, 8);
    assert_eq!(h.remote.file_count(), 8);
    assert_eq!(h.engine.pending_count(), 0);
}

#[test]
fn retention_plan_thins_long_history() {
    let h = harness();
    let note = h.engine.create_note("History", "v0").unwrap();
    h.engine.sync().unwrap();
    let remote_id = h.engine.note(note.id).unwrap().remote_id.unwrap();

    // Two revisions a day for two months.
    for i in 1..=120 {
        h.remote.advance_clock(Duration::hours(12));
        h.remote
            .set_content(&remote_id, &payload_bytes("History", &format!("v{i}")));
    }

    let now = "2026-01-01T00:00:00Z".parse::<chrono::DateTime<chrono::Utc>>().unwrap()
        + Duration::hours(12 * 120 + 1);
    let plan = h.engine.plan_retention(note.id, now).unwrap();

    assert!(plan.keep.len() <= MAX_KEPT);
    assert!(!plan.prune.is_empty());

    // The newest revisions always survive.
    let head = h.remote.list_revisions(&remote_id, RECENT_KEPT).unwrap();
    for revision in &head {
        assert!(plan.keeps(&revision.id));
    }
}

#[test]
fn checkpoint_revisions_survive_retention() {
    let h = harness();
    let note = h.engine.create_note("History", "v0").unwrap();
    h.engine.sync().unwrap();
    let remote_id = h.engine.note(note.id).unwrap().remote_id.unwrap();

    for i in 1..=120 {
        h.remote.advance_clock(Duration::hours(12));
        h.remote
            .set_content(&remote_id, &payload_bytes("History", &format!("v{i}")));
    }
    // Flag the oldest revision, far outside every chronological window.
    let all = h.remote.list_revisions(&remote_id, 500).unwrap();
    let oldest = all.last().unwrap();
    h.remote.mark_checkpoint(&remote_id, &oldest.id);

    let now = "2026-01-01T00:00:00Z".parse::<chrono::DateTime<chrono::Utc>>().unwrap()
        + Duration::hours(12 * 120 + 1);
    let plan = h.engine.plan_retention(note.id, now).unwrap();
    assert!(plan.keeps(&oldest.id));
}

#[test]
fn rejected_stale_push_surfaces_conflict() {
    let h = harness();
    let note = h.engine.create_note("Shared", "local v1").unwrap();
    h.engine.sync().unwrap();
    let remote_id = h.engine.note(note.id).unwrap().remote_id.unwrap();

    h.engine
        .update_note(note.id, &NotePatch::new().with_content("local v2"))
        .unwrap();
    // The remote rejects our base as stale, as when another client wins
    // the race between reconcile and drain.
    h.remote.inject_failure(
        MockOp::Put,
        RemoteError::Conflict {
            file_id: remote_id.clone(),
        },
    );

    let report = h.engine.sync().unwrap();
    assert_eq!(report.pushed, 0);

    let conflicted = h.engine.note(note.id).unwrap();
    assert_eq!(conflicted.sync_status, SyncStatus::Conflict);
    assert_eq!(conflicted.content, "local v2");
    assert_eq!(conflicted.conflict.unwrap().payload.content, "local v1");
    assert_eq!(h.engine.pending_count(), 0);
    assert!(h
        .engine
        .take_events()
        .iter()
        .any(|e| matches!(e, EngineEvent::ConflictDetected { .. })));
}

#[test]
fn lost_acknowledgement_replays_create_without_duplicate() {
    let remote = Arc::new(MockRemoteStore::new());
    let notes_backend = MemoryBackend::new();
    let queue_backend = FlakyBackend::default();

    let open_engine = || {
        let notes = NoteStore::open(Box::new(notes_backend.clone())).unwrap();
        let queue = SyncQueue::open(Box::new(queue_backend.clone())).unwrap();
        let config = SyncConfig::new()
            .with_worker_count(1)
            .with_retry(RetryConfig::no_retry());
        SyncEngine::new(Arc::clone(&remote), notes, queue, config)
    };

    let engine = open_engine();
    let note = engine.create_note("Draft", "body").unwrap();

    // The upload lands, but persisting the acknowledgement fails.
    queue_backend.arm_failure();
    assert!(engine.sync().is_err());
    assert_eq!(remote.file_count(), 1);

    // After a restart the identity is durable and the entry is still
    // queued; the replay re-puts in place instead of forking a file.
    let reborn = open_engine();
    assert!(reborn.note(note.id).unwrap().remote_id.is_some());
    assert_eq!(reborn.pending_count(), 1);

    let report = reborn.sync().unwrap();
    assert_eq!(report.pushed, 1);
    assert_eq!(remote.file_count(), 1);

    let synced = reborn.note(note.id).unwrap();
    assert_eq!(synced.sync_status, SyncStatus::Synced);
    let remote_id = synced.remote_id.unwrap();
    assert_eq!(
        remote.content_of(&remote_id).unwrap(),
        payload_bytes("Draft", "body")
    );
}

#[test]
fn access_revoked_file_is_skipped_with_event() {
    let h = harness();
    h.remote
        .seed_file("private", &payload_bytes("Private", "body"));
    h.remote.inject_failure(
        MockOp::Get,
        RemoteError::Permission {
            file_id: "private".into(),
        },
    );

    let report = h.engine.sync().unwrap();
    assert_eq!(report.pulled, 0);
    assert!(h.engine.notes().is_empty());

    let events = h.engine.take_events();
    assert!(events.iter().any(|e| matches!(
        e,
        EngineEvent::AccessRevoked { file_id } if file_id == "private"
    )));
    assert!(!events
        .iter()
        .any(|e| matches!(e, EngineEvent::SkippedUnknown { .. })));
}

#[test]
fn run_without_interval_performs_one_cycle() {
    let h = harness();
    h.engine.create_note("Once", "body").unwrap();

    h.engine.run().unwrap();

    assert_eq!(h.engine.pending_count(), 0);
    assert_eq!(h.remote.counts().puts, 1);
    assert_eq!(h.engine.state(), EngineState::Synced);
}

#[test]
fn run_loop_stops_for_reauthentication() {
    let remote = Arc::new(MockRemoteStore::new());
    let notes = NoteStore::open(Box::new(MemoryBackend::new())).unwrap();
    let queue = SyncQueue::open(Box::new(MemoryBackend::new())).unwrap();
    let config = SyncConfig::new()
        .with_worker_count(1)
        .with_retry(RetryConfig::no_retry())
        .with_drain_interval(std::time::Duration::ZERO);
    let engine = SyncEngine::new(Arc::clone(&remote), notes, queue, config);

    engine.create_note("Held", "body").unwrap();
    remote.inject_failure(MockOp::Put, RemoteError::Auth("token expired".into()));

    assert!(matches!(engine.run(), Err(EngineError::AuthRequired)));
    assert_eq!(engine.state(), EngineState::AuthRequired);
    assert_eq!(engine.pending_count(), 1);
}
