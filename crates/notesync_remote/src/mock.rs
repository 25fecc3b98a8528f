//! In-memory mock remote store for tests.

use crate::error::{RemoteError, RemoteResult};
use crate::store::{ChangePage, FileMetadata, RemoteStore};
use chrono::{DateTime, Duration, Utc};
use notesync_model::{NoteVersion, RevisionToken};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, VecDeque};

/// Operation selector for failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    /// `list_changed_files`
    List,
    /// `get_content`
    Get,
    /// `put_content`
    Put,
    /// `delete_file`
    Delete,
    /// `list_revisions`
    Revisions,
    /// `get_revision_content`
    RevisionContent,
}

/// Per-operation call counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MockCallCounts {
    /// Change listings served.
    pub lists: usize,
    /// Content downloads served.
    pub gets: usize,
    /// Content uploads served.
    pub puts: usize,
    /// Deletions served.
    pub deletes: usize,
    /// Revision listings served.
    pub revisions: usize,
    /// Revision downloads served.
    pub revision_contents: usize,
}

impl MockCallCounts {
    /// Total calls across all operations.
    pub fn total(&self) -> usize {
        self.lists + self.gets + self.puts + self.deletes + self.revisions + self.revision_contents
    }
}

struct RemoteFile {
    content: Vec<u8>,
    revision: RevisionToken,
    modified_time: DateTime<Utc>,
    /// Revision history, newest first, with the content at each revision.
    revisions: Vec<(NoteVersion, Vec<u8>)>,
}

struct MockInner {
    files: BTreeMap<String, RemoteFile>,
    /// Last known metadata of deleted files, so deletions still surface in
    /// the change listing.
    graveyard: HashMap<String, FileMetadata>,
    change_log: Vec<String>,
    next_file: u64,
    next_revision: u64,
    now: DateTime<Utc>,
    failures: HashMap<MockOp, VecDeque<RemoteError>>,
    counts: MockCallCounts,
}

/// An in-memory remote document store for testing.
///
/// Supports scripted failure injection (next call of a given operation
/// fails with a chosen error), call counting, and simulating independent
/// writes by another client.
pub struct MockRemoteStore {
    inner: Mutex<MockInner>,
}

impl MockRemoteStore {
    /// Creates an empty mock store with a fixed deterministic clock.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MockInner {
                files: BTreeMap::new(),
                graveyard: HashMap::new(),
                change_log: Vec::new(),
                next_file: 1,
                next_revision: 1,
                now: "2026-01-01T00:00:00Z".parse().expect("valid timestamp"),
                failures: HashMap::new(),
                counts: MockCallCounts::default(),
            }),
        }
    }

    /// Advances the mock clock.
    pub fn advance_clock(&self, by: Duration) {
        self.inner.lock().now += by;
    }

    /// Queues a failure for the next call of the given operation.
    pub fn inject_failure(&self, op: MockOp, error: RemoteError) {
        self.inner
            .lock()
            .failures
            .entry(op)
            .or_default()
            .push_back(error);
    }

    /// Returns the call counters.
    pub fn counts(&self) -> MockCallCounts {
        self.inner.lock().counts
    }

    /// Seeds a file under a caller-chosen remote ID (e.g. a
    /// collection-prefixed one), recording it in the change log.
    pub fn seed_file(&self, file_id: &str, content: &[u8]) -> FileMetadata {
        let mut inner = self.inner.lock();
        Self::write_file(&mut inner, file_id, content)
    }

    /// Overwrites a file's content as if another client had synced it.
    ///
    /// Bumps the revision and appends to the change log, so the next change
    /// listing reports the file.
    pub fn set_content(&self, file_id: &str, content: &[u8]) -> FileMetadata {
        let mut inner = self.inner.lock();
        Self::write_file(&mut inner, file_id, content)
    }

    /// Deletes a file out-of-band, as another client would.
    pub fn remove_file(&self, file_id: &str) {
        let mut inner = self.inner.lock();
        Self::bury(&mut inner, file_id);
    }

    /// Returns a file's current content.
    pub fn content_of(&self, file_id: &str) -> Option<Vec<u8>> {
        self.inner
            .lock()
            .files
            .get(file_id)
            .map(|f| f.content.clone())
    }

    /// Returns a file's current revision token.
    pub fn revision_of(&self, file_id: &str) -> Option<RevisionToken> {
        self.inner
            .lock()
            .files
            .get(file_id)
            .map(|f| f.revision.clone())
    }

    /// Returns true if the file exists remotely.
    pub fn exists(&self, file_id: &str) -> bool {
        self.inner.lock().files.contains_key(file_id)
    }

    /// Returns the number of stored files.
    pub fn file_count(&self) -> usize {
        self.inner.lock().files.len()
    }

    /// Flags an existing revision as a checkpoint.
    pub fn mark_checkpoint(&self, file_id: &str, revision_id: &str) {
        let mut inner = self.inner.lock();
        if let Some(file) = inner.files.get_mut(file_id) {
            for (version, _) in &mut file.revisions {
                if version.id == revision_id {
                    version.is_checkpoint = true;
                }
            }
        }
    }

    fn take_failure(inner: &mut MockInner, op: MockOp) -> Option<RemoteError> {
        inner.failures.get_mut(&op).and_then(VecDeque::pop_front)
    }

    fn write_file(inner: &mut MockInner, file_id: &str, content: &[u8]) -> FileMetadata {
        let revision_id = format!("r{}", inner.next_revision);
        inner.next_revision += 1;
        let revision = RevisionToken::new(revision_id.clone());
        let now = inner.now;

        let version = NoteVersion::new(revision_id, file_id, now);
        let file = inner
            .files
            .entry(file_id.to_string())
            .or_insert_with(|| RemoteFile {
                content: Vec::new(),
                revision: revision.clone(),
                modified_time: now,
                revisions: Vec::new(),
            });
        file.content = content.to_vec();
        file.revision = revision.clone();
        file.modified_time = now;
        file.revisions.insert(0, (version, content.to_vec()));

        inner.graveyard.remove(file_id);
        inner.change_log.push(file_id.to_string());

        FileMetadata {
            id: file_id.to_string(),
            name: None,
            modified_time: now,
            revision,
            size: Some(content.len() as u64),
        }
    }

    fn bury(inner: &mut MockInner, file_id: &str) {
        if let Some(file) = inner.files.remove(file_id) {
            let meta = FileMetadata {
                id: file_id.to_string(),
                name: None,
                modified_time: file.modified_time,
                revision: file.revision,
                size: Some(file.content.len() as u64),
            };
            inner.graveyard.insert(file_id.to_string(), meta);
            inner.change_log.push(file_id.to_string());
        }
    }
}

impl Default for MockRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteStore for MockRemoteStore {
    fn list_changed_files(&self, cursor: Option<&str>) -> RemoteResult<ChangePage> {
        let mut inner = self.inner.lock();
        inner.counts.lists += 1;
        if let Some(err) = Self::take_failure(&mut inner, MockOp::List) {
            return Err(err);
        }

        let start = cursor
            .map(|c| {
                c.parse::<usize>()
                    .map_err(|_| RemoteError::Protocol(format!("bad cursor: {c}")))
            })
            .transpose()?
            .unwrap_or(0);

        // Dedupe changed IDs, keeping first-seen order.
        let mut seen = std::collections::HashSet::new();
        let mut files = Vec::new();
        for file_id in inner.change_log.iter().skip(start) {
            if !seen.insert(file_id.clone()) {
                continue;
            }
            if let Some(file) = inner.files.get(file_id) {
                files.push(FileMetadata {
                    id: file_id.clone(),
                    name: None,
                    modified_time: file.modified_time,
                    revision: file.revision.clone(),
                    size: Some(file.content.len() as u64),
                });
            } else if let Some(meta) = inner.graveyard.get(file_id) {
                files.push(meta.clone());
            }
        }

        Ok(ChangePage {
            files,
            next_cursor: inner.change_log.len().to_string(),
            has_more: false,
        })
    }

    fn get_content(&self, file_id: &str) -> RemoteResult<Vec<u8>> {
        let mut inner = self.inner.lock();
        inner.counts.gets += 1;
        if let Some(err) = Self::take_failure(&mut inner, MockOp::Get) {
            return Err(err);
        }

        inner
            .files
            .get(file_id)
            .map(|f| f.content.clone())
            .ok_or_else(|| RemoteError::NotFound(file_id.to_string()))
    }

    fn put_content(
        &self,
        file_id: Option<&str>,
        base_revision: Option<&RevisionToken>,
        bytes: &[u8],
    ) -> RemoteResult<FileMetadata> {
        let mut inner = self.inner.lock();
        inner.counts.puts += 1;
        if let Some(err) = Self::take_failure(&mut inner, MockOp::Put) {
            return Err(err);
        }

        match file_id {
            None => {
                let id = format!("file-{}", inner.next_file);
                inner.next_file += 1;
                Ok(Self::write_file(&mut inner, &id, bytes))
            }
            Some(id) => {
                let current = inner
                    .files
                    .get(id)
                    .ok_or_else(|| RemoteError::NotFound(id.to_string()))?
                    .revision
                    .clone();
                if let Some(base) = base_revision {
                    if *base != current {
                        return Err(RemoteError::Conflict {
                            file_id: id.to_string(),
                        });
                    }
                }
                Ok(Self::write_file(&mut inner, id, bytes))
            }
        }
    }

    fn delete_file(&self, file_id: &str) -> RemoteResult<()> {
        let mut inner = self.inner.lock();
        inner.counts.deletes += 1;
        if let Some(err) = Self::take_failure(&mut inner, MockOp::Delete) {
            return Err(err);
        }

        // Idempotent: absent files delete successfully.
        Self::bury(&mut inner, file_id);
        Ok(())
    }

    fn list_revisions(&self, file_id: &str, max: usize) -> RemoteResult<Vec<NoteVersion>> {
        let mut inner = self.inner.lock();
        inner.counts.revisions += 1;
        if let Some(err) = Self::take_failure(&mut inner, MockOp::Revisions) {
            return Err(err);
        }

        let file = inner
            .files
            .get(file_id)
            .ok_or_else(|| RemoteError::NotFound(file_id.to_string()))?;
        Ok(file
            .revisions
            .iter()
            .take(max)
            .map(|(version, _)| version.clone())
            .collect())
    }

    fn get_revision_content(&self, file_id: &str, revision_id: &str) -> RemoteResult<Vec<u8>> {
        let mut inner = self.inner.lock();
        inner.counts.revision_contents += 1;
        if let Some(err) = Self::take_failure(&mut inner, MockOp::RevisionContent) {
            return Err(err);
        }

        let file = inner
            .files
            .get(file_id)
            .ok_or_else(|| RemoteError::NotFound(file_id.to_string()))?;
        file.revisions
            .iter()
            .find(|(version, _)| version.id == revision_id)
            .map(|(_, content)| content.clone())
            .ok_or_else(|| RemoteError::NotFound(revision_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_assigns_remote_id() {
        let remote = MockRemoteStore::new();
        let meta = remote.put_content(None, None, b"hello").unwrap();
        assert_eq!(meta.id, "file-1");
        assert_eq!(remote.content_of("file-1").unwrap(), b"hello");
    }

    #[test]
    fn update_with_stale_revision_conflicts() {
        let remote = MockRemoteStore::new();
        let meta = remote.put_content(None, None, b"v1").unwrap();

        // Another client advances the file.
        remote.set_content(&meta.id, b"v2");

        let result = remote.put_content(Some(&meta.id), Some(&meta.revision), b"v3");
        assert!(matches!(result, Err(RemoteError::Conflict { .. })));
        assert_eq!(remote.content_of(&meta.id).unwrap(), b"v2");
    }

    #[test]
    fn delete_is_idempotent() {
        let remote = MockRemoteStore::new();
        let meta = remote.put_content(None, None, b"v1").unwrap();

        assert!(remote.delete_file(&meta.id).is_ok());
        assert!(remote.delete_file(&meta.id).is_ok());
        assert!(remote.delete_file("never-existed").is_ok());
    }

    #[test]
    fn change_listing_pages_from_cursor() {
        let remote = MockRemoteStore::new();
        let a = remote.put_content(None, None, b"a").unwrap();

        let page = remote.list_changed_files(None).unwrap();
        assert_eq!(page.files.len(), 1);
        assert_eq!(page.files[0].id, a.id);

        let b = remote.put_content(None, None, b"b").unwrap();
        let page2 = remote.list_changed_files(Some(&page.next_cursor)).unwrap();
        assert_eq!(page2.files.len(), 1);
        assert_eq!(page2.files[0].id, b.id);
    }

    #[test]
    fn deleted_files_surface_in_change_listing() {
        let remote = MockRemoteStore::new();
        let meta = remote.put_content(None, None, b"v1").unwrap();
        let page = remote.list_changed_files(None).unwrap();

        remote.remove_file(&meta.id);
        let page2 = remote.list_changed_files(Some(&page.next_cursor)).unwrap();
        assert_eq!(page2.files.len(), 1);
        assert_eq!(page2.files[0].id, meta.id);
        assert!(matches!(
            remote.get_content(&meta.id),
            Err(RemoteError::NotFound(_))
        ));
    }

    #[test]
    fn revision_history_newest_first() {
        let remote = MockRemoteStore::new();
        let meta = remote.put_content(None, None, b"v1").unwrap();
        remote.advance_clock(Duration::hours(1));
        remote
            .put_content(Some(&meta.id), None, b"v2")
            .unwrap();

        let revisions = remote.list_revisions(&meta.id, 10).unwrap();
        assert_eq!(revisions.len(), 2);
        assert!(revisions[0].modified_time > revisions[1].modified_time);

        let oldest = remote
            .get_revision_content(&meta.id, &revisions[1].id)
            .unwrap();
        assert_eq!(oldest, b"v1");
    }

    #[test]
    fn revision_listing_respects_cap() {
        let remote = MockRemoteStore::new();
        let meta = remote.put_content(None, None, b"v1").unwrap();
        for i in 0..10 {
            remote
                .put_content(Some(&meta.id), None, format!("v{i}").as_bytes())
                .unwrap();
        }

        let revisions = remote.list_revisions(&meta.id, 5).unwrap();
        assert_eq!(revisions.len(), 5);
    }

    #[test]
    fn failure_injection_consumes_one_call() {
        let remote = MockRemoteStore::new();
        remote.inject_failure(MockOp::Put, RemoteError::transient("503"));

        assert!(remote.put_content(None, None, b"x").unwrap_err().is_retryable());
        assert!(remote.put_content(None, None, b"x").is_ok());
        assert_eq!(remote.counts().puts, 2);
    }
}
