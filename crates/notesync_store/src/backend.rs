//! Storage backend trait and implementations.

use crate::error::StoreResult;
use parking_lot::Mutex;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A snapshot-oriented storage backend.
///
/// Backends are **opaque byte stores**: they hold one snapshot blob and know
/// nothing about its format. The store and queue serialize their full state
/// and persist it through this trait on every mutation.
///
/// # Invariants
///
/// - `load` returns exactly the bytes of the last successful `persist`,
///   or `None` if nothing was ever persisted
/// - After `persist` returns, the snapshot survives process termination
/// - Backends must be `Send + Sync` for concurrent access
///
/// # Implementors
///
/// - [`MemoryBackend`] - for tests and ephemeral use
/// - [`FileBackend`] - durable, temp-file-then-rename snapshots
pub trait StorageBackend: Send + Sync {
    /// Loads the last persisted snapshot, if any.
    fn load(&self) -> StoreResult<Option<Vec<u8>>>;

    /// Persists a snapshot, replacing any previous one atomically.
    fn persist(&self, data: &[u8]) -> StoreResult<()>;
}

/// An in-memory backend.
///
/// Cloning shares the underlying buffer, which lets tests simulate a process
/// restart by reopening a store over the same backend.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    data: Arc<Mutex<Option<Vec<u8>>>>,
}

impl MemoryBackend {
    /// Creates an empty in-memory backend.
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageBackend for MemoryBackend {
    fn load(&self) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.data.lock().clone())
    }

    fn persist(&self, data: &[u8]) -> StoreResult<()> {
        *self.data.lock() = Some(data.to_vec());
        Ok(())
    }
}

/// A file-based backend with atomic snapshot replacement.
///
/// Each `persist` writes to a sibling temporary file, syncs it, and renames
/// it over the target path, so a crash mid-write leaves the previous
/// snapshot intact.
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    // Serializes writers; the rename itself is atomic but the temp file is shared.
    write_lock: Mutex<()>,
}

impl FileBackend {
    /// Opens a file backend at the given path, creating parent directories
    /// if needed. The file itself is created on first `persist`.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(Self {
            path: path.to_path_buf(),
            write_lock: Mutex::new(()),
        })
    }

    /// Returns the snapshot path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut tmp = self.path.as_os_str().to_owned();
        tmp.push(".tmp");
        PathBuf::from(tmp)
    }
}

impl StorageBackend for FileBackend {
    fn load(&self) -> StoreResult<Option<Vec<u8>>> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn persist(&self, data: &[u8]) -> StoreResult<()> {
        let _guard = self.write_lock.lock();
        let tmp = self.tmp_path();

        let mut file = fs::File::create(&tmp)?;
        file.write_all(data)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_backend_roundtrip() {
        let backend = MemoryBackend::new();
        assert!(backend.load().unwrap().is_none());

        backend.persist(b"snapshot").unwrap();
        assert_eq!(backend.load().unwrap(), Some(b"snapshot".to_vec()));

        backend.persist(b"replaced").unwrap();
        assert_eq!(backend.load().unwrap(), Some(b"replaced".to_vec()));
    }

    #[test]
    fn memory_backend_clone_shares_buffer() {
        let backend = MemoryBackend::new();
        let shared = backend.clone();

        backend.persist(b"data").unwrap();
        assert_eq!(shared.load().unwrap(), Some(b"data".to_vec()));
    }

    #[test]
    fn file_backend_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.json");

        let backend = FileBackend::open(&path).unwrap();
        assert!(backend.load().unwrap().is_none());

        backend.persist(b"durable").unwrap();
        assert_eq!(backend.load().unwrap(), Some(b"durable".to_vec()));

        // Reopen at the same path
        let reopened = FileBackend::open(&path).unwrap();
        assert_eq!(reopened.load().unwrap(), Some(b"durable".to_vec()));
    }

    #[test]
    fn file_backend_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/store.json");

        let backend = FileBackend::open(&path).unwrap();
        backend.persist(b"x").unwrap();
        assert!(path.exists());
    }

    #[test]
    fn file_backend_replace_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.json");

        let backend = FileBackend::open(&path).unwrap();
        backend.persist(b"one").unwrap();
        backend.persist(b"two").unwrap();

        assert_eq!(backend.load().unwrap(), Some(b"two".to_vec()));
        assert!(!backend.tmp_path().exists());
    }
}
