//! Offline-first note synchronization engine.
//!
//! Local edits always succeed against the local store and are recorded in a
//! durable queue; sync cycles reconcile inbound remote changes and drain
//! the queue against a [`notesync_remote::RemoteStore`], with per-note
//! ordering, optimistic concurrency, explicit conflict surfacing, and
//! bounded retry.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use notesync_engine::{SyncConfig, SyncEngine};
//! use notesync_remote::MockRemoteStore;
//! use notesync_store::{MemoryBackend, NoteStore, SyncQueue};
//!
//! # fn main() -> Result<(), notesync_engine::EngineError> {
//! let notes = NoteStore::open(Box::new(MemoryBackend::new()))?;
//! let queue = SyncQueue::open(Box::new(MemoryBackend::new()))?;
//! let engine = SyncEngine::new(
//!     Arc::new(MockRemoteStore::new()),
//!     notes,
//!     queue,
//!     SyncConfig::new(),
//! );
//!
//! let note = engine.create_note("Groceries", "milk, eggs")?;
//! let report = engine.sync()?;
//! assert_eq!(report.pushed, 1);
//! assert!(engine.note(note.id).unwrap().remote_id.is_some());
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod engine;
mod error;
mod events;
mod retention;

pub use config::{RetryConfig, SyncConfig};
pub use engine::{ConflictChoice, EngineState, SyncEngine, SyncReport, SyncStats};
pub use error::{EngineError, EngineResult};
pub use events::EngineEvent;
pub use retention::{
    RetentionPlan, CHECKPOINT_KEPT, DAILY_KEPT, MAX_KEPT, RECENT_KEPT, WEEKLY_KEPT,
};
