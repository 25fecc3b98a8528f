//! # notesync Store
//!
//! Durable local persistence for the notesync engine.
//!
//! This crate provides:
//! - A storage backend trait with memory and file snapshot implementations
//! - The persistent note store (notes, opaque collection blobs, cursor)
//! - The durable sync queue with per-note coalescing and serialization
//!
//! ## Key Invariants
//!
//! - Every queue and store mutation persists before the call returns
//! - At most one queue entry per note is in flight at a time
//! - Terminal queue failures are returned to the caller, never dropped
//! - In-flight markers are transient: a restart leaves entries pending

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod notes;
mod queue;

pub use backend::{FileBackend, MemoryBackend, StorageBackend};
pub use error::{StoreError, StoreResult};
pub use notes::NoteStore;
pub use queue::{EnqueueOutcome, FailOutcome, QueueOperation, SyncQueue, SyncQueueEntry};
