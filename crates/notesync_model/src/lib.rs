//! # notesync Model
//!
//! Data model and entity classification for the notesync engine.
//!
//! This crate provides:
//! - Note, collection, and revision records
//! - Stable local identifiers and remote revision tokens
//! - The entity classifier that discriminates notes from collections
//!
//! ## Key Invariants
//!
//! - A note's `version` strictly increases on every local mutation
//! - `SyncStatus::Synced` implies the local version was acknowledged remotely
//! - A collection is never materialized as a note; classification happens
//!   once at the data-model boundary, immediately after fetch

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod classify;
mod collection;
mod error;
mod ids;
mod note;
mod revision;

pub use classify::{classify, is_collection_id, CollectionBlob, RemoteEntity, COLLECTION_ID_PREFIX};
pub use collection::StoredCollection;
pub use error::{ModelError, ModelResult};
pub use ids::{EntryId, NoteId, RevisionToken};
pub use note::{Note, NotePatch, NotePayload, RemoteSnapshot, SyncStatus};
pub use revision::NoteVersion;
