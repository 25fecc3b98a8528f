//! # notesync Remote
//!
//! Remote document store adapter for the notesync engine.
//!
//! This crate provides:
//! - The [`RemoteStore`] trait: a uniform interface over a Drive-like file
//!   API (change listing, content, deletion, revision history)
//! - The remote error taxonomy with retryability discrimination
//! - A credential provider seam for bearer-token auth
//! - An HTTP implementation over an abstract [`HttpClient`]
//! - An in-memory mock remote with failure injection for tests
//!
//! The adapter knows nothing about notes; it operates on opaque files
//! identified by remote IDs. Each call makes a single attempt; retry and
//! backoff belong to the caller.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod credentials;
mod error;
mod http;
mod mock;
mod store;

pub use credentials::{CredentialProvider, StaticCredentials};
pub use error::{RemoteError, RemoteResult};
pub use http::{HttpClient, HttpRemoteStore, HttpResponse};
pub use mock::{MockCallCounts, MockOp, MockRemoteStore};
pub use store::{ChangePage, FileMetadata, RemoteStore};
