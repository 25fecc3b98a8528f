//! HTTP implementation of the remote store adapter.
//!
//! The actual HTTP client is abstracted via a trait to allow different
//! implementations (reqwest, ureq, a loopback for tests) without this crate
//! taking a network dependency.

use crate::credentials::CredentialProvider;
use crate::error::{RemoteError, RemoteResult};
use crate::store::{ChangePage, FileMetadata, RemoteStore};
use chrono::{DateTime, Utc};
use notesync_model::{NoteVersion, RevisionToken};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

/// A plain HTTP response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body bytes.
    pub body: Vec<u8>,
}

/// HTTP client abstraction.
///
/// Implement this trait to provide the actual transport. Transport-level
/// failures (connection refused, timeouts) are reported as strings and
/// mapped to [`RemoteError::Transient`]; HTTP-level failures arrive as
/// status codes and are mapped onto the error taxonomy by the adapter.
pub trait HttpClient: Send + Sync {
    /// Sends a request with a bearer token and returns the raw response.
    fn request(
        &self,
        method: &str,
        url: &str,
        bearer: &str,
        body: Option<&[u8]>,
    ) -> Result<HttpResponse, String>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireFile {
    id: String,
    #[serde(default)]
    name: Option<String>,
    modified_time: DateTime<Utc>,
    revision: String,
    #[serde(default)]
    size: Option<u64>,
}

impl From<WireFile> for FileMetadata {
    fn from(wire: WireFile) -> Self {
        Self {
            id: wire.id,
            name: wire.name,
            modified_time: wire.modified_time,
            revision: RevisionToken::new(wire.revision),
            size: wire.size,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireChanges {
    files: Vec<WireFile>,
    next_cursor: String,
    #[serde(default)]
    has_more: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireRevision {
    id: String,
    modified_time: DateTime<Utc>,
    #[serde(default)]
    modified_by: Option<String>,
    #[serde(default)]
    is_checkpoint: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireRevisions {
    revisions: Vec<WireRevision>,
}

/// A [`RemoteStore`] speaking a REST-style file API with bearer auth.
pub struct HttpRemoteStore<C: HttpClient> {
    base_url: String,
    client: C,
    credentials: Arc<dyn CredentialProvider>,
    page_size: usize,
}

impl<C: HttpClient> HttpRemoteStore<C> {
    /// Creates a new HTTP remote store.
    pub fn new(
        base_url: impl Into<String>,
        client: C,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            client,
            credentials,
            page_size: 100,
        }
    }

    /// Sets the change-listing page size.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn send(
        &self,
        method: &str,
        path: &str,
        body: Option<&[u8]>,
        file_id: Option<&str>,
    ) -> RemoteResult<HttpResponse> {
        let token = self.credentials.token()?;
        let url = format!("{}{}", self.base_url, path);
        debug!(method, %url, "remote request");

        let response = self
            .client
            .request(method, &url, &token, body)
            .map_err(RemoteError::transient)?;

        match response.status {
            200..=299 => Ok(response),
            401 => {
                self.credentials.invalidate();
                Err(RemoteError::Auth("credential rejected by remote".into()))
            }
            403 => Err(RemoteError::Permission {
                file_id: file_id.unwrap_or(path).to_string(),
            }),
            404 | 410 => Err(RemoteError::NotFound(
                file_id.unwrap_or(path).to_string(),
            )),
            409 | 412 => Err(RemoteError::Conflict {
                file_id: file_id.unwrap_or(path).to_string(),
            }),
            429 | 500..=599 => Err(RemoteError::transient(format!(
                "remote returned status {}",
                response.status
            ))),
            status => Err(RemoteError::Protocol(format!(
                "unexpected status {status} from {path}"
            ))),
        }
    }

    fn decode<T: serde::de::DeserializeOwned>(&self, response: &HttpResponse) -> RemoteResult<T> {
        serde_json::from_slice(&response.body)
            .map_err(|e| RemoteError::Protocol(format!("failed to decode response: {e}")))
    }
}

impl<C: HttpClient> RemoteStore for HttpRemoteStore<C> {
    fn list_changed_files(&self, cursor: Option<&str>) -> RemoteResult<ChangePage> {
        let path = match cursor {
            Some(cursor) => format!("/changes?cursor={}&pageSize={}", cursor, self.page_size),
            None => format!("/changes?pageSize={}", self.page_size),
        };
        let response = self.send("GET", &path, None, None)?;
        let wire: WireChanges = self.decode(&response)?;
        Ok(ChangePage {
            files: wire.files.into_iter().map(FileMetadata::from).collect(),
            next_cursor: wire.next_cursor,
            has_more: wire.has_more,
        })
    }

    fn get_content(&self, file_id: &str) -> RemoteResult<Vec<u8>> {
        let response = self.send(
            "GET",
            &format!("/files/{file_id}/content"),
            None,
            Some(file_id),
        )?;
        Ok(response.body)
    }

    fn put_content(
        &self,
        file_id: Option<&str>,
        base_revision: Option<&RevisionToken>,
        bytes: &[u8],
    ) -> RemoteResult<FileMetadata> {
        let response = match file_id {
            None => self.send("POST", "/files", Some(bytes), None)?,
            Some(id) => {
                let path = match base_revision {
                    Some(rev) => format!("/files/{id}/content?baseRevision={rev}"),
                    None => format!("/files/{id}/content"),
                };
                self.send("PUT", &path, Some(bytes), Some(id))?
            }
        };
        let wire: WireFile = self.decode(&response)?;
        Ok(wire.into())
    }

    fn delete_file(&self, file_id: &str) -> RemoteResult<()> {
        match self.send("DELETE", &format!("/files/{file_id}"), None, Some(file_id)) {
            Ok(_) => Ok(()),
            // Idempotent: already gone counts as deleted.
            Err(RemoteError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn list_revisions(&self, file_id: &str, max: usize) -> RemoteResult<Vec<NoteVersion>> {
        let response = self.send(
            "GET",
            &format!("/files/{file_id}/revisions?pageSize={max}"),
            None,
            Some(file_id),
        )?;
        let wire: WireRevisions = self.decode(&response)?;
        Ok(wire
            .revisions
            .into_iter()
            .map(|r| NoteVersion {
                id: r.id,
                file_id: file_id.to_string(),
                modified_time: r.modified_time,
                modified_by: r.modified_by,
                is_checkpoint: r.is_checkpoint,
            })
            .collect())
    }

    fn get_revision_content(&self, file_id: &str, revision_id: &str) -> RemoteResult<Vec<u8>> {
        let response = self.send(
            "GET",
            &format!("/files/{file_id}/revisions/{revision_id}/content"),
            None,
            Some(file_id),
        )?;
        Ok(response.body)
    }
}
