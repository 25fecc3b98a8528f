//! Credential provider seam.

use crate::error::{RemoteError, RemoteResult};
use parking_lot::RwLock;

/// Supplies the bearer credential used by the remote store adapter.
///
/// The credential is process-wide state with explicit refresh-on-expiry:
/// the adapter only consumes "get current token" and signals expiry via
/// [`CredentialProvider::invalidate`]. A provider that cannot produce a
/// token returns [`RemoteError::Auth`], which halts all network operations
/// until re-authentication.
pub trait CredentialProvider: Send + Sync {
    /// Returns the current bearer token.
    fn token(&self) -> RemoteResult<String>;

    /// Signals that the current token was rejected by the remote store.
    fn invalidate(&self);
}

/// A fixed-token provider for tests and simple deployments.
#[derive(Debug)]
pub struct StaticCredentials {
    token: RwLock<Option<String>>,
}

impl StaticCredentials {
    /// Creates a provider holding the given token.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
        }
    }

    /// Installs a fresh token after re-authentication.
    pub fn restore(&self, token: impl Into<String>) {
        *self.token.write() = Some(token.into());
    }
}

impl CredentialProvider for StaticCredentials {
    fn token(&self) -> RemoteResult<String> {
        self.token
            .read()
            .clone()
            .ok_or_else(|| RemoteError::Auth("no credential available".into()))
    }

    fn invalidate(&self) {
        *self.token.write() = None;
    }
}
