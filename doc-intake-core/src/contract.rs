//! # contract: the four stage interfaces of a run
//!
//! This module defines one trait per pipeline stage and the plain data types that flow between
//! them:
//!
//! - [`TokenProvider`]: exchanges client credentials for a bearer token
//! - [`Library`]: lists a remote document library and downloads single files
//! - [`Analyzer`]: submits a file for asynchronous layout analysis
//! - [`Archiver`]: stores the original bytes under the file name
//!
//! ## Interface & Extensibility
//! - All methods are async and return a typed error from [`crate::error`].
//! - Implementations must not log at error level; the run handler owns failure reporting.
//! - Production implementations live in [`crate::auth`], [`crate::graph`], [`crate::analyze`]
//!   and [`crate::blob`].
//!
//! ## Mocking & Testing
//! - Every trait is annotated for `mockall`, so `MockTokenProvider`, `MockLibrary`,
//!   `MockAnalyzer` and `MockArchiver` are available to unit and integration tests
//!   (behind the default `test-export-mocks` feature).

use std::fmt;

use async_trait::async_trait;

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

use crate::error::{AnalyzeError, ArchiveError, AuthError, DownloadError, ListError};

/// Opaque bearer token. Only the `Authorization` header ever sees the secret part.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub secret: String,
    /// Lifetime reported by the identity provider, in seconds.
    pub expires_in: Option<u64>,
}

impl AccessToken {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            expires_in: None,
        }
    }

    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.secret)
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("secret", &"<redacted>")
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// A file as listed by the remote library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    /// File name; doubles as the archive key.
    pub name: String,
    /// Pre-signed, one-time download URL. Requests to it carry no credentials.
    pub download_url: String,
}

/// A submission the analysis service accepted (HTTP 202).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Submission {
    /// Where the analysis result will eventually be available, if the service said so.
    pub operation_location: Option<String>,
}

/// Issues bearer tokens for the library API.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Request a token. A missing or malformed token is an error.
    async fn access_token(&self) -> Result<AccessToken, AuthError>;
}

#[async_trait]
impl TokenProvider for Box<dyn TokenProvider> {
    async fn access_token(&self) -> Result<AccessToken, AuthError> {
        (**self).access_token().await
    }
}

/// A remote document library.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Library: Send + Sync {
    /// List the files at the library root (first page only).
    async fn list_files(&self, token: &AccessToken) -> Result<Vec<RemoteFile>, ListError>;

    /// Fetch the raw bytes of one listed file, fully buffered.
    async fn download(&self, file: &RemoteFile) -> Result<Vec<u8>, DownloadError>;
}

/// The document-analysis service.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Submit one file. Only an accepted submission is `Ok`.
    async fn submit(&self, name: &str, content: &[u8]) -> Result<Submission, AnalyzeError>;
}

/// The blob store receiving the original bytes.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Archiver: Send + Sync {
    /// Write `content` under `name`, replacing whatever was stored there.
    async fn store(&self, name: &str, content: &[u8]) -> Result<(), ArchiveError>;
}
