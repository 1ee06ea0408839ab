//! Typed failures for every pipeline stage.
//!
//! Stage implementations return these instead of logging at error level; the run handler in
//! [`crate::pipeline`] decides whether a failure skips one file or ends the run, and logs it once.

use thiserror::Error;

/// Token acquisition failed. Always ends the run.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("token request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The identity provider answered without an `access_token`.
    #[error("no access token returned (status {status}): {error}: {description}")]
    MissingToken {
        status: u16,
        error: String,
        description: String,
    },
}

/// Listing the remote library failed. Always ends the run.
#[derive(Debug, Error)]
pub enum ListError {
    #[error("listing request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("listing returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("listing body is not a drive item collection: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Fetching one file's bytes failed. Skips that file.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("download request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("download returned status {status}")]
    Status { status: u16 },
}

/// Submitting one file for analysis failed. Skips that file.
#[derive(Debug, Error)]
pub enum AnalyzeError {
    #[error("analysis request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Anything but 202 Accepted.
    #[error("analysis rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Writing one blob failed.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("blob upload request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("blob upload returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid blob url: {0}")]
    Url(#[from] url::ParseError),

    #[error("account key cannot be used for signing")]
    SigningKey,
}

/// Problems found while turning configuration into working clients.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("connection string is missing {0}")]
    MissingKey(&'static str),

    #[error("connection string entry {0:?} is not a key=value pair")]
    MalformedEntry(String),

    #[error("account key is not valid base64: {0}")]
    AccountKey(#[from] base64::DecodeError),

    #[error("invalid endpoint url: {0}")]
    Url(#[from] url::ParseError),

    #[error("failed to build http client: {0}")]
    Http(#[from] reqwest::Error),
}

/// Failures that end a run before or between files.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("failed to fetch files: {0}")]
    List(#[from] ListError),

    /// Only produced when archive failures are not isolated per file.
    #[error("failed to archive {file}: {source}")]
    Archive {
        file: String,
        #[source]
        source: ArchiveError,
    },
}
