use std::fmt;
use std::time::Duration;

use tracing::{debug, info};

pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";
pub const DEFAULT_SCOPE: &str = "https://graph.microsoft.com/.default";
pub const DEFAULT_GRAPH_BASE_URL: &str = "https://graph.microsoft.com";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Everything one run needs, built once at startup and handed to each stage.
#[derive(Debug, Clone)]
pub struct JobConfig {
    pub credentials: Credentials,
    pub library: LibraryConfig,
    pub analyzer: AnalyzerConfig,
    pub blob: BlobConfig,
    pub policy: RunPolicy,
    pub http: HttpConfig,
}

/// Client-credentials identity of the job.
#[derive(Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub tenant_id: String,
    pub authority_host: String,
    pub scope: String,
    /// Reuse a token across runs until shortly before it expires.
    pub cache_token: bool,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("tenant_id", &self.tenant_id)
            .field("authority_host", &self.authority_host)
            .field("scope", &self.scope)
            .field("cache_token", &self.cache_token)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct LibraryConfig {
    pub site_id: String,
    pub library_id: String,
    pub graph_base_url: String,
}

#[derive(Clone)]
pub struct AnalyzerConfig {
    pub endpoint: String,
    pub key: String,
}

impl fmt::Debug for AnalyzerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalyzerConfig")
            .field("endpoint", &self.endpoint)
            .field("key", &"<redacted>")
            .finish()
    }
}

#[derive(Clone)]
pub struct BlobConfig {
    pub connection_string: String,
    pub container: String,
}

impl fmt::Debug for BlobConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlobConfig")
            .field("connection_string", &"<redacted>")
            .field("container", &self.container)
            .finish()
    }
}

/// Which per-file failures end a run and which only skip the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunPolicy {
    /// Treat a non-2xx download as a failed file instead of forwarding its body.
    pub fail_on_download_status: bool,
    /// Keep going with the next file when a blob write fails.
    pub isolate_archive_failures: bool,
}

impl Default for RunPolicy {
    fn default() -> Self {
        Self {
            fail_on_download_status: false,
            isolate_archive_failures: true,
        }
    }
}

/// Idle limits for the shared HTTP client. There is no cap on total request duration, so large
/// downloads only fail when the connection stalls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpConfig {
    pub connect_timeout: Duration,
    /// Longest wait for any single read, headers included.
    pub read_timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            read_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        }
    }
}

impl JobConfig {
    pub fn trace_loaded(&self) {
        info!(
            tenant_id = %self.credentials.tenant_id,
            site_id = %self.library.site_id,
            library_id = %self.library.library_id,
            analyzer_endpoint = %self.analyzer.endpoint,
            container = %self.blob.container,
            fail_on_download_status = self.policy.fail_on_download_status,
            isolate_archive_failures = self.policy.isolate_archive_failures,
            "Loaded JobConfig"
        );
        debug!(config = ?self, "JobConfig loaded (full debug, secrets redacted)");
    }
}
