/// `load_config` module: builds the job configuration from environment secrets and an optional
/// YAML settings file.
///
/// This module is the only place where environment variables and untrusted YAML are read.
///
/// # Responsibilities
/// - Read the nine required environment variables (credentials, library, analyzer, blob store)
/// - Parse the optional YAML settings file (no secrets) into [`Settings`] with defaults for
///   every key
/// - Map both into the core [`JobConfig`] and the timer [`Schedule`]
/// - Report every missing variable in one error so a misconfigured deployment fails at startup
///
/// # Errors
/// All errors use `anyhow::Error` with context and are logged once, at the CLI boundary.
///
/// Accepted YAML keys (all optional):
///
/// ```yaml
/// schedule:
///   every_secs: 300
///   align_to_wall_clock: true
///   run_on_startup: false
/// download:
///   fail_on_error_status: false
/// archive:
///   isolate_failures: true
/// auth:
///   authority_host: https://login.microsoftonline.com
///   scope: https://graph.microsoft.com/.default
///   cache_token: false
/// graph:
///   base_url: https://graph.microsoft.com
/// http:
///   timeout_secs: 120
/// ```
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use doc_intake_core::config::{
    AnalyzerConfig, BlobConfig, Credentials, HttpConfig, JobConfig, LibraryConfig, RunPolicy,
    DEFAULT_AUTHORITY_HOST, DEFAULT_GRAPH_BASE_URL, DEFAULT_HTTP_TIMEOUT_SECS, DEFAULT_SCOPE,
};
use serde::Deserialize;
use tracing::{info, warn};

use crate::schedule::{Schedule, DEFAULT_EVERY_SECS};

pub const REQUIRED_ENV_VARS: [&str; 9] = [
    "CLIENT_ID",
    "CLIENT_SECRET",
    "TENANT_ID",
    "SITE_ID",
    "LIBRARY_ID",
    "FORM_RECOGNIZER_ENDPOINT",
    "FORM_RECOGNIZER_KEY",
    "BLOB_CONNECTION_STRING",
    "BLOB_CONTAINER_NAME",
];

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub schedule: ScheduleSection,
    pub download: DownloadSection,
    pub archive: ArchiveSection,
    pub auth: AuthSection,
    pub graph: GraphSection,
    pub http: HttpSection,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ScheduleSection {
    pub every_secs: u64,
    pub align_to_wall_clock: bool,
    pub run_on_startup: bool,
}

impl Default for ScheduleSection {
    fn default() -> Self {
        Self {
            every_secs: DEFAULT_EVERY_SECS,
            align_to_wall_clock: true,
            run_on_startup: false,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DownloadSection {
    pub fail_on_error_status: bool,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ArchiveSection {
    pub isolate_failures: bool,
}

impl Default for ArchiveSection {
    fn default() -> Self {
        Self {
            isolate_failures: true,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AuthSection {
    pub authority_host: String,
    pub scope: String,
    pub cache_token: bool,
}

impl Default for AuthSection {
    fn default() -> Self {
        Self {
            authority_host: DEFAULT_AUTHORITY_HOST.to_string(),
            scope: DEFAULT_SCOPE.to_string(),
            cache_token: false,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GraphSection {
    pub base_url: String,
}

impl Default for GraphSection {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_GRAPH_BASE_URL.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HttpSection {
    pub timeout_secs: u64,
}

impl Default for HttpSection {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
        }
    }
}

/// Everything the CLI needs: the job itself and when to fire it.
#[derive(Debug)]
pub struct CliConfig {
    pub job: JobConfig,
    pub schedule: Schedule,
}

/// Reads the YAML settings file, or returns defaults when no path is given.
pub fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let Some(path) = path else {
        info!("No settings file given, using defaults");
        return Ok(Settings::default());
    };
    info!(config_path = ?path, "Loading settings from file");

    let content = fs::read_to_string(path)
        .map_err(|e| anyhow!("Failed to read settings file {:?}: {}", path, e))?;
    // An empty file is a valid "all defaults" document.
    if content.trim().is_empty() {
        return Ok(Settings::default());
    }
    let settings: Settings = serde_yaml::from_str(&content)
        .map_err(|e| anyhow!("Failed to parse settings YAML: {e}"))?;
    info!(config_path = ?path, "Parsed settings YAML successfully");
    Ok(settings)
}

/// Combines settings with secrets looked up through `lookup` (normally the process environment).
pub fn build_config<F>(settings: Settings, lookup: F) -> Result<CliConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let values: Vec<(&str, Option<String>)> = REQUIRED_ENV_VARS
        .iter()
        .map(|name| (*name, lookup(name).filter(|v| !v.trim().is_empty())))
        .collect();
    let missing: Vec<&str> = values
        .iter()
        .filter(|(_, v)| v.is_none())
        .map(|(name, _)| *name)
        .collect();
    if !missing.is_empty() {
        warn!(missing = ?missing, "Required environment variables are not set");
        bail!(
            "Missing required environment variables: {}",
            missing.join(", ")
        );
    }
    let [client_id, client_secret, tenant_id, site_id, library_id, endpoint, key, connection_string, container]: [String; 9] =
        values
            .into_iter()
            .map(|(_, v)| v.unwrap_or_default())
            .collect::<Vec<_>>()
            .try_into()
            .map_err(|_| anyhow!("environment lookup returned the wrong number of values"))?;

    if settings.schedule.every_secs == 0 {
        bail!("schedule.every_secs must be greater than zero");
    }
    if settings.http.timeout_secs == 0 {
        bail!("http.timeout_secs must be greater than zero");
    }

    let job = JobConfig {
        credentials: Credentials {
            client_id,
            client_secret,
            tenant_id,
            authority_host: settings.auth.authority_host,
            scope: settings.auth.scope,
            cache_token: settings.auth.cache_token,
        },
        library: LibraryConfig {
            site_id,
            library_id,
            graph_base_url: settings.graph.base_url,
        },
        analyzer: AnalyzerConfig { endpoint, key },
        blob: BlobConfig {
            connection_string,
            container,
        },
        policy: RunPolicy {
            fail_on_download_status: settings.download.fail_on_error_status,
            isolate_archive_failures: settings.archive.isolate_failures,
        },
        http: HttpConfig {
            read_timeout: Duration::from_secs(settings.http.timeout_secs),
            ..HttpConfig::default()
        },
    };

    Ok(CliConfig {
        job,
        schedule: Schedule {
            every: Duration::from_secs(settings.schedule.every_secs),
            align_to_wall_clock: settings.schedule.align_to_wall_clock,
            run_on_startup: settings.schedule.run_on_startup,
        },
    })
}

/// Loads the optional settings file and the required environment variables.
pub fn load_config(path: Option<&Path>) -> Result<CliConfig> {
    let settings = load_settings(path).context("Failed to load settings")?;
    build_config(settings, |name| std::env::var(name).ok())
}
