//! High-level pipeline: one scheduled run of authenticate → list → (download → analyze → archive)*.
//!
//! # Responsibilities
//! - Sequential orchestration: one file is fully handled before the next one starts
//! - Two-tier failure policy:
//!   - authentication and listing failures end the run
//!   - download, analysis and (by default) archive failures skip only the affected file
//! - Exactly one error-level log entry per failure; stage implementations never log errors
//!
//! # Major Types
//! - [`Pipeline`]: holds the four stage implementations and the [`RunPolicy`]
//! - [`RunReport`]: what happened to every listed file, returned for logging and tests
//!
//! # Navigation
//! - Scheduled entrypoint (never fails, logs everything): [`Pipeline::run`]
//! - Fallible entrypoint for callers that want the error: [`Pipeline::run_once`]
//! - Production wiring: [`Pipeline::from_config`]

use reqwest::Client;
use tracing::{error, info, warn};

use crate::analyze::FormRecognizer;
use crate::auth::{CachedTokenProvider, ClientCredentials};
use crate::blob::BlobArchiver;
use crate::config::{JobConfig, RunPolicy};
use crate::contract::{Analyzer, Archiver, Library, RemoteFile, TokenProvider};
use crate::error::{AnalyzeError, ConfigError, RunError};
use crate::graph::GraphLibrary;

/// Outcome of one listed file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    Archived,
    DownloadFailed { reason: String },
    /// The analysis service answered with something other than 202.
    AnalysisRejected { status: u16, body: String },
    AnalysisFailed { reason: String },
    ArchiveFailed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReport {
    pub name: String,
    pub outcome: FileOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub listed: usize,
    pub files: Vec<FileReport>,
}

impl RunReport {
    pub fn archived(&self) -> impl Iterator<Item = &str> {
        self.files
            .iter()
            .filter(|f| f.outcome == FileOutcome::Archived)
            .map(|f| f.name.as_str())
    }

    pub fn failed(&self) -> usize {
        self.files
            .iter()
            .filter(|f| f.outcome != FileOutcome::Archived)
            .count()
    }
}

pub struct Pipeline<T, L, A, R> {
    tokens: T,
    library: L,
    analyzer: A,
    archiver: R,
    policy: RunPolicy,
}

/// The production pipeline: Entra ID tokens, Graph library, Form Recognizer, Blob Storage.
pub type DefaultPipeline =
    Pipeline<Box<dyn TokenProvider>, GraphLibrary, FormRecognizer, BlobArchiver>;

impl DefaultPipeline {
    /// Wire the HTTP-backed stages from configuration. All stages share one HTTP client.
    pub fn from_config(config: &JobConfig) -> Result<Self, ConfigError> {
        let http = Client::builder()
            .connect_timeout(config.http.connect_timeout)
            .read_timeout(config.http.read_timeout)
            .build()?;

        let credentials = ClientCredentials::new(http.clone(), config.credentials.clone());
        let tokens: Box<dyn TokenProvider> = if config.credentials.cache_token {
            Box::new(CachedTokenProvider::new(credentials))
        } else {
            Box::new(credentials)
        };

        Ok(Pipeline::new(
            tokens,
            GraphLibrary::new(http.clone(), config.library.clone(), &config.policy),
            FormRecognizer::new(http.clone(), config.analyzer.clone()),
            BlobArchiver::new(http, &config.blob)?,
            config.policy,
        ))
    }
}

impl<T, L, A, R> Pipeline<T, L, A, R>
where
    T: TokenProvider,
    L: Library,
    A: Analyzer,
    R: Archiver,
{
    pub fn new(tokens: T, library: L, analyzer: A, archiver: R, policy: RunPolicy) -> Self {
        Self {
            tokens,
            library,
            analyzer,
            archiver,
            policy,
        }
    }

    /// One timer firing. Never fails: run-ending errors are logged once and swallowed.
    pub async fn run(&self) -> Option<RunReport> {
        info!("[RUN] Timer fired, starting run");
        match self.run_once().await {
            Ok(report) => {
                info!(
                    listed = report.listed,
                    archived = report.archived().count(),
                    failed = report.failed(),
                    "[RUN] Run complete"
                );
                Some(report)
            }
            Err(e) => {
                error!(error = %e, "[RUN][ERROR] An error occurred, run aborted");
                None
            }
        }
    }

    /// Authenticate, list and process every listed file in order.
    pub async fn run_once(&self) -> Result<RunReport, RunError> {
        let token = self.tokens.access_token().await?;
        let files = self.library.list_files(&token).await?;
        info!(count = files.len(), "[RUN] Listed files");

        let mut report = RunReport {
            listed: files.len(),
            files: Vec::with_capacity(files.len()),
        };
        for file in &files {
            let outcome = self.process_file(file).await?;
            report.files.push(FileReport {
                name: file.name.clone(),
                outcome,
            });
        }
        Ok(report)
    }

    /// Download → analyze → archive for one file. Only a non-isolated archive failure is an `Err`.
    async fn process_file(&self, file: &RemoteFile) -> Result<FileOutcome, RunError> {
        let content = match self.library.download(file).await {
            Ok(content) => content,
            Err(e) => {
                error!(file = %file.name, error = %e, "[DOWNLOAD][ERROR] Failed to download file, skipping");
                return Ok(FileOutcome::DownloadFailed {
                    reason: e.to_string(),
                });
            }
        };

        match self.analyzer.submit(&file.name, &content).await {
            Ok(_) => {}
            Err(AnalyzeError::Rejected { status, body }) => {
                error!(file = %file.name, status, body = %body, "[ANALYZE][ERROR] Failed to process file");
                return Ok(FileOutcome::AnalysisRejected { status, body });
            }
            Err(e) => {
                error!(file = %file.name, error = %e, "[ANALYZE][ERROR] Failed to process file");
                return Ok(FileOutcome::AnalysisFailed {
                    reason: e.to_string(),
                });
            }
        }

        match self.archiver.store(&file.name, &content).await {
            Ok(()) => Ok(FileOutcome::Archived),
            Err(e) if self.policy.isolate_archive_failures => {
                error!(file = %file.name, error = %e, "[ARCHIVE][ERROR] Failed to store file, skipping");
                Ok(FileOutcome::ArchiveFailed {
                    reason: e.to_string(),
                })
            }
            Err(e) => {
                warn!(file = %file.name, "[ARCHIVE] Archive failure ends the run");
                Err(RunError::Archive {
                    file: file.name.clone(),
                    source: e,
                })
            }
        }
    }
}
