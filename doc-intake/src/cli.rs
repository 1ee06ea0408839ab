/// # doc-intake CLI Interface (Module)
///
/// Command parsing and orchestration for the intake job. All stage logic (token, listing,
/// analysis, archive and the run pipeline) lives in the [`doc-intake-core`] crate; this module
/// only wires configuration into it and decides how often it fires.
///
/// ## Commands
/// - `run`: a single firing, then exit. Exits non-zero if the run aborted.
/// - `serve`: fire on the configured schedule until Ctrl-C or SIGTERM.
///
/// For programmatic and integration use, call [`run`] with a constructed [`Cli`].
///
/// [`doc-intake-core`]: ../../doc-intake-core/
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use doc_intake_core::pipeline::DefaultPipeline;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::load_config::load_config;
use crate::schedule::{serve, shutdown_signal};

/// CLI for doc-intake: move library documents through layout analysis into the archive.
#[derive(Parser)]
#[clap(
    name = "doc-intake",
    version,
    about = "Submit SharePoint library documents for layout analysis and archive them to blob storage"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the job once and exit
    Run {
        /// Path to an optional YAML settings file
        #[clap(long)]
        config: Option<PathBuf>,
    },
    /// Run the job on a timer until interrupted
    Serve {
        /// Path to an optional YAML settings file
        #[clap(long)]
        config: Option<PathBuf>,
        /// Override the interval between firings, in seconds
        #[clap(long)]
        every_secs: Option<u64>,
        /// Fire once immediately instead of waiting for the first tick
        #[clap(long)]
        run_on_startup: bool,
    },
}

/// A single `run` ended early. The run handler has already logged the cause.
#[derive(Debug, Error)]
#[error("Run aborted, see the error log above")]
pub struct RunAborted;

/// Log how the CLI finished. Failures already logged by the run handler are repeated at `warn`
/// so each failure has one error entry.
pub fn log_outcome(result: &Result<()>) {
    match result {
        Ok(()) => tracing::info!("CLI completed successfully"),
        Err(e) if e.is::<RunAborted>() => tracing::warn!(error = %e, "CLI exited with error"),
        Err(e) => tracing::error!(error = %e, "CLI exited with error"),
    }
}

/// Async CLI entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Run { config } => {
            let config = load_config(config.as_deref())?;
            config.job.trace_loaded();
            let pipeline = DefaultPipeline::from_config(&config.job)
                .context("Failed to construct the run pipeline")?;

            tracing::info!(command = "run", "Starting single run");
            match pipeline.run().await {
                Some(report) => {
                    tracing::info!(
                        command = "run",
                        listed = report.listed,
                        failed = report.failed(),
                        "Run finished"
                    );
                    Ok(())
                }
                None => Err(RunAborted.into()),
            }
        }
        Commands::Serve {
            config,
            every_secs,
            run_on_startup,
        } => {
            let config = load_config(config.as_deref())?;
            config.job.trace_loaded();
            let mut schedule = config.schedule;
            if let Some(secs) = every_secs {
                if secs == 0 {
                    return Err(anyhow!("--every-secs must be greater than zero"));
                }
                schedule.every = Duration::from_secs(secs);
            }
            schedule.run_on_startup |= run_on_startup;

            let pipeline = DefaultPipeline::from_config(&config.job)
                .context("Failed to construct the run pipeline")?;

            let shutdown = CancellationToken::new();
            tokio::spawn({
                let shutdown = shutdown.clone();
                async move {
                    shutdown_signal().await;
                    shutdown.cancel();
                }
            });

            tracing::info!(command = "serve", "Starting scheduled runs");
            serve(&pipeline, schedule, shutdown).await;
            tracing::info!(command = "serve", "Stopped");
            Ok(())
        }
    }
}
