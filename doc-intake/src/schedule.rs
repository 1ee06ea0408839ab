//! Timer loop for `serve`: fires the job on a fixed interval until shutdown is requested.
//!
//! Runs never overlap: each firing is awaited before the next tick is taken, and ticks missed
//! while a long run was in progress are skipped rather than queued.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use doc_intake_core::contract::{Analyzer, Archiver, Library, TokenProvider};
use doc_intake_core::pipeline::Pipeline;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Every five minutes, like the `0 */5 * * * *` cron expression.
pub const DEFAULT_EVERY_SECS: u64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub every: Duration,
    /// Fire on wall-clock multiples of `every` (:00, :05, ...) instead of relative to startup.
    pub align_to_wall_clock: bool,
    pub run_on_startup: bool,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            every: Duration::from_secs(DEFAULT_EVERY_SECS),
            align_to_wall_clock: true,
            run_on_startup: false,
        }
    }
}

/// Something the timer can fire. Implemented for the run pipeline.
#[async_trait]
pub trait ScheduledJob: Send + Sync {
    async fn fire(&self);
}

#[async_trait]
impl<T, L, A, R> ScheduledJob for Pipeline<T, L, A, R>
where
    T: TokenProvider,
    L: Library,
    A: Analyzer,
    R: Archiver,
{
    async fn fire(&self) {
        self.run().await;
    }
}

/// Time from `since_epoch` to the next multiple of `every`. Zero when exactly on a boundary.
pub fn delay_until_next_firing(since_epoch: Duration, every: Duration) -> Duration {
    let every_ms = every.as_millis();
    if every_ms == 0 {
        return Duration::ZERO;
    }
    let remainder = since_epoch.as_millis() % every_ms;
    if remainder == 0 {
        Duration::ZERO
    } else {
        Duration::from_millis((every_ms - remainder) as u64)
    }
}

/// Fire `job` according to `schedule` until `shutdown` is cancelled. An in-flight run is
/// allowed to finish.
pub async fn serve<J>(job: &J, schedule: Schedule, shutdown: CancellationToken)
where
    J: ScheduledJob + ?Sized,
{
    info!(
        every_secs = schedule.every.as_secs(),
        align_to_wall_clock = schedule.align_to_wall_clock,
        run_on_startup = schedule.run_on_startup,
        "[SCHEDULE] Starting timer"
    );

    if schedule.run_on_startup {
        job.fire().await;
    }

    let first = if schedule.align_to_wall_clock {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        delay_until_next_firing(now, schedule.every)
    } else {
        schedule.every
    };
    let mut ticker = interval_at(Instant::now() + first, schedule.every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("[SCHEDULE] Shutdown requested, timer stopped");
                break;
            }
            _ = ticker.tick() => {
                let started = Instant::now();
                job.fire().await;
                let elapsed = started.elapsed();
                if elapsed > schedule.every {
                    warn!(
                        elapsed_secs = elapsed.as_secs(),
                        every_secs = schedule.every.as_secs(),
                        "[SCHEDULE] Run took longer than the interval, missed firings are skipped"
                    );
                }
            }
        }
    }
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = ?e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = ?e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
