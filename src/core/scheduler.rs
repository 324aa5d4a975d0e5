use anyhow::Context;
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

use crate::core::catch_up;
use crate::core::chunking::market_today;
use crate::fetcher::MarketSource;
use crate::forecast;

/// Everything a scheduled run needs.
#[derive(Clone)]
pub struct SyncJob {
    pool: SqlitePool,
    source: Arc<dyn MarketSource>,
    pause: Duration,
    forecasts_path: PathBuf,
    // Held for the duration of a run so a slow run is not overlapped by the next tick.
    running: Arc<Mutex<()>>,
}

impl SyncJob {
    pub fn new(pool: SqlitePool, source: Arc<dyn MarketSource>, pause: Duration, forecasts_path: PathBuf) -> Self {
        Self { pool, source, pause, forecasts_path, running: Arc::new(Mutex::new(())) }
    }

    /// One catch-up followed by a forecast export. Failures are logged.
    pub async fn run_once(&self) {
        let Ok(_guard) = self.running.try_lock() else {
            warn!("Previous sync still running, skipping this tick");
            return;
        };

        let today = market_today();
        if let Err(e) = catch_up::run(&self.pool, self.source.as_ref(), today, self.pause).await {
            error!("Scheduled catch-up failed: {:#}", e);
        }

        if let Err(e) = forecast::export(&self.pool, today, &self.forecasts_path).await {
            error!("Forecast export failed: {:#}", e);
        }
    }
}

/// Builds and starts the scheduler with the catch-up job on `cron`.
pub async fn init(job: SyncJob, cron: &str) -> anyhow::Result<JobScheduler> {
    let sched = JobScheduler::new().await?;

    let scheduled = job.clone();
    sched
        .add(
            Job::new_async(cron, move |_uuid, _l| {
                let job = scheduled.clone();
                Box::pin(async move {
                    info!("Running scheduled sync...");
                    job.run_once().await;
                })
            })
            .with_context(|| format!("Invalid cron expression: {}", cron))?,
        )
        .await?;

    sched.start().await?;
    info!("⏰ Scheduler started ({})", cron);
    Ok(sched)
}

/// Runs a catch-up now, then keeps syncing on `cron` until Ctrl-C.
pub async fn watch(job: SyncJob, cron: &str) -> anyhow::Result<()> {
    // Validate the schedule before doing any work.
    let mut sched = init(job.clone(), cron).await?;

    info!("Running startup sync...");
    job.run_once().await;

    tokio::signal::ctrl_c().await?;
    info!("Shutting down scheduler...");
    sched.shutdown().await?;
    Ok(())
}
