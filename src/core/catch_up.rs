use chrono::{Duration as Days, NaiveDate};
use sqlx::SqlitePool;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::core::chunking::DateRange;
use crate::core::orchestrator::{self, SyncReport};
use crate::db;
use crate::fetcher::MarketSource;
use crate::models::Dataset;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatchUpPlan {
    /// Nothing stored yet; a full backfill has to run first.
    EmptyStore,
    UpToDate { latest: NaiveDate },
    Missing(DateRange),
}

/// Works out which days to fetch. Today is never included since its
/// hours are not all published yet; the target is yesterday.
pub fn plan(latest_stored: Option<NaiveDate>, today: NaiveDate) -> CatchUpPlan {
    let Some(latest) = latest_stored else {
        return CatchUpPlan::EmptyStore;
    };

    let start = latest + Days::days(1);
    let yesterday = today - Days::days(1);

    match DateRange::new(start, yesterday) {
        Ok(range) => CatchUpPlan::Missing(range),
        Err(_) => CatchUpPlan::UpToDate { latest },
    }
}

#[derive(Debug)]
pub enum CatchUpOutcome {
    EmptyStore,
    UpToDate,
    Synced(SyncReport),
}

/// Fills the gap between the newest stored price day and yesterday.
pub async fn run(
    pool: &SqlitePool,
    source: &dyn MarketSource,
    today: NaiveDate,
    pause: Duration,
) -> anyhow::Result<CatchUpOutcome> {
    info!("============================================================");
    info!("CATCH-UP SYNC");
    info!("============================================================");

    let result = run_inner(pool, source, today, pause).await;
    if let Err(e) = &result {
        error!("❌ Catch-up failed: {:#}", e);
    }

    // Checkpoint even after a failure so whatever was written reaches the main file.
    if let Err(e) = db::checkpoint(pool).await {
        warn!("WAL checkpoint failed: {:#}", e);
    }

    result
}

async fn run_inner(
    pool: &SqlitePool,
    source: &dyn MarketSource,
    today: NaiveDate,
    pause: Duration,
) -> anyhow::Result<CatchUpOutcome> {
    let latest = db::latest_date(pool, Dataset::Price).await?;

    let range = match plan(latest, today) {
        CatchUpPlan::EmptyStore => {
            warn!("⚠️  Database is empty! Run a full backfill (`sync --from --to`) first.");
            return Ok(CatchUpOutcome::EmptyStore);
        }
        CatchUpPlan::UpToDate { latest } => {
            info!("Latest stored day: {}", latest);
            info!("✅ No missing days, database is up to date.");
            return Ok(CatchUpOutcome::UpToDate);
        }
        CatchUpPlan::Missing(range) => range,
    };

    info!("⚠️  {} missing day(s): {}", range.days(), range);

    let report = orchestrator::sync_range(pool, source, range, pause).await;

    let counts = db::all_counts(pool).await?;
    info!("============================================================");
    info!("CATCH-UP SYNC COMPLETE");
    info!("Total MCP records: {}", counts.mcp);
    info!("Total Generation records: {}", counts.generation);
    info!("Total Consumption records: {}", counts.consumption);
    if report.failed_chunks() > 0 {
        warn!("{} chunk(s) failed; run catch-up again to retry", report.failed_chunks());
    }
    info!("============================================================");

    Ok(CatchUpOutcome::Synced(report))
}
