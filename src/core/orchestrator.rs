use sqlx::SqlitePool;
use serde::Serialize;
use std::time::Duration;
use tracing::{error, info};

use crate::core::chunking::DateRange;
use crate::core::rate_limiter::RateLimiter;
use crate::db;
use crate::fetcher::MarketSource;
use crate::models::Dataset;

/// Outcome of syncing one dataset over a range.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DatasetReport {
    pub dataset: Dataset,
    pub chunks: usize,
    pub failed_chunks: usize,
    pub fetched: usize,
    pub written: usize,
    /// Set when the dataset was already complete and nothing was requested.
    pub skipped: bool,
}

impl DatasetReport {
    fn empty(dataset: Dataset) -> Self {
        Self { dataset, chunks: 0, failed_chunks: 0, fetched: 0, written: 0, skipped: false }
    }

    pub fn is_complete(&self) -> bool {
        self.failed_chunks == 0
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub range: DateRange,
    pub datasets: Vec<DatasetReport>,
}

impl SyncReport {
    pub fn failed_chunks(&self) -> usize {
        self.datasets.iter().map(|d| d.failed_chunks).sum()
    }

    pub fn written(&self) -> usize {
        self.datasets.iter().map(|d| d.written).sum()
    }

    pub fn dataset(&self, dataset: Dataset) -> Option<&DatasetReport> {
        self.datasets.iter().find(|d| d.dataset == dataset)
    }
}

/// Fetches and stores one chunk. Returns (fetched, written).
async fn sync_chunk(
    pool: &SqlitePool,
    source: &dyn MarketSource,
    dataset: Dataset,
    chunk: DateRange,
) -> anyhow::Result<(usize, usize)> {
    match dataset {
        Dataset::Price => {
            let items = source.fetch_prices(chunk).await?;
            let written = db::upsert_prices(pool, &items).await?;
            Ok((items.len(), written))
        }
        Dataset::Generation => {
            let items = source.fetch_generation(chunk).await?;
            let written = db::upsert_generation(pool, &items).await?;
            Ok((items.len(), written))
        }
        Dataset::Consumption => {
            let items = source.fetch_consumption(chunk).await?;
            let written = db::upsert_consumption(pool, &items).await?;
            Ok((items.len(), written))
        }
    }
}

/// Syncs one dataset over `range`, chunked at the dataset's request limit.
///
/// Every chunk is written as soon as it arrives, so an interrupted run keeps
/// what it already stored and a re-run simply overwrites the same keys.
/// A failing chunk is logged and counted; the remaining chunks still run.
pub async fn sync_dataset(
    pool: &SqlitePool,
    source: &dyn MarketSource,
    dataset: Dataset,
    range: DateRange,
    pause: Duration,
) -> DatasetReport {
    let chunks = range.split(dataset.max_days());
    let total = chunks.len();
    let mut report = DatasetReport::empty(dataset);
    report.chunks = total;

    info!("------------------------------------------------------------");
    info!("{} data: {} ({} chunk(s), limit {} days)", dataset, range, total, dataset.max_days());

    for (index, chunk) in chunks.into_iter().enumerate() {
        info!("📦 {} chunk {}/{}: {}", dataset, index + 1, total, chunk);

        match sync_chunk(pool, source, dataset, chunk).await {
            Ok((fetched, written)) => {
                report.fetched += fetched;
                report.written += written;
                info!("✅ {} {} records stored", written, dataset);
            }
            Err(e) => {
                report.failed_chunks += 1;
                error!(dataset = %dataset, chunk = %chunk, "❌ {} chunk {}/{} failed: {:#}", dataset, index + 1, total, e);
            }
        }

        if index + 1 < total {
            RateLimiter::wait(pause).await;
        }
    }

    info!(
        dataset = %dataset,
        written = report.written,
        failed_chunks = report.failed_chunks,
        "{} total: {} records written", dataset, report.written
    );
    report
}

/// Syncs price, generation and consumption for `range`, in that order.
pub async fn sync_range(
    pool: &SqlitePool,
    source: &dyn MarketSource,
    range: DateRange,
    pause: Duration,
) -> SyncReport {
    info!("🚀 Syncing all datasets from {}: {} ({} days)", source.name(), range, range.days());

    let mut datasets = Vec::with_capacity(Dataset::ALL.len());
    for dataset in Dataset::ALL {
        datasets.push(sync_dataset(pool, source, dataset, range, pause).await);
    }

    SyncReport { range, datasets }
}

/// Like `sync_range`, but leaves alone datasets that already hold a full
/// 24 rows per day for the range.
pub async fn fill_range(
    pool: &SqlitePool,
    source: &dyn MarketSource,
    range: DateRange,
    pause: Duration,
) -> anyhow::Result<SyncReport> {
    let expected = range.days() * 24;
    info!("Checking {} for gaps: expecting {} hourly rows per dataset", range, expected);

    let mut datasets = Vec::with_capacity(Dataset::ALL.len());
    for dataset in Dataset::ALL {
        let existing = db::count_in_range(pool, dataset, range).await?;
        info!("Existing {} records: {}", dataset, existing);

        if existing >= expected {
            info!("{} data already complete, skipping", dataset);
            let mut report = DatasetReport::empty(dataset);
            report.skipped = true;
            datasets.push(report);
            continue;
        }

        datasets.push(sync_dataset(pool, source, dataset, range, pause).await);
    }

    Ok(SyncReport { range, datasets })
}
