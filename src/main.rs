use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

use market_sync_lib::config::Config;
use market_sync_lib::core::catch_up;
use market_sync_lib::core::chunking::{market_today, DateRange};
use market_sync_lib::core::orchestrator::{self, SyncReport};
use market_sync_lib::core::quality;
use market_sync_lib::core::scheduler::{self, SyncJob};
use market_sync_lib::fetcher::epias::EpiasClient;
use market_sync_lib::models::Dataset;
use market_sync_lib::{db, forecast, logging};

#[derive(Parser)]
#[command(name = "market-sync", version, about = "Sync EPİAŞ day-ahead prices, generation and consumption into SQLite")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the database and run migrations
    Init,
    /// Fetch every dataset for a date range
    Sync {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
    },
    /// Fetch only datasets that are incomplete in a date range
    Fill {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
    },
    /// Fetch the days between the latest stored day and yesterday
    CatchUp,
    /// Show per-dataset record counts and date coverage
    Status,
    /// Report zero-price hours
    Quality,
    /// Cross-check the lowest stored prices against the API
    Verify {
        #[arg(long, default_value_t = quality::DEFAULT_LOW_PRICE_THRESHOLD)]
        threshold: f64,
        #[arg(long, default_value_t = quality::DEFAULT_VERIFY_LIMIT)]
        limit: i64,
    },
    /// Write the dashboard forecast snapshot
    ExportForecasts {
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Catch up now, then on the configured schedule until Ctrl-C
    Watch,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            std::process::exit(2);
        }
    };

    if let Err(e) = logging::init(config.log_file.as_deref()) {
        eprintln!("Failed to initialise logging: {:#}", e);
    }

    if let Err(e) = run(cli.command, &config).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn log_report(report: &SyncReport) {
    info!("============================================================");
    info!("SYNC COMPLETE: {}", report.range);
    for d in &report.datasets {
        if d.skipped {
            info!("  {:<12} skipped (already complete)", d.dataset.label());
        } else {
            info!(
                "  {:<12} {} written, {}/{} chunk(s) failed",
                d.dataset.label(),
                d.written,
                d.failed_chunks,
                d.chunks
            );
        }
    }
    info!("============================================================");
}

async fn run(command: Command, config: &Config) -> Result<()> {
    let pool = db::open(&config.database_path).await?;

    match command {
        Command::Init => {
            info!("✅ Database ready at {}", config.database_path.display());
        }
        Command::Sync { from, to } => {
            let range = DateRange::parse(&from, &to)?;
            let client = EpiasClient::from_config(config)?;
            let report = orchestrator::sync_range(&pool, &client, range, config.chunk_pause).await;
            db::checkpoint(&pool).await?;
            log_report(&report);
            if report.failed_chunks() > 0 {
                anyhow::bail!("{} chunk(s) failed; re-run the same range to retry", report.failed_chunks());
            }
        }
        Command::Fill { from, to } => {
            let range = DateRange::parse(&from, &to)?;
            let client = EpiasClient::from_config(config)?;
            let report = orchestrator::fill_range(&pool, &client, range, config.chunk_pause).await;
            db::checkpoint(&pool).await?;
            let report = report?;
            log_report(&report);
            if report.failed_chunks() > 0 {
                anyhow::bail!("{} chunk(s) failed; re-run the same range to retry", report.failed_chunks());
            }
        }
        Command::CatchUp => {
            let client = EpiasClient::from_config(config)?;
            catch_up::run(&pool, &client, market_today(), config.chunk_pause).await?;
        }
        Command::Status => {
            println!("{:<12} | {:>8} | {:<25} | {:<25}", "Dataset", "Count", "First", "Last");
            println!("{}", "-".repeat(80));
            for dataset in Dataset::ALL {
                let stats = db::dataset_stats(&pool, dataset).await?;
                println!(
                    "{:<12} | {:>8} | {:<25} | {:<25}",
                    dataset.label(),
                    stats.count,
                    stats.first_date.as_deref().unwrap_or("-"),
                    stats.last_date.as_deref().unwrap_or("-")
                );
            }
        }
        Command::Quality => {
            let report = quality::zero_price_report(&pool).await?;
            println!("Total MCP records: {}", report.total_records);
            println!("Zero-price hours:  {} ({:.2}%)", report.zero_prices, report.zero_share());
            println!("  likely genuine (Sunday 10:00-14:00): {}", report.likely_genuine);
            println!("  suspicious:                          {}", report.suspicious);
            for issue in report.issues.iter().take(20) {
                println!(
                    "  {} {} {} {}",
                    if issue.likely_genuine { "✓" } else { "⚠" },
                    issue.date,
                    issue.hour,
                    issue.verification_url.as_deref().unwrap_or("")
                );
            }
            if report.issues.len() > 20 {
                println!("  ... {} more", report.issues.len() - 20);
            }
        }
        Command::Verify { threshold, limit } => {
            let client = EpiasClient::from_config(config)?;
            let summary = quality::verify_low_prices(&pool, &client, threshold, limit, config.chunk_pause).await?;
            println!("Checked:    {}", summary.checks.len());
            println!("Matches:    {}", summary.matches);
            println!("Mismatches: {}", summary.mismatches);
            println!("Errors:     {}", summary.errors);
            println!("Verdict:    {}", summary.verdict());
        }
        Command::ExportForecasts { output } => {
            let path = output.unwrap_or_else(|| config.forecasts_path.clone());
            forecast::export(&pool, market_today(), &path)
                .await
                .with_context(|| format!("Forecast export to {} failed", path.display()))?;
        }
        Command::Watch => {
            if config.ticket.is_none() && (config.username.is_none() || config.password.is_none()) {
                warn!("No EPİAŞ credentials configured; scheduled fetches will fail");
            }
            let client = EpiasClient::from_config(config)?;
            let job = SyncJob::new(pool.clone(), Arc::new(client), config.chunk_pause, config.forecasts_path.clone());
            scheduler::watch(job, &config.sync_cron).await?;
        }
    }

    pool.close().await;
    Ok(())
}
