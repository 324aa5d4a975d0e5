use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use anyhow::{Context, Result};
use std::path::Path;
use std::str::FromStr;
use tracing::info;

use crate::core::chunking::{stored_day, DateRange};
use crate::models::{ConsumptionItem, Dataset, DatasetStats, GenerationItem, PriceItem, PriceRow, TableCounts};

/// Opens (creating if needed) the SQLite store at `path` and applies migrations.
/// The path is used as a filename, never parsed as a URL.
pub async fn open(path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create database directory {}", parent.display()))?;
    }
    info!("📦 Opening SQLite database: {}", path.display());

    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal);
    connect_with(options, false).await
}

/// Connects to `database_url` and applies migrations.
pub async fn connect(database_url: &str) -> Result<SqlitePool> {
    info!("📦 Connecting to SQLite database: {}", database_url);

    let in_memory = database_url.contains(":memory:");
    let mut options = SqliteConnectOptions::from_str(database_url)
        .with_context(|| format!("Invalid database URL {}", database_url))?
        .create_if_missing(true);
    if !in_memory {
        options = options.journal_mode(SqliteJournalMode::Wal);
    }
    connect_with(options, in_memory).await
}

/// Builds the pool and runs migrations.
/// An in-memory store gets a single long-lived connection so every query sees the same database.
async fn connect_with(options: SqliteConnectOptions, in_memory: bool) -> Result<SqlitePool> {
    let pool = if in_memory {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?
    } else {
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?
    };

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;

    info!("✅ Database initialized successfully");
    Ok(pool)
}

pub async fn upsert_prices(pool: &SqlitePool, items: &[PriceItem]) -> Result<usize> {
    let mut tx = pool.begin().await?;

    for item in items {
        sqlx::query(
            "INSERT OR REPLACE INTO mcp_data (date, hour, price, price_usd, price_eur)
             VALUES ($1, $2, $3, $4, $5)"
        )
        .bind(&item.date)
        .bind(&item.hour)
        .bind(item.price)
        .bind(item.price_usd)
        .bind(item.price_eur)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    info!("✅ Inserted {} MCP records into database", items.len());
    Ok(items.len())
}

pub async fn upsert_generation(pool: &SqlitePool, items: &[GenerationItem]) -> Result<usize> {
    let mut tx = pool.begin().await?;

    for item in items {
        sqlx::query(
            "INSERT OR REPLACE INTO generation_data (
                date, hour, total, biomass, fueloil, geothermal, hydro,
                import_export, lignite, lng, natural_gas, naphtha, river, solar, wind,
                wasteheat, asphaltite_coal, black_coal, import_coal
             )
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)"
        )
        .bind(&item.date)
        .bind(&item.hour)
        .bind(item.total)
        .bind(item.biomass)
        .bind(item.fueloil)
        .bind(item.geothermal)
        .bind(item.dammed_hydro)
        .bind(item.import_export)
        .bind(item.lignite)
        .bind(item.lng)
        .bind(item.natural_gas)
        .bind(item.naphta)
        .bind(item.river)
        .bind(item.sun)
        .bind(item.wind)
        .bind(item.wasteheat)
        .bind(item.asphaltite_coal)
        .bind(item.black_coal)
        .bind(item.import_coal)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    info!("✅ Inserted {} Generation records into database", items.len());
    Ok(items.len())
}

pub async fn upsert_consumption(pool: &SqlitePool, items: &[ConsumptionItem]) -> Result<usize> {
    let mut tx = pool.begin().await?;

    for item in items {
        // Stored under `hour` like the other tables.
        sqlx::query(
            "INSERT OR REPLACE INTO consumption_data (date, hour, consumption)
             VALUES ($1, $2, $3)"
        )
        .bind(&item.date)
        .bind(&item.time)
        .bind(item.consumption)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    info!("✅ Inserted {} Consumption records into database", items.len());
    Ok(items.len())
}

/// Prices whose calendar day lies in `range`, ordered by date and hour.
pub async fn get_prices(pool: &SqlitePool, range: DateRange) -> Result<Vec<PriceRow>> {
    let rows = sqlx::query_as::<_, PriceRow>(
        r#"
        SELECT date, hour, price, price_usd, price_eur
        FROM mcp_data
        WHERE substr(date, 1, 10) >= $1 AND substr(date, 1, 10) <= $2
        ORDER BY date, hour
        "#
    )
    .bind(range.start.format("%Y-%m-%d").to_string())
    .bind(range.end.format("%Y-%m-%d").to_string())
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

pub async fn count(pool: &SqlitePool, dataset: Dataset) -> Result<i64> {
    let query = format!("SELECT COUNT(*) as count FROM {}", dataset.table());
    let row = sqlx::query(&query).fetch_one(pool).await?;
    Ok(row.try_get("count")?)
}

pub async fn all_counts(pool: &SqlitePool) -> Result<TableCounts> {
    Ok(TableCounts {
        mcp: count(pool, Dataset::Price).await?,
        generation: count(pool, Dataset::Generation).await?,
        consumption: count(pool, Dataset::Consumption).await?,
    })
}

/// Calendar day of the newest stored row.
pub async fn latest_date(pool: &SqlitePool, dataset: Dataset) -> Result<Option<chrono::NaiveDate>> {
    let query = format!("SELECT MAX(date) as last_date FROM {}", dataset.table());
    let row = sqlx::query(&query).fetch_one(pool).await?;
    let last: Option<String> = row.try_get("last_date")?;
    Ok(last.as_deref().and_then(stored_day))
}

pub async fn count_in_range(pool: &SqlitePool, dataset: Dataset, range: DateRange) -> Result<i64> {
    let query = format!(
        "SELECT COUNT(*) as count FROM {} WHERE substr(date, 1, 10) >= $1 AND substr(date, 1, 10) <= $2",
        dataset.table()
    );
    let row = sqlx::query(&query)
        .bind(range.start.format("%Y-%m-%d").to_string())
        .bind(range.end.format("%Y-%m-%d").to_string())
        .fetch_one(pool)
        .await?;
    Ok(row.try_get("count")?)
}

pub async fn dataset_stats(pool: &SqlitePool, dataset: Dataset) -> Result<DatasetStats> {
    let query = format!(
        "SELECT COUNT(*) as count, MIN(date) as first_date, MAX(date) as last_date FROM {}",
        dataset.table()
    );
    let row = sqlx::query(&query).fetch_one(pool).await?;

    Ok(DatasetStats {
        dataset,
        count: row.try_get("count")?,
        first_date: row.try_get("first_date")?,
        last_date: row.try_get("last_date")?,
    })
}

/// Every hour that cleared at exactly zero.
pub async fn zero_prices(pool: &SqlitePool) -> Result<Vec<PriceRow>> {
    let rows = sqlx::query_as::<_, PriceRow>(
        "SELECT date, hour, price, price_usd, price_eur FROM mcp_data WHERE price = 0 ORDER BY date, hour"
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// The `limit` cheapest hours below `threshold`, cheapest first.
pub async fn low_prices(pool: &SqlitePool, threshold: f64, limit: i64) -> Result<Vec<PriceRow>> {
    let rows = sqlx::query_as::<_, PriceRow>(
        r#"
        SELECT date, hour, price, price_usd, price_eur
        FROM mcp_data
        WHERE price < $1
        ORDER BY price ASC, date ASC
        LIMIT $2
        "#
    )
    .bind(threshold)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Folds the WAL back into the main database file.
pub async fn checkpoint(pool: &SqlitePool) -> Result<()> {
    info!("🔄 WAL checkpoint...");
    sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
        .execute(pool)
        .await?;
    info!("✅ WAL checkpoint complete");
    Ok(())
}
