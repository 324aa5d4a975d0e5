use anyhow::{Context, Result};
use chrono::{Duration, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use std::path::Path;
use tracing::{info, warn};

use crate::core::chunking::week_monday;

const TREND_WEEKS: i64 = 8;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ForecastSnapshot {
    pub generated_at: String,
    pub current_week: CurrentWeek,
    pub last_week_performance: Option<WeekPerformance>,
    pub last_week_comparison: Vec<ComparisonPoint>,
    pub historical_trend: Vec<TrendPoint>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CurrentWeek {
    pub start: String,
    pub end: String,
    pub forecasts: Vec<ForecastPoint>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ForecastPoint {
    pub datetime: String,
    pub predicted: f64,
    pub actual: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct WeekPerformance {
    pub week: String,
    pub mape: f64,
    pub mae: f64,
    pub rmse: f64,
    pub total_predictions: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ComparisonPoint {
    pub datetime: String,
    pub predicted: f64,
    pub actual: f64,
    pub error: Option<f64>,
    pub error_percent: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TrendPoint {
    pub week: String,
    pub mape: f64,
    pub mae: f64,
    pub rmse: f64,
}

#[derive(FromRow)]
struct HistoryRow {
    forecast_datetime: String,
    predicted_price: f64,
    actual_price: Option<f64>,
    absolute_error: Option<f64>,
    percentage_error: Option<f64>,
}

#[derive(FromRow)]
struct PerformanceRow {
    week_start: String,
    week_end: String,
    mape: f64,
    mae: f64,
    rmse: f64,
    total_predictions: i64,
}

/// Two-decimal rounding with ties to even, as the dashboard's Python tooling rounds.
fn round2(value: f64) -> f64 {
    (value * 100.0).round_ties_even() / 100.0
}

fn day(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

async fn history_for_week(pool: &SqlitePool, week_start: &str, only_actual: bool) -> Result<Vec<HistoryRow>> {
    let filter = if only_actual { " AND actual_price IS NOT NULL" } else { "" };
    let query = format!(
        r#"
        SELECT forecast_datetime, predicted_price, actual_price, absolute_error, percentage_error
        FROM forecast_history
        WHERE week_start = $1{}
        ORDER BY forecast_datetime
        "#,
        filter
    );
    let rows = sqlx::query_as::<_, HistoryRow>(&query)
        .bind(week_start)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// Collects this week's forecasts and last week's scores for the dashboard.
/// Weeks run Monday to Sunday around `today`.
pub async fn build_snapshot(pool: &SqlitePool, today: NaiveDate) -> Result<ForecastSnapshot> {
    let this_monday = week_monday(today);
    let this_sunday = this_monday + Duration::days(6);
    let last_monday = this_monday - Duration::days(7);
    let last_sunday = last_monday + Duration::days(6);

    info!("This week: {} - {}", day(this_monday), day(this_sunday));
    info!("Last week: {} - {}", day(last_monday), day(last_sunday));

    let forecasts: Vec<ForecastPoint> = history_for_week(pool, &day(this_monday), false)
        .await?
        .into_iter()
        .map(|r| ForecastPoint {
            datetime: r.forecast_datetime,
            predicted: round2(r.predicted_price),
            actual: r.actual_price.map(round2),
        })
        .collect();
    if forecasts.is_empty() {
        warn!("No forecasts found for the current week");
    }

    let last_week_performance = sqlx::query_as::<_, PerformanceRow>(
        "SELECT week_start, week_end, mape, mae, rmse, total_predictions FROM weekly_performance WHERE week_start = $1"
    )
    .bind(day(last_monday))
    .fetch_optional(pool)
    .await?
    .map(|r| WeekPerformance {
        week: format!("{} - {}", day(last_monday), day(last_sunday)),
        mape: round2(r.mape),
        mae: round2(r.mae),
        rmse: round2(r.rmse),
        total_predictions: r.total_predictions,
    });

    let last_week_comparison = history_for_week(pool, &day(last_monday), true)
        .await?
        .into_iter()
        .filter_map(|r| {
            Some(ComparisonPoint {
                datetime: r.forecast_datetime,
                predicted: round2(r.predicted_price),
                actual: round2(r.actual_price?),
                error: r.absolute_error.map(round2),
                error_percent: r.percentage_error.map(round2),
            })
        })
        .collect();

    let historical_trend = sqlx::query_as::<_, PerformanceRow>(
        r#"
        SELECT week_start, week_end, mape, mae, rmse, total_predictions
        FROM weekly_performance
        ORDER BY week_start DESC
        LIMIT $1
        "#
    )
    .bind(TREND_WEEKS)
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|r| TrendPoint {
        week: format!("{} - {}", r.week_start, r.week_end),
        mape: round2(r.mape),
        mae: round2(r.mae),
        rmse: round2(r.rmse),
    })
    .collect();

    Ok(ForecastSnapshot {
        generated_at: Local::now().to_rfc3339(),
        current_week: CurrentWeek {
            start: day(this_monday),
            end: day(this_sunday),
            forecasts,
        },
        last_week_performance,
        last_week_comparison,
        historical_trend,
    })
}

pub fn write_snapshot(path: &Path, snapshot: &ForecastSnapshot) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(snapshot)?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    info!(
        forecasts = snapshot.current_week.forecasts.len(),
        trend_weeks = snapshot.historical_trend.len(),
        "✅ Forecast snapshot written to {}", path.display()
    );
    Ok(())
}

/// Builds and writes the snapshot in one go.
pub async fn export(pool: &SqlitePool, today: NaiveDate, path: &Path) -> Result<ForecastSnapshot> {
    let snapshot = build_snapshot(pool, today).await?;
    write_snapshot(path, &snapshot)?;
    Ok(snapshot)
}
