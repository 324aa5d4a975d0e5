use anyhow::Result;
use chrono::{Datelike, NaiveDate, Weekday};
use serde::Serialize;
use sqlx::SqlitePool;
use std::time::Duration;
use tracing::{info, warn};

use crate::core::chunking::{stored_day, DateRange};
use crate::core::rate_limiter::RateLimiter;
use crate::db;
use crate::fetcher::MarketSource;
use crate::models::{Dataset, PriceRow};

pub const DEFAULT_LOW_PRICE_THRESHOLD: f64 = 100.0;
pub const DEFAULT_VERIFY_LIMIT: i64 = 20;
const PRICE_TOLERANCE: f64 = 0.01;

const VERIFY_URL: &str = "https://seffaflik.epias.com.tr/transparency/piyasalar/gop/ptf.xhtml";

/// Link to the public transparency page for a day, for manual checking.
pub fn verification_url(day: NaiveDate) -> String {
    format!("{}?date={}", VERIFY_URL, day.format("%d.%m.%Y"))
}

fn hour_of(hour: &str) -> Option<u32> {
    hour.split(':').next()?.parse().ok()
}

/// Sunday midday hours can clear at zero when solar output floods the market.
pub fn is_likely_genuine_zero(day: NaiveDate, hour: u32) -> bool {
    day.weekday() == Weekday::Sun && (10..=14).contains(&hour)
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PriceIssue {
    pub date: String,
    pub hour: String,
    pub price: f64,
    pub likely_genuine: bool,
    pub verification_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QualityReport {
    pub total_records: i64,
    pub zero_prices: usize,
    pub likely_genuine: usize,
    pub suspicious: usize,
    pub issues: Vec<PriceIssue>,
}

impl QualityReport {
    pub fn zero_share(&self) -> f64 {
        if self.total_records == 0 {
            0.0
        } else {
            self.zero_prices as f64 / self.total_records as f64 * 100.0
        }
    }
}

fn classify(row: PriceRow) -> PriceIssue {
    let day = stored_day(&row.date);
    let likely_genuine = match (day, hour_of(&row.hour)) {
        (Some(d), Some(h)) => is_likely_genuine_zero(d, h),
        _ => false,
    };
    PriceIssue {
        verification_url: day.map(verification_url),
        date: row.date,
        hour: row.hour,
        price: row.price,
        likely_genuine,
    }
}

/// Summarises zero-price hours in the store.
pub async fn zero_price_report(pool: &SqlitePool) -> Result<QualityReport> {
    let total_records = db::count(pool, Dataset::Price).await?;
    let issues: Vec<PriceIssue> = db::zero_prices(pool).await?.into_iter().map(classify).collect();
    let likely_genuine = issues.iter().filter(|i| i.likely_genuine).count();

    let report = QualityReport {
        total_records,
        zero_prices: issues.len(),
        likely_genuine,
        suspicious: issues.len() - likely_genuine,
        issues,
    };

    info!(
        total = report.total_records,
        zero = report.zero_prices,
        suspicious = report.suspicious,
        "Zero-price hours: {} ({:.2}%)", report.zero_prices, report.zero_share()
    );
    Ok(report)
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub enum CheckOutcome {
    Match { api_price: f64 },
    Mismatch { api_price: f64 },
    /// The API answered but had no row for that hour. Tallied with errors.
    Missing,
    Error(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct PriceCheck {
    pub date: String,
    pub hour: String,
    pub stored_price: f64,
    pub outcome: CheckOutcome,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum Verdict {
    Reliable,
    PartiallyReliable,
    Unreliable,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Verdict::Reliable => "reliable: stored prices match the API",
            Verdict::PartiallyReliable => "partially reliable: some prices differ from the API",
            Verdict::Unreliable => "unreliable: most prices differ from the API",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VerificationSummary {
    pub checks: Vec<PriceCheck>,
    pub matches: usize,
    pub mismatches: usize,
    pub errors: usize,
}

impl VerificationSummary {
    fn from_checks(checks: Vec<PriceCheck>) -> Self {
        let matches = checks.iter().filter(|c| matches!(c.outcome, CheckOutcome::Match { .. })).count();
        let errors = checks
            .iter()
            .filter(|c| matches!(c.outcome, CheckOutcome::Error(_) | CheckOutcome::Missing))
            .count();
        Self {
            mismatches: checks.len() - matches - errors,
            matches,
            errors,
            checks,
        }
    }

    pub fn match_rate(&self) -> f64 {
        if self.checks.is_empty() {
            0.0
        } else {
            self.matches as f64 / self.checks.len() as f64 * 100.0
        }
    }

    pub fn verdict(&self) -> Verdict {
        let rate = self.match_rate();
        if rate > 90.0 {
            Verdict::Reliable
        } else if rate > 50.0 {
            Verdict::PartiallyReliable
        } else {
            Verdict::Unreliable
        }
    }
}

async fn check_row(source: &dyn MarketSource, row: &PriceRow) -> CheckOutcome {
    let Some(day) = stored_day(&row.date) else {
        return CheckOutcome::Error(format!("unparseable date {}", row.date));
    };

    match source.fetch_prices(DateRange::single(day)).await {
        Ok(items) => match items.iter().find(|i| i.date == row.date && i.hour == row.hour) {
            Some(item) if (item.price - row.price).abs() < PRICE_TOLERANCE => CheckOutcome::Match { api_price: item.price },
            Some(item) => CheckOutcome::Mismatch { api_price: item.price },
            None => CheckOutcome::Missing,
        },
        Err(e) => CheckOutcome::Error(e.to_string()),
    }
}

/// Re-fetches the cheapest stored hours from the API and compares them.
pub async fn verify_low_prices(
    pool: &SqlitePool,
    source: &dyn MarketSource,
    threshold: f64,
    limit: i64,
    pause: Duration,
) -> Result<VerificationSummary> {
    let rows = db::low_prices(pool, threshold, limit).await?;
    info!("Checking {} stored price(s) below {} TRY against {}", rows.len(), threshold, source.name());

    let total = rows.len();
    let mut checks = Vec::with_capacity(total);
    for (index, row) in rows.into_iter().enumerate() {
        let outcome = check_row(source, &row).await;
        match &outcome {
            CheckOutcome::Match { .. } => info!("✅ {} {} {:.2} TRY", row.date, row.hour, row.price),
            CheckOutcome::Mismatch { api_price } => {
                warn!("❌ {} {} stored {:.2}, API {:.2}", row.date, row.hour, row.price, api_price)
            }
            CheckOutcome::Missing => warn!("⚠️  {} {} not returned by the API", row.date, row.hour),
            CheckOutcome::Error(e) => warn!("⚠️  {} {} check failed: {}", row.date, row.hour, e),
        }

        checks.push(PriceCheck {
            date: row.date,
            hour: row.hour,
            stored_price: row.price,
            outcome,
        });

        if index + 1 < total {
            RateLimiter::wait(pause).await;
        }
    }

    let summary = VerificationSummary::from_checks(checks);
    info!(
        matches = summary.matches,
        mismatches = summary.mismatches,
        errors = summary.errors,
        "Verification: {:.1}% match, {}", summary.match_rate(), summary.verdict()
    );
    Ok(summary)
}
