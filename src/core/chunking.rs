use anyhow::{bail, Result};
use chrono::{Datelike, Duration, NaiveDate, Utc};
use chrono_tz::Europe::Istanbul;
use serde::Serialize;

/// Inclusive range of calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            bail!("Invalid date range: {} is after {}", start, end);
        }
        Ok(Self { start, end })
    }

    pub fn single(day: NaiveDate) -> Self {
        Self { start: day, end: day }
    }

    /// Parses two `YYYY-MM-DD` strings.
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        let start = NaiveDate::parse_from_str(start.trim(), "%Y-%m-%d")?;
        let end = NaiveDate::parse_from_str(end.trim(), "%Y-%m-%d")?;
        Self::new(start, end)
    }

    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// Splits into consecutive chunks of at most `max_days` days each.
    /// Chunks never overlap and together cover the range exactly.
    pub fn split(&self, max_days: u32) -> Vec<DateRange> {
        let step = i64::from(max_days.max(1));
        let mut chunks = Vec::new();
        let mut cursor = self.start;

        while cursor <= self.end {
            let chunk_end = std::cmp::min(cursor + Duration::days(step - 1), self.end);
            chunks.push(DateRange { start: cursor, end: chunk_end });
            cursor = chunk_end + Duration::days(1);
        }

        chunks
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} → {}", self.start.format("%Y-%m-%d"), self.end.format("%Y-%m-%d"))
    }
}

/// Request timestamp for a day: midnight in Turkey time (+03:00, no DST).
pub fn wire_timestamp(day: NaiveDate) -> String {
    format!("{}T00:00:00+03:00", day.format("%Y-%m-%d"))
}

/// Calendar date part of a stored `date` value such as `2024-10-15T00:00:00+03:00`.
pub fn stored_day(value: &str) -> Option<NaiveDate> {
    let day = value.get(..10)?;
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

/// Today's date in the market's time zone.
pub fn market_today() -> NaiveDate {
    Utc::now().with_timezone(&Istanbul).date_naive()
}

/// Monday of the week containing `day`.
pub fn week_monday(day: NaiveDate) -> NaiveDate {
    day - Duration::days(i64::from(day.weekday().num_days_from_monday()))
}
