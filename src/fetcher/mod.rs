use async_trait::async_trait;
use crate::core::chunking::DateRange;
use crate::models::{ConsumptionItem, GenerationItem, PriceItem};

pub mod auth;
pub mod epias;
pub mod error;

pub use error::FetchError;

/// Source of hourly market data for a date range.
///
/// Implementations are called with ranges that already respect the
/// dataset's per-request limit (see `Dataset::max_days`).
#[async_trait]
pub trait MarketSource: Send + Sync {
    fn name(&self) -> &str;
    async fn fetch_prices(&self, range: DateRange) -> Result<Vec<PriceItem>, FetchError>;
    async fn fetch_generation(&self, range: DateRange) -> Result<Vec<GenerationItem>, FetchError>;
    async fn fetch_consumption(&self, range: DateRange) -> Result<Vec<ConsumptionItem>, FetchError>;
}
