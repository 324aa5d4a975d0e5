use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Datasets published by the transparency platform that we mirror locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dataset {
    Price,
    Generation,
    Consumption,
}

impl Dataset {
    pub const ALL: [Dataset; 3] = [Dataset::Price, Dataset::Generation, Dataset::Consumption];

    pub fn path(&self) -> &'static str {
        match self {
            Dataset::Price => "/v1/markets/dam/data/mcp",
            Dataset::Generation => "/v1/generation/data/realtime-generation",
            Dataset::Consumption => "/v1/consumption/data/realtime-consumption",
        }
    }

    pub fn table(&self) -> &'static str {
        match self {
            Dataset::Price => "mcp_data",
            Dataset::Generation => "generation_data",
            Dataset::Consumption => "consumption_data",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Dataset::Price => "MCP",
            Dataset::Generation => "Generation",
            Dataset::Consumption => "Consumption",
        }
    }

    /// Widest date span (inclusive, in days) a single request may cover.
    /// Realtime generation is capped at 30 days, the others at one year.
    pub fn max_days(&self) -> u32 {
        match self {
            Dataset::Price => 365,
            Dataset::Generation => 30,
            Dataset::Consumption => 365,
        }
    }
}

impl std::fmt::Display for Dataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Envelope shared by every data endpoint.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ItemsResponse<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

/// One hour of market clearing price.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PriceItem {
    pub date: String,
    pub hour: String,
    pub price: f64,
    #[serde(default)]
    pub price_usd: Option<f64>,
    #[serde(default)]
    pub price_eur: Option<f64>,
}

/// One hour of realtime generation, split by source (MWh).
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerationItem {
    pub date: String,
    pub hour: String,
    pub total: f64,
    pub biomass: Option<f64>,
    pub fueloil: Option<f64>,
    pub geothermal: Option<f64>,
    pub dammed_hydro: Option<f64>,
    pub import_export: Option<f64>,
    pub lignite: Option<f64>,
    pub lng: Option<f64>,
    pub natural_gas: Option<f64>,
    pub naphta: Option<f64>,
    pub river: Option<f64>,
    pub sun: Option<f64>,
    pub wind: Option<f64>,
    pub wasteheat: Option<f64>,
    pub asphaltite_coal: Option<f64>,
    pub black_coal: Option<f64>,
    pub import_coal: Option<f64>,
}

/// One hour of realtime consumption. The API calls the hour field `time`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ConsumptionItem {
    pub date: String,
    pub time: String,
    pub consumption: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, FromRow, PartialEq)]
pub struct PriceRow {
    pub date: String,
    pub hour: String,
    pub price: f64,
    pub price_usd: Option<f64>,
    pub price_eur: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableCounts {
    pub mcp: i64,
    pub generation: i64,
    pub consumption: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DatasetStats {
    pub dataset: Dataset,
    pub count: i64,
    pub first_date: Option<String>,
    pub last_date: Option<String>,
}
