use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;
use tracing::{info, warn};

use super::auth::TicketProvider;
use super::error::FetchError;
use super::MarketSource;
use crate::config::Config;
use crate::core::chunking::{wire_timestamp, DateRange};
use crate::core::rate_limiter::RateLimiter;
use crate::models::{ConsumptionItem, Dataset, GenerationItem, ItemsResponse, PriceItem};

/// Client for the EPİAŞ transparency data service.
pub struct EpiasClient {
    client: Client,
    base_url: String,
    tickets: TicketProvider,
}

impl EpiasClient {
    pub fn new(base_url: impl Into<String>, tickets: TicketProvider, timeout: Duration) -> Result<Self, FetchError> {
        // The CAS login answers with a redirect-style Location we must read, not follow.
        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tickets,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, FetchError> {
        let tickets = match &config.ticket {
            Some(ticket) => TicketProvider::fixed(ticket.clone()),
            None => TicketProvider::login(
                config.login_url.clone(),
                config.username.clone(),
                config.password.clone(),
            ),
        };
        Self::new(config.base_url.clone(), tickets, config.request_timeout)
    }

    /// One request for `range`. The caller keeps the range within the dataset limit.
    pub async fn fetch<T: DeserializeOwned>(&self, dataset: Dataset, range: DateRange) -> Result<Vec<T>, FetchError> {
        let ticket = self.tickets.ticket(&self.client).await?;

        let items = match self.post_range::<T>(dataset, range, &ticket).await {
            Err(e) if e.is_unauthorized() && self.tickets.is_refreshable() => {
                warn!(dataset = %dataset, "Ticket rejected, logging in again");
                self.tickets.invalidate().await;
                let ticket = self.tickets.ticket(&self.client).await?;
                self.post_range::<T>(dataset, range, &ticket).await?
            }
            other => other?,
        };

        info!(dataset = %dataset, items = items.len(), "✅ {} data fetched ({})", dataset, range);
        Ok(items)
    }

    async fn post_range<T: DeserializeOwned>(
        &self,
        dataset: Dataset,
        range: DateRange,
        ticket: &str,
    ) -> Result<Vec<T>, FetchError> {
        let url = format!("{}{}", self.base_url, dataset.path());
        let body = json!({
            "startDate": wire_timestamp(range.start),
            "endDate": wire_timestamp(range.end),
        });

        let resp = self
            .client
            .post(&url)
            .header("TGT", ticket)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(dataset = %dataset, status = status.as_u16(), url = %url, "❌ EPİAŞ API error");
            return Err(FetchError::Status { dataset: dataset.label(), status, body });
        }

        let payload: ItemsResponse<T> = resp.json().await?;
        Ok(payload.items)
    }

    /// Fetches a range of any length by splitting it at the dataset's limit.
    /// Chunks are requested in order with a pause in between; the first
    /// failing chunk aborts the whole call.
    pub async fn fetch_chunked<T: DeserializeOwned>(
        &self,
        dataset: Dataset,
        range: DateRange,
        pause: Duration,
    ) -> Result<Vec<T>, FetchError> {
        let chunks = range.split(dataset.max_days());
        let total = chunks.len();
        let mut all_items = Vec::new();

        for (index, chunk) in chunks.into_iter().enumerate() {
            info!("📦 {} chunk {}/{}: {}", dataset, index + 1, total, chunk);
            let items = self.fetch::<T>(dataset, chunk).await?;
            all_items.extend(items);

            if index + 1 < total {
                RateLimiter::wait(pause).await;
            }
        }

        info!(dataset = %dataset, items = all_items.len(), "Total {} items fetched", dataset);
        Ok(all_items)
    }

    pub async fn fetch_prices_chunked(&self, range: DateRange, pause: Duration) -> Result<Vec<PriceItem>, FetchError> {
        self.fetch_chunked(Dataset::Price, range, pause).await
    }

    pub async fn fetch_generation_chunked(&self, range: DateRange, pause: Duration) -> Result<Vec<GenerationItem>, FetchError> {
        self.fetch_chunked(Dataset::Generation, range, pause).await
    }

    pub async fn fetch_consumption_chunked(&self, range: DateRange, pause: Duration) -> Result<Vec<ConsumptionItem>, FetchError> {
        self.fetch_chunked(Dataset::Consumption, range, pause).await
    }
}

#[async_trait]
impl MarketSource for EpiasClient {
    fn name(&self) -> &str {
        "epias"
    }

    async fn fetch_prices(&self, range: DateRange) -> Result<Vec<PriceItem>, FetchError> {
        self.fetch(Dataset::Price, range).await
    }

    async fn fetch_generation(&self, range: DateRange) -> Result<Vec<GenerationItem>, FetchError> {
        self.fetch(Dataset::Generation, range).await
    }

    async fn fetch_consumption(&self, range: DateRange) -> Result<Vec<ConsumptionItem>, FetchError> {
        self.fetch(Dataset::Consumption, range).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn client_for(server: &Server, tickets: TicketProvider) -> EpiasClient {
        EpiasClient::new(server.url(), tickets, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_prices_sends_range_and_ticket() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/markets/dam/data/mcp")
            .match_header("tgt", "test-tgt-token")
            .match_body(Matcher::Json(json!({
                "startDate": "2025-10-28T00:00:00+03:00",
                "endDate": "2025-10-28T00:00:00+03:00"
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "items": [
                        { "date": "2025-10-28T00:00:00+03:00", "hour": "00:00", "price": 2500.50, "priceUsd": 85.20, "priceEur": 78.40 },
                        { "date": "2025-10-28T01:00:00+03:00", "hour": "01:00", "price": 2300.00, "priceUsd": 78.50, "priceEur": 72.10 }
                    ]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = client_for(&server, TicketProvider::fixed("test-tgt-token"));
        let range = DateRange::parse("2025-10-28", "2025-10-28").unwrap();
        let items = client.fetch_prices(range).await.unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].price, 2500.50);
        assert_eq!(items[1].price_eur, Some(72.10));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_consumption_uses_time_field() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/v1/consumption/data/realtime-consumption")
            .with_status(200)
            .with_body(r#"{"items":[{"date":"2024-10-15T00:00:00+03:00","time":"00:00","consumption":31250.4}]}"#)
            .create_async()
            .await;

        let client = client_for(&server, TicketProvider::fixed("t"));
        let items = client
            .fetch_consumption(DateRange::parse("2024-10-15", "2024-10-15").unwrap())
            .await
            .unwrap();

        assert_eq!(items[0].time, "00:00");
        assert_eq!(items[0].consumption, 31250.4);
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/v1/generation/data/realtime-generation")
            .with_status(500)
            .with_body("upstream down")
            .create_async()
            .await;

        let client = client_for(&server, TicketProvider::fixed("t"));
        let result = client
            .fetch_generation(DateRange::parse("2024-10-15", "2024-10-16").unwrap())
            .await;

        match result {
            Err(FetchError::Status { dataset, status, body }) => {
                assert_eq!(dataset, "Generation");
                assert_eq!(status.as_u16(), 500);
                assert_eq!(body, "upstream down");
            }
            other => panic!("unexpected result: {:?}", other.map(|v| v.len())),
        }
    }

    #[tokio::test]
    async fn test_generation_chunked_by_thirty_days() {
        let mut server = Server::new_async().await;
        let first = server
            .mock("POST", "/v1/generation/data/realtime-generation")
            .match_body(Matcher::Json(json!({
                "startDate": "2024-01-01T00:00:00+03:00",
                "endDate": "2024-01-30T00:00:00+03:00"
            })))
            .with_status(200)
            .with_body(r#"{"items":[{"date":"2024-01-01T00:00:00+03:00","hour":"00:00","total":30000.0,"sun":0.0,"dammedHydro":4000.0}]}"#)
            .create_async()
            .await;
        let second = server
            .mock("POST", "/v1/generation/data/realtime-generation")
            .match_body(Matcher::Json(json!({
                "startDate": "2024-01-31T00:00:00+03:00",
                "endDate": "2024-02-14T00:00:00+03:00"
            })))
            .with_status(200)
            .with_body(r#"{"items":[{"date":"2024-01-31T00:00:00+03:00","hour":"00:00","total":31000.0,"wind":5000.0}]}"#)
            .create_async()
            .await;

        let client = client_for(&server, TicketProvider::fixed("t"));
        let range = DateRange::parse("2024-01-01", "2024-02-14").unwrap();
        let items = client.fetch_generation_chunked(range, Duration::ZERO).await.unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].dammed_hydro, Some(4000.0));
        assert_eq!(items[1].wind, Some(5000.0));
        assert_eq!(items[1].sun, None);
        first.assert_async().await;
        second.assert_async().await;
    }

    #[tokio::test]
    async fn test_first_failed_chunk_aborts_chunked_fetch() {
        let mut server = Server::new_async().await;
        let first = server
            .mock("POST", "/v1/generation/data/realtime-generation")
            .match_body(Matcher::Json(json!({
                "startDate": "2024-01-01T00:00:00+03:00",
                "endDate": "2024-01-30T00:00:00+03:00"
            })))
            .with_status(500)
            .with_body("boom")
            .expect(1)
            .create_async()
            .await;
        let second = server
            .mock("POST", "/v1/generation/data/realtime-generation")
            .match_body(Matcher::Json(json!({
                "startDate": "2024-01-31T00:00:00+03:00",
                "endDate": "2024-02-14T00:00:00+03:00"
            })))
            .with_status(200)
            .with_body(r#"{"items":[]}"#)
            .expect(0)
            .create_async()
            .await;

        let client = client_for(&server, TicketProvider::fixed("t"));
        let range = DateRange::parse("2024-01-01", "2024-02-14").unwrap();
        let result = client.fetch_generation_chunked(range, Duration::ZERO).await;

        assert!(matches!(result, Err(FetchError::Status { status, .. }) if status.as_u16() == 500));
        first.assert_async().await;
        second.assert_async().await;
    }

    #[tokio::test]
    async fn test_prices_chunked_by_year() {
        let mut server = Server::new_async().await;
        let first = server
            .mock("POST", "/v1/markets/dam/data/mcp")
            .match_body(Matcher::Json(json!({
                "startDate": "2024-01-01T00:00:00+03:00",
                "endDate": "2024-12-30T00:00:00+03:00"
            })))
            .with_status(200)
            .with_body(r#"{"items":[{"date":"2024-01-01T00:00:00+03:00","hour":"00:00","price":1900.0}]}"#)
            .create_async()
            .await;
        let second = server
            .mock("POST", "/v1/markets/dam/data/mcp")
            .match_body(Matcher::Json(json!({
                "startDate": "2024-12-31T00:00:00+03:00",
                "endDate": "2025-01-10T00:00:00+03:00"
            })))
            .with_status(200)
            .with_body(r#"{"items":[{"date":"2025-01-10T23:00:00+03:00","hour":"23:00","price":2100.0}]}"#)
            .create_async()
            .await;

        let client = client_for(&server, TicketProvider::fixed("t"));
        let range = DateRange::parse("2024-01-01", "2025-01-10").unwrap();
        let items = client.fetch_prices_chunked(range, Duration::ZERO).await.unwrap();

        assert_eq!(items.iter().map(|i| i.price).collect::<Vec<_>>(), vec![1900.0, 2100.0]);
        assert_eq!(items[0].price_usd, None);
        first.assert_async().await;
        second.assert_async().await;
    }

    #[tokio::test]
    async fn test_consumption_chunked_single_request() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/consumption/data/realtime-consumption")
            .match_body(Matcher::Json(json!({
                "startDate": "2024-01-01T00:00:00+03:00",
                "endDate": "2024-03-31T00:00:00+03:00"
            })))
            .with_status(200)
            .with_body(r#"{"items":[{"date":"2024-01-01T00:00:00+03:00","time":"00:00","consumption":30100.0}]}"#)
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server, TicketProvider::fixed("t"));
        let range = DateRange::parse("2024-01-01", "2024-03-31").unwrap();
        let items = client.fetch_consumption_chunked(range, Duration::ZERO).await.unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].consumption, 30100.0);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_unauthorized_triggers_single_relogin() {
        let mut server = Server::new_async().await;
        let login = server
            .mock("POST", "/cas/v1/tickets")
            .with_status(201)
            .with_header("location", "/cas/v1/tickets/TGT-fresh")
            .expect(2)
            .create_async()
            .await;
        let rejected = server
            .mock("POST", "/v1/markets/dam/data/mcp")
            .with_status(401)
            .expect(2)
            .create_async()
            .await;

        let tickets = TicketProvider::login(
            format!("{}/cas/v1/tickets", server.url()),
            Some("u".into()),
            Some("p".into()),
        );
        let client = client_for(&server, tickets);
        let result = client
            .fetch_prices(DateRange::parse("2025-10-28", "2025-10-28").unwrap())
            .await;

        assert!(result.as_ref().is_err_and(|e| e.is_unauthorized()));
        login.assert_async().await;
        rejected.assert_async().await;
    }
}
