use super::error::FetchError;
use reqwest::header::LOCATION;
use reqwest::Client;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Where session tickets come from.
enum TicketSource {
    /// Issued out of band; used as is and never refreshed.
    Static(String),
    /// Obtained from the CAS login service and cached until rejected.
    Login {
        url: String,
        username: Option<String>,
        password: Option<String>,
        cached: Mutex<Option<String>>,
    },
}

/// Supplies the `TGT` header value for data requests.
pub struct TicketProvider {
    source: TicketSource,
}

impl TicketProvider {
    pub fn fixed(ticket: impl Into<String>) -> Self {
        Self { source: TicketSource::Static(ticket.into()) }
    }

    pub fn login(url: impl Into<String>, username: Option<String>, password: Option<String>) -> Self {
        Self {
            source: TicketSource::Login {
                url: url.into(),
                username,
                password,
                cached: Mutex::new(None),
            },
        }
    }

    pub fn is_refreshable(&self) -> bool {
        matches!(self.source, TicketSource::Login { .. })
    }

    /// Current ticket, logging in first when none is cached.
    pub async fn ticket(&self, client: &Client) -> Result<String, FetchError> {
        match &self.source {
            TicketSource::Static(ticket) => Ok(ticket.clone()),
            TicketSource::Login { url, username, password, cached } => {
                let mut guard = cached.lock().await;
                if let Some(ticket) = guard.as_ref() {
                    return Ok(ticket.clone());
                }

                let (Some(username), Some(password)) = (username.as_deref(), password.as_deref()) else {
                    return Err(FetchError::MissingCredentials);
                };

                info!("🔐 No TGT cached, logging in to EPİAŞ...");
                let ticket = request_ticket(client, url, username, password).await?;
                *guard = Some(ticket.clone());
                Ok(ticket)
            }
        }
    }

    /// Drops a cached ticket so the next call logs in again.
    pub async fn invalidate(&self) {
        if let TicketSource::Login { cached, .. } = &self.source {
            cached.lock().await.take();
        }
    }
}

/// Logs in to the CAS ticket endpoint and extracts the ticket-granting ticket.
///
/// The service answers `201 Created` with the ticket in the `Location`
/// header; some deployments put it in the body instead, so both are searched.
/// The client must not follow redirects.
pub async fn request_ticket(
    client: &Client,
    url: &str,
    username: &str,
    password: &str,
) -> Result<String, FetchError> {
    let resp = client
        .post(url)
        .form(&[("username", username), ("password", password)])
        .send()
        .await?;

    let status = resp.status();
    info!(status = status.as_u16(), "EPİAŞ login status");

    if !(200..400).contains(&status.as_u16()) {
        let body = resp.text().await.unwrap_or_default();
        warn!(status = status.as_u16(), body = %preview(&body, 300), "EPİAŞ login rejected");
        return Err(FetchError::LoginRejected(status));
    }

    if let Some(location) = resp.headers().get(LOCATION).and_then(|v| v.to_str().ok()) {
        debug!(location, "Login Location header");
        if let Some(ticket) = find_ticket(location) {
            info!("✅ TGT obtained from Location header");
            return Ok(ticket.to_string());
        }
        warn!("Location header present but no TGT pattern found");
    }

    let body = resp.text().await.unwrap_or_default();
    match find_ticket(&body) {
        Some(ticket) => {
            info!("✅ TGT obtained from response body");
            Ok(ticket.to_string())
        }
        None => {
            warn!(body = %preview(&body, 500), "❌ TGT token not found in login response");
            Err(FetchError::TicketNotFound)
        }
    }
}

/// First `TGT-[A-Za-z0-9-]+` token in `text`.
pub fn find_ticket(text: &str) -> Option<&str> {
    let mut search_from = 0;
    while let Some(offset) = text[search_from..].find("TGT-") {
        let start = search_from + offset;
        let tail = &text[start + 4..];
        let len = tail
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-'))
            .unwrap_or(tail.len());
        if len > 0 {
            return Some(&text[start..start + 4 + len]);
        }
        search_from = start + 4;
    }
    None
}

fn preview(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn no_redirect_client() -> Client {
        Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap()
    }

    #[test]
    fn test_find_ticket() {
        assert_eq!(
            find_ticket("https://giris.epias.com.tr/cas/v1/tickets/TGT-1234-abcDEF-cas01"),
            Some("TGT-1234-abcDEF-cas01")
        );
        assert_eq!(
            find_ticket(r#"<form action="/cas/v1/tickets/TGT-9-xyz">"#),
            Some("TGT-9-xyz")
        );
        assert_eq!(find_ticket("TGT- TGT-ok"), Some("TGT-ok"));
        assert_eq!(find_ticket("no ticket here"), None);
    }

    #[tokio::test]
    async fn test_ticket_from_location_header() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/cas/v1/tickets")
            .match_header("content-type", "application/x-www-form-urlencoded")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("username".into(), "trader".into()),
                Matcher::UrlEncoded("password".into(), "s3cret&more".into()),
            ]))
            .with_status(201)
            .with_header("location", &format!("{}/cas/v1/tickets/TGT-42-abc", server.url()))
            .create_async()
            .await;

        let url = format!("{}/cas/v1/tickets", server.url());
        let ticket = request_ticket(&no_redirect_client(), &url, "trader", "s3cret&more")
            .await
            .unwrap();

        assert_eq!(ticket, "TGT-42-abc");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_ticket_from_body() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/cas/v1/tickets")
            .with_status(200)
            .with_body(r#"<html><form action="tickets/TGT-7-body-cas">"#)
            .create_async()
            .await;

        let url = format!("{}/cas/v1/tickets", server.url());
        let ticket = request_ticket(&no_redirect_client(), &url, "u", "p").await.unwrap();
        assert_eq!(ticket, "TGT-7-body-cas");
    }

    #[tokio::test]
    async fn test_login_rejected() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/cas/v1/tickets")
            .with_status(401)
            .create_async()
            .await;

        let url = format!("{}/cas/v1/tickets", server.url());
        let result = request_ticket(&no_redirect_client(), &url, "u", "bad").await;
        assert!(matches!(result, Err(FetchError::LoginRejected(s)) if s.as_u16() == 401));
    }

    #[tokio::test]
    async fn test_missing_ticket_in_response() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/cas/v1/tickets")
            .with_status(201)
            .with_header("location", "https://example.invalid/elsewhere")
            .with_body("created")
            .create_async()
            .await;

        let url = format!("{}/cas/v1/tickets", server.url());
        let result = request_ticket(&no_redirect_client(), &url, "u", "p").await;
        assert!(matches!(result, Err(FetchError::TicketNotFound)));
    }

    #[tokio::test]
    async fn test_provider_requires_credentials() {
        let provider = TicketProvider::login("http://localhost/unused", Some("u".into()), None);
        let result = provider.ticket(&no_redirect_client()).await;
        assert!(matches!(result, Err(FetchError::MissingCredentials)));
    }

    #[tokio::test]
    async fn test_provider_caches_and_invalidates() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/cas/v1/tickets")
            .with_status(201)
            .with_header("location", "/cas/v1/tickets/TGT-1-cached")
            .expect(2)
            .create_async()
            .await;

        let provider = TicketProvider::login(
            format!("{}/cas/v1/tickets", server.url()),
            Some("u".into()),
            Some("p".into()),
        );
        let client = no_redirect_client();

        assert_eq!(provider.ticket(&client).await.unwrap(), "TGT-1-cached");
        assert_eq!(provider.ticket(&client).await.unwrap(), "TGT-1-cached");
        provider.invalidate().await;
        assert_eq!(provider.ticket(&client).await.unwrap(), "TGT-1-cached");

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_static_ticket_is_used_as_is() {
        let provider = TicketProvider::fixed("TGT-static");
        assert!(!provider.is_refreshable());
        assert_eq!(provider.ticket(&no_redirect_client()).await.unwrap(), "TGT-static");
    }
}
