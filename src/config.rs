use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://seffaflik.epias.com.tr/electricity-service";
pub const DEFAULT_LOGIN_URL: &str = "https://giris.epias.com.tr/cas/v1/tickets";

#[derive(Clone)]
pub struct Config {
    pub base_url: String,
    pub login_url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Pre-issued ticket. When present no login is attempted.
    pub ticket: Option<String>,
    pub request_timeout: Duration,
    pub database_path: PathBuf,
    pub forecasts_path: PathBuf,
    pub log_file: Option<PathBuf>,
    pub chunk_pause: Duration,
    pub sync_cron: String,
}

impl Config {
    /// Loads `.env` (if any) and reads the process environment.
    pub fn from_env() -> Result<Self> {
        // A missing .env is normal in production.
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let timeout_secs: u64 = parse_or(get("EPIAS_TIMEOUT_SECS"), "EPIAS_TIMEOUT_SECS", 30)?;
        let pause_ms: u64 = parse_or(get("SYNC_CHUNK_PAUSE_MS"), "SYNC_CHUNK_PAUSE_MS", 1000)?;

        // LOG_FILE is on by default; setting it to an empty string turns it off.
        let log_file = match lookup("LOG_FILE") {
            Some(v) if v.trim().is_empty() => None,
            Some(v) => Some(PathBuf::from(v.trim())),
            None => Some(PathBuf::from("logs/market-sync.log")),
        };

        Ok(Self {
            base_url: get("EPIAS_BASE_URL")
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            login_url: get("EPIAS_LOGIN_URL").unwrap_or_else(|| DEFAULT_LOGIN_URL.to_string()),
            username: get("EPIAS_USERNAME"),
            password: get("EPIAS_PASSWORD"),
            ticket: get("EPIAS_TGT"),
            request_timeout: Duration::from_secs(timeout_secs),
            database_path: get("DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data/energy.db")),
            forecasts_path: get("FORECASTS_JSON")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("public/forecasts.json")),
            log_file,
            chunk_pause: Duration::from_millis(pause_ms),
            sync_cron: get("SYNC_CRON").unwrap_or_else(|| "0 30 6 * * *".to_string()),
        })
    }
}

fn parse_or<T>(raw: Option<String>, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match raw {
        Some(v) => v.parse::<T>().with_context(|| format!("Invalid value for {}: '{}'", key, v)),
        None => Ok(default),
    }
}

// Credentials stay out of logs.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("base_url", &self.base_url)
            .field("login_url", &self.login_url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("ticket", &self.ticket.as_ref().map(|_| "***"))
            .field("request_timeout", &self.request_timeout)
            .field("database_path", &self.database_path)
            .field("forecasts_path", &self.forecasts_path)
            .field("log_file", &self.log_file)
            .field("chunk_pause", &self.chunk_pause)
            .field("sync_cron", &self.sync_cron)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.login_url, DEFAULT_LOGIN_URL);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.chunk_pause, Duration::from_millis(1000));
        assert_eq!(config.database_path, PathBuf::from("data/energy.db"));
        assert_eq!(config.log_file, Some(PathBuf::from("logs/market-sync.log")));
        assert!(config.ticket.is_none());
    }

    #[test]
    fn test_overrides_and_blank_values() {
        let config = config_from(&[
            ("EPIAS_BASE_URL", "http://localhost:1234/"),
            ("EPIAS_USERNAME", "trader"),
            ("EPIAS_PASSWORD", "   "),
            ("SYNC_CHUNK_PAUSE_MS", "0"),
            ("LOG_FILE", ""),
        ])
        .unwrap();

        assert_eq!(config.base_url, "http://localhost:1234");
        assert_eq!(config.username.as_deref(), Some("trader"));
        assert!(config.password.is_none());
        assert_eq!(config.chunk_pause, Duration::ZERO);
        assert!(config.log_file.is_none());
    }

    #[test]
    fn test_invalid_number_is_rejected() {
        let err = config_from(&[("EPIAS_TIMEOUT_SECS", "soon")]).unwrap_err();
        assert!(err.to_string().contains("EPIAS_TIMEOUT_SECS"));
    }

    #[test]
    fn test_debug_hides_secrets() {
        let config = config_from(&[("EPIAS_PASSWORD", "hunter2"), ("EPIAS_TGT", "TGT-abc")]).unwrap();
        let shown = format!("{:?}", config);
        assert!(!shown.contains("hunter2"));
        assert!(!shown.contains("TGT-abc"));
    }
}
