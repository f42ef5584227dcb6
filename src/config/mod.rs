//! Configuration loading and management
//!
//! Values come from three layers, later layers winning:
//! 1. built-in defaults
//! 2. an optional YAML file named by `BSE_MONITOR_CONFIG`
//! 3. environment variables (after `.env` hydration)

use crate::core::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// Browser User-Agent sent to BSE and Yahoo, which reject bare clients
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Base URLs of every third-party API the service talks to
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub telegram_api: String,
    pub bse_announcements: String,
    pub bse_attachments: String,
    pub bse_referer: String,
    pub yahoo_chart: String,
    pub twitter_api: String,
    pub news_api: String,
    pub identity_toolkit: String,
    pub moneycontrol_rss: String,
    pub economic_times_rss: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            telegram_api: "https://api.telegram.org".to_string(),
            bse_announcements: "https://api.bseindia.com/BseIndiaAPI/api/AnnGetData/w".to_string(),
            bse_attachments: "https://www.bseindia.com/xml-data/corpfiling/AttachLive/"
                .to_string(),
            bse_referer: "https://www.bseindia.com/".to_string(),
            yahoo_chart: "https://query1.finance.yahoo.com/v8/finance/chart".to_string(),
            twitter_api: "https://api.twitter.com".to_string(),
            news_api: "https://newsapi.org".to_string(),
            identity_toolkit: "https://identitytoolkit.googleapis.com".to_string(),
            moneycontrol_rss: "https://www.moneycontrol.com/rss/business.xml".to_string(),
            economic_times_rss:
                "https://economictimes.indiatimes.com/markets/stocks/rssfeeds/2146842.cms"
                    .to_string(),
        }
    }
}

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,

    pub supabase_url: Option<String>,
    pub supabase_service_key: Option<String>,
    pub supabase_anon_key: Option<String>,

    pub telegram_bot_token: Option<String>,
    pub cron_secret_key: Option<String>,

    pub twitter_bearer_token: Option<String>,
    pub news_api_key: Option<String>,

    pub firebase_api_key: Option<String>,
    pub firebase_auth_domain: Option<String>,
    pub firebase_project_id: Option<String>,

    /// Seconds a Yahoo chart series stays cached
    pub yahoo_cache_ttl: u64,
    /// CSV with `BSE Code`, `Company Name`, `Yahoo Symbol` columns
    pub companies_csv: String,
    /// Minimum absolute hourly move, in percent, for a spike alert
    pub spike_threshold_pct: f64,
    /// Secret required by `/admin/purge`; purge is disabled when unset
    pub admin_purge_secret: Option<String>,
    /// Exposes `/debug/*` and `/test/*` routes
    pub debug_endpoints: bool,
    /// Marks the session cookie `Secure`
    pub secure_cookies: bool,

    pub endpoints: Endpoints,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            supabase_url: None,
            supabase_service_key: None,
            supabase_anon_key: None,
            telegram_bot_token: None,
            cron_secret_key: None,
            twitter_bearer_token: None,
            news_api_key: None,
            firebase_api_key: None,
            firebase_auth_domain: None,
            firebase_project_id: None,
            yahoo_cache_ttl: 60,
            companies_csv: "indian_stock_tickers.csv".to_string(),
            spike_threshold_pct: 3.0,
            admin_purge_secret: None,
            debug_endpoints: false,
            secure_cookies: false,
            endpoints: Endpoints::default(),
        }
    }
}

impl AppConfig {
    /// Load the full configuration: `.env`, optional YAML file, environment
    pub fn load() -> AppResult<Self> {
        hydrate_env_file()?;

        let mut config = match std::env::var("BSE_MONITOR_CONFIG") {
            Ok(path) if !path.trim().is_empty() => Self::from_yaml_file(path.trim())?,
            _ => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("cannot read {}: {}", path, e)))?;
        Self::from_yaml_str(&content)
    }

    /// Load configuration from a YAML string
    pub fn from_yaml_str(yaml: &str) -> AppResult<Self> {
        serde_yaml::from_str(yaml).map_err(|e| AppError::Config(format!("invalid YAML: {}", e)))
    }

    /// Override fields with environment values
    ///
    /// `lookup` abstracts the environment so tests never mutate process state.
    /// Blank values count as unset.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key).and_then(|v| {
                let trimmed = v.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            })
        };

        if let Some(host) = get("HOST") {
            self.host = host;
        }
        if let Some(port) = get("PORT").or_else(|| get("FLASK_RUN_PORT")) {
            match port.parse() {
                Ok(port) => self.port = port,
                Err(_) => tracing::warn!(value = %port, "ignoring invalid PORT"),
            }
        }

        let optional = [
            ("SUPABASE_URL", &mut self.supabase_url),
            ("SUPABASE_SERVICE_KEY", &mut self.supabase_service_key),
            ("SUPABASE_KEY", &mut self.supabase_anon_key),
            ("TELEGRAM_BOT_TOKEN", &mut self.telegram_bot_token),
            ("CRON_SECRET_KEY", &mut self.cron_secret_key),
            ("TWITTER_BEARER_TOKEN", &mut self.twitter_bearer_token),
            ("NEWS_API_KEY", &mut self.news_api_key),
            ("FIREBASE_API_KEY", &mut self.firebase_api_key),
            ("FIREBASE_AUTH_DOMAIN", &mut self.firebase_auth_domain),
            ("FIREBASE_PROJECT_ID", &mut self.firebase_project_id),
            ("ADMIN_PURGE_SECRET", &mut self.admin_purge_secret),
        ];
        for (key, slot) in optional {
            if let Some(value) = get(key) {
                *slot = Some(value);
            }
        }

        if let Some(ttl) = get("YAHOO_CACHE_TTL") {
            match ttl.parse() {
                Ok(ttl) => self.yahoo_cache_ttl = ttl,
                Err(_) => tracing::warn!(value = %ttl, "ignoring invalid YAHOO_CACHE_TTL"),
            }
        }
        if let Some(csv) = get("COMPANIES_CSV") {
            self.companies_csv = csv;
        }
        if let Some(threshold) = get("SPIKE_THRESHOLD_PCT") {
            match threshold.parse() {
                Ok(threshold) => self.spike_threshold_pct = threshold,
                Err(_) => tracing::warn!(value = %threshold, "ignoring invalid SPIKE_THRESHOLD_PCT"),
            }
        }
        if let Some(flag) = get("DEBUG_ENDPOINTS") {
            self.debug_endpoints = flag == "1" || flag.eq_ignore_ascii_case("true");
        }
        if let Some(flag) = get("SECURE_COOKIES") {
            self.secure_cookies = flag == "1" || flag.eq_ignore_ascii_case("true");
        }
    }

    /// Address to bind the HTTP server to
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn twitter_configured(&self) -> bool {
        self.twitter_bearer_token.is_some()
    }

    pub fn news_configured(&self) -> bool {
        self.news_api_key.is_some()
    }

    pub fn telegram_configured(&self) -> bool {
        self.telegram_bot_token.is_some()
    }

    pub fn supabase_configured(&self) -> bool {
        self.supabase_url.is_some() && self.supabase_service_key.is_some()
    }
}

/// Load `.env` into the process environment; a missing file is fine
pub fn hydrate_env_file() -> AppResult<()> {
    match dotenvy::dotenv() {
        Ok(_) => Ok(()),
        Err(dotenvy::Error::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(AppError::Config(format!("failed to load .env file: {}", err))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.port, 5000);
        assert_eq!(config.yahoo_cache_ttl, 60);
        assert!(!config.twitter_configured());
        assert!(!config.news_configured());
        assert!(!config.debug_endpoints);
    }

    #[test]
    fn test_env_overrides_credentials() {
        let mut config = AppConfig::default();
        config.apply_env(env(&[
            ("TWITTER_BEARER_TOKEN", "AAAA-token"),
            ("NEWS_API_KEY", "  news-key  "),
            ("PORT", "8080"),
        ]));

        assert_eq!(config.twitter_bearer_token.as_deref(), Some("AAAA-token"));
        assert_eq!(config.news_api_key.as_deref(), Some("news-key"));
        assert_eq!(config.port, 8080);
        assert!(config.twitter_configured());
    }

    #[test]
    fn test_blank_env_values_are_ignored() {
        let mut config = AppConfig::default();
        config.apply_env(env(&[("TELEGRAM_BOT_TOKEN", "   "), ("PORT", "")]));
        assert!(config.telegram_bot_token.is_none());
        assert_eq!(config.port, 5000);
    }

    #[test]
    fn test_flask_port_fallback() {
        let mut config = AppConfig::default();
        config.apply_env(env(&[("FLASK_RUN_PORT", "5050")]));
        assert_eq!(config.port, 5050);
    }

    #[test]
    fn test_invalid_numbers_keep_defaults() {
        let mut config = AppConfig::default();
        config.apply_env(env(&[
            ("PORT", "not-a-port"),
            ("YAHOO_CACHE_TTL", "soon"),
            ("SPIKE_THRESHOLD_PCT", "big"),
        ]));
        assert_eq!(config.port, 5000);
        assert_eq!(config.yahoo_cache_ttl, 60);
        assert_eq!(config.spike_threshold_pct, 3.0);
    }

    #[test]
    fn test_yaml_then_env() {
        let mut config = AppConfig::from_yaml_str(
            r#"
port: 7000
spike_threshold_pct: 5.5
endpoints:
  telegram_api: "http://127.0.0.1:9999"
"#,
        )
        .unwrap();
        assert_eq!(config.port, 7000);
        assert_eq!(config.endpoints.telegram_api, "http://127.0.0.1:9999");
        // untouched endpoints keep their defaults
        assert_eq!(config.endpoints.news_api, "https://newsapi.org");

        config.apply_env(env(&[("PORT", "7100"), ("DEBUG_ENDPOINTS", "1")]));
        assert_eq!(config.port, 7100);
        assert_eq!(config.spike_threshold_pct, 5.5);
        assert!(config.debug_endpoints);
    }

    #[test]
    fn test_invalid_yaml_is_config_error() {
        let err = AppConfig::from_yaml_str("port: [").unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }
}
