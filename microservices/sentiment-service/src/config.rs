//! Configuration for the sentiment service

use std::net::SocketAddr;
use std::time::Duration;

use crate::keys::DEFAULT_KEY_PREFIX;

pub const DEFAULT_SENTIMENT_API_URL: &str = "https://api.senticrypt.com/v1/bitcoin.json";
pub const DEFAULT_SENTIMENT_HISTORY_URL: &str =
    "https://api.senticrypt.com/v1/history/bitcoin-{time}.json";

/// Sentiment service configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP bind address
    pub http_bind: String,
    /// Store connection URL, `redis://...` or `memory://`
    pub store_url: String,
    /// Namespace for every key the service writes
    pub key_prefix: String,
    /// Upstream feed of the latest samples
    pub sentiment_api_url: String,
    /// Upstream per-hour history, `{time}` is replaced by `YYYY-MM-DD_HH`
    pub sentiment_history_url: String,
    /// TTL of the cached summary (seconds)
    pub cache_ttl_secs: u64,
    /// TTL of the cached current-hour summary (seconds)
    pub current_ttl_secs: u64,
    /// Closed hours included in the summary
    pub window_hours: u32,
    /// Age of the newest raw sample beyond which a miss refetches (seconds)
    pub stale_after_secs: u64,
    pub store_timeout_ms: u64,
    pub store_retries: u32,
    pub upstream_timeout_secs: u64,
    /// Guard cache misses with a lock in the store
    pub single_flight: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_bind: "0.0.0.0:8080".to_string(),
            store_url: "redis://127.0.0.1:6379".to_string(),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            sentiment_api_url: DEFAULT_SENTIMENT_API_URL.to_string(),
            sentiment_history_url: DEFAULT_SENTIMENT_HISTORY_URL.to_string(),
            cache_ttl_secs: 120,
            current_ttl_secs: 60,
            window_hours: 3,
            stale_after_secs: 120,
            store_timeout_ms: 2000,
            store_retries: 1,
            upstream_timeout_secs: 10,
            single_flight: false,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            http_bind: std::env::var("HTTP_BIND").unwrap_or(defaults.http_bind),
            store_url: std::env::var("STORE_URL").unwrap_or(defaults.store_url),
            key_prefix: std::env::var("KEY_PREFIX").unwrap_or(defaults.key_prefix),
            sentiment_api_url: std::env::var("SENTIMENT_API_URL")
                .unwrap_or(defaults.sentiment_api_url),
            sentiment_history_url: std::env::var("SENTIMENT_HISTORY_URL")
                .unwrap_or(defaults.sentiment_history_url),
            cache_ttl_secs: std::env::var("CACHE_TTL_SECS")
                .unwrap_or_else(|_| "120".to_string())
                .parse()?,
            current_ttl_secs: std::env::var("CURRENT_TTL_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()?,
            window_hours: std::env::var("WINDOW_HOURS")
                .unwrap_or_else(|_| "3".to_string())
                .parse()?,
            stale_after_secs: std::env::var("STALE_AFTER_SECS")
                .unwrap_or_else(|_| "120".to_string())
                .parse()?,
            store_timeout_ms: std::env::var("STORE_TIMEOUT_MS")
                .unwrap_or_else(|_| "2000".to_string())
                .parse()?,
            store_retries: std::env::var("STORE_RETRIES")
                .unwrap_or_else(|_| "1".to_string())
                .parse()?,
            upstream_timeout_secs: std::env::var("UPSTREAM_TIMEOUT_SECS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()?,
            single_flight: std::env::var("SINGLE_FLIGHT")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        })
    }

    /// Get socket address for binding
    pub fn bind_address(&self) -> anyhow::Result<SocketAddr> {
        self.http_bind
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid bind address {}: {}", self.http_bind, e))
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn current_ttl(&self) -> Duration {
        Duration::from_secs(self.current_ttl_secs)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }
}
