//! Key naming for everything the service keeps in the store

pub const DEFAULT_KEY_PREFIX: &str = "is-bitcoin-lit";

/// Metric names
pub const SENTIMENT: &str = "sentiment:mean";
pub const PRICE: &str = "price:mean";

/// Resolutions
pub const RAW: &str = "30s";
pub const HOURLY: &str = "1h";

/// Builds fully-qualified keys from a namespace prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    prefix: String,
}

impl Default for KeySpace {
    fn default() -> Self {
        Self::new(DEFAULT_KEY_PREFIX)
    }
}

impl KeySpace {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// `{prefix}:{metric}:{resolution}`
    pub fn series_key(&self, metric: &str, resolution: &str) -> String {
        format!("{}:{}:{}", self.prefix, metric, resolution)
    }

    /// Cached current-hour summary
    pub fn summary_key(&self) -> String {
        format!("{}:summary:hourly", self.prefix)
    }

    /// Cached windowed summary
    pub fn cache_key(&self) -> String {
        format!("{}:cache", self.prefix)
    }
}

/// Mutual-exclusion token guarding the computation of `cache_key`
pub fn lock_key(cache_key: &str) -> String {
    format!("{}:lock", cache_key)
}
