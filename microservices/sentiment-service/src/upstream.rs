//! Client for the SentiCrypt Bitcoin sentiment feed
//!
//! Rows carry `timestamp`, `mean` and `btc_price`. Depending on the endpoint
//! these arrive as JSON numbers or as numeric strings.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lit_core::Sample;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::error::{Error, Result};

pub const HISTORY_TIME_FORMAT: &str = "%Y-%m-%d_%H";

/// Source of sentiment samples
#[async_trait]
pub trait SentimentSource: Send + Sync {
    /// Most recent samples published by the feed
    async fn fetch_latest(&self) -> Result<Vec<Sample>>;

    /// Samples recorded during the hour starting at `hour`
    async fn fetch_hour(&self, hour: DateTime<Utc>) -> Result<Vec<Sample>>;
}

pub struct SentiCryptClient {
    http: reqwest::Client,
    latest_url: String,
    history_url: String,
}

impl SentiCryptClient {
    pub fn new(latest_url: &str, history_url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("HTTP client: {}", e)))?;

        Ok(Self {
            http,
            latest_url: latest_url.to_string(),
            history_url: history_url.to_string(),
        })
    }

    pub fn history_url_for(&self, hour: DateTime<Utc>) -> String {
        self.history_url
            .replace("{time}", &hour.format(HISTORY_TIME_FORMAT).to_string())
    }

    #[instrument(skip(self))]
    async fn get_samples(&self, url: &str) -> Result<Vec<Sample>> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::UpstreamFetch(e.to_string()))?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::UpstreamFetch(format!("invalid body: {}", e)))?;

        let samples = parse_samples(&body)?;
        debug!(count = samples.len(), "Fetched samples");
        Ok(samples)
    }
}

#[async_trait]
impl SentimentSource for SentiCryptClient {
    async fn fetch_latest(&self) -> Result<Vec<Sample>> {
        self.get_samples(&self.latest_url).await
    }

    async fn fetch_hour(&self, hour: DateTime<Utc>) -> Result<Vec<Sample>> {
        let url = self.history_url_for(hour);
        self.get_samples(&url).await
    }
}

/// Map a feed response onto samples. One bad row fails the whole batch.
pub fn parse_samples(body: &Value) -> Result<Vec<Sample>> {
    let rows = body
        .as_array()
        .ok_or_else(|| Error::UpstreamFetch("expected a JSON array of samples".to_string()))?;

    rows.iter()
        .enumerate()
        .map(|(index, row)| {
            Ok(Sample::new(
                number_field(row, index, "timestamp")?,
                number_field(row, index, "mean")?,
                number_field(row, index, "btc_price")?,
            ))
        })
        .collect()
}

fn number_field(row: &Value, index: usize, name: &str) -> Result<f64> {
    let value = match row.get(name) {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    value.filter(|v| v.is_finite()).ok_or_else(|| {
        Error::MalformedSample(format!(
            "row {}: `{}` missing or not numeric",
            index, name
        ))
    })
}
