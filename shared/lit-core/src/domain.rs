//! Domain types for the sentiment pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One upstream observation.
///
/// Produced only by the upstream source and consumed once per ingestion call.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Seconds since the Unix epoch, fractional allowed
    pub timestamp: f64,
    pub sentiment_mean: f64,
    pub price: f64,
}

impl Sample {
    pub fn new(timestamp: f64, sentiment_mean: f64, price: f64) -> Self {
        Self {
            timestamp,
            sentiment_mean,
            price,
        }
    }

    /// Timestamp scaled to milliseconds, truncating sub-millisecond digits
    pub fn timestamp_ms(&self) -> i64 {
        (self.timestamp * 1000.0) as i64
    }
}

/// Direction of a series across a window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Rising,
    Falling,
    Flat,
}

impl Trend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trend::Rising => "rising",
            Trend::Falling => "falling",
            Trend::Flat => "flat",
        }
    }
}

impl std::fmt::Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One closed hourly bucket with both averages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyAverage {
    pub time: DateTime<Utc>,
    pub price: f64,
    pub sentiment: f64,
}

/// Summary of the hour that is still in progress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentPeriod {
    /// Start of the in-progress hour
    pub time: DateTime<Utc>,
    pub mean_sentiment: f64,
    pub mean_price: Option<f64>,
    /// True when mean sentiment is positive
    pub lit: bool,
}

/// Summary served by the read endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub hourly_average_of_averages: Vec<HourlyAverage>,
    pub sentiment_direction: Trend,
    pub price_direction: Trend,
    pub current_hour: Option<CurrentPeriod>,
    pub computed_at: DateTime<Utc>,
}
