//! Time-series data types

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Conflict rule applied when a sample lands on an existing timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    Block,
    First,
    Last,
    Min,
    Max,
    Sum,
}

impl DuplicatePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            DuplicatePolicy::Block => "block",
            DuplicatePolicy::First => "first",
            DuplicatePolicy::Last => "last",
            DuplicatePolicy::Min => "min",
            DuplicatePolicy::Max => "max",
            DuplicatePolicy::Sum => "sum",
        }
    }

    /// Resolve a conflict; `None` means the write is rejected
    pub fn resolve(&self, existing: f64, incoming: f64) -> Option<f64> {
        match self {
            DuplicatePolicy::Block => None,
            DuplicatePolicy::First => Some(existing),
            DuplicatePolicy::Last => Some(incoming),
            DuplicatePolicy::Min => Some(existing.min(incoming)),
            DuplicatePolicy::Max => Some(existing.max(incoming)),
            DuplicatePolicy::Sum => Some(existing + incoming),
        }
    }
}

/// Bucket aggregation function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    Avg,
    Sum,
    Min,
    Max,
    Count,
    First,
    Last,
}

impl Aggregation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Aggregation::Avg => "avg",
            Aggregation::Sum => "sum",
            Aggregation::Min => "min",
            Aggregation::Max => "max",
            Aggregation::Count => "count",
            Aggregation::First => "first",
            Aggregation::Last => "last",
        }
    }

    /// Aggregate values given in timestamp order
    pub fn apply(&self, values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        let value = match self {
            Aggregation::Avg => values.iter().sum::<f64>() / values.len() as f64,
            Aggregation::Sum => values.iter().sum(),
            Aggregation::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            Aggregation::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Aggregation::Count => values.len() as f64,
            Aggregation::First => values[0],
            Aggregation::Last => values[values.len() - 1],
        };
        Some(value)
    }
}

/// Options for creating a series
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesOptions {
    pub duplicate_policy: DuplicatePolicy,
    /// Samples older than the newest sample minus this are dropped
    pub retention: Option<Duration>,
    pub labels: Vec<(String, String)>,
}

impl Default for SeriesOptions {
    fn default() -> Self {
        Self {
            duplicate_policy: DuplicatePolicy::First,
            retention: None,
            labels: Vec::new(),
        }
    }
}

impl SeriesOptions {
    pub fn with_duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicate_policy = policy;
        self
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = Some(retention);
        self
    }

    pub fn with_label(mut self, name: &str, value: &str) -> Self {
        self.labels.push((name.to_string(), value.to_string()));
        self
    }
}

/// Standing roll-up from a fine series into a coarser one
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactionRule {
    pub source: String,
    pub dest: String,
    pub aggregation: Aggregation,
    pub bucket_ms: i64,
}

/// One write in a batched append
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesEntry {
    pub key: String,
    pub timestamp_ms: i64,
    pub value: f64,
}

impl SeriesEntry {
    pub fn new(key: impl Into<String>, timestamp_ms: i64, value: f64) -> Self {
        Self {
            key: key.into(),
            timestamp_ms,
            value,
        }
    }
}

/// A `(timestamp, value)` pair read back from a series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub timestamp_ms: i64,
    pub value: f64,
}

impl DataPoint {
    pub fn new(timestamp_ms: i64, value: f64) -> Self {
        Self {
            timestamp_ms,
            value,
        }
    }
}

/// Epoch-aligned start of the bucket containing `timestamp_ms`
pub fn bucket_start(timestamp_ms: i64, bucket_ms: i64) -> i64 {
    timestamp_ms - timestamp_ms.rem_euclid(bucket_ms)
}
