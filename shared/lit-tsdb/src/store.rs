//! Store contract

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::client::{ClientOptions, RedisTsClient};
use crate::memory::MemoryStore;
use crate::types::{Aggregation, CompactionRule, DataPoint, SeriesEntry, SeriesOptions};
use crate::{Result, TsdbError};

/// Time-series primitives offered by the external store
#[async_trait]
pub trait TimeSeriesStore: Send + Sync {
    /// Create a series. An existing series yields `TsdbError::AlreadyExists`.
    async fn create_series(&self, key: &str, options: &SeriesOptions) -> Result<()>;

    /// Create a compaction rule. An existing rule into `rule.dest` yields
    /// `TsdbError::AlreadyExists`.
    async fn create_compaction_rule(&self, rule: &CompactionRule) -> Result<()>;

    /// Append all entries in one batched write, returning how many were
    /// accepted. Any rejected entry fails the whole call.
    async fn append_many(&self, entries: &[SeriesEntry]) -> Result<usize>;

    /// Epoch-aligned bucket aggregates over `[from_ms, to_ms]`, ascending.
    /// `to_ms = None` reads to the newest sample.
    async fn range_aggregate(
        &self,
        key: &str,
        from_ms: i64,
        to_ms: Option<i64>,
        aggregation: Aggregation,
        bucket_ms: i64,
    ) -> Result<Vec<DataPoint>>;

    /// Newest sample of a series, if any
    async fn latest(&self, key: &str) -> Result<Option<DataPoint>>;
}

/// String key/value primitives with expiry
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;

    /// Set only when absent; returns whether the value was written
    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;

    async fn delete(&self, key: &str) -> Result<bool>;

    async fn ping(&self) -> Result<()>;
}

/// A backend offering both halves of the contract
pub trait Store: TimeSeriesStore + KeyValueStore {}

impl<T: TimeSeriesStore + KeyValueStore> Store for T {}

/// Open a store from a URL: `redis://[:password@]host[:port]` or `memory://`
pub fn open(url: &str, options: ClientOptions) -> Result<Arc<dyn Store>> {
    if url.starts_with("memory://") {
        tracing::info!("Using in-memory store");
        return Ok(Arc::new(MemoryStore::new()));
    }
    if url.starts_with("redis://") {
        return Ok(Arc::new(RedisTsClient::open(url, options)?));
    }
    Err(TsdbError::InvalidUrl(url.to_string()))
}
