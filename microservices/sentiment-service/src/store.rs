//! Store access for the pipeline
//!
//! Every call is bounded by a timeout. Calls that fail because the store is
//! unreachable are retried a bounded number of times; rejected commands are
//! not. Creating a series or rule that already exists counts as success.

use lit_tsdb::{
    Aggregation, CompactionRule, DataPoint, SeriesEntry, SeriesOptions, Store, TsdbError,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::error::Result;

const RETRY_BACKOFF: Duration = Duration::from_millis(50);

#[derive(Clone)]
pub struct StoreClient {
    inner: Arc<dyn Store>,
    timeout: Duration,
    retries: u32,
}

impl StoreClient {
    pub fn new(inner: Arc<dyn Store>, timeout: Duration, retries: u32) -> Self {
        Self {
            inner,
            timeout,
            retries,
        }
    }

    async fn call<T, F, Fut>(&self, op: &'static str, f: F) -> std::result::Result<T, TsdbError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = lit_tsdb::Result<T>>,
    {
        let mut attempt = 0;
        loop {
            let result = match tokio::time::timeout(self.timeout, f()).await {
                Ok(result) => result,
                Err(_) => Err(TsdbError::Timeout(self.timeout)),
            };
            match result {
                Err(e) if e.is_unavailable() && attempt < self.retries => {
                    attempt += 1;
                    warn!(op, attempt, error = %e, "Store unavailable, retrying");
                    tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                }
                other => return other,
            }
        }
    }

    /// Create a series, treating an existing one as present
    #[instrument(skip(self, options))]
    pub async fn ensure_series(&self, key: &str, options: &SeriesOptions) -> Result<()> {
        match self
            .call("TS.CREATE", || self.inner.create_series(key, options))
            .await
        {
            Ok(()) => {
                info!(key, "Created series");
                Ok(())
            }
            Err(TsdbError::AlreadyExists(_)) => {
                info!(key, "Series already exists");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Create a compaction rule, treating an existing one as present
    #[instrument(skip(self), fields(source = %rule.source, dest = %rule.dest))]
    pub async fn ensure_rule(&self, rule: &CompactionRule) -> Result<()> {
        match self
            .call("TS.CREATERULE", || self.inner.create_compaction_rule(rule))
            .await
        {
            Ok(()) => {
                info!("Created compaction rule");
                Ok(())
            }
            Err(TsdbError::AlreadyExists(_)) => {
                info!("Compaction rule already exists");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self, entries), fields(entries = entries.len()))]
    pub async fn append_many(&self, entries: &[SeriesEntry]) -> Result<usize> {
        Ok(self
            .call("TS.MADD", || self.inner.append_many(entries))
            .await?)
    }

    #[instrument(skip(self))]
    pub async fn range_aggregate(
        &self,
        key: &str,
        from_ms: i64,
        to_ms: Option<i64>,
        aggregation: Aggregation,
        bucket_ms: i64,
    ) -> Result<Vec<DataPoint>> {
        Ok(self
            .call("TS.RANGE", || {
                self.inner
                    .range_aggregate(key, from_ms, to_ms, aggregation, bucket_ms)
            })
            .await?)
    }

    /// Newest sample; a series that was never created reads as empty
    pub async fn latest(&self, key: &str) -> Result<Option<DataPoint>> {
        match self.call("TS.GET", || self.inner.latest(key)).await {
            Ok(point) => Ok(point),
            Err(TsdbError::KeyNotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.call("GET", || self.inner.get(key)).await?)
    }

    pub async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        Ok(self.call("SET", || self.inner.set(key, value, ttl)).await?)
    }

    pub async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        Ok(self
            .call("SET NX", || self.inner.set_nx(key, value, ttl))
            .await?)
    }

    pub async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.call("DEL", || self.inner.delete(key)).await?)
    }

    pub async fn ping(&self) -> Result<()> {
        Ok(self.call("PING", || self.inner.ping()).await?)
    }
}
