//! Decides when to fetch from the feed, and fetches

use chrono::{DateTime, Utc};
use lit_telemetry::{Counter, Gauge};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::error::Result;
use crate::ingestion::Ingestion;
use crate::keys::{KeySpace, RAW, SENTIMENT};
use crate::store::StoreClient;
use crate::upstream::SentimentSource;

#[derive(Clone)]
pub struct RefreshTrigger {
    source: Arc<dyn SentimentSource>,
    ingestion: Ingestion,
    store: StoreClient,
    clock: Arc<dyn Clock>,
    freshness_key: String,
    stale_after: Duration,
    fetches: Counter,
    last_batch: Gauge,
}

impl RefreshTrigger {
    pub fn new(
        source: Arc<dyn SentimentSource>,
        store: StoreClient,
        keys: &KeySpace,
        clock: Arc<dyn Clock>,
        stale_after: Duration,
    ) -> Self {
        Self {
            source,
            ingestion: Ingestion::new(store.clone(), keys),
            store,
            clock,
            freshness_key: keys.series_key(SENTIMENT, RAW),
            stale_after,
            fetches: Counter::new("upstream_fetches"),
            last_batch: Gauge::new("last_batch_size"),
        }
    }

    /// Upstream fetches issued so far
    pub fn fetches(&self) -> u64 {
        self.fetches.get()
    }

    /// Samples persisted by the most recent fetch
    pub fn last_batch(&self) -> u64 {
        self.last_batch.get()
    }

    /// True when no raw sample exists or the newest one is older than the
    /// staleness threshold
    pub async fn needs_refresh(&self) -> Result<bool> {
        let Some(newest) = self.store.latest(&self.freshness_key).await? else {
            return Ok(true);
        };
        let age_ms = self.clock.now_ms() - newest.timestamp_ms;
        debug!(age_ms, "Newest raw sample");
        Ok(age_ms > self.stale_after.as_millis() as i64)
    }

    /// Fetch the latest samples and persist them
    pub async fn refresh(&self) -> Result<usize> {
        self.fetches.inc();
        let samples = self.source.fetch_latest().await?;
        let persisted = self.ingestion.persist(&samples).await?;
        self.last_batch.set(persisted as u64);
        info!(persisted, "Refreshed from upstream");
        Ok(persisted)
    }

    /// Refresh only when the stored data is stale; returns whether it did
    pub async fn refresh_if_stale(&self) -> Result<bool> {
        if !self.needs_refresh().await? {
            return Ok(false);
        }
        self.refresh().await?;
        Ok(true)
    }

    /// Fetch and persist one hour of history
    pub async fn backfill(&self, hour: DateTime<Utc>) -> Result<usize> {
        self.fetches.inc();
        let samples = self.source.fetch_hour(hour).await?;
        let persisted = self.ingestion.persist(&samples).await?;
        self.last_batch.set(persisted as u64);
        info!(hour = %hour, persisted, "Backfilled hour");
        Ok(persisted)
    }
}
