//! Fetch, persist, aggregate and cache, wired together for the handlers

use chrono::{DateTime, Utc};
use lit_core::{CurrentPeriod, Summary};
use lit_telemetry::{Histogram, HistogramSnapshot};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

use crate::aggregator::Aggregator;
use crate::cache::{CacheMetrics, SummaryCache};
use crate::clock::Clock;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::keys::KeySpace;
use crate::refresh::RefreshTrigger;
use crate::store::StoreClient;
use crate::upstream::SentimentSource;

/// Outcome of an explicit refresh
#[derive(Debug, Clone, Serialize)]
pub struct RefreshReport {
    pub persisted: usize,
    pub hour: Option<DateTime<Utc>>,
    pub summary: Summary,
}

/// Counters reported on `/stats`
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStats {
    pub upstream_fetches: u64,
    pub last_batch_size: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_lock_waits: u64,
    pub compute_ms: HistogramSnapshot,
}

pub struct Pipeline {
    keys: KeySpace,
    cache: SummaryCache,
    aggregator: Aggregator,
    refresh: RefreshTrigger,
    cache_ttl: Duration,
    current_ttl: Duration,
    compute_ms: Histogram,
}

impl Pipeline {
    pub fn new(
        config: &Config,
        store: StoreClient,
        source: Arc<dyn SentimentSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let keys = KeySpace::new(config.key_prefix.clone());

        let mut cache = SummaryCache::new(store.clone());
        if config.single_flight {
            cache = cache.with_single_flight(config.store_timeout() + config.upstream_timeout());
        }

        Self {
            aggregator: Aggregator::new(
                store.clone(),
                keys.clone(),
                clock.clone(),
                config.window_hours,
            ),
            refresh: RefreshTrigger::new(source, store, &keys, clock, config.stale_after()),
            keys,
            cache,
            cache_ttl: config.cache_ttl(),
            current_ttl: config.current_ttl(),
            compute_ms: Histogram::new("summary_compute_ms"),
        }
    }

    /// Cached summary, computed on a miss
    pub async fn summary(&self) -> Result<Summary> {
        self.cache
            .get_or_compute(&self.keys.cache_key(), self.cache_ttl, || {
                self.compute_summary()
            })
            .await
    }

    /// Cached current-hour summary, computed on a miss
    pub async fn current(&self) -> Result<CurrentPeriod> {
        self.cache
            .get_or_compute(&self.keys.summary_key(), self.current_ttl, move || async move {
                self.refresh.refresh_if_stale().await?;
                self.aggregator
                    .current_period_summary()
                    .await?
                    .ok_or_else(|| Error::NotFound("no samples in the current hour".to_string()))
            })
            .await
    }

    /// Ingest now, either the latest samples or one hour of history, then
    /// recompute and overwrite the cached summary
    pub async fn force_refresh(&self, hour: Option<DateTime<Utc>>) -> Result<RefreshReport> {
        let persisted = match hour {
            Some(hour) => self.refresh.backfill(hour).await?,
            None => self.refresh.refresh().await?,
        };

        let summary = self.aggregator.compute_summary().await?;
        self.cache
            .set(&self.keys.cache_key(), &summary, self.cache_ttl)
            .await?;
        info!(persisted, "Cache warmed");

        Ok(RefreshReport {
            persisted,
            hour,
            summary,
        })
    }

    pub fn stats(&self) -> PipelineStats {
        let cache: &CacheMetrics = self.cache.metrics();
        PipelineStats {
            upstream_fetches: self.refresh.fetches(),
            last_batch_size: self.refresh.last_batch(),
            cache_hits: cache.hits.get(),
            cache_misses: cache.misses.get(),
            cache_lock_waits: cache.lock_waits.get(),
            compute_ms: self.compute_ms.snapshot(),
        }
    }

    async fn compute_summary(&self) -> Result<Summary> {
        let started = Instant::now();
        self.refresh.refresh_if_stale().await?;
        let summary = self.aggregator.compute_summary().await?;
        self.compute_ms
            .record(started.elapsed().as_secs_f64() * 1000.0);
        Ok(summary)
    }
}
