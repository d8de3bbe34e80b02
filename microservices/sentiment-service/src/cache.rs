//! Read-through summary cache
//!
//! Entries are JSON strings with a store-side TTL. On a miss the value is
//! computed by the caller's closure and written back in a spawned task, so
//! the response does not wait for the write.
//!
//! Concurrent misses may each compute the value; computations must be safe
//! to run twice. With single-flight enabled a miss first takes a lock keyed
//! by the cache key. Callers that lose the race poll the cache until the
//! winner publishes. If the lock is released with nothing published, or the
//! lock TTL runs out, they compute themselves.

use lit_telemetry::Counter;
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::keys::lock_key;
use crate::store::StoreClient;

const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Cache counters exposed on `/stats`
#[derive(Clone)]
pub struct CacheMetrics {
    pub hits: Counter,
    pub misses: Counter,
    pub lock_waits: Counter,
}

impl Default for CacheMetrics {
    fn default() -> Self {
        Self {
            hits: Counter::new("cache_hits"),
            misses: Counter::new("cache_misses"),
            lock_waits: Counter::new("cache_lock_waits"),
        }
    }
}

#[derive(Clone)]
pub struct SummaryCache {
    store: StoreClient,
    single_flight: bool,
    lock_ttl: Duration,
    metrics: CacheMetrics,
}

impl SummaryCache {
    pub fn new(store: StoreClient) -> Self {
        Self {
            store,
            single_flight: false,
            lock_ttl: Duration::from_secs(10),
            metrics: CacheMetrics::default(),
        }
    }

    /// Serialize misses per key. `lock_ttl` bounds both how long a crashed
    /// holder blocks others and how long losers wait.
    pub fn with_single_flight(mut self, lock_ttl: Duration) -> Self {
        self.single_flight = true;
        self.lock_ttl = lock_ttl;
        self
    }

    pub fn metrics(&self) -> &CacheMetrics {
        &self.metrics
    }

    /// Cached value, or `None` when absent, expired or unreadable
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let Some(raw) = self.store.get(key).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!(key, error = %e, "Ignoring unreadable cache entry");
                Ok(None)
            }
        }
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        self.store.set(key, &raw, Some(ttl)).await
    }

    /// Serialize now and write in the background. The entry is written whole
    /// or not at all; a failed write is only logged.
    pub fn set_deferred<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<JoinHandle<()>> {
        let raw = serde_json::to_string(value)?;
        let store = self.store.clone();
        let key = key.to_string();
        Ok(tokio::spawn(async move {
            if let Err(e) = store.set(&key, &raw, Some(ttl)).await {
                warn!(key = %key, error = %e, "Deferred cache write failed");
            }
        }))
    }

    pub async fn get_or_compute<T, F, Fut>(&self, key: &str, ttl: Duration, compute: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(hit) = self.get(key).await? {
            self.metrics.hits.inc();
            debug!(key, "Cache hit");
            return Ok(hit);
        }
        self.metrics.misses.inc();
        debug!(key, "Cache miss");

        if !self.single_flight {
            let value = compute().await?;
            self.set_deferred(key, &value, ttl)?;
            return Ok(value);
        }

        let lock = lock_key(key);
        let token = Uuid::new_v4().to_string();
        if self.store.set_nx(&lock, &token, self.lock_ttl).await? {
            let result = self.compute_and_publish(key, ttl, compute).await;
            self.release(&lock, &token).await;
            return result;
        }

        self.metrics.lock_waits.inc();
        if let Some(value) = self.wait_for(key, &lock).await? {
            return Ok(value);
        }
        warn!(key, "Lock holder did not publish, computing");
        let value = compute().await?;
        self.set_deferred(key, &value, ttl)?;
        Ok(value)
    }

    /// Publish before releasing the lock so waiters find the value
    async fn compute_and_publish<T, F, Fut>(&self, key: &str, ttl: Duration, compute: F) -> Result<T>
    where
        T: Serialize,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let value = compute().await?;
        self.set(key, &value, ttl).await?;
        Ok(value)
    }

    /// Poll until the value appears or the lock is gone
    async fn wait_for<T: DeserializeOwned>(&self, key: &str, lock: &str) -> Result<Option<T>> {
        let deadline = tokio::time::Instant::now() + self.lock_ttl;
        while tokio::time::Instant::now() < deadline {
            tokio::time::sleep(LOCK_POLL_INTERVAL).await;
            if let Some(value) = self.get(key).await? {
                return Ok(Some(value));
            }
            if self.store.get(lock).await?.is_none() {
                // The holder publishes before releasing; read once more in
                // case both happened since the check above
                debug!(key, "Cache lock released");
                return self.get(key).await;
            }
        }
        Ok(None)
    }

    /// Delete the lock if it still holds our token
    async fn release(&self, lock: &str, token: &str) {
        match self.store.get(lock).await {
            Ok(Some(current)) if current == token => {
                if let Err(e) = self.store.delete(lock).await {
                    warn!(lock, error = %e, "Failed to release cache lock");
                }
            }
            Ok(_) => debug!(lock, "Cache lock expired before release"),
            Err(e) => warn!(lock, error = %e, "Failed to release cache lock"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use lit_core::{CurrentPeriod, HourlyAverage, Summary, Trend};
    use lit_tsdb::MemoryStore;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn cache() -> SummaryCache {
        SummaryCache::new(StoreClient::new(
            Arc::new(MemoryStore::new()),
            Duration::from_secs(1),
            0,
        ))
    }

    fn summary() -> Summary {
        let time = Utc.with_ymd_and_hms(2021, 7, 7, 9, 0, 0).unwrap();
        Summary {
            hourly_average_of_averages: vec![HourlyAverage {
                time,
                price: 34_261.173_912_8,
                sentiment: 0.123_456_789,
            }],
            sentiment_direction: Trend::Rising,
            price_direction: Trend::Falling,
            current_hour: Some(CurrentPeriod {
                time,
                mean_sentiment: -0.02,
                mean_price: Some(34_000.5),
                lit: false,
            }),
            computed_at: Utc.timestamp_millis_opt(1_625_650_203_123).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_set_then_get_round_trips() {
        let cache = cache();
        let value = summary();
        cache
            .set("k", &value, Duration::from_secs(60))
            .await
            .unwrap();
        let back: Option<Summary> = cache.get("k").await.unwrap();
        assert_eq!(back, Some(value));
    }

    #[tokio::test]
    async fn test_entry_expires_after_ttl() {
        let cache = cache();
        cache
            .set("k", &summary(), Duration::from_millis(40))
            .await
            .unwrap();
        assert!(cache.get::<Summary>("k").await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(cache.get::<Summary>("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unreadable_entry_is_a_miss() {
        let cache = cache();
        cache.store.set("k", "not json", None).await.unwrap();
        assert!(cache.get::<Summary>("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_or_compute_computes_once_within_ttl() {
        let cache = cache();
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let compute = move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(summary())
        };

        let first = cache
            .get_or_compute("k", Duration::from_secs(60), compute)
            .await
            .unwrap();
        // Let the deferred write land
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        let second = cache
            .get_or_compute("k", Duration::from_secs(60), compute)
            .await
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.metrics().hits.get(), 1);
        assert_eq!(cache.metrics().misses.get(), 1);
    }

    #[tokio::test]
    async fn test_failed_compute_is_not_cached() {
        let cache = cache();
        let result: Result<Summary> = cache
            .get_or_compute("k", Duration::from_secs(60), || async {
                Err(crate::error::Error::UpstreamFetch("down".into()))
            })
            .await;
        assert!(result.is_err());
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(cache.get::<Summary>("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_single_flight_computes_once() {
        let cache = cache().with_single_flight(Duration::from_secs(2));
        let calls = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_compute("k", Duration::from_secs(60), move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        Ok(summary())
                    })
                    .await
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), summary());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cache.metrics().lock_waits.get() >= 1);
        assert_eq!(cache.store.get("k:lock").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_waiter_stops_when_holder_fails() {
        let lock_ttl = Duration::from_secs(3);
        let cache = cache().with_single_flight(lock_ttl);
        let calls = Arc::new(AtomicU32::new(0));

        let holder = {
            let cache = cache.clone();
            let calls = calls.clone();
            tokio::spawn(async move {
                cache
                    .get_or_compute::<Summary, _, _>("k", Duration::from_secs(60), move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        Err(crate::error::Error::UpstreamFetch("down".into()))
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let started = std::time::Instant::now();
        let waiter = {
            let calls = calls.clone();
            cache
                .get_or_compute::<Summary, _, _>("k", Duration::from_secs(60), move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(crate::error::Error::UpstreamFetch("still down".into()))
                })
                .await
        };

        assert!(waiter.is_err());
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(holder.await.unwrap().is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.metrics().lock_waits.get(), 1);
    }
}
