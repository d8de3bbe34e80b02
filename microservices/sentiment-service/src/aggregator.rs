//! Windowed aggregation and trend classification
//!
//! The historical window is read from the hourly roll-ups, which only hold
//! closed hours. The hour in progress is summarised separately from the raw
//! series and reported as `current_hour`; it is never mixed into the window.

use chrono::{DateTime, TimeZone, Utc};
use lit_core::{CurrentPeriod, HourlyAverage, Summary, Trend};
use lit_tsdb::{Aggregation, DataPoint};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::clock::{top_of_hour, Clock};
use crate::error::Result;
use crate::keys::{KeySpace, HOURLY, PRICE, RAW, SENTIMENT};
use crate::store::StoreClient;

pub const HOUR_MS: i64 = 3_600_000;

#[derive(Clone)]
pub struct Aggregator {
    store: StoreClient,
    keys: KeySpace,
    clock: Arc<dyn Clock>,
    window_hours: u32,
}

impl Aggregator {
    pub fn new(
        store: StoreClient,
        keys: KeySpace,
        clock: Arc<dyn Clock>,
        window_hours: u32,
    ) -> Self {
        Self {
            store,
            keys,
            clock,
            window_hours,
        }
    }

    /// Hourly averages of `key` from `since_ms` up to now, ascending
    pub async fn windowed_average(&self, key: &str, since_ms: i64) -> Result<Vec<DataPoint>> {
        self.store
            .range_aggregate(
                key,
                since_ms,
                Some(self.clock.now_ms()),
                Aggregation::Avg,
                HOUR_MS,
            )
            .await
    }

    /// Start of the first closed hour in the window
    pub fn window_start_ms(&self) -> i64 {
        top_of_hour(self.clock.now()).timestamp_millis() - i64::from(self.window_hours) * HOUR_MS
    }

    /// Closed hours in the window with both averages
    pub async fn hourly_averages(&self) -> Result<Vec<HourlyAverage>> {
        let since = self.window_start_ms();
        let price_key = self.keys.series_key(PRICE, HOURLY);
        let sentiment_key = self.keys.series_key(SENTIMENT, HOURLY);

        let (price, sentiment) = tokio::try_join!(
            self.windowed_average(&price_key, since),
            self.windowed_average(&sentiment_key, since),
        )?;
        Ok(combine_by_bucket(&price, &sentiment))
    }

    /// Summary of the hour in progress, read from the raw series. `None` when
    /// no sentiment sample has arrived yet this hour.
    pub async fn current_period_summary(&self) -> Result<Option<CurrentPeriod>> {
        let hour = top_of_hour(self.clock.now());
        let from = hour.timestamp_millis();
        let to = Some(self.clock.now_ms());
        let sentiment_key = self.keys.series_key(SENTIMENT, RAW);
        let price_key = self.keys.series_key(PRICE, RAW);

        let (sentiment, price) = tokio::try_join!(
            self.store
                .range_aggregate(&sentiment_key, from, to, Aggregation::Avg, HOUR_MS),
            self.store
                .range_aggregate(&price_key, from, to, Aggregation::Avg, HOUR_MS),
        )?;

        let Some(mean_sentiment) = sentiment.first().map(|p| p.value) else {
            debug!(hour = %hour, "No samples in the current hour");
            return Ok(None);
        };
        Ok(Some(CurrentPeriod {
            time: hour,
            mean_sentiment,
            mean_price: price.first().map(|p| p.value),
            lit: mean_sentiment > 0.0,
        }))
    }

    /// Full summary served by the read endpoint
    pub async fn compute_summary(&self) -> Result<Summary> {
        let (hourly, current_hour) =
            tokio::try_join!(self.hourly_averages(), self.current_period_summary())?;

        Ok(Summary {
            sentiment_direction: classify_trend(&hourly, |h| h.sentiment),
            price_direction: classify_trend(&hourly, |h| h.price),
            hourly_average_of_averages: hourly,
            current_hour,
            computed_at: self.clock.now(),
        })
    }
}

fn bucket_time(timestamp_ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(timestamp_ms).single()
}

/// Pair two series index by index, taking the time from the price series.
///
/// Both inputs must cover the same buckets. When one series is missing a
/// bucket every later pair is shifted; `combine_by_bucket` avoids this.
pub fn combine(price: &[DataPoint], sentiment: &[DataPoint]) -> Vec<HourlyAverage> {
    if price.len() != sentiment.len() {
        warn!(
            price = price.len(),
            sentiment = sentiment.len(),
            "Pairing series of different lengths by position"
        );
    }
    price
        .iter()
        .zip(sentiment)
        .filter_map(|(p, s)| {
            Some(HourlyAverage {
                time: bucket_time(p.timestamp_ms)?,
                price: p.value,
                sentiment: s.value,
            })
        })
        .collect()
}

/// Pair two series by bucket timestamp. Buckets present on only one side are
/// gaps and are left out.
pub fn combine_by_bucket(price: &[DataPoint], sentiment: &[DataPoint]) -> Vec<HourlyAverage> {
    let sentiment: BTreeMap<i64, f64> = sentiment
        .iter()
        .map(|p| (p.timestamp_ms, p.value))
        .collect();

    let mut paired = Vec::with_capacity(price.len());
    let mut gaps = 0;
    for point in price {
        match (
            sentiment.get(&point.timestamp_ms),
            bucket_time(point.timestamp_ms),
        ) {
            (Some(value), Some(time)) => paired.push(HourlyAverage {
                time,
                price: point.value,
                sentiment: *value,
            }),
            _ => gaps += 1,
        }
    }
    gaps += sentiment.len().saturating_sub(paired.len());
    if gaps > 0 {
        warn!(gaps, "Buckets missing from one series");
    }
    paired
}

/// Compare the first and last element of a window
pub fn classify_trend<T>(series: &[T], field: impl Fn(&T) -> f64) -> Trend {
    match (series.first(), series.last()) {
        (Some(first), Some(last)) => {
            let (first, last) = (field(first), field(last));
            if last > first {
                Trend::Rising
            } else if last < first {
                Trend::Falling
            } else {
                Trend::Flat
            }
        }
        _ => Trend::Flat,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::Bootstrap;
    use crate::clock::FixedClock;
    use crate::ingestion::Ingestion;
    use lit_core::Sample;
    use lit_tsdb::MemoryStore;
    use std::time::Duration;

    const T0: i64 = 1_625_644_800_000; // 2021-07-07 08:00 UTC

    fn points(values: &[f64]) -> Vec<DataPoint> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| DataPoint::new(T0 + i as i64 * HOUR_MS, *v))
            .collect()
    }

    fn hourly(values: &[f64]) -> Vec<HourlyAverage> {
        combine(&points(values), &points(values))
    }

    #[test]
    fn test_combine_pairs_in_order() {
        let combined = combine(&points(&[1.0, 2.0, 3.0]), &points(&[0.1, 0.2, 0.3]));
        assert_eq!(combined.len(), 3);
        for (i, (price, sentiment)) in [(1.0, 0.1), (2.0, 0.2), (3.0, 0.3)].iter().enumerate() {
            assert_eq!(combined[i].price, *price);
            assert_eq!(combined[i].sentiment, *sentiment);
            assert_eq!(
                combined[i].time.timestamp_millis(),
                T0 + i as i64 * HOUR_MS
            );
        }
    }

    #[test]
    fn test_combine_misaligns_on_gap() {
        let price = points(&[1.0, 2.0, 3.0]);
        let sentiment = vec![
            DataPoint::new(T0, 0.1),
            DataPoint::new(T0 + 2 * HOUR_MS, 0.3),
        ];
        let combined = combine(&price, &sentiment);
        assert_eq!(combined.len(), 2);
        assert_eq!(combined[1].price, 2.0);
        assert_eq!(combined[1].sentiment, 0.3);
    }

    #[test]
    fn test_combine_by_bucket_skips_gaps() {
        let price = points(&[1.0, 2.0, 3.0]);
        let sentiment = vec![
            DataPoint::new(T0, 0.1),
            DataPoint::new(T0 + 2 * HOUR_MS, 0.3),
        ];
        let combined = combine_by_bucket(&price, &sentiment);
        assert_eq!(combined.len(), 2);
        assert_eq!((combined[0].price, combined[0].sentiment), (1.0, 0.1));
        assert_eq!((combined[1].price, combined[1].sentiment), (3.0, 0.3));
    }

    #[test]
    fn test_combine_by_bucket_matches_combine_when_aligned() {
        let price = points(&[1.0, 2.0, 3.0]);
        let sentiment = points(&[0.1, 0.2, 0.3]);
        assert_eq!(
            combine_by_bucket(&price, &sentiment),
            combine(&price, &sentiment)
        );
    }

    #[test]
    fn test_classify_trend() {
        assert_eq!(classify_trend(&hourly(&[10.0, 20.0]), |h| h.price), Trend::Rising);
        assert_eq!(classify_trend(&hourly(&[20.0, 10.0]), |h| h.price), Trend::Falling);
        assert_eq!(classify_trend(&hourly(&[15.0, 15.0]), |h| h.price), Trend::Flat);
        assert_eq!(
            classify_trend(&hourly(&[10.0, 99.0, 10.0]), |h| h.sentiment),
            Trend::Flat
        );
        assert_eq!(classify_trend(&hourly(&[]), |h| h.price), Trend::Flat);
        assert_eq!(classify_trend(&hourly(&[5.0]), |h| h.price), Trend::Flat);
    }

    /// Samples every 30 seconds from 07:30 to 10:29:30, averaging `base + hour`
    fn samples() -> Vec<Sample> {
        let start: i64 = 1_625_643_000; // 07:30
        (0..360)
            .map(|i| {
                let ts = start + i * 30;
                let hour = (ts / 3600) % 24;
                Sample::new(ts as f64, hour as f64 / 10.0 - 0.85, 30_000.0 + hour as f64)
            })
            .collect()
    }

    async fn aggregator_at(now: DateTime<Utc>) -> Aggregator {
        let store = StoreClient::new(Arc::new(MemoryStore::new()), Duration::from_secs(1), 0);
        let keys = KeySpace::new("test");
        Bootstrap::new(store.clone(), keys.clone())
            .initialize()
            .await
            .unwrap();
        Ingestion::new(store.clone(), &keys)
            .persist(&samples())
            .await
            .unwrap();
        Aggregator::new(store, keys, Arc::new(FixedClock(now)), 3)
    }

    #[tokio::test]
    async fn test_summary_over_closed_hours() {
        let now = Utc.with_ymd_and_hms(2021, 7, 7, 10, 30, 0).unwrap();
        let aggregator = aggregator_at(now).await;

        let summary = aggregator.compute_summary().await.unwrap();
        let hours: Vec<u32> = summary
            .hourly_average_of_averages
            .iter()
            .map(|h| chrono::Timelike::hour(&h.time))
            .collect();
        assert_eq!(hours, vec![7, 8, 9]);
        assert_eq!(summary.hourly_average_of_averages[0].price, 30_007.0);
        assert_eq!(summary.hourly_average_of_averages[2].price, 30_009.0);
        assert_eq!(summary.price_direction, Trend::Rising);
        assert_eq!(summary.sentiment_direction, Trend::Rising);
        assert_eq!(summary.computed_at, now);

        let current = summary.current_hour.unwrap();
        assert_eq!(current.time, Utc.with_ymd_and_hms(2021, 7, 7, 10, 0, 0).unwrap());
        assert_eq!(current.mean_price, Some(30_010.0));
        assert!(current.lit);
    }

    #[tokio::test]
    async fn test_current_period_not_lit() {
        let now = Utc.with_ymd_and_hms(2021, 7, 7, 8, 45, 0).unwrap();
        let aggregator = aggregator_at(now).await;
        let current = aggregator.current_period_summary().await.unwrap().unwrap();
        assert!((current.mean_sentiment - -0.05).abs() < 1e-9);
        assert!(!current.lit);
    }

    #[tokio::test]
    async fn test_current_period_without_samples() {
        let now = Utc.with_ymd_and_hms(2021, 7, 7, 12, 5, 0).unwrap();
        let aggregator = aggregator_at(now).await;
        assert_eq!(aggregator.current_period_summary().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_empty_store_gives_flat_summary() {
        let store = StoreClient::new(Arc::new(MemoryStore::new()), Duration::from_secs(1), 0);
        let keys = KeySpace::new("test");
        Bootstrap::new(store.clone(), keys.clone())
            .initialize()
            .await
            .unwrap();
        let now = Utc.with_ymd_and_hms(2021, 7, 7, 10, 30, 0).unwrap();
        let aggregator = Aggregator::new(store, keys, Arc::new(FixedClock(now)), 3);

        let summary = aggregator.compute_summary().await.unwrap();
        assert!(summary.hourly_average_of_averages.is_empty());
        assert_eq!(summary.price_direction, Trend::Flat);
        assert_eq!(summary.current_hour, None);
    }
}
