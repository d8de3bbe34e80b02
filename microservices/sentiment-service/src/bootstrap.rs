//! Creates the series and compaction rules the pipeline needs

use lit_tsdb::{Aggregation, CompactionRule, DuplicatePolicy, SeriesOptions};
use tracing::info;

use crate::aggregator::HOUR_MS;
use crate::error::Result;
use crate::keys::{KeySpace, HOURLY, PRICE, RAW, SENTIMENT};
use crate::store::StoreClient;

pub struct Bootstrap {
    store: StoreClient,
    keys: KeySpace,
}

impl Bootstrap {
    pub fn new(store: StoreClient, keys: KeySpace) -> Self {
        Self { store, keys }
    }

    /// Every series the pipeline reads or writes
    pub fn series(&self) -> Vec<(String, SeriesOptions)> {
        let mut series = Vec::new();
        for metric in [SENTIMENT, PRICE] {
            for resolution in [RAW, HOURLY] {
                let options = SeriesOptions::default()
                    .with_duplicate_policy(DuplicatePolicy::First)
                    .with_label("metric", metric)
                    .with_label("resolution", resolution);
                series.push((self.keys.series_key(metric, resolution), options));
            }
        }
        series
    }

    /// Hourly roll-ups of the raw series
    pub fn rules(&self) -> Vec<CompactionRule> {
        [SENTIMENT, PRICE]
            .into_iter()
            .map(|metric| CompactionRule {
                source: self.keys.series_key(metric, RAW),
                dest: self.keys.series_key(metric, HOURLY),
                aggregation: Aggregation::Avg,
                bucket_ms: HOUR_MS,
            })
            .collect()
    }

    /// Create all series, then the rules that reference them. Safe to run
    /// again or concurrently with another instance.
    pub async fn initialize(&self) -> Result<()> {
        for (key, options) in self.series() {
            self.store.ensure_series(&key, &options).await?;
        }
        for rule in self.rules() {
            self.store.ensure_rule(&rule).await?;
        }
        info!(prefix = self.keys.prefix(), "Store initialized");
        Ok(())
    }
}
