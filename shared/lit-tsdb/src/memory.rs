//! In-memory store
//!
//! Mirrors the RedisTimeSeries behaviour the pipeline relies on: duplicate
//! policies, epoch-aligned aggregation buckets, compaction of closed buckets
//! into destination series, and key expiry. A batched append is applied under
//! one lock, so readers see all of it or none of it.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::{Duration, Instant};

use crate::store::{KeyValueStore, TimeSeriesStore};
use crate::types::{
    bucket_start, Aggregation, CompactionRule, DataPoint, DuplicatePolicy, SeriesEntry,
    SeriesOptions,
};
use crate::{Result, TsdbError};

struct MemorySeries {
    options: SeriesOptions,
    points: BTreeMap<i64, f64>,
}

impl MemorySeries {
    fn newest(&self) -> Option<i64> {
        self.points.keys().next_back().copied()
    }
}

#[derive(Default)]
struct SeriesState {
    series: HashMap<String, MemorySeries>,
    rules: Vec<CompactionRule>,
}

/// Store backed by process memory
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<SeriesState>,
    values: DashMap<String, (String, Option<Instant>)>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw contents of a series, ascending
    pub fn points(&self, key: &str) -> Vec<DataPoint> {
        let state = self.state.lock();
        state
            .series
            .get(key)
            .map(|s| {
                s.points
                    .iter()
                    .map(|(ts, v)| DataPoint::new(*ts, *v))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn series_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.state.lock().series.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn rules(&self) -> Vec<CompactionRule> {
        self.state.lock().rules.clone()
    }

    /// Drop every key that starts with `prefix`
    pub fn clear_prefix(&self, prefix: &str) {
        let mut state = self.state.lock();
        state.series.retain(|key, _| !key.starts_with(prefix));
        state
            .rules
            .retain(|rule| !rule.source.starts_with(prefix) && !rule.dest.starts_with(prefix));
        drop(state);
        self.values.retain(|key, _| !key.starts_with(prefix));
    }

    fn live_value(&self, key: &str) -> Option<String> {
        let expired = match self.values.get(key) {
            Some(entry) => match entry.1 {
                Some(deadline) if Instant::now() >= deadline => true,
                _ => return Some(entry.0.clone()),
            },
            None => return None,
        };
        if expired {
            self.values.remove(key);
        }
        None
    }
}

impl SeriesState {
    fn insert(&mut self, entry: &SeriesEntry) -> Result<()> {
        let series = self
            .series
            .get_mut(&entry.key)
            .ok_or_else(|| TsdbError::KeyNotFound(entry.key.clone()))?;

        let value = match series.points.get(&entry.timestamp_ms) {
            Some(existing) => series
                .options
                .duplicate_policy
                .resolve(*existing, entry.value)
                .ok_or_else(|| {
                    TsdbError::Command(format!(
                        "duplicate sample at {} in {} blocked",
                        entry.timestamp_ms, entry.key
                    ))
                })?,
            None => entry.value,
        };
        series.points.insert(entry.timestamp_ms, value);

        if let (Some(retention), Some(newest)) = (series.options.retention, series.newest()) {
            let cutoff = newest - retention.as_millis() as i64;
            series.points = series.points.split_off(&cutoff);
        }
        Ok(())
    }

    /// Roll every closed bucket of `source` into the destinations of its
    /// rules. A bucket is closed once a later bucket holds a sample.
    fn compact(&mut self, source: &str) {
        let mut pending = vec![source.to_string()];

        while let Some(key) = pending.pop() {
            let rules: Vec<CompactionRule> = self
                .rules
                .iter()
                .filter(|r| r.source == key)
                .cloned()
                .collect();

            for rule in rules {
                let rolled = match self.series.get(&rule.source) {
                    Some(series) => closed_buckets(series, &rule),
                    None => continue,
                };
                let Some(dest) = self.series.get_mut(&rule.dest) else {
                    continue;
                };

                let mut changed = false;
                for (bucket, value) in rolled {
                    if let std::collections::btree_map::Entry::Vacant(slot) =
                        dest.points.entry(bucket)
                    {
                        slot.insert(value);
                        changed = true;
                    }
                }
                if changed {
                    pending.push(rule.dest.clone());
                }
            }
        }
    }
}

fn closed_buckets(series: &MemorySeries, rule: &CompactionRule) -> Vec<(i64, f64)> {
    let Some(newest) = series.newest() else {
        return Vec::new();
    };
    let open_bucket = bucket_start(newest, rule.bucket_ms);
    aggregate(
        series.points.range(..open_bucket),
        rule.aggregation,
        rule.bucket_ms,
    )
}

fn aggregate<'a>(
    points: impl Iterator<Item = (&'a i64, &'a f64)>,
    aggregation: Aggregation,
    bucket_ms: i64,
) -> Vec<(i64, f64)> {
    let mut buckets: BTreeMap<i64, Vec<f64>> = BTreeMap::new();
    for (ts, value) in points {
        buckets
            .entry(bucket_start(*ts, bucket_ms))
            .or_default()
            .push(*value);
    }
    buckets
        .into_iter()
        .filter_map(|(bucket, values)| aggregation.apply(&values).map(|v| (bucket, v)))
        .collect()
}

#[async_trait]
impl TimeSeriesStore for MemoryStore {
    async fn create_series(&self, key: &str, options: &SeriesOptions) -> Result<()> {
        let mut state = self.state.lock();
        if state.series.contains_key(key) {
            return Err(TsdbError::AlreadyExists(format!("key {} already exists", key)));
        }
        state.series.insert(
            key.to_string(),
            MemorySeries {
                options: options.clone(),
                points: BTreeMap::new(),
            },
        );
        Ok(())
    }

    async fn create_compaction_rule(&self, rule: &CompactionRule) -> Result<()> {
        if rule.bucket_ms <= 0 {
            return Err(TsdbError::Command(format!(
                "invalid bucket duration {}",
                rule.bucket_ms
            )));
        }
        if rule.source == rule.dest {
            return Err(TsdbError::Command(
                "source and destination must differ".to_string(),
            ));
        }

        let mut state = self.state.lock();
        for key in [&rule.source, &rule.dest] {
            if !state.series.contains_key(key) {
                return Err(TsdbError::KeyNotFound(key.clone()));
            }
        }
        if state.rules.iter().any(|r| r.dest == rule.dest) {
            return Err(TsdbError::AlreadyExists(format!(
                "the destination key {} already has a src rule",
                rule.dest
            )));
        }
        state.rules.push(rule.clone());
        Ok(())
    }

    async fn append_many(&self, entries: &[SeriesEntry]) -> Result<usize> {
        let mut state = self.state.lock();

        // Validate first so a rejected entry leaves nothing applied
        let mut batch: HashSet<(&str, i64)> = HashSet::new();
        for entry in entries {
            let series = state
                .series
                .get(&entry.key)
                .ok_or_else(|| TsdbError::KeyNotFound(entry.key.clone()))?;
            let seen = !batch.insert((entry.key.as_str(), entry.timestamp_ms))
                || series.points.contains_key(&entry.timestamp_ms);
            if seen && series.options.duplicate_policy == DuplicatePolicy::Block {
                return Err(TsdbError::Command(format!(
                    "duplicate sample at {} in {} blocked",
                    entry.timestamp_ms, entry.key
                )));
            }
        }

        let mut touched: Vec<&str> = Vec::new();
        for entry in entries {
            state.insert(entry)?;
            if !touched.contains(&entry.key.as_str()) {
                touched.push(&entry.key);
            }
        }
        for key in touched {
            state.compact(key);
        }
        Ok(entries.len())
    }

    async fn range_aggregate(
        &self,
        key: &str,
        from_ms: i64,
        to_ms: Option<i64>,
        aggregation: Aggregation,
        bucket_ms: i64,
    ) -> Result<Vec<DataPoint>> {
        if bucket_ms <= 0 {
            return Err(TsdbError::Command(format!(
                "invalid bucket duration {}",
                bucket_ms
            )));
        }
        let state = self.state.lock();
        let series = state
            .series
            .get(key)
            .ok_or_else(|| TsdbError::KeyNotFound(key.to_string()))?;

        let to = to_ms.unwrap_or(i64::MAX);
        if to < from_ms {
            return Ok(Vec::new());
        }
        Ok(aggregate(series.points.range(from_ms..=to), aggregation, bucket_ms)
            .into_iter()
            .map(|(ts, v)| DataPoint::new(ts, v))
            .collect())
    }

    async fn latest(&self, key: &str) -> Result<Option<DataPoint>> {
        let state = self.state.lock();
        let series = state
            .series
            .get(key)
            .ok_or_else(|| TsdbError::KeyNotFound(key.to_string()))?;
        Ok(series
            .points
            .iter()
            .next_back()
            .map(|(ts, v)| DataPoint::new(*ts, *v)))
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.live_value(key))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let deadline = ttl.map(|ttl| Instant::now() + ttl);
        self.values
            .insert(key.to_string(), (value.to_string(), deadline));
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let now = Instant::now();
        let mut written = false;
        self.values
            .entry(key.to_string())
            .and_modify(|entry| {
                if matches!(entry.1, Some(deadline) if now >= deadline) {
                    *entry = (value.to_string(), Some(now + ttl));
                    written = true;
                }
            })
            .or_insert_with(|| {
                written = true;
                (value.to_string(), Some(now + ttl))
            });
        Ok(written)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let live = self.live_value(key).is_some();
        self.values.remove(key);
        Ok(live)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
