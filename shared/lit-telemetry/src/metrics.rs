//! Metrics primitives

use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Monotonic counter
#[derive(Clone, Default)]
pub struct Counter {
    value: Arc<AtomicU64>,
    name: String,
}

impl Counter {
    pub fn new(name: &str) -> Self {
        Self {
            value: Arc::new(AtomicU64::new(0)),
            name: name.to_string(),
        }
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Last-written value
#[derive(Clone, Default)]
pub struct Gauge {
    value: Arc<AtomicU64>,
    name: String,
}

impl Gauge {
    pub fn new(name: &str) -> Self {
        Self {
            value: Arc::new(AtomicU64::new(0)),
            name: name.to_string(),
        }
    }

    pub fn set(&self, val: u64) {
        self.value.store(val, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Sliding window of the most recent samples, for latency percentiles
#[derive(Clone)]
pub struct Histogram {
    window: Arc<parking_lot::Mutex<VecDeque<f64>>>,
    name: String,
    capacity: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct HistogramSnapshot {
    pub count: usize,
    pub mean: f64,
    pub p50: f64,
    pub p95: f64,
    pub max: f64,
}

impl Histogram {
    pub fn new(name: &str) -> Self {
        Self::with_capacity(name, 1024)
    }

    pub fn with_capacity(name: &str, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            window: Arc::new(parking_lot::Mutex::new(VecDeque::with_capacity(capacity))),
            name: name.to_string(),
            capacity,
        }
    }

    pub fn record(&self, value: f64) {
        let mut window = self.window.lock();
        if window.len() == self.capacity {
            window.pop_front();
        }
        window.push_back(value);
    }

    pub fn count(&self) -> usize {
        self.window.lock().len()
    }

    pub fn snapshot(&self) -> HistogramSnapshot {
        let mut sorted: Vec<f64> = self.window.lock().iter().copied().collect();
        if sorted.is_empty() {
            return HistogramSnapshot::default();
        }
        sorted.sort_by(|a, b| a.total_cmp(b));

        let rank = |p: f64| {
            let idx = ((sorted.len() - 1) as f64 * p).round() as usize;
            sorted[idx]
        };
        HistogramSnapshot {
            count: sorted.len(),
            mean: sorted.iter().sum::<f64>() / sorted.len() as f64,
            p50: rank(0.50),
            p95: rank(0.95),
            max: sorted[sorted.len() - 1],
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter() {
        let counter = Counter::new("upstream_fetches");
        assert_eq!(counter.get(), 0);
        counter.inc();
        assert_eq!(counter.get(), 1);
        counter.add(5);
        assert_eq!(counter.get(), 6);
        assert_eq!(counter.name(), "upstream_fetches");
    }

    #[test]
    fn test_counter_clones_share_value() {
        let counter = Counter::new("cache_hits");
        let other = counter.clone();
        other.inc();
        assert_eq!(counter.get(), 1);
    }

    #[test]
    fn test_gauge() {
        let gauge = Gauge::new("last_batch_size");
        gauge.set(10);
        assert_eq!(gauge.get(), 10);
        gauge.set(3);
        assert_eq!(gauge.get(), 3);
    }

    #[test]
    fn test_histogram() {
        let hist = Histogram::new("compute_ms");
        assert_eq!(hist.snapshot().count, 0);
        for v in [5.0, 1.0, 4.0, 2.0, 3.0] {
            hist.record(v);
        }

        let snapshot = hist.snapshot();
        assert_eq!(snapshot.count, 5);
        assert!((snapshot.mean - 3.0).abs() < 0.001);
        assert!((snapshot.p50 - 3.0).abs() < 0.001);
        assert!((snapshot.max - 5.0).abs() < 0.001);
    }

    #[test]
    fn test_histogram_keeps_recent_window() {
        let hist = Histogram::with_capacity("compute_ms", 2);
        hist.record(100.0);
        hist.record(1.0);
        hist.record(3.0);

        assert_eq!(hist.count(), 2);
        assert!((hist.snapshot().max - 3.0).abs() < 0.001);
    }
}
