//! In-process pipeline metrics.
//!
//! Lock-free counters, gauges and latency histograms behind a global
//! registry. The scheduler logs a [`MetricsSnapshot`] periodically.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// A counter metric.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// A gauge metric (can go up or down).
#[derive(Debug, Default)]
pub struct Gauge(AtomicU64);

impl Gauge {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn set(&self, val: u64) {
        self.0.store(val, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    /// Saturates at zero.
    pub fn dec(&self) {
        let _ = self
            .0
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| Some(v.saturating_sub(1)));
    }
}

/// Histogram for latency tracking.
#[derive(Debug)]
pub struct Histogram {
    /// Buckets: 10ms, 50ms, 100ms, 250ms, 500ms, 1s, 2.5s, 5s, 10s, 30s, 60s
    buckets: [AtomicU64; 11],
    sum: AtomicU64,
    count: AtomicU64,
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

impl Histogram {
    // Fetches and ffmpeg runs sit in the hundreds of ms to tens of seconds.
    const BUCKET_BOUNDS: [u64; 11] = [10, 50, 100, 250, 500, 1000, 2500, 5000, 10000, 30000, 60000];

    pub fn new() -> Self {
        Self {
            buckets: Default::default(),
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Records a value in milliseconds.
    pub fn observe(&self, ms: u64) {
        self.sum.fetch_add(ms, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        let idx = Self::BUCKET_BOUNDS
            .iter()
            .position(|&bound| ms <= bound)
            .unwrap_or(Self::BUCKET_BOUNDS.len() - 1);
        self.buckets[idx].fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn sum(&self) -> u64 {
        self.sum.load(Ordering::Relaxed)
    }

    pub fn mean(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            0.0
        } else {
            self.sum() as f64 / count as f64
        }
    }

    /// Returns bucket counts.
    pub fn buckets(&self) -> Vec<(u64, u64)> {
        Self::BUCKET_BOUNDS
            .iter()
            .zip(self.buckets.iter())
            .map(|(&bound, count)| (bound, count.load(Ordering::Relaxed)))
            .collect()
    }
}

/// Collected metrics for the ingestion pipeline.
#[derive(Debug, Default)]
pub struct Metrics {
    // Item outcomes
    pub items_started: Counter,
    pub items_succeeded: Counter,
    pub items_failed: Counter,
    pub items_skipped: Counter,

    // Admission
    pub fetches: Counter,
    pub throttled: Counter,
    pub deferrals: Counter,
    pub retries_dispatched: Counter,

    // Failures by kind
    pub transcode_failures: Counter,
    pub oversize_rejections: Counter,

    // Distribution
    pub ids_dispatched: Counter,
    pub worker_crashes: Counter,
    pub records_swept: Counter,

    // Latency histograms
    pub fetch_latency_ms: Histogram,
    pub transcode_latency_ms: Histogram,
    pub item_latency_ms: Histogram,

    // Gauges
    pub retry_queue_depth: Gauge,
    pub items_in_flight: Gauge,
    pub active_workers: Gauge,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }
}

/// A snapshot of metrics at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub items_started: u64,
    pub items_succeeded: u64,
    pub items_failed: u64,
    pub items_skipped: u64,
    pub fetches: u64,
    pub throttled: u64,
    pub deferrals: u64,
    pub retries_dispatched: u64,
    pub transcode_failures: u64,
    pub oversize_rejections: u64,
    pub ids_dispatched: u64,
    pub worker_crashes: u64,
    pub records_swept: u64,
    pub fetch_latency_mean_ms: f64,
    pub transcode_latency_mean_ms: f64,
    pub item_latency_mean_ms: f64,
    pub retry_queue_depth: u64,
    pub items_in_flight: u64,
    pub active_workers: u64,
}

impl Metrics {
    /// Takes a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: Utc::now(),
            items_started: self.items_started.get(),
            items_succeeded: self.items_succeeded.get(),
            items_failed: self.items_failed.get(),
            items_skipped: self.items_skipped.get(),
            fetches: self.fetches.get(),
            throttled: self.throttled.get(),
            deferrals: self.deferrals.get(),
            retries_dispatched: self.retries_dispatched.get(),
            transcode_failures: self.transcode_failures.get(),
            oversize_rejections: self.oversize_rejections.get(),
            ids_dispatched: self.ids_dispatched.get(),
            worker_crashes: self.worker_crashes.get(),
            records_swept: self.records_swept.get(),
            fetch_latency_mean_ms: self.fetch_latency_ms.mean(),
            transcode_latency_mean_ms: self.transcode_latency_ms.mean(),
            item_latency_mean_ms: self.item_latency_ms.mean(),
            retry_queue_depth: self.retry_queue_depth.get(),
            items_in_flight: self.items_in_flight.get(),
            active_workers: self.active_workers.get(),
        }
    }
}

/// Global metrics registry.
pub static METRICS: std::sync::LazyLock<Metrics> = std::sync::LazyLock::new(Metrics::new);

/// Get the global metrics instance.
pub fn metrics() -> &'static Metrics {
    &METRICS
}
