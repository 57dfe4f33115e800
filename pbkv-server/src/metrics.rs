//! # Server Metrics
//!
//! Count requests, error replies and open connections, and keep a latency
//! histogram for the protobuf front end.
//!
//! ## Design Principles
//! 1. **Accumulator Pattern**: Atomic counters aggregate events cheaply.
//! 2. **Fixed Buckets**: Histogram buckets live in a contiguous array.
//! 3. **Plain Snapshots**: Readers get owned structs, never live atomics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Default latency bucket boundaries in microseconds.
pub const DEFAULT_LATENCY_BUCKETS_US: [u64; 12] =
    [10, 20, 50, 100, 200, 500, 1_000, 2_000, 5_000, 10_000, 50_000, 100_000];

/// Snapshot of all server metrics at a point in time.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    /// Requests decoded and dispatched.
    pub requests_total: u64,
    /// Error replies sent, including undecodable frames.
    pub errors_total: u64,
    /// Requests currently being served.
    pub inflight: u64,
    /// Connections accepted since start.
    pub connections_total: u64,
    /// Connections currently open.
    pub connections_open: u64,
    pub latency: LatencySnapshot,
}

/// Snapshot of the latency histogram.
#[derive(Debug, Clone)]
pub struct LatencySnapshot {
    /// Bucket boundaries in microseconds.
    pub bounds_us: Vec<u64>,
    /// Bucket counts, with the overflow bucket last.
    pub buckets: Vec<u64>,
    pub samples: u64,
    pub sum_us: u64,
}

impl LatencySnapshot {
    /// Smallest bucket bound covering `quantile` of the samples.
    ///
    /// Returns `None` without samples, or when the quantile falls in the
    /// overflow bucket.
    pub fn quantile_bound_us(&self, quantile: f64) -> Option<u64> {
        if self.samples == 0 {
            return None;
        }
        let target = (self.samples as f64 * quantile.clamp(0.0, 1.0)).ceil() as u64;
        let mut seen = 0;
        for (idx, count) in self.buckets.iter().enumerate() {
            seen += count;
            if seen >= target.max(1) {
                return self.bounds_us.get(idx).copied();
            }
        }
        None
    }
}

/// Thread-safe metrics aggregator shared by every connection task.
///
/// `Ordering::Relaxed` is enough: no reader needs cross-field ordering.
pub struct Metrics {
    requests_total: AtomicU64,
    errors_total: AtomicU64,
    inflight: AtomicU64,
    connections_total: AtomicU64,
    connections_open: AtomicU64,
    latency: LatencyHistogram,
}

impl Default for Metrics {
    fn default() -> Self {
        Metrics::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Metrics::with_latency_buckets(DEFAULT_LATENCY_BUCKETS_US.to_vec())
    }

    /// Aggregator with custom bucket boundaries, sorted ascending, in
    /// microseconds.
    pub fn with_latency_buckets(bounds_us: Vec<u64>) -> Self {
        Metrics {
            requests_total: AtomicU64::new(0),
            errors_total: AtomicU64::new(0),
            inflight: AtomicU64::new(0),
            connections_total: AtomicU64::new(0),
            connections_open: AtomicU64::new(0),
            latency: LatencyHistogram::new(bounds_us),
        }
    }

    pub fn record_request_start(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        self.inflight.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_request_end(&self, latency: Duration) {
        self.inflight.fetch_sub(1, Ordering::Relaxed);
        self.latency.record(latency);
    }

    pub fn record_error(&self) {
        self.errors_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connection_open(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
        self.connections_open.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connection_close(&self) {
        self.connections_open.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests_total: self.requests_total.load(Ordering::Relaxed),
            errors_total: self.errors_total.load(Ordering::Relaxed),
            inflight: self.inflight.load(Ordering::Relaxed),
            connections_total: self.connections_total.load(Ordering::Relaxed),
            connections_open: self.connections_open.load(Ordering::Relaxed),
            latency: self.latency.snapshot(),
        }
    }
}

/// Fixed-bucket latency histogram.
///
/// Bucket selection is a linear scan; the bound list is short.
pub struct LatencyHistogram {
    bounds_us: Vec<u64>,
    buckets: Vec<AtomicU64>,
    sum_us: AtomicU64,
    samples: AtomicU64,
}

impl LatencyHistogram {
    /// Histogram with `bounds_us.len() + 1` buckets, the last one overflow.
    pub fn new(bounds_us: Vec<u64>) -> Self {
        let buckets = (0..=bounds_us.len()).map(|_| AtomicU64::new(0)).collect();
        LatencyHistogram {
            bounds_us,
            buckets,
            sum_us: AtomicU64::new(0),
            samples: AtomicU64::new(0),
        }
    }

    pub fn record(&self, latency: Duration) {
        let micros = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
        self.samples.fetch_add(1, Ordering::Relaxed);
        self.sum_us.fetch_add(micros, Ordering::Relaxed);
        let idx = self
            .bounds_us
            .iter()
            .position(|bound| micros <= *bound)
            .unwrap_or(self.bounds_us.len());
        if let Some(bucket) = self.buckets.get(idx) {
            bucket.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> LatencySnapshot {
        LatencySnapshot {
            bounds_us: self.bounds_us.clone(),
            buckets: self
                .buckets
                .iter()
                .map(|bucket| bucket.load(Ordering::Relaxed))
                .collect(),
            samples: self.samples.load(Ordering::Relaxed),
            sum_us: self.sum_us.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn histogram_buckets_by_upper_bound() {
        let histogram = LatencyHistogram::new(vec![10, 100]);
        histogram.record(Duration::from_micros(10));
        histogram.record(Duration::from_micros(50));
        histogram.record(Duration::from_millis(5));

        let snapshot = histogram.snapshot();
        assert_eq!(snapshot.buckets, vec![1, 1, 1]);
        assert_eq!(snapshot.samples, 3);
        assert_eq!(snapshot.sum_us, 5_060);
        assert_eq!(snapshot.quantile_bound_us(0.5), Some(100));
        assert_eq!(snapshot.quantile_bound_us(1.0), None);
    }

    #[test]
    fn request_accounting() {
        let metrics = Metrics::new();
        metrics.record_connection_open();
        metrics.record_request_start();
        assert_eq!(metrics.snapshot().inflight, 1);
        metrics.record_error();
        metrics.record_request_end(Duration::from_micros(3));
        metrics.record_connection_close();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.requests_total, 1);
        assert_eq!(snapshot.errors_total, 1);
        assert_eq!(snapshot.inflight, 0);
        assert_eq!(snapshot.connections_total, 1);
        assert_eq!(snapshot.connections_open, 0);
        assert_eq!(snapshot.latency.samples, 1);
    }
}
