//! In-process counters and latency estimates exposed by the engine's status
//! surface (spec §6). Deliberately a plain struct of atomics rather than a
//! metrics-exporter integration: nothing here assumes Prometheus, StatsD, or
//! any particular scrape protocol, so a pipeline binary is free to bolt on
//! whichever exporter its deployment wants.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde::Serialize;

const LATENCY_WINDOW: usize = 1024;

#[derive(Debug, Default, Serialize)]
pub struct MetricsSnapshot {
    pub events_captured: u64,
    pub events_published: u64,
    pub events_failed: u64,
    pub normalization_warnings: u64,
    pub schema_changes: u64,
    pub p50_latency_ms: f64,
    pub p95_latency_ms: f64,
    pub p99_latency_ms: f64,
}

/// Counters are lock-free; the latency window is a small ring buffer behind
/// a mutex since it needs contiguous access for percentile computation.
pub struct Metrics {
    events_captured: AtomicU64,
    events_published: AtomicU64,
    events_failed: AtomicU64,
    normalization_warnings: AtomicU64,
    schema_changes: AtomicU64,
    latencies_ms: Mutex<Vec<u64>>,
}

impl Default for Metrics {
    fn default() -> Self {
        Metrics {
            events_captured: AtomicU64::new(0),
            events_published: AtomicU64::new(0),
            events_failed: AtomicU64::new(0),
            normalization_warnings: AtomicU64::new(0),
            schema_changes: AtomicU64::new(0),
            latencies_ms: Mutex::new(Vec::with_capacity(LATENCY_WINDOW)),
        }
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_captured(&self) {
        self.events_captured.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_published(&self, latency_ms: u64) {
        self.events_published.fetch_add(1, Ordering::Relaxed);
        self.record_latency(latency_ms);
    }

    pub fn record_failed(&self) {
        self.events_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_normalization_warning(&self) {
        self.normalization_warnings.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_schema_change(&self) {
        self.schema_changes.fetch_add(1, Ordering::Relaxed);
    }

    fn record_latency(&self, latency_ms: u64) {
        let mut window = self.latencies_ms.lock().expect("metrics latency lock poisoned");
        if window.len() == LATENCY_WINDOW {
            window.remove(0);
        }
        window.push(latency_ms);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let window = self.latencies_ms.lock().expect("metrics latency lock poisoned");
        let mut sorted: Vec<u64> = window.clone();
        sorted.sort_unstable();

        MetricsSnapshot {
            events_captured: self.events_captured.load(Ordering::Relaxed),
            events_published: self.events_published.load(Ordering::Relaxed),
            events_failed: self.events_failed.load(Ordering::Relaxed),
            normalization_warnings: self.normalization_warnings.load(Ordering::Relaxed),
            schema_changes: self.schema_changes.load(Ordering::Relaxed),
            p50_latency_ms: percentile(&sorted, 0.50),
            p95_latency_ms: percentile(&sorted, 0.95),
            p99_latency_ms: percentile(&sorted, 0.99),
        }
    }
}

fn percentile(sorted: &[u64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (p * (sorted.len() - 1) as f64).round() as usize;
    sorted[rank.min(sorted.len() - 1)] as f64
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let metrics = Metrics::new();
        metrics.record_captured();
        metrics.record_captured();
        metrics.record_published(10);
        metrics.record_failed();

        let snap = metrics.snapshot();
        assert_eq!(snap.events_captured, 2);
        assert_eq!(snap.events_published, 1);
        assert_eq!(snap.events_failed, 1);
    }

    #[test]
    fn percentiles_over_known_distribution() {
        let metrics = Metrics::new();
        for ms in 1..=100u64 {
            metrics.record_published(ms);
        }
        let snap = metrics.snapshot();
        assert_eq!(snap.p50_latency_ms, 50.0);
        assert_eq!(snap.p99_latency_ms, 99.0);
    }

    #[test]
    fn empty_window_percentiles_are_zero() {
        let metrics = Metrics::new();
        let snap = metrics.snapshot();
        assert_eq!(snap.p50_latency_ms, 0.0);
    }

    #[test]
    fn window_is_bounded() {
        let metrics = Metrics::new();
        for ms in 0..(LATENCY_WINDOW as u64 + 10) {
            metrics.record_published(ms);
        }
        let window = metrics.latencies_ms.lock().unwrap();
        assert_eq!(window.len(), LATENCY_WINDOW);
    }
}
