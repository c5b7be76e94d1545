//! Usage and cache counters
//!
//! Counters go to a pluggable [`MetricsSink`]; the dashboards that read
//! them live elsewhere.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};

/// Counter names
pub mod names {
    pub const CACHE_HITS: &str = "cache.hits";
    pub const CACHE_MISSES: &str = "cache.misses";
    pub const CACHE_SETS: &str = "cache.sets";
    pub const USAGE_PEAK: &str = "usage.peak";
    pub const USAGE_OFF_PEAK: &str = "usage.off_peak";
    pub const USAGE_MOBILE: &str = "usage.mobile";
    pub const MEMORY_WRITES: &str = "memory.writes";
    pub const MEMORY_DENIED: &str = "memory.denied";
    pub const RECONCILE_REPAIRED: &str = "reconcile.repaired";
}

/// Destination for counter increments
pub trait MetricsSink: Send + Sync {
    fn increment(&self, name: &str, by: u64);

    fn read(&self, name: &str) -> u64;
}

/// Process-local counter map
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    counters: Mutex<BTreeMap<String, u64>>,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetricsSink for InMemoryMetrics {
    fn increment(&self, name: &str, by: u64) {
        let mut counters = self.counters.lock().unwrap_or_else(|p| p.into_inner());
        *counters.entry(name.to_string()).or_insert(0) += by;
    }

    fn read(&self, name: &str) -> u64 {
        let counters = self.counters.lock().unwrap_or_else(|p| p.into_inner());
        counters.get(name).copied().unwrap_or(0)
    }
}

/// Point-in-time view of every counter
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_sets: u64,
    pub usage_peak: u64,
    pub usage_off_peak: u64,
    pub usage_mobile: u64,
    pub memory_writes: u64,
    pub memory_denied: u64,
    pub reconcile_repaired: u64,
}

impl MetricsSnapshot {
    /// Cache hit rate as a percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            (self.cache_hits as f64 / total as f64) * 100.0
        }
    }
}

impl fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Metrics {{ hits: {}, misses: {}, hit_rate: {:.2}%, sets: {}, peak: {}, off_peak: {}, mobile: {}, memory_writes: {}, memory_denied: {} }}",
            self.cache_hits,
            self.cache_misses,
            self.hit_rate(),
            self.cache_sets,
            self.usage_peak,
            self.usage_off_peak,
            self.usage_mobile,
            self.memory_writes,
            self.memory_denied
        )
    }
}

/// Typed front for the counters this crate emits
#[derive(Clone)]
pub struct MetricsRecorder {
    sink: Arc<dyn MetricsSink>,
}

impl MetricsRecorder {
    pub fn new(sink: Arc<dyn MetricsSink>) -> Self {
        Self { sink }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryMetrics::new()))
    }

    pub fn record_hit(&self) {
        self.sink.increment(names::CACHE_HITS, 1);
    }

    pub fn record_miss(&self) {
        self.sink.increment(names::CACHE_MISSES, 1);
    }

    pub fn record_set(&self) {
        self.sink.increment(names::CACHE_SETS, 1);
    }

    /// One request, classified by load window and channel
    pub fn record_usage(&self, peak: bool, mobile: bool) {
        if peak {
            self.sink.increment(names::USAGE_PEAK, 1);
        } else {
            self.sink.increment(names::USAGE_OFF_PEAK, 1);
        }
        if mobile {
            self.sink.increment(names::USAGE_MOBILE, 1);
        }
    }

    pub fn record_memory_write(&self) {
        self.sink.increment(names::MEMORY_WRITES, 1);
    }

    pub fn record_consent_denied(&self) {
        self.sink.increment(names::MEMORY_DENIED, 1);
    }

    pub fn record_reconcile_repaired(&self, count: u64) {
        if count > 0 {
            self.sink.increment(names::RECONCILE_REPAIRED, count);
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            cache_hits: self.sink.read(names::CACHE_HITS),
            cache_misses: self.sink.read(names::CACHE_MISSES),
            cache_sets: self.sink.read(names::CACHE_SETS),
            usage_peak: self.sink.read(names::USAGE_PEAK),
            usage_off_peak: self.sink.read(names::USAGE_OFF_PEAK),
            usage_mobile: self.sink.read(names::USAGE_MOBILE),
            memory_writes: self.sink.read(names::MEMORY_WRITES),
            memory_denied: self.sink.read(names::MEMORY_DENIED),
            reconcile_repaired: self.sink.read(names::RECONCILE_REPAIRED),
        }
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::in_memory()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate() {
        let snapshot = MetricsSnapshot {
            cache_hits: 80,
            cache_misses: 20,
            ..Default::default()
        };
        assert_eq!(snapshot.hit_rate(), 80.0);
        assert_eq!(MetricsSnapshot::default().hit_rate(), 0.0);
    }

    #[test]
    fn test_recorder_counts() {
        let recorder = MetricsRecorder::in_memory();
        recorder.record_hit();
        recorder.record_miss();
        recorder.record_miss();
        recorder.record_usage(true, true);
        recorder.record_usage(false, false);
        recorder.record_reconcile_repaired(0);
        recorder.record_reconcile_repaired(3);

        let snapshot = recorder.snapshot();
        assert_eq!(snapshot.cache_hits, 1);
        assert_eq!(snapshot.cache_misses, 2);
        assert_eq!(snapshot.usage_peak, 1);
        assert_eq!(snapshot.usage_off_peak, 1);
        assert_eq!(snapshot.usage_mobile, 1);
        assert_eq!(snapshot.reconcile_repaired, 3);
    }

    #[test]
    fn test_shared_sink() {
        let sink = Arc::new(InMemoryMetrics::new());
        let recorder = MetricsRecorder::new(sink.clone());
        recorder.record_set();
        recorder.record_memory_write();
        recorder.record_consent_denied();
        assert_eq!(sink.read(names::CACHE_SETS), 1);
        assert_eq!(sink.read(names::MEMORY_WRITES), 1);
        assert_eq!(sink.read(names::MEMORY_DENIED), 1);
        assert_eq!(sink.read("unknown"), 0);
    }

    #[test]
    fn test_snapshot_display() {
        let display = format!("{}", MetricsRecorder::in_memory().snapshot());
        assert!(display.contains("hits: 0"));
    }
}
