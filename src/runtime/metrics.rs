use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

/// Counters shared between the optimizer and whoever reports on it.
///
/// Held behind an `Arc` so a host can read a snapshot between invocations
/// without borrowing the optimizer.
#[derive(Debug, Default)]
pub struct OptimizerMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    invalidations: AtomicU64,
    loads: AtomicU64,
    load_failures: AtomicU64,
    unloads: AtomicU64,
    unload_refusals: AtomicU64,
    execution_failures: AtomicU64,
    emergency_sweeps: AtomicU64,
    time_saved_us: AtomicU64,
}

impl OptimizerMetrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_invalidations(&self, count: usize) {
        if count != 0 {
            self.invalidations
                .fetch_add(count as u64, Ordering::Relaxed);
        }
    }

    pub fn record_load(&self) {
        self.loads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_load_failure(&self) {
        self.load_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unload(&self) {
        self.unloads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unload_refused(&self) {
        self.unload_refusals.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_execution_failure(&self) {
        self.execution_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_emergency_sweep(&self) {
        self.emergency_sweeps.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_time_saved(&self, saved: Duration) {
        let micros = u64::try_from(saved.as_micros()).unwrap_or(u64::MAX);
        if micros != 0 {
            self.time_saved_us.fetch_add(micros, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            loads: self.loads.load(Ordering::Relaxed),
            load_failures: self.load_failures.load(Ordering::Relaxed),
            unloads: self.unloads.load(Ordering::Relaxed),
            unload_refusals: self.unload_refusals.load(Ordering::Relaxed),
            execution_failures: self.execution_failures.load(Ordering::Relaxed),
            emergency_sweeps: self.emergency_sweeps.load(Ordering::Relaxed),
            time_saved_ms: self.time_saved_us.load(Ordering::Relaxed) as f64 / 1000.0,
        }
    }

    pub fn reset(&self) {
        for counter in [
            &self.hits,
            &self.misses,
            &self.evictions,
            &self.invalidations,
            &self.loads,
            &self.load_failures,
            &self.unloads,
            &self.unload_refusals,
            &self.execution_failures,
            &self.emergency_sweeps,
            &self.time_saved_us,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub invalidations: u64,
    pub loads: u64,
    pub load_failures: u64,
    pub unloads: u64,
    pub unload_refusals: u64,
    pub execution_failures: u64,
    pub emergency_sweeps: u64,
    pub time_saved_ms: f64,
}

impl MetricsSnapshot {
    /// Fraction of fast-path lookups that hit, 0.0 before any lookup.
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_rate_handles_empty_and_mixed() {
        let metrics = OptimizerMetrics::new();
        assert!(metrics.snapshot().hit_rate().abs() < f64::EPSILON);

        metrics.record_hit();
        metrics.record_hit();
        metrics.record_hit();
        metrics.record_miss();
        assert!((metrics.snapshot().hit_rate() - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn reset_zeroes_every_counter() {
        let metrics = OptimizerMetrics::new();
        metrics.record_load();
        metrics.record_invalidations(3);
        metrics.record_time_saved(Duration::from_millis(12));
        metrics.reset();
        assert_eq!(metrics.snapshot(), MetricsSnapshot::default());
    }
}
