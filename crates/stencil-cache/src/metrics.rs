//! Cache performance monitoring and metrics

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant, SystemTime},
};

use serde::{Deserialize, Serialize};

/// Point-in-time statistics for one single-flight cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    /// Lookups answered by a ready entry
    pub hits: u64,
    /// Lookups that found no entry and started a producer
    pub misses: u64,
    /// Lookups that attached to a producer already in flight
    pub joins: u64,
    /// Producer runs that completed successfully
    pub loads: u64,
    /// Producer runs that failed (the entry was evicted)
    pub failures: u64,
    /// Entries removed through invalidation
    pub invalidations: u64,
    /// Number of entries (ready or pending) at snapshot time
    pub entry_count: usize,
    /// Average producer run time (milliseconds)
    pub avg_load_time_ms: f64,
    /// Timestamp of cache creation
    pub created_at: SystemTime,
}

impl CacheStats {
    /// Calculate hit rate as a percentage (0.0 to 100.0)
    ///
    /// Joins count as hits: the caller did not trigger a producer run.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.joins + self.misses;
        if total == 0 {
            0.0
        } else {
            ((self.hits + self.joins) as f64 / total as f64) * 100.0
        }
    }

    /// Calculate miss rate as a percentage (0.0 to 100.0)
    pub fn miss_rate(&self) -> f64 {
        100.0 - self.hit_rate()
    }

    /// Total number of producer executions, successful or not
    pub fn productions(&self) -> u64 {
        self.loads + self.failures
    }

    /// Get uptime since cache creation
    pub fn uptime(&self) -> Duration {
        SystemTime::now()
            .duration_since(self.created_at)
            .unwrap_or(Duration::from_secs(0))
    }
}

/// Thread-safe cache metrics tracker
///
/// Cloning shares the underlying counters, so producer tasks can record
/// outcomes after the calling future is gone.
#[derive(Debug, Clone)]
pub struct CacheMetrics {
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
    joins: Arc<AtomicU64>,
    loads: Arc<AtomicU64>,
    failures: Arc<AtomicU64>,
    invalidations: Arc<AtomicU64>,
    total_load_time_us: Arc<AtomicU64>,
    created_at: SystemTime,
}

impl CacheMetrics {
    /// Create new cache metrics
    pub fn new() -> Self {
        Self {
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
            joins: Arc::new(AtomicU64::new(0)),
            loads: Arc::new(AtomicU64::new(0)),
            failures: Arc::new(AtomicU64::new(0)),
            invalidations: Arc::new(AtomicU64::new(0)),
            total_load_time_us: Arc::new(AtomicU64::new(0)),
            created_at: SystemTime::now(),
        }
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_join(&self) {
        self.joins.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successful producer run with its duration
    pub fn record_load(&self, elapsed: Duration) {
        self.loads.fetch_add(1, Ordering::Relaxed);
        self.total_load_time_us
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    /// Record a failed producer run with its duration
    pub fn record_failure(&self, elapsed: Duration) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        self.total_load_time_us
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_invalidation(&self) {
        self.invalidations.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current statistics snapshot
    pub fn snapshot(&self, entry_count: usize) -> CacheStats {
        let loads = self.loads.load(Ordering::Relaxed);
        let failures = self.failures.load(Ordering::Relaxed);
        let total_load_time_us = self.total_load_time_us.load(Ordering::Relaxed);

        let runs = loads + failures;
        let avg_load_time_ms = if runs > 0 {
            total_load_time_us as f64 / runs as f64 / 1000.0
        } else {
            0.0
        };

        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            joins: self.joins.load(Ordering::Relaxed),
            loads,
            failures,
            invalidations: self.invalidations.load(Ordering::Relaxed),
            entry_count,
            avg_load_time_ms,
            created_at: self.created_at,
        }
    }
}

impl Default for CacheMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Operation timing helper
#[derive(Debug)]
pub struct OperationTimer {
    start_time: Instant,
}

impl OperationTimer {
    /// Start timing an operation
    pub fn start() -> Self {
        Self {
            start_time: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate_counts_joins_as_hits() {
        let metrics = CacheMetrics::new();
        metrics.record_miss();
        metrics.record_join();
        metrics.record_hit();
        metrics.record_hit();

        let stats = metrics.snapshot(1);
        assert_eq!(stats.hit_rate(), 75.0);
        assert_eq!(stats.miss_rate(), 25.0);
    }

    #[test]
    fn test_hit_rate_empty() {
        let stats = CacheMetrics::new().snapshot(0);
        assert_eq!(stats.hit_rate(), 0.0);
    }

    #[test]
    fn test_productions_include_failures() {
        let metrics = CacheMetrics::new();
        metrics.record_load(Duration::from_millis(2));
        metrics.record_failure(Duration::from_millis(4));

        let stats = metrics.snapshot(0);
        assert_eq!(stats.loads, 1);
        assert_eq!(stats.failures, 1);
        assert_eq!(stats.productions(), 2);
        assert!((stats.avg_load_time_ms - 3.0).abs() < 0.01);
    }

    #[test]
    fn test_clones_share_counters() {
        let metrics = CacheMetrics::new();
        let shared = metrics.clone();
        shared.record_invalidation();

        assert_eq!(metrics.snapshot(0).invalidations, 1);
    }

    #[test]
    fn test_operation_timer() {
        let timer = OperationTimer::start();
        std::thread::sleep(Duration::from_millis(10));
        assert!(timer.elapsed() >= Duration::from_millis(10));
    }
}
