//! Block-scoped execution statistics.
//!
//! Each call fills an [`ExecutionStats`] record which is merged into the
//! process-wide [`StatsCollector`] when the call ends. Counters are atomic;
//! the running average is updated incrementally from the pre-increment call
//! count, so it is exact for sequential calls and approximate under heavy
//! concurrency.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;

/// Per-call measurements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionStats {
    /// Fuel consumed by the call.
    pub fuel_used: u64,
    /// Wall time spent from sandbox creation to teardown.
    pub elapsed: Duration,
    /// Whether the compiled module came from a cache.
    pub cache_hit: bool,
}

/// Snapshot of block statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BlockStats {
    /// Fuel consumed by all calls.
    pub total_fuel_used: u64,
    /// Calls that reached sandbox invocation.
    pub contract_calls: u64,
    /// Calls whose module was found in a cache.
    pub cache_hits: u64,
    /// Running mean of per-call execution time, in microseconds.
    pub avg_execution_time_us: u64,
}

/// Accumulates [`ExecutionStats`] into [`BlockStats`].
#[derive(Debug, Default)]
pub struct StatsCollector {
    total_fuel_used: AtomicU64,
    contract_calls: AtomicU64,
    cache_hits: AtomicU64,
    avg_execution_time_us: AtomicU64,
    // Held shared by `record` and exclusively by `snapshot`/`reset`.
    gate: RwLock<()>,
}

impl StatsCollector {
    /// Create a collector with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one call's measurements.
    pub fn record(&self, stats: &ExecutionStats) {
        let _shared = self.gate.read();

        self.total_fuel_used
            .fetch_add(stats.fuel_used, Ordering::Relaxed);
        if stats.cache_hit {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
        }

        let calls_before = self.contract_calls.fetch_add(1, Ordering::Relaxed);
        let sample = u64::try_from(stats.elapsed.as_micros()).unwrap_or(u64::MAX);
        let old_avg = self.avg_execution_time_us.load(Ordering::Relaxed);

        let weighted = u128::from(old_avg) * u128::from(calls_before) + u128::from(sample);
        let new_avg = weighted / (u128::from(calls_before) + 1);
        self.avg_execution_time_us
            .store(u64::try_from(new_avg).unwrap_or(u64::MAX), Ordering::Relaxed);
    }

    /// A consistent copy of every counter.
    pub fn snapshot(&self) -> BlockStats {
        let _exclusive = self.gate.write();
        BlockStats {
            total_fuel_used: self.total_fuel_used.load(Ordering::Relaxed),
            contract_calls: self.contract_calls.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            avg_execution_time_us: self.avg_execution_time_us.load(Ordering::Relaxed),
        }
    }

    /// Zero every counter.
    pub fn reset(&self) {
        let _exclusive = self.gate.write();
        self.total_fuel_used.store(0, Ordering::Relaxed);
        self.contract_calls.store(0, Ordering::Relaxed);
        self.cache_hits.store(0, Ordering::Relaxed);
        self.avg_execution_time_us.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn call(fuel_used: u64, micros: u64, cache_hit: bool) -> ExecutionStats {
        ExecutionStats {
            fuel_used,
            elapsed: Duration::from_micros(micros),
            cache_hit,
        }
    }

    #[test]
    fn test_record_accumulates() {
        let stats = StatsCollector::new();
        stats.record(&call(100, 10, false));
        stats.record(&call(50, 20, true));

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.total_fuel_used, 150);
        assert_eq!(snapshot.contract_calls, 2);
        assert_eq!(snapshot.cache_hits, 1);
    }

    #[test]
    fn test_running_average_sequential() {
        let stats = StatsCollector::new();
        stats.record(&call(0, 10, false));
        assert_eq!(stats.snapshot().avg_execution_time_us, 10);

        stats.record(&call(0, 30, false));
        assert_eq!(stats.snapshot().avg_execution_time_us, 20);

        stats.record(&call(0, 50, false));
        assert_eq!(stats.snapshot().avg_execution_time_us, 30);
    }

    #[test]
    fn test_reset_zeroes_everything() {
        let stats = StatsCollector::new();
        stats.record(&call(10, 10, true));
        stats.reset();

        assert_eq!(stats.snapshot(), BlockStats::default());

        stats.record(&call(5, 40, false));
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.contract_calls, 1);
        assert_eq!(snapshot.total_fuel_used, 5);
        assert_eq!(snapshot.avg_execution_time_us, 40);
    }

    #[test]
    fn test_concurrent_records_count_exactly() {
        let stats = Arc::new(StatsCollector::new());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let stats = stats.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        stats.record(&call(1, 5, true));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.contract_calls, 800);
        assert_eq!(snapshot.total_fuel_used, 800);
        assert_eq!(snapshot.cache_hits, 800);
    }

    #[test]
    fn test_block_stats_serializes() {
        let json = serde_json::to_string(&BlockStats::default()).unwrap();
        assert!(json.contains("\"contract_calls\":0"));
    }
}
