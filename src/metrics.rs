//! Per-operator counters, updated with plain atomics rather than a
//! metrics-exporter crate (no exporter/transport is in scope). The only
//! externally observable side channel besides the document tree itself.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::RwLock;

/// An immutable point-in-time view of one operator's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OperatorMetrics {
    pub count: u64,
    pub error_count: u64,
    pub total_duration: Duration,
    pub cache_hits: u64,
}

#[derive(Default)]
struct Counters {
    count: AtomicU64,
    error_count: AtomicU64,
    total_duration_nanos: AtomicU64,
    cache_hits: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> OperatorMetrics {
        OperatorMetrics {
            count: self.count.load(Ordering::Relaxed),
            error_count: self.error_count.load(Ordering::Relaxed),
            total_duration: Duration::from_nanos(self.total_duration_nanos.load(Ordering::Relaxed)),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
        }
    }
}

/// The process-wide metrics recorder, one [`Counters`] per operator name.
pub struct Recorder {
    by_operator: RwLock<HashMap<String, Counters>>,
}

impl Recorder {
    pub fn new() -> Self {
        Recorder {
            by_operator: RwLock::new(HashMap::new()),
        }
    }

    fn counters_for(&self, op: &str) -> parking_lot::MappedRwLockReadGuard<'_, Counters> {
        if !self.by_operator.read().contains_key(op) {
            self.by_operator
                .write()
                .entry(op.to_string())
                .or_insert_with(Counters::default);
        }
        parking_lot::RwLockReadGuard::map(self.by_operator.read(), |m| m.get(op).unwrap())
    }

    pub fn record_run(&self, op: &str, duration: Duration, failed: bool) {
        let counters = self.counters_for(op);
        counters.count.fetch_add(1, Ordering::Relaxed);
        if failed {
            counters.error_count.fetch_add(1, Ordering::Relaxed);
        }
        counters
            .total_duration_nanos
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self, op: &str) {
        self.counters_for(op).cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> HashMap<String, OperatorMetrics> {
        self.by_operator
            .read()
            .iter()
            .map(|(name, counters)| (name.clone(), counters.snapshot()))
            .collect()
    }
}

impl Default for Recorder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn records_successful_and_failed_runs() {
        let recorder = Recorder::new();
        recorder.record_run("grab", Duration::from_millis(5), false);
        recorder.record_run("grab", Duration::from_millis(10), true);
        let snapshot = recorder.snapshot();
        let grab = snapshot.get("grab").unwrap();
        assert_eq!(grab.count, 2);
        assert_eq!(grab.error_count, 1);
        assert_eq!(grab.total_duration, Duration::from_millis(15));
    }

    #[test]
    fn tracks_cache_hits_independently() {
        let recorder = Recorder::new();
        recorder.record_cache_hit("vault");
        recorder.record_cache_hit("vault");
        assert_eq!(recorder.snapshot().get("vault").unwrap().cache_hits, 2);
    }
}
