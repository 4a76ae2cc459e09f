//! Stats Module - Region space counters
//!
//! Counters are bumped from collector threads with `Relaxed` ordering and
//! read back as a consistent-enough [`StatsSnapshot`] between cycles.

pub mod timer;

pub use timer::PhaseTimer;

use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// SpaceStats - statistics collector for one region space
#[derive(Debug, Default)]
pub struct SpaceStats {
    cycles: AtomicU64,
    objects_marked: AtomicUsize,
    bytes_marked: AtomicUsize,
    objects_evacuated: AtomicUsize,
    bytes_evacuated: AtomicUsize,
    forwarding_waits: AtomicUsize,
    regions_acquired: AtomicUsize,
    regions_released: AtomicUsize,
    acquisition_failures: AtomicUsize,
    copy_failures: AtomicUsize,
}

impl SpaceStats {
    /// Create new stats collector
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_cycle(&self) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an object newly marked in place
    pub fn record_mark(&self, bytes: usize) {
        self.objects_marked.fetch_add(1, Ordering::Relaxed);
        self.bytes_marked.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Record an object copied out of a collection-set region
    pub fn record_evacuation(&self, bytes: usize) {
        self.objects_evacuated.fetch_add(1, Ordering::Relaxed);
        self.bytes_evacuated.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Record a thread that waited for another thread's copy
    pub fn record_forwarding_wait(&self) {
        self.forwarding_waits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_region_acquired(&self) {
        self.regions_acquired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_region_released(&self) {
        self.regions_released.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_acquisition_failure(&self) {
        self.acquisition_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_copy_failure(&self) {
        self.copy_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of every counter
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            objects_marked: self.objects_marked.load(Ordering::Relaxed),
            bytes_marked: self.bytes_marked.load(Ordering::Relaxed),
            objects_evacuated: self.objects_evacuated.load(Ordering::Relaxed),
            bytes_evacuated: self.bytes_evacuated.load(Ordering::Relaxed),
            forwarding_waits: self.forwarding_waits.load(Ordering::Relaxed),
            regions_acquired: self.regions_acquired.load(Ordering::Relaxed),
            regions_released: self.regions_released.load(Ordering::Relaxed),
            acquisition_failures: self.acquisition_failures.load(Ordering::Relaxed),
            copy_failures: self.copy_failures.load(Ordering::Relaxed),
        }
    }

    /// Reset statistics
    pub fn reset(&self) {
        self.cycles.store(0, Ordering::Relaxed);
        for counter in [
            &self.objects_marked,
            &self.bytes_marked,
            &self.objects_evacuated,
            &self.bytes_evacuated,
            &self.forwarding_waits,
            &self.regions_acquired,
            &self.regions_released,
            &self.acquisition_failures,
            &self.copy_failures,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// Point-in-time copy of [`SpaceStats`]
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub cycles: u64,
    pub objects_marked: usize,
    pub bytes_marked: usize,
    pub objects_evacuated: usize,
    pub bytes_evacuated: usize,
    pub forwarding_waits: usize,
    pub regions_acquired: usize,
    pub regions_released: usize,
    pub acquisition_failures: usize,
    pub copy_failures: usize,
}

impl StatsSnapshot {
    /// Counter differences since an earlier snapshot
    pub fn since(&self, earlier: &StatsSnapshot) -> StatsSnapshot {
        StatsSnapshot {
            cycles: self.cycles - earlier.cycles,
            objects_marked: self.objects_marked - earlier.objects_marked,
            bytes_marked: self.bytes_marked - earlier.bytes_marked,
            objects_evacuated: self.objects_evacuated - earlier.objects_evacuated,
            bytes_evacuated: self.bytes_evacuated - earlier.bytes_evacuated,
            forwarding_waits: self.forwarding_waits - earlier.forwarding_waits,
            regions_acquired: self.regions_acquired - earlier.regions_acquired,
            regions_released: self.regions_released - earlier.regions_released,
            acquisition_failures: self.acquisition_failures - earlier.acquisition_failures,
            copy_failures: self.copy_failures - earlier.copy_failures,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_and_snapshot() {
        let stats = SpaceStats::new();
        stats.record_mark(64);
        stats.record_mark(128);
        stats.record_evacuation(64);
        stats.record_region_acquired();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.objects_marked, 2);
        assert_eq!(snapshot.bytes_marked, 192);
        assert_eq!(snapshot.objects_evacuated, 1);
        assert_eq!(snapshot.regions_acquired, 1);

        stats.record_mark(8);
        let delta = stats.snapshot().since(&snapshot);
        assert_eq!(delta.objects_marked, 1);
        assert_eq!(delta.bytes_marked, 8);

        stats.reset();
        assert_eq!(stats.snapshot(), StatsSnapshot::default());
    }

    #[test]
    fn test_snapshot_serializes() {
        let json = serde_json::to_string(&SpaceStats::new().snapshot()).unwrap();
        assert!(json.contains("\"copy_failures\":0"));
    }
}
