//! Liveness Tracker - Per-region live-byte accounting
//!
//! Marking adds an object's size to its region; evacuation subtracts it
//! again. The thread whose subtraction brings a region to zero is the one
//! that returns it to the available set.

use crate::error::invariant;
use crate::heap::{Region, RegionId, RegionTable};
use indexmap::IndexMap;
use std::sync::atomic::Ordering;

/// Add `size` live bytes to `region`
#[inline]
pub fn record_live(region: &Region, size: usize) {
    let previous = region.live_counter().fetch_add(size, Ordering::AcqRel);
    invariant!(
        previous + size <= region.size(),
        "{} live bytes {} exceed region size {}",
        region.id(),
        previous + size,
        region.size()
    );
}

/// Subtract `size` live bytes from `region`.
///
/// Returns true for the single caller that brings the count to zero.
#[inline]
pub fn record_reclaimed(region: &Region, size: usize) -> bool {
    let previous = region.live_counter().fetch_sub(size, Ordering::AcqRel);
    invariant!(
        previous >= size,
        "{} live bytes underflow: {} - {}",
        region.id(),
        previous,
        size
    );
    previous == size
}

/// Forget everything recorded for `region`
#[inline]
pub fn reset(region: &Region) {
    region.live_counter().store(0, Ordering::Release);
}

/// Live bytes of every region, in address order
pub fn snapshot(table: &RegionTable) -> IndexMap<RegionId, usize> {
    table.iter().map(|r| (r.id(), r.live_bytes())).collect()
}

/// What a collection-set selector gets to look at
#[derive(Debug, Clone)]
pub struct LivenessView {
    /// Size of every region
    pub region_size: usize,
    /// Regions in the available set
    pub available_regions: usize,
    /// Live bytes of each consumed region
    pub consumed: IndexMap<RegionId, usize>,
}

impl LivenessView {
    /// Bytes of free regions that copies could be placed in
    pub fn available_bytes(&self) -> usize {
        self.available_regions * self.region_size
    }

    /// Total live bytes in consumed regions
    pub fn total_live(&self) -> usize {
        self.consumed.values().sum()
    }
}
