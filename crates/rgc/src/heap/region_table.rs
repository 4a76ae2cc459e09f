//! Region Table - Sorted region array, resolver and free-region allocator
//!
//! The table is built once and never changes shape. Lookups use an
//! interval binary search, so regions do not need to be adjacent.
//!
//! Region sets (available / consumed) live in [`FreeRegionAllocator`],
//! behind a single lock with O(1) critical sections. Regions freed while
//! still flagged for relocation are parked until the cycle ends; they
//! count as available but are never handed out before then.

use super::region::{Region, RegionId};
use crate::error::{invariant, Result, RgcError};
use indexmap::IndexSet;
use parking_lot::Mutex;
use std::cmp::Ordering;

/// Fixed table of regions sorted by base address
pub struct RegionTable {
    regions: Vec<Region>,
    region_size: usize,
}

impl RegionTable {
    /// Build a table from region base addresses.
    ///
    /// Bases are sorted; ids are assigned in address order. Overlapping
    /// regions are rejected.
    pub fn new(mut bases: Vec<usize>, region_size: usize) -> Result<Self> {
        if region_size == 0 {
            return Err(RgcError::InvalidArgument(
                "region size must be > 0".to_string(),
            ));
        }

        bases.sort_unstable();
        for pair in bases.windows(2) {
            if pair[0].checked_add(region_size).map_or(true, |end| end > pair[1]) {
                return Err(RgcError::InvalidArgument(format!(
                    "regions at {:#x} and {:#x} overlap",
                    pair[0], pair[1]
                )));
            }
        }
        if let Some(&last) = bases.last() {
            if last.checked_add(region_size).is_none() {
                return Err(RgcError::InvalidArgument(format!(
                    "region at {:#x} wraps the address space",
                    last
                )));
            }
        }

        let regions = bases
            .into_iter()
            .enumerate()
            .map(|(i, base)| Region::new(RegionId::new(i), base, region_size))
            .collect();

        Ok(Self {
            regions,
            region_size,
        })
    }

    /// Resolve the region containing `address`.
    ///
    /// Returns `None` for addresses below, between or above all regions.
    pub fn region_of(&self, address: usize) -> Option<RegionId> {
        self.regions
            .binary_search_by(|region| {
                if address < region.base() {
                    Ordering::Greater
                } else if address >= region.end() {
                    Ordering::Less
                } else {
                    Ordering::Equal
                }
            })
            .ok()
            .map(RegionId::new)
    }

    /// Region by id
    #[inline]
    pub fn get(&self, id: RegionId) -> &Region {
        invariant!(
            id.index() < self.regions.len(),
            "{} out of range ({} regions)",
            id,
            self.regions.len()
        );
        &self.regions[id.index()]
    }

    /// All regions in address order
    pub fn iter(&self) -> std::slice::Iter<'_, Region> {
        self.regions.iter()
    }

    /// Number of regions
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Check for an empty table
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Size of every region
    pub fn region_size(&self) -> usize {
        self.region_size
    }

    /// Lowest covered address
    pub fn start(&self) -> usize {
        self.regions.first().map_or(0, |r| r.base())
    }

    /// One past the highest covered address
    pub fn end(&self) -> usize {
        self.regions.last().map_or(0, |r| r.end())
    }
}

struct RegionSets {
    available: IndexSet<RegionId>,
    // Freed during the current cycle; not acquirable until `reopen`.
    parked: IndexSet<RegionId>,
    consumed: IndexSet<RegionId>,
}

/// Available / consumed region sets under one lock
pub struct FreeRegionAllocator {
    sets: Mutex<RegionSets>,
}

impl FreeRegionAllocator {
    /// Start with every region of `table` available
    pub fn new(table: &RegionTable) -> Self {
        // Reverse so regions are handed out in address order.
        let available = table.iter().rev().map(|r| r.id()).collect();
        Self {
            sets: Mutex::new(RegionSets {
                available,
                parked: IndexSet::new(),
                consumed: IndexSet::new(),
            }),
        }
    }

    /// Move an available region to the consumed set
    pub fn acquire(&self) -> Option<RegionId> {
        let mut sets = self.sets.lock();
        let id = sets.available.pop()?;
        sets.consumed.insert(id);
        Some(id)
    }

    /// Move a consumed region back to the available set.
    ///
    /// With `park` set the region is withheld from [`acquire`](Self::acquire)
    /// until [`reopen`](Self::reopen).
    pub fn release(&self, id: RegionId, park: bool) {
        let mut sets = self.sets.lock();
        invariant!(
            !sets.available.contains(&id) && !sets.parked.contains(&id),
            "{} released while already available",
            id
        );
        let was_consumed = sets.consumed.swap_remove(&id);
        invariant!(was_consumed, "{} released but never acquired", id);
        if park {
            sets.parked.insert(id);
        } else {
            sets.available.insert(id);
        }
    }

    /// Make every parked region acquirable again; returns how many
    pub fn reopen(&self) -> usize {
        let mut sets = self.sets.lock();
        let parked = std::mem::take(&mut sets.parked);
        let count = parked.len();
        sets.available.extend(parked);
        count
    }

    /// Check if a region is in the available set
    pub fn is_available(&self, id: RegionId) -> bool {
        let sets = self.sets.lock();
        sets.available.contains(&id) || sets.parked.contains(&id)
    }

    /// Check if a region is in the consumed set
    pub fn is_consumed(&self, id: RegionId) -> bool {
        self.sets.lock().consumed.contains(&id)
    }

    /// Size of the available set
    pub fn available_count(&self) -> usize {
        let sets = self.sets.lock();
        sets.available.len() + sets.parked.len()
    }

    /// Available regions that can be acquired right now
    pub fn acquirable_count(&self) -> usize {
        self.sets.lock().available.len()
    }

    /// Size of the consumed set
    pub fn consumed_count(&self) -> usize {
        self.sets.lock().consumed.len()
    }

    /// Snapshot of the consumed set
    pub fn consumed(&self) -> Vec<RegionId> {
        self.sets.lock().consumed.iter().copied().collect()
    }
}
