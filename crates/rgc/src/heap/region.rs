//! Region - Unit of allocation and reclamation
//!
//! A region is a fixed-size contiguous span of heap memory. Regions are
//! created once when the space is built and are never returned to the OS
//! individually.
//!
//! Region Lifecycle:
//! ```text
//! Available ──▶ Consumed ──▶ Relocation required ──▶ Evacuated ──▶ Available
//!                   │                                                  ▲
//!                   └──────────────── (dead at cycle end) ─────────────┘
//! ```
//!
//! # Memory Ordering Model
//!
//! ## Live bytes (AtomicUsize)
//! - **record / reclaim:** `AcqRel` - the thread that drains a region to
//!   zero must observe every other thread's decrement before releasing it.
//! - **reads:** `Acquire`.
//!
//! ## Generation (AtomicUsize)
//! - Bumped each time the region returns to the free pool. Bump
//!   allocators compare it against the value seen at acquisition.
//!
//! ## Relocation-required flag (AtomicBool)
//! - Written by the selector between closures, read by tracing threads.
//!   Threads are started after selection, so `Relaxed` loads suffice once
//!   the flag is published with `Release`.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Index of a region in the sorted region table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionId(usize);

impl RegionId {
    /// Wrap a table index
    pub const fn new(index: usize) -> Self {
        RegionId(index)
    }

    /// Table index
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "region#{}", self.0)
    }
}

/// Region - unit of heap management
pub struct Region {
    id: RegionId,

    /// Start address of region
    base: usize,

    /// Region size in bytes
    size: usize,

    /// Bytes of objects found live in the current cycle
    live_bytes: AtomicUsize,

    /// Selected for evacuation in the current cycle
    relocation_required: AtomicBool,

    /// Number of times the region has been released
    generation: AtomicUsize,
}

impl Region {
    /// Create a region covering `[base, base + size)`
    pub fn new(id: RegionId, base: usize, size: usize) -> Self {
        Self {
            id,
            base,
            size,
            live_bytes: AtomicUsize::new(0),
            relocation_required: AtomicBool::new(false),
            generation: AtomicUsize::new(0),
        }
    }

    /// Region id
    #[inline]
    pub fn id(&self) -> RegionId {
        self.id
    }

    /// Start address
    #[inline]
    pub fn base(&self) -> usize {
        self.base
    }

    /// Size in bytes
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// End address (exclusive)
    #[inline]
    pub fn end(&self) -> usize {
        self.base + self.size
    }

    /// Check if address is inside the region
    #[inline]
    pub fn contains(&self, address: usize) -> bool {
        address >= self.base && address < self.end()
    }

    /// Live bytes recorded this cycle
    #[inline]
    pub fn live_bytes(&self) -> usize {
        self.live_bytes.load(Ordering::Acquire)
    }

    pub(crate) fn live_counter(&self) -> &AtomicUsize {
        &self.live_bytes
    }

    /// Check if region is in the collection set
    #[inline]
    pub fn relocation_required(&self) -> bool {
        self.relocation_required.load(Ordering::Acquire)
    }

    /// Set or clear the relocation-required flag
    pub fn set_relocation_required(&self, required: bool) {
        self.relocation_required.store(required, Ordering::Release);
    }

    /// Release count; changes whenever the region goes back to the pool
    #[inline]
    pub fn generation(&self) -> usize {
        self.generation.load(Ordering::Acquire)
    }

    pub(crate) fn advance_generation(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }
}

impl fmt::Debug for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Region")
            .field("id", &self.id.index())
            .field("base", &format_args!("{:#x}", self.base))
            .field("size", &self.size)
            .field("live_bytes", &self.live_bytes())
            .field("relocation_required", &self.relocation_required())
            .field("generation", &self.generation())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_bounds() {
        let region = Region::new(RegionId::new(2), 0x10000, 0x4000);
        assert_eq!(region.id().index(), 2);
        assert_eq!(region.end(), 0x14000);
        assert!(region.contains(0x10000));
        assert!(region.contains(0x13FFF));
        assert!(!region.contains(0x14000));
        assert!(!region.contains(0xFFFF));
    }

    #[test]
    fn test_relocation_flag() {
        let region = Region::new(RegionId::new(0), 0x1000, 0x1000);
        assert!(!region.relocation_required());
        region.set_relocation_required(true);
        assert!(region.relocation_required());
        region.set_relocation_required(false);
        assert!(!region.relocation_required());
        assert_eq!(region.live_bytes(), 0);
    }
}
