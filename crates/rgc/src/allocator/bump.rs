//! Allocator Submodule - Bump Pointer Allocation inside regions
//!
//! Each allocating thread owns one [`RegionBumpAllocator`]. It carves
//! objects out of its current region with a plain pointer bump and asks
//! the space for a fresh region when the current one is exhausted.
//!
//! The allocator keeps its region across cycles. It remembers the
//! region's generation at acquisition and drops the region once that
//! changes (the region went back to the pool) or once the region is
//! flagged for relocation.

use crate::error::{Result, RgcError};
use crate::heap::RegionId;
use crate::logging::SpaceEvent;
use crate::object::{ObjectModel, OBJECT_ALIGNMENT};
use crate::space::RegionSpace;
use crate::util::Alignment;

/// RegionBumpAllocator - thread-local bump allocation in acquired regions
#[derive(Debug, Default)]
pub struct RegionBumpAllocator {
    region: Option<RegionId>,
    cursor: usize,
    limit: usize,
    generation: usize,
    allocated: usize,
    regions_used: usize,
}

impl RegionBumpAllocator {
    /// Create an allocator with no region
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate `size` bytes, aligned to [`OBJECT_ALIGNMENT`].
    ///
    /// Returns the address of uninitialized memory. Fails with
    /// `OutOfMemory` when the request is larger than a region or no region
    /// is available.
    pub fn alloc<M: ObjectModel>(&mut self, space: &RegionSpace<M>, size: usize) -> Result<usize> {
        if size == 0 {
            return Err(RgcError::InvalidArgument(
                "cannot allocate zero bytes".to_string(),
            ));
        }

        let aligned = Alignment::align_up(size, OBJECT_ALIGNMENT);
        if aligned > space.region_size() {
            return Err(RgcError::OutOfMemory {
                requested: size,
                available: space.region_size(),
            });
        }

        if let Some(id) = self.region {
            let region = space.region(id);
            if region.generation() != self.generation || region.relocation_required() {
                self.retire();
            }
        }

        if let Some(address) = self.try_bump(aligned) {
            return Ok(address);
        }

        let id = match space.acquire_region() {
            Some(id) => id,
            None => {
                space.logger().log(SpaceEvent::AllocationFailure { size });
                return Err(RgcError::OutOfMemory {
                    requested: size,
                    available: self.limit - self.cursor,
                });
            }
        };

        let region = space.region(id);
        self.region = Some(id);
        self.cursor = region.base();
        self.limit = region.end();
        self.generation = region.generation();
        self.regions_used += 1;

        // A fresh region always fits a request no larger than a region.
        self.try_bump(aligned).ok_or_else(|| {
            RgcError::Internal(format!("fresh {} cannot hold {} bytes", id, aligned))
        })
    }

    #[inline]
    fn try_bump(&mut self, aligned: usize) -> Option<usize> {
        self.region?;
        let new_cursor = self.cursor.checked_add(aligned)?;
        if new_cursor > self.limit {
            return None;
        }
        let address = self.cursor;
        self.cursor = new_cursor;
        self.allocated += aligned;
        Some(address)
    }

    /// Drop the current region; the next allocation acquires a new one
    pub fn retire(&mut self) {
        self.region = None;
        self.cursor = 0;
        self.limit = 0;
    }

    /// Region currently bumped into
    pub fn region(&self) -> Option<RegionId> {
        self.region
    }

    /// Bytes left in the current region
    pub fn remaining(&self) -> usize {
        self.limit - self.cursor
    }

    /// Total bytes handed out
    pub fn allocated_bytes(&self) -> usize {
        self.allocated
    }

    /// Number of regions acquired
    pub fn regions_used(&self) -> usize {
        self.regions_used
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SpaceConfig;
    use crate::heap::MmapPageSource;
    use crate::object::HeaderObjectModel;

    fn space(regions: usize) -> RegionSpace {
        let config = SpaceConfig {
            pages_per_region: 1,
            region_count: regions,
            ..Default::default()
        };
        RegionSpace::new(config, Box::new(MmapPageSource::new()), HeaderObjectModel).unwrap()
    }

    #[test]
    fn test_bump_within_region() {
        let space = space(2);
        let mut allocator = RegionBumpAllocator::new();
        let a = allocator.alloc(&space, 20).unwrap();
        let b = allocator.alloc(&space, 8).unwrap();
        assert_eq!(b, a + 24);
        assert!(Alignment::is_aligned(a, OBJECT_ALIGNMENT));
        assert_eq!(allocator.regions_used(), 1);
        assert_eq!(allocator.allocated_bytes(), 32);
        assert_eq!(space.region_of(a), allocator.region());
    }

    #[test]
    fn test_moves_to_next_region_when_full() {
        let space = space(2);
        let size = space.region_size();
        let mut allocator = RegionBumpAllocator::new();
        let first = allocator.alloc(&space, size - 64).unwrap();
        let second = allocator.alloc(&space, 128).unwrap();
        assert_ne!(space.region_of(first), space.region_of(second));
        assert_eq!(allocator.regions_used(), 2);
        assert_eq!(allocator.remaining(), size - 128);
    }

    #[test]
    fn test_exhaustion_is_out_of_memory() {
        let space = space(1);
        let size = space.region_size();
        let mut allocator = RegionBumpAllocator::new();
        allocator.alloc(&space, size).unwrap();
        let result = allocator.alloc(&space, 8);
        assert!(matches!(result, Err(RgcError::OutOfMemory { .. })));
        assert!(space
            .logger()
            .events()
            .contains(&SpaceEvent::AllocationFailure { size: 8 }));
    }

    #[test]
    fn test_rejects_zero_and_oversized() {
        let space = space(1);
        let mut allocator = RegionBumpAllocator::new();
        assert!(matches!(
            allocator.alloc(&space, 0),
            Err(RgcError::InvalidArgument(_))
        ));
        assert!(matches!(
            allocator.alloc(&space, space.region_size() + 1),
            Err(RgcError::OutOfMemory { .. })
        ));
        assert_eq!(allocator.regions_used(), 0);
    }

    #[test]
    fn test_region_survives_empty_cycles() {
        let space = space(3);
        let mut allocator = RegionBumpAllocator::new();
        let before = allocator.alloc(&space, 64).unwrap();
        for _ in 0..5 {
            space.prepare();
            space.release();
        }
        let after = allocator.alloc(&space, 64).unwrap();
        assert_eq!(space.region_of(before), space.region_of(after));
        assert_eq!(after, before + 64);
        assert_eq!(allocator.regions_used(), 1);
    }

    #[test]
    fn test_released_region_is_dropped() {
        let space = space(3);
        let mut allocator = RegionBumpAllocator::new();
        let before = allocator.alloc(&space, 64).unwrap();
        let id = space.region_of(before).unwrap();
        space.release_region(id);

        let after = allocator.alloc(&space, 64).unwrap();
        assert_ne!(space.region_of(after), Some(id));
        assert!(space.is_available(id));
    }

    #[test]
    fn test_relocating_region_is_dropped() {
        let space = space(3);
        let mut allocator = RegionBumpAllocator::new();
        let before = allocator.alloc(&space, 64).unwrap();
        let id = space.region_of(before).unwrap();
        space.region(id).set_relocation_required(true);

        let after = allocator.alloc(&space, 64).unwrap();
        assert_ne!(space.region_of(after), Some(id));
        assert!(space.is_consumed(id));
    }
}
