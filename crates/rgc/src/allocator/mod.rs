//! Allocator Module - Allocation inside regions
//!
//! Mutators and evacuating collector threads both allocate with a
//! [`RegionBumpAllocator`]. Regions come from the space's free-region
//! allocator and are never shared between two bump allocators.

pub mod bump;

pub use bump::RegionBumpAllocator;
