//! Heap Management Module - Region-Based Memory Management
//!
//! The heap is partitioned into fixed-size regions reserved up front from
//! a [`PageSource`]. Each region moves between the available and consumed
//! sets owned by [`FreeRegionAllocator`]; [`RegionTable`] resolves any
//! address to its owning region.

pub mod page;
pub mod region;
pub mod region_table;

pub use page::{MmapPageSource, PageSource};
pub use region::{Region, RegionId};
pub use region_table::{FreeRegionAllocator, RegionTable};
