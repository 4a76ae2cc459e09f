//! # RGC - Region-Based Evacuating Garbage Collector Core
//!
//! RGC is the region-space core of a parallel, stop-the-world tracing
//! collector. The heap is split into fixed-size regions; a collection marks
//! reachable objects, picks mostly-empty regions, copies their survivors
//! out and returns the emptied regions to the free pool.
//!
//! ## Overview
//!
//! - **Region Table**: fixed set of equally sized regions, resolved from any
//!   interior address by binary search
//! - **Free-Region Allocator**: available / consumed sets under one lock
//! - **Mark Protocol**: a mark value in the header's available byte that
//!   flips every cycle, so no sweep is needed to clear marks
//! - **Liveness Tracking**: per-region live-byte counters
//! - **Evacuation**: claim / copy / publish forwarding protocol, safe under
//!   any number of collector threads
//! - **Collection-Set Selection**: pluggable policy over recorded liveness
//!
//! ## Quick Start
//!
//! ```rust
//! use rgc::{HeaderObjectModel, MmapPageSource, RegionCollector, RegionSpace, SpaceConfig};
//!
//! fn main() -> Result<(), rgc::RgcError> {
//!     let config = SpaceConfig {
//!         pages_per_region: 4,
//!         region_count: 8,
//!         ..Default::default()
//!     };
//!     let space = RegionSpace::new(config, Box::new(MmapPageSource::new()), HeaderObjectModel)?;
//!
//!     // Allocate and initialize an object with one reference slot
//!     let address = space.allocate(64)?;
//!     let object = unsafe { HeaderObjectModel::initialize(address, 64, 1)? };
//!     space.post_alloc(object);
//!
//!     // Roots are words holding references; evacuation rewrites them
//!     let mut root = object.to_address();
//!     let slots = [&mut root as *mut usize as usize];
//!
//!     let summary = RegionCollector::new(&space).collect(&slots)?;
//!     assert_eq!(summary.objects_marked, 1);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                  RegionCollector                         │
//! │   roots ─▶ WorkQueue ─▶ worker threads (scan + trace)    │
//! └───────────────────────────┬─────────────────────────────┘
//!                             │ trace_mark_object / trace_evacuate_object
//! ┌───────────────────────────▼─────────────────────────────┐
//! │                    RegionSpace                           │
//! │  MarkState   liveness   forwarding   CollectionSet       │
//! │  ┌───────────────────────────────────────────────┐      │
//! │  │ RegionTable + FreeRegionAllocator             │      │
//! │  └───────────────────────────────────────────────┘      │
//! └───────────────────────────┬─────────────────────────────┘
//!                             │ reserve_pages
//!                       PageSource (mmap)
//! ```
//!
//! ### Cycle Phases
//!
//! 1. **Prepare**: flip the mark state, reset liveness and relocation flags
//! 2. **Mark**: parallel closure, records live bytes per region
//! 3. **Select**: the selector flags the collection set
//! 4. **Evacuate**: flip again, then a parallel closure copies objects out
//!    of flagged regions (needs `mark_bits >= 2`)
//! 5. **Release**: reclaim drained regions, reopen them for allocation
//!
//! ### Header Available Byte
//!
//! ```text
//!  7   6   5   4   3   2   1   0
//! ┌───────┬───────────────┬───────┐
//! │runtime│  mark (1..4)  │ fwd   │
//! └───────┴───────────────┴───────┘
//! ```
//!
//! ## Safety
//!
//! The space hands out raw addresses. Embedders must:
//!
//! 1. **Initialize before publishing**: call `post_alloc` before another
//!    thread can see a new object
//! 2. **Pass every root**: unlisted references are not updated when their
//!    target moves
//! 3. **Stop mutators during a cycle**: collection is stop-the-world
//!
//! ### Thread Safety
//!
//! - `RegionSpace` is `Send + Sync`; tracing entry points may run on many
//!   threads at once
//! - `prepare`, `prepare_evacuation` and `release` must not overlap tracing
//!
//! ## Modules
//!
//! - [`allocator`]: Bump allocation inside regions
//! - [`config`]: Space configuration parameters and validation
//! - [`error`]: Error types and invariant checks
//! - [`gc`]: Parallel collection cycles
//! - [`heap`]: Page reservation, regions and the free-region allocator
//! - [`logging`]: Structured space events
//! - [`marker`]: Mark protocol, liveness and tracing
//! - [`object`]: Object model seam and header layout
//! - [`relocate`]: Forwarding protocol and collection-set selection
//! - [`space`]: The region space
//! - [`stats`]: Counters and phase timing
//! - [`util`]: Alignment and atomic helpers

// Core modules
pub mod config;
pub mod error;
pub mod gc;
pub mod space;

// Memory management subsystems
pub mod allocator;
pub mod heap;
pub mod object;

// Collection components
pub mod marker;
pub mod relocate;

// Monitoring
pub mod logging;
pub mod stats;

// Utilities
pub mod util;

// Re-export main types for convenience
pub use config::{ConfigError, SpaceConfig};
pub use error::{Result, RgcError};
pub use gc::{CycleSummary, RegionCollector};
pub use heap::{MmapPageSource, PageSource, RegionId};
pub use marker::{RegionTraceLocal, TraceKind, TransitiveClosure};
pub use object::{HeaderObjectModel, ObjectModel, ObjectReference};
pub use relocate::{
    CollectionSet, CollectionSetSelector, EmptySelector, ExplicitSelector, LiveRatioSelector,
};
pub use space::{RegionSpace, SpacePhase};

/// RGC version string from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Create a region space from `RGC_*` environment variables
///
/// Uses [`SpaceConfig::from_env`], anonymous memory maps and the built-in
/// header layout.
///
/// # Examples
///
/// ```rust,no_run
/// let space = rgc::init()?;
/// let address = space.allocate(64)?;
/// # Ok::<(), rgc::RgcError>(())
/// ```
pub fn init() -> Result<RegionSpace> {
    init_with_config(SpaceConfig::from_env())
}

/// Create a region space with a custom configuration
///
/// # Examples
///
/// ```rust
/// let config = rgc::SpaceConfig {
///     pages_per_region: 16,
///     region_count: 64,
///     mark_bits: 2,
///     ..Default::default()
/// };
///
/// let space = rgc::init_with_config(config)?;
/// assert_eq!(space.region_count(), 64);
/// # Ok::<(), rgc::RgcError>(())
/// ```
pub fn init_with_config(config: SpaceConfig) -> Result<RegionSpace> {
    RegionSpace::new(config, Box::new(MmapPageSource::new()), HeaderObjectModel)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_with_small_config() {
        let config = SpaceConfig {
            pages_per_region: 2,
            region_count: 3,
            ..Default::default()
        };
        let space = init_with_config(config).unwrap();
        assert_eq!(space.region_count(), 3);
        assert_eq!(space.available_count(), 3);
    }

    #[test]
    fn test_init_rejects_bad_config() {
        let config = SpaceConfig {
            region_count: 0,
            ..Default::default()
        };
        assert!(matches!(
            init_with_config(config),
            Err(RgcError::Configuration(_))
        ));
    }

    #[test]
    fn test_version_not_empty() {
        assert!(!VERSION.is_empty());
    }
}
