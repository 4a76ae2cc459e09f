//! Region Space - The region-partitioned, evacuating heap space
//!
//! `RegionSpace` ties the pieces together:
//!
//! - a [`RegionTable`] reserved from a [`PageSource`] at construction
//! - a [`FreeRegionAllocator`] owning the available / consumed sets
//! - the [`MarkState`] mark protocol and per-region liveness counters
//! - a pluggable [`CollectionSetSelector`]
//!
//! ## Cycle protocol
//!
//! ```text
//! prepare()             new epoch, flip mark state, reset liveness and flags
//!   mark closure        trace_mark_object ...
//! update_collection_set select regions, set relocation flags
//! prepare_evacuation()  flip mark state so the next closure re-marks
//!   evacuate closure    trace_evacuate_object ...
//! release()             reclaim drained regions, clear flags, reopen them
//! ```
//!
//! A mark-only cycle may skip the two middle steps and call `release()`
//! straight after the mark closure. Evacuating needs a mark field of at
//! least two bits.
//!
//! ## Thread Safety
//!
//! All tracing entry points take `&self` and may be called from several
//! collector threads at once. `prepare`, `prepare_evacuation` and
//! `release` must not overlap with tracing.

use crate::allocator::RegionBumpAllocator;
use crate::config::{ConfigError, SpaceConfig};
use crate::error::{invariant, Result, RgcError};
use crate::heap::{FreeRegionAllocator, PageSource, Region, RegionId, RegionTable};
use crate::logging::{SpaceEvent, SpaceLogger};
use crate::marker::{liveness, LivenessView, MarkState, TransitiveClosure};
use crate::object::{HeaderObjectModel, ObjectModel, ObjectReference};
use crate::relocate::{forwarding, CollectionSet, CollectionSetSelector, LiveRatioSelector};
use crate::stats::SpaceStats;
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

/// Where the space is in its collection cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpacePhase {
    /// No cycle in progress; mutators may allocate
    Idle,
    /// Mark closure running
    Marking,
    /// Evacuating closure running
    Evacuating,
}

/// Region-based evacuating space
pub struct RegionSpace<M: ObjectModel = HeaderObjectModel> {
    config: SpaceConfig,
    model: M,
    table: RegionTable,
    free: FreeRegionAllocator,
    marks: MarkState,
    selector: Box<dyn CollectionSetSelector>,
    collection_set: Mutex<CollectionSet>,
    phase: Mutex<SpacePhase>,
    epoch: AtomicU64,
    cycle_reclaimed: AtomicUsize,
    evacuation_failed: AtomicBool,
    mutator: Mutex<RegionBumpAllocator>,
    stats: SpaceStats,
    logger: SpaceLogger,
    // Keeps the region memory mapped.
    _pages: Box<dyn PageSource>,
}

impl<M: ObjectModel> RegionSpace<M> {
    /// Reserve every region up front and build the region table.
    ///
    /// Each region is a separate reservation, so regions need not be
    /// adjacent. Any reservation failure aborts construction.
    pub fn new(config: SpaceConfig, pages: Box<dyn PageSource>, model: M) -> Result<Self> {
        config.validate()?;

        let region_size = config.region_size();
        let mut bases = Vec::with_capacity(config.region_count);
        for i in 0..config.region_count {
            let base = pages.reserve_pages(config.pages_per_region).map_err(|e| {
                RgcError::HeapInitialization(format!(
                    "reserving region {} of {}: {}",
                    i, config.region_count, e
                ))
            })?;
            bases.push(base);
        }

        let table = RegionTable::new(bases, region_size)
            .map_err(|e| RgcError::HeapInitialization(e.to_string()))?;
        let free = FreeRegionAllocator::new(&table);
        let marks = MarkState::new(config.mark_bits, config.alloc_as_marked);
        let logger = SpaceLogger::new(crate::logging::SpaceLoggerConfig {
            console: config.verbose,
            ..Default::default()
        });

        log::info!(
            "Region space initialized: {} regions x {} bytes = {} bytes ({:#x}..{:#x})",
            table.len(),
            region_size,
            config.extent(),
            table.start(),
            table.end()
        );

        Ok(Self {
            selector: Box::new(LiveRatioSelector::from_config(&config)),
            config,
            model,
            table,
            free,
            marks,
            collection_set: Mutex::new(CollectionSet::new()),
            phase: Mutex::new(SpacePhase::Idle),
            epoch: AtomicU64::new(0),
            cycle_reclaimed: AtomicUsize::new(0),
            evacuation_failed: AtomicBool::new(false),
            mutator: Mutex::new(RegionBumpAllocator::new()),
            stats: SpaceStats::new(),
            logger,
            _pages: pages,
        })
    }

    /// Replace the collection-set policy
    pub fn with_selector(mut self, selector: impl CollectionSetSelector + 'static) -> Self {
        self.set_selector(selector);
        self
    }

    /// Replace the collection-set policy
    pub fn set_selector(&mut self, selector: impl CollectionSetSelector + 'static) {
        log::debug!("Collection set selector: {}", selector.name());
        self.selector = Box::new(selector);
    }

    // === Accessors ===

    pub fn config(&self) -> &SpaceConfig {
        &self.config
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn table(&self) -> &RegionTable {
        &self.table
    }

    pub fn mark_state(&self) -> &MarkState {
        &self.marks
    }

    pub fn stats(&self) -> &SpaceStats {
        &self.stats
    }

    pub fn logger(&self) -> &SpaceLogger {
        &self.logger
    }

    /// Size of every region in bytes
    pub fn region_size(&self) -> usize {
        self.table.region_size()
    }

    /// Number of regions in the space
    pub fn region_count(&self) -> usize {
        self.table.len()
    }

    /// Cycle counter, bumped by every `prepare`
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Current phase
    pub fn phase(&self) -> SpacePhase {
        *self.phase.lock()
    }

    // === Regions ===

    /// Take a region from the available set
    pub fn acquire_region(&self) -> Option<RegionId> {
        match self.free.acquire() {
            Some(id) => {
                self.stats.record_region_acquired();
                log::debug!("Acquired {}", id);
                Some(id)
            }
            None => {
                self.stats.record_acquisition_failure();
                log::debug!("No region available ({} consumed)", self.free.consumed_count());
                None
            }
        }
    }

    /// Return a consumed region to the available set.
    ///
    /// A region still flagged for relocation cannot be acquired again
    /// before [`release`](Self::release) ends the cycle.
    pub fn release_region(&self, id: RegionId) {
        let region = self.table.get(id);
        liveness::reset(region);
        region.advance_generation();
        self.free.release(id, region.relocation_required());
        self.stats.record_region_released();
        log::debug!("Released {}", id);
    }

    /// Region containing `address`
    #[inline]
    pub fn region_of(&self, address: usize) -> Option<RegionId> {
        self.table.region_of(address)
    }

    /// Region by id
    #[inline]
    pub fn region(&self, id: RegionId) -> &Region {
        self.table.get(id)
    }

    /// Region containing `object`, which must be in the space
    #[inline]
    pub(crate) fn region_for(&self, object: ObjectReference) -> &Region {
        match self.table.region_of(object.to_address()) {
            Some(id) => self.table.get(id),
            None => {
                invariant!(false, "object {} is outside the region space", object);
                unreachable!()
            }
        }
    }

    /// Region containing `object`
    pub fn region_of_object(&self, object: ObjectReference) -> Result<RegionId> {
        self.table
            .region_of(object.to_address())
            .ok_or(RgcError::AddressNotInSpace {
                address: object.to_address(),
            })
    }

    /// Check whether `object` lies inside any region
    #[inline]
    pub fn contains(&self, object: ObjectReference) -> bool {
        self.table.region_of(object.to_address()).is_some()
    }

    pub fn is_available(&self, id: RegionId) -> bool {
        self.free.is_available(id)
    }

    pub fn is_consumed(&self, id: RegionId) -> bool {
        self.free.is_consumed(id)
    }

    pub fn available_count(&self) -> usize {
        self.free.available_count()
    }

    pub fn consumed_count(&self) -> usize {
        self.free.consumed_count()
    }

    /// Live bytes recorded for a region this cycle
    pub fn live_bytes(&self, id: RegionId) -> usize {
        self.table.get(id).live_bytes()
    }

    /// Live bytes of every region
    pub fn liveness_snapshot(&self) -> IndexMap<RegionId, usize> {
        liveness::snapshot(&self.table)
    }

    /// Regions selected for evacuation this cycle
    pub fn collection_set(&self) -> CollectionSet {
        self.collection_set.lock().clone()
    }

    // === Objects ===

    /// Check whether `object` has been reached this cycle.
    ///
    /// Objects in a relocation-required region count as live once they
    /// are forwarded or being forwarded. Between cycles the answer refers
    /// to the last closure, and objects allocated since then read as live.
    pub fn is_live(&self, object: ObjectReference) -> bool {
        let region = self.region_for(object);
        if region.relocation_required() {
            let word = self.model.load_status(object, Ordering::Acquire);
            if forwarding::is_forwarded_or_being_forwarded(word) {
                return true;
            }
        }
        self.marks.is_marked(&self.model, object)
    }

    /// Mark in place; new objects are handed to `trace` and their size
    /// is added to their region's live bytes.
    pub fn trace_mark_object<T: TransitiveClosure>(
        &self,
        trace: &mut T,
        object: ObjectReference,
    ) -> ObjectReference {
        let region = self.region_for(object);
        if self.marks.test_and_mark(&self.model, object) {
            let size = self.model.size_of(object);
            liveness::record_live(region, size);
            self.stats.record_mark(size);
            trace.process_node(object);
        }
        object
    }

    /// Allocate `size` bytes for a mutator.
    ///
    /// Returns raw memory; initialize the object and call
    /// [`post_alloc`](Self::post_alloc) before it becomes reachable.
    pub fn allocate(&self, size: usize) -> Result<usize> {
        self.mutator.lock().alloc(self, size)
    }

    /// Initialize the mark field of a freshly allocated object.
    ///
    /// Between cycles the object is stamped so that the next cycle sees it
    /// unmarked. During a cycle it is unmarked too, unless the space
    /// allocates marked; then its size counts as live right away.
    pub fn post_alloc(&self, object: ObjectReference) {
        self.marks.initialize_header(&self.model, object, true);
        if self.marks.allocates_marked() {
            liveness::record_live(self.region_for(object), self.model.size_of(object));
        }
    }

    /// Initialize the mark field of an evacuated copy
    pub fn post_copy(&self, object: ObjectReference) {
        self.marks.initialize_header(&self.model, object, false);
    }

    // === Cycle ===

    /// Start a collection cycle
    pub fn prepare(&self) {
        {
            let mut phase = self.phase.lock();
            invariant!(
                *phase == SpacePhase::Idle,
                "prepare called during {:?}",
                *phase
            );
            *phase = SpacePhase::Marking;
        }

        let cycle = self.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        self.marks.begin_cycle();
        for region in self.table.iter() {
            liveness::reset(region);
            region.set_relocation_required(false);
        }
        self.collection_set.lock().clear();
        self.cycle_reclaimed.store(0, Ordering::Relaxed);
        self.evacuation_failed.store(false, Ordering::Release);
        self.stats.record_cycle();

        log::info!("Cycle {} started", cycle);
        self.logger.log(SpaceEvent::CycleStart { cycle });
    }

    /// Hand the recorded liveness to the selector and flag its choice.
    ///
    /// Calling it again in the same cycle replaces the earlier choice.
    /// Returns the number of regions selected.
    pub fn update_collection_set(&self) -> usize {
        let phase = self.phase();
        invariant!(
            phase == SpacePhase::Marking,
            "update_collection_set called during {:?}",
            phase
        );

        let mut set = self.collection_set.lock();
        for &id in set.iter() {
            self.table.get(id).set_relocation_required(false);
        }
        set.clear();

        let view = LivenessView {
            region_size: self.region_size(),
            available_regions: self.free.acquirable_count(),
            consumed: self
                .free
                .consumed()
                .into_iter()
                .map(|id| (id, self.table.get(id).live_bytes()))
                .collect(),
        };

        let selected = self.selector.select(&view);
        let mut live_bytes = 0;
        for id in selected {
            if !view.consumed.contains_key(&id) {
                log::warn!("Selector {} chose unconsumed {}", self.selector.name(), id);
                continue;
            }
            self.table.get(id).set_relocation_required(true);
            live_bytes += view.consumed[&id];
            set.insert(id);
        }

        let cycle = self.epoch();
        log::info!(
            "Cycle {}: {} selected {} of {} consumed regions ({} live bytes)",
            cycle,
            self.selector.name(),
            set.len(),
            view.consumed.len(),
            live_bytes
        );
        self.logger.log(SpaceEvent::CollectionSetSelected {
            cycle,
            regions: set.len(),
            live_bytes,
        });
        set.len()
    }

    /// Switch from the mark closure to the evacuating closure.
    ///
    /// Fails with a configuration error when the mark field is one bit
    /// wide; the cycle then stays in the marking phase.
    pub fn prepare_evacuation(&self) -> Result<()> {
        if !self.marks.supports_evacuation() {
            return Err(ConfigError::InvalidMarkBits(format!(
                "evacuation needs at least 2 mark bits, space has {}",
                self.config.mark_bits
            ))
            .into());
        }
        let mut phase = self.phase.lock();
        invariant!(
            *phase == SpacePhase::Marking,
            "prepare_evacuation called during {:?}",
            *phase
        );
        *phase = SpacePhase::Evacuating;
        self.marks.flip();
        Ok(())
    }

    /// End the cycle.
    ///
    /// Collection-set regions left with no live bytes are reclaimed here;
    /// most are already reclaimed by the thread that drained them. Returns
    /// the number of regions reclaimed during the whole cycle.
    pub fn release(&self) -> usize {
        {
            let mut phase = self.phase.lock();
            invariant!(
                *phase != SpacePhase::Idle,
                "release called without a cycle in progress"
            );
            *phase = SpacePhase::Idle;
        }

        let cycle = self.epoch();
        let set = std::mem::take(&mut *self.collection_set.lock());
        for &id in &set {
            let region = self.table.get(id);
            if self.free.is_consumed(id) && region.live_bytes() == 0 {
                self.release_region(id);
                self.note_reclaimed(id);
            } else if region.live_bytes() != 0 {
                log::warn!(
                    "Cycle {}: {} keeps {} live bytes after evacuation",
                    cycle,
                    id,
                    region.live_bytes()
                );
            }
        }
        for &id in &set {
            self.table.get(id).set_relocation_required(false);
        }
        let reopened = self.free.reopen();
        log::debug!("Cycle {}: {} parked regions reopened", cycle, reopened);

        self.marks.end_cycle();

        let reclaimed = self.cycle_reclaimed.load(Ordering::Relaxed);
        log::info!("Cycle {} released ({} regions reclaimed)", cycle, reclaimed);
        reclaimed
    }

    /// Record a region freed during the current cycle
    pub(crate) fn note_reclaimed(&self, id: RegionId) {
        self.cycle_reclaimed.fetch_add(1, Ordering::Relaxed);
        self.logger.log(SpaceEvent::RegionReclaimed {
            cycle: self.epoch(),
            region: id.index(),
        });
    }

    /// Check whether a copy has failed this cycle.
    ///
    /// Once set, every later claim fails too, so an object left in place
    /// after a failed copy is never copied by another thread.
    pub fn evacuation_failed(&self) -> bool {
        self.evacuation_failed.load(Ordering::Acquire)
    }

    pub(crate) fn set_evacuation_failed(&self) {
        self.evacuation_failed.store(true, Ordering::Release);
    }

    /// Key figures for debugging
    pub fn diagnostics(&self) -> IndexMap<String, String> {
        let mut info = IndexMap::new();
        info.insert("phase".to_string(), format!("{:?}", self.phase()));
        info.insert("epoch".to_string(), self.epoch().to_string());
        info.insert("regions".to_string(), self.region_count().to_string());
        info.insert("region_size".to_string(), self.region_size().to_string());
        info.insert("extent".to_string(), self.config.extent().to_string());
        info.insert("available".to_string(), self.available_count().to_string());
        info.insert("consumed".to_string(), self.consumed_count().to_string());
        info.insert(
            "mark_value".to_string(),
            self.marks.mark_value().to_string(),
        );
        info.insert(
            "live_bytes".to_string(),
            self.table
                .iter()
                .map(|r| r.live_bytes())
                .sum::<usize>()
                .to_string(),
        );
        info
    }
}
