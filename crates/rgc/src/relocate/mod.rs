//! Relocate Module - Evacuation of relocation-required regions
//!
//! During the evacuating closure every object reached inside a region the
//! collection set flagged is copied out exactly once:
//!
//! 1. the first thread to reach it claims the forwarding field
//! 2. the winner bump-allocates a copy, publishes the forwarding pointer
//!    and queues the copy for scanning
//! 3. every other thread spins until the pointer appears and reuses it
//!
//! Objects in unflagged regions are marked in place. When the last live
//! byte of a source region has been copied out, the region goes straight
//! back to the free pool, parked until the cycle ends.

pub mod collection_set;
pub mod forwarding;

pub use collection_set::{
    CollectionSet, CollectionSetSelector, EmptySelector, ExplicitSelector, LiveRatioSelector,
};
pub use forwarding::ForwardingState;

use crate::allocator::RegionBumpAllocator;
use crate::error::{invariant, Result, RgcError};
use crate::heap::{Region, RegionId};
use crate::logging::SpaceEvent;
use crate::marker::{liveness, TransitiveClosure};
use crate::object::{ObjectModel, ObjectReference};
use crate::space::RegionSpace;

impl<M: ObjectModel> RegionSpace<M> {
    /// Trace `object` during the evacuating closure.
    ///
    /// Returns the reference callers must use from now on: the copy when
    /// the object was (or is being) evacuated, otherwise `object` itself.
    /// Only the thread that performs the copy hands it to `trace`.
    ///
    /// Fails with `OutOfMemory` when no region is left for the copy, and
    /// for every object claimed after that in the same cycle. The object
    /// is then left in place, unforwarded.
    pub fn trace_evacuate_object<T: TransitiveClosure>(
        &self,
        trace: &mut T,
        object: ObjectReference,
        copy_allocator: &mut RegionBumpAllocator,
    ) -> Result<ObjectReference> {
        let region = self.region_for(object);

        if !region.relocation_required() {
            if self.mark_state().test_and_mark(self.model(), object) {
                trace.process_node(object);
            }
            return Ok(object);
        }

        let prior = forwarding::attempt_to_forward(self.model(), object);
        if forwarding::is_forwarded_or_being_forwarded(prior) {
            let (forwarded, reads) =
                forwarding::spin_and_get_forwarded_object(self.model(), object, prior);
            if reads > 0 {
                self.stats().record_forwarding_wait();
            }
            return Ok(forwarded);
        }

        self.forward_object(trace, object, region, prior, copy_allocator)
    }

    fn forward_object<T: TransitiveClosure>(
        &self,
        trace: &mut T,
        object: ObjectReference,
        region: &Region,
        prior: usize,
        copy_allocator: &mut RegionBumpAllocator,
    ) -> Result<ObjectReference> {
        invariant!(
            region.live_bytes() != 0,
            "{} reached in {} which has no live bytes left",
            object,
            region.id()
        );

        let size = self.model().size_of(object);
        let destination = if self.evacuation_failed() {
            Err(RgcError::OutOfMemory {
                requested: size,
                available: 0,
            })
        } else {
            copy_allocator.alloc(self, size)
        };
        let destination = match destination {
            Ok(address) => address,
            Err(e) => {
                // Raised before the claim is dropped so no later claimer copies.
                self.set_evacuation_failed();
                forwarding::abandon_forwarding(self.model(), object, prior);
                self.stats().record_copy_failure();
                log::warn!(
                    "Cannot evacuate {} ({} bytes) from {}: {}",
                    object,
                    size,
                    region.id(),
                    e
                );
                self.logger().log(SpaceEvent::CopyFailure {
                    object: object.to_address(),
                    size,
                });
                return Err(e);
            }
        };

        let copy = self.model().copy_to(object, destination);
        // Carry over the runtime bits; the mark field is restamped below.
        self.model()
            .store_status(copy, prior, std::sync::atomic::Ordering::Relaxed);
        self.post_copy(copy);
        forwarding::set_forwarding_pointer(self.model(), object, copy);

        trace.process_node(copy);
        liveness::record_live(self.region_for(copy), size);
        self.stats().record_evacuation(size);

        if liveness::record_reclaimed(region, size) {
            self.release_region(region.id());
            self.note_reclaimed(region.id());
        }
        Ok(copy)
    }

    /// Evacuate a known list of objects out of a relocation-required
    /// region, returning their new references in the same order.
    pub fn evacuate_region<T: TransitiveClosure>(
        &self,
        trace: &mut T,
        id: RegionId,
        objects: &[ObjectReference],
        copy_allocator: &mut RegionBumpAllocator,
    ) -> Result<Vec<ObjectReference>> {
        let region = self.region(id);
        if !region.relocation_required() {
            return Err(RgcError::InvalidArgument(format!(
                "{} is not in the collection set",
                id
            )));
        }

        objects
            .iter()
            .map(|&object| {
                invariant!(
                    region.contains(object.to_address()),
                    "{} is not inside {}",
                    object,
                    id
                );
                self.trace_evacuate_object(trace, object, copy_allocator)
            })
            .collect()
    }

    /// Check whether `object` has a published copy
    pub fn is_forwarded(&self, object: ObjectReference) -> bool {
        forwarding::state_of(self.model(), object) == ForwardingState::Forwarded
    }

    /// Published copy of `object`, if any
    pub fn forwarded_object(&self, object: ObjectReference) -> Option<ObjectReference> {
        forwarding::forwarded_object(self.model(), object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SpaceConfig;
    use crate::heap::MmapPageSource;
    use crate::object::{HeaderObjectModel, RUNTIME_FIELD};
    use std::sync::atomic::Ordering;

    fn space(regions: usize, selected: &[usize]) -> RegionSpace {
        let config = SpaceConfig {
            pages_per_region: 4,
            region_count: regions,
            ..Default::default()
        };
        RegionSpace::new(config, Box::new(MmapPageSource::new()), HeaderObjectModel::new())
            .unwrap()
            .with_selector(ExplicitSelector::new(
                selected.iter().map(|&i| RegionId::new(i)),
            ))
    }

    fn object(space: &RegionSpace, size: usize, refs: usize) -> ObjectReference {
        let address = space.allocate(size).unwrap();
        let object = unsafe { HeaderObjectModel::initialize(address, size, refs) }.unwrap();
        space.post_alloc(object);
        object
    }

    fn mark_and_select(space: &RegionSpace, objects: &[ObjectReference]) {
        space.prepare();
        let mut queue = Vec::new();
        for &obj in objects {
            space.trace_mark_object(&mut queue, obj);
        }
        space.update_collection_set();
        space.prepare_evacuation().unwrap();
    }

    #[test]
    fn test_unselected_region_marks_in_place() {
        let space = space(2, &[]);
        let obj = object(&space, 64, 0);
        mark_and_select(&space, &[obj]);

        let mut queue = Vec::new();
        let mut copy = RegionBumpAllocator::new();
        assert_eq!(space.trace_evacuate_object(&mut queue, obj, &mut copy).unwrap(), obj);
        assert_eq!(space.trace_evacuate_object(&mut queue, obj, &mut copy).unwrap(), obj);
        assert_eq!(queue, vec![obj]);
        assert_eq!(copy.regions_used(), 0);
        assert!(!space.is_forwarded(obj));
        space.release();
    }

    #[test]
    fn test_selected_region_copies_once() {
        let space = space(3, &[0]);
        let obj = object(&space, 64, 2);
        space
            .model()
            .store_status(obj, RUNTIME_FIELD.insert(0, 0b01), Ordering::Relaxed);
        mark_and_select(&space, &[obj]);

        let mut queue = Vec::new();
        let mut copy = RegionBumpAllocator::new();
        let new = space.trace_evacuate_object(&mut queue, obj, &mut copy).unwrap();
        assert_ne!(new, obj);
        assert_eq!(queue, vec![new]);
        assert_eq!(space.forwarded_object(obj), Some(new));
        assert_eq!(space.model().size_of(new), 64);
        assert_eq!(space.model().ref_count(new), 2);
        assert!(space.is_live(new));
        let status = space.model().load_status(new, Ordering::Relaxed);
        assert_eq!(RUNTIME_FIELD.extract(status), 0b01);

        // Second visit reuses the copy and queues nothing.
        let again = space.trace_evacuate_object(&mut queue, obj, &mut copy).unwrap();
        assert_eq!(again, new);
        assert_eq!(queue.len(), 1);

        // The only live object left: the source region is reclaimed at once.
        assert!(space.is_available(RegionId::new(0)));
        assert_eq!(space.live_bytes(RegionId::new(0)), 0);
        assert_eq!(space.live_bytes(space.region_of_object(new).unwrap()), 64);
        assert_eq!(space.release(), 1);
    }

    #[test]
    fn test_partial_evacuation_keeps_region() {
        let space = space(3, &[0]);
        let a = object(&space, 64, 0);
        let b = object(&space, 128, 0);
        mark_and_select(&space, &[a, b]);

        let mut copy = RegionBumpAllocator::new();
        space.trace_evacuate_object(&mut Vec::new(), a, &mut copy).unwrap();
        assert_eq!(space.live_bytes(RegionId::new(0)), 128);
        assert!(space.is_consumed(RegionId::new(0)));

        space.trace_evacuate_object(&mut Vec::new(), b, &mut copy).unwrap();
        assert!(space.is_available(RegionId::new(0)));
        space.release();
    }

    #[test]
    fn test_evacuate_region_rejects_unselected() {
        let space = space(2, &[]);
        let obj = object(&space, 64, 0);
        mark_and_select(&space, &[obj]);

        let result = space.evacuate_region(
            &mut Vec::new(),
            RegionId::new(0),
            &[obj],
            &mut RegionBumpAllocator::new(),
        );
        assert!(matches!(result, Err(RgcError::InvalidArgument(_))));
        space.release();
    }

    #[test]
    fn test_evacuate_region_preserves_order() {
        let space = space(3, &[0]);
        let objects: Vec<_> = (0..4).map(|i| object(&space, 32 + 8 * i, 0)).collect();
        mark_and_select(&space, &objects);

        let moved = space
            .evacuate_region(
                &mut Vec::new(),
                RegionId::new(0),
                &objects,
                &mut RegionBumpAllocator::new(),
            )
            .unwrap();
        for (old, new) in objects.iter().zip(&moved) {
            assert_eq!(space.forwarded_object(*old), Some(*new));
            assert_eq!(space.model().size_of(*old), space.model().size_of(*new));
        }
        space.release();
    }

    #[test]
    fn test_copy_failure_leaves_object_in_place() {
        // One region: nowhere to copy to.
        let space = space(1, &[0]);
        let obj = object(&space, 64, 0);
        mark_and_select(&space, &[obj]);

        let result =
            space.trace_evacuate_object(&mut Vec::new(), obj, &mut RegionBumpAllocator::new());
        assert!(matches!(result, Err(RgcError::OutOfMemory { .. })));
        assert_eq!(
            forwarding::state_of(space.model(), obj),
            ForwardingState::NotForwarded
        );
        assert_eq!(space.live_bytes(RegionId::new(0)), 64);
        assert_eq!(space.stats().snapshot().copy_failures, 1);
        assert!(space.evacuation_failed());
        space.release();
        assert!(space.is_consumed(RegionId::new(0)));
    }

    #[test]
    #[should_panic(expected = "Invariant violated")]
    fn test_unmarked_object_in_selected_region_is_fatal() {
        let space = space(2, &[0]);
        let obj = object(&space, 64, 0);
        // Selected with zero live bytes, then reached anyway.
        mark_and_select(&space, &[]);
        let _ = space.trace_evacuate_object(
            &mut Vec::new(),
            obj,
            &mut RegionBumpAllocator::new(),
        );
    }
}
