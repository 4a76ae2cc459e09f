//! Trace Driver - Single-threaded transitive closure over the space
//!
//! [`RegionTraceLocal`] runs one closure in either mark or evacuate mode:
//! roots are fed through [`RegionTraceLocal::trace_object`], newly reached
//! objects land in a local queue via [`TransitiveClosure::process_node`],
//! and [`RegionTraceLocal::complete_trace`] drains the queue, scanning each
//! object's slots and writing back forwarded references.
//!
//! The parallel collector in [`crate::gc`] shares [`scan_object`] and
//! [`trace_object_with`] with this driver.

use crate::allocator::RegionBumpAllocator;
use crate::error::Result;
use crate::object::{ObjectModel, ObjectReference};
use crate::space::RegionSpace;
use std::collections::VecDeque;

/// Receiver of objects discovered by tracing
pub trait TransitiveClosure {
    /// Queue `object` for scanning
    fn process_node(&mut self, object: ObjectReference);
}

impl TransitiveClosure for VecDeque<ObjectReference> {
    fn process_node(&mut self, object: ObjectReference) {
        self.push_back(object);
    }
}

impl TransitiveClosure for Vec<ObjectReference> {
    fn process_node(&mut self, object: ObjectReference) {
        self.push(object);
    }
}

/// Which closure is running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceKind {
    /// Mark in place and record live bytes
    Mark,
    /// Copy objects out of relocation-required regions
    Evacuate,
}

/// Trace one reference in the given mode.
///
/// Null references and references outside the space come back unchanged.
pub fn trace_object_with<M, T>(
    space: &RegionSpace<M>,
    kind: TraceKind,
    trace: &mut T,
    object: ObjectReference,
    copy_allocator: &mut RegionBumpAllocator,
) -> Result<ObjectReference>
where
    M: ObjectModel,
    T: TransitiveClosure,
{
    if object.is_null() || !space.contains(object) {
        return Ok(object);
    }
    match kind {
        TraceKind::Mark => Ok(space.trace_mark_object(trace, object)),
        TraceKind::Evacuate => space.trace_evacuate_object(trace, object, copy_allocator),
    }
}

/// Visit every non-null reference slot of `object`, storing back whatever
/// `trace` returns when it differs from the old value.
pub fn scan_object<M, F>(model: &M, object: ObjectReference, mut trace: F) -> Result<()>
where
    M: ObjectModel,
    F: FnMut(ObjectReference) -> Result<ObjectReference>,
{
    let mut slots = Vec::new();
    model.scan_slots(object, &mut |slot| slots.push(slot));

    for slot in slots {
        let old = model.load_slot(slot);
        if old.is_null() {
            continue;
        }
        let new = trace(old)?;
        if new != old {
            model.store_slot(slot, new);
        }
    }
    Ok(())
}

/// Single-threaded trace over a [`RegionSpace`]
pub struct RegionTraceLocal<'a, M: ObjectModel> {
    space: &'a RegionSpace<M>,
    kind: TraceKind,
    queue: VecDeque<ObjectReference>,
    copy_allocator: RegionBumpAllocator,
    scanned: usize,
}

impl<'a, M: ObjectModel> RegionTraceLocal<'a, M> {
    pub fn new(space: &'a RegionSpace<M>, kind: TraceKind) -> Self {
        Self {
            space,
            kind,
            queue: VecDeque::new(),
            copy_allocator: RegionBumpAllocator::new(),
            scanned: 0,
        }
    }

    pub fn kind(&self) -> TraceKind {
        self.kind
    }

    /// Check whether `object` survived the closure so far.
    ///
    /// Null is dead; objects outside the space are assumed live.
    pub fn is_live(&self, object: ObjectReference) -> bool {
        if object.is_null() {
            return false;
        }
        if !self.space.contains(object) {
            return true;
        }
        self.space.is_live(object)
    }

    /// Trace one reference, returning the reference to use from now on
    pub fn trace_object(&mut self, object: ObjectReference) -> Result<ObjectReference> {
        trace_object_with(
            self.space,
            self.kind,
            &mut self.queue,
            object,
            &mut self.copy_allocator,
        )
    }

    /// Trace the reference held in a root slot and update the slot
    pub fn trace_root_slot(&mut self, slot: usize) -> Result<()> {
        let model = self.space.model();
        let old = model.load_slot(slot);
        let new = self.trace_object(old)?;
        if new != old {
            model.store_slot(slot, new);
        }
        Ok(())
    }

    /// Drain the queue until the closure is complete.
    ///
    /// A mark closure then hands the recorded liveness to the collection
    /// set selector.
    pub fn complete_trace(&mut self) -> Result<()> {
        let space = self.space;
        while let Some(object) = self.queue.pop_front() {
            self.scanned += 1;
            scan_object(space.model(), object, |child| self.trace_object(child))?;
        }

        if self.kind == TraceKind::Mark {
            space.update_collection_set();
        }
        Ok(())
    }

    /// Objects scanned so far
    pub fn scanned_objects(&self) -> usize {
        self.scanned
    }

    /// Objects waiting to be scanned
    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}

impl<M: ObjectModel> TransitiveClosure for RegionTraceLocal<'_, M> {
    fn process_node(&mut self, object: ObjectReference) {
        self.queue.push_back(object);
    }
}
