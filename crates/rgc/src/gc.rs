//! GC Core Module - Parallel stop-the-world collection cycles
//!
//! [`RegionCollector`] drives a full cycle over a [`RegionSpace`]:
//!
//! ```text
//! prepare ─▶ mark closure ─▶ select ─▶ evacuate closure ─▶ release
//! ```
//!
//! Each closure traces the roots on the calling thread into a shared
//! work-stealing queue, then fans out to the configured number of worker
//! threads. Workers scan objects, trace every slot and write back
//! forwarded references. The evacuating closure also rewrites the root
//! slots.
//!
//! A failed copy does not abort the closure. The object stays in place,
//! is marked, and tracing carries on so every slot still ends up pointing
//! at a valid object. The cycle then reports `OutOfMemory`.

use crate::allocator::RegionBumpAllocator;
use crate::config::ConfigError;
use crate::error::{Result, RgcError};
use crate::logging::SpaceEvent;
use crate::marker::{scan_object, trace_object_with, TraceKind, TransitiveClosure, WorkQueue};
use crate::object::{HeaderObjectModel, ObjectModel, ObjectReference};
use crate::space::RegionSpace;
use crate::stats::PhaseTimer;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// What one cycle did
#[derive(Debug, Clone, Serialize)]
pub struct CycleSummary {
    /// Space epoch of the cycle
    pub cycle: u64,
    pub objects_marked: usize,
    pub bytes_marked: usize,
    /// Regions selected for evacuation
    pub collection_set_size: usize,
    pub objects_evacuated: usize,
    pub bytes_evacuated: usize,
    /// Traces that had to wait for another thread's copy
    pub forwarding_waits: usize,
    pub copy_failures: usize,
    /// Regions returned to the available set
    pub regions_reclaimed: usize,
    /// Objects scanned by the closures
    pub objects_scanned: usize,
    pub duration: Duration,
    pub phases: Vec<(&'static str, Duration)>,
}

/// Parallel collector over a [`RegionSpace`]
pub struct RegionCollector<'s, M: ObjectModel = HeaderObjectModel> {
    space: &'s RegionSpace<M>,
    workers: usize,
}

impl<'s, M: ObjectModel> RegionCollector<'s, M> {
    /// Collector using the space's configured worker count
    pub fn new(space: &'s RegionSpace<M>) -> Self {
        Self {
            space,
            workers: space.config().workers(),
        }
    }

    /// Override the worker count
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run a full mark-and-evacuate cycle.
    ///
    /// `root_slots` are addresses of words holding object references; they
    /// are rewritten when their target moves. A space with a one-bit mark
    /// field is rejected before the cycle starts; use [`mark`](Self::mark).
    pub fn collect(&self, root_slots: &[usize]) -> Result<CycleSummary> {
        self.run_cycle(root_slots, true)
    }

    /// Run a mark-only cycle: liveness is recorded, nothing moves
    pub fn mark(&self, root_slots: &[usize]) -> Result<CycleSummary> {
        self.run_cycle(root_slots, false)
    }

    fn run_cycle(&self, root_slots: &[usize], evacuate: bool) -> Result<CycleSummary> {
        let space = self.space;
        let before = space.stats().snapshot();
        let mut timer = PhaseTimer::new();
        let failure = Mutex::new(None);

        if evacuate && !space.mark_state().supports_evacuation() {
            return Err(ConfigError::InvalidMarkBits(format!(
                "evacuating cycles need at least 2 mark bits, space has {}",
                space.config().mark_bits
            ))
            .into());
        }

        space.prepare();
        let cycle = space.epoch();
        timer.phase("prepare");

        let mut scanned = self.run_closure(TraceKind::Mark, root_slots, &failure);
        timer.phase("mark");

        let mut collection_set_size = 0;
        if evacuate {
            collection_set_size = space.update_collection_set();
            space.prepare_evacuation()?;
            timer.phase("select");

            scanned += self.run_closure(TraceKind::Evacuate, root_slots, &failure);
            timer.phase("evacuate");
        }

        let regions_reclaimed = space.release();
        timer.phase("release");

        let delta = space.stats().snapshot().since(&before);
        let summary = CycleSummary {
            cycle,
            objects_marked: delta.objects_marked,
            bytes_marked: delta.bytes_marked,
            collection_set_size,
            objects_evacuated: delta.objects_evacuated,
            bytes_evacuated: delta.bytes_evacuated,
            forwarding_waits: delta.forwarding_waits,
            copy_failures: delta.copy_failures,
            regions_reclaimed,
            objects_scanned: scanned,
            duration: timer.elapsed(),
            phases: timer.phases().to_vec(),
        };

        if evacuate {
            space.logger().log(SpaceEvent::EvacuationStats {
                cycle,
                objects: summary.objects_evacuated,
                bytes: summary.bytes_evacuated,
            });
        }
        space.logger().log(SpaceEvent::CycleEnd {
            cycle,
            duration_ms: timer.elapsed_ms(),
            regions_reclaimed,
        });
        log::info!(
            "Cycle {} done in {:.2}ms: {} marked, {} evacuated, {} regions reclaimed",
            cycle,
            timer.elapsed_ms(),
            summary.objects_marked,
            summary.objects_evacuated,
            regions_reclaimed
        );

        match failure.into_inner() {
            Some(e) => {
                log::warn!(
                    "Cycle {} finished with {} objects left in place: {}",
                    cycle,
                    summary.copy_failures,
                    e
                );
                Err(e)
            }
            None => Ok(summary),
        }
    }

    /// Run one closure to completion, returning the objects scanned
    fn run_closure(
        &self,
        kind: TraceKind,
        root_slots: &[usize],
        failure: &Mutex<Option<RgcError>>,
    ) -> usize {
        let space = self.space;
        let model = space.model();
        let (queue, locals) = WorkQueue::new(self.workers);

        {
            let mut shared = &queue;
            let mut copy = RegionBumpAllocator::new();
            for &slot in root_slots {
                let old = model.load_slot(slot);
                if old.is_null() {
                    continue;
                }
                let new = trace_reference(space, kind, &mut shared, old, &mut copy, failure);
                if new != old {
                    model.store_slot(slot, new);
                }
            }
        }

        let scanned = AtomicUsize::new(0);
        std::thread::scope(|s| {
            for worker in locals {
                let queue = &queue;
                let scanned = &scanned;
                s.spawn(move || {
                    let mut local = queue.local(worker);
                    let mut copy = RegionBumpAllocator::new();
                    let result = local.run(|trace, object| {
                        scan_object(model, object, |child| {
                            Ok(trace_reference(space, kind, &mut *trace, child, &mut copy, failure))
                        })
                    });
                    match result {
                        Ok(n) => {
                            scanned.fetch_add(n, Ordering::Relaxed);
                        }
                        Err(e) => {
                            failure.lock().get_or_insert(e);
                        }
                    }
                });
            }
        });

        let scanned = scanned.into_inner();
        log::debug!(
            "{:?} closure scanned {} objects on {} workers",
            kind,
            scanned,
            self.workers
        );
        scanned
    }
}

/// Trace one reference, leaving the object in place if it cannot be copied
fn trace_reference<M, T>(
    space: &RegionSpace<M>,
    kind: TraceKind,
    trace: &mut T,
    object: ObjectReference,
    copy: &mut RegionBumpAllocator,
    failure: &Mutex<Option<RgcError>>,
) -> ObjectReference
where
    M: ObjectModel,
    T: TransitiveClosure,
{
    match trace_object_with(space, kind, trace, object, copy) {
        Ok(new) => new,
        Err(e) => {
            if space.mark_state().test_and_mark(space.model(), object) {
                trace.process_node(object);
            }
            failure.lock().get_or_insert(e);
            object
        }
    }
}
