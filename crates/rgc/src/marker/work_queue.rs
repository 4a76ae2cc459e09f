//! Work Queue - Work-stealing queue for parallel closures
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │            Injector (roots)                 │
//! └─────────────────────────────────────────────┘
//!          │                 │               │
//!          ▼                 ▼               ▼
//!   ┌────────────┐   ┌────────────┐   ┌────────────┐
//!   │  Worker 0  │◀─▶│  Worker 1  │◀─▶│  Worker N  │   steal
//!   └────────────┘   └────────────┘   └────────────┘
//! ```
//!
//! `pending` counts objects pushed but not yet fully scanned. It is
//! raised before a push and lowered only after the object's children have
//! been pushed, so it reaches zero exactly when the closure is complete.

use super::trace::TransitiveClosure;
use crate::object::ObjectReference;
use crossbeam::utils::Backoff;
use crossbeam_deque::{Injector, Steal, Stealer, Worker};
use std::iter;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Shared half of the work queue
pub struct WorkQueue {
    injector: Injector<ObjectReference>,
    stealers: Vec<Stealer<ObjectReference>>,
    pending: AtomicUsize,
}

impl WorkQueue {
    /// Create the shared queue and one local queue per worker
    pub fn new(workers: usize) -> (Self, Vec<Worker<ObjectReference>>) {
        let locals: Vec<_> = (0..workers.max(1)).map(|_| Worker::new_fifo()).collect();
        let queue = Self {
            injector: Injector::new(),
            stealers: locals.iter().map(|w| w.stealer()).collect(),
            pending: AtomicUsize::new(0),
        };
        (queue, locals)
    }

    /// Push work visible to every worker
    pub fn push(&self, object: ObjectReference) {
        self.pending.fetch_add(1, Ordering::AcqRel);
        self.injector.push(object);
    }

    /// Objects pushed but not yet completed
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Bind a worker's local deque to this queue
    pub fn local<'q>(&'q self, worker: Worker<ObjectReference>) -> LocalQueue<'q> {
        LocalQueue {
            shared: self,
            worker,
        }
    }

    fn steal(&self, local: &Worker<ObjectReference>) -> Option<ObjectReference> {
        iter::repeat_with(|| {
            self.injector
                .steal_batch_and_pop(local)
                .or_else(|| self.stealers.iter().map(|s| s.steal()).collect())
        })
        .find(|s| !s.is_retry())
        .and_then(Steal::success)
    }
}

/// One worker's view of the queue
pub struct LocalQueue<'q> {
    shared: &'q WorkQueue,
    worker: Worker<ObjectReference>,
}

impl LocalQueue<'_> {
    /// Next object to scan, stealing when the local deque is empty
    pub fn pop(&self) -> Option<ObjectReference> {
        self.worker.pop().or_else(|| self.shared.steal(&self.worker))
    }

    /// Mark a popped object as fully scanned
    pub fn complete(&self) {
        self.shared.pending.fetch_sub(1, Ordering::AcqRel);
    }

    /// Run `scan` on objects until the whole closure is complete
    pub fn run<E, F>(&mut self, mut scan: F) -> Result<usize, E>
    where
        F: FnMut(&mut Self, ObjectReference) -> Result<(), E>,
    {
        let backoff = Backoff::new();
        let mut scanned = 0;
        loop {
            match self.pop() {
                Some(object) => {
                    backoff.reset();
                    let result = scan(self, object);
                    self.complete();
                    result?;
                    scanned += 1;
                }
                None if self.shared.pending() == 0 => return Ok(scanned),
                None => backoff.snooze(),
            }
        }
    }
}

impl TransitiveClosure for LocalQueue<'_> {
    fn process_node(&mut self, object: ObjectReference) {
        self.shared.pending.fetch_add(1, Ordering::AcqRel);
        self.worker.push(object);
    }
}

impl TransitiveClosure for &WorkQueue {
    fn process_node(&mut self, object: ObjectReference) {
        self.push(object);
    }
}
