//! Mark Protocol - Per-object mark field in the status word
//!
//! Liveness is recorded by writing the current `mark_state` value into the
//! mark field of an object's available byte. Every cycle starts with a
//! flip of the global value; objects marked in the previous cycle then
//! read as unmarked without touching them.
//!
//! ```text
//! width 1:  mark_state 1 ──flip──▶ 0 ──flip──▶ 1 ...
//! width 2:  mark_state 1 ──flip──▶ 2 ──flip──▶ 3 ──flip──▶ 0 ...
//! ```
//!
//! Stamping fresh objects:
//!
//! ```text
//! between cycles      mark_state   stale after the next flip
//! in cycle            alloc_state  value the last flip moved away from
//! in cycle, marked    mark_state   alloc_as_marked
//! ```
//!
//! An evacuating cycle flips twice, once per closure, so it needs three
//! distinct values: stale, marked by the mark closure and visited by the
//! evacuating closure. A one-bit field only supports mark-only cycles.

use crate::error::invariant;
use crate::object::{HeaderBitField, ObjectModel, ObjectReference};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Global mark values and the header field they are written to
#[derive(Debug)]
pub struct MarkState {
    field: HeaderBitField,
    mark_state: AtomicUsize,
    alloc_state: AtomicUsize,
    alloc_as_marked: bool,
    in_cycle: AtomicBool,
}

impl MarkState {
    /// Create with `mark_bits` wide mark field
    pub fn new(mark_bits: u8, alloc_as_marked: bool) -> Self {
        Self {
            field: HeaderBitField::mark(mark_bits),
            mark_state: AtomicUsize::new(1),
            alloc_state: AtomicUsize::new(0),
            alloc_as_marked,
            in_cycle: AtomicBool::new(false),
        }
    }

    /// The mark field descriptor
    pub fn field(&self) -> HeaderBitField {
        self.field
    }

    /// Value that means "marked" this cycle
    #[inline]
    pub fn mark_value(&self) -> usize {
        self.mark_state.load(Ordering::Relaxed)
    }

    /// Value stamped on unmarked allocations during a cycle
    #[inline]
    pub fn alloc_value(&self) -> usize {
        self.alloc_state.load(Ordering::Relaxed)
    }

    /// Check whether a closure may currently be running
    #[inline]
    pub fn in_cycle(&self) -> bool {
        self.in_cycle.load(Ordering::Acquire)
    }

    /// Check whether a fresh allocation is stamped as marked right now
    #[inline]
    pub fn allocates_marked(&self) -> bool {
        self.alloc_as_marked && self.in_cycle()
    }

    /// Check whether the field has room for an evacuating cycle
    pub fn supports_evacuation(&self) -> bool {
        self.field.max_value() >= 2
    }

    /// Mark `object` if it is not already marked.
    ///
    /// Returns true for exactly one caller per object per mark value. Only
    /// the mark field changes; forwarding and runtime bits are preserved.
    pub fn test_and_mark<M: ObjectModel>(&self, model: &M, object: ObjectReference) -> bool {
        let value = self.mark_value();
        let mut old = model.load_status(object, Ordering::Relaxed);
        loop {
            if self.field.extract(old) == value {
                return false;
            }
            let new = self.field.insert(old, value);
            match model.compare_exchange_status(
                object,
                old,
                new,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(actual) => old = actual,
            }
        }
    }

    /// Check if `object` carries the current mark value
    #[inline]
    pub fn is_marked<M: ObjectModel>(&self, model: &M, object: ObjectReference) -> bool {
        let byte = model.read_available_byte(object) as usize;
        self.field.extract(byte) == self.mark_value()
    }

    /// Stamp the mark field of an object nobody else can see yet.
    ///
    /// Copies always get `mark_state`. Fresh allocations follow the table
    /// in the module docs.
    pub fn initialize_header<M: ObjectModel>(
        &self,
        model: &M,
        object: ObjectReference,
        is_fresh_allocation: bool,
    ) {
        let value = if is_fresh_allocation && self.in_cycle() && !self.alloc_as_marked {
            self.alloc_value()
        } else {
            self.mark_value()
        };
        let old = model.load_status(object, Ordering::Relaxed);
        model.store_status(object, self.field.insert(old, value), Ordering::Release);
    }

    /// Flip to a fresh mark value and enter the cycle
    pub fn begin_cycle(&self) -> usize {
        let next = self.flip();
        self.in_cycle.store(true, Ordering::Release);
        next
    }

    /// Leave the cycle; the mark value stays until the next `begin_cycle`
    pub fn end_cycle(&self) {
        self.in_cycle.store(false, Ordering::Release);
    }

    /// Advance to the next mark value.
    ///
    /// Must not race with tracing. Returns the new mark value.
    pub fn flip(&self) -> usize {
        let previous = self.mark_value();
        invariant!(
            previous <= self.field.max_value(),
            "mark value {} does not fit {} bits",
            previous,
            self.field.width
        );
        let next = (previous + 1) & self.field.max_value();
        self.alloc_state.store(previous, Ordering::Relaxed);
        self.mark_state.store(next, Ordering::Relaxed);
        next
    }
}
