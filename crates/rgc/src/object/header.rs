//! Object Header - Status word layout and the reference object model
//!
//! Object Header Layout (24 bytes on 64-bit):
//! ┌─────────────────────────────────────────┐
//! │        Status Word (8 bytes)            │  <- AtomicUsize
//! │  - Bits 0-1: Forwarding state           │
//! │  - Bits 2-5: Mark field (1-4 bits)      │
//! │  - Bits 6-7: Reserved for the runtime   │
//! │  - Bits 8-63: Runtime / forwarding ptr  │
//! ├─────────────────────────────────────────┤
//! │         Size (8 bytes)                  │  <- Object size incl. header
//! ├─────────────────────────────────────────┤
//! │      Reference count (8 bytes)          │  <- Number of slots below
//! ├─────────────────────────────────────────┤
//! │  Reference slots (8 bytes each)         │
//! │  Payload                                │
//! └─────────────────────────────────────────┘
//!
//! The low byte of the status word is the "available byte". Its bits are
//! split between three owners and every access goes through a
//! [`HeaderBitField`] descriptor, so the forwarding protocol and the mark
//! protocol can never clobber each other's bits.

use super::{ObjectModel, ObjectReference};
use crate::error::{invariant, Result, RgcError};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Size of object header in bytes
pub const HEADER_SIZE: usize = std::mem::size_of::<ObjectHeader>();

/// Minimum object alignment (bytes)
pub const OBJECT_ALIGNMENT: usize = 8;

/// Narrowest mark field
pub const MIN_MARK_BITS: u8 = 1;

/// Widest mark field that fits between the forwarding and runtime fields
pub const MAX_MARK_BITS: u8 = 4;

/// Number of bits in the available byte
const AVAILABLE_BITS: u8 = 8;

/// Who is allowed to write a header field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOwner {
    /// Forwarding protocol (evacuation)
    Forwarding,
    /// Mark protocol
    Mark,
    /// Embedding runtime; never touched by the space
    Runtime,
}

/// A bit field inside the available byte of the status word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderBitField {
    /// Position of the lowest bit
    pub offset: u8,
    /// Number of bits
    pub width: u8,
    /// Owning protocol
    pub owner: FieldOwner,
}

/// Forwarding state, bits 0-1
pub const FORWARDING_FIELD: HeaderBitField = HeaderBitField::new(0, 2, FieldOwner::Forwarding);

/// Runtime bits, 6-7
pub const RUNTIME_FIELD: HeaderBitField = HeaderBitField::new(6, 2, FieldOwner::Runtime);

/// First bit of the mark field
const MARK_FIELD_OFFSET: u8 = 2;

impl HeaderBitField {
    /// Describe a field
    pub const fn new(offset: u8, width: u8, owner: FieldOwner) -> Self {
        Self {
            offset,
            width,
            owner,
        }
    }

    /// Mark field of the given width, directly above the forwarding field
    pub fn mark(width: u8) -> Self {
        invariant!(
            (MIN_MARK_BITS..=MAX_MARK_BITS).contains(&width),
            "mark field width {} outside {}..={}",
            width,
            MIN_MARK_BITS,
            MAX_MARK_BITS
        );
        let field = Self::new(MARK_FIELD_OFFSET, width, FieldOwner::Mark);
        invariant!(
            !field.overlaps(&FORWARDING_FIELD) && !field.overlaps(&RUNTIME_FIELD),
            "mark field {:?} overlaps another header field",
            field
        );
        field
    }

    /// Largest value the field can hold
    #[inline]
    pub const fn max_value(&self) -> usize {
        (1usize << self.width) - 1
    }

    /// Mask of the field's bits in place
    #[inline]
    pub const fn mask(&self) -> usize {
        self.max_value() << self.offset
    }

    /// Read the field out of a status word
    #[inline]
    pub const fn extract(&self, word: usize) -> usize {
        (word & self.mask()) >> self.offset
    }

    /// Return `word` with the field replaced by `value`, other bits intact
    #[inline]
    pub fn insert(&self, word: usize, value: usize) -> usize {
        invariant!(
            value <= self.max_value(),
            "value {} does not fit {:?} field of width {}",
            value,
            self.owner,
            self.width
        );
        (word & !self.mask()) | (value << self.offset)
    }

    /// Check whether two fields share a bit
    pub const fn overlaps(&self, other: &HeaderBitField) -> bool {
        self.mask() & other.mask() != 0
    }

    /// Check the field stays inside the available byte
    pub const fn in_available_byte(&self) -> bool {
        self.offset + self.width <= AVAILABLE_BITS
    }
}

/// Object Header
///
/// Every object handled by [`HeaderObjectModel`] starts with this header.
#[repr(C)]
pub struct ObjectHeader {
    /// Status word: forwarding and mark fields live in its low byte
    pub status_word: AtomicUsize,
    /// Object size in bytes (including header)
    pub size: usize,
    /// Number of reference slots following the header
    pub ref_count: usize,
}

impl ObjectHeader {
    /// Bytes needed for a header followed by `ref_count` slots
    pub const fn min_size(ref_count: usize) -> usize {
        HEADER_SIZE + ref_count * std::mem::size_of::<usize>()
    }
}

/// Object model over [`ObjectHeader`] objects.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeaderObjectModel;

impl HeaderObjectModel {
    /// Create the model
    pub const fn new() -> Self {
        HeaderObjectModel
    }

    /// Write a fresh header at `address` with every slot null.
    ///
    /// # Safety
    ///
    /// `address` must point to `size` writable bytes that no other thread
    /// is accessing, typically memory just returned by the space's
    /// allocator.
    pub unsafe fn initialize(
        address: usize,
        size: usize,
        ref_count: usize,
    ) -> Result<ObjectReference> {
        if address == 0 || address % OBJECT_ALIGNMENT != 0 {
            return Err(RgcError::InvalidArgument(format!(
                "object address {:#x} is not {}-byte aligned",
                address, OBJECT_ALIGNMENT
            )));
        }
        if size < ObjectHeader::min_size(ref_count) {
            return Err(RgcError::InvalidArgument(format!(
                "object size {} cannot hold header and {} slots",
                size, ref_count
            )));
        }

        let header = address as *mut ObjectHeader;
        header.write(ObjectHeader {
            status_word: AtomicUsize::new(0),
            size,
            ref_count,
        });
        let slots = (address + HEADER_SIZE) as *mut usize;
        for i in 0..ref_count {
            slots.add(i).write(0);
        }

        Ok(ObjectReference::from_raw_address(address))
    }

    /// Address of slot `index` of `object`
    pub fn slot_address(&self, object: ObjectReference, index: usize) -> usize {
        let header = Self::header(object);
        invariant!(
            index < header.ref_count,
            "slot {} out of range for object {} with {} slots",
            index,
            object,
            header.ref_count
        );
        object.to_address() + HEADER_SIZE + index * std::mem::size_of::<usize>()
    }

    /// Number of reference slots in `object`
    pub fn ref_count(&self, object: ObjectReference) -> usize {
        Self::header(object).ref_count
    }

    #[inline]
    fn header<'a>(object: ObjectReference) -> &'a ObjectHeader {
        // SAFETY: references are only built over initialized headers.
        unsafe { &*(object.to_address() as *const ObjectHeader) }
    }

    #[inline]
    fn slot<'a>(slot: usize) -> &'a AtomicUsize {
        // SAFETY: slot addresses come from `scan_slots`/`slot_address`.
        unsafe { &*(slot as *const AtomicUsize) }
    }
}

impl ObjectModel for HeaderObjectModel {
    #[inline]
    fn load_status(&self, object: ObjectReference, order: Ordering) -> usize {
        Self::header(object).status_word.load(order)
    }

    #[inline]
    fn compare_exchange_status(
        &self,
        object: ObjectReference,
        current: usize,
        new: usize,
        success: Ordering,
        failure: Ordering,
    ) -> std::result::Result<usize, usize> {
        Self::header(object)
            .status_word
            .compare_exchange(current, new, success, failure)
    }

    #[inline]
    fn store_status(&self, object: ObjectReference, value: usize, order: Ordering) {
        Self::header(object).status_word.store(value, order)
    }

    #[inline]
    fn size_of(&self, object: ObjectReference) -> usize {
        Self::header(object).size
    }

    fn copy_to(&self, object: ObjectReference, dest: usize) -> ObjectReference {
        let size = self.size_of(object);
        let word = std::mem::size_of::<usize>();
        // SAFETY: the caller reserved `size` bytes at `dest`, the source is
        // owned by the forwarding winner, and the two never overlap.
        unsafe {
            std::ptr::copy_nonoverlapping(
                (object.to_address() + word) as *const u8,
                (dest + word) as *mut u8,
                size - word,
            );
            (dest as *mut AtomicUsize).write(AtomicUsize::new(0));
            ObjectReference::from_raw_address(dest)
        }
    }

    fn scan_slots(&self, object: ObjectReference, visitor: &mut dyn FnMut(usize)) {
        let count = Self::header(object).ref_count;
        let first = object.to_address() + HEADER_SIZE;
        for i in 0..count {
            visitor(first + i * std::mem::size_of::<usize>());
        }
    }

    #[inline]
    fn load_slot(&self, slot: usize) -> ObjectReference {
        let value = Self::slot(slot).load(Ordering::Relaxed);
        // SAFETY: slots only ever hold null or references to objects.
        unsafe { ObjectReference::from_raw_address(value) }
    }

    #[inline]
    fn store_slot(&self, slot: usize, value: ObjectReference) {
        Self::slot(slot).store(value.to_address(), Ordering::Relaxed)
    }
}
