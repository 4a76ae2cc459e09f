//! Object Module - The object model seam
//!
//! The space never interprets an object's layout directly. Everything it
//! needs from an object goes through [`ObjectModel`]:
//!
//! - the status word, whose low byte (the "available byte") carries the
//!   forwarding and mark fields described in [`header`]
//! - the object's size
//! - copying the object body to a new address
//! - enumerating the object's reference slots (tracing only)
//!
//! [`HeaderObjectModel`] is the reference implementation, operating on the
//! crate's own [`ObjectHeader`] layout.

pub mod header;

pub use header::{
    FieldOwner, HeaderBitField, HeaderObjectModel, ObjectHeader, FORWARDING_FIELD, HEADER_SIZE,
    MAX_MARK_BITS, MIN_MARK_BITS, OBJECT_ALIGNMENT, RUNTIME_FIELD,
};

use std::fmt;
use std::sync::atomic::Ordering;

/// Reference to a heap object: the address of its status word.
///
/// The null reference (address 0) is a valid value and is passed through
/// untouched by every tracing operation.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[repr(transparent)]
pub struct ObjectReference(usize);

impl ObjectReference {
    /// The null reference
    pub const NULL: ObjectReference = ObjectReference(0);

    /// Create a reference from a raw address.
    ///
    /// # Safety
    ///
    /// `address` must be 0 or the start of an object whose header has been
    /// initialized and whose memory stays mapped for as long as the
    /// reference is used.
    #[inline]
    pub const unsafe fn from_raw_address(address: usize) -> Self {
        ObjectReference(address)
    }

    /// Address of the object's status word
    #[inline]
    pub const fn to_address(self) -> usize {
        self.0
    }

    /// Check for the null reference
    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for ObjectReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectReference({:#x})", self.0)
    }
}

impl fmt::Display for ObjectReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Object model consumed by the region space.
///
/// All methods receive references that satisfy the contract of
/// [`ObjectReference::from_raw_address`]. Implementations must be usable
/// from several collector threads at once.
pub trait ObjectModel: Send + Sync + 'static {
    /// Load the object's status word
    fn load_status(&self, object: ObjectReference, order: Ordering) -> usize;

    /// Compare-and-exchange the object's status word
    ///
    /// Same contract as [`AtomicUsize::compare_exchange`](std::sync::atomic::AtomicUsize::compare_exchange).
    fn compare_exchange_status(
        &self,
        object: ObjectReference,
        current: usize,
        new: usize,
        success: Ordering,
        failure: Ordering,
    ) -> Result<usize, usize>;

    /// Store the object's status word
    fn store_status(&self, object: ObjectReference, value: usize, order: Ordering);

    /// Total size of the object in bytes, header included
    fn size_of(&self, object: ObjectReference) -> usize;

    /// Copy the object body to `dest`, which has room for `size_of(object)`
    /// bytes. The copy's status word is left for the caller to initialize.
    fn copy_to(&self, object: ObjectReference, dest: usize) -> ObjectReference;

    /// Call `visitor` with the address of every reference slot of `object`
    fn scan_slots(&self, object: ObjectReference, visitor: &mut dyn FnMut(usize));

    /// Read the reference stored in a slot
    fn load_slot(&self, slot: usize) -> ObjectReference;

    /// Overwrite the reference stored in a slot
    fn store_slot(&self, slot: usize, value: ObjectReference);

    /// The low byte of the status word
    #[inline]
    fn read_available_byte(&self, object: ObjectReference) -> u8 {
        (self.load_status(object, Ordering::Acquire) & 0xff) as u8
    }
}
