//! Forwarding Word - In-header forwarding protocol
//!
//! The two low bits of the status word hold the forwarding state:
//!
//! ```text
//! 0b00  NotForwarded     status word is the object's own
//! 0b10  BeingForwarded   one thread has claimed the object and is copying it
//! 0b11  Forwarded        rest of the word is the new address
//! ```
//!
//! Exactly one thread wins the claim CAS. Every other thread spins until
//! the state leaves BeingForwarded. The winner never blocks while holding
//! the claim: it only bump-allocates from regions reserved up front and
//! copies bytes, so the spin always terminates.
//!
//! Ordering: claim (`AcqRel` CAS) happens-before publication (`Release`
//! store) happens-before any reader that sees Forwarded (`Acquire` load).

use crate::error::invariant;
use crate::object::{ObjectModel, ObjectReference, FORWARDING_FIELD};
use crate::util::AtomicUtils;
use std::sync::atomic::Ordering;

/// Forwarding state of an object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardingState {
    NotForwarded,
    BeingForwarded,
    Forwarded,
}

impl ForwardingState {
    const NOT_FORWARDED: usize = 0b00;
    const BEING_FORWARDED: usize = 0b10;
    const FORWARDED: usize = 0b11;

    /// Field value for this state
    pub const fn bits(self) -> usize {
        match self {
            ForwardingState::NotForwarded => Self::NOT_FORWARDED,
            ForwardingState::BeingForwarded => Self::BEING_FORWARDED,
            ForwardingState::Forwarded => Self::FORWARDED,
        }
    }

    /// Decode the state held in a status word
    pub fn of(status_word: usize) -> Self {
        match FORWARDING_FIELD.extract(status_word) {
            Self::NOT_FORWARDED => ForwardingState::NotForwarded,
            Self::BEING_FORWARDED => ForwardingState::BeingForwarded,
            Self::FORWARDED => ForwardingState::Forwarded,
            other => {
                invariant!(false, "corrupt forwarding bits {:#b}", other);
                unreachable!()
            }
        }
    }
}

/// Current forwarding state of `object`
#[inline]
pub fn state_of<M: ObjectModel>(model: &M, object: ObjectReference) -> ForwardingState {
    ForwardingState::of(model.load_status(object, Ordering::Acquire))
}

/// Check whether a status word is claimed or forwarded
#[inline]
pub fn is_forwarded_or_being_forwarded(status_word: usize) -> bool {
    ForwardingState::of(status_word) != ForwardingState::NotForwarded
}

/// Try to claim `object` for copying.
///
/// Returns the status word seen before the attempt. If its state is
/// NotForwarded the caller won and owns the copy; otherwise another thread
/// got there first.
pub fn attempt_to_forward<M: ObjectModel>(model: &M, object: ObjectReference) -> usize {
    let mut old = model.load_status(object, Ordering::Acquire);
    loop {
        if is_forwarded_or_being_forwarded(old) {
            return old;
        }
        let claimed = FORWARDING_FIELD.insert(old, ForwardingState::BeingForwarded.bits());
        match model.compare_exchange_status(
            object,
            old,
            claimed,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => return old,
            Err(actual) => old = actual,
        }
    }
}

/// Wait for the winner of `object` to finish.
///
/// Returns the copy, or `object` itself when the winner gave up and
/// restored the original status word, plus the number of re-reads spent
/// spinning.
pub fn spin_and_get_forwarded_object<M: ObjectModel>(
    model: &M,
    object: ObjectReference,
    prior_status_word: usize,
) -> (ObjectReference, usize) {
    let (word, reads) = if ForwardingState::of(prior_status_word) == ForwardingState::Forwarded {
        (prior_status_word, 0)
    } else {
        AtomicUtils::spin_wait_while(
            || model.load_status(object, Ordering::Acquire),
            |word| ForwardingState::of(word) == ForwardingState::BeingForwarded,
        )
    };

    match ForwardingState::of(word) {
        ForwardingState::Forwarded => (extract_forwarding_pointer(word), reads),
        _ => (object, reads),
    }
}

/// Publish `new_object` as the forwarding target of `object`
#[inline]
pub fn set_forwarding_pointer<M: ObjectModel>(
    model: &M,
    object: ObjectReference,
    new_object: ObjectReference,
) {
    invariant!(
        new_object.to_address() & FORWARDING_FIELD.mask() == 0,
        "forwarding target {} collides with forwarding bits",
        new_object
    );
    model.store_status(
        object,
        new_object.to_address() | ForwardingState::Forwarded.bits(),
        Ordering::Release,
    );
}

/// Give up a claim, putting back the forwarding bits seen before it.
///
/// Only the forwarding field is restored; a mark another thread set on
/// the claimed word survives.
pub fn abandon_forwarding<M: ObjectModel>(
    model: &M,
    object: ObjectReference,
    prior_status_word: usize,
) {
    let restored = FORWARDING_FIELD.extract(prior_status_word);
    let mut current = model.load_status(object, Ordering::Relaxed);
    loop {
        invariant!(
            ForwardingState::of(current) == ForwardingState::BeingForwarded,
            "abandoning {} which is not being forwarded",
            object
        );
        let new = FORWARDING_FIELD.insert(current, restored);
        match model.compare_exchange_status(
            object,
            current,
            new,
            Ordering::Release,
            Ordering::Relaxed,
        ) {
            Ok(_) => return,
            Err(actual) => current = actual,
        }
    }
}

/// Copy target of `object`, if it has been forwarded
pub fn forwarded_object<M: ObjectModel>(
    model: &M,
    object: ObjectReference,
) -> Option<ObjectReference> {
    let word = model.load_status(object, Ordering::Acquire);
    match ForwardingState::of(word) {
        ForwardingState::Forwarded => Some(extract_forwarding_pointer(word)),
        _ => None,
    }
}

#[inline]
fn extract_forwarding_pointer(word: usize) -> ObjectReference {
    // SAFETY: only `set_forwarding_pointer` writes Forwarded words, and it
    // stores the address of an initialized copy.
    unsafe { ObjectReference::from_raw_address(word & !FORWARDING_FIELD.mask()) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marker::MarkState;
    use crate::object::HeaderObjectModel;
    use std::sync::atomic::AtomicUsize;
    use std::sync::{Arc, Barrier};

    #[repr(C, align(8))]
    struct Buffer([u8; 64]);

    fn object(buffer: &mut Buffer) -> ObjectReference {
        unsafe { HeaderObjectModel::initialize(buffer.0.as_mut_ptr() as usize, 32, 0) }.unwrap()
    }

    #[test]
    fn test_state_encoding() {
        assert_eq!(ForwardingState::of(0xFF00), ForwardingState::NotForwarded);
        assert_eq!(ForwardingState::of(0xFF02), ForwardingState::BeingForwarded);
        assert_eq!(ForwardingState::of(0xFF03), ForwardingState::Forwarded);
    }

    #[test]
    #[should_panic(expected = "Invariant violated")]
    fn test_corrupt_state_is_fatal() {
        ForwardingState::of(0b01);
    }

    #[test]
    fn test_claim_publish_and_read_back() {
        let mut from = Buffer([0; 64]);
        let mut to = Buffer([0; 64]);
        let model = HeaderObjectModel::new();
        let obj = object(&mut from);
        let copy = object(&mut to);
        model.store_status(obj, 0x40, Ordering::Relaxed);

        let prior = attempt_to_forward(&model, obj);
        assert_eq!(prior, 0x40);
        assert_eq!(state_of(&model, obj), ForwardingState::BeingForwarded);
        assert!(is_forwarded_or_being_forwarded(attempt_to_forward(&model, obj)));

        set_forwarding_pointer(&model, obj, copy);
        assert_eq!(state_of(&model, obj), ForwardingState::Forwarded);
        assert_eq!(forwarded_object(&model, obj), Some(copy));

        let late = attempt_to_forward(&model, obj);
        assert_eq!(spin_and_get_forwarded_object(&model, obj, late), (copy, 0));
    }

    #[test]
    fn test_abandoned_claim_returns_original() {
        let mut from = Buffer([0; 64]);
        let model = HeaderObjectModel::new();
        let obj = object(&mut from);

        let prior = attempt_to_forward(&model, obj);
        abandon_forwarding(&model, obj, prior);
        assert_eq!(state_of(&model, obj), ForwardingState::NotForwarded);
        assert_eq!(forwarded_object(&model, obj), None);
        let (result, _) = spin_and_get_forwarded_object(&model, obj, prior | 0b10);
        assert_eq!(result, obj);
    }

    #[test]
    fn test_abandon_keeps_concurrent_mark() {
        let mut from = Buffer([0; 64]);
        let model = HeaderObjectModel::new();
        let obj = object(&mut from);
        let marks = MarkState::new(2, false);
        marks.begin_cycle();
        marks.initialize_header(&model, obj, true);

        let prior = attempt_to_forward(&model, obj);
        // Another thread gives up on the copy and marks the object in place
        // while the claim is still held.
        assert!(marks.test_and_mark(&model, obj));
        abandon_forwarding(&model, obj, prior);

        assert_eq!(state_of(&model, obj), ForwardingState::NotForwarded);
        assert!(marks.is_marked(&model, obj));
        assert!(!marks.test_and_mark(&model, obj));
    }

    #[test]
    #[should_panic(expected = "Invariant violated")]
    fn test_abandon_without_claim_is_fatal() {
        let mut from = Buffer([0; 64]);
        let model = HeaderObjectModel::new();
        let obj = object(&mut from);
        let prior = model.load_status(obj, Ordering::Relaxed);
        abandon_forwarding(&model, obj, prior);
    }

    #[test]
    fn test_exactly_one_claim_wins() {
        let mut from = Buffer([0; 64]);
        let mut to = Buffer([0; 64]);
        let model = HeaderObjectModel::new();
        let obj = object(&mut from);
        let copy = object(&mut to);

        let threads = 8;
        let barrier = Barrier::new(threads);
        let winners = AtomicUsize::new(0);
        let results = Arc::new(parking_lot::Mutex::new(Vec::new()));

        std::thread::scope(|s| {
            for _ in 0..threads {
                s.spawn(|| {
                    barrier.wait();
                    let prior = attempt_to_forward(&model, obj);
                    let result = if is_forwarded_or_being_forwarded(prior) {
                        spin_and_get_forwarded_object(&model, obj, prior).0
                    } else {
                        winners.fetch_add(1, Ordering::Relaxed);
                        std::thread::yield_now();
                        set_forwarding_pointer(&model, obj, copy);
                        copy
                    };
                    results.lock().push(result);
                });
            }
        });

        assert_eq!(winners.load(Ordering::Relaxed), 1);
        assert!(results.lock().iter().all(|&r| r == copy));
    }
}
