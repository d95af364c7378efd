//! The forwarding word: the first word of every managed object, reserved for
//! the collector. It either carries the trace mark of the cycle that last
//! scanned the object in place, or the forwarding state and forwarding
//! pointer once the object has been (or is being) relocated.

use crate::util::constants::BYTES_IN_WORD;
use crate::util::{Address, ObjectReference};
use std::sync::atomic::{AtomicUsize, Ordering};

const FORWARDING_NOT_TRIGGERED_YET: usize = 0b00;
const MARKED: usize = 0b01;
const BEING_FORWARDED: usize = 0b10;
const FORWARDED: usize = 0b11;
const FORWARDING_MASK: usize = 0b11;
const MARK_EPOCH_SHIFT: usize = 2;

fn status_word(object: ObjectReference) -> &'static AtomicUsize {
    debug_assert!(!object.is_null());
    debug_assert!(object.to_raw_address().is_aligned_to(BYTES_IN_WORD));
    unsafe { &*object.to_raw_address().to_ptr::<AtomicUsize>() }
}

/// Return the forwarding state bits of the object.
pub fn forwarding_state(object: ObjectReference) -> usize {
    status_word(object).load(Ordering::SeqCst) & FORWARDING_MASK
}

/// Attempt to become the thread that forwards the object. The winner sees a
/// claimable prior state and leaves the word in `BEING_FORWARDED`, preventing
/// anyone else from copying the same object. Returns the prior state bits.
pub fn attempt_to_forward(object: ObjectReference) -> usize {
    loop {
        let old = status_word(object).load(Ordering::SeqCst);
        let old_state = old & FORWARDING_MASK;
        if state_is_forwarded_or_being_forwarded(old_state) {
            return old_state;
        }
        if status_word(object)
            .compare_exchange(old, BEING_FORWARDED, Ordering::SeqCst, Ordering::Relaxed)
            .is_ok()
        {
            return old_state;
        }
    }
}

/// Spin-wait until the object's forwarding is complete, then read the
/// forwarding pointer.
///
/// `state` is the last observed state bits of the object before this call.
pub fn spin_and_get_forwarded_object(object: ObjectReference, state: usize) -> ObjectReference {
    let mut state = state;
    while state == BEING_FORWARDED {
        state = forwarding_state(object);
    }
    if state == FORWARDED {
        read_forwarding_pointer(object)
    } else {
        // Another thread cleared the word while we were spinning. Treat the
        // object as not (yet) forwarded.
        debug_assert!(
            !state_is_forwarded_or_being_forwarded(state),
            "invalid forwarding state {:#x} for object {}",
            state,
            object,
        );
        object
    }
}

pub fn state_is_forwarded_or_being_forwarded(state: usize) -> bool {
    state & BEING_FORWARDED != 0
}

pub fn is_forwarded(object: ObjectReference) -> bool {
    forwarding_state(object) == FORWARDED
}

/// Read the forwarding pointer of a forwarded object.
pub fn read_forwarding_pointer(object: ObjectReference) -> ObjectReference {
    debug_assert!(
        is_forwarded(object),
        "read_forwarding_pointer called for object {} that is not forwarded",
        object,
    );
    let word = status_word(object).load(Ordering::SeqCst);
    ObjectReference::from_raw_address(unsafe { Address::from_usize(word & !FORWARDING_MASK) })
}

/// Publish the forwarding pointer of an object this thread claimed via
/// [`attempt_to_forward`]. The pointer and the `FORWARDED` state are
/// installed in a single store.
pub fn write_forwarding_pointer(object: ObjectReference, new_object: ObjectReference) {
    debug_assert!(
        forwarding_state(object) == BEING_FORWARDED,
        "write_forwarding_pointer called for object {} that is not being forwarded (state {:#x})",
        object,
        forwarding_state(object),
    );
    debug_assert!(new_object
        .to_raw_address()
        .is_aligned_to(1 << MARK_EPOCH_SHIFT));
    trace!("write_forwarding_pointer({}, {})", object, new_object);
    status_word(object).store(
        new_object.to_raw_address().as_usize() | FORWARDED,
        Ordering::SeqCst,
    );
}

/// Zero the forwarding word of an object. This is used on freshly copied
/// objects before their new address is published.
pub fn clear_state(object: ObjectReference) {
    status_word(object).store(FORWARDING_NOT_TRIGGERED_YET, Ordering::SeqCst);
}

fn mark_word(epoch: usize) -> usize {
    (epoch << MARK_EPOCH_SHIFT) | MARKED
}

/// Record that the object has been scanned in place during the given
/// collection cycle. Returns true for exactly the first marker per cycle;
/// losers (and repeat calls) get false, which makes re-scanning idempotent.
pub fn test_and_mark(object: ObjectReference, epoch: usize) -> bool {
    loop {
        let old = status_word(object).load(Ordering::SeqCst);
        debug_assert!(
            !state_is_forwarded_or_being_forwarded(old & FORWARDING_MASK),
            "test_and_mark called for object {} in forwarding state {:#x}",
            object,
            old & FORWARDING_MASK,
        );
        if old == mark_word(epoch) {
            return false;
        }
        if status_word(object)
            .compare_exchange(old, mark_word(epoch), Ordering::SeqCst, Ordering::Relaxed)
            .is_ok()
        {
            return true;
        }
    }
}
