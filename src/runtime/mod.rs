//! The binding between the collector and the runtime it serves: the minimum
//! the collector must know about objects (size, alignment, where their
//! reference slots are) and about the world outside the heap (the roots).

mod slot;

#[cfg(any(test, feature = "mock_test"))]
pub mod mock;

pub use self::slot::{Slot, SlotVisitor};

use crate::util::constants::MIN_OBJECT_ALIGNMENT;
use crate::util::ObjectReference;

/// Implemented by the language runtime embedding the collector.
///
/// Every managed object must reserve its first word for the collector (the
/// forwarding word); `object_size` includes that word.
pub trait Runtime: 'static + Send + Sync + Sized {
    /// The size of the object in bytes, as laid out in the heap.
    fn object_size(object: ObjectReference) -> usize;

    /// The alignment the object requires when copied.
    fn object_alignment(_object: ObjectReference) -> usize {
        MIN_OBJECT_ALIGNMENT
    }

    /// Visit every reference slot of the object.
    fn scan_object<V: SlotVisitor>(object: ObjectReference, visitor: &mut V);

    /// Enumerate the root slots reachable from thread stacks and globals.
    /// Called once per collection cycle while the roots are stable.
    fn enumerate_roots<V: SlotVisitor>(visitor: &mut V);
}
