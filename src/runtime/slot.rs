use crate::util::{Address, ObjectReference};
use atomic::{Atomic, Ordering};

/// A slot: the address of a memory location holding an object reference.
/// Loads and stores go through an atomic view of the location, because
/// mutators and collector threads race on slots while a closure is running.
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct Slot(Address);

impl Slot {
    pub fn from_address(address: Address) -> Self {
        debug_assert!(!address.is_zero());
        Self(address)
    }

    pub fn address(&self) -> Address {
        self.0
    }

    fn as_atomic(&self) -> &Atomic<ObjectReference> {
        unsafe { &*self.0.to_ptr::<Atomic<ObjectReference>>() }
    }

    pub fn load(&self) -> ObjectReference {
        self.as_atomic().load(Ordering::Relaxed)
    }

    pub fn store(&self, object: ObjectReference) {
        self.as_atomic().store(object, Ordering::Relaxed)
    }

    /// Compare-and-swap the slot. Returns true if the swap happened.
    pub fn compare_exchange(&self, old: ObjectReference, new: ObjectReference) -> bool {
        self.as_atomic()
            .compare_exchange(old, new, Ordering::SeqCst, Ordering::Relaxed)
            .is_ok()
    }
}

/// Callback trait of scanning functions that report slots.
pub trait SlotVisitor {
    /// Call this function for each slot.
    fn visit_slot(&mut self, slot: Slot);
}

/// This lets us use closures as SlotVisitor.
impl<F: FnMut(Slot)> SlotVisitor for F {
    fn visit_slot(&mut self, slot: Slot) {
        self(slot)
    }
}
