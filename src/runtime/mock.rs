//! A miniature runtime binding for driving the collector in tests and
//! external harnesses without a real language runtime.
//!
//! Mock objects are flat: a forwarding word, a word holding the field
//! count, then that many reference fields.

use crate::plan::mutator::MutatorContext;
use crate::plan::tracing::ObjectQueue;
use crate::policy::external::ExternalSpace;
use crate::runtime::{Runtime, Slot, SlotVisitor};
use crate::util::constants::{BYTES_IN_WORD, MIN_OBJECT_ALIGNMENT};
use crate::util::{memory, Address, ObjectReference};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub const HEADER_WORDS: usize = 2;

lazy_static! {
    static ref ROOTS: Mutex<Vec<usize>> = Mutex::new(Vec::new());
}

pub struct MockRuntime;

impl Runtime for MockRuntime {
    fn object_size(object: ObjectReference) -> usize {
        object_size_for(field_count(object))
    }

    fn scan_object<V: SlotVisitor>(object: ObjectReference, visitor: &mut V) {
        for i in 0..field_count(object) {
            visitor.visit_slot(field_slot(object, i));
        }
    }

    fn enumerate_roots<V: SlotVisitor>(visitor: &mut V) {
        for &raw in ROOTS.lock().unwrap().iter() {
            visitor.visit_slot(Slot::from_address(unsafe { Address::from_usize(raw) }));
        }
    }
}

/// Forget every registered root. Call at the start of each test.
pub fn clear_roots() {
    ROOTS.lock().unwrap().clear();
}

/// Create a stable off-heap cell holding `value` and register it as a root.
pub fn register_root_cell(value: ObjectReference) -> Slot {
    let cell: &'static mut ObjectReference = Box::leak(Box::new(value));
    let slot = Slot::from_address(Address::from_ref(cell));
    ROOTS.lock().unwrap().push(slot.address().as_usize());
    slot
}

pub fn object_size_for(fields: usize) -> usize {
    (HEADER_WORDS + fields) * BYTES_IN_WORD
}

// The second header word packs the field count in its low half and a free
// test-visible tag in its high half.
const FIELD_COUNT_BITS: usize = usize::BITS as usize / 2;
const FIELD_COUNT_MASK: usize = (1 << FIELD_COUNT_BITS) - 1;

pub fn field_count(object: ObjectReference) -> usize {
    unsafe { (object.to_raw_address() + BYTES_IN_WORD).load::<usize>() & FIELD_COUNT_MASK }
}

/// A caller-defined identity that travels with the object when it is copied.
pub fn tag(object: ObjectReference) -> usize {
    unsafe { (object.to_raw_address() + BYTES_IN_WORD).load::<usize>() >> FIELD_COUNT_BITS }
}

pub fn set_tag(object: ObjectReference, tag: usize) {
    debug_assert!(tag < (1 << (usize::BITS as usize - FIELD_COUNT_BITS)));
    let word = (tag << FIELD_COUNT_BITS) | field_count(object);
    unsafe { (object.to_raw_address() + BYTES_IN_WORD).store(word) }
}

pub fn field_slot(object: ObjectReference, index: usize) -> Slot {
    debug_assert!(index < field_count(object));
    Slot::from_address(object.to_raw_address() + (HEADER_WORDS + index) * BYTES_IN_WORD)
}

pub fn get_field(object: ObjectReference, index: usize) -> ObjectReference {
    field_slot(object, index).load()
}

/// Initialize an object at `addr`: zeroed forwarding word, field count,
/// null fields.
fn init_object(addr: Address, fields: usize) -> ObjectReference {
    unsafe {
        addr.store(0usize);
        (addr + BYTES_IN_WORD).store(fields);
        for i in 0..fields {
            (addr + (HEADER_WORDS + i) * BYTES_IN_WORD).store(ObjectReference::NULL);
        }
    }
    ObjectReference::from_raw_address(addr)
}

/// Allocate a mock object with the given number of reference fields.
/// Returns null when the heap cannot satisfy the request.
pub fn alloc_object(mutator: &mut MutatorContext<MockRuntime>, fields: usize) -> ObjectReference {
    let addr = mutator.alloc(object_size_for(fields), MIN_OBJECT_ALIGNMENT);
    if addr.is_zero() {
        return ObjectReference::NULL;
    }
    init_object(addr, fields)
}

/// Follow an object's forwarding chain to wherever it lives now.
pub fn resolve(object: ObjectReference) -> ObjectReference {
    if !object.is_null() && crate::util::forwarding::is_forwarded(object) {
        crate::util::forwarding::read_forwarding_pointer(object)
    } else {
        object
    }
}

/// A non-moving collaborator space: bump-allocated, mark-set liveness.
pub struct MockImmortalSpace {
    start: Address,
    extent: usize,
    cursor: AtomicUsize,
    marks: Mutex<HashSet<usize>>,
}

impl MockImmortalSpace {
    pub fn new(extent: usize) -> Self {
        let start = memory::map_anonymous(extent).unwrap();
        Self {
            start,
            extent,
            cursor: AtomicUsize::new(start.as_usize()),
            marks: Mutex::new(HashSet::new()),
        }
    }

    /// Allocate a mock object directly in this space.
    pub fn alloc_object(&self, fields: usize) -> ObjectReference {
        let bytes = object_size_for(fields);
        let old = self.cursor.fetch_add(bytes, Ordering::SeqCst);
        assert!(old + bytes <= self.start.as_usize() + self.extent);
        init_object(unsafe { Address::from_usize(old) }, fields)
    }
}

impl ExternalSpace for MockImmortalSpace {
    fn name(&self) -> &'static str {
        "mock-immortal"
    }

    fn contains(&self, object: ObjectReference) -> bool {
        let addr = object.to_raw_address();
        addr >= self.start && addr < self.start + self.extent
    }

    fn trace_object(
        &self,
        queue: &mut dyn ObjectQueue,
        object: ObjectReference,
    ) -> ObjectReference {
        if self.marks.lock().unwrap().insert(object.to_raw_address().as_usize()) {
            queue.enqueue(object);
        }
        object
    }

    fn is_live(&self, object: ObjectReference) -> bool {
        self.marks.lock().unwrap().contains(&object.to_raw_address().as_usize())
    }

    fn prepare(&self) {
        self.marks.lock().unwrap().clear();
    }

    fn release(&self) {}
}
