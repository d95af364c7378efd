use crate::plan::coordinator::CollectionCoordinator;
use crate::plan::tracing::VectorQueue;
use crate::policy::region::RegionId;
use crate::policy::state::RegionState;
use crate::runtime::{Runtime, Slot};
use crate::util::alloc::BumpAllocator;
use crate::util::forwarding;
use crate::util::{Address, ObjectReference};
use std::sync::Arc;

/// How many times a copy allocation retries with a freshly selected
/// destination region before giving up.
const COPY_REBIND_ATTEMPTS: usize = 2;

/// The per-collector trace: classifies, forwards and re-validates object
/// references, bump-allocating copies into the collector's bound to-regions
/// and draining the shared work pools until the closure reaches its
/// fixpoint.
pub struct Tracer<R: Runtime> {
    coordinator: Arc<CollectionCoordinator<R>>,
    copy: BumpAllocator,
    /// Every to-region bound this cycle; the last one backs the allocator.
    bound: Vec<RegionId>,
    /// Local queue of objects waiting to be scanned.
    values: VectorQueue<ObjectReference>,
    scratch: Vec<Slot>,
    epoch: usize,
}

impl<R: Runtime> Tracer<R> {
    pub fn new(coordinator: Arc<CollectionCoordinator<R>>) -> Self {
        let copy = BumpAllocator::new(coordinator.directory().clone());
        Self {
            coordinator,
            copy,
            bound: Vec::new(),
            values: VectorQueue::new(),
            scratch: Vec::new(),
            epoch: 0,
        }
    }

    pub fn coordinator(&self) -> &Arc<CollectionCoordinator<R>> {
        &self.coordinator
    }

    /// The to-regions this tracer holds for the current cycle.
    pub fn bound_regions(&self) -> &[RegionId] {
        &self.bound
    }

    /// The per-thread portion of PREPARE: recycle last cycle's destinations
    /// and claim a fresh one.
    pub fn prepare(&mut self) {
        // leftovers can only come from an abandoned cycle; they are part of
        // the result being discarded
        if !self.values.is_empty() {
            debug!("discarding {} partial trace entries", self.values.len());
            self.values.take();
        }
        let directory = self.coordinator.directory().clone();

        // Overflow destinations beyond the primary one are handed back
        // wholesale; their contents stay put until the regions rotate into
        // allocation sources.
        let previous = self.bound.pop();
        for extra in self.bound.drain(..) {
            let ok = directory.transition(extra, RegionState::To, RegionState::Unused);
            debug_assert!(ok, "lost ownership of bound region {}", extra);
        }

        let to = loop {
            if let Some(id) = directory.select(previous, RegionState::To) {
                break id;
            }
        };
        trace!("tracer bound {:?} -> {}", previous, to);
        self.bound.push(to);
        self.copy.rebind(to);
        self.epoch = self.coordinator.trace_epoch();
    }

    /// The per-thread portion of RELEASE.
    pub fn release(&mut self) {
        assert!(
            self.values.is_empty(),
            "tracer released with {} unscanned objects",
            self.values.len()
        );
        self.scratch.clear();
    }

    /// Classify and forward one reference; returns what the referring slot
    /// should hold from now on. Null passes through unchanged.
    pub fn trace_object(&mut self, object: ObjectReference) -> ObjectReference {
        if object.is_null() {
            return object;
        }
        let directory = self.coordinator.directory();
        if let Some(region) = directory.region_of_object(object) {
            if directory.state(region) == RegionState::From {
                return self.trace_evacuate(object);
            }
            // Live in place this cycle; scheduled for scanning exactly once.
            if forwarding::test_and_mark(object, self.epoch) {
                self.process_node(object);
            }
            return object;
        }
        for external in self.coordinator.externals() {
            if external.contains(object) {
                return external.trace_object(&mut self.values, object);
            }
        }
        panic!("traced object {} outside every managed space", object);
    }

    fn trace_evacuate(&mut self, object: ObjectReference) -> ObjectReference {
        let state = forwarding::attempt_to_forward(object);
        let new_object = if forwarding::state_is_forwarded_or_being_forwarded(state) {
            forwarding::spin_and_get_forwarded_object(object, state)
        } else {
            let new_object = self.forward(object);
            trace!("copied {} -> {}", object, new_object);
            new_object
        };
        // Whoever wins the mark owns the (re)scan of the copy. Normally the
        // copier wins right here; after an abandoned cycle this re-schedules
        // copies whose fields were never fully re-validated.
        if forwarding::test_and_mark(new_object, self.epoch) {
            self.process_node(new_object);
        }
        new_object
    }

    /// Copy the object into this tracer's destination and publish the
    /// forwarding pointer. The caller owns the forwarding claim.
    fn forward(&mut self, object: ObjectReference) -> ObjectReference {
        let bytes = R::object_size(object);
        let align = R::object_alignment(object);
        let addr = self.alloc_copy(bytes, align);
        unsafe {
            std::ptr::copy_nonoverlapping::<u8>(
                object.to_raw_address().to_ptr(),
                addr.to_mut_ptr(),
                bytes,
            );
        }
        let new_object = ObjectReference::from_raw_address(addr);
        forwarding::clear_state(new_object);
        forwarding::write_forwarding_pointer(object, new_object);
        new_object
    }

    fn alloc_copy(&mut self, bytes: usize, align: usize) -> Address {
        let addr = self.copy.alloc(bytes, align);
        if !addr.is_zero() {
            return addr;
        }
        let directory = self.coordinator.directory().clone();
        for _ in 0..COPY_REBIND_ATTEMPTS {
            let Some(id) = directory.select(None, RegionState::To) else {
                continue;
            };
            if directory.state(id) != RegionState::To {
                // best-effort fallback candidate we did not actually claim
                continue;
            }
            debug!("copy destination full, bound additional region {}", id);
            self.bound.push(id);
            self.copy.rebind(id);
            let addr = self.copy.alloc(bytes, align);
            if !addr.is_zero() {
                return addr;
            }
        }
        panic!(
            "out of memory copying {} bytes: {:?}",
            bytes,
            self.coordinator.directory()
        );
    }

    /// Is the object reachable, by the owning space's liveness protocol?
    pub fn is_live(&self, object: ObjectReference) -> bool {
        if object.is_null() {
            return false;
        }
        let directory = self.coordinator.directory();
        if let Some(region) = directory.region_of_object(object) {
            return match directory.state(region) {
                // an evacuation candidate is live once it has been copied
                RegionState::From => forwarding::is_forwarded(object),
                _ => true,
            };
        }
        for external in self.coordinator.externals() {
            if external.contains(object) {
                return external.is_live(object);
            }
        }
        false
    }

    /// True only if the object already sits in one of this collector's
    /// destination regions, i.e. it has been copied this cycle and its
    /// address is stable for the rest of the collection.
    pub fn will_not_move_in_current_collection(&self, object: ObjectReference) -> bool {
        match self
            .coordinator
            .directory()
            .region_of_object(object)
        {
            Some(region) => self.bound.contains(&region),
            None => false,
        }
    }

    fn process_node(&mut self, object: ObjectReference) {
        self.values.push(object);
        if self.values.is_full() {
            self.values.flush_to(self.coordinator.trace().values());
        }
    }

    /// Re-validate one slot: trace what it holds and swing it to the copy.
    /// The swing is a compare-and-swap so a racing mutator store is never
    /// clobbered; the write barrier re-records such a store anyway.
    pub fn process_slot(&mut self, slot: Slot) {
        let old = slot.load();
        if old.is_null() {
            return;
        }
        let new = self.trace_object(old);
        if new != old {
            slot.compare_exchange(old, new);
        }
    }

    fn scan_node(&mut self, object: ObjectReference) {
        let mut slots = std::mem::take(&mut self.scratch);
        R::scan_object(object, &mut |slot: Slot| slots.push(slot));
        for slot in slots.drain(..) {
            self.process_slot(slot);
        }
        self.scratch = slots;
    }

    fn drain_local(&mut self) {
        while let Some(object) = self.values.pop() {
            self.scan_node(object);
        }
    }

    /// Drain the remembered sets the mutators' barriers filled: every
    /// modified object is re-scanned, every recorded slot re-traced as a
    /// root. This is how concurrent mutation becomes visible to an
    /// in-progress trace. Returns true if any entry was processed.
    pub fn process_remembered_sets(&mut self) -> bool {
        let mut found = false;
        while let Some(block) = self.coordinator.modbuf_pool().pop() {
            found = true;
            trace!("processing modbuf block of {}", block.len());
            for object in block {
                self.scan_node(object);
            }
        }
        while let Some(block) = self.coordinator.remset_pool().pop() {
            found = true;
            trace!("processing remset block of {}", block.len());
            for slot in block {
                self.process_slot(slot);
            }
        }
        found
    }

    /// Run the closure to its fixpoint: roots, transitive scan, remembered
    /// sets, until every tracer is idle and no queue holds an entry. Exits
    /// early (leaving the cycle to be abandoned) when a fresh collection
    /// request supersedes this one.
    pub fn complete_trace(&mut self) {
        let coordinator = self.coordinator.clone();
        'trace: loop {
            if coordinator.closure_abandoned() {
                return;
            }
            self.drain_local();

            if let Some(block) = coordinator.trace().root_slots().pop() {
                for slot in block {
                    self.process_slot(slot);
                }
                continue 'trace;
            }
            if let Some(block) = coordinator.trace().values().pop() {
                for object in block {
                    self.scan_node(object);
                }
                continue 'trace;
            }
            if self.process_remembered_sets() {
                continue 'trace;
            }

            // Nothing found anywhere; wait for the fixpoint to close or for
            // someone to surface more work.
            coordinator.enter_idle();
            loop {
                if coordinator.closure_abandoned() {
                    return;
                }
                if coordinator.has_pending_work() {
                    coordinator.leave_idle();
                    continue 'trace;
                }
                if coordinator.tracing_quiescent() {
                    debug_assert!(self.values.is_empty());
                    return;
                }
                std::thread::yield_now();
            }
        }
    }
}
