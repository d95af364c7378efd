use crate::plan::tracing::VectorQueue;
use crate::policy::directory::RegionDirectory;
use crate::policy::state::RegionState;
use crate::runtime::Slot;
use crate::util::deque::SharedPool;
use crate::util::ObjectReference;
use std::sync::Arc;

/// The mutator-side write barrier of the copying protocol.
///
/// While a closure is in progress, every reference store the mutator
/// performs goes through here. A store whose target sits in a region being
/// copied out of is recorded so the collector re-validates it: the slot
/// address when the slot lies outside that region, the source object when
/// the slot lies inside it (the object may already have been scanned).
/// This is the only way the collector learns about edges created after
/// prepare; a store bypassing the barrier is a lost update.
pub struct RegionBarrier {
    directory: Arc<RegionDirectory>,
    active: bool,
    remset: VectorQueue<Slot>,
    modbuf: VectorQueue<ObjectReference>,
    remset_pool: Arc<SharedPool<Slot>>,
    modbuf_pool: Arc<SharedPool<ObjectReference>>,
}

impl RegionBarrier {
    pub fn new(
        directory: Arc<RegionDirectory>,
        remset_pool: Arc<SharedPool<Slot>>,
        modbuf_pool: Arc<SharedPool<ObjectReference>>,
    ) -> Self {
        Self {
            directory,
            active: false,
            remset: VectorQueue::new(),
            modbuf: VectorQueue::new(),
            remset_pool,
            modbuf_pool,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    /// Perform a reference store on behalf of the mutator.
    pub fn object_reference_write(
        &mut self,
        src: ObjectReference,
        slot: Slot,
        target: ObjectReference,
    ) {
        if self.active {
            self.record(src, slot, target);
        }
        slot.store(target);
    }

    /// Perform a reference compare-and-swap on behalf of the mutator.
    /// The store is only recorded if it happened.
    pub fn object_reference_try_compare_and_swap(
        &mut self,
        src: ObjectReference,
        slot: Slot,
        old: ObjectReference,
        target: ObjectReference,
    ) -> bool {
        let ok = slot.compare_exchange(old, target);
        if self.active && ok {
            self.record(src, slot, target);
        }
        ok
    }

    fn record(&mut self, src: ObjectReference, slot: Slot, target: ObjectReference) {
        let Some(target_region) = self.directory.region_of_object(target) else {
            return;
        };
        if self.directory.state(target_region) != RegionState::From {
            return;
        }
        if self.directory.region_of(slot.address()) != Some(target_region) {
            trace!("barrier records slot {} -> {}", slot.address(), target);
            self.remset.push(slot);
            if self.remset.is_full() {
                self.remset.flush_to(&self.remset_pool);
            }
        } else if !src.is_null() {
            // The slot lives in the region under copy itself; remember the
            // holder so an already-scanned holder gets re-scanned.
            trace!("barrier records modified object {}", src);
            self.modbuf.push(src);
            if self.modbuf.is_full() {
                self.modbuf.flush_to(&self.modbuf_pool);
            }
        }
    }

    /// Hand all locally buffered entries to the shared pools.
    pub fn flush(&mut self) {
        self.remset.flush_to(&self.remset_pool);
        self.modbuf.flush_to(&self.modbuf_pool);
    }

    /// True when no entry is sitting in a local buffer.
    pub fn is_flushed(&self) -> bool {
        self.remset.is_empty() && self.modbuf.is_empty()
    }
}
