use crate::plan::barriers::RegionBarrier;
use crate::plan::coordinator::CollectionCoordinator;
use crate::policy::state::RegionState;
use crate::runtime::{Runtime, Slot};
use crate::util::alloc::BumpAllocator;
use crate::util::{Address, ObjectReference};
use std::sync::Arc;

/// How many region selections an allocation slow path attempts before
/// reporting the request as unsatisfiable.
const ALLOC_REBIND_ATTEMPTS: usize = 8;

/// Per application thread: a private allocation cursor bound to an
/// allocation-source region, plus the write barrier and its buffers.
///
/// The embedder owns the scheduling: it must call `prepare` once the global
/// prepare is complete, keep routing reference stores through the barrier
/// while the closure runs, and call `flush` at its final handshake before
/// the release, then `release` afterwards.
pub struct MutatorContext<R: Runtime> {
    id: u32,
    coordinator: Arc<CollectionCoordinator<R>>,
    allocator: BumpAllocator,
    barrier: RegionBarrier,
    /// Has this mutator flushed and parked for the current cycle?
    parked: bool,
}

impl<R: Runtime> MutatorContext<R> {
    pub fn new(id: u32, coordinator: Arc<CollectionCoordinator<R>>) -> Self {
        coordinator.register_mutator();
        let barrier_active = coordinator.new_mutator_barrier_active();
        let mut allocator = BumpAllocator::new(coordinator.directory().clone());
        let region = Self::select_from_region(&coordinator, barrier_active);
        allocator.rebind(region);
        debug!("M{} bound {}", id, region);

        let mut barrier = RegionBarrier::new(
            coordinator.directory().clone(),
            coordinator.remset_pool().clone(),
            coordinator.modbuf_pool().clone(),
        );
        barrier.set_active(barrier_active);

        Self {
            id,
            coordinator,
            allocator,
            barrier,
            parked: false,
        }
    }

    /// Claim an allocation source. While a trace is in progress, region
    /// roles are fixed: turning a region that already holds traced objects
    /// into an evacuation candidate would split its objects between an
    /// in-place version and a copy. So under an active barrier only
    /// pristine regions qualify; anything else is handed straight back.
    fn try_select_from_region(
        coordinator: &CollectionCoordinator<R>,
        pristine_only: bool,
    ) -> Option<crate::policy::region::RegionId> {
        let directory = coordinator.directory();
        let id = directory.select(None, RegionState::From)?;
        if directory.state(id) != RegionState::From {
            // best-effort fallback candidate we did not actually claim
            return None;
        }
        let region = directory.region(id);
        if pristine_only && region.cursor() != region.start() {
            directory.transition(id, RegionState::From, RegionState::Unused);
            return None;
        }
        Some(id)
    }

    fn select_from_region(
        coordinator: &CollectionCoordinator<R>,
        pristine_only: bool,
    ) -> crate::policy::region::RegionId {
        loop {
            if let Some(id) = Self::try_select_from_region(coordinator, pristine_only) {
                break id;
            }
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn current_region(&self) -> Option<crate::policy::region::RegionId> {
        self.allocator.region()
    }

    pub fn barrier_active(&self) -> bool {
        self.barrier.is_active()
    }

    /// Bump-allocate from the bound region. Returns `Address::ZERO` when the
    /// request cannot be satisfied anywhere; the embedder surfaces that as
    /// its language-level out-of-memory error.
    pub fn alloc(&mut self, bytes: usize, align: usize) -> Address {
        let addr = self.allocator.alloc(bytes, align);
        if !addr.is_zero() {
            return addr;
        }
        self.alloc_slow(bytes, align)
    }

    fn alloc_slow(&mut self, bytes: usize, align: usize) -> Address {
        let pristine_only = self.barrier.is_active();
        for _ in 0..ALLOC_REBIND_ATTEMPTS {
            // The exhausted region keeps its role: everything allocated in
            // it is still an evacuation candidate. We only bind a new one.
            let Some(id) = Self::try_select_from_region(&self.coordinator, pristine_only) else {
                continue;
            };
            debug!("M{} rebound to {} on overflow", self.id, id);
            self.allocator.rebind(id);
            let addr = self.allocator.alloc(bytes, align);
            if !addr.is_zero() {
                return addr;
            }
        }
        error!(
            "M{} cannot allocate {} bytes: {:?}",
            self.id,
            bytes,
            self.coordinator.directory()
        );
        Address::ZERO
    }

    /// Store `target` into `slot` of `src`, applying the write barrier.
    pub fn object_reference_write(
        &mut self,
        src: ObjectReference,
        slot: Slot,
        target: ObjectReference,
    ) {
        self.barrier.object_reference_write(src, slot, target);
    }

    /// Compare-and-swap flavour of the reference store.
    pub fn object_reference_try_compare_and_swap(
        &mut self,
        src: ObjectReference,
        slot: Slot,
        old: ObjectReference,
        target: ObjectReference,
    ) -> bool {
        self.barrier
            .object_reference_try_compare_and_swap(src, slot, old, target)
    }

    /// Bulk copy of reference arrays. This configuration does not complete
    /// the barrier logic for bulk transfers.
    pub fn object_reference_bulk_copy(
        &mut self,
        _src: ObjectReference,
        _dst: ObjectReference,
        _bytes: usize,
    ) -> bool {
        unimplemented!("bulk reference copy is not supported by this barrier configuration")
    }

    /// Read barrier for soft/weak reference lookup. Not part of this
    /// configuration.
    pub fn reference_read_barrier(&mut self, _object: ObjectReference) -> ObjectReference {
        unimplemented!("reference read barrier is not supported by this barrier configuration")
    }

    /// Hand every locally buffered remembered-set entry to the shared pools
    /// and park until the cycle ends. The closure fixpoint waits for every
    /// mutator's flush; a mutator must not mutate again before `release`.
    pub fn flush(&mut self) {
        self.barrier.flush();
        self.assert_remsets_flushed();
        if !self.parked {
            self.parked = true;
            self.coordinator.mutator_ready();
        }
    }

    pub fn assert_remsets_flushed(&self) {
        debug_assert!(self.barrier.is_flushed());
    }

    /// The per-thread portion of PREPARE: the barrier goes live.
    pub fn prepare(&mut self) {
        self.barrier.set_active(true);
    }

    /// The per-thread portion of RELEASE: the local buffers must already be
    /// flushed; rebind to a fresh allocation source and drop the barrier.
    /// The old region was recycled by the global release.
    pub fn release(&mut self) {
        assert!(
            self.barrier.is_flushed(),
            "M{} reached release with unflushed remembered sets",
            self.id
        );
        let old = self.allocator.region();
        let region = Self::select_from_region(&self.coordinator, false);
        self.allocator.rebind(region);
        debug!("M{} release: {:?} -> {}", self.id, old, region);
        self.barrier.set_active(false);
        self.parked = false;
    }
}
