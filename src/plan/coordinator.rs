use crate::plan::phase::Phase;
use crate::plan::requester::CollectionRequester;
use crate::plan::trace::Trace;
use crate::plan::tracing::VectorQueue;
use crate::policy::directory::RegionDirectory;
use crate::policy::external::ExternalSpace;
use crate::policy::state::RegionState;
use crate::runtime::{Runtime, Slot};
use crate::util::deque::SharedPool;
use crate::util::ObjectReference;
use atomic::{Atomic, Ordering};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicUsize};
use std::sync::Arc;

/// The global side of the collection protocol: owns the region directory,
/// the global trace, the remembered-set pools and the phase cell, and runs
/// the global portion of prepare and release on behalf of all threads.
///
/// Per-thread work happens in `MutatorContext` and `CollectorContext`; the
/// rendezvous between them is the `CycleController`'s business.
pub struct CollectionCoordinator<R: Runtime> {
    directory: Arc<RegionDirectory>,
    trace: Trace,
    remset_pool: Arc<SharedPool<Slot>>,
    modbuf_pool: Arc<SharedPool<ObjectReference>>,
    externals: Vec<Arc<dyn ExternalSpace>>,
    requester: CollectionRequester,
    phase: Atomic<Phase>,
    /// Inherited by mutators created while a collection is in progress.
    barrier_active: AtomicBool,
    /// Request epoch captured at prepare; a later epoch abandons the cycle.
    cycle_epoch: AtomicUsize,
    /// Mark epoch, bumped at every prepare; scans deduplicate against it.
    trace_epoch: AtomicUsize,
    /// The closure outcome, frozen once by the leader after the closure
    /// barrier so that every thread takes the same branch.
    sealed_abandoned: AtomicBool,
    /// Collector threads participating in closures.
    tracers: AtomicUsize,
    idle_tracers: AtomicUsize,
    /// Mutator threads participating in the phase barriers.
    mutators: AtomicUsize,
    /// Mutators that have flushed and parked for the rest of the cycle.
    ready_mutators: AtomicUsize,
    _runtime: PhantomData<R>,
}

impl<R: Runtime> CollectionCoordinator<R> {
    pub fn new(directory: Arc<RegionDirectory>, externals: Vec<Arc<dyn ExternalSpace>>) -> Self {
        Self {
            directory,
            trace: Trace::new(),
            remset_pool: Arc::new(SharedPool::new()),
            modbuf_pool: Arc::new(SharedPool::new()),
            externals,
            requester: CollectionRequester::new(),
            phase: Atomic::new(Phase::Idle),
            barrier_active: AtomicBool::new(false),
            cycle_epoch: AtomicUsize::new(0),
            trace_epoch: AtomicUsize::new(0),
            sealed_abandoned: AtomicBool::new(false),
            tracers: AtomicUsize::new(0),
            idle_tracers: AtomicUsize::new(0),
            mutators: AtomicUsize::new(0),
            ready_mutators: AtomicUsize::new(0),
            _runtime: PhantomData,
        }
    }

    pub fn directory(&self) -> &Arc<RegionDirectory> {
        &self.directory
    }

    pub fn trace(&self) -> &Trace {
        &self.trace
    }

    pub fn remset_pool(&self) -> &Arc<SharedPool<Slot>> {
        &self.remset_pool
    }

    pub fn modbuf_pool(&self) -> &Arc<SharedPool<ObjectReference>> {
        &self.modbuf_pool
    }

    pub fn externals(&self) -> &[Arc<dyn ExternalSpace>] {
        &self.externals
    }

    pub fn phase(&self) -> Phase {
        self.phase.load(Ordering::SeqCst)
    }

    fn set_phase(&self, next: Phase) {
        let old = self.phase.swap(next, Ordering::SeqCst);
        assert!(
            old.can_transition_to(next),
            "illegal phase transition {} -> {}",
            old,
            next
        );
        debug!("phase {} -> {}", old, next);
    }

    /// Ask for a collection. May be called from any thread at any time;
    /// a request landing mid-closure abandons the in-flight cycle.
    pub fn request_collection(&self) {
        self.requester.request();
    }

    pub fn collection_requested(&self) -> bool {
        self.requester.is_pending()
    }

    /// The mark epoch of the current cycle.
    pub fn trace_epoch(&self) -> usize {
        self.trace_epoch.load(Ordering::SeqCst)
    }

    /// Should mutators created right now start with an active barrier?
    pub fn new_mutator_barrier_active(&self) -> bool {
        self.barrier_active.load(Ordering::SeqCst)
    }

    /// The global portion of PREPARE. Must complete, and be observed as
    /// complete by every participating thread, before the closure begins.
    pub fn prepare(&self) {
        self.set_phase(Phase::Prepare);
        self.cycle_epoch
            .store(self.requester.epoch(), Ordering::SeqCst);
        self.requester.clear_request();
        self.trace_epoch.fetch_add(1, Ordering::SeqCst);
        self.sealed_abandoned.store(false, Ordering::SeqCst);
        self.idle_tracers.store(0, Ordering::SeqCst);

        // Drop whatever an abandoned cycle may have left in the pools.
        self.trace.prepare();
        self.remset_pool.clear();
        self.modbuf_pool.clear();

        for external in &self.externals {
            external.prepare();
        }

        // Every region traces under its current role from here on.
        debug!("prepare: {:?}", self.directory);
        self.barrier_active.store(true, Ordering::SeqCst);

        // Seed the trace with the roots.
        let mut buffer = VectorQueue::new();
        {
            let mut visitor = |slot: Slot| {
                buffer.push(slot);
                if buffer.is_full() {
                    buffer.flush_to(self.trace.root_slots());
                }
            };
            R::enumerate_roots(&mut visitor);
        }
        buffer.flush_to(self.trace.root_slots());
        info!(
            "prepare complete, epoch {}, {} regions",
            self.trace_epoch(),
            self.directory.len()
        );
    }

    /// The global PREPARE -> CLOSURE edge.
    pub fn begin_closure(&self) {
        self.set_phase(Phase::Closure);
    }

    /// Did a fresh request arrive after this cycle prepared?
    pub fn closure_abandoned(&self) -> bool {
        self.requester.epoch() != self.cycle_epoch.load(Ordering::SeqCst)
    }

    /// Freeze the closure outcome. Run by one thread after every collector
    /// has finished its closure loop, so all threads branch the same way.
    pub fn seal_closure(&self) {
        self.sealed_abandoned
            .store(self.closure_abandoned(), Ordering::SeqCst);
    }

    pub fn closure_was_abandoned(&self) -> bool {
        self.sealed_abandoned.load(Ordering::SeqCst)
    }

    /// Discard the in-flight cycle. Nothing is committed: from-regions stay
    /// from-regions, forwarded objects keep their forwarding words, and the
    /// pools are cleared by the next prepare. The barrier stays active.
    pub fn abandon(&self) {
        warn!(
            "closure abandoned at epoch {} (requests moved on)",
            self.cycle_epoch.load(Ordering::SeqCst)
        );
        self.set_phase(Phase::Idle);
    }

    /// The global portion of RELEASE: recycle every from-region, clear the
    /// pools, deactivate the barriers.
    pub fn release(&self) {
        self.set_phase(Phase::Release);

        // A non-empty pool here means a write-barrier record was never
        // drained: a lost update waiting to corrupt the heap.
        if !self.remset_pool.is_empty() || !self.modbuf_pool.is_empty() || !self.trace.is_empty() {
            panic!(
                "release with undrained work: remsets empty={} modbuf empty={} trace empty={}\n{:?}",
                self.remset_pool.is_empty(),
                self.modbuf_pool.is_empty(),
                self.trace.is_empty(),
                self.directory
            );
        }

        for id in self.directory.ids() {
            loop {
                match self.directory.state(id) {
                    RegionState::From => {
                        if self.directory.transition(id, RegionState::From, RegionState::Unused) {
                            self.directory.region(id).reset();
                            debug!("released {}", id);
                            break;
                        }
                        // raced with a selection; try again
                    }
                    _ => break,
                }
            }
        }

        for external in &self.externals {
            external.release();
        }
        self.trace.release();
        self.barrier_active.store(false, Ordering::SeqCst);
        self.ready_mutators.store(0, Ordering::SeqCst);
        self.set_phase(Phase::Idle);
        info!("release complete: {:?}", self.directory);
    }

    // -- closure termination bookkeeping --

    pub(crate) fn register_tracer(&self) {
        self.tracers.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn register_mutator(&self) {
        self.mutators.fetch_add(1, Ordering::SeqCst);
    }

    /// A mutator flushed its buffers and parked until the cycle ends. The
    /// closure fixpoint cannot close before every mutator has done so;
    /// parked mutators stay parked across an abandoned cycle's restart.
    pub(crate) fn mutator_ready(&self) {
        self.ready_mutators.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn enter_idle(&self) {
        self.idle_tracers.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn leave_idle(&self) {
        self.idle_tracers.fetch_sub(1, Ordering::SeqCst);
    }

    /// The closed fixpoint: every mutator has flushed and parked, every
    /// tracer is idle, and no pending entry exists anywhere.
    pub(crate) fn tracing_quiescent(&self) -> bool {
        self.ready_mutators.load(Ordering::SeqCst) == self.mutators.load(Ordering::SeqCst)
            && self.idle_tracers.load(Ordering::SeqCst) == self.tracers.load(Ordering::SeqCst)
            && self.trace.is_empty()
            && self.remset_pool.is_empty()
            && self.modbuf_pool.is_empty()
    }

    /// Is there any shared work a tracer could pull right now?
    pub(crate) fn has_pending_work(&self) -> bool {
        !self.trace.is_empty() || !self.remset_pool.is_empty() || !self.modbuf_pool.is_empty()
    }

    // -- accounting exposed to the outer runtime --

    /// Pages covered by data in regions currently bound to a role.
    pub fn pages_used(&self) -> usize {
        let usage = self.directory.reserved_pages_by_state();
        usage[RegionState::From] + usage[RegionState::To]
    }

    /// Pages set aside for copying.
    pub fn collection_reserve(&self) -> usize {
        self.directory.reserved_pages_by_state()[RegionState::To]
    }

    pub fn pages_available(&self) -> usize {
        self.directory.pages_total() - self.pages_used()
    }

    /// True when no collection this crate runs can ever move the object.
    pub fn will_never_move(&self, object: ObjectReference) -> bool {
        if self.directory.region_of_object(object).is_some() {
            return false;
        }
        for external in &self.externals {
            if external.contains(object) {
                return !external.is_movable();
            }
        }
        true
    }
}
