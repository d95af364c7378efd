use crate::plan::collector::CollectorContext;
use crate::plan::coordinator::CollectionCoordinator;
use crate::runtime::Runtime;
use std::sync::{Arc, Barrier};

/// The result of one pass through the phase machine.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The closure reached its fixpoint and the from-regions were recycled.
    Completed,
    /// A fresh request superseded the cycle mid-closure; nothing was
    /// committed and a new cycle should start over.
    Abandoned,
}

/// The rendezvous that sequences one collection cycle across all collector
/// threads. Every collector calls `run_cycle` with its own context; the
/// barrier provides the PREPARE -> CLOSURE and CLOSURE -> RELEASE edges no
/// thread may pass before all have arrived, and the barrier leader runs the
/// coordinator's global phase work.
///
/// Mutator handshakes (activating barriers after prepare, the final flush
/// before release, rebinding afterwards) belong to the embedder's
/// scheduler, which decides when each mutator reaches a safepoint.
pub struct CycleController<R: Runtime> {
    coordinator: Arc<CollectionCoordinator<R>>,
    rendezvous: Barrier,
}

impl<R: Runtime> CycleController<R> {
    pub fn new(coordinator: Arc<CollectionCoordinator<R>>, collectors: usize) -> Self {
        Self {
            coordinator,
            rendezvous: Barrier::new(collectors),
        }
    }

    pub fn coordinator(&self) -> &Arc<CollectionCoordinator<R>> {
        &self.coordinator
    }

    /// Run one collection cycle on the calling collector thread. All
    /// registered collectors must call this for the cycle to make progress.
    pub fn run_cycle(&self, collector: &mut CollectorContext<R>) -> CycleOutcome {
        if self.rendezvous.wait().is_leader() {
            self.coordinator.prepare();
        }
        // prepare must be observed complete by everyone before tracing
        self.rendezvous.wait();
        collector.prepare();
        if self.rendezvous.wait().is_leader() {
            self.coordinator.begin_closure();
        }
        self.rendezvous.wait();

        collector.closure();

        // every collector is done tracing; freeze the outcome so all take
        // the same branch
        if self.rendezvous.wait().is_leader() {
            self.coordinator.seal_closure();
        }
        self.rendezvous.wait();

        if self.coordinator.closure_was_abandoned() {
            if self.rendezvous.wait().is_leader() {
                self.coordinator.abandon();
            }
            self.rendezvous.wait();
            CycleOutcome::Abandoned
        } else {
            collector.release();
            if self.rendezvous.wait().is_leader() {
                self.coordinator.release();
            }
            self.rendezvous.wait();
            CycleOutcome::Completed
        }
    }

    /// Run cycles until one commits, starting over after each abandonment.
    pub fn run_to_completion(&self, collector: &mut CollectorContext<R>) -> usize {
        let mut abandoned = 0;
        while self.run_cycle(collector) == CycleOutcome::Abandoned {
            abandoned += 1;
        }
        abandoned
    }
}
