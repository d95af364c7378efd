use crate::plan::coordinator::CollectionCoordinator;
use crate::plan::tracer::Tracer;
use crate::runtime::Runtime;
use crate::util::ObjectReference;
use std::sync::Arc;

/// Per collector thread: a private copy cursor bound to a destination
/// region and the tracer that drives forwarding and queue draining.
pub struct CollectorContext<R: Runtime> {
    id: u32,
    tracer: Tracer<R>,
}

impl<R: Runtime> CollectorContext<R> {
    pub fn new(id: u32, coordinator: Arc<CollectionCoordinator<R>>) -> Self {
        coordinator.register_tracer();
        Self {
            id,
            tracer: Tracer::new(coordinator),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn tracer(&self) -> &Tracer<R> {
        &self.tracer
    }

    pub fn tracer_mut(&mut self) -> &mut Tracer<R> {
        &mut self.tracer
    }

    /// The per-thread portion of PREPARE: bind this cycle's copy
    /// destination.
    pub fn prepare(&mut self) {
        debug!("C{} prepare", self.id);
        self.tracer.prepare();
    }

    /// The concurrent tracing phase. Runs until the closure fixpoint, or
    /// until a fresh collection request supersedes this cycle.
    pub fn closure(&mut self) {
        debug!("C{} closure", self.id);
        self.tracer.complete_trace();
    }

    /// The per-thread portion of RELEASE.
    pub fn release(&mut self) {
        debug!("C{} release", self.id);
        self.tracer.release();
    }

    pub fn is_live(&self, object: ObjectReference) -> bool {
        self.tracer.is_live(object)
    }

    pub fn will_not_move_in_current_collection(&self, object: ObjectReference) -> bool {
        self.tracer.will_not_move_in_current_collection(object)
    }
}
