//! The collection plan: the global phase machine, the per-thread mutator
//! and collector contexts, the tracer, and the write barrier joining them.

pub mod barriers;
pub mod collector;
pub mod controller;
pub mod coordinator;
pub mod mutator;
pub mod phase;
pub mod requester;
pub mod trace;
pub mod tracer;
pub mod tracing;

pub use self::collector::CollectorContext;
pub use self::controller::{CycleController, CycleOutcome};
pub use self::coordinator::CollectionCoordinator;
pub use self::mutator::MutatorContext;
pub use self::phase::Phase;
pub use self::tracer::Tracer;
