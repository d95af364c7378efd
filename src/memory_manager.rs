//! The entry points the runtime calls into the collector through. Thin by
//! design: each function forwards to the owning component, so embedders can
//! equally well hold the contexts and call them directly.

use crate::plan::collector::CollectorContext;
use crate::plan::controller::CycleController;
use crate::plan::mutator::MutatorContext;
use crate::regioncopy::RegionCopy;
use crate::runtime::{Runtime, Slot};
use crate::util::options::Options;
use crate::util::{Address, ObjectReference};

/// Build a collector instance from the given options. Initializes the
/// built-in logger if one is compiled in.
pub fn create<R: Runtime>(options: Options) -> RegionCopy<R> {
    // Initialize the logger before anything else; ignore the error if the
    // embedder installed its own.
    let _ = crate::util::logger::try_init();
    RegionCopy::new(options)
}

/// Set an option by its camelCase name, as command-line plumbing delivers
/// them. Returns false if the name or value was rejected.
pub fn process(options: &mut Options, name: &str, value: &str) -> bool {
    options.set_from_camelcase_str(name, value)
}

/// Create the context an application thread allocates and writes through.
pub fn bind_mutator<R: Runtime>(regioncopy: &RegionCopy<R>, id: u32) -> MutatorContext<R> {
    MutatorContext::new(id, regioncopy.coordinator().clone())
}

/// Create the context a collector thread traces through.
pub fn bind_collector<R: Runtime>(regioncopy: &RegionCopy<R>, id: u32) -> CollectorContext<R> {
    CollectorContext::new(id, regioncopy.coordinator().clone())
}

/// Create one collector context per configured collector thread.
pub fn bind_collectors<R: Runtime>(regioncopy: &RegionCopy<R>) -> Vec<CollectorContext<R>> {
    (0..regioncopy.options().threads as u32)
        .map(|id| bind_collector(regioncopy, id))
        .collect()
}

/// Create the rendezvous the collector threads run cycles through.
pub fn create_controller<R: Runtime>(
    regioncopy: &RegionCopy<R>,
    collectors: usize,
) -> CycleController<R> {
    CycleController::new(regioncopy.coordinator().clone(), collectors)
}

/// Allocate `bytes` for a new object. A zero return means the request is
/// unsatisfiable and must surface as the language's out-of-memory error.
pub fn alloc<R: Runtime>(mutator: &mut MutatorContext<R>, bytes: usize, align: usize) -> Address {
    mutator.alloc(bytes, align)
}

/// Store `target` into `slot` of `src` through the write barrier.
pub fn object_reference_write<R: Runtime>(
    mutator: &mut MutatorContext<R>,
    src: ObjectReference,
    slot: Slot,
    target: ObjectReference,
) {
    mutator.object_reference_write(src, slot, target);
}

/// Ask for a collection, e.g. on behalf of an explicit language-level
/// request. A request landing mid-closure abandons the in-flight cycle in
/// favour of a fresh one.
pub fn request_collection<R: Runtime>(regioncopy: &RegionCopy<R>) {
    regioncopy.coordinator().request_collection();
}

pub fn pages_used<R: Runtime>(regioncopy: &RegionCopy<R>) -> usize {
    regioncopy.coordinator().pages_used()
}

pub fn collection_reserve<R: Runtime>(regioncopy: &RegionCopy<R>) -> usize {
    regioncopy.coordinator().collection_reserve()
}

pub fn pages_available<R: Runtime>(regioncopy: &RegionCopy<R>) -> usize {
    regioncopy.coordinator().pages_available()
}

/// True when no collection will ever move the object.
pub fn will_never_move<R: Runtime>(regioncopy: &RegionCopy<R>, object: ObjectReference) -> bool {
    regioncopy.coordinator().will_never_move(object)
}
