use crate::memory_manager;
use crate::policy::external::ExternalSpace;
use crate::policy::state::RegionState;
use crate::runtime::mock::*;
use crate::util::options::Options;
use crate::util::test_util::serial_test;
use crate::RegionCopy;
use std::sync::Arc;

fn heap_with_immortal() -> (RegionCopy<MockRuntime>, Arc<MockImmortalSpace>) {
    let immortal = Arc::new(MockImmortalSpace::new(64 * 1024));
    let mut options = Options::default();
    options.regions = 5;
    options.region_pages = 1;
    options.threads = 1;
    let rc = RegionCopy::with_externals(
        options,
        vec![immortal.clone() as Arc<dyn ExternalSpace>],
    );
    (rc, immortal)
}

/// Objects owned by a non-moving collaborator are never copied, but their
/// fields still pull region objects into the trace.
#[test]
fn external_objects_delegate_and_stay_put() {
    serial_test(|| {
        clear_roots();
        let (rc, immortal) = heap_with_immortal();
        let coordinator = rc.coordinator().clone();
        let directory = coordinator.directory().clone();

        let mut mutator = memory_manager::bind_mutator(&rc, 0);
        // immortal -> heap edge
        let pinned = immortal.alloc_object(1);
        let movable = alloc_object(&mut mutator, 1);
        field_slot(pinned, 0).store(movable);
        register_root_cell(pinned);

        assert!(memory_manager::will_never_move(&rc, pinned));
        assert!(!memory_manager::will_never_move(&rc, movable));

        mutator.flush();
        let mut collector = memory_manager::bind_collector(&rc, 0);
        coordinator.prepare();
        mutator.prepare();
        collector.prepare();
        coordinator.begin_closure();
        collector.closure();
        coordinator.seal_closure();

        // liveness is the owner's call
        assert!(collector.is_live(pinned));
        let moved = resolve(movable);
        assert_ne!(moved, movable);
        assert!(collector.is_live(movable));

        collector.release();
        coordinator.release();
        mutator.release();

        // the pinned object stayed, its field was re-validated
        assert_eq!(resolve(pinned), pinned);
        assert_eq!(get_field(pinned, 0), moved);
        assert_eq!(
            directory.state(directory.region_of_object(moved).unwrap()),
            RegionState::To
        );
    })
}

/// A null handle is a sentinel for the whole query surface, never an error.
#[test]
fn null_is_passed_through() {
    serial_test(|| {
        clear_roots();
        let (rc, _immortal) = heap_with_immortal();
        let coordinator = rc.coordinator().clone();

        let mut collector = memory_manager::bind_collector(&rc, 0);
        coordinator.prepare();
        collector.prepare();
        coordinator.begin_closure();

        let null = crate::util::ObjectReference::NULL;
        assert_eq!(collector.tracer_mut().trace_object(null), null);
        assert!(!collector.is_live(null));
        assert!(!collector.will_not_move_in_current_collection(null));
    })
}
