use super::fixture;
use crate::memory_manager;
use crate::runtime::mock::*;
use crate::util::test_util::serial_test;

/// A mutator reaching the release edge with buffered remembered-set
/// entries means a handshake was skipped; continuing would lose updates.
#[test]
#[should_panic(expected = "unflushed remembered sets")]
fn unflushed_mutator_at_release_aborts() {
    serial_test(|| {
        clear_roots();
        let rc = fixture::small_heap(5);
        let coordinator = rc.coordinator().clone();

        let mut mutator = memory_manager::bind_mutator(&rc, 0);
        let target = alloc_object(&mut mutator, 1);
        let cell = register_root_cell(crate::util::ObjectReference::NULL);

        coordinator.prepare();
        mutator.prepare();
        coordinator.begin_closure();
        // a recorded entry that never gets flushed
        mutator.object_reference_write(crate::util::ObjectReference::NULL, cell, target);
        mutator.release();
    })
}

/// Bulk transfers are an unfinished part of this barrier configuration,
/// distinct from a runtime invariant violation.
#[test]
#[should_panic(expected = "not supported")]
fn bulk_reference_copy_is_not_supported() {
    serial_test(|| {
        clear_roots();
        let rc = fixture::small_heap(5);
        let mut mutator = memory_manager::bind_mutator(&rc, 0);
        let src = alloc_object(&mut mutator, 2);
        let dst = alloc_object(&mut mutator, 2);
        mutator.object_reference_bulk_copy(src, dst, 16);
    })
}

#[test]
#[should_panic(expected = "not supported")]
fn reference_read_barrier_is_not_supported() {
    serial_test(|| {
        clear_roots();
        let rc = fixture::small_heap(5);
        let mut mutator = memory_manager::bind_mutator(&rc, 0);
        let object = alloc_object(&mut mutator, 1);
        mutator.reference_read_barrier(object);
    })
}

/// An undrained shared pool at the global release is a broken fixpoint.
#[test]
#[should_panic(expected = "release with undrained work")]
fn undrained_pool_at_release_aborts() {
    serial_test(|| {
        clear_roots();
        let rc = fixture::small_heap(5);
        let coordinator = rc.coordinator().clone();

        let mut mutator = memory_manager::bind_mutator(&rc, 0);
        let target = alloc_object(&mut mutator, 1);
        let cell = register_root_cell(crate::util::ObjectReference::NULL);

        coordinator.prepare();
        mutator.prepare();
        coordinator.begin_closure();
        mutator.object_reference_write(crate::util::ObjectReference::NULL, cell, target);
        mutator.flush(); // entries reach the pool but nobody drains them
        coordinator.seal_closure();
        coordinator.release();
    })
}
