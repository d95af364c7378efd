use super::fixture;
use crate::memory_manager;
use crate::plan::collector::CollectorContext;
use crate::plan::controller::{CycleController, CycleOutcome};
use crate::runtime::mock::*;
use crate::runtime::Slot;
use crate::util::forwarding;
use crate::util::test_util::{panic_after, serial_test};
use crate::util::ObjectReference;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;
use std::sync::Arc;

const OBJECTS_PER_MUTATOR: usize = 300;
const ROOT_SAMPLE: usize = 40;
const GARBAGE_PER_ROUND: usize = 50;
const ROUNDS: usize = 3;

/// The reachable graph as seen from the roots: tag -> child tags in field
/// order, 0 for null.
fn snapshot(roots: &[Slot]) -> BTreeMap<usize, Vec<usize>> {
    let mut map = BTreeMap::new();
    let mut stack: Vec<ObjectReference> = roots
        .iter()
        .map(|slot| slot.load())
        .filter(|object| !object.is_null())
        .collect();
    while let Some(object) = stack.pop() {
        assert!(
            !forwarding::is_forwarded(object),
            "reached a stale, forwarded copy of tag {}",
            tag(object)
        );
        if map.contains_key(&tag(object)) {
            continue;
        }
        let mut children = Vec::new();
        for i in 0..field_count(object) {
            let child = get_field(object, i);
            if child.is_null() {
                children.push(0);
            } else {
                children.push(tag(child));
                stack.push(child);
            }
        }
        map.insert(tag(object), children);
    }
    map
}

fn run_parallel_cycle(
    controller: &Arc<CycleController<MockRuntime>>,
    collectors: Vec<CollectorContext<MockRuntime>>,
) -> (CycleOutcome, Vec<CollectorContext<MockRuntime>>) {
    let handles: Vec<_> = collectors
        .into_iter()
        .map(|mut collector| {
            let controller = controller.clone();
            std::thread::spawn(move || {
                let outcome = controller.run_cycle(&mut collector);
                (outcome, collector)
            })
        })
        .collect();
    let mut outcome = CycleOutcome::Completed;
    let mut collectors = Vec::new();
    for handle in handles {
        let (o, collector) = handle.join().unwrap();
        outcome = o;
        collectors.push(collector);
    }
    (outcome, collectors)
}

/// A seeded random object graph survives several full cycles, bit for bit,
/// with two mutators and two parallel collectors rotating the regions.
#[test]
fn random_graph_survives_repeated_cycles() {
    serial_test(|| {
        clear_roots();
        let mut rng = ChaCha8Rng::seed_from_u64(0x5eed);
        let rc = Arc::new(fixture::heap(16, 2));

        // two mutators allocate the population
        let threads: Vec<_> = (0..2u32)
            .map(|id| {
                let rc = rc.clone();
                std::thread::spawn(move || {
                    let mut mutator = memory_manager::bind_mutator(&rc, id);
                    let mut rng = ChaCha8Rng::seed_from_u64(id as u64);
                    let objects: Vec<_> = (0..OBJECTS_PER_MUTATOR)
                        .map(|_| {
                            let object = alloc_object(&mut mutator, rng.random_range(0..4));
                            assert!(!object.is_null());
                            object
                        })
                        .collect();
                    (mutator, objects)
                })
            })
            .collect();
        let mut mutators = Vec::new();
        let mut objects = Vec::new();
        for thread in threads {
            let (mutator, mut batch) = thread.join().unwrap();
            mutators.push(mutator);
            objects.append(&mut batch);
        }
        for (i, &object) in objects.iter().enumerate() {
            set_tag(object, i + 1);
        }

        // random edges across the whole population
        for &holder in &objects {
            for i in 0..field_count(holder) {
                let target = objects[rng.random_range(0..objects.len())];
                mutators[0].object_reference_write(holder, field_slot(holder, i), target);
            }
        }

        // a random sample of roots
        let roots: Vec<Slot> = (0..ROOT_SAMPLE)
            .map(|_| register_root_cell(objects[rng.random_range(0..objects.len())]))
            .collect();
        let expected = snapshot(&roots);
        assert!(!expected.is_empty());

        let controller = Arc::new(memory_manager::create_controller(&rc, rc.options().threads));
        let mut collectors = memory_manager::bind_collectors(&rc);
        assert_eq!(collectors.len(), 2);

        for round in 0..ROUNDS {
            // churn: short-lived allocations that die before the cycle
            for mutator in &mut mutators {
                for _ in 0..GARBAGE_PER_ROUND {
                    assert!(!alloc_object(mutator, 1).is_null());
                }
            }
            for mutator in &mut mutators {
                mutator.flush();
            }
            rc.coordinator().request_collection();

            let (outcome, survivors) = panic_after(120_000, {
                let controller = controller.clone();
                move || run_parallel_cycle(&controller, collectors)
            });
            collectors = survivors;
            assert_eq!(outcome, CycleOutcome::Completed, "round {}", round);

            let observed = snapshot(&roots);
            assert_eq!(observed, expected, "graph changed in round {}", round);

            for mutator in &mut mutators {
                mutator.release();
            }
        }
    })
}
