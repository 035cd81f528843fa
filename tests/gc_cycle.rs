//! End-to-end exercise of the public `memory_manager` surface against
//! the in-crate `MockVM`, compiled as a separate crate the way the
//! teacher's `tests/` integration suite is. Requires `test_private`
//! since that's what exposes `util::test_util` outside `#[cfg(test)]`.

#![cfg(feature = "test_private")]

use stopgc::memory_manager;
use stopgc::util::finalizer::Finalizer;
use stopgc::util::options::CollectMode;
use stopgc::util::test_util::{MockTls, MockVM};
use stopgc::vm::object_model::GcState;
use stopgc::vm::ObjectModel;
use stopgc::{Heap, Mutator, ObjectReference};

fn leaked_heap() -> &'static Heap<MockVM> {
    Box::leak(Box::new(Heap::new()))
}

#[test]
fn small_and_large_allocations_are_distinct_and_aligned() {
    let heap = leaked_heap();
    let mut mutator: Mutator<MockVM> = Mutator::new(MockTls(0));

    let mut small_addrs = std::collections::HashSet::new();
    for _ in 0..64 {
        let addr = memory_manager::gc_alloc(heap, &mut mutator, 16).unwrap();
        assert!(addr.is_aligned_to(stopgc::util::constants::HEAP_ALIGNMENT));
        assert!(small_addrs.insert(addr.as_usize()));
    }

    let big = memory_manager::gc_alloc(
        heap,
        &mut mutator,
        stopgc::util::alloc::size_class::GC_MAX_SZCLASS + 1,
    )
    .unwrap();
    assert!(big.is_aligned_to(stopgc::util::constants::CACHE_ALIGN));
}

#[test]
fn disabling_collection_is_observed_by_is_enabled() {
    let heap = leaked_heap();
    assert!(memory_manager::gc_is_enabled(heap));
    memory_manager::gc_enable(heap, false);
    assert!(!memory_manager::gc_is_enabled(heap));
    memory_manager::gc_enable(heap, true);
    assert!(memory_manager::gc_is_enabled(heap));
}

#[test]
fn weakref_and_finalizer_entry_points_round_trip() {
    let heap = leaked_heap();
    let mut mutator: Mutator<MockVM> = Mutator::new(MockTls(0));

    let cell = memory_manager::gc_alloc(heap, &mut mutator, 32).unwrap();
    let obj = ObjectReference::from_raw_address(cell);

    let handle = memory_manager::gc_new_weakref(&mut mutator, obj);
    assert_eq!(mutator.weak_refs.get(handle), obj);

    memory_manager::gc_add_finalizer(&mut mutator, obj, Finalizer::Native(|_| {}));
    assert_eq!(mutator.finalizers.len(), 1);
}

#[test]
fn write_barrier_enqueues_an_aging_parent() {
    let heap = leaked_heap();
    let mut mutator: Mutator<MockVM> = Mutator::new(MockTls(0));

    let parent = ObjectReference::from_raw_address(
        memory_manager::gc_alloc(heap, &mut mutator, 32).unwrap(),
    );
    let child = ObjectReference::from_raw_address(
        memory_manager::gc_alloc(heap, &mut mutator, 32).unwrap(),
    );

    <MockVM as stopgc::vm::VMBinding>::ObjectModel::store_state(parent, GcState::Old);
    memory_manager::gc_wb_back(&mut mutator, parent, child);
    assert_eq!(mutator.barrier.remset.current().len(), 1);
}

/// Spec scenario: allocate a batch of objects, hold no roots to them
/// (`MockVM`'s `Scanning`/`ActivePlan` never report any), then a full
/// collection should reclaim every one of them.
#[test]
fn full_collection_reclaims_unreachable_pool_allocations() {
    let heap = leaked_heap();
    let mut mutator: Mutator<MockVM> = Mutator::new(MockTls(0));

    const COUNT: usize = 10_000;
    const OBJ_SIZE: usize = 32;
    for _ in 0..COUNT {
        memory_manager::gc_alloc(heap, &mut mutator, OBJ_SIZE).unwrap();
    }

    let before = memory_manager::gc_num(heap);
    assert_eq!(before.freed, 0);

    memory_manager::gc_collect(heap, &mut mutator, CollectMode::Full);

    let after = memory_manager::gc_num(heap);
    assert!(after.freed >= (COUNT * OBJ_SIZE) as u64);
}
