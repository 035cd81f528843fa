use criterion::Criterion;

use stopgc::memory_manager;
use stopgc::util::test_util::{MockTls, MockVM};
use stopgc::{Heap, Mutator};

pub fn bench(c: &mut Criterion) {
    let heap: &'static Heap<MockVM> = Box::leak(Box::new(Heap::new()));
    memory_manager::gc_enable(heap, false);
    let mut mutator: Mutator<MockVM> = Mutator::new(MockTls(0));

    c.bench_function("pool_alloc_small", |b| {
        b.iter(|| memory_manager::gc_alloc(heap, &mut mutator, 16).unwrap())
    });

    c.bench_function("big_alloc", |b| {
        b.iter(|| {
            memory_manager::gc_alloc(
                heap,
                &mut mutator,
                stopgc::util::alloc::size_class::GC_MAX_SZCLASS + 64,
            )
            .unwrap()
        })
    });
}
