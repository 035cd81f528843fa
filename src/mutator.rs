//! Per-thread mutator state: one [`Mutator`] per live `Ptls`, owning
//! everything the spec describes as thread-local -- the per-class
//! pools, the big-object list, the write-barrier remset, the
//! weak-reference and finalizer lists, and this thread's allocation
//! counters. Only ever touched by its own thread except during
//! stop-the-world or under the finalizers lock (spec §5).

use crate::util::alloc::size_class::NUM_SIZE_CLASSES;
use crate::util::alloc::{BigObjectList, Pool};
use crate::util::barrier::BarrierState;
use crate::util::finalizer::FinalizerList;
use crate::util::weakref::WeakRefList;
use crate::vm::VMBinding;
use std::sync::atomic::{AtomicU64, Ordering};

pub struct Mutator<VM: VMBinding> {
    pub tls: VM::Ptls,
    pools: Vec<Pool<VM>>,
    pub big_objects: BigObjectList,
    pub barrier: BarrierState,
    pub weak_refs: WeakRefList,
    pub finalizers: FinalizerList,
    /// Bytes allocated by this thread since the last fold into `gc_num`.
    pub allocd: AtomicU64,
    /// Bytes allocated through pools specifically (as opposed to big
    /// objects), used by `maybe_collect`'s trigger check.
    pub poolalloc: AtomicU64,
}

impl<VM: VMBinding> Mutator<VM> {
    pub fn new(tls: VM::Ptls) -> Self {
        Mutator {
            tls,
            pools: (0..NUM_SIZE_CLASSES).map(Pool::new).collect(),
            big_objects: BigObjectList::new(),
            barrier: BarrierState::new(),
            weak_refs: WeakRefList::new(),
            finalizers: FinalizerList::new(),
            allocd: AtomicU64::new(0),
            poolalloc: AtomicU64::new(0),
        }
    }

    pub fn pool(&mut self, class: usize) -> &mut Pool<VM> {
        &mut self.pools[class]
    }

    pub fn record_pool_alloc(&self, bytes: usize) {
        self.allocd.fetch_add(bytes as u64, Ordering::Relaxed);
        self.poolalloc.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_big_alloc(&self, bytes: usize) {
        self.allocd.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// `maybe_collect` trigger check: this thread's local allocation
    /// counter has crossed the (shared) collect interval.
    pub fn should_collect(&self, collect_interval: usize) -> bool {
        self.allocd.load(Ordering::Relaxed) >= collect_interval as u64
    }

    pub fn take_allocd(&self) -> u64 {
        self.allocd.swap(0, Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::test_util::{MockTls, MockVM};

    #[test]
    fn fresh_mutator_has_one_pool_per_size_class() {
        let mut m: Mutator<MockVM> = Mutator::new(MockTls(0));
        assert_eq!(m.pool(0).class(), 0);
        assert_eq!(m.pool(NUM_SIZE_CLASSES - 1).class(), NUM_SIZE_CLASSES - 1);
    }

    #[test]
    fn should_collect_trips_at_interval() {
        let m: Mutator<MockVM> = Mutator::new(MockTls(0));
        m.record_pool_alloc(100);
        assert!(!m.should_collect(200));
        m.record_pool_alloc(100);
        assert!(m.should_collect(200));
    }
}
