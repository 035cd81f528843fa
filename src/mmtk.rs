//! [`Heap`]: the process-scope singleton aggregating every piece of
//! global, cross-thread collector state -- the page allocator and its
//! table, the permanent arena, global counters, the finalizer and
//! big-object-marked lists, and the options snapshot. Mutators reach it
//! through whatever thread-local handle the binding's `Ptls` carries;
//! the collector never reaches for a global singleton of its own (spec
//! §9, "Global mutable state").

use crate::plan::DriverState;
use crate::util::alloc::{BigObjectList, PermArena};
use crate::util::finalizer::FinalizerState;
use crate::util::heap::PageAllocator;
use crate::util::options::Options;
use crate::util::stats::GcNum;
use crate::vm::VMBinding;

/// Callback lists the host can register into: `pre_gc`/`post_gc` run
/// around each collection, `notify_external_alloc`/`notify_external_free`
/// fire on every big-object allocation/free.
#[derive(Default)]
pub struct Callbacks {
    pub pre_gc: Vec<fn()>,
    pub post_gc: Vec<fn()>,
    pub notify_external_alloc: Vec<fn(usize)>,
    pub notify_external_free: Vec<fn(usize)>,
}

impl Callbacks {
    pub fn run_pre_gc(&self) {
        for f in &self.pre_gc {
            f();
        }
    }

    pub fn run_post_gc(&self) {
        for f in &self.post_gc {
            f();
        }
    }

    pub fn notify_alloc(&self, bytes: usize) {
        for f in &self.notify_external_alloc {
            f(bytes);
        }
    }

    pub fn notify_free(&self, bytes: usize) {
        for f in &self.notify_external_free {
            f(bytes);
        }
    }
}

/// The collector's global, process-lifetime state. One instance is
/// created by [`Heap::new`] (the spec's `gc_init`) and lives for the
/// remainder of the process.
pub struct Heap<VM: VMBinding> {
    pub pages: PageAllocator<VM>,
    pub perm: PermArena,
    pub big_objects_marked: BigObjectList,
    pub finalizers: FinalizerState,
    pub stats: GcNum,
    pub options: Options,
    pub driver: spin::Mutex<DriverState>,
    pub callbacks: spin::RwLock<Callbacks>,
    gc_disable_counter: std::sync::atomic::AtomicUsize,
}

impl<VM: VMBinding> Heap<VM> {
    /// `gc_init()`: build a fresh heap with options read from the
    /// environment. There is no global instance -- the binding owns
    /// this (typically behind its own `OnceLock`/`lazy_static`) and
    /// passes it to every allocation and collection entry point.
    pub fn new() -> Self {
        crate::util::logger::try_init();
        let options = Options::from_env();
        let driver = DriverState::new(options.collect_interval);
        Heap {
            pages: PageAllocator::new(),
            perm: PermArena::new(),
            big_objects_marked: BigObjectList::new(),
            finalizers: FinalizerState::new(),
            stats: GcNum::default(),
            options,
            driver: spin::Mutex::new(driver),
            callbacks: spin::RwLock::new(Callbacks::default()),
            gc_disable_counter: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// `gc_enable(bool)`: increment/decrement the disable counter. While
    /// it is above zero, `gc_collect` defers a caller's allocation into
    /// `stats.deferred_alloc` instead of running a cycle. Mirrors
    /// `FinalizerState::enable`'s guarded nesting counter: `enabled` only
    /// decrements, and going below zero is logged and ignored rather
    /// than wrapping the counter. When the counter returns to zero,
    /// whatever was deposited in `deferred_alloc` is folded back into
    /// `allocd` so the next cycle accounts for it.
    pub fn set_enabled(&self, enabled: bool) {
        use std::sync::atomic::Ordering;
        if !enabled {
            self.gc_disable_counter.fetch_add(1, Ordering::Relaxed);
            return;
        }
        let prev = self.gc_disable_counter.load(Ordering::Relaxed);
        if prev == 0 {
            log::warn!("gc_enable/gc_disable count went negative");
            return;
        }
        let now = self.gc_disable_counter.fetch_sub(1, Ordering::Relaxed) - 1;
        if now == 0 {
            let deferred = self.stats.deferred_alloc.swap(0, Ordering::Relaxed);
            if deferred > 0 {
                self.stats.allocd.fetch_add(deferred, Ordering::Relaxed);
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.gc_disable_counter.load(std::sync::atomic::Ordering::Relaxed) == 0
    }

    pub fn live_bytes(&self) -> usize {
        let snapshot = self.stats.snapshot();
        (snapshot.total_allocd.saturating_sub(
            self.stats
                .freed
                .load(std::sync::atomic::Ordering::Relaxed),
        )) as usize
    }
}

impl<VM: VMBinding> Default for Heap<VM> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::test_util::MockVM;

    #[test]
    fn new_heap_starts_enabled() {
        let heap: Heap<MockVM> = Heap::new();
        assert!(heap.is_enabled());
    }

    #[test]
    fn disable_enable_is_balanced() {
        let heap: Heap<MockVM> = Heap::new();
        heap.set_enabled(false);
        assert!(!heap.is_enabled());
        heap.set_enabled(true);
        assert!(heap.is_enabled());
    }

    #[test]
    fn redundant_enable_does_not_wrap_the_counter() {
        let heap: Heap<MockVM> = Heap::new();
        assert!(heap.is_enabled());
        heap.set_enabled(true);
        heap.set_enabled(true);
        assert!(heap.is_enabled());
        heap.set_enabled(false);
        assert!(!heap.is_enabled());
        heap.set_enabled(true);
        assert!(heap.is_enabled());
    }

    #[test]
    fn re_enabling_folds_deferred_alloc_back_into_allocd() {
        use std::sync::atomic::Ordering;
        let heap: Heap<MockVM> = Heap::new();
        heap.set_enabled(false);
        heap.stats.deferred_alloc.store(128, Ordering::Relaxed);
        heap.set_enabled(true);
        assert_eq!(heap.stats.deferred_alloc.load(Ordering::Relaxed), 0);
        assert_eq!(heap.stats.allocd.load(Ordering::Relaxed), 128);
    }
}
