//! The exported callable contract (spec §6): the handful of functions a
//! host embeds directly into its allocation fast paths and collection
//! triggers. Everything here is a thin dispatch over
//! [`crate::mmtk::Heap`], [`crate::mutator::Mutator`] and the `util::*`
//! components; no new policy lives in this file.

use crate::mmtk::Heap;
use crate::mutator::Mutator;
use crate::util::alloc::big_object::BigAllocError;
use crate::util::alloc::size_class::szclass;
use crate::util::constants::HEAP_ALIGNMENT;
use crate::util::finalizer::Finalizer;
use crate::util::mark::try_claim_and_push;
use crate::util::options::{CollectMode, SweepMode};
use crate::util::queue::MarkStack;
use crate::util::sweep::{sweep_all_pool_pages, sweep_big_objects};
use crate::util::{Address, ObjectReference};
use crate::vm::object_model::GcState;
use crate::vm::{ActivePlan, Collection, ObjectModel, RootsWorkFactory, Scanning, StackSlot, VMBinding};
use std::sync::atomic::Ordering;

/// `gc_init()`.
pub fn gc_init<VM: VMBinding>() -> Heap<VM> {
    Heap::new()
}

/// `gc_enable(bool)` / query.
pub fn gc_enable<VM: VMBinding>(heap: &Heap<VM>, enabled: bool) {
    heap.set_enabled(enabled);
}

pub fn gc_is_enabled<VM: VMBinding>(heap: &Heap<VM>) -> bool {
    heap.is_enabled()
}

/// `gc_pool_alloc(ptls, pool_offset, osize)`: allocate a tagged-value
/// slot of exactly `osize` bytes from the calling thread's pool for
/// that size class. Triggers a collection first if this thread's
/// allocation counter has crossed the interval (`maybe_collect`).
pub fn gc_pool_alloc<VM: VMBinding>(
    heap: &'static Heap<VM>,
    mutator: &mut Mutator<VM>,
    class: usize,
) -> Address {
    maybe_collect(heap, mutator);
    let osize = mutator.pool(class).osize();
    let addr = mutator.pool(class).alloc(&heap.pages);
    mutator.record_pool_alloc(osize);
    debug_assert!(addr.is_aligned_to(HEAP_ALIGNMENT));
    addr
}

/// `gc_big_alloc(ptls, sz)`.
pub fn gc_big_alloc<VM: VMBinding>(
    heap: &'static Heap<VM>,
    mutator: &mut Mutator<VM>,
    sz: usize,
) -> Result<Address, BigAllocError> {
    maybe_collect(heap, mutator);
    let addr = crate::util::alloc::big_alloc(&mutator.big_objects, sz)?;
    heap.callbacks.read().notify_alloc(sz);
    mutator.record_big_alloc(sz);
    Ok(addr)
}

/// `gc_alloc(ptls, sz, ty)`: dispatch to the pool allocator or the
/// big-object allocator depending on size class.
pub fn gc_alloc<VM: VMBinding>(
    heap: &'static Heap<VM>,
    mutator: &mut Mutator<VM>,
    sz: usize,
) -> Result<Address, BigAllocError> {
    match szclass(sz) {
        Some(class) => Ok(gc_pool_alloc(heap, mutator, class)),
        None => gc_big_alloc(heap, mutator, sz),
    }
}

/// `maybe_collect(ptls)`: either trigger a full collection or take a
/// (no-op, in this single-threaded-test harness) safepoint check.
fn maybe_collect<VM: VMBinding>(heap: &'static Heap<VM>, mutator: &mut Mutator<VM>) {
    if !heap.is_enabled() {
        return;
    }
    let interval = heap.driver.lock().collect_interval;
    if mutator.should_collect(interval) {
        gc_collect(heap, mutator, CollectMode::Auto);
    }
}

/// Resolve a walked stack slot to the object reference it holds
/// (dereferencing once more if `indirect`) and feed it into the mark
/// queue as a root.
fn push_stack_slot<VM: VMBinding>(queue: &mut MarkStack, slot: StackSlot) {
    let slot_addr = if slot.indirect {
        let indirection = unsafe { slot.addr.load::<Address>() };
        if indirection.is_zero() {
            return;
        }
        indirection
    } else {
        slot.addr
    };
    let obj = ObjectReference::from_raw_address(unsafe { slot_addr.load::<Address>() });
    try_claim_and_push::<VM>(queue, obj, false, false);
}

/// Adapts a [`MarkStack`] to [`RootsWorkFactory`] so `scan_vm_specific_roots`
/// can push straight into the mark queue.
struct RootPusher<'a> {
    queue: &'a mut MarkStack,
}

impl<'a, VM: VMBinding> RootsWorkFactory<VM> for RootPusher<'a> {
    fn push_root(&mut self, obj: ObjectReference) {
        try_claim_and_push::<VM>(self.queue, obj, false, false);
    }
}

/// `gc_collect(mode)`: the stop-the-world handshake plus a full
/// premark -> mark -> finalizer-discovery -> sweep cycle, driven
/// against every live mutator via `VM::ActivePlan`/`VM::Scanning`.
/// Returns `false` without running anything if the collector is
/// currently disabled (`gc_disable_counter > 0`) -- in that case the
/// calling thread's outstanding allocation is folded into
/// `stats.deferred_alloc` instead, to be folded back into `allocd` once
/// `gc_enable(true)` brings the counter back to zero.
pub fn gc_collect<VM: VMBinding>(heap: &'static Heap<VM>, mutator: &mut Mutator<VM>, mode: CollectMode) -> bool {
    if !heap.is_enabled() {
        let pending = mutator.take_allocd();
        heap.stats.deferred_alloc.fetch_add(pending, Ordering::Relaxed);
        return false;
    }

    let stats = &heap.stats;
    let tls = mutator.tls;
    crate::plan::collect::<VM>(tls, mode, move |force_full| {
        let start = std::time::Instant::now();
        heap.callbacks.read().run_pre_gc();
        let sweep_mode = if force_full { SweepMode::Full } else { SweepMode::Quick };

        // Premark + mark: enumerate every live mutator's thread roots
        // plus whatever VM-specific roots the binding supplies, then
        // drain the queue to closure.
        let mut queue = MarkStack::new();
        VM::ActivePlan::for_each_mutator(&mut |other_tls| {
            VM::Scanning::scan_thread_roots(other_tls, &mut |slot| push_stack_slot::<VM>(&mut queue, slot));
        });
        let mut factory = RootPusher { queue: &mut queue };
        VM::Scanning::scan_vm_specific_roots(&mut factory);
        crate::plan::driver::run_mark_loop::<VM>(&mut queue);

        // Finalizer discovery: clear unreachable weak refs, then split
        // this thread's finalizer list into survivors and the
        // to-finalize/promoted sets before sweep reclaims anything.
        let is_marked = |obj: ObjectReference| VM::ObjectModel::gc_state(obj).is_marked();
        mutator.weak_refs.clear_weak_refs(is_marked);
        heap.finalizers.sweep_finalizer_list(
            &mutator.finalizers,
            |obj| !is_marked(obj),
            |obj| VM::ObjectModel::gc_state(obj) == GcState::OldMarked,
            true,
        );

        // Sweep: reclaim dead pool cells and big objects. Page ownership
        // routing across several mutators isn't wired here -- only the
        // calling mutator's own pools are reconciled with their swept
        // pages' reclaimed free-lists.
        let to_object = |addr: Address| ObjectReference::from_raw_address(addr);
        sweep_all_pool_pages::<VM>(&heap.pages, sweep_mode, stats, to_object, |page, freelist| {
            if !freelist.is_zero() {
                let class = page.pool_index.load(Ordering::Relaxed) as usize;
                mutator.pool(class).reset_page(page, freelist);
            }
        });
        sweep_big_objects::<VM>(
            &mutator.big_objects,
            &heap.big_objects_marked,
            stats,
            sweep_mode,
            to_object,
            |_obj| {},
        );

        heap.finalizers.run_finalizers(|entry| {
            if let Finalizer::Native(f) = entry.finalizer.clone() {
                f(entry.obj);
            }
        });

        heap.callbacks.read().run_post_gc();
        stats.record_pause(start.elapsed(), force_full);
        crate::plan::CollectionResult {
            recollect: false,
            next_mode: sweep_mode,
        }
    })
}

/// `gc_wb_back`: the write barrier, named after the common "object ->
/// field now points backward into an older generation" trigger.
pub fn gc_wb_back<VM: VMBinding>(mutator: &mut Mutator<VM>, parent: ObjectReference, child: ObjectReference) {
    crate::util::barrier::write_barrier::<VM>(&mut mutator.barrier, parent, child);
}

/// `gc_new_weakref(v)`.
pub fn gc_new_weakref<VM: VMBinding>(mutator: &mut Mutator<VM>, target: ObjectReference) -> usize {
    mutator.weak_refs.new_weakref(target)
}

/// `gc_add_finalizer(obj, fn)`.
pub fn gc_add_finalizer<VM: VMBinding>(
    mutator: &mut Mutator<VM>,
    obj: ObjectReference,
    finalizer: crate::util::finalizer::Finalizer,
) {
    mutator.finalizers.register(obj, finalizer);
}

/// `gc_get_total_bytes` / `gc_live_bytes`.
pub fn gc_get_total_bytes<VM: VMBinding>(heap: &Heap<VM>) -> u64 {
    heap.stats.snapshot().total_allocd
}

pub fn gc_live_bytes<VM: VMBinding>(heap: &Heap<VM>) -> usize {
    heap.live_bytes()
}

/// `gc_diff_total_bytes`: bytes allocated since a previously captured
/// `gc_get_total_bytes` reading.
pub fn gc_diff_total_bytes<VM: VMBinding>(heap: &Heap<VM>, since: u64) -> u64 {
    gc_get_total_bytes(heap).saturating_sub(since)
}

/// `gc_num`: a snapshot of the global counters.
pub fn gc_num<VM: VMBinding>(heap: &Heap<VM>) -> crate::util::stats::GcNumSnapshot {
    heap.stats.snapshot()
}

/// `gc_set_max_memory`.
pub fn gc_set_max_memory<VM: VMBinding>(heap: &mut Heap<VM>, bytes: usize) {
    heap.options.max_total_memory = bytes;
}

/// `throw_out_of_memory` escape hatch used by allocation call sites
/// when the underlying allocator reports exhaustion.
pub fn out_of_memory<VM: VMBinding>(tls: VM::Ptls) -> ! {
    VM::Collection::throw_out_of_memory(tls)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::test_util::{MockTls, MockVM};

    fn leaked_heap() -> &'static Heap<MockVM> {
        Box::leak(Box::new(Heap::new()))
    }

    #[test]
    fn alloc_routes_small_to_pool_and_large_to_big() {
        let heap = leaked_heap();
        let mut mutator: Mutator<MockVM> = Mutator::new(MockTls(0));

        let small = gc_alloc(heap, &mut mutator, 24).unwrap();
        assert!(small.is_aligned_to(HEAP_ALIGNMENT));

        let big = gc_alloc(heap, &mut mutator, crate::util::alloc::size_class::GC_MAX_SZCLASS + 1).unwrap();
        assert!(big.is_aligned_to(crate::util::constants::CACHE_ALIGN));
    }

    #[test]
    fn gc_num_reflects_allocations() {
        let heap = leaked_heap();
        let mut mutator: Mutator<MockVM> = Mutator::new(MockTls(0));
        gc_alloc(heap, &mut mutator, 32).unwrap();
        // allocation counters are folded into gc_num by the driver, not
        // by gc_alloc directly; this only checks the entry point runs
        // without panicking in the single-mutator mock harness.
        let _ = gc_num(heap);
    }
}
