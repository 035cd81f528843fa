//! Collector driver and stop-the-world orchestration (component K).
//!
//! This is the one place that sequences every other component: the
//! safepoint handshake, premark, the mark loop, finalizer discovery,
//! sweep, and the heuristics that decide the next cycle's mode and
//! interval. Everything it calls is otherwise unaware of "a collection
//! is happening" -- it just gets driven.

use crate::util::constants::{DEFAULT_COLLECT_INTERVAL, NOT_FREED_ENOUGH_THRESHOLD_PERCENT};
use crate::util::mark::drain_mark_queue;
use crate::util::options::{CollectMode, SweepMode};
use crate::util::queue::MarkStack;
use crate::vm::{ActivePlan, Collection, SafepointState, VMBinding};
use std::time::Instant;

/// Outcome of one inner collection pass, consumed by [`collect`] to
/// decide whether to immediately run a second AUTO pass (the "FULL
/// requested a recollect" case from spec §4.K step 6).
pub struct CollectionResult {
    pub recollect: bool,
    pub next_mode: SweepMode,
}

/// Heuristic state carried across cycles, owned by the embedding
/// `GlobalHeap` alongside `Options` and `GcNum`.
pub struct DriverState {
    pub collect_interval: usize,
    pub force_full_next: bool,
}

impl DriverState {
    pub fn new(initial_interval: usize) -> Self {
        DriverState {
            collect_interval: initial_interval,
            force_full_next: false,
        }
    }

    /// Apply the AUTO-mode heuristics (spec §4.K "Heuristics") given
    /// this cycle's outcome, updating `collect_interval` and deciding
    /// whether the *next* cycle should be a full sweep.
    pub fn update_after_sweep(
        &mut self,
        allocd: u64,
        freed: u64,
        intergen_ptr_bytes: usize,
        live_bytes: usize,
        max_collect_interval: usize,
        max_total_memory: usize,
    ) {
        let not_freed_enough = allocd > 0
            && (freed * 100) < (allocd * NOT_FREED_ENOUGH_THRESHOLD_PERCENT as u64);
        if not_freed_enough {
            self.collect_interval = self.collect_interval.saturating_mul(2);
        }

        let large_frontier = intergen_ptr_bytes >= DEFAULT_COLLECT_INTERVAL;
        self.force_full_next = large_frontier;

        if self.collect_interval > max_collect_interval {
            self.collect_interval = max_collect_interval;
            self.force_full_next = true;
        }

        if live_bytes > max_total_memory {
            self.force_full_next = true;
            self.collect_interval = DEFAULT_COLLECT_INTERVAL.min(max_collect_interval);
        }

        let target = self
            .collect_interval
            .clamp(DEFAULT_COLLECT_INTERVAL, (live_bytes / 2).max(DEFAULT_COLLECT_INTERVAL));
        self.collect_interval = if max_total_memory > live_bytes {
            target.min(max_total_memory - live_bytes)
        } else {
            target
        };
    }
}

/// Outer `collect(mode)` entry point. Runs the full stop-the-world
/// handshake: claim the collector role, wait for every mutator to park,
/// run the inner collection, and release the world. Returns `false`
/// without doing anything if another thread is already collecting, or
/// if `gc_disable_counter` (tracked by the caller) is nonzero -- in
/// that case the caller is responsible for depositing this thread's
/// allocation into `deferred_alloc` before calling.
pub fn collect<VM: VMBinding>(
    tls: VM::Ptls,
    mode: CollectMode,
    mut inner: impl FnMut(bool) -> CollectionResult,
) -> bool {
    if !VM::Collection::safepoint_start_gc() {
        return false;
    }

    let prior_state = VM::Collection::get_gc_state(tls);
    VM::Collection::set_gc_state(tls, SafepointState::Waiting);

    let wait_start = Instant::now();
    let time_to_safepoint = VM::Collection::block_for_safepoint();
    let _ = wait_start;

    let force_full = matches!(mode, CollectMode::Full);
    let mut result = inner(force_full);
    if result.recollect {
        result = inner(false);
    }

    VM::Collection::set_gc_state(tls, prior_state);
    VM::Collection::safepoint_end_gc();

    let _ = time_to_safepoint;
    true
}

/// `combine_thread_gc_counts`: fold every mutator's local counters into
/// the global `gc_num` before premark. Takes a closure per-thread so
/// the caller supplies whatever thread-local counter type it uses.
pub fn combine_thread_gc_counts<VM: VMBinding>(mut fold_one: impl FnMut(VM::Ptls)) {
    VM::ActivePlan::for_each_mutator(&mut fold_one);
}

/// Run the mark loop to exhaustion starting from whatever roots have
/// already been pushed onto `queue`.
pub fn run_mark_loop<VM: VMBinding>(queue: &mut MarkStack) {
    drain_mark_queue::<VM>(queue);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_freed_enough_doubles_interval() {
        let mut state = DriverState::new(DEFAULT_COLLECT_INTERVAL);
        state.update_after_sweep(1000, 100, 0, 1000, usize::MAX, usize::MAX);
        assert_eq!(state.collect_interval, DEFAULT_COLLECT_INTERVAL * 2);
    }

    #[test]
    fn freed_enough_keeps_interval_stable() {
        let mut state = DriverState::new(DEFAULT_COLLECT_INTERVAL);
        state.update_after_sweep(1000, 900, 0, 1000, usize::MAX, usize::MAX);
        assert_eq!(state.collect_interval, DEFAULT_COLLECT_INTERVAL);
    }

    #[test]
    fn exceeding_max_total_memory_forces_full() {
        let mut state = DriverState::new(DEFAULT_COLLECT_INTERVAL);
        state.update_after_sweep(0, 0, 0, 1_000_000, usize::MAX, 500_000);
        assert!(state.force_full_next);
    }
}
