//! `gc_num`: the global counters every thread's allocation and the
//! driver's sweep fold into. A snapshot is exposed through
//! [`crate::memory_manager::gc_num`].

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// Process-wide counters, updated under the stop-the-world window (so
/// plain atomics are enough; there is never a concurrent writer).
#[derive(Default)]
pub struct GcNum {
    /// Total bytes allocated since `gc_init`.
    pub total_allocd: AtomicU64,
    /// Bytes allocated since the last sweep; reset to zero after each
    /// collection, used by the `not_freed_enough` heuristic.
    pub allocd: AtomicU64,
    /// Bytes freed by the most recent sweep.
    pub freed: AtomicU64,
    /// Number of collections run so far.
    pub pause_count: AtomicUsize,
    /// Number of those that were full sweeps.
    pub full_pause_count: AtomicUsize,
    /// Longest stop-the-world pause observed, in nanoseconds.
    pub max_pause_ns: AtomicU64,
    /// Peak `live_bytes` observed after any sweep.
    pub max_memory: AtomicUsize,
    /// Bytes promoted from young to old by the most recent sweep.
    pub promoted_bytes: AtomicUsize,
    /// Bytes scanned directly out of the permanent arena (reset after a
    /// full sweep).
    pub perm_scanned_bytes: AtomicUsize,
    /// Worst observed time-to-safepoint, in nanoseconds.
    pub max_time_to_safepoint_ns: AtomicU64,
    /// Bytes a mutator tried to account for via `collect()` while the
    /// collector was disabled; folded back into `allocd` when the
    /// disable counter returns to zero.
    pub deferred_alloc: AtomicU64,
    #[cfg(feature = "work_packet_stats")]
    pub phases: PhaseStats,
}

/// Per-phase timing, gated behind `work_packet_stats` since recording a
/// `Duration` per phase on every collection has real (if small)
/// overhead mutators shouldn't pay by default.
#[cfg(feature = "work_packet_stats")]
#[derive(Default)]
pub struct PhaseStats {
    pub premark_ns: AtomicU64,
    pub mark_ns: AtomicU64,
    pub finalizer_ns: AtomicU64,
    pub sweep_ns: AtomicU64,
}

#[cfg(feature = "work_packet_stats")]
impl PhaseStats {
    pub fn record(&self, premark: Duration, mark: Duration, finalizer: Duration, sweep: Duration) {
        self.premark_ns.fetch_add(premark.as_nanos() as u64, Ordering::Relaxed);
        self.mark_ns.fetch_add(mark.as_nanos() as u64, Ordering::Relaxed);
        self.finalizer_ns.fetch_add(finalizer.as_nanos() as u64, Ordering::Relaxed);
        self.sweep_ns.fetch_add(sweep.as_nanos() as u64, Ordering::Relaxed);
    }
}

/// A point-in-time copy of [`GcNum`], returned by value so bindings can
/// inspect it without holding any lock.
#[derive(Copy, Clone, Debug, Default)]
pub struct GcNumSnapshot {
    pub total_allocd: u64,
    pub allocd: u64,
    pub freed: u64,
    pub pause_count: usize,
    pub full_pause_count: usize,
    pub max_pause: Duration,
    pub max_memory: usize,
    pub promoted_bytes: usize,
    pub perm_scanned_bytes: usize,
    pub max_time_to_safepoint: Duration,
}

impl GcNum {
    pub fn snapshot(&self) -> GcNumSnapshot {
        GcNumSnapshot {
            total_allocd: self.total_allocd.load(Ordering::Relaxed),
            allocd: self.allocd.load(Ordering::Relaxed),
            freed: self.freed.load(Ordering::Relaxed),
            pause_count: self.pause_count.load(Ordering::Relaxed),
            full_pause_count: self.full_pause_count.load(Ordering::Relaxed),
            max_pause: Duration::from_nanos(self.max_pause_ns.load(Ordering::Relaxed)),
            max_memory: self.max_memory.load(Ordering::Relaxed),
            promoted_bytes: self.promoted_bytes.load(Ordering::Relaxed),
            perm_scanned_bytes: self.perm_scanned_bytes.load(Ordering::Relaxed),
            max_time_to_safepoint: Duration::from_nanos(
                self.max_time_to_safepoint_ns.load(Ordering::Relaxed),
            ),
        }
    }

    pub fn record_alloc(&self, bytes: usize) {
        self.total_allocd.fetch_add(bytes as u64, Ordering::Relaxed);
        self.allocd.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_pause(&self, dur: Duration, full: bool) {
        self.pause_count.fetch_add(1, Ordering::Relaxed);
        if full {
            self.full_pause_count.fetch_add(1, Ordering::Relaxed);
        }
        self.max_pause_ns
            .fetch_max(dur.as_nanos() as u64, Ordering::Relaxed);
    }

    pub fn record_time_to_safepoint(&self, dur: Duration) {
        self.max_time_to_safepoint_ns
            .fetch_max(dur.as_nanos() as u64, Ordering::Relaxed);
    }

    pub fn print_report(&self) {
        let s = self.snapshot();
        println!("========================= GC Statistics =========================");
        println!("GC count:            {} ({} full)", s.pause_count, s.full_pause_count);
        println!("Total allocated:      {} bytes", s.total_allocd);
        println!("Freed (last sweep):   {} bytes", s.freed);
        println!("Max pause:            {:?}", s.max_pause);
        println!("Max time-to-safepoint {:?}", s.max_time_to_safepoint);
        println!("Max live memory:      {} bytes", s.max_memory);
        println!("===================================================================");
    }
}
