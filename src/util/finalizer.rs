//! Finalizer subsystem (component I).
//!
//! Each thread owns a list of `(obj, finalizer)` pairs. A global
//! `finalizer_list_marked` holds pairs promoted across past
//! collections; `to_finalize` holds pairs scheduled to run on the next
//! drain. Registration is lock-free in the steady state: growth takes
//! the finalizers lock, and a steady-state push publishes the new
//! length with a release store so `finalize(obj)` callers on other
//! threads can observe committed entries without locking.

use crate::util::ObjectReference;
use spin::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A finalizer callback. The spec's ABI trick of stealing the object
/// pointer's low bit to distinguish native-C from managed finalizers is
/// replaced here with an explicit sum type (spec §9, "Finalizer pair
/// encoding").
#[derive(Clone)]
pub enum Finalizer {
    Native(fn(ObjectReference)),
    Managed(ObjectReference),
}

pub struct FinalizerEntry {
    pub obj: ObjectReference,
    pub finalizer: Finalizer,
}

/// Per-thread finalizer list. `len` is published separately from the
/// backing vector's own length so a racing reader can snapshot "how
/// many entries are safe to read" with acquire/release instead of a
/// lock.
pub struct FinalizerList {
    entries: Mutex<Vec<FinalizerEntry>>,
    published_len: AtomicUsize,
}

impl FinalizerList {
    pub fn new() -> Self {
        FinalizerList {
            entries: Mutex::new(Vec::new()),
            published_len: AtomicUsize::new(0),
        }
    }

    /// `register(obj, fn)`: append a pair. Growth past capacity takes
    /// the lock for the whole push; a steady-state push only needs the
    /// lock to serialize other registerers, but the published length is
    /// bumped with `Release` so readers following the acquire/release
    /// discipline see a fully-initialized entry.
    pub fn register(&self, obj: ObjectReference, finalizer: Finalizer) {
        let mut guard = self.entries.lock();
        guard.push(FinalizerEntry { obj, finalizer });
        self.published_len.store(guard.len(), Ordering::Release);
    }

    /// Snapshot of the entries safe to read without holding the lock:
    /// an acquire load of `published_len` followed by reading that many
    /// entries out of a lock-held copy. Used by `finalize(obj)` cross-
    /// thread lookups.
    pub fn snapshot(&self) -> Vec<FinalizerEntry>
    where
        FinalizerEntry: Clone,
    {
        let len = self.published_len.load(Ordering::Acquire);
        let guard = self.entries.lock();
        guard[..len.min(guard.len())].to_vec()
    }

    pub fn retain_and_split(
        &self,
        mut keep: impl FnMut(&FinalizerEntry) -> bool,
    ) -> Vec<FinalizerEntry> {
        let mut guard = self.entries.lock();
        let mut removed = Vec::new();
        let mut i = 0;
        while i < guard.len() {
            if keep(&guard[i]) {
                i += 1;
            } else {
                removed.push(guard.remove(i));
            }
        }
        self.published_len.store(guard.len(), Ordering::Release);
        removed
    }

    pub fn extend(&self, entries: Vec<FinalizerEntry>) {
        let mut guard = self.entries.lock();
        guard.extend(entries);
        self.published_len.store(guard.len(), Ordering::Release);
    }

    pub fn len(&self) -> usize {
        self.published_len.load(Ordering::Acquire)
    }
}

impl Clone for FinalizerEntry {
    fn clone(&self) -> Self {
        FinalizerEntry {
            obj: self.obj,
            finalizer: self.finalizer.clone(),
        }
    }
}

impl Default for FinalizerList {
    fn default() -> Self {
        Self::new()
    }
}

/// Global state shared by the finalizer subsystem: the marked-pair
/// carryover list, the run queue, the "pending" flag, and the
/// inhibit-nesting counter. Protected by one `finalizers_lock` guarding
/// `marked` and `to_finalize`; `inhibited`/`pending` are independent
/// atomics per spec §5.
pub struct FinalizerState {
    pub marked: Mutex<Vec<FinalizerEntry>>,
    pub to_finalize: Mutex<Vec<FinalizerEntry>>,
    pub pending: std::sync::atomic::AtomicBool,
    pub inhibited: AtomicUsize,
}

impl FinalizerState {
    pub fn new() -> Self {
        FinalizerState {
            marked: Mutex::new(Vec::new()),
            to_finalize: Mutex::new(Vec::new()),
            pending: std::sync::atomic::AtomicBool::new(false),
            inhibited: AtomicUsize::new(0),
        }
    }

    /// `sweep_finalizer_list`: split `list` into survivors (kept in
    /// place), unreachable pairs (moved to `to_finalize`, scheduling a
    /// run), and, if `per_thread` and both the object and its finalizer
    /// are old-marked, pairs promoted into the global `marked` list.
    pub fn sweep_finalizer_list(
        &self,
        list: &FinalizerList,
        is_unmarked: impl Fn(ObjectReference) -> bool,
        is_old_marked: impl Fn(ObjectReference) -> bool,
        per_thread: bool,
    ) {
        let mut promoted = vec![];
        let removed = list.retain_and_split(|entry| {
            if is_unmarked(entry.obj) {
                return false; // removed -> goes to to_finalize
            }
            if per_thread && is_old_marked(entry.obj) {
                if let Finalizer::Managed(f) = entry.finalizer {
                    if is_old_marked(f) {
                        promoted.push(entry.clone());
                        return false; // removed -> moved to `marked`
                    }
                }
            }
            true // keep on the per-thread list
        });

        let mut to_schedule = vec![];
        for entry in removed {
            if promoted.iter().any(|p| p.obj == entry.obj) {
                continue;
            }
            to_schedule.push(entry);
        }

        if !to_schedule.is_empty() {
            self.to_finalize.lock().extend(to_schedule);
            self.pending.store(true, Ordering::Relaxed);
        }
        if !promoted.is_empty() {
            self.marked.lock().extend(promoted);
        }
    }

    /// `run_finalizers`: swap `to_finalize` into a local buffer under
    /// the lock, release it, then run entries in reverse registration
    /// order -- later registrations run first. Exceptions from managed
    /// finalizers are the caller's (the binding's) responsibility to
    /// catch; this function only establishes the run order.
    pub fn run_finalizers(&self, mut run: impl FnMut(&FinalizerEntry)) {
        let batch = {
            let mut guard = self.to_finalize.lock();
            std::mem::take(&mut *guard)
        };
        for entry in batch.iter().rev() {
            run(entry);
        }
    }

    /// `enable(false)` increments the inhibit nesting counter;
    /// `enable(true)` decrements it and, if finalizers are pending and
    /// nesting has reached zero, drains `to_finalize` via `run`.
    /// Decrementing below zero is a warning, not an error.
    pub fn enable(&self, on: bool, mut run: impl FnMut(&FinalizerEntry)) {
        if !on {
            self.inhibited.fetch_add(1, Ordering::Relaxed);
            return;
        }
        let prev = self.inhibited.load(Ordering::Relaxed);
        if prev == 0 {
            log::warn!("finalizer enable/disable count went negative");
            return;
        }
        let now = self.inhibited.fetch_sub(1, Ordering::Relaxed) - 1;
        if now == 0 && self.pending.swap(false, Ordering::Relaxed) {
            self.run_finalizers(&mut run);
        }
    }
}

impl Default for FinalizerState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::Address;

    fn obj(n: usize) -> ObjectReference {
        ObjectReference::from_raw_address(Address::from_usize(n * 16 + 16))
    }

    #[test]
    fn register_then_snapshot_sees_entry() {
        let list = FinalizerList::new();
        list.register(obj(1), Finalizer::Managed(obj(2)));
        assert_eq!(list.len(), 1);
        assert_eq!(list.snapshot().len(), 1);
    }

    #[test]
    fn unmarked_objects_move_to_to_finalize() {
        let state = FinalizerState::new();
        let list = FinalizerList::new();
        list.register(obj(1), Finalizer::Managed(obj(2)));
        list.register(obj(3), Finalizer::Managed(obj(4)));

        state.sweep_finalizer_list(&list, |o| o == obj(1), |_| false, true);

        assert_eq!(list.len(), 1);
        assert_eq!(state.to_finalize.lock().len(), 1);
        assert_eq!(state.to_finalize.lock()[0].obj, obj(1));
    }

    #[test]
    fn run_finalizers_executes_in_reverse_registration_order() {
        let state = FinalizerState::new();
        state.to_finalize.lock().push(FinalizerEntry {
            obj: obj(1),
            finalizer: Finalizer::Managed(obj(10)),
        });
        state.to_finalize.lock().push(FinalizerEntry {
            obj: obj(2),
            finalizer: Finalizer::Managed(obj(20)),
        });

        let mut order = vec![];
        state.run_finalizers(|e| order.push(e.obj));
        assert_eq!(order, vec![obj(2), obj(1)]);
    }

    #[test]
    fn enable_disable_drains_when_nesting_returns_to_zero() {
        let state = FinalizerState::new();
        state.to_finalize.lock().push(FinalizerEntry {
            obj: obj(1),
            finalizer: Finalizer::Managed(obj(10)),
        });
        state.pending.store(true, Ordering::Relaxed);

        state.enable(false, |_| {});
        let mut ran = vec![];
        state.enable(true, |e| ran.push(e.obj));
        assert_eq!(ran, vec![obj(1)]);
    }
}
