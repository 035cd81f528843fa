//! The live thread table: the collector needs to enumerate every
//! mutator to fold per-thread counters, enqueue roots, and wait at a
//! safepoint, but it never owns thread bookkeeping itself.

use crate::vm::VMBinding;

pub trait ActivePlan<VM: VMBinding> {
    /// Call `f` once for every currently-live mutator thread. Only
    /// called from inside the stop-the-world window, so no locking
    /// discipline beyond what the host's thread table already has is
    /// required.
    fn for_each_mutator(f: &mut dyn FnMut(VM::Ptls));

    /// Number of live mutator threads right now.
    fn mutator_count() -> usize;

    /// The currently-running thread's id, if called from mutator
    /// context (used by allocation/barrier fast paths, which are
    /// always invoked by the mutator they concern).
    fn current_thread() -> VM::Ptls;
}
