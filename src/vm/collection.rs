//! Stop-the-world handshake the safepoint facility provides. The
//! collector only calls through here; it never touches signal handlers
//! or the thread scheduler directly.

use crate::vm::VMBinding;

/// A mutator's progress toward a safepoint, observed by the collector
/// with an acquire load and published by the mutator with a release
/// store (spec §5, "gc_state transitions").
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum SafepointState {
    /// Running mutator code; may still be armed to trap into a
    /// safepoint check at any load.
    Running,
    /// Parked at a safepoint, waiting for the collector to finish.
    Waiting,
}

pub trait Collection<VM: VMBinding> {
    /// Attempt to become *the* collector thread for this cycle. Exactly
    /// one concurrent caller observes `true`.
    fn safepoint_start_gc() -> bool;

    /// Release the safepoint and let parked mutators resume.
    fn safepoint_end_gc();

    /// Block until every other live mutator's `gc_state` is observed
    /// non-`Running`. Returns the measured worst-case time-to-safepoint.
    fn block_for_safepoint() -> std::time::Duration;

    /// Read/write this thread's own published `gc_state`.
    fn set_gc_state(tls: VM::Ptls, state: SafepointState);
    fn get_gc_state(tls: VM::Ptls) -> SafepointState;

    /// Out-of-memory / allocation failure surfaces as an exception in
    /// the host language; this call never returns.
    fn throw_out_of_memory(tls: VM::Ptls) -> !;
}
