//! The collaborator interface the embedding runtime must implement.
//!
//! Everything in this module is a trait the host language implements;
//! the collector only ever calls through `VM: VMBinding`. This mirrors
//! how a pluggable-GC framework keeps the type system, the task/thread
//! library, the safepoint mechanism and the exception machinery out of
//! the collector core: they are consumed through a handful of narrow
//! traits instead of being hard-wired in.

pub mod active_plan;
pub mod collection;
pub mod object_model;
pub mod scanning;

pub use active_plan::ActivePlan;
pub use collection::{Collection, SafepointState};
pub use object_model::{DatatypeLayout, FieldDescType, ObjectModel};
pub use scanning::{RootsWorkFactory, Scanning, SlotVisitor, StackSlot};

use std::fmt::Debug;

/// Opaque handle to a mutator's per-thread state (`Ptls` in the spec).
/// The collector never interprets its contents beyond treating it as a
/// stable, word-sized identity -- used as a key to find thread-local
/// pools, remsets, and the finalizer/weak-ref vectors, and stashed
/// as-is in page metadata to record page ownership.
pub trait ThreadId: Copy + Eq + Debug + Send + Sync + 'static {
    fn as_usize(self) -> usize;
    fn from_usize(v: usize) -> Self;
}

impl ThreadId for usize {
    fn as_usize(self) -> usize {
        self
    }
    fn from_usize(v: usize) -> Self {
        v
    }
}

/// Aggregates the handful of traits the collector needs from its host.
/// A binding implements this once and the rest of the crate is generic
/// over it.
pub trait VMBinding: Sized + 'static {
    /// Per-thread identity token passed to every allocation and barrier
    /// entry point (the spec's `Ptls`).
    type Ptls: ThreadId;

    type ObjectModel: ObjectModel<Self>;
    type Scanning: Scanning<Self>;
    type ActivePlan: ActivePlan<Self>;
    type Collection: Collection<Self>;

    /// `true` if allocation requests may be satisfied at an offset from
    /// the returned cell (rare; most bindings use `false`).
    const USE_ALLOCATION_OFFSET: bool = false;

    /// Minimum, maximum alignment the binding ever requests.
    const MIN_ALIGNMENT: usize = crate::util::constants::HEAP_ALIGNMENT;
    const MAX_ALIGNMENT: usize = crate::util::constants::HEAP_ALIGNMENT;
}
