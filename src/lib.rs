//! A precise, non-moving, generational, stop-the-world mark-and-sweep
//! collector core.
//!
//! This crate implements exactly one collector algorithm rather than a
//! pluggable framework of them: a host embeds it by implementing
//! [`vm::VMBinding`] (and its constituent traits -- [`vm::ObjectModel`],
//! [`vm::Scanning`], [`vm::ActivePlan`], [`vm::Collection`]) over its
//! own object representation, thread table, and safepoint mechanism.
//! Everything else -- the page table, the size-classed pool allocator,
//! the big-object list, the write barrier and remembered set, the mark
//! and sweep engines, and the finalizer/weak-reference subsystems -- is
//! concrete and lives under [`util`].
//!
//! [`mmtk::Heap`] is the process-scope aggregate of global state
//! (`gc_init`'s result); [`mutator::Mutator`] is the per-thread
//! counterpart. [`memory_manager`] is the thin callable surface a host
//! calls into from its allocation fast paths and collection triggers.

#[macro_use]
extern crate log;

pub mod memory_manager;
pub mod mmtk;
pub mod mutator;
pub mod plan;
pub mod util;
pub mod vm;

pub use mmtk::Heap;
pub use mutator::Mutator;
pub use util::{Address, ObjectReference};
