//! Collector-internal utilities: the address/object-reference
//! newtypes, constants, and every component from the page table up
//! through the mark/sweep engines and the finalizer/weak-ref
//! subsystems. Nothing in here is generic over a GC *algorithm* the way
//! a pluggable-plan framework would be -- this crate implements exactly
//! one collector, so these modules are concrete collaborators rather
//! than strategy interfaces (the only strategy interfaces are the
//! [`crate::vm`] traits the host implements).

pub mod address;
pub mod alloc;
pub mod barrier;
pub mod constants;
pub mod finalizer;
pub mod heap;
pub mod logger;
pub mod mark;
pub mod options;
pub mod queue;
pub mod stats;
pub mod sweep;
pub mod weakref;

#[cfg(any(test, feature = "test_private"))]
pub mod test_util;

pub use address::{Address, ObjectReference};
