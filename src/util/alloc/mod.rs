//! Allocation components: the permanent arena, the size-classed pool
//! allocator, and the big-object list. All three sit on top of
//! [`crate::util::heap`]'s page-granularity plumbing.

pub mod aligned;
pub mod big_object;
pub mod perm_arena;
pub mod pool;
pub mod size_class;

pub use big_object::{big_alloc, BigAllocError, BigObjectHeader, BigObjectList};
pub use perm_arena::PermArena;
pub use pool::Pool;
pub use size_class::szclass;
