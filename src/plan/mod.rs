//! The collector driver: stop-the-world orchestration and the
//! heuristics that pick the next cycle's mode and interval. There is
//! exactly one plan in this crate (no pluggable GC algorithm
//! selection), so this module is concrete rather than a trait to
//! implement.

pub mod driver;

pub use driver::{collect, CollectionResult, DriverState};
