//! Mark-queue strategies (component F) and work-stealing deque
//! primitives (component L). The mark engine is generic over the
//! former; the latter are library-pure and not yet wired into a
//! parallel marker, but are exercised directly by their own tests.

pub mod chase_lev;
pub mod idempotent;
pub mod stack;

pub use chase_lev::ChaseLevDeque;
pub use idempotent::IdempotentDeque;
pub use stack::{MarkStack, PrefetchStack};
