//! Fundamental size constants shared across the allocator, page table and
//! collector driver. Kept in one place because so many of them interlock
//! (e.g. `PAGE_OFFSET` depends on the header size and `HEAP_ALIGNMENT`).

/// log2 of the number of bytes in a word (pointer size).
#[cfg(target_pointer_width = "64")]
pub const LOG_BYTES_IN_WORD: u8 = 3;
#[cfg(target_pointer_width = "32")]
pub const LOG_BYTES_IN_WORD: u8 = 2;
/// The number of bytes in a word.
pub const BYTES_IN_WORD: usize = 1 << LOG_BYTES_IN_WORD;

/// log2 of the size of a pool page, in bytes. 16 KiB.
pub const PAGE_LG2: u8 = 14;
/// Size of a pool page in bytes.
pub const PAGE_SZ: usize = 1 << PAGE_LG2;

/// Minimum alignment the allocator hands out to mutators.
pub const HEAP_ALIGNMENT: usize = 16;

/// Size of the tagged-value header prepended to every managed object.
pub const TAG_SIZE: usize = BYTES_IN_WORD;

/// Byte offset from the start of a page to the first cell. Chosen so that
/// `PAGE_OFFSET` rounds the header-adjusted cell start up to `HEAP_ALIGNMENT`.
pub const PAGE_OFFSET: usize = HEAP_ALIGNMENT - (TAG_SIZE % HEAP_ALIGNMENT);

static_assertions::const_assert!(PAGE_OFFSET >= BYTES_IN_WORD);
static_assertions::const_assert!(PAGE_SZ.is_power_of_two());

/// Objects survive this many sweeps while still `MARKED` before they are
/// promoted to `OLD` on the following sweep.
pub const PROMOTE_AGE: u8 = 1;

/// Required alignment for big-object headers (one cache line).
pub const CACHE_ALIGN: usize = 64;

/// Size of the permanent bump arena reserved per OS-level chunk.
pub const PERM_POOL_SIZE: usize = 2 * 1024 * 1024;
/// Allocations at or above this size bypass the permanent arena and go
/// straight to the general-purpose allocator (they are still never freed).
pub const PERM_POOL_LIMIT: usize = 20 * 1024;

/// Default number of bytes allocated between automatic collections.
#[cfg(target_pointer_width = "64")]
pub const DEFAULT_COLLECT_INTERVAL: usize = 5600 * 1024 * BYTES_IN_WORD;
#[cfg(target_pointer_width = "32")]
pub const DEFAULT_COLLECT_INTERVAL: usize = 3200 * 1024 * BYTES_IN_WORD;

/// Hard ceiling the collect interval is clamped to before a full collection
/// is forced.
#[cfg(target_pointer_width = "64")]
pub const MAX_COLLECT_INTERVAL: usize = 1_250_000_000;
#[cfg(target_pointer_width = "32")]
pub const MAX_COLLECT_INTERVAL: usize = 500_000_000;

/// Default cap on total heap size, before being clamped to 70% of free RAM
/// at startup (see [`crate::util::options::Options::max_total_memory`]).
#[cfg(target_pointer_width = "64")]
pub const DEFAULT_MAX_TOTAL_MEMORY: usize = 2usize.pow(51); // ~2 PiB
#[cfg(target_pointer_width = "32")]
pub const DEFAULT_MAX_TOTAL_MEMORY: usize = 2 * 1024 * 1024 * 1024; // 2 GiB

/// Fraction (numerator over 100) of allocated bytes that must be freed by a
/// sweep for the interval to stay the same; falling short doubles it.
pub const NOT_FREED_ENOUGH_THRESHOLD_PERCENT: usize = 70;

/// Number of entries a thread's bounded big-object mark cache holds before
/// it must be flushed under the global cache lock.
pub const MARK_CACHE_SIZE: usize = 128;

/// Depth of the FIFO prefetch window in front of the mark stack.
pub const PF_SIZE: usize = 4;
/// Minimum number of prefetched entries kept on hand before refilling.
pub const PF_MIN: usize = 1;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_offset_is_aligned() {
        assert_eq!((PAGE_OFFSET + TAG_SIZE) % HEAP_ALIGNMENT, 0);
    }
}
