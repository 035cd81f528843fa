//! Bump-pointer arena for immortal allocations. Objects handed out
//! here are never reclaimed or swept; they exist for the lifetime of
//! the process (interned strings, boot-image metadata, and the like).

use crate::util::alloc::aligned::aligned_alloc;
use crate::util::constants::{PERM_POOL_LIMIT, PERM_POOL_SIZE};
use crate::util::Address;
use spin::Mutex;

struct Region {
    cursor: Address,
    end: Address,
}

/// `gc_perm_lock`-protected bump allocator. A new [`PERM_POOL_SIZE`]
/// region is reserved from the general-purpose allocator whenever the
/// current one overflows.
pub struct PermArena {
    region: Mutex<Region>,
}

impl PermArena {
    pub fn new() -> Self {
        PermArena {
            region: Mutex::new(Region {
                cursor: Address::ZERO,
                end: Address::ZERO,
            }),
        }
    }

    /// Allocate `size` permanent bytes, aligned so that
    /// `(result + offset) % align == 0`. Requests at or above
    /// [`PERM_POOL_LIMIT`] bypass the bump region entirely (they would
    /// waste too much of it) and go straight to the general allocator;
    /// those allocations are still never freed.
    pub fn alloc(&self, size: usize, zero: bool, align: usize, offset: usize) -> Address {
        if size >= PERM_POOL_LIMIT {
            return self.alloc_standalone(size, zero, align, offset);
        }

        let mut region = self.region.lock();
        loop {
            let candidate = Self::align_with_offset(region.cursor, align, offset);
            if candidate + size <= region.end {
                region.cursor = candidate + size;
                if zero {
                    unsafe { std::ptr::write_bytes(candidate.to_mut_ptr::<u8>(), 0, size) };
                }
                return candidate;
            }
            // Overflow: reserve a fresh region and retry.
            let fresh = aligned_alloc(PERM_POOL_SIZE, crate::util::constants::CACHE_ALIGN)
                .expect("out of memory reserving permanent arena region");
            region.cursor = fresh;
            region.end = fresh + PERM_POOL_SIZE;
        }
    }

    fn alloc_standalone(&self, size: usize, zero: bool, align: usize, offset: usize) -> Address {
        // `offset`-adjusted alignment needs at most `align` extra bytes
        // of slack; round the backing allocation up generously.
        let backing = aligned_alloc(size + align, align.max(crate::util::constants::CACHE_ALIGN))
            .expect("out of memory for a large permanent allocation");
        let addr = Self::align_with_offset(backing, align, offset);
        if zero {
            unsafe { std::ptr::write_bytes(addr.to_mut_ptr::<u8>(), 0, size) };
        }
        addr
    }

    fn align_with_offset(addr: Address, align: usize, offset: usize) -> Address {
        debug_assert!(align.is_power_of_two());
        (addr + offset).align_up(align) - offset
    }
}

impl Default for PermArena {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_allocations_satisfy_offset_alignment() {
        let arena = PermArena::new();
        let a = arena.alloc(48, false, 16, 8);
        assert_eq!((a.as_usize() + 8) % 16, 0);
    }

    #[test]
    fn large_allocation_bypasses_bump_region() {
        let arena = PermArena::new();
        let a = arena.alloc(PERM_POOL_SIZE, true, 16, 0);
        assert!(a.is_aligned_to(16));
    }

    #[test]
    fn many_small_allocations_overflow_into_new_region() {
        let arena = PermArena::new();
        for _ in 0..(PERM_POOL_SIZE / 64 + 10) {
            arena.alloc(64, false, 16, 0);
        }
    }
}
