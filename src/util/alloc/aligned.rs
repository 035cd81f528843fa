//! Platform-independent aligned allocation for big objects and the
//! permanent arena's overflow blocks. On 64-bit targets the system
//! allocator's default 16-byte alignment already satisfies most
//! requests; anything stricter goes through `std::alloc` with an
//! explicit `Layout`.

use crate::util::Address;
use std::alloc::Layout;

/// Allocate `size` bytes aligned to `align` (a power of two). Returns
/// `None` on exhaustion rather than aborting -- the caller (big-object
/// / permanent allocation) is responsible for surfacing an
/// out-of-memory condition to the host.
pub fn aligned_alloc(size: usize, align: usize) -> Option<Address> {
    debug_assert!(align.is_power_of_two());
    let layout = Layout::from_size_align(size, align).ok()?;
    let ptr = unsafe { std::alloc::alloc(layout) };
    if ptr.is_null() {
        None
    } else {
        Some(Address::from_mut_ptr(ptr))
    }
}

pub fn aligned_zeroed(size: usize, align: usize) -> Option<Address> {
    debug_assert!(align.is_power_of_two());
    let layout = Layout::from_size_align(size, align).ok()?;
    let ptr = unsafe { std::alloc::alloc_zeroed(layout) };
    if ptr.is_null() {
        None
    } else {
        Some(Address::from_mut_ptr(ptr))
    }
}

/// Grow or shrink a previous [`aligned_alloc`] allocation in place when
/// the allocator can, copying otherwise. `old_size` must be the size
/// passed to the original allocation call.
pub fn aligned_realloc(
    addr: Address,
    old_size: usize,
    new_size: usize,
    align: usize,
) -> Option<Address> {
    let old_layout = Layout::from_size_align(old_size, align).ok()?;
    let ptr = unsafe { std::alloc::realloc(addr.to_mut_ptr(), old_layout, new_size) };
    if ptr.is_null() {
        None
    } else {
        Some(Address::from_mut_ptr(ptr))
    }
}

/// # Safety
/// `addr` must have been returned by [`aligned_alloc`]/[`aligned_zeroed`]
/// with the same `size`/`align`, and must not be used again afterward.
pub unsafe fn aligned_free(addr: Address, size: usize, align: usize) {
    let layout = Layout::from_size_align(size, align).expect("invalid layout on free");
    std::alloc::dealloc(addr.to_mut_ptr(), layout);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_is_aligned_and_usable() {
        let addr = aligned_alloc(256, 64).unwrap();
        assert!(addr.is_aligned_to(64));
        unsafe {
            addr.store::<u64>(0xdead_beef);
            assert_eq!(addr.load::<u64>(), 0xdead_beef);
            aligned_free(addr, 256, 64);
        }
    }
}
