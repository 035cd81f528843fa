//! Big-object allocator: allocations above [`crate::util::alloc::size_class::GC_MAX_SZCLASS`]
//! are owned directly on a doubly-linked list rather than living in a
//! pool page. Big objects are born **old** -- they're large enough that
//! generational bookkeeping on them would waste more than it saves.

use crate::util::alloc::aligned::{aligned_alloc, aligned_free, aligned_realloc};
use crate::util::constants::{CACHE_ALIGN, PROMOTE_AGE};
use crate::util::Address;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

/// Header prepended to every big-object allocation. Cache-line aligned
/// so that two big objects never share a false-sharing line.
#[repr(align(64))]
pub struct BigObjectHeader {
    /// Next/prev links in the owning thread's (or `big_objects_marked`)
    /// doubly-linked list. Stored as raw addresses of other headers;
    /// zero means "no link".
    pub next: AtomicUsize,
    pub prev: AtomicUsize,
    /// Total allocation size including this header, aligned to `CACHE_ALIGN`.
    pub sz: AtomicUsize,
    /// Saturating survival counter, promoted at `PROMOTE_AGE`.
    pub age: AtomicU8,
    /// The object's GC state lives in the ordinary tagged-value header
    /// immediately after this struct, reachable via
    /// `ObjectModel::header_word`; this struct only carries big-object
    /// bookkeeping that doesn't fit in the two state bits.
    _pad: [u8; 7],
}

/// Errors surfaced by the allocator for conditions the host must turn
/// into a memory exception.
#[derive(Debug)]
pub enum BigAllocError {
    /// `sz + header` overflowed `usize`, or the OS allocator refused.
    OutOfMemory,
}

/// An intrusive, thread-owned doubly-linked list of big-object headers.
/// The list owns no memory itself; headers are allocated and freed by
/// [`big_alloc`]/sweep directly.
pub struct BigObjectList {
    head: AtomicUsize,
}

impl BigObjectList {
    pub const fn new() -> Self {
        BigObjectList {
            head: AtomicUsize::new(0),
        }
    }

    /// Link `header` at the head of the list. Not safe to call
    /// concurrently with another mutation of the same list; big-object
    /// lists are thread-owned except during stop-the-world sweep.
    pub fn push_front(&self, header: &BigObjectHeader) {
        let old_head = self.head.load(Ordering::Relaxed);
        header.prev.store(0, Ordering::Relaxed);
        header.next.store(old_head, Ordering::Relaxed);
        if old_head != 0 {
            let old: &BigObjectHeader = unsafe { &*(old_head as *const BigObjectHeader) };
            old.prev.store(header as *const _ as usize, Ordering::Relaxed);
        }
        self.head.store(header as *const _ as usize, Ordering::Relaxed);
    }

    pub fn unlink(&self, header: &BigObjectHeader) {
        let prev = header.prev.load(Ordering::Relaxed);
        let next = header.next.load(Ordering::Relaxed);
        if prev != 0 {
            let prev: &BigObjectHeader = unsafe { &*(prev as *const BigObjectHeader) };
            prev.next.store(next, Ordering::Relaxed);
        } else {
            self.head.store(next, Ordering::Relaxed);
        }
        if next != 0 {
            let next: &BigObjectHeader = unsafe { &*(next as *const BigObjectHeader) };
            next.prev.store(prev, Ordering::Relaxed);
        }
    }

    /// Visit every header currently linked, in list order. Only sound
    /// to call while no concurrent mutation of the list is happening
    /// (stop-the-world sweep, or the owning thread).
    pub fn for_each(&self, mut f: impl FnMut(&BigObjectHeader)) {
        let mut cur = self.head.load(Ordering::Relaxed);
        while cur != 0 {
            let header: &BigObjectHeader = unsafe { &*(cur as *const BigObjectHeader) };
            let next = header.next.load(Ordering::Relaxed);
            f(header);
            cur = next;
        }
    }
}

impl Default for BigObjectList {
    fn default() -> Self {
        Self::new()
    }
}

/// Round `sz + header` up to `CACHE_ALIGN`, checking for overflow.
fn big_alloc_size(sz: usize) -> Result<usize, BigAllocError> {
    let with_header = sz
        .checked_add(std::mem::size_of::<BigObjectHeader>())
        .ok_or(BigAllocError::OutOfMemory)?;
    let aligned = with_header
        .checked_add(CACHE_ALIGN - 1)
        .ok_or(BigAllocError::OutOfMemory)?
        & !(CACHE_ALIGN - 1);
    Ok(aligned)
}

/// Allocate a big object of `sz` bytes of payload, link it onto `list`,
/// and return the address of the header. The caller is responsible for
/// writing the payload's tagged-value header and for invoking any
/// `notify_external_alloc` callbacks.
pub fn big_alloc(list: &BigObjectList, sz: usize) -> Result<Address, BigAllocError> {
    let allocsz = big_alloc_size(sz)?;
    let addr = aligned_alloc(allocsz, CACHE_ALIGN).ok_or(BigAllocError::OutOfMemory)?;
    let header: &BigObjectHeader = unsafe { &*addr.to_ptr::<BigObjectHeader>() };
    header.sz.store(allocsz, Ordering::Relaxed);
    header.age.store(PROMOTE_AGE, Ordering::Relaxed);
    list.push_front(header);
    Ok(addr)
}

/// Free a big object previously returned by [`big_alloc`]. The caller
/// must have already unlinked `header` from whatever list holds it and
/// invoked any `notify_external_free` callback.
///
/// # Safety
/// `addr` must be the exact address returned by a prior `big_alloc`
/// call, and must not be reachable from anywhere afterward.
pub unsafe fn big_free(addr: Address, header: &BigObjectHeader) {
    let sz = header.sz.load(Ordering::Relaxed);
    aligned_free(addr, sz, CACHE_ALIGN);
}

/// Grow or shrink a string-like big object in place when it is safe to
/// (not pool-allocated, not already old-marked this cycle); otherwise
/// the caller should allocate fresh and copy. This function only
/// handles the in-place branch.
pub fn realloc_big_in_place(addr: Address, header: &BigObjectHeader, new_payload_sz: usize) -> Result<Address, BigAllocError> {
    let old_sz = header.sz.load(Ordering::Relaxed);
    let new_sz = big_alloc_size(new_payload_sz)?;
    let new_addr = aligned_realloc(addr, old_sz, new_sz, CACHE_ALIGN).ok_or(BigAllocError::OutOfMemory)?;
    let new_header: &BigObjectHeader = unsafe { &*new_addr.to_ptr::<BigObjectHeader>() };
    new_header.sz.store(new_sz, Ordering::Relaxed);
    Ok(new_addr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_links_and_frees() {
        let list = BigObjectList::new();
        let addr = big_alloc(&list, 4096).unwrap();
        let header: &BigObjectHeader = unsafe { &*addr.to_ptr::<BigObjectHeader>() };
        assert_eq!(header.age.load(Ordering::Relaxed), PROMOTE_AGE);
        let mut count = 0;
        list.for_each(|_| count += 1);
        assert_eq!(count, 1);
        list.unlink(header);
        count = 0;
        list.for_each(|_| count += 1);
        assert_eq!(count, 0);
        unsafe { big_free(addr, header) };
    }

    #[test]
    fn overflow_is_rejected() {
        assert!(matches!(big_alloc_size(usize::MAX), Err(BigAllocError::OutOfMemory)));
    }

    #[test]
    fn several_objects_preserve_list_order() {
        let list = BigObjectList::new();
        let a = big_alloc(&list, 64).unwrap();
        let b = big_alloc(&list, 64).unwrap();
        let mut seen = vec![];
        list.for_each(|h| seen.push(h as *const _ as usize));
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], b.to_ptr::<BigObjectHeader>() as usize);
        assert_eq!(seen[1], a.to_ptr::<BigObjectHeader>() as usize);
    }
}
