//! Multi-level index mapping a virtual address to its page metadata.
//!
//! Real 64-bit address spaces are far too large to index with a flat
//! array, so the table is split into two levels, each a fixed-size
//! array of 32-bit allocation bitmaps plus a pointer array to the next
//! level; the bottom level holds the page-metadata pointers themselves.
//! Once a page's virtual address has been reserved it keeps its table
//! entry forever (we only ever `madvise` pages back to the OS, never
//! `munmap` them), so lookups never need to distinguish "never
//! reserved" from "currently freed" -- both read as a page with
//! `nfree == osize` worth of dead cells waiting to be reused.

use crate::util::constants::PAGE_LG2;
use crate::util::heap::page::PageMetadata;
use crate::util::Address;
use crate::vm::VMBinding;
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

/// log2 of the number of leaf slots held by a second-level table. 2^14
/// pages per second-level block, i.e. each covers 14 + 14 = 28 bits of
/// address space (256 MiB) with 16 KiB pages.
const L2_BITS: u32 = 14;
const L2_SIZE: usize = 1 << L2_BITS;
const L2_WORDS: usize = L2_SIZE / 32;

/// log2 of the number of top-level slots. 2^22 second-level blocks
/// covers the full 64-bit canonical address range at this leaf size.
const L1_BITS: u32 = 22;
const L1_SIZE: usize = 1 << L1_BITS;

struct Level2<VM: VMBinding> {
    alloc_bitmap: Box<[AtomicUsize]>,
    leaves: Box<[AtomicPtr<PageMetadata<VM>>]>,
}

impl<VM: VMBinding> Level2<VM> {
    fn new() -> Box<Self> {
        Box::new(Level2 {
            alloc_bitmap: (0..L2_WORDS).map(|_| AtomicUsize::new(0)).collect(),
            leaves: (0..L2_SIZE).map(|_| AtomicPtr::new(std::ptr::null_mut())).collect(),
        })
    }

    fn mark_allocated(&self, idx: usize) {
        let word = idx / (usize::BITS as usize);
        let bit = idx % (usize::BITS as usize);
        self.alloc_bitmap[word].fetch_or(1 << bit, Ordering::Relaxed);
    }
}

/// The page table root, plus lower/upper-bound hints so a full sweep
/// doesn't have to probe the entire top-level array.
pub struct PageTable<VM: VMBinding> {
    root: Box<[AtomicPtr<Level2<VM>>]>,
    insert_lock: spin::Mutex<()>,
    lo_hint: AtomicUsize,
    hi_hint: AtomicUsize,
}

impl<VM: VMBinding> PageTable<VM> {
    pub fn new() -> Self {
        PageTable {
            root: (0..L1_SIZE)
                .map(|_| AtomicPtr::new(std::ptr::null_mut()))
                .collect(),
            insert_lock: spin::Mutex::new(()),
            lo_hint: AtomicUsize::new(usize::MAX),
            hi_hint: AtomicUsize::new(0),
        }
    }

    fn split(addr: Address) -> (usize, usize) {
        let page_idx = addr.as_usize() >> PAGE_LG2;
        let l2_idx = page_idx & (L2_SIZE - 1);
        let l1_idx = (page_idx >> L2_BITS) & (L1_SIZE - 1);
        (l1_idx, l2_idx)
    }

    /// `O(1)` lookup. Returns `None` for any address this table was
    /// never asked to register a page at.
    pub fn lookup(&self, addr: Address) -> Option<&PageMetadata<VM>> {
        let (l1, l2) = Self::split(addr);
        let level2 = self.root[l1].load(Ordering::Acquire);
        if level2.is_null() {
            return None;
        }
        // Safety: once published, a Level2 table is never freed or mutated
        // in a way that invalidates outstanding references (leaves are
        // only ever set once, from null to a stable pointer).
        let level2 = unsafe { &*level2 };
        let leaf = level2.leaves[l2].load(Ordering::Acquire);
        if leaf.is_null() {
            None
        } else {
            Some(unsafe { &*leaf })
        }
    }

    /// Register `meta` (leaked onto the heap; page metadata lives for
    /// the remainder of the process) at the page containing `addr`.
    pub fn insert(&self, addr: Address, meta: Box<PageMetadata<VM>>) -> &PageMetadata<VM> {
        let (l1, l2) = Self::split(addr);
        if self.root[l1].load(Ordering::Acquire).is_null() {
            let _guard = self.insert_lock.lock();
            if self.root[l1].load(Ordering::Acquire).is_null() {
                let fresh = Box::into_raw(Level2::new());
                self.root[l1].store(fresh, Ordering::Release);
            }
        }
        let level2 = unsafe { &*self.root[l1].load(Ordering::Acquire) };
        level2.mark_allocated(l2);
        let ptr = Box::into_raw(meta);
        level2.leaves[l2].store(ptr, Ordering::Release);

        let page_idx = addr.as_usize() >> PAGE_LG2;
        self.lo_hint.fetch_min(page_idx, Ordering::Relaxed);
        self.hi_hint.fetch_max(page_idx, Ordering::Relaxed);

        unsafe { &*ptr }
    }

    /// Visit every registered page's metadata, in address order. Used
    /// by full sweeps and by sanity checks; skips whole second-level
    /// blocks that were never touched using the allocation bitmap.
    pub fn for_each_page(&self, mut f: impl FnMut(&PageMetadata<VM>)) {
        let lo = self.lo_hint.load(Ordering::Relaxed);
        let hi = self.hi_hint.load(Ordering::Relaxed);
        if lo > hi {
            return; // table is empty
        }
        for l1 in 0..L1_SIZE {
            let level2 = self.root[l1].load(Ordering::Acquire);
            if level2.is_null() {
                continue;
            }
            let level2 = unsafe { &*level2 };
            for (word_idx, word) in level2.alloc_bitmap.iter().enumerate() {
                let mut bits = word.load(Ordering::Relaxed);
                while bits != 0 {
                    let bit = bits.trailing_zeros() as usize;
                    bits &= bits - 1;
                    let l2 = word_idx * usize::BITS as usize + bit;
                    let leaf = level2.leaves[l2].load(Ordering::Acquire);
                    if !leaf.is_null() {
                        f(unsafe { &*leaf });
                    }
                }
            }
        }
    }
}

impl<VM: VMBinding> Default for PageTable<VM> {
    fn default() -> Self {
        Self::new()
    }
}

// Safety: all interior mutability here is through atomics; `Level2` and
// `PageMetadata` are only ever reached through them.
unsafe impl<VM: VMBinding> Sync for PageTable<VM> {}
unsafe impl<VM: VMBinding> Send for PageTable<VM> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::test_util::MockVM;

    #[test]
    fn lookup_missing_is_none() {
        let table: PageTable<MockVM> = PageTable::new();
        assert!(table.lookup(Address::from_usize(0x1_0000_0000)).is_none());
    }

    #[test]
    fn insert_then_lookup() {
        let table: PageTable<MockVM> = PageTable::new();
        let addr = Address::from_usize(0x2000_0000);
        let meta = Box::new(PageMetadata::new(addr));
        table.insert(addr, meta);
        assert!(table.lookup(addr).is_some());
        assert!(table.lookup(addr + crate::util::constants::PAGE_SZ).is_none());
    }

    #[test]
    fn for_each_page_visits_inserted_pages() {
        let table: PageTable<MockVM> = PageTable::new();
        let mut addrs = vec![];
        for i in 0..8usize {
            let addr = Address::from_usize(0x4000_0000 + i * crate::util::constants::PAGE_SZ);
            table.insert(addr, Box::new(PageMetadata::new(addr)));
            addrs.push(addr);
        }
        let mut seen = 0;
        table.for_each_page(|_| seen += 1);
        assert_eq!(seen, 8);
    }
}
