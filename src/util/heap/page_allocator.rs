//! Reserves OS memory in large blocks and hands out individual 16 KiB
//! pages from three pools, to keep `mmap`/`madvise` syscalls off the
//! allocation fast path.

use crate::util::constants::PAGE_SZ;
use crate::util::heap::mmap::{mmap_anon, madvise_free};
use crate::util::heap::page::PageMetadata;
use crate::util::heap::page_table::PageTable;
use crate::util::Address;
use crate::vm::VMBinding;
use spin::Mutex;
use std::collections::VecDeque;

/// Reserve pages from the OS in chunks this large, to amortize mmap
/// overhead. 16 MiB normally; bumped to 64 MiB once the heap has grown
/// past a few blocks (mirrors the host's `DEFAULT_BLOCK_PG_ALLOC`).
const SMALL_BLOCK_SIZE: usize = 16 * 1024 * 1024;
const LARGE_BLOCK_SIZE: usize = 64 * 1024 * 1024;
const LARGE_BLOCK_THRESHOLD_PAGES: usize = (SMALL_BLOCK_SIZE / PAGE_SZ) * 4;

/// A free page, already registered in the page table, waiting to be
/// reused. Carried through three pools of increasing OS-visibility:
/// `clean` pages have never been decommitted, `to_madvise` pages are
/// queued for a batched `madvise`, `madvised` pages have already been
/// told to the OS they can be dropped.
struct FreePools<VM: VMBinding> {
    clean: VecDeque<&'static PageMetadata<VM>>,
    to_madvise: VecDeque<&'static PageMetadata<VM>>,
    madvised: VecDeque<&'static PageMetadata<VM>>,
}

pub struct PageAllocator<VM: VMBinding> {
    pub table: PageTable<VM>,
    pools: Mutex<FreePools<VM>>,
    pages_reserved: std::sync::atomic::AtomicUsize,
}

impl<VM: VMBinding> PageAllocator<VM> {
    pub fn new() -> Self {
        PageAllocator {
            table: PageTable::new(),
            pools: Mutex::new(FreePools {
                clean: VecDeque::new(),
                to_madvise: VecDeque::new(),
                madvised: VecDeque::new(),
            }),
            pages_reserved: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    fn block_size(&self) -> usize {
        let reserved = self.pages_reserved.load(std::sync::atomic::Ordering::Relaxed);
        if reserved > LARGE_BLOCK_THRESHOLD_PAGES {
            LARGE_BLOCK_SIZE
        } else {
            SMALL_BLOCK_SIZE
        }
    }

    /// Reserve a fresh block from the OS, register every page it
    /// contains in the page table, and return the pages as metadata
    /// references (the first is returned to the caller, the rest are
    /// pushed onto `pool_clean` by [`alloc_page`]).
    fn reserve_block(&self) -> Vec<&'static PageMetadata<VM>> {
        let size = self.block_size();
        let base = mmap_anon(size).expect("out of address space reserving a GC heap block");
        let n = size / PAGE_SZ;
        self.pages_reserved
            .fetch_add(n, std::sync::atomic::Ordering::Relaxed);
        (0..n)
            .map(|i| {
                let addr = base + i * PAGE_SZ;
                let meta = self.table.insert(addr, Box::new(PageMetadata::new(addr)));
                // Leaking the reference's lifetime to 'static is sound:
                // page metadata is never freed once inserted into the
                // table (see module docs on `page_table`).
                unsafe { std::mem::transmute::<&PageMetadata<VM>, &'static PageMetadata<VM>>(meta) }
            })
            .collect()
    }

    /// Hand out one page, trying `pool_clean`, then `pool_to_madvise`,
    /// then `pool_madvised`, in that order, before reserving a new OS
    /// block. The remainder of a freshly reserved block is pushed to
    /// `pool_clean`.
    pub fn alloc_page(&self) -> &'static PageMetadata<VM> {
        {
            let mut pools = self.pools.lock();
            if let Some(p) = pools.clean.pop_front() {
                return p;
            }
            if let Some(p) = pools.to_madvise.pop_front() {
                return p;
            }
            if let Some(p) = pools.madvised.pop_front() {
                return p;
            }
        }
        let mut fresh = self.reserve_block();
        let first = fresh.remove(0);
        let mut pools = self.pools.lock();
        pools.clean.extend(fresh);
        first
    }

    /// Return a page to the OS-visible free pool. The page is queued
    /// for a batched `madvise` rather than decommitted immediately so a
    /// burst of frees doesn't turn into a burst of syscalls.
    pub fn free_page(&self, meta: &'static PageMetadata<VM>) {
        let mut pools = self.pools.lock();
        pools.to_madvise.push_back(meta);
    }

    /// Flush the `to_madvise` queue: actually tell the OS these pages'
    /// physical backing can be dropped, then move them to `madvised`.
    /// Called at the end of a sweep, outside the allocation fast path.
    pub fn flush_madvise(&self) {
        let mut pools = self.pools.lock();
        while let Some(meta) = pools.to_madvise.pop_front() {
            madvise_free(meta.data, PAGE_SZ);
            pools.madvised.push_back(meta);
        }
    }

    pub fn page_metadata(&self, addr: Address) -> Option<&PageMetadata<VM>> {
        self.table.lookup(addr.align_down(PAGE_SZ))
    }
}

impl<VM: VMBinding> Default for PageAllocator<VM> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::test_util::MockVM;

    #[test]
    fn alloc_and_free_page_round_trips_through_table() {
        let pa: PageAllocator<MockVM> = PageAllocator::new();
        let p1 = pa.alloc_page();
        assert!(pa.page_metadata(p1.data).is_some());
        pa.free_page(p1);
        pa.flush_madvise();
        // The page keeps its table entry even after being freed back
        // to the OS-visible pools -- it gets reused, never unmapped.
        assert!(pa.page_metadata(p1.data).is_some());
    }

    #[test]
    fn alloc_many_pages_are_distinct() {
        let pa: PageAllocator<MockVM> = PageAllocator::new();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..100 {
            let p = pa.alloc_page();
            assert!(seen.insert(p.data.as_usize()));
        }
    }
}
