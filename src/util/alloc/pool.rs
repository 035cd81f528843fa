//! Size-classed pool allocator: one [`Pool`] per thread per size class,
//! each holding a freelist of reclaimed cells plus a bump-pointer
//! reserve (`newpages`) into pages that have never been swept.
//!
//! Free-list cells are not modeled as safe references: a cell's first
//! word, while free, holds the address of the next free cell (or zero).
//! [`PoolCursor`] is the only thing that reads or writes that word, so
//! the bit-encoding invariant stays in one place.

use crate::util::alloc::size_class::SIZE_CLASSES;
use crate::util::constants::PAGE_OFFSET;
use crate::util::heap::{PageAllocator, PageMetadata};
use crate::util::Address;
use crate::vm::VMBinding;

/// A raw cursor over a pool's free-list, encapsulating the
/// next-pointer-in-first-word encoding. Holding one of these across a
/// safepoint is unsound (the underlying page can be swept); callers are
/// expected to extract/link within a single allocation call.
struct PoolCursor(Address);

impl PoolCursor {
    #[inline]
    unsafe fn next(&self) -> Address {
        Address::from_usize(self.0.load::<usize>())
    }

    #[inline]
    unsafe fn set_next(&self, next: Address) {
        self.0.store::<usize>(next.as_usize());
    }
}

/// Per-thread, per-size-class allocator state. Pages, once reserved,
/// live for the remainder of the process (see `util::heap::page_table`),
/// so pools hold `'static` references to their metadata rather than
/// threading a heap lifetime through every mutator.
pub struct Pool<VM: VMBinding> {
    class: usize,
    osize: usize,
    freelist: Address,
    /// Current bump-allocation page and cursor, if one is active.
    newpages_page: Option<&'static PageMetadata<VM>>,
    newpages_cur: Address,
}

impl<VM: VMBinding> Pool<VM> {
    pub fn new(class: usize) -> Self {
        Pool {
            class,
            osize: SIZE_CLASSES[class] as usize,
            freelist: Address::ZERO,
            newpages_page: None,
            newpages_cur: Address::ZERO,
        }
    }

    pub fn class(&self) -> usize {
        self.class
    }

    pub fn osize(&self) -> usize {
        self.osize
    }

    /// Allocate one cell of this pool's size class. Tries the
    /// free-list, then the bump reserve, then asks for a fresh page.
    pub fn alloc(&mut self, pages: &'static PageAllocator<VM>) -> Address {
        if !self.freelist.is_zero() {
            let cursor = PoolCursor(self.freelist);
            let cell = self.freelist;
            let next = unsafe { cursor.next() };
            self.freelist = next;
            // If the unlinked cell's successor lives on a different
            // page, that page is now known to have at least one
            // allocated (non-free) cell again.
            if let Some(page) = pages.page_metadata(cell) {
                page.nfree.fetch_sub(1, std::sync::atomic::Ordering::Relaxed);
                page.has_young.store(true, std::sync::atomic::Ordering::Relaxed);
            }
            return cell;
        }

        if let Some(page) = self.newpages_page {
            let page_end = page.data + crate::util::constants::PAGE_SZ;
            if self.newpages_cur + self.osize <= page_end {
                let cell = self.newpages_cur;
                self.newpages_cur = self.newpages_cur + self.osize;
                return cell;
            }
        }

        self.add_page(pages);
        let cell = self.newpages_cur;
        self.newpages_cur = self.newpages_cur + self.osize;
        cell
    }

    /// Reserve a fresh page for this pool's class, resetting its
    /// metadata for reuse and seeding the bump cursor at
    /// `data + PAGE_OFFSET` (the first cell-aligned offset into a page).
    fn add_page(&mut self, pages: &'static PageAllocator<VM>) {
        let page = pages.table.lookup(pages.alloc_page().data).expect("just-allocated page");
        page.reset(self.class as u16, self.osize as u32);
        self.newpages_cur = page.data + PAGE_OFFSET;
        self.newpages_page = Some(page);
    }

    /// Splice a page's reclaimed free-list, built during sweep, back
    /// onto this pool: rewrite metadata for reuse and make the new
    /// page's reclaimed cell the sole allocation head, appending
    /// `oldfl` after it so fragmentation doesn't spread across several
    /// pages that are simultaneously mid-allocation.
    pub fn reset_page(&mut self, page: &'static PageMetadata<VM>, oldfl: Address) {
        let begin = Address::from_usize(page.freelist_begin.load(std::sync::atomic::Ordering::Relaxed));
        let end = Address::from_usize(page.freelist_end.load(std::sync::atomic::Ordering::Relaxed));
        if !end.is_zero() {
            unsafe { PoolCursor(end).set_next(oldfl) };
        }
        let head = if begin.is_zero() { oldfl } else { begin };
        self.freelist = head;
    }

    /// Push a single cell back onto the pool's free-list head.
    pub fn free_cell(&mut self, cell: Address) {
        unsafe { PoolCursor(cell).set_next(self.freelist) };
        self.freelist = cell;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::test_util::MockVM;

    fn leaked_pages() -> &'static PageAllocator<MockVM> {
        Box::leak(Box::new(PageAllocator::new()))
    }

    #[test]
    fn alloc_returns_distinct_aligned_cells() {
        let pages = leaked_pages();
        let mut pool: Pool<MockVM> = Pool::new(0);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..200 {
            let cell = pool.alloc(pages);
            assert!(cell.is_aligned_to(crate::util::constants::HEAP_ALIGNMENT));
            assert!(seen.insert(cell.as_usize()));
        }
    }

    #[test]
    fn freed_cell_is_reused_before_bumping() {
        let pages = leaked_pages();
        let mut pool: Pool<MockVM> = Pool::new(0);
        let a = pool.alloc(pages);
        pool.free_cell(a);
        let b = pool.alloc(pages);
        assert_eq!(a.as_usize(), b.as_usize());
    }
}
