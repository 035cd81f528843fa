//! Per-page metadata. Deliberately kept out-of-band from the page's
//! data region (owned by the page table, not interleaved with cells)
//! so that a page's bytes are entirely available to the pool.

use crate::util::constants::PAGE_SZ;
use crate::vm::{ThreadId, VMBinding};
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU32, Ordering};

/// Fixed-size bitmap, one bit per cell, recording which cells have
/// survived at least one sweep. Sized for the smallest size class
/// (16 bytes/cell => up to `PAGE_SZ / 16` cells per page).
const MAX_CELLS_PER_PAGE: usize = PAGE_SZ / 16;
const AGE_BITMAP_WORDS: usize = MAX_CELLS_PER_PAGE.div_ceil(64);

pub struct AgeBitmap {
    words: [std::sync::atomic::AtomicU64; AGE_BITMAP_WORDS],
}

impl AgeBitmap {
    pub fn new() -> Self {
        AgeBitmap {
            words: std::array::from_fn(|_| std::sync::atomic::AtomicU64::new(0)),
        }
    }

    #[inline]
    pub fn get(&self, cell_index: usize) -> bool {
        let w = cell_index / 64;
        let b = cell_index % 64;
        (self.words[w].load(Ordering::Relaxed) >> b) & 1 != 0
    }

    #[inline]
    pub fn set(&self, cell_index: usize) {
        let w = cell_index / 64;
        let b = cell_index % 64;
        self.words[w].fetch_or(1 << b, Ordering::Relaxed);
    }

    #[inline]
    pub fn clear(&self, cell_index: usize) {
        let w = cell_index / 64;
        let b = cell_index % 64;
        self.words[w].fetch_and(!(1 << b), Ordering::Relaxed);
    }

    pub fn clear_all(&self) {
        for w in self.words.iter() {
            w.store(0, Ordering::Relaxed);
        }
    }
}

impl Default for AgeBitmap {
    fn default() -> Self {
        Self::new()
    }
}

/// Out-of-band metadata for one 16 KiB pool page. One instance is
/// allocated per page and linked into the bottom level of the page
/// table; it outlives the page's data being reset and reused many
/// times over the page's lifetime.
pub struct PageMetadata<VM: VMBinding> {
    /// Base address of the page's data region.
    pub data: crate::util::Address,
    /// Thread that owns this page (the only thread allowed to
    /// bump-allocate from it; any thread may read it during a GC).
    owner: std::sync::atomic::AtomicUsize,
    _owner_ty: std::marker::PhantomData<VM>,
    /// Index into the size-class table.
    pub pool_index: AtomicU16,
    /// Cell size in bytes for this page's class.
    pub osize: AtomicU32,
    /// Number of free cells as of the last sweep.
    pub nfree: AtomicU32,
    /// Number of cells promoted to `Old` as of the last full sweep.
    pub nold: AtomicU32,
    /// `nold` as of the sweep before last (diagnostic / heuristic use).
    pub prev_nold: AtomicU32,
    /// Any cell on this page was marked during the last mark phase.
    pub has_marked: AtomicBool,
    /// Any cell on this page is `Clean`/`Marked` (i.e. young) as of the
    /// last sweep; quick sweeps only touch pages with this set.
    pub has_young: AtomicBool,
    /// Byte offset of the first entry of this page's free-list, within
    /// the page's data region. Zero means empty.
    pub freelist_begin: std::sync::atomic::AtomicUsize,
    /// Byte offset of the last entry of this page's free-list.
    pub freelist_end: std::sync::atomic::AtomicUsize,
    /// Per-cell survival bitmap.
    pub age_bitmap: AgeBitmap,
}

impl<VM: VMBinding> PageMetadata<VM> {
    pub fn new(data: crate::util::Address) -> Self {
        PageMetadata {
            data,
            owner: std::sync::atomic::AtomicUsize::new(0),
            _owner_ty: std::marker::PhantomData,
            pool_index: AtomicU16::new(0),
            osize: AtomicU32::new(0),
            nfree: AtomicU32::new(0),
            nold: AtomicU32::new(0),
            prev_nold: AtomicU32::new(0),
            has_marked: AtomicBool::new(false),
            has_young: AtomicBool::new(true),
            freelist_begin: std::sync::atomic::AtomicUsize::new(0),
            freelist_end: std::sync::atomic::AtomicUsize::new(0),
            age_bitmap: AgeBitmap::new(),
        }
    }

    pub fn owner(&self) -> VM::Ptls {
        VM::Ptls::from_usize(self.owner.load(Ordering::Relaxed))
    }

    pub fn set_owner(&self, owner: VM::Ptls) {
        self.owner.store(owner.as_usize(), Ordering::Relaxed);
    }

    pub fn cell_count(&self) -> usize {
        let osize = self.osize.load(Ordering::Relaxed) as usize;
        if osize == 0 {
            0
        } else {
            PAGE_SZ / osize
        }
    }

    pub fn cell_index(&self, addr: crate::util::Address) -> usize {
        let osize = self.osize.load(Ordering::Relaxed) as usize;
        (addr - self.data) as usize / osize
    }

    /// Reset metadata for reuse by a (possibly new) pool/class. Does
    /// not touch the page's bytes; see `util::alloc::pool::reset_page`
    /// for free-list splicing.
    pub fn reset(&self, pool_index: u16, osize: u32) {
        self.pool_index.store(pool_index, Ordering::Relaxed);
        self.osize.store(osize, Ordering::Relaxed);
        self.nfree.store(0, Ordering::Relaxed);
        self.has_marked.store(false, Ordering::Relaxed);
        self.has_young.store(true, Ordering::Relaxed);
        self.freelist_begin.store(0, Ordering::Relaxed);
        self.freelist_end.store(0, Ordering::Relaxed);
        self.age_bitmap.clear_all();
    }
}
