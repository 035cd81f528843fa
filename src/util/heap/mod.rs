//! Page-granularity heap plumbing: the page table (address -> page
//! metadata), the page allocator (OS reservation + the three free
//! pools), and the mmap/madvise wrappers they sit on.

pub mod mmap;
pub mod page;
pub mod page_allocator;
pub mod page_table;

pub use page::PageMetadata;
pub use page_allocator::PageAllocator;
pub use page_table::PageTable;
