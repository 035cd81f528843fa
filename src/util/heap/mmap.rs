//! Thin wrappers around the platform virtual-memory calls the page
//! allocator needs: reserve, decommit-and-keep-mapped (`madvise`), and
//! full release (`munmap`). Grounded on the collector's usual
//! `libc`-based `mmap`/`mprotect` helpers; kept to exactly the calls
//! the page allocator uses rather than a general-purpose mmap wrapper.

use crate::util::Address;
use std::io;

/// Reserve and commit a block of anonymous, read-write memory.
pub fn mmap_anon(size: usize) -> io::Result<Address> {
    cfg_if::cfg_if! {
        if #[cfg(unix)] {
            let ptr = unsafe {
                libc::mmap(
                    std::ptr::null_mut(),
                    size,
                    libc::PROT_READ | libc::PROT_WRITE,
                    libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                    -1,
                    0,
                )
            };
            if ptr == libc::MAP_FAILED {
                Err(io::Error::last_os_error())
            } else {
                Ok(Address::from_mut_ptr(ptr))
            }
        } else {
            // Fallback for non-unix targets: a plain heap allocation,
            // page-aligned by the caller's size class.
            let layout = std::alloc::Layout::from_size_align(size, crate::util::constants::PAGE_SZ)
                .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "bad mmap layout"))?;
            let ptr = unsafe { std::alloc::alloc(layout) };
            if ptr.is_null() {
                Err(io::Error::new(io::ErrorKind::OutOfMemory, "alloc failed"))
            } else {
                Ok(Address::from_mut_ptr(ptr))
            }
        }
    }
}

/// Release the region back to the OS entirely (used when unmapping a
/// whole reserved block; individual pages use [`madvise_free`] instead).
pub fn munmap(addr: Address, size: usize) -> io::Result<()> {
    cfg_if::cfg_if! {
        if #[cfg(unix)] {
            let ret = unsafe { libc::munmap(addr.to_mut_ptr(), size) };
            if ret == 0 {
                Ok(())
            } else {
                Err(io::Error::last_os_error())
            }
        } else {
            let layout = std::alloc::Layout::from_size_align(size, crate::util::constants::PAGE_SZ)
                .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "bad mmap layout"))?;
            unsafe { std::alloc::dealloc(addr.to_mut_ptr(), layout) };
            Ok(())
        }
    }
}

/// Tell the OS the contents of `[addr, addr+size)` can be discarded
/// lazily: the mapping stays valid (reads as zero on next touch) but no
/// physical memory is charged against the process until then. Prefers
/// `MADV_FREE`, falling back to `MADV_DONTNEED` on kernels that lack it.
pub fn madvise_free(addr: Address, size: usize) {
    #[cfg(target_os = "linux")]
    {
        let ret = unsafe {
            libc::madvise(addr.to_mut_ptr(), size, libc::MADV_FREE)
        };
        if ret == 0 {
            return;
        }
        // MADV_FREE unsupported (old kernel) or refused; fall back.
        unsafe {
            libc::madvise(addr.to_mut_ptr(), size, libc::MADV_DONTNEED);
        }
    }
    #[cfg(all(unix, not(target_os = "linux")))]
    {
        unsafe {
            libc::madvise(addr.to_mut_ptr(), size, libc::MADV_DONTNEED);
        }
    }
    #[cfg(not(unix))]
    {
        let _ = (addr, size);
    }
}
