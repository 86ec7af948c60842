use std::ptr::NonNull;

/// Address space reserved at once when the current reservation runs out.
/// Reserving costs no physical memory, pages only count once committed.
pub const RESERVATION_SIZE: usize = 64 * 1024 * 1024;

/// Page size assumed when the operating system cannot tell us.
const FALLBACK_PAGE_SIZE: usize = 4096;

/// This trait provides an abstraction to handle low level memory operations
/// and syscalls. As the allocator, our top level view of this has nothing
/// to do with the concrete implementations / APIs offered by each kernel.
///
/// Memory is obtained in two steps. A large range of address space is
/// reserved first, then regions of it are committed from the bottom up as
/// blocks are needed. That keeps consecutive blocks back to back in
/// ascending address order, whatever placement policy the kernel uses for
/// fresh mappings.
///
/// The allocator never gives memory back, so there is no counterpart to
/// either call.
///
/// # Safety
///
/// Implementors must only return reservations that are aligned to
/// [`PlatformMemory::page_size`], at least `len` bytes long, not in use by
/// anything else and valid for the rest of the process. A successful
/// [`PlatformMemory::commit`] must leave the range readable and writable.
pub unsafe trait PlatformMemory {
    /// Reserves `len` bytes of address space without making them accessible.
    /// Returns `None` if the underlying syscall fails.
    ///
    /// **SAFETY**: `len` must be a non-zero multiple of the page size.
    unsafe fn reserve(&self, len: usize) -> Option<NonNull<u8>>;

    /// Makes `len` bytes starting at `addr` readable and writable. Returns
    /// whether it worked.
    ///
    /// **SAFETY**: `addr..addr + len` must lie inside a range returned by
    /// [`PlatformMemory::reserve`], and `addr` and `len` must be multiples of
    /// the page size.
    unsafe fn commit(&self, addr: NonNull<u8>, len: usize) -> bool;

    /// Returns the virtual memory page size of the computer in bytes.
    fn page_size(&self) -> usize;

    /// How much address space to reserve when the current reservation cannot
    /// fit the next region.
    fn reservation_size(&self) -> usize {
        RESERVATION_SIZE
    }
}

/// Anonymous private mappings straight from the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct System;

/// `sysconf` reports failure as `-1`.
#[cfg_attr(not(unix), allow(dead_code))]
fn page_size_or_fallback(reported: i64) -> usize {
    if reported > 0 {
        reported as usize
    } else {
        FALLBACK_PAGE_SIZE
    }
}

#[cfg(unix)]
mod unix {
    use super::{PlatformMemory, System, page_size_or_fallback};

    use libc::{mmap, mprotect, off_t, size_t};

    use std::{
        os::raw::{c_int, c_void},
        ptr::{self, NonNull},
    };

    #[cfg(any(target_os = "linux", target_os = "android"))]
    const NORESERVE: c_int = libc::MAP_NORESERVE;
    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    const NORESERVE: c_int = 0;

    unsafe impl PlatformMemory for System {
        unsafe fn reserve(&self, len: usize) -> Option<NonNull<u8>> {
            // No access until committed, and no swap accounted for it.
            const PROT: c_int = libc::PROT_NONE;
            const FLAGS: c_int = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | NORESERVE;
            const FD: c_int = -1;
            const OFFSET: off_t = 0;

            unsafe {
                match mmap(ptr::null_mut(), len as size_t, PROT, FLAGS, FD, OFFSET) {
                    libc::MAP_FAILED => None,
                    addr => NonNull::new(addr.cast::<u8>()),
                }
            }
        }

        unsafe fn commit(&self, addr: NonNull<u8>, len: usize) -> bool {
            // Read-Write only memory.
            const PROT: c_int = libc::PROT_READ | libc::PROT_WRITE;

            unsafe { mprotect(addr.as_ptr().cast::<c_void>(), len as size_t, PROT) == 0 }
        }

        fn page_size(&self) -> usize {
            page_size_or_fallback(unsafe { libc::sysconf(libc::_SC_PAGE_SIZE) } as i64)
        }
    }
}

#[cfg(windows)]
mod windows {
    use std::{mem::MaybeUninit, os::raw::c_void, ptr::NonNull};

    use super::{PlatformMemory, System};

    use windows::Win32::System::{Memory, SystemInformation};

    unsafe impl PlatformMemory for System {
        unsafe fn reserve(&self, len: usize) -> Option<NonNull<u8>> {
            unsafe {
                let addr = Memory::VirtualAlloc(None, len, Memory::MEM_RESERVE, Memory::PAGE_NOACCESS);

                NonNull::new(addr.cast())
            }
        }

        unsafe fn commit(&self, addr: NonNull<u8>, len: usize) -> bool {
            // Read-Write only.
            let protection = Memory::PAGE_READWRITE;

            unsafe {
                let committed = Memory::VirtualAlloc(
                    Some(addr.as_ptr() as *const c_void),
                    len,
                    Memory::MEM_COMMIT,
                    protection,
                );

                !committed.is_null()
            }
        }

        fn page_size(&self) -> usize {
            unsafe {
                let mut system_info = MaybeUninit::uninit();
                SystemInformation::GetSystemInfo(system_info.as_mut_ptr());

                system_info.assume_init().dwPageSize as usize
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_page_size_query_falls_back() {
        assert_eq!(page_size_or_fallback(-1), FALLBACK_PAGE_SIZE);
        assert_eq!(page_size_or_fallback(0), FALLBACK_PAGE_SIZE);
        assert_eq!(page_size_or_fallback(16384), 16384);
    }

    #[cfg(unix)]
    #[test]
    fn page_size_is_power_of_two() {
        let page = System.page_size();
        assert!(page.is_power_of_two());
        assert!(page >= 4096);
    }

    #[cfg(unix)]
    #[test]
    fn committed_memory_is_page_aligned_and_writable() {
        let page = System.page_size();

        unsafe {
            let region = System.reserve(4 * page).expect("reservation failed");
            assert_eq!(0, region.as_ptr() as usize % page);

            let second = region.add(page);
            assert!(System.commit(second, 2 * page));

            second.as_ptr().write_bytes(0xAB, 2 * page);
            assert_eq!(0xAB, *second.as_ptr().add(2 * page - 1));
        }
    }
}
