//! A small thread-safe general purpose allocator.
//!
//! Every allocation is a block (a header followed by the caller's bytes)
//! that lives in page-granular memory mapped from the OS. Blocks are kept in
//! two intrusive lists:
//!
//! - every block ever mapped, in acquisition order. It is searched first-fit
//!   to reuse freed blocks, and a released block absorbs the free blocks that
//!   follow it there.
//! - the blocks currently handed out, so that [`MemAlloc::shutdown`] can take
//!   back whatever is still outstanding when the process ends.
//!
//! Memory is never returned to the OS. A single lock serializes every
//! operation.
//!
//! ```
//! let heap = mapalloc::global();
//!
//! let ptr = heap.allocate(24);
//! assert!(!ptr.is_null());
//!
//! let grown = unsafe { heap.resize(ptr, 8192) };
//! assert!(!grown.is_null());
//!
//! unsafe { heap.release(grown) };
//! ```

use std::{
    alloc::{GlobalAlloc, Layout},
    ptr::{self, NonNull},
    sync::atomic::{AtomicBool, Ordering},
};

use parking_lot::Mutex;

mod block;
mod error;
mod freelist;
mod heap;
mod kernel;
mod list;
mod tracker;
mod utils;

#[cfg(unix)]
mod exit;
#[cfg(feature = "c_api")]
pub mod ffi;

pub use block::MAX_ALIGN;
pub use error::{AllocError, ExitHookError};
#[cfg(unix)]
pub use exit::install_exit_hook;
pub use kernel::{PlatformMemory, System};

use heap::Heap;

/// The allocator engine.
///
/// Every method locks the whole engine for its full duration, including the
/// system call when a new region has to be mapped.
///
/// Most programs use the single process-wide instance returned by [`global`],
/// tests and embedders can build their own over any [`PlatformMemory`].
pub struct MemAlloc<P = System> {
    heap: Mutex<Heap<P>>,
    swept: AtomicBool,
}

impl MemAlloc {
    /// Creates an allocator backed by the operating system.
    pub const fn new() -> Self {
        Self::with_platform(System)
    }
}

impl Default for MemAlloc {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: PlatformMemory> MemAlloc<P> {
    /// Creates an allocator that maps its regions through `platform`.
    pub const fn with_platform(platform: P) -> Self {
        Self {
            heap: Mutex::new(Heap::new(platform)),
            swept: AtomicBool::new(false),
        }
    }

    /// Allocates at least `size` bytes aligned to [`MAX_ALIGN`].
    ///
    /// Returns null if `size` is zero or too large, or if the OS is out of
    /// memory.
    pub fn allocate(&self, size: usize) -> *mut u8 {
        into_raw(self.try_allocate(size))
    }

    /// Allocates `count * size` zeroed bytes. Returns null if either argument
    /// is zero, if the product overflows, or if the allocation fails.
    pub fn zero_allocate(&self, count: usize, size: usize) -> *mut u8 {
        into_raw(self.try_zero_allocate(count, size))
    }

    /// Resizes the allocation at `ptr` to at least `size` bytes, keeping its
    /// content up to the smaller of both sizes.
    ///
    /// - A null `ptr` allocates.
    /// - A zero `size` releases `ptr` and returns null.
    /// - If the block behind `ptr` is already big enough `ptr` is returned.
    /// - On failure null is returned and `ptr` stays valid and untouched.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a pointer returned by this allocator that was not
    /// released yet.
    pub unsafe fn resize(&self, ptr: *mut u8, size: usize) -> *mut u8 {
        let Some(ptr) = NonNull::new(ptr) else {
            return self.allocate(size);
        };

        if size == 0 {
            unsafe { self.release(ptr.as_ptr()) };
            return ptr::null_mut();
        }

        into_raw(unsafe { self.try_resize(ptr, size) })
    }

    /// Makes the allocation at `ptr` available for reuse. Null is ignored.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a pointer returned by this allocator that was not
    /// released yet. The memory must not be used afterwards.
    pub unsafe fn release(&self, ptr: *mut u8) {
        if let Some(ptr) = NonNull::new(ptr) {
            self.heap.lock().release(ptr);
        }
    }

    /// Releases every allocation that is still outstanding and returns how
    /// many there were. Only the first call does anything.
    ///
    /// Meant to run once at process exit, after every other thread using the
    /// allocator is done. See [`install_exit_hook`].
    pub fn shutdown(&self) -> usize {
        if self.swept.swap(true, Ordering::AcqRel) {
            return 0;
        }

        let swept = self.heap.lock().sweep();

        log::debug!("exit sweep released {swept} outstanding allocations");

        swept
    }

    /// Number of allocations handed out and not released yet.
    pub fn outstanding(&self) -> usize {
        self.heap.lock().outstanding()
    }

    fn try_allocate(&self, size: usize) -> Result<NonNull<u8>, AllocError> {
        let size = utils::request_size(size)?;

        self.heap.lock().allocate(size)
    }

    fn try_zero_allocate(&self, count: usize, size: usize) -> Result<NonNull<u8>, AllocError> {
        if count == 0 || size == 0 {
            return Err(AllocError::InvalidSize);
        }

        let total = count.checked_mul(size).ok_or(AllocError::InvalidSize)?;
        let ptr = self.try_allocate(total)?;

        // Reused blocks keep whatever their previous owner wrote.
        unsafe { ptr.as_ptr().write_bytes(0, total) };

        Ok(ptr)
    }

    /// **SAFETY**: `ptr` must be outstanding.
    unsafe fn try_resize(&self, ptr: NonNull<u8>, size: usize) -> Result<NonNull<u8>, AllocError> {
        let size = utils::request_size(size)?;

        unsafe { self.heap.lock().resize(ptr, size) }
    }
}

#[inline]
fn into_raw(result: Result<NonNull<u8>, AllocError>) -> *mut u8 {
    result.map_or(ptr::null_mut(), NonNull::as_ptr)
}

/// Global allocator implementation.
///
/// Blocks are only aligned to [`MAX_ALIGN`]. Layouts asking for more (std
/// itself does, for example for cache padded channel internals) are served
/// by [`std::alloc::System`] instead. The layout passed to `dealloc` and
/// `realloc` is the one the memory was allocated with, so it always tells
/// which of the two owns a pointer. Such allocations are not tracked, the
/// exit sweep never sees them.
unsafe impl<P: PlatformMemory> GlobalAlloc for MemAlloc<P> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if layout.align() > MAX_ALIGN {
            return unsafe { std::alloc::System.alloc(layout) };
        }

        self.allocate(layout.size().max(1))
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        if layout.align() > MAX_ALIGN {
            return unsafe { std::alloc::System.dealloc(ptr, layout) };
        }

        unsafe { self.release(ptr) }
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        if layout.align() > MAX_ALIGN {
            return unsafe { std::alloc::System.alloc_zeroed(layout) };
        }

        self.zero_allocate(layout.size().max(1), 1)
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        if layout.align() > MAX_ALIGN {
            return unsafe { std::alloc::System.realloc(ptr, layout, new_size) };
        }

        unsafe { self.resize(ptr, new_size.max(1)) }
    }
}

static GLOBAL: MemAlloc = MemAlloc::new();

/// The process-wide allocator instance.
pub fn global() -> &'static MemAlloc {
    &GLOBAL
}

/// Handle to [`global`] that can be registered with `#[global_allocator]`.
///
/// ```no_run
/// #[global_allocator]
/// static ALLOCATOR: mapalloc::Global = mapalloc::Global;
///
/// fn main() {
///     let boxed = Box::new(22);
///     assert_eq!(*boxed, 22);
/// }
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct Global;

unsafe impl GlobalAlloc for Global {
    #[inline]
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        unsafe { GLOBAL.alloc(layout) }
    }

    #[inline]
    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        unsafe { GLOBAL.dealloc(ptr, layout) }
    }

    #[inline]
    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        unsafe { GLOBAL.alloc_zeroed(layout) }
    }

    #[inline]
    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        unsafe { GLOBAL.realloc(ptr, layout, new_size) }
    }
}
