//! C ABI over the global allocator (enabled with `--features c_api`).
//!
//! The symbols are prefixed so that linking the library never interposes the
//! system `malloc` family.
//!
//! Nothing runs when the library is loaded. A C program that wants the
//! outstanding allocations swept at exit calls `mapalloc_install_exit_hook`
//! once, before or after its first allocation. There is no such hook on
//! Windows, where outstanding allocations simply stay mapped until the
//! process is torn down.

use crate::global;

/// Allocates at least `size` bytes, or returns null.
///
/// The exit sweep is not registered by this call, see
/// `mapalloc_install_exit_hook`.
#[unsafe(no_mangle)]
pub extern "C" fn mapalloc_malloc(size: usize) -> *mut u8 {
    global().allocate(size)
}

#[unsafe(no_mangle)]
pub extern "C" fn mapalloc_calloc(count: usize, size: usize) -> *mut u8 {
    global().zero_allocate(count, size)
}

/// # Safety
///
/// `ptr` must be null or come from this allocator and not be released yet.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn mapalloc_realloc(ptr: *mut u8, size: usize) -> *mut u8 {
    unsafe { global().resize(ptr, size) }
}

/// # Safety
///
/// `ptr` must be null or come from this allocator and not be released yet.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn mapalloc_free(ptr: *mut u8) {
    unsafe { global().release(ptr) }
}

/// Registers the exit-time sweep. Returns 0 on success, also when it was
/// already registered, and the `atexit` status otherwise.
#[cfg(unix)]
#[unsafe(no_mangle)]
pub extern "C" fn mapalloc_install_exit_hook() -> std::os::raw::c_int {
    match crate::install_exit_hook() {
        Ok(()) => 0,
        Err(err) => err.0,
    }
}
