//! Process-exit registration for the shutdown sweep of [`crate::global`].

use std::sync::atomic::{AtomicBool, Ordering};

use crate::{error::ExitHookError, global};

static INSTALLED: AtomicBool = AtomicBool::new(false);

extern "C" fn sweep_at_exit() {
    global().shutdown();
}

/// Registers [`crate::MemAlloc::shutdown`] of the global instance with
/// `atexit`, so that whatever is still outstanding when the process exits
/// normally gets released. Calling it again does nothing.
///
/// The sweep runs after `main` returns, threads still running at that point
/// must not be using the allocator.
pub fn install_exit_hook() -> Result<(), ExitHookError> {
    if INSTALLED.swap(true, Ordering::AcqRel) {
        return Ok(());
    }

    match unsafe { libc::atexit(sweep_at_exit) } {
        0 => {
            log::debug!("registered exit sweep");
            Ok(())
        }
        code => {
            INSTALLED.store(false, Ordering::Release);
            Err(ExitHookError(code))
        }
    }
}
