//! The exit sweep only runs when a process terminates, so it is exercised in
//! a forked child. This file holds a single test so that nothing else in the
//! process touches the global allocator around the fork.
#![cfg(unix)]

use mapalloc::{global, install_exit_hook};

/// Registered before the sweep, so it runs after it.
extern "C" fn verify_swept() {
    if global().outstanding() != 0 {
        unsafe { libc::_exit(3) };
    }
}

fn run_child() -> ! {
    unsafe {
        if libc::atexit(verify_swept) != 0 {
            libc::_exit(4);
        }
    }

    if install_exit_hook().is_err() || install_exit_hook().is_err() {
        unsafe { libc::_exit(5) };
    }

    let heap = global();
    for size in [24, 100, 5000, 16] {
        let ptr = heap.allocate(size);
        if ptr.is_null() {
            unsafe { libc::_exit(6) };
        }
        unsafe { ptr.write_bytes(0xAB, size) };
    }

    if heap.outstanding() != 4 {
        unsafe { libc::_exit(7) };
    }

    // Normal termination runs the atexit handlers.
    unsafe { libc::exit(0) }
}

#[test]
fn outstanding_allocations_are_swept_at_exit() {
    let pid = unsafe { libc::fork() };
    assert!(pid >= 0, "fork failed");

    if pid == 0 {
        run_child();
    }

    let mut status = 0;
    let waited = unsafe { libc::waitpid(pid, &mut status, 0) };

    assert_eq!(waited, pid);
    assert!(libc::WIFEXITED(status), "child did not exit normally");
    assert_eq!(libc::WEXITSTATUS(status), 0);
}
