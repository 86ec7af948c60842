use thiserror::Error;

/// Reasons an allocation request can fail.
///
/// The public entry points of [`crate::MemAlloc`] collapse both variants into
/// a null pointer, the caller decides whether to retry, shrink the request or
/// give up.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    /// Zero-sized request, or a size/count whose arithmetic would overflow.
    #[error("invalid allocation size")]
    InvalidSize,
    /// The operating system refused to map a new region.
    #[error("the operating system could not provide more memory")]
    OutOfMemory,
}

/// The process-exit facility refused to register the shutdown sweep.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("failed to register the exit-time sweep (atexit returned {0})")]
pub struct ExitHookError(pub i32);
