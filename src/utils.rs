//! This file contains all the helper functions for the allocator.
//! This are functions that don't particularly belong to any concrete module of the program.

use crate::{block::MAX_ALIGN, error::AllocError};

/// It aligns `to_be_aligned` using `aligment`, returning `None` if the result
/// does not fit in a `usize`.
///
/// This method is used to align mapping lengths to be a multiple of
/// [`crate::kernel::PlatformMemory::page_size`] and block sizes to be a
/// multiple of [`MAX_ALIGN`]. `aligment` must be a power of two.
pub fn align(to_be_aligned: usize, aligment: usize) -> Option<usize> {
    debug_assert!(aligment.is_power_of_two());

    to_be_aligned
        .checked_add(aligment - 1)
        .map(|size| size & !(aligment - 1))
}

/// Validates a caller's byte count and turns it into the size the allocator
/// actually works with: non-zero and rounded up to [`MAX_ALIGN`].
pub(crate) fn request_size(size: usize) -> Result<usize, AllocError> {
    if size == 0 {
        return Err(AllocError::InvalidSize);
    }

    align(size, MAX_ALIGN).ok_or(AllocError::InvalidSize)
}
