use std::{mem, ptr::NonNull};

use crate::list::Link;

/// Maximum scalar alignment of the platform. Every payload handed out by the
/// allocator is aligned to this value and every block size is a multiple of it.
pub const MAX_ALIGN: usize = 16;

/// Header size of a block. Because [`Block`] is aligned to [`MAX_ALIGN`] this is
/// always a multiple of it, so the payload that follows inherits the alignment
/// of the mapping.
pub(crate) const BLOCK_HEADER_SIZE: usize = mem::size_of::<Block>();

const _: () = assert!(mem::align_of::<Block>() == MAX_ALIGN);
const _: () = assert!(BLOCK_HEADER_SIZE % MAX_ALIGN == 0);
#[cfg(target_os = "linux")]
const _: () = assert!(MAX_ALIGN >= mem::align_of::<libc::max_align_t>());

/// This is the structure of a block. The fields of the block are it's metadata,
/// content is placed after this header.
///
/// ```text
/// +---------------------+ <------+
/// |        size         |        |
/// +---------------------+        |
/// |    is_free (1b)     |        |
/// +---------------------+        | -> Header
/// |        next         |        |
/// +---------------------+        |
/// |     next_alloc      |        |
/// +---------------------+ <------+ <- pointer returned to the user
/// |       Content       |        |
/// |         ...         |        | -> Addressable content (`size` bytes)
/// |         ...         |        |
/// +---------------------+ <------+
/// ```
///
/// Every block lives in its own page-granular mapping, so the header and its
/// content share the lifetime of that mapping. Mappings are never returned
/// to the OS.
///
/// The two links thread the block through two different chains, see
/// [`crate::list::Chain`]:
///
/// - `next` orders every block ever mapped by acquisition time
///   ([`crate::freelist::FreeList`]).
/// - `next_alloc` orders the blocks currently handed out
///   ([`crate::tracker::LiveAllocations`]).
#[repr(C, align(16))]
pub(crate) struct Block {
    /// Usable size of the content, excluding this header.
    pub size: usize,
    /// Flag to tell whether the block is free or not.
    pub is_free: bool,
    /// Next block in acquisition order.
    pub next: Link,
    /// Next block in the list of live allocations.
    pub next_alloc: Link,
}

impl Block {
    /// A detached in-use block with `size` usable bytes.
    pub const fn new(size: usize) -> Self {
        Self {
            size,
            is_free: false,
            next: None,
            next_alloc: None,
        }
    }

    /// Pointer to the content of `block`.
    #[inline]
    pub fn payload(block: NonNull<Block>) -> NonNull<u8> {
        // SAFETY: the header is always followed by its content inside the
        // same mapping, so the result stays in bounds and non-null.
        unsafe { block.cast::<u8>().add(BLOCK_HEADER_SIZE) }
    }

    /// Header address for a pointer previously returned by [`Block::payload`].
    ///
    /// The computation never reads memory, so it is harmless on pointers the
    /// allocator does not own. Dereferencing the result is only valid for
    /// owned pointers.
    #[inline]
    pub fn from_payload(ptr: NonNull<u8>) -> NonNull<Block> {
        let addr = ptr.as_ptr().wrapping_sub(BLOCK_HEADER_SIZE).cast::<Block>();

        // A header address of zero can only come from a foreign pointer,
        // fall back to a dangling one that no chain will ever contain.
        NonNull::new(addr).unwrap_or(NonNull::dangling())
    }

    /// Address one past the last content byte of `block`.
    ///
    /// **SAFETY**: `block` must point to an initialized header.
    #[inline]
    pub unsafe fn end(block: NonNull<Block>) -> usize {
        unsafe { block.as_ptr() as usize + BLOCK_HEADER_SIZE + block.as_ref().size }
    }
}
