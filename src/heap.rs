use std::ptr::{self, NonNull};

use crate::{
    block::{BLOCK_HEADER_SIZE, Block},
    error::AllocError,
    freelist::FreeList,
    kernel::PlatformMemory,
    tracker::LiveAllocations,
    utils::align,
};

/// The internal data structure of the allocator. Everything in here is only
/// ever touched with the lock of [`crate::MemAlloc`] held.
///
/// ```text
///                   FreeList (acquisition order)
///
/// +-------------+    +-------------+    +-------------+    +-------------+
/// | Block(free) | -> | Block(used) | -> | Block(free) | -> | Block(used) |
/// +-------------+    +-------------+    +-------------+    +-------------+
///                           ^                                     |
///                           +-------------------------------------+
///
///                   LiveAllocations (newest first)
/// ```
///
/// Sizes given to this type are already validated and rounded up to
/// [`crate::MAX_ALIGN`], see [`crate::utils::request_size`].
pub(crate) struct Heap<P> {
    /// Every block ever mapped. Used both to find reusable blocks and to
    /// coalesce freed ones.
    free_list: FreeList,
    /// Blocks handed out and not yet released.
    live: LiveAllocations,
    /// Address space new blocks are carved from.
    reservation: Option<Reservation>,
    /// Computer's page size, queried on first use.
    page_size: usize,
    /// Where new regions come from.
    platform: P,
}

/// Reserved but not yet committed address space, `next..end`.
#[derive(Clone, Copy)]
struct Reservation {
    next: NonNull<u8>,
    end: usize,
}

impl Reservation {
    fn remaining(&self) -> usize {
        self.end - self.next.as_ptr() as usize
    }
}

// SAFETY: the raw block pointers are only reachable through the heap itself,
// and the heap is only ever used behind a lock.
unsafe impl<P: Send> Send for Heap<P> {}

impl<P: PlatformMemory> Heap<P> {
    pub const fn new(platform: P) -> Self {
        Self {
            free_list: FreeList::new(),
            live: LiveAllocations::new(),
            reservation: None,
            page_size: 0,
            platform,
        }
    }

    /// Number of allocations handed out and not yet released.
    pub fn outstanding(&self) -> usize {
        self.live.len()
    }

    #[inline]
    fn page_size(&mut self) -> usize {
        if self.page_size == 0 {
            self.page_size = self.platform.page_size();
        }

        self.page_size
    }

    /// Hands out a block with at least `size` usable bytes, reusing the first
    /// free block that fits or mapping a new one.
    pub fn allocate(&mut self, size: usize) -> Result<NonNull<u8>, AllocError> {
        let block = match self.free_list.find_free_block(size) {
            Some(mut block) => {
                unsafe { block.as_mut().is_free = false };
                block
            }
            None => self.map_block(size)?,
        };

        unsafe { self.live.track(block) };

        Ok(Block::payload(block))
    }

    /// This function commits a new region through the [`PlatformMemory`] and
    /// turns all of it into a single in-use block.
    ///
    /// If there is no free block we can use on the free list, we know for
    /// sure there is no way we can allocate the requested size on our current
    /// blocks, so we need more memory from the OS.
    fn map_block(&mut self, size: usize) -> Result<NonNull<Block>, AllocError> {
        let page_size = self.page_size();

        // What we really need is the requested size plus the header, rounded
        // up to what the OS hands out anyway.
        let len = BLOCK_HEADER_SIZE
            .checked_add(size)
            .and_then(|needed| align(needed, page_size))
            .ok_or(AllocError::InvalidSize)?;

        let block = self.commit_next(len)?.cast::<Block>();

        unsafe {
            // The slack left by page rounding belongs to the block as well.
            block.as_ptr().write(Block::new(len - BLOCK_HEADER_SIZE));
            self.free_list.append(block);
        }

        Ok(block)
    }

    /// Commits the next `len` bytes of the current reservation, starting a
    /// new reservation first if they don't fit. Regions come out in
    /// ascending address order, so a new block starts where the previous one
    /// ended unless a reservation boundary lies in between.
    fn commit_next(&mut self, len: usize) -> Result<NonNull<u8>, AllocError> {
        let reservation = match self.reservation {
            Some(reservation) if reservation.remaining() >= len => reservation,
            _ => self.reserve(len)?,
        };

        if !unsafe { self.platform.commit(reservation.next, len) } {
            return Err(AllocError::OutOfMemory);
        }

        self.reservation = Some(Reservation {
            next: unsafe { reservation.next.add(len) },
            end: reservation.end,
        });

        Ok(reservation.next)
    }

    /// Reserves fresh address space for at least `len` bytes. Whatever was
    /// left of the previous reservation is abandoned.
    fn reserve(&mut self, len: usize) -> Result<Reservation, AllocError> {
        let page_size = self.page_size();

        let size = align(self.platform.reservation_size(), page_size)
            .unwrap_or(len)
            .max(len);

        let start = unsafe { self.platform.reserve(size) }.ok_or(AllocError::OutOfMemory)?;

        let reservation = Reservation {
            next: start,
            end: start.as_ptr() as usize + size,
        };
        self.reservation = Some(reservation);

        Ok(reservation)
    }

    /// Takes back a pointer handed out by [`Heap::allocate`], making its block
    /// reusable and merging it with the free blocks that follow it.
    ///
    /// Pointers that are not outstanding (released twice, swept at shutdown
    /// or never ours) are ignored without reading them. Returns whether the
    /// block was released.
    pub fn release(&mut self, ptr: NonNull<u8>) -> bool {
        let block = Block::from_payload(ptr);

        if !self.live.untrack(block) {
            return false;
        }

        unsafe { self.free_block(block) };

        true
    }

    /// **SAFETY**: `block` must be an in-use member of the free list that is no
    /// longer tracked as live.
    unsafe fn free_block(&mut self, mut block: NonNull<Block>) {
        unsafe {
            block.as_mut().is_free = true;
            self.free_list.merge_with_next(block);
        }
    }

    /// Usable size of the block behind `ptr`.
    ///
    /// **SAFETY**: `ptr` must be outstanding.
    pub unsafe fn capacity(&self, ptr: NonNull<u8>) -> usize {
        unsafe { Block::from_payload(ptr).as_ref().size }
    }

    /// Grows the allocation behind `ptr` to hold at least `size` bytes. The
    /// same pointer comes back when its block is already big enough. On
    /// failure `ptr` is left untouched.
    ///
    /// **SAFETY**: `ptr` must be outstanding.
    pub unsafe fn resize(&mut self, ptr: NonNull<u8>, size: usize) -> Result<NonNull<u8>, AllocError> {
        let capacity = unsafe { self.capacity(ptr) };

        if capacity >= size {
            return Ok(ptr);
        }

        let new_ptr = self.allocate(size)?;

        unsafe {
            // `capacity < size`, so the whole old content fits.
            ptr::copy_nonoverlapping(ptr.as_ptr(), new_ptr.as_ptr(), capacity);
        }

        self.release(ptr);

        Ok(new_ptr)
    }

    /// Releases every outstanding allocation, returning how many there were.
    /// Regions stay mapped, their blocks just become free.
    pub fn sweep(&mut self) -> usize {
        let mut swept = 0;

        while let Some(block) = self.live.pop() {
            unsafe { self.free_block(block) };
            swept += 1;
        }

        swept
    }

    /// Every block in acquisition order, as `(payload, size, is_free)`.
    #[cfg(test)]
    pub fn blocks(&self) -> Vec<(NonNull<u8>, usize, bool)> {
        self.free_list
            .iter()
            .map(|block| unsafe {
                let header = block.as_ref();
                (Block::payload(block), header.size, header.is_free)
            })
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::{
        alloc::{self, Layout},
        ptr::NonNull,
        sync::atomic::{AtomicUsize, Ordering},
    };

    use crate::kernel::PlatformMemory;

    pub const PAGE: usize = 4096;

    /// Reserves consecutive pages of one big buffer. Every reservation starts
    /// where the previous one ended, so addresses are predictable. By default
    /// the first reservation covers the whole buffer.
    pub struct Slab {
        base: NonNull<u8>,
        len: usize,
        reservation: usize,
        reserved: AtomicUsize,
        committed: AtomicUsize,
    }

    unsafe impl Send for Slab {}

    impl Slab {
        pub fn new(pages: usize) -> Self {
            Self::with_reservation(pages, pages)
        }

        /// A slab that reserves `reservation_pages` at a time.
        pub fn with_reservation(pages: usize, reservation_pages: usize) -> Self {
            let len = pages * PAGE;
            let layout = Layout::from_size_align(len, PAGE).unwrap();
            let base = NonNull::new(unsafe { alloc::alloc(layout) }).unwrap();

            Self {
                base,
                len,
                reservation: reservation_pages * PAGE,
                reserved: AtomicUsize::new(0),
                committed: AtomicUsize::new(0),
            }
        }

        pub fn base(&self) -> NonNull<u8> {
            self.base
        }

        /// Skips `pages` pages so the next reservation is not adjacent.
        pub fn skip(&self, pages: usize) {
            self.reserved.fetch_add(pages * PAGE, Ordering::Relaxed);
        }

        /// Bytes committed so far.
        pub fn mapped(&self) -> usize {
            self.committed.load(Ordering::Relaxed)
        }
    }

    impl Drop for Slab {
        fn drop(&mut self) {
            let layout = Layout::from_size_align(self.len, PAGE).unwrap();
            unsafe { alloc::dealloc(self.base.as_ptr(), layout) };
        }
    }

    unsafe impl PlatformMemory for Slab {
        unsafe fn reserve(&self, len: usize) -> Option<NonNull<u8>> {
            let offset = self.reserved.fetch_add(len, Ordering::Relaxed);

            if offset + len > self.len {
                self.reserved.fetch_sub(len, Ordering::Relaxed);
                return None;
            }

            Some(unsafe { self.base.add(offset) })
        }

        unsafe fn commit(&self, addr: NonNull<u8>, len: usize) -> bool {
            let offset = addr.as_ptr() as usize - self.base.as_ptr() as usize;
            assert!(offset + len <= self.reserved.load(Ordering::Relaxed));

            self.committed.fetch_add(len, Ordering::Relaxed);
            true
        }

        fn page_size(&self) -> usize {
            PAGE
        }

        fn reservation_size(&self) -> usize {
            self.reservation
        }
    }
}
