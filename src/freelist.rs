use std::ptr::NonNull;

use crate::{
    block::{BLOCK_HEADER_SIZE, Block},
    list::{Acquisition, Chain, Link, Links},
};

/// Chain of every [`Block`] the allocator ever mapped, free or not, ordered by
/// acquisition time.
///
/// ```text
///  first                                               last
///    |                                                   |
/// +--v----------+    +-------------+    +-------------+  |
/// | Block(free) | -> | Block(used) | -> | Block(free) |<-+
/// +-------------+    +-------------+    +-------------+
/// ```
///
/// Free blocks are identified by [`Block::is_free`], they stay in place so
/// the chain never reorders. New blocks are only ever appended at the tail and
/// entries only disappear when a free block absorbs its successor.
pub(crate) struct FreeList {
    blocks: Chain<Acquisition>,
}

impl FreeList {
    /// Creates a new empty FreeList.
    pub const fn new() -> Self {
        Self {
            blocks: Chain::new(),
        }
    }

    /// Number of blocks in the list, free or not.
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Most recently mapped block that was not absorbed by a predecessor.
    pub fn last(&self) -> Link {
        self.blocks.last()
    }

    #[cfg(test)]
    pub fn iter(&self) -> impl Iterator<Item = NonNull<Block>> + '_ {
        self.blocks.iter()
    }

    /// Returns a pointer to a free [`Block`] that can hold `size` bytes.
    ///
    /// This uses the first-fit algorithm, it returns the first free block on
    /// the list that is big enough, however much bigger than `size` it is.
    pub fn find_free_block(&self, size: usize) -> Link {
        self.blocks.iter().find(|block| unsafe {
            let block = block.as_ref();
            block.is_free && block.size >= size
        })
    }

    /// Appends a freshly mapped `block` at the tail.
    ///
    /// **SAFETY**: `block` must be an initialized header not yet in the list.
    pub unsafe fn append(&mut self, block: NonNull<Block>) {
        unsafe { self.blocks.push_back(block) }
    }

    /// Merges the free `block` with every following free block, returning how
    /// many were absorbed.
    ///
    /// Only successors are considered: a free predecessor won't absorb `block`
    /// until the predecessor itself goes through this method again. Merging
    /// also stops at the first successor that doesn't start exactly where
    /// `block`'s content ends, since blocks come from separate mappings.
    ///
    /// **SAFETY**: `block` must be a member of this list.
    pub unsafe fn merge_with_next(&mut self, mut block: NonNull<Block>) -> usize {
        let mut merged = 0;

        unsafe {
            while let Some(next) = Acquisition::next(block) {
                let next_block = next.as_ref();

                if !next_block.is_free || Block::end(block) != next.as_ptr() as usize {
                    break;
                }

                let absorbed = BLOCK_HEADER_SIZE + next_block.size;

                self.blocks.remove_next(block);
                block.as_mut().size += absorbed;
                merged += 1;
            }
        }

        merged
    }
}
