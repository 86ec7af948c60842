use std::ptr::NonNull;

use crate::{
    block::Block,
    list::{Chain, Liveness},
};

/// Blocks currently handed out to callers, newest first.
///
/// Nothing on the allocation path reads this list. It only exists so the
/// shutdown sweep can find every outstanding block, and so [`crate::MemAlloc`]
/// can tell a live pointer from one it already took back.
pub(crate) struct LiveAllocations {
    blocks: Chain<Liveness>,
}

impl LiveAllocations {
    pub const fn new() -> Self {
        Self {
            blocks: Chain::new(),
        }
    }

    /// Number of outstanding allocations.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Records `block` as handed out.
    ///
    /// **SAFETY**: `block` must be an initialized header that is not tracked yet.
    pub unsafe fn track(&mut self, block: NonNull<Block>) {
        unsafe { self.blocks.push_front(block) }
    }

    /// Stops tracking `block`. Returns `false` if it was not tracked, in which
    /// case `block` is never dereferenced.
    pub fn untrack(&mut self, block: NonNull<Block>) -> bool {
        // SAFETY: `remove` only dereferences members of the chain, which are
        // valid headers, and compares `block` by address.
        unsafe { self.blocks.remove(block) }
    }

    /// Untracks and returns the most recent outstanding allocation.
    pub fn pop(&mut self) -> Option<NonNull<Block>> {
        // SAFETY: members of the chain are valid headers.
        unsafe { self.blocks.pop_front() }
    }
}
