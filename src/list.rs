use std::{marker::PhantomData, ptr::NonNull};

use crate::block::Block;

/// Non-null pointer to a [`Block`] header.
pub(crate) type Link = Option<NonNull<Block>>;

/// Selects which link field of [`Block`] a [`Chain`] is threaded through.
///
/// The allocator can't allocate its own list nodes, so both of its lists are
/// intrusive: the links live inside the block headers themselves. A single
/// header takes part in two chains at once, one per field.
pub(crate) trait Links {
    /// **SAFETY**: `node` must point to an initialized header.
    unsafe fn next(node: NonNull<Block>) -> Link;

    /// **SAFETY**: `node` must point to an initialized header.
    unsafe fn set_next(node: NonNull<Block>, next: Link);
}

/// Threads blocks through [`Block::next`], in acquisition order.
pub(crate) enum Acquisition {}

/// Threads blocks through [`Block::next_alloc`], live allocations only.
pub(crate) enum Liveness {}

impl Links for Acquisition {
    #[inline]
    unsafe fn next(node: NonNull<Block>) -> Link {
        unsafe { (*node.as_ptr()).next }
    }

    #[inline]
    unsafe fn set_next(node: NonNull<Block>, next: Link) {
        unsafe { (*node.as_ptr()).next = next }
    }
}

impl Links for Liveness {
    #[inline]
    unsafe fn next(node: NonNull<Block>) -> Link {
        unsafe { (*node.as_ptr()).next_alloc }
    }

    #[inline]
    unsafe fn set_next(node: NonNull<Block>, next: Link) {
        unsafe { (*node.as_ptr()).next_alloc = next }
    }
}

/// Intrusive singly linked list of [`Block`] headers.
///
/// ```text
///  head                              tail
///   |                                 |
/// +-v-----+    +-------+    +-------+ |
/// | Block | -> | Block | -> | Block |<+ -> None
/// +-------+    +-------+    +-------+
/// ```
///
/// Every link update of the allocator goes through the methods below, none of
/// them allocates. All of them are `unsafe` because the caller (we, as the
/// allocator) must guarantee that every node handed in points to a valid
/// header that outlives its membership in the chain.
pub(crate) struct Chain<L> {
    head: Link,
    tail: Link,
    len: usize,
    marker: PhantomData<L>,
}

pub(crate) struct Iter<'a, L> {
    current: Link,
    marker: PhantomData<&'a Chain<L>>,
}

impl<L: Links> Chain<L> {
    pub const fn new() -> Self {
        Self {
            head: None,
            tail: None,
            len: 0,
            marker: PhantomData,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[cfg(test)]
    pub fn first(&self) -> Link {
        self.head
    }

    #[inline]
    pub fn last(&self) -> Link {
        self.tail
    }

    /// Links `node` after the current tail.
    pub unsafe fn push_back(&mut self, node: NonNull<Block>) {
        unsafe {
            L::set_next(node, None);

            match self.tail {
                Some(tail) => L::set_next(tail, Some(node)),
                None => self.head = Some(node),
            }
        }

        self.tail = Some(node);
        self.len += 1;
    }

    /// Links `node` before the current head.
    pub unsafe fn push_front(&mut self, node: NonNull<Block>) {
        unsafe { L::set_next(node, self.head) };

        if self.tail.is_none() {
            self.tail = Some(node);
        }

        self.head = Some(node);
        self.len += 1;
    }

    /// Unlinks and returns the head of the chain.
    pub unsafe fn pop_front(&mut self) -> Link {
        let head = self.head?;

        unsafe {
            self.head = L::next(head);
            L::set_next(head, None);
        }

        if self.head.is_none() {
            self.tail = None;
        }

        self.len -= 1;
        Some(head)
    }

    /// Searches the chain for `node` by identity and unlinks it. Returns
    /// `false` without touching `node` when it is not a member.
    pub unsafe fn remove(&mut self, node: NonNull<Block>) -> bool {
        let mut prev: Link = None;
        let mut current = self.head;

        unsafe {
            while let Some(candidate) = current {
                if candidate == node {
                    let next = L::next(node);

                    match prev {
                        Some(prev) => L::set_next(prev, next),
                        None => self.head = next,
                    }

                    if self.tail == Some(node) {
                        self.tail = prev;
                    }

                    L::set_next(node, None);
                    self.len -= 1;

                    return true;
                }

                prev = current;
                current = L::next(candidate);
            }
        }

        false
    }

    /// Unlinks the successor of `node` and returns it. If the successor was
    /// the tail, `node` becomes the new tail.
    pub unsafe fn remove_next(&mut self, node: NonNull<Block>) -> Link {
        unsafe {
            let next = L::next(node)?;

            L::set_next(node, L::next(next));
            L::set_next(next, None);

            if self.tail == Some(next) {
                self.tail = Some(node);
            }

            self.len -= 1;
            Some(next)
        }
    }

    pub fn iter(&self) -> Iter<'_, L> {
        Iter {
            current: self.head,
            marker: PhantomData,
        }
    }
}

impl<'a, L: Links> Iterator for Iter<'a, L> {
    type Item = NonNull<Block>;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.current?;

        // SAFETY: members of a chain are valid headers while borrowed.
        self.current = unsafe { L::next(node) };

        Some(node)
    }
}
