use log::trace;

use crate::{
    arena::{Arena, PageSupplier},
    block::{BlockPtr, DSIZE, WSIZE},
    class::SizeClasses,
    utils::align,
};

/// Segregated list of free [`crate::block::Block`]s.
///
/// There is one doubly linked list per size class. The list heads live in a
/// table of words at the very beginning of the arena, and the links of every
/// member live inside the member itself: a free block doesn't need its payload,
/// so its first two words hold the offsets of its neighbours in the list.
///
/// ```text
///  arena offset 0
///  +-------+-------+-------+-----+
///  | head0 | head1 | head2 | ... |   size class table
///  +---|---+-------+---|---+-----+
///      |               |
///      v               v
///  +--------+      +--------+      +--------+
///  |  Free  | <--> |  Free  | <--> |  Free  |    (class 2 list)
///  +--------+      +--------+      +--------+
/// ```
///
/// Blocks are pushed at the head of their list (LIFO) and lists are never
/// sorted. Because a block is filed under the class of its *current* size,
/// callers must remove a block before changing its size and insert it again
/// afterwards.
pub(crate) struct FreeList {
    classes: SizeClasses,
}

impl FreeList {
    pub const fn new(classes: SizeClasses) -> Self {
        Self { classes }
    }

    #[inline]
    pub fn classes(&self) -> &SizeClasses {
        &self.classes
    }

    /// Bytes taken by the table of list heads, padded to a double word.
    pub fn table_size(&self) -> usize {
        align(self.classes.len() * WSIZE, DSIZE)
    }

    /// Empties every list. The table must already be inside the arena.
    pub fn init<S: PageSupplier>(&self, arena: &mut Arena<S>) {
        for class in 0..self.classes.len() {
            self.set_head(arena, class, None);
        }
    }

    #[inline]
    pub fn head<S: PageSupplier>(&self, arena: &Arena<S>, class: usize) -> Option<BlockPtr> {
        BlockPtr::from_link(arena.get(class * WSIZE))
    }

    #[inline]
    fn set_head<S: PageSupplier>(&self, arena: &mut Arena<S>, class: usize, bp: Option<BlockPtr>) {
        arena.put(class * WSIZE, BlockPtr::to_link(bp));
    }

    /// Pushes `bp` at the head of the list of its class.
    pub fn insert<S: PageSupplier>(&self, arena: &mut Arena<S>, bp: BlockPtr) {
        let class = self.classes.class_of(arena.size(bp));
        let head = self.head(arena, class);

        if let Some(head) = head {
            arena.set_prev_link(head, Some(bp));
        }

        arena.set_prev_link(bp, None);
        arena.set_next_link(bp, head);
        self.set_head(arena, class, Some(bp));

        trace!("free list: inserted {bp} ({} bytes) in class {class}", arena.size(bp));
    }

    /// Unlinks `bp` from the list of its class. It must have been inserted
    /// with its present size.
    pub fn remove<S: PageSupplier>(&self, arena: &mut Arena<S>, bp: BlockPtr) {
        let class = self.classes.class_of(arena.size(bp));
        let next = arena.next_link(bp);
        let prev = arena.prev_link(bp);

        match prev {
            Some(prev) => arena.set_next_link(prev, next),
            None => self.set_head(arena, class, next),
        }

        if let Some(next) = next {
            arena.set_prev_link(next, prev);
        }

        trace!("free list: removed {bp} from class {class}");
    }

    /// First fit search. Starts at the class of `asize` and moves up through
    /// bigger classes until some block is large enough.
    pub fn find_fit<S: PageSupplier>(&self, arena: &Arena<S>, asize: usize) -> Option<BlockPtr> {
        (self.classes.class_of(asize)..self.classes.len())
            .find_map(|class| self.iter(arena, class).find(|bp| arena.size(*bp) >= asize))
    }

    /// Members of the list of `class`, from head to tail.
    pub fn iter<'a, S: PageSupplier>(&self, arena: &'a Arena<S>, class: usize) -> Iter<'a, S> {
        Iter {
            arena,
            current: self.head(arena, class),
        }
    }
}

pub(crate) struct Iter<'a, S> {
    arena: &'a Arena<S>,
    current: Option<BlockPtr>,
}

impl<S: PageSupplier> Iterator for Iter<'_, S> {
    type Item = BlockPtr;

    fn next(&mut self) -> Option<Self::Item> {
        let bp = self.current?;
        self.current = self.arena.next_link(bp);

        Some(bp)
    }
}
