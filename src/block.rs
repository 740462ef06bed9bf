use std::fmt;

use crate::arena::{Arena, PageSupplier};

/// Word size. Boundary tags and free list links are one word each.
pub const WSIZE: usize = 4;

/// Double word size. Header plus footer, and also the payload alignment.
pub const DSIZE: usize = 8;

/// Every payload offset and every block size is a multiple of this.
pub const ALIGNMENT: usize = DSIZE;

/// Bytes each block spends on its own boundary tags.
pub const OVERHEAD: usize = DSIZE;

/// A free block must fit its header, footer and both free list links.
pub const MIN_BLOCK_SIZE: usize = 2 * DSIZE;

const ALLOCATED_BIT: u32 = 0x1;
const SIZE_MASK: u32 = !0x7;

/// A boundary tag: block size and allocated flag packed in one word.
///
/// Sizes are always multiples of [`ALIGNMENT`], which leaves the three low bits
/// free. The lowest one is the allocated flag.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Tag(u32);

impl Tag {
    #[inline]
    pub const fn pack(size: usize, allocated: bool) -> Self {
        Self(size as u32 | allocated as u32)
    }

    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn size(self) -> usize {
        (self.0 & SIZE_MASK) as usize
    }

    #[inline]
    pub const fn is_allocated(self) -> bool {
        self.0 & ALLOCATED_BIT != 0
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tag")
            .field("size", &self.size())
            .field("allocated", &self.is_allocated())
            .finish()
    }
}

/// Handle to a block: the arena offset of its payload.
///
/// This is what the allocator gives to its clients instead of a raw pointer.
/// Offset `0` is never a payload (the size class table lives there), so it
/// doubles as the "null" link inside free blocks.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockPtr(u32);

impl BlockPtr {
    /// Offsets are guaranteed to fit in 32 bits by [`crate::Config::validate`].
    #[inline]
    pub(crate) const fn at(offset: usize) -> Self {
        debug_assert!(offset != 0 && offset <= u32::MAX as usize);
        Self(offset as u32)
    }

    #[inline]
    pub(crate) fn from_link(word: u32) -> Option<Self> {
        (word != 0).then_some(Self(word))
    }

    #[inline]
    pub(crate) fn to_link(ptr: Option<Self>) -> u32 {
        ptr.map_or(0, |ptr| ptr.0)
    }

    /// Offset of the payload inside the arena.
    #[inline]
    pub const fn offset(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for BlockPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockPtr({})", self.0)
    }
}

impl fmt::Display for BlockPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a block currently is. Free blocks reuse the first two words of
/// their payload as links of their size class list; allocated blocks don't
/// carry anything besides their tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
    Allocated,
    Free {
        next: Option<BlockPtr>,
        prev: Option<BlockPtr>,
    },
}

/// Decoded view of a block.
///
/// ```text
///            +---------------------+ <-- bp - WSIZE
///            |  size | allocated   |     header
///  bp -----> +---------------------+
///            |   next free (u32)   |     only while free
///            +---------------------+
///            |   prev free (u32)   |     only while free
///            +---------------------+
///            |         ...         |     payload
///            +---------------------+ <-- bp + size - DSIZE
///            |  size | allocated   |     footer
///            +---------------------+ <-- bp + size - WSIZE (next header)
/// ```
///
/// The header and footer always agree. Because the footer of a block sits
/// right before the header of the next one, both neighbours can be reached
/// in constant time from any block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    pub ptr: BlockPtr,
    pub size: usize,
    pub state: BlockState,
}

impl Block {
    #[inline]
    pub fn is_free(&self) -> bool {
        matches!(self.state, BlockState::Free { .. })
    }

    /// Bytes usable by the client.
    #[inline]
    pub fn payload_size(&self) -> usize {
        self.size - OVERHEAD
    }
}

/// Offset arithmetic over boundary tags. No validation happens here, callers
/// are expected to only pass offsets of real blocks.
impl<S: PageSupplier> Arena<S> {
    #[inline]
    pub fn header(&self, bp: BlockPtr) -> Tag {
        Tag::from_raw(self.get(bp.offset() - WSIZE))
    }

    #[inline]
    pub fn footer(&self, bp: BlockPtr) -> Tag {
        Tag::from_raw(self.get(self.footer_offset(bp)))
    }

    #[inline]
    pub fn footer_offset(&self, bp: BlockPtr) -> usize {
        bp.offset() + self.header(bp).size() - DSIZE
    }

    #[inline]
    pub fn size(&self, bp: BlockPtr) -> usize {
        self.header(bp).size()
    }

    #[inline]
    pub fn is_allocated(&self, bp: BlockPtr) -> bool {
        self.header(bp).is_allocated()
    }

    /// Writes both boundary tags of `bp`. The footer position is derived from
    /// the new size, so this is also how blocks are resized.
    #[inline]
    pub fn set_tags(&mut self, bp: BlockPtr, size: usize, allocated: bool) {
        let tag = Tag::pack(size, allocated).raw();
        self.put(bp.offset() - WSIZE, tag);
        self.put(bp.offset() + size - DSIZE, tag);
    }

    /// Block right after `bp` in address order.
    #[inline]
    pub fn next_block(&self, bp: BlockPtr) -> BlockPtr {
        BlockPtr::at(bp.offset() + self.size(bp))
    }

    /// Block right before `bp` in address order, found through its footer.
    #[inline]
    pub fn prev_block(&self, bp: BlockPtr) -> BlockPtr {
        let prev_size = Tag::from_raw(self.get(bp.offset() - DSIZE)).size();
        BlockPtr::at(bp.offset() - prev_size)
    }

    /// Tag of the block right before `bp`, read from its footer.
    #[inline]
    pub fn prev_footer(&self, bp: BlockPtr) -> Tag {
        Tag::from_raw(self.get(bp.offset() - DSIZE))
    }

    #[inline]
    pub fn next_link(&self, bp: BlockPtr) -> Option<BlockPtr> {
        BlockPtr::from_link(self.get(bp.offset()))
    }

    #[inline]
    pub fn prev_link(&self, bp: BlockPtr) -> Option<BlockPtr> {
        BlockPtr::from_link(self.get(bp.offset() + WSIZE))
    }

    #[inline]
    pub fn set_next_link(&mut self, bp: BlockPtr, next: Option<BlockPtr>) {
        self.put(bp.offset(), BlockPtr::to_link(next));
    }

    #[inline]
    pub fn set_prev_link(&mut self, bp: BlockPtr, prev: Option<BlockPtr>) {
        self.put(bp.offset() + WSIZE, BlockPtr::to_link(prev));
    }

    /// Decodes the block at `bp`.
    pub fn block(&self, bp: BlockPtr) -> Block {
        let header = self.header(bp);

        let state = if header.is_allocated() {
            BlockState::Allocated
        } else {
            BlockState::Free {
                next: self.next_link(bp),
                prev: self.prev_link(bp),
            }
        };

        Block {
            ptr: bp,
            size: header.size(),
            state,
        }
    }
}
