use std::{mem, slice};

use crate::{block::WSIZE, error::HeapError};

/// The external collaborator that backs the heap with memory.
///
/// It behaves like the classic `sbrk` interface: a single contiguous range of
/// bytes starting at offset `0` that only ever grows at its high end. The
/// allocator never asks for memory back.
///
/// Implementations must hand out zeroed or at least initialized bytes and keep
/// the start of the range aligned to [`crate::block::ALIGNMENT`], so that
/// aligned offsets are aligned addresses too.
pub trait PageSupplier {
    /// Extends the range by `incr` bytes and returns the previous break, which
    /// is the offset of the first new byte.
    fn sbrk(&mut self, incr: usize) -> Result<usize, HeapError>;

    /// Current break (number of usable bytes).
    fn len(&self) -> usize;

    /// Largest break this supplier can reach.
    fn max_size(&self) -> usize;

    /// Every byte below the current break.
    fn bytes(&self) -> &[u8];

    /// Every byte below the current break.
    fn bytes_mut(&mut self) -> &mut [u8];

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory page supplier. Memory comes from a growable vector of words so
/// its start is always aligned to 8 bytes.
///
/// The vector may move while growing, which is fine because the heap only
/// speaks in offsets.
#[derive(Debug, Default)]
pub struct VecSupplier {
    words: Vec<u64>,
    brk: usize,
    max_size: usize,
}

impl VecSupplier {
    pub fn new(max_size: usize) -> Self {
        Self {
            words: Vec::new(),
            brk: 0,
            max_size,
        }
    }
}

impl PageSupplier for VecSupplier {
    fn sbrk(&mut self, incr: usize) -> Result<usize, HeapError> {
        let available = self.max_size - self.brk;

        if incr > available {
            return Err(HeapError::Exhausted {
                requested: incr,
                available,
            });
        }

        let old_brk = self.brk;
        self.brk += incr;
        self.words
            .resize(self.brk.div_ceil(mem::size_of::<u64>()), 0);

        Ok(old_brk)
    }

    fn len(&self) -> usize {
        self.brk
    }

    fn max_size(&self) -> usize {
        self.max_size
    }

    fn bytes(&self) -> &[u8] {
        // SAFETY: `words` holds at least `brk` initialized bytes and `u8` has
        // no alignment requirement.
        unsafe { slice::from_raw_parts(self.words.as_ptr().cast::<u8>(), self.brk) }
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        // SAFETY: same as `bytes`, and we hold the only borrow of `words`.
        unsafe { slice::from_raw_parts_mut(self.words.as_mut_ptr().cast::<u8>(), self.brk) }
    }
}

/// The heap region as the allocator sees it: a byte range addressed by
/// offsets, read and written one 32 bit word at a time.
///
/// All accesses are bounds checked by slice indexing, so a corrupted tag turns
/// into a panic instead of a stray write.
pub(crate) struct Arena<S> {
    supplier: S,
    limit: usize,
}

impl<S: PageSupplier> Arena<S> {
    pub fn new(supplier: S) -> Self {
        let limit = supplier.max_size();
        Self { supplier, limit }
    }

    /// Arena that never grows past `limit` bytes, even if the supplier could.
    pub fn with_limit(supplier: S, limit: usize) -> Self {
        let limit = limit.min(supplier.max_size());
        Self { supplier, limit }
    }

    /// Reads the word at `offset`.
    #[inline]
    pub fn get(&self, offset: usize) -> u32 {
        let mut word = [0; WSIZE];
        word.copy_from_slice(&self.supplier.bytes()[offset..offset + WSIZE]);
        u32::from_ne_bytes(word)
    }

    /// Writes `value` at `offset`.
    #[inline]
    pub fn put(&mut self, offset: usize, value: u32) {
        self.supplier.bytes_mut()[offset..offset + WSIZE].copy_from_slice(&value.to_ne_bytes());
    }

    /// Appends `incr` bytes to the arena and returns the offset where they start.
    pub fn grow(&mut self, incr: usize) -> Result<usize, HeapError> {
        let available = self.limit.saturating_sub(self.supplier.len());

        if incr > available {
            return Err(HeapError::Exhausted {
                requested: incr,
                available,
            });
        }

        self.supplier.sbrk(incr)
    }

    /// First and last valid byte offsets. Only meaningful once the arena
    /// holds something.
    pub fn bounds(&self) -> (usize, usize) {
        (0, self.supplier.len().saturating_sub(1))
    }

    /// Current break.
    #[inline]
    pub fn len(&self) -> usize {
        self.supplier.len()
    }

    /// Largest size the arena may reach.
    pub fn max_size(&self) -> usize {
        self.limit
    }

    pub fn bytes(&self, offset: usize, len: usize) -> &[u8] {
        &self.supplier.bytes()[offset..offset + len]
    }

    pub fn bytes_mut(&mut self, offset: usize, len: usize) -> &mut [u8] {
        &mut self.supplier.bytes_mut()[offset..offset + len]
    }

    /// Copies `len` bytes from `src` to `dst`. The ranges may overlap.
    pub fn copy_within(&mut self, src: usize, dst: usize, len: usize) {
        self.supplier.bytes_mut().copy_within(src..src + len, dst);
    }

    pub fn supplier(&self) -> &S {
        &self.supplier
    }

    pub fn into_supplier(self) -> S {
        self.supplier
    }
}
