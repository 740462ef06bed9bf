use std::cmp;

use log::{debug, trace, warn};

use crate::{
    arena::{Arena, PageSupplier, VecSupplier},
    block::{Block, BlockPtr, DSIZE, MIN_BLOCK_SIZE, OVERHEAD, Tag, WSIZE},
    class::SizeClasses,
    config::Config,
    error::HeapError,
    freelist::FreeList,
    kernel::MmapSupplier,
    utils::{align, checked_align},
};

/// Size of the prologue block: just a header and a footer.
pub(crate) const PROLOGUE_SIZE: usize = DSIZE;

/// A boundary tag allocator over a single growable arena.
///
/// The arena looks like this once initialized:
///
/// ```text
/// +-------------+-----+----------+----------+---------+-----+---------+----------+
/// | class table | pad | prologue | prologue | block 1 | ... | block n | epilogue |
/// |  (heads)    |     |  header  |  footer  |         |     |         |  header  |
/// +-------------+-----+----------+----------+---------+-----+---------+----------+
///                      ^ 8/alloc             ^ first payload            ^ 0/alloc
/// ```
///
/// The allocated prologue and the zero sized allocated epilogue mean that
/// every neighbour lookup through boundary tags lands on a real tag, so
/// coalescing never needs to special case the ends of the heap.
///
/// The allocator is single threaded: every operation takes `&mut self`, so
/// sharing a heap between threads needs an external lock.
pub struct Heap<S: PageSupplier> {
    pub(crate) arena: Arena<S>,
    pub(crate) free_list: FreeList,
    pub(crate) prologue: BlockPtr,
    config: Config,
}

impl Heap<VecSupplier> {
    /// Heap backed by an in-memory buffer that can grow up to `config.max_heap`.
    pub fn in_memory(config: Config) -> Result<Self, HeapError> {
        let supplier = VecSupplier::new(config.max_heap);
        Self::new(supplier, config)
    }
}

impl Heap<MmapSupplier> {
    /// Heap backed by address space reserved from the operating system.
    pub fn mapped(config: Config) -> Result<Self, HeapError> {
        config.validate()?;
        let supplier = MmapSupplier::new(config.max_heap)?;
        Self::new(supplier, config)
    }
}

impl<S: PageSupplier> Heap<S> {
    /// Lays out the size class table and the sentinel blocks on an empty
    /// `supplier` and creates the first free block.
    ///
    /// The heap never grows past `config.max_heap`, whatever the supplier
    /// could hand out.
    pub fn new(supplier: S, config: Config) -> Result<Self, HeapError> {
        config.validate()?;

        if !supplier.is_empty() {
            return Err(HeapError::InvalidConfig("page supplier must start empty"));
        }

        let free_list = FreeList::new(SizeClasses::new(config.min_class_size, config.classes));
        let table_size = free_list.table_size();
        let mut arena = Arena::with_limit(supplier, config.max_heap);

        let start = arena.grow(table_size + 4 * WSIZE)?;
        free_list.init(&mut arena);

        let base = start + table_size;
        arena.put(base, 0); // Alignment padding
        arena.put(base + WSIZE, Tag::pack(PROLOGUE_SIZE, true).raw());
        arena.put(base + 2 * WSIZE, Tag::pack(PROLOGUE_SIZE, true).raw());
        arena.put(base + 3 * WSIZE, Tag::pack(0, true).raw());

        let initial_chunk = config.initial_chunk;
        let mut heap = Self {
            arena,
            free_list,
            prologue: BlockPtr::at(base + DSIZE),
            config,
        };

        heap.extend_heap(initial_chunk)?;

        debug!(
            "heap initialized: {} classes, {} bytes",
            heap.config.classes,
            heap.arena.len()
        );

        Ok(heap)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Current size of the arena in bytes.
    pub fn heap_size(&self) -> usize {
        self.arena.len()
    }

    /// Lowest and highest byte offsets currently backing the heap.
    pub fn bounds(&self) -> (usize, usize) {
        self.arena.bounds()
    }

    pub fn size_classes(&self) -> &SizeClasses {
        self.free_list.classes()
    }

    pub fn supplier(&self) -> &S {
        self.arena.supplier()
    }

    pub fn into_supplier(self) -> S {
        self.arena.into_supplier()
    }

    /// Decoded view of the block at `bp`.
    pub fn block(&self, bp: BlockPtr) -> Block {
        self.arena.block(bp)
    }

    /// Bytes the client may use in the block at `bp`. This can be a bit more
    /// than what was requested.
    pub fn usable_size(&self, bp: BlockPtr) -> usize {
        self.arena.size(bp) - OVERHEAD
    }

    /// Client bytes of the allocated block at `bp`.
    pub fn payload(&self, bp: BlockPtr) -> &[u8] {
        self.arena.bytes(bp.offset(), self.usable_size(bp))
    }

    /// Client bytes of the allocated block at `bp`.
    pub fn payload_mut(&mut self, bp: BlockPtr) -> &mut [u8] {
        let len = self.usable_size(bp);
        self.arena.bytes_mut(bp.offset(), len)
    }

    /// Allocates a block with room for at least `size` bytes.
    ///
    /// A zero sized request and an exhausted page supplier both give `None`.
    pub fn allocate(&mut self, size: usize) -> Option<BlockPtr> {
        if size == 0 {
            return None;
        }

        let asize = self.adjusted_size(size)?;

        if let Some(bp) = self.free_list.find_fit(&self.arena, asize) {
            return Some(self.place(bp, asize));
        }

        // No fit found. If the last block is free the new memory will be merged
        // into it, so we only need what it lacks.
        let extend = match self.top_free_size() {
            Some(top) => asize - top,
            None => cmp::max(asize, self.config.chunk_size),
        };

        match self.extend_heap(extend) {
            Ok(bp) => Some(self.place(bp, asize)),
            Err(err) => {
                warn!("allocation of {size} bytes failed: {err}");
                None
            }
        }
    }

    /// Releases the block at `ptr` and merges it with free neighbours.
    /// Freeing `None` does nothing.
    ///
    /// `ptr` must come from this heap and must not have been freed already.
    pub fn free(&mut self, ptr: impl Into<Option<BlockPtr>>) {
        let Some(bp) = ptr.into() else {
            return;
        };

        let size = self.arena.size(bp);
        self.arena.set_tags(bp, size, false);

        self.coalesce(bp);
    }

    /// Changes the size of the block at `ptr`, keeping the first
    /// `min(old, new)` bytes of its payload.
    ///
    /// A `None` pointer behaves as [`Heap::allocate`] and a zero size as
    /// [`Heap::free`]. When no new block can be obtained the old one is left
    /// untouched and `None` is returned.
    pub fn resize(&mut self, ptr: impl Into<Option<BlockPtr>>, size: usize) -> Option<BlockPtr> {
        let ptr = ptr.into();

        if size == 0 {
            self.free(ptr);
            return None;
        }

        let Some(bp) = ptr else {
            return self.allocate(size);
        };

        if self.config.in_place_resize {
            if let Some(bp) = self.resize_in_place(bp, size) {
                return Some(bp);
            }
        }

        let new = self.allocate(size)?;
        let len = cmp::min(self.usable_size(bp), size);
        self.arena.copy_within(bp.offset(), new.offset(), len);
        self.free(bp);

        Some(new)
    }

    /// Block size needed for a `size` bytes request, including the tags and
    /// the alignment padding. `None` if it can never fit in this heap.
    fn adjusted_size(&self, size: usize) -> Option<usize> {
        let asize = if size <= DSIZE {
            MIN_BLOCK_SIZE
        } else {
            checked_align(size.checked_add(OVERHEAD)?, DSIZE)?
        };

        if asize > self.arena.max_size() {
            debug!("request of {size} bytes can never fit in the heap");
            return None;
        }

        Some(asize)
    }

    /// Size of the last block before the epilogue if it is free.
    fn top_free_size(&self) -> Option<usize> {
        let footer = Tag::from_raw(self.arena.get(self.arena.len() - DSIZE));

        (!footer.is_allocated()).then_some(footer.size())
    }

    /// Grows the arena by at least `bytes` and turns the new space into a
    /// free block, coalesced with the previous last block if that one was
    /// free. The old epilogue becomes the header of the new block.
    ///
    /// Asking for less than [`MIN_BLOCK_SIZE`] is only valid when the last
    /// block is free, since the new space can't stand on its own.
    fn extend_heap(&mut self, bytes: usize) -> Result<BlockPtr, HeapError> {
        let size = align(bytes, DSIZE);
        let bp = BlockPtr::at(self.arena.grow(size)?);

        self.arena.set_tags(bp, size, false);
        let epilogue = bp.offset() + size - WSIZE;
        self.arena.put(epilogue, Tag::pack(0, true).raw());

        debug!("heap extended by {size} bytes, break at {}", self.arena.len());

        Ok(self.coalesce(bp))
    }

    /// Marks `asize` bytes of the free block `bp` as allocated, splitting off
    /// the rest as a new free block when it is big enough to be useful.
    ///
    /// Big requests are carved from the high end of the block and small ones
    /// from the low end, which keeps small and big blocks apart.
    fn place(&mut self, bp: BlockPtr, asize: usize) -> BlockPtr {
        let csize = self.arena.size(bp);
        self.free_list.remove(&mut self.arena, bp);

        let remainder = csize - asize;

        if remainder < self.config.min_split_remainder {
            self.arena.set_tags(bp, csize, true);
            trace!("placed {asize} bytes in {bp} without splitting ({csize} bytes)");
            return bp;
        }

        let high = self
            .config
            .high_split_threshold
            .is_some_and(|threshold| asize >= threshold);

        if high {
            self.arena.set_tags(bp, remainder, false);
            self.free_list.insert(&mut self.arena, bp);

            let allocated = self.arena.next_block(bp);
            self.arena.set_tags(allocated, asize, true);
            trace!("placed {asize} bytes at the high end of {bp}, now {allocated}");

            allocated
        } else {
            self.arena.set_tags(bp, asize, true);

            let rest = self.arena.next_block(bp);
            self.arena.set_tags(rest, remainder, false);
            self.free_list.insert(&mut self.arena, rest);
            trace!("placed {asize} bytes at the low end of {bp}, {remainder} bytes left");

            bp
        }
    }

    /// Merges the free block `bp` with its free neighbours and files the
    /// result in the free list. Returns the merged block.
    fn coalesce(&mut self, bp: BlockPtr) -> BlockPtr {
        let prev_allocated = self.arena.prev_footer(bp).is_allocated();
        let next = self.arena.next_block(bp);
        let next_allocated = self.arena.is_allocated(next);

        let mut size = self.arena.size(bp);
        let mut merged = bp;

        match (prev_allocated, next_allocated) {
            (true, true) => {}
            (true, false) => {
                size += self.arena.size(next);
                self.free_list.remove(&mut self.arena, next);
            }
            (false, true) => {
                let prev = self.arena.prev_block(bp);
                size += self.arena.size(prev);
                self.free_list.remove(&mut self.arena, prev);
                merged = prev;
            }
            (false, false) => {
                let prev = self.arena.prev_block(bp);
                size += self.arena.size(prev) + self.arena.size(next);
                self.free_list.remove(&mut self.arena, prev);
                self.free_list.remove(&mut self.arena, next);
                merged = prev;
            }
        }

        if merged != bp || size != self.arena.size(bp) {
            trace!("coalesced {bp} into {merged} ({size} bytes)");
        }

        self.arena.set_tags(merged, size, false);
        self.free_list.insert(&mut self.arena, merged);

        merged
    }

    /// Tries to satisfy a resize without moving the block: shrinking in
    /// place, absorbing a free successor, or growing the heap when the block
    /// is the last one. `None` means the caller has to copy.
    fn resize_in_place(&mut self, bp: BlockPtr, size: usize) -> Option<BlockPtr> {
        let asize = self.adjusted_size(size)?;
        let csize = self.arena.size(bp);

        if asize <= csize {
            if csize - asize >= self.config.min_split_remainder {
                self.arena.set_tags(bp, asize, true);
                let rest = self.arena.next_block(bp);
                self.arena.set_tags(rest, csize - asize, false);
                self.coalesce(rest);
            }
            return Some(bp);
        }

        let mut next = self.arena.next_block(bp);

        // Last block of the heap: the new space will land right after it.
        // It can't merge with `bp`, so it has to hold a whole free block.
        if self.arena.size(next) == 0 {
            next = match self.extend_heap(cmp::max(asize - csize, MIN_BLOCK_SIZE)) {
                Ok(next) => next,
                Err(err) => {
                    warn!("could not grow {bp} in place: {err}");
                    return None;
                }
            };
        }

        if self.arena.is_allocated(next) || csize + self.arena.size(next) < asize {
            return None;
        }

        let total = csize + self.arena.size(next);
        self.free_list.remove(&mut self.arena, next);

        if total - asize >= self.config.min_split_remainder {
            self.arena.set_tags(bp, asize, true);
            let rest = self.arena.next_block(bp);
            self.arena.set_tags(rest, total - asize, false);
            self.free_list.insert(&mut self.arena, rest);
        } else {
            self.arena.set_tags(bp, total, true);
        }

        trace!("resized {bp} in place from {csize} to {asize} bytes");

        Some(bp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::ALIGNMENT;

    fn heap() -> Heap<VecSupplier> {
        Heap::in_memory(Config::default()).unwrap()
    }

    #[test]
    fn zero_size_is_null() {
        let mut heap = heap();

        assert_eq!(heap.allocate(0), None);
        heap.check().unwrap();
    }

    #[test]
    fn basic_alloc() {
        let mut heap = heap();

        let bp = heap.allocate(4).unwrap();
        heap.payload_mut(bp)[..4].copy_from_slice(&23u32.to_ne_bytes());

        assert_eq!(&heap.payload(bp)[..4], &23u32.to_ne_bytes());
        assert!(heap.block(bp).size >= MIN_BLOCK_SIZE);
        assert!(heap.usable_size(bp) >= 4);
    }

    #[test]
    fn payloads_are_aligned_and_disjoint() {
        let mut heap = heap();
        let sizes = [1, 7, 8, 9, 24, 100, 513, 4000, 9000];

        let blocks: Vec<_> = sizes
            .iter()
            .map(|size| (heap.allocate(*size).unwrap(), *size))
            .collect();

        for (i, (bp, size)) in blocks.iter().enumerate() {
            assert_eq!(bp.offset() % ALIGNMENT, 0);
            assert!(heap.usable_size(*bp) >= *size);
            heap.payload_mut(*bp).fill(i as u8);
        }

        for (i, (bp, _)) in blocks.iter().enumerate() {
            assert!(heap.payload(*bp).iter().all(|byte| *byte == i as u8));
        }

        heap.check().unwrap();
    }

    #[test]
    fn space_for_free_block_is_used() {
        let mut heap = heap();

        // Mirrors the scenario: A and B, free A, same request reuses A.
        let a = heap.allocate(24).unwrap();
        let b = heap.allocate(24).unwrap();
        assert_ne!(a, b);

        heap.free(a);
        let c = heap.allocate(24).unwrap();
        assert_eq!(a, c);

        let b_end = b.offset() + heap.block(b).size;
        heap.free(b);
        heap.free(c);

        let stats = heap.check().unwrap();
        assert_eq!(stats.allocated_blocks, 0);
        assert_eq!(stats.free_blocks, 1);

        let block = heap.blocks().next().unwrap();
        assert_eq!(block.ptr, a);
        assert!(block.is_free());
        assert!(block.ptr.offset() + block.size >= b_end);
    }

    #[test]
    fn freed_block_waits_in_its_class() {
        let mut heap = heap();

        let a = heap.allocate(200).unwrap();
        let _guard = heap.allocate(200).unwrap();
        heap.free(a);

        let class = heap.free_list.classes().class_of(heap.block(a).size);
        assert!(heap.free_list.iter(&heap.arena, class).any(|bp| bp == a));
        heap.check().unwrap();
    }

    #[test]
    fn free_null_is_noop() {
        let mut heap = heap();
        let before = heap.stats();

        heap.free(None::<BlockPtr>);

        assert_eq!(heap.stats(), before);
    }

    #[test]
    fn coalesce_all_four_cases() {
        let mut heap = Heap::in_memory(Config {
            high_split_threshold: None,
            ..Config::default()
        })
        .unwrap();

        let blocks: Vec<_> = (0..5).map(|_| heap.allocate(40).unwrap()).collect();
        let size = heap.block(blocks[0]).size;

        // Neither neighbour free.
        heap.free(blocks[1]);
        assert_eq!(heap.block(blocks[1]).size, size);
        heap.check().unwrap();

        // Only the predecessor free.
        heap.free(blocks[2]);
        assert_eq!(heap.block(blocks[1]).size, 2 * size);
        heap.check().unwrap();

        // Only the successor free.
        heap.free(blocks[0]);
        assert_eq!(heap.block(blocks[0]).size, 3 * size);
        heap.check().unwrap();

        heap.free(blocks[3]);
        assert_eq!(heap.block(blocks[0]).size, 4 * size);

        // Both free: blocks[4] is followed by the free rest of the chunk.
        heap.free(blocks[4]);

        let stats = heap.check().unwrap();
        assert_eq!(stats.free_blocks, 1);
        assert_eq!(stats.allocated_blocks, 0);
    }

    #[test]
    fn split_policy() {
        let mut heap = heap();
        let _a = heap.allocate(24).unwrap();
        let _b = heap.allocate(24).unwrap();

        // The rest of the chunk `_b` came from is one free block.
        let chunk = heap.blocks().find(|block| block.is_free()).unwrap();

        // Small requests come from the low end.
        let small = heap.allocate(24).unwrap();
        assert_eq!(small, chunk.ptr);

        // Big ones from the high end of what is left.
        let rest = heap.blocks().find(|block| block.is_free()).unwrap();
        let big = heap.allocate(200).unwrap();
        let big_block = heap.block(big);
        assert_eq!(big.offset() + big_block.size, rest.ptr.offset() + rest.size);

        heap.check().unwrap();
    }

    #[test]
    fn no_split_for_small_remainders() {
        let mut heap = heap();

        // The initial free block is 32 bytes: a 16 byte block would leave 16.
        let bp = heap.allocate(8).unwrap();

        assert_eq!(heap.block(bp).size, 32);
        assert_eq!(heap.check().unwrap().free_blocks, 0);
    }

    #[test]
    fn grows_by_chunk_when_top_is_allocated() {
        let mut heap = heap();
        let _a = heap.allocate(24).unwrap();
        let before = heap.heap_size();

        heap.allocate(24).unwrap();

        assert_eq!(heap.heap_size() - before, heap.config().chunk_size);
    }

    #[test]
    fn grows_by_shortfall_when_top_is_free() {
        let mut heap = heap();
        let _a = heap.allocate(24).unwrap();
        let _b = heap.allocate(24).unwrap();

        let top = heap.blocks().last().unwrap();
        assert!(top.is_free());
        let before = heap.heap_size();

        let big = heap.allocate(top.size + 100).unwrap();
        let grown = heap.heap_size() - before;

        assert_eq!(grown, align(top.size + 100 + OVERHEAD, DSIZE) - top.size);
        assert!(grown < heap.config().chunk_size);
        assert_eq!(big, top.ptr);
        heap.check().unwrap();
    }

    #[test]
    fn exhaustion_returns_null() {
        let mut heap = Heap::in_memory(Config::default().with_max_heap(8192)).unwrap();

        assert_eq!(heap.allocate(1 << 20), None);
        assert_eq!(heap.allocate(usize::MAX), None);

        let mut live = Vec::new();
        while let Some(bp) = heap.allocate(1000) {
            live.push(bp);
        }

        assert!(!live.is_empty());
        assert!(heap.heap_size() <= 8192);
        heap.check().unwrap();

        // Memory freed after exhaustion can be used again.
        heap.free(live.pop());
        assert!(heap.allocate(1000).is_some());
    }

    #[test]
    fn resize_null_and_zero() {
        let mut heap = heap();

        let bp = heap.resize(None::<BlockPtr>, 24).unwrap();
        assert_eq!(heap.block(bp).size, 32);

        assert_eq!(heap.resize(bp, 0), None);
        let stats = heap.check().unwrap();
        assert_eq!(stats.allocated_blocks, 0);

        assert_eq!(heap.resize(None::<BlockPtr>, 0), None);
    }

    #[test]
    fn resize_keeps_prefix() {
        for config in [Config::default(), Config::compact()] {
            let mut heap = Heap::in_memory(config).unwrap();

            let bp = heap.allocate(40).unwrap();
            let _guard = heap.allocate(8).unwrap();
            for (i, byte) in heap.payload_mut(bp)[..40].iter_mut().enumerate() {
                *byte = i as u8;
            }

            let grown = heap.resize(bp, 5000).unwrap();
            let expected: Vec<u8> = (0..40).collect();
            assert_eq!(&heap.payload(grown)[..40], &expected[..]);
            assert!(heap.usable_size(grown) >= 5000);

            let shrunk = heap.resize(grown, 10).unwrap();
            assert_eq!(&heap.payload(shrunk)[..10], &expected[..10]);

            heap.check().unwrap();
        }
    }

    #[test]
    fn copying_resize_moves_and_frees() {
        let mut heap = Heap::in_memory(Config::compact()).unwrap();

        let bp = heap.allocate(24).unwrap();
        let guard = heap.allocate(24).unwrap();
        heap.payload_mut(bp).fill(0xab);

        let moved = heap.resize(bp, 48).unwrap();

        assert_ne!(moved, bp);
        assert!(heap.block(bp).is_free());
        assert!(heap.payload(moved)[..24].iter().all(|byte| *byte == 0xab));
        assert!(!heap.block(guard).is_free());
        heap.check().unwrap();
    }

    #[test]
    fn in_place_resize_absorbs_free_successor() {
        let mut heap = Heap::in_memory(Config {
            high_split_threshold: None,
            ..Config::default()
        })
        .unwrap();

        let bp = heap.allocate(24).unwrap();
        let next = heap.allocate(100).unwrap();
        let _guard = heap.allocate(24).unwrap();
        heap.free(next);

        let grown = heap.resize(bp, 100).unwrap();

        assert_eq!(grown, bp);
        assert!(heap.usable_size(bp) >= 100);
        heap.check().unwrap();
    }

    #[test]
    fn in_place_shrink_releases_tail() {
        let mut heap = heap();

        let bp = heap.allocate(1000).unwrap();
        let before = heap.check().unwrap().free_bytes;

        let shrunk = heap.resize(bp, 100).unwrap();

        assert_eq!(shrunk, bp);
        assert_eq!(heap.block(bp).size, 112);
        assert!(heap.check().unwrap().free_bytes > before);
    }

    #[test]
    fn in_place_resize_extends_top_block() {
        let mut heap = Heap::in_memory(Config {
            chunk_size: 64,
            ..Config::default()
        })
        .unwrap();

        let _a = heap.allocate(24).unwrap();
        let bp = heap.allocate(56).unwrap();
        assert_eq!(heap.arena.next_block(bp).offset(), heap.heap_size());

        let grown = heap.resize(bp, 4000).unwrap();

        assert_eq!(grown, bp);
        assert!(heap.usable_size(bp) >= 4000);
        heap.check().unwrap();
    }

    #[test]
    fn in_place_resize_grows_top_block_by_one_word() {
        let mut heap = Heap::in_memory(Config {
            chunk_size: 64,
            ..Config::default()
        })
        .unwrap();

        let _a = heap.allocate(24).unwrap();
        let bp = heap.allocate(56).unwrap();
        let before = heap.heap_size();

        assert_eq!(heap.resize(bp, 64), Some(bp));
        assert_eq!(heap.heap_size(), before + MIN_BLOCK_SIZE);
        assert_eq!(heap.block(bp).size, 64 + MIN_BLOCK_SIZE);
        heap.check().unwrap();
    }

    #[test]
    fn failed_resize_keeps_old_block() {
        let mut heap = Heap::in_memory(Config::compact().with_max_heap(4096)).unwrap();

        let bp = heap.allocate(100).unwrap();
        heap.payload_mut(bp).fill(7);

        assert_eq!(heap.resize(bp, 1 << 20), None);
        assert!(!heap.block(bp).is_free());
        assert!(heap.payload(bp).iter().all(|byte| *byte == 7));
        heap.check().unwrap();
    }

    #[test]
    fn rejects_used_supplier() {
        let mut supplier = VecSupplier::new(1024);
        supplier.sbrk(8).unwrap();

        assert!(matches!(
            Heap::new(supplier, Config::default()),
            Err(HeapError::InvalidConfig(_))
        ));
    }

    #[test]
    fn init_fails_when_supplier_is_too_small() {
        assert!(matches!(
            Heap::in_memory(Config::default().with_max_heap(64)),
            Err(HeapError::Exhausted { .. })
        ));
    }

    #[test]
    fn tiny_initial_chunk_is_rejected() {
        for initial_chunk in [1, 8, MIN_BLOCK_SIZE - 1] {
            let config = Config {
                initial_chunk,
                ..Config::default()
            };

            assert!(matches!(Heap::in_memory(config), Err(HeapError::InvalidConfig(_))));
        }

        let config = Config {
            initial_chunk: MIN_BLOCK_SIZE,
            ..Config::default()
        };
        let mut heap = Heap::in_memory(config).unwrap();
        heap.check().unwrap();
        assert!(heap.allocate(24).is_some());
        heap.check().unwrap();
    }

    #[test]
    fn max_heap_caps_a_bigger_supplier() {
        let config = Config {
            chunk_size: 512,
            ..Config::default().with_max_heap(4096)
        };
        let mut heap = Heap::new(VecSupplier::new(1 << 20), config).unwrap();

        assert_eq!(heap.allocate(8192), None);
        assert_eq!(heap.allocate(1 << 19), None);

        let mut blocks = Vec::new();
        while let Some(bp) = heap.allocate(256) {
            blocks.push(bp);
        }

        assert!(blocks.len() > 4);
        assert!(heap.heap_size() <= 4096);
        heap.check().unwrap();
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn mapped_validates_before_reserving() {
        assert!(matches!(
            Heap::mapped(Config::default().with_max_heap(usize::MAX)),
            Err(HeapError::InvalidConfig(_))
        ));
    }

    #[test]
    fn mapped_heap() {
        let mut heap = Heap::mapped(Config::default().with_max_heap(1 << 20)).unwrap();

        let bp = heap.allocate(4096).unwrap();
        heap.payload_mut(bp).fill(1);

        let base = heap.supplier().base().as_ptr() as usize;
        assert_eq!((base + bp.offset()) % ALIGNMENT, 0);

        heap.free(bp);
        heap.check().unwrap();
    }
}
