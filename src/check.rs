//! Heap consistency checker.
//!
//! Nothing in here runs on the allocation path. It is meant to be called from
//! tests and debugging sessions, after any operation, to make sure the heap
//! still holds together.

use std::collections::HashSet;

use log::error;

use crate::{
    arena::PageSupplier,
    block::{ALIGNMENT, Block, BlockPtr, MIN_BLOCK_SIZE, Tag, WSIZE},
    error::Violation,
    heap::{Heap, PROLOGUE_SIZE},
};

/// Summary of a heap walk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeapStats {
    /// Bytes obtained from the page supplier, metadata included.
    pub heap_size: usize,
    pub allocated_blocks: usize,
    /// Sum of allocated block sizes, boundary tags included.
    pub allocated_bytes: usize,
    pub free_blocks: usize,
    pub free_bytes: usize,
    pub largest_free: usize,
}

impl HeapStats {
    fn record(&mut self, block: &Block) {
        if block.is_free() {
            self.free_blocks += 1;
            self.free_bytes += block.size;
            self.largest_free = self.largest_free.max(block.size);
        } else {
            self.allocated_blocks += 1;
            self.allocated_bytes += block.size;
        }
    }
}

/// Blocks of a heap in address order, prologue and epilogue excluded.
pub struct Blocks<'a, S: PageSupplier> {
    heap: &'a Heap<S>,
    current: BlockPtr,
}

impl<S: PageSupplier> Iterator for Blocks<'_, S> {
    type Item = Block;

    fn next(&mut self) -> Option<Self::Item> {
        if self.heap.arena.size(self.current) == 0 {
            return None;
        }

        let block = self.heap.arena.block(self.current);
        self.current = self.heap.arena.next_block(self.current);

        Some(block)
    }
}

impl<S: PageSupplier> Heap<S> {
    /// Every block between the prologue and the epilogue.
    pub fn blocks(&self) -> Blocks<'_, S> {
        Blocks {
            heap: self,
            current: self.arena.next_block(self.prologue),
        }
    }

    /// Walks the heap without verifying anything.
    pub fn stats(&self) -> HeapStats {
        let mut stats = HeapStats {
            heap_size: self.heap_size(),
            ..HeapStats::default()
        };

        for block in self.blocks() {
            stats.record(&block);
        }

        stats
    }

    /// Verifies every heap invariant and returns the first one that is broken.
    ///
    /// The heap walk checks that:
    /// - the prologue and epilogue sentinels are intact and the epilogue ends
    ///   the arena,
    /// - every block is aligned, big enough and inside the arena,
    /// - header and footer of every block agree,
    /// - no two free blocks are adjacent.
    ///
    /// The free list walk checks that every linked block is a free block of
    /// the heap filed under the right class with a consistent back link, and
    /// that every free block is linked exactly once. Together they make sure
    /// no allocated payload is ever reachable through a free list link.
    pub fn check(&self) -> Result<HeapStats, Violation> {
        self.verify().inspect_err(|violation| error!("heap check failed: {violation}"))
    }

    fn verify(&self) -> Result<HeapStats, Violation> {
        let (lo, hi) = self.arena.bounds();
        let len = self.arena.len();
        let mut stats = HeapStats {
            heap_size: len,
            ..HeapStats::default()
        };

        let header = self.arena.header(self.prologue);
        let footer = self.arena.footer(self.prologue);
        let prologue = Tag::pack(PROLOGUE_SIZE, true);

        if header != prologue || footer != prologue {
            return Err(Violation::BadPrologue {
                header: header.raw(),
                footer: footer.raw(),
            });
        }

        let mut starts = HashSet::new();
        let mut free = HashSet::new();
        let mut prev_free: Option<BlockPtr> = None;
        let mut bp = self.arena.next_block(self.prologue);

        loop {
            let header = self.arena.header(bp);
            let size = header.size();

            if size == 0 {
                let offset = bp.offset() - WSIZE;

                if !header.is_allocated() || offset + WSIZE != len {
                    return Err(Violation::BadEpilogue {
                        offset,
                        tag: header.raw(),
                    });
                }

                break;
            }

            if bp.offset() % ALIGNMENT != 0 || size < MIN_BLOCK_SIZE {
                return Err(Violation::Misaligned {
                    block: bp.offset(),
                    size,
                });
            }

            // The footer and the next header must both fit before the break.
            if bp.offset() + size > len {
                return Err(Violation::OutOfBounds {
                    block: bp.offset(),
                    lo,
                    hi,
                });
            }

            let footer = self.arena.footer(bp);

            if header != footer {
                return Err(Violation::HeaderFooterMismatch {
                    block: bp.offset(),
                    header: header.raw(),
                    footer: footer.raw(),
                });
            }

            let block = self.arena.block(bp);

            if block.is_free() {
                if let Some(prev) = prev_free {
                    return Err(Violation::UncoalescedNeighbors {
                        block: prev.offset(),
                        next: bp.offset(),
                    });
                }

                free.insert(bp);
                prev_free = Some(bp);
            } else {
                prev_free = None;
            }

            starts.insert(bp);
            stats.record(&block);
            bp = self.arena.next_block(bp);
        }

        let classes = self.free_list.classes();
        let mut linked = HashSet::new();

        for class in 0..classes.len() {
            let mut prev = None;
            let mut cursor = self.free_list.head(&self.arena, class);

            // Links are only followed once the block holding them is known
            // to be a real free block.
            while let Some(bp) = cursor {
                if bp.offset() < lo || bp.offset() > hi {
                    return Err(Violation::OutOfBounds {
                        block: bp.offset(),
                        lo,
                        hi,
                    });
                }

                if !starts.contains(&bp) {
                    return Err(Violation::NotABlock {
                        class,
                        block: bp.offset(),
                    });
                }

                if !free.contains(&bp) {
                    return Err(Violation::AllocatedInFreeList {
                        class,
                        block: bp.offset(),
                    });
                }

                // Seeing a block twice means the list loops back on itself
                // (or the block sits in two lists).
                if !linked.insert(bp) {
                    return Err(Violation::CycleInFreeList { class });
                }

                let size = self.arena.size(bp);
                let expected = classes.class_of(size);

                if expected != class {
                    return Err(Violation::WrongClass {
                        block: bp.offset(),
                        size,
                        found: class,
                        expected,
                    });
                }

                if self.arena.prev_link(bp) != prev {
                    return Err(Violation::BrokenBackLink {
                        class,
                        block: bp.offset(),
                    });
                }

                prev = Some(bp);
                cursor = self.arena.next_link(bp);
            }
        }

        if let Some(bp) = free.difference(&linked).min() {
            return Err(Violation::UnlistedFreeBlock { block: bp.offset() });
        }

        Ok(stats)
    }
}
