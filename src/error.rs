use std::io;

use thiserror::Error;

/// Errors raised while setting up or growing a heap.
///
/// None of these are fatal to an already running [`crate::Heap`]: exhaustion is
/// turned into a `None` allocation result by the public surface.
#[derive(Debug, Error)]
pub enum HeapError {
    #[error("invalid allocator configuration: {0}")]
    InvalidConfig(&'static str),

    #[error("page supplier exhausted: requested {requested} bytes, {available} available")]
    Exhausted { requested: usize, available: usize },

    #[error("could not reserve {size} bytes of address space")]
    Reserve {
        size: usize,
        #[source]
        source: io::Error,
    },
}

/// A broken heap invariant found by [`crate::Heap::check`].
///
/// Every variant carries the arena offset of the offending block so it can be
/// matched against the pointers handed out to the client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Violation {
    #[error("prologue block is damaged (header {header:#x}, footer {footer:#x})")]
    BadPrologue { header: u32, footer: u32 },

    #[error("epilogue at offset {offset} is not a zero sized allocated block ({tag:#x})")]
    BadEpilogue { offset: usize, tag: u32 },

    #[error("block {block}: header {header:#x} does not match footer {footer:#x}")]
    HeaderFooterMismatch { block: usize, header: u32, footer: u32 },

    #[error("block {block} lies outside of the heap [{lo}, {hi}]")]
    OutOfBounds { block: usize, lo: usize, hi: usize },

    #[error("block {block} is not aligned or is too small ({size} bytes)")]
    Misaligned { block: usize, size: usize },

    #[error("free blocks {block} and {next} are adjacent but were not coalesced")]
    UncoalescedNeighbors { block: usize, next: usize },

    #[error("free list {class} links block {block} which is marked allocated")]
    AllocatedInFreeList { class: usize, block: usize },

    #[error("free list {class} links offset {block} which does not start a block")]
    NotABlock { class: usize, block: usize },

    #[error("block {block} of size {size} is linked in class {found}, expected {expected}")]
    WrongClass {
        block: usize,
        size: usize,
        found: usize,
        expected: usize,
    },

    #[error("block {block} in free list {class} has a broken back link")]
    BrokenBackLink { class: usize, block: usize },

    #[error("free block {block} is not linked in any free list")]
    UnlistedFreeBlock { block: usize },

    #[error("free list {class} never terminates")]
    CycleInFreeList { class: usize },
}

/// Errors produced while parsing or replaying a workload trace.
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("op {op}: allocation of {size} bytes failed")]
    AllocationFailed { op: usize, size: usize },

    #[error("op {op}: id {id} is not live")]
    UnknownId { op: usize, id: usize },

    #[error("op {op}: payload at {offset} is not aligned")]
    Misaligned { op: usize, offset: usize },

    #[error("op {op}: payload of id {id} overlaps the one of id {other}")]
    Overlap { op: usize, id: usize, other: usize },

    #[error("op {op}: payload of id {id} was corrupted at byte {index}")]
    Corrupted { op: usize, id: usize, index: usize },

    #[error("op {op}: {source}")]
    Heap {
        op: usize,
        #[source]
        source: Violation,
    },
}
