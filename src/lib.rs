//! Segregated free list allocator over a single growable arena.
//!
//! Blocks carry boundary tags (a size + allocated word at both ends), free
//! blocks are filed in power of two size classes through links stored inside
//! their own payload, and every free immediately merges the block with its
//! free neighbours.
//!
//! The heap never hands out raw pointers. Blocks are identified by a
//! [`BlockPtr`], the offset of their payload inside the arena, and their
//! bytes are reached through [`Heap::payload`] and [`Heap::payload_mut`].
//!
//! ```
//! use segalloc::{Config, Heap};
//!
//! let mut heap = Heap::in_memory(Config::default()).unwrap();
//!
//! let bp = heap.allocate(24).unwrap();
//! heap.payload_mut(bp)[..5].copy_from_slice(b"hello");
//!
//! let bp = heap.resize(bp, 4000).unwrap();
//! assert_eq!(&heap.payload(bp)[..5], b"hello");
//!
//! heap.free(bp);
//! heap.check().unwrap();
//! ```

mod arena;
mod block;
mod check;
mod class;
mod config;
mod error;
mod freelist;
mod heap;
mod kernel;
pub mod trace;
mod utils;

pub use arena::{PageSupplier, VecSupplier};
pub use block::{ALIGNMENT, Block, BlockPtr, BlockState, MIN_BLOCK_SIZE, OVERHEAD, Tag};
pub use check::{Blocks, HeapStats};
pub use class::SizeClasses;
pub use config::{Config, DEFAULT_MAX_HEAP};
pub use error::{HeapError, TraceError, Violation};
pub use heap::Heap;
pub use kernel::{MmapSupplier, page_size};
pub use utils::align;
