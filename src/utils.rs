//! This file contains all the helper functions for the allocator.
//! This are functions that don't particularly belong to any concrete module of the program.

/// It aligns `to_be_aligned` up to the next multiple of `alignment`.
///
/// `alignment` must be a power of two. This is used both to round block sizes to
/// [`crate::block::ALIGNMENT`] and to round address space reservations to the
/// computer's page size.
#[inline]
pub const fn align(to_be_aligned: usize, alignment: usize) -> usize {
    (to_be_aligned + alignment - 1) & !(alignment - 1)
}

/// Same as [`align`] but returns `None` instead of wrapping around on huge
/// inputs. Client request sizes go through this one.
#[inline]
pub fn checked_align(to_be_aligned: usize, alignment: usize) -> Option<usize> {
    Some(to_be_aligned.checked_add(alignment - 1)? & !(alignment - 1))
}
