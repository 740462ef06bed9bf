use crate::{
    block::{ALIGNMENT, MIN_BLOCK_SIZE},
    error::HeapError,
};

/// Largest heap the default configuration lets the page supplier grow to (20 MiB).
pub const DEFAULT_MAX_HEAP: usize = 20 * (1 << 20);

/// Policy knobs of the allocator.
///
/// There are two presets. [`Config::default`] is the segregated-fit policy with
/// many wide classes and large heap extensions. [`Config::compact`] is the
/// simpler variant: fewer narrower classes, small extensions, always split at
/// the low end and never resize in place.
///
/// Every field is public so tests and benchmarks can build their own policy, but
/// the combination must pass [`Config::validate`] before a [`crate::Heap`]
/// accepts it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Upper bound (inclusive) of the first size class.
    pub min_class_size: usize,
    /// Number of size classes. The last one is open ended.
    pub classes: usize,
    /// Default amount the heap grows by when no free block fits.
    pub chunk_size: usize,
    /// Size of the free block created by [`crate::Heap::new`].
    pub initial_chunk: usize,
    /// Requests of at least this block size are carved from the high end of a
    /// split block. `None` always places at the low end.
    pub high_split_threshold: Option<usize>,
    /// Smallest leftover worth turning into a free block when splitting.
    pub min_split_remainder: usize,
    /// Let [`crate::Heap::resize`] shrink and grow blocks without copying.
    pub in_place_resize: bool,
    /// Largest size the arena may reach.
    pub max_heap: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            min_class_size: 128,
            classes: 26,
            chunk_size: 1 << 12,
            initial_chunk: 1 << 5,
            high_split_threshold: Some(80),
            min_split_remainder: 2 * MIN_BLOCK_SIZE,
            in_place_resize: true,
            max_heap: DEFAULT_MAX_HEAP,
        }
    }
}

impl Config {
    /// The simpler segregated list policy.
    pub fn compact() -> Self {
        Self {
            min_class_size: 32,
            classes: 20,
            chunk_size: 1 << 7,
            initial_chunk: 1 << 7,
            high_split_threshold: None,
            min_split_remainder: MIN_BLOCK_SIZE,
            in_place_resize: false,
            max_heap: DEFAULT_MAX_HEAP,
        }
    }

    pub fn with_max_heap(mut self, max_heap: usize) -> Self {
        self.max_heap = max_heap;
        self
    }

    /// Checks that the policy can actually be encoded in the heap.
    pub fn validate(&self) -> Result<(), HeapError> {
        if self.classes == 0 {
            return Err(HeapError::InvalidConfig("at least one size class is required"));
        }

        if self.min_class_size == 0 || self.min_class_size % ALIGNMENT != 0 {
            return Err(HeapError::InvalidConfig(
                "first class threshold must be a non zero multiple of the alignment",
            ));
        }

        if self.chunk_size == 0 || self.initial_chunk == 0 {
            return Err(HeapError::InvalidConfig("heap extensions must not be empty"));
        }

        // The first chunk becomes a free block of its own.
        if self.initial_chunk < MIN_BLOCK_SIZE {
            return Err(HeapError::InvalidConfig(
                "initial chunk must be able to hold a free block",
            ));
        }

        if self.min_split_remainder < MIN_BLOCK_SIZE {
            return Err(HeapError::InvalidConfig(
                "split remainder must be able to hold a free block",
            ));
        }

        // Boundary tags and free list links are 32 bit words.
        if self.max_heap > u32::MAX as usize {
            return Err(HeapError::InvalidConfig("max heap does not fit in a 32 bit tag"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_are_valid() {
        assert!(Config::default().validate().is_ok());
        assert!(Config::compact().validate().is_ok());
    }

    #[test]
    fn rejects_broken_policies() {
        let broken = [
            Config { classes: 0, ..Config::default() },
            Config { min_class_size: 12, ..Config::default() },
            Config { chunk_size: 0, ..Config::default() },
            Config { initial_chunk: 8, ..Config::default() },
            Config { initial_chunk: 1, ..Config::compact() },
            Config { min_split_remainder: 8, ..Config::default() },
            Config::default().with_max_heap(u32::MAX as usize + 1),
        ];

        for config in broken {
            assert!(
                matches!(config.validate(), Err(HeapError::InvalidConfig(_))),
                "{config:?} should be rejected"
            );
        }
    }
}
