//! Size class index.
//!
//! Class `n` holds free blocks of size `<= min_class_size << n` (and bigger
//! than the previous class bound). The last class is open ended and takes
//! every size above the previous bound, however big.

/// Maps block sizes to one of a fixed number of power of two classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeClasses {
    min_class_size: usize,
    classes: usize,
}

impl SizeClasses {
    pub const fn new(min_class_size: usize, classes: usize) -> Self {
        Self {
            min_class_size,
            classes,
        }
    }

    #[inline]
    pub const fn len(&self) -> usize {
        self.classes
    }

    /// Class a block of `size` bytes belongs to. Monotonic in `size`.
    pub fn class_of(&self, size: usize) -> usize {
        let mut bound = self.min_class_size;

        for class in 0..self.classes - 1 {
            if size <= bound {
                return class;
            }
            bound = bound.saturating_mul(2);
        }

        self.classes - 1
    }

    /// Largest size of class `class`, `None` for the open ended top class.
    pub fn upper_bound(&self, class: usize) -> Option<usize> {
        if class + 1 >= self.classes {
            return None;
        }

        u32::try_from(class)
            .ok()
            .and_then(|shift| self.min_class_size.checked_shl(shift))
            .filter(|bound| bound >> class == self.min_class_size)
    }
}
