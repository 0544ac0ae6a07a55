//! Size categories.
//!
//! A [`SizeCategory`] is a named bucket of files: every file drawn from it has
//! a size within `[min_bytes, max_bytes]`, and the bucket keeps handing out
//! sizes until the bytes it has handed out reach `target_total_bytes`.

use rand::Rng;

/// A named file-size bucket with a cumulative byte budget.
///
/// `generated_bytes` only ever grows. Because a file size is drawn before the
/// budget is checked again, the final total can overshoot the target by at
/// most one file (at-least policy). A category whose largest file is empty
/// can never make progress and counts as done from the start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizeCategory {
    /// Category name, also used as the top-level directory for its files.
    pub name: String,
    min_bytes: u64,
    max_bytes: u64,
    /// Cumulative size this category should reach.
    pub target_total_bytes: u64,
    generated_bytes: u64,
}

impl SizeCategory {
    /// Create a category with nothing generated yet.
    ///
    /// A reversed range is normalized so that `min_bytes <= max_bytes`.
    pub fn new(
        name: impl Into<String>,
        min_bytes: u64,
        max_bytes: u64,
        target_total_bytes: u64,
    ) -> Self {
        let (min_bytes, max_bytes) = if min_bytes <= max_bytes {
            (min_bytes, max_bytes)
        } else {
            (max_bytes, min_bytes)
        };

        Self {
            name: name.into(),
            min_bytes,
            max_bytes,
            target_total_bytes,
            generated_bytes: 0,
        }
    }

    /// Smallest file size in bytes (inclusive).
    pub fn min_bytes(&self) -> u64 {
        self.min_bytes
    }

    /// Largest file size in bytes (inclusive).
    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Bytes handed out so far.
    pub fn generated_bytes(&self) -> u64 {
        self.generated_bytes
    }

    /// Bytes still missing before the target is reached.
    pub fn remaining_bytes(&self) -> u64 {
        if self.is_done() {
            return 0;
        }
        self.target_total_bytes - self.generated_bytes
    }

    /// True once the cumulative size has reached the target, or if every
    /// file would be empty.
    pub fn is_done(&self) -> bool {
        self.max_bytes == 0 || self.generated_bytes >= self.target_total_bytes
    }

    /// Draw the size of the next file and charge it to this category.
    pub fn next_file_size<R: Rng + ?Sized>(&mut self, rng: &mut R) -> u64 {
        let size = rng.gen_range(self.min_bytes..=self.max_bytes);
        self.generated_bytes = self.generated_bytes.saturating_add(size);
        size
    }
}
