//! Exact distinct-color counting.
//!
//! Each pixel is packed into a `u32` key (`0x00RRGGBB`) and collected
//! into a set. The count is exact up to a configured ceiling; past the
//! ceiling the counter stops growing the set and reports the ceiling
//! itself, so a pathological synthetic image cannot exhaust memory.

use std::collections::HashSet;

use crate::types::{CompressConfig, PixelBuffer};

/// Pack an RGB triple into a single integer key.
#[must_use]
pub const fn pack_rgb([r, g, b]: [u8; 3]) -> u32 {
    ((r as u32) << 16) | ((g as u32) << 8) | b as u32
}

/// Inverse of [`pack_rgb`].
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub const fn unpack_rgb(key: u32) -> [u8; 3] {
    [(key >> 16) as u8, (key >> 8) as u8, key as u8]
}

/// Counts distinct RGB colors, bounded by `limit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorCounter {
    limit: usize,
}

impl Default for ColorCounter {
    fn default() -> Self {
        Self::new(CompressConfig::DEFAULT_MAX_DISTINCT_COLORS)
    }
}

impl ColorCounter {
    /// Create a counter that saturates at `limit` distinct colors.
    ///
    /// A `limit` of zero is treated as one.
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
        }
    }

    /// The configured ceiling.
    #[must_use]
    pub const fn limit(&self) -> usize {
        self.limit
    }

    /// Count the distinct colors in `buffer`.
    ///
    /// Returns `limit` once that many distinct colors have been seen.
    #[must_use]
    pub fn count(&self, buffer: &PixelBuffer) -> usize {
        // 2^24 is the most an RGB image can hold.
        let capacity = buffer.pixel_count().min(self.limit).min(1 << 24);
        let mut seen: HashSet<u32> = HashSet::with_capacity(capacity);

        for pixel in buffer.pixels() {
            seen.insert(pack_rgb(pixel));
            if seen.len() >= self.limit {
                tracing::warn!(
                    limit = self.limit,
                    "distinct color ceiling reached; reporting saturated count",
                );
                return self.limit;
            }
        }

        seen.len()
    }
}
