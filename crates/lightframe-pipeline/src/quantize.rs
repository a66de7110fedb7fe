//! Adaptive palette quantization with optional Floyd–Steinberg dithering.
//!
//! Two steps:
//!
//! 1. **Palette generation** ([`generate_palette`]): median cut over the
//!    exact color histogram. The box with the widest channel range is
//!    split at its population-weighted median until `K` boxes exist or
//!    every box holds a single color. Each box contributes its weighted
//!    mean color.
//! 2. **Mapping** ([`quantize`]): every pixel is replaced by its nearest
//!    palette entry (squared Euclidean RGB distance). With dithering the
//!    quantization error of each pixel is diffused to its unvisited
//!    neighbors:
//!
//! ```text
//!        X   7
//!    3   5   1      (/16)
//! ```
//!
//! If the source already has at most `K` distinct colors the palette is
//! exactly that color set and mapping reproduces the source unchanged.

use std::collections::HashMap;

use crate::color_count::{pack_rgb, unpack_rgb};
use crate::types::{BufferError, Dimensions, PipelineError, PixelBuffer, Stage};

/// Floyd–Steinberg `(dx, dy, weight)` entries; weights sum to the divisor.
const FLOYD_STEINBERG: [(isize, usize, f32); 4] = [
    (1, 0, 7.0),  // right
    (-1, 1, 3.0), // below-left
    (0, 1, 5.0),  // below
    (1, 1, 1.0),  // below-right
];

/// Divisor for [`FLOYD_STEINBERG`] weights.
const FLOYD_STEINBERG_DIVISOR: f32 = 16.0;

// ───────────────────────────── Palette ─────────────────────────────────

/// An ordered set of unique RGB colors, at most [`Palette::MAX_LEN`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    colors: Vec<[u8; 3]>,
}

impl Palette {
    /// Largest palette the quantizer will build.
    pub const MAX_LEN: usize = 256;

    /// Build a palette from explicit colors.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidParameter`] if `colors` is empty,
    /// longer than [`Palette::MAX_LEN`], or contains duplicates.
    pub fn new(colors: Vec<[u8; 3]>) -> Result<Self, PipelineError> {
        if colors.is_empty() || colors.len() > Self::MAX_LEN {
            return Err(PipelineError::invalid(
                Stage::Quantize,
                "palette",
                format!("must hold 1..={} colors, got {}", Self::MAX_LEN, colors.len()),
            ));
        }
        let mut seen = std::collections::HashSet::with_capacity(colors.len());
        if let Some(dup) = colors.iter().find(|&&c| !seen.insert(c)) {
            return Err(PipelineError::invalid(
                Stage::Quantize,
                "palette",
                format!("duplicate entry {dup:?}"),
            ));
        }
        Ok(Self { colors })
    }

    /// Dedupe while keeping first occurrences, then wrap.
    fn from_candidates(candidates: impl IntoIterator<Item = [u8; 3]>) -> Self {
        let mut seen = std::collections::HashSet::new();
        let colors = candidates
            .into_iter()
            .filter(|c| seen.insert(*c))
            .take(Self::MAX_LEN)
            .collect();
        Self { colors }
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.colors.len()
    }

    /// Whether the palette is empty. Never true for a constructed palette.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    /// The palette entries in slot order.
    #[must_use]
    pub fn colors(&self) -> &[[u8; 3]] {
        &self.colors
    }

    /// Color at slot `index`.
    #[must_use]
    pub fn get(&self, index: u8) -> Option<[u8; 3]> {
        self.colors.get(usize::from(index)).copied()
    }

    /// Slot of the entry closest to `rgb`. Ties go to the lower slot.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn nearest(&self, rgb: [u8; 3]) -> u8 {
        let mut best_idx = 0usize;
        let mut best_dist = u32::MAX;
        for (i, p) in self.colors.iter().enumerate() {
            let dist = distance_squared(rgb, *p);
            if dist < best_dist {
                best_dist = dist;
                best_idx = i;
                if dist == 0 {
                    break;
                }
            }
        }
        // MAX_LEN is 256 so every slot fits in a u8.
        best_idx as u8
    }
}

/// Squared Euclidean distance between two RGB triples.
#[allow(clippy::cast_sign_loss)]
const fn distance_squared(a: [u8; 3], b: [u8; 3]) -> u32 {
    let dr = a[0] as i32 - b[0] as i32;
    let dg = a[1] as i32 - b[1] as i32;
    let db = a[2] as i32 - b[2] as i32;
    (dr * dr + dg * dg + db * db) as u32
}

/// Memoized nearest-slot lookups for one mapping pass.
struct NearestCache<'a> {
    palette: &'a Palette,
    memo: HashMap<u32, u8>,
}

impl<'a> NearestCache<'a> {
    fn new(palette: &'a Palette) -> Self {
        Self {
            palette,
            memo: HashMap::new(),
        }
    }

    fn lookup(&mut self, rgb: [u8; 3]) -> u8 {
        let palette = self.palette;
        *self
            .memo
            .entry(pack_rgb(rgb))
            .or_insert_with(|| palette.nearest(rgb))
    }
}

// ───────────────────────────── Histogram / median cut ──────────────────

/// One histogram entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ColorCount {
    rgb: [u8; 3],
    count: u64,
}

/// Exact histogram of `buffer`, most frequent color first.
fn histogram(buffer: &PixelBuffer) -> Vec<ColorCount> {
    let mut counts: HashMap<u32, u64> = HashMap::new();
    for pixel in buffer.pixels() {
        *counts.entry(pack_rgb(pixel)).or_insert(0) += 1;
    }
    let mut colors: Vec<ColorCount> = counts
        .into_iter()
        .map(|(key, count)| ColorCount {
            rgb: unpack_rgb(key),
            count,
        })
        .collect();
    // HashMap order is random; sort so palettes are deterministic.
    colors.sort_unstable_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| pack_rgb(a.rgb).cmp(&pack_rgb(b.rgb)))
    });
    colors
}

/// A set of histogram entries and their bounding box in RGB space.
#[derive(Debug)]
struct ColorBox {
    colors: Vec<ColorCount>,
    population: u64,
    min: [u8; 3],
    max: [u8; 3],
}

impl ColorBox {
    fn from_colors(colors: Vec<ColorCount>) -> Self {
        let mut min = [u8::MAX; 3];
        let mut max = [u8::MIN; 3];
        let mut population = 0;
        for c in &colors {
            for ch in 0..3 {
                min[ch] = min[ch].min(c.rgb[ch]);
                max[ch] = max[ch].max(c.rgb[ch]);
            }
            population += c.count;
        }
        Self {
            colors,
            population,
            min,
            max,
        }
    }

    /// The channel with the largest extent, and that extent.
    fn widest_channel(&self) -> (usize, u8) {
        (0..3)
            .map(|ch| (ch, self.max[ch] - self.min[ch]))
            .fold((0, 0), |best, cur| if cur.1 > best.1 { cur } else { best })
    }

    fn can_split(&self) -> bool {
        self.colors.len() >= 2
    }

    /// Split at the population-weighted median of the widest channel.
    /// Both halves are non-empty.
    fn split(mut self) -> (Self, Self) {
        let (channel, _) = self.widest_channel();
        self.colors.sort_unstable_by_key(|c| (c.rgb[channel], pack_rgb(c.rgb)));

        let half = self.population.div_ceil(2);
        let mut acc = 0;
        let mut split_idx = 0;
        for (i, c) in self.colors.iter().enumerate() {
            acc += c.count;
            if acc >= half {
                split_idx = i;
                break;
            }
        }
        // Keep at least one color on the right.
        split_idx = split_idx.min(self.colors.len() - 2);

        let right = self.colors.split_off(split_idx + 1);
        (Self::from_colors(self.colors), Self::from_colors(right))
    }

    /// Population-weighted mean color, rounded to nearest.
    #[allow(clippy::cast_possible_truncation)]
    fn mean(&self) -> [u8; 3] {
        let total = self.population.max(1);
        let mut sums = [0u64; 3];
        for c in &self.colors {
            for ch in 0..3 {
                sums[ch] += u64::from(c.rgb[ch]) * c.count;
            }
        }
        sums.map(|s| ((s + total / 2) / total) as u8)
    }
}

/// Median-cut palette of at most `k` colors from a histogram.
fn median_cut(colors: Vec<ColorCount>, k: usize) -> Palette {
    let mut boxes = vec![ColorBox::from_colors(colors)];
    while boxes.len() < k {
        let Some(idx) = boxes
            .iter()
            .enumerate()
            .filter(|(_, b)| b.can_split())
            .max_by_key(|(_, b)| (b.widest_channel().1, b.population))
            .map(|(i, _)| i)
        else {
            break;
        };
        let (left, right) = boxes.swap_remove(idx).split();
        boxes.push(left);
        boxes.push(right);
    }

    // Most populous boxes take the lowest slots.
    boxes.sort_by(|a, b| b.population.cmp(&a.population));
    Palette::from_candidates(boxes.iter().map(ColorBox::mean))
}

/// Validate a requested palette size.
pub(crate) fn check_palette_size(palette_size: u16) -> Result<usize, PipelineError> {
    let k = usize::from(palette_size);
    if k == 0 || k > Palette::MAX_LEN {
        return Err(PipelineError::invalid(
            Stage::Quantize,
            "palette_size",
            format!("must be in 1..={}, got {palette_size}", Palette::MAX_LEN),
        ));
    }
    Ok(k)
}

/// Build an adaptive palette of at most `palette_size` colors for `buffer`.
///
/// When `buffer` holds no more than `palette_size` distinct colors the
/// palette is exactly that set, most frequent first.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidParameter`] unless
/// `1 <= palette_size <= 256`.
pub fn generate_palette(buffer: &PixelBuffer, palette_size: u16) -> Result<Palette, PipelineError> {
    let k = check_palette_size(palette_size)?;
    let colors = histogram(buffer);
    if colors.len() <= k {
        return Ok(Palette::from_candidates(colors.iter().map(|c| c.rgb)));
    }
    Ok(median_cut(colors, k))
}

// ───────────────────────────── Mapping ─────────────────────────────────

/// A quantized image: a palette plus one palette slot per pixel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuantizedImage {
    palette: Palette,
    indices: Vec<u8>,
    dimensions: Dimensions,
    exact: bool,
}

impl QuantizedImage {
    /// The palette the indices refer to.
    #[must_use]
    pub const fn palette(&self) -> &Palette {
        &self.palette
    }

    /// Palette slot of every pixel, row-major.
    #[must_use]
    pub fn indices(&self) -> &[u8] {
        &self.indices
    }

    /// Image dimensions.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    /// Whether the palette holds every source color, so the mapping
    /// reproduced the source unchanged.
    #[must_use]
    pub const fn is_exact(&self) -> bool {
        self.exact
    }

    /// Expand the indices back into RGB pixels.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidBuffer`] if an index points past
    /// the palette or the index map does not cover the image. Either one
    /// indicates a bug in the mapping pass.
    pub fn to_pixel_buffer(&self) -> Result<PixelBuffer, PipelineError> {
        let colors = self.palette.colors();
        let mut samples = Vec::with_capacity(self.indices.len() * PixelBuffer::CHANNELS);
        for &index in &self.indices {
            let rgb = colors
                .get(usize::from(index))
                .ok_or(BufferError::PaletteIndex {
                    index,
                    len: colors.len(),
                })
                .map_err(|source| PipelineError::InvalidBuffer {
                    stage: Stage::Quantize,
                    source,
                })?;
            samples.extend_from_slice(rgb);
        }
        PixelBuffer::from_raw(self.dimensions.width, self.dimensions.height, samples).map_err(
            |source| PipelineError::InvalidBuffer {
                stage: Stage::Quantize,
                source,
            },
        )
    }
}

/// Quantize `buffer` to an adaptive palette of at most `palette_size`
/// colors, optionally with Floyd–Steinberg error diffusion.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidParameter`] unless
/// `1 <= palette_size <= 256`.
pub fn quantize(
    buffer: &PixelBuffer,
    palette_size: u16,
    dither: bool,
) -> Result<QuantizedImage, PipelineError> {
    let palette = generate_palette(buffer, palette_size)?;
    let exact = histogram_fits(buffer, &palette);

    tracing::debug!(
        requested = palette_size,
        palette_len = palette.len(),
        exact,
        dither,
        "palette generated",
    );

    // An exact palette leaves no error to diffuse.
    let indices = if dither && !exact {
        map_dithered(buffer, &palette)
    } else {
        map_nearest(buffer, &palette)
    };

    Ok(QuantizedImage {
        palette,
        indices,
        dimensions: buffer.dimensions(),
        exact,
    })
}

/// Whether every pixel color of `buffer` is a palette entry.
fn histogram_fits(buffer: &PixelBuffer, palette: &Palette) -> bool {
    let entries: std::collections::HashSet<[u8; 3]> = palette.colors().iter().copied().collect();
    buffer.pixels().all(|p| entries.contains(&p))
}

/// Independent nearest-color mapping.
fn map_nearest(buffer: &PixelBuffer, palette: &Palette) -> Vec<u8> {
    let mut cache = NearestCache::new(palette);
    buffer.pixels().map(|p| cache.lookup(p)).collect()
}

/// Floyd–Steinberg mapping in raster order.
///
/// Error rows carry one guard slot on each side so the kernel never
/// needs bounds checks; error pushed into a guard slot is dropped.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap
)]
fn map_dithered(buffer: &PixelBuffer, palette: &Palette) -> Vec<u8> {
    let width = buffer.width() as usize;
    let samples = buffer.as_raw();
    let mut cache = NearestCache::new(palette);
    let mut indices = Vec::with_capacity(buffer.pixel_count());

    // rows[0] = current row, rows[1] = next row.
    let mut rows = [vec![[0f32; 3]; width + 2], vec![[0f32; 3]; width + 2]];

    for row in samples.chunks_exact(width * PixelBuffer::CHANNELS) {
        for (x, src) in row.chunks_exact(PixelBuffer::CHANNELS).enumerate() {
            let carried = rows[0][x + 1];
            let adjusted: [u8; 3] = std::array::from_fn(|c| {
                (f32::from(src[c]) + carried[c]).round().clamp(0.0, 255.0) as u8
            });

            let slot = cache.lookup(adjusted);
            indices.push(slot);
            let chosen = palette.colors()[usize::from(slot)];
            let error: [f32; 3] =
                std::array::from_fn(|c| f32::from(adjusted[c]) - f32::from(chosen[c]));

            for &(dx, dy, weight) in &FLOYD_STEINBERG {
                let target = (x as isize + 1 + dx) as usize;
                let cell = &mut rows[dy][target];
                for c in 0..3 {
                    cell[c] += error[c] * weight / FLOYD_STEINBERG_DIVISOR;
                }
            }
        }
        rows.swap(0, 1);
        rows[1].fill([0.0; 3]);
    }

    indices
}
