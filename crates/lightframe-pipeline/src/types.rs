//! Shared types for the lightframe transform pipeline.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Re-export `RgbImage` so downstream crates can hand decoded rasters
/// around without depending on `image` directly.
pub use image::RgbImage;

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// The longer of the two sides.
    #[must_use]
    pub const fn long_side(self) -> u32 {
        if self.width >= self.height {
            self.width
        } else {
            self.height
        }
    }

    /// Total pixel count (`width * height`).
    #[must_use]
    pub const fn pixel_count(self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

// ───────────────────────────── PixelBuffer ─────────────────────────────

/// Reasons a raw sample vector cannot become a [`PixelBuffer`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BufferError {
    /// Width or height is zero.
    #[error("dimensions must be non-zero, got {width}x{height}")]
    ZeroDimension {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
    },

    /// Sample count does not equal `width * height * 3`.
    #[error("expected {expected} samples, got {actual}")]
    LengthMismatch {
        /// `width * height * 3`.
        expected: usize,
        /// Length of the supplied vector.
        actual: usize,
    },

    /// A palette index points past the end of its palette.
    #[error("palette index {index} out of range for {len} colors")]
    PaletteIndex {
        /// Offending index.
        index: u8,
        /// Palette length.
        len: usize,
    },
}

/// An 8-bit RGB raster, row-major, three interleaved channels.
///
/// The buffer always holds exactly `width * height * 3` samples and
/// both sides are non-zero; every constructor checks this. Stages take
/// a buffer by value and hand a new one on, so no two stages ever
/// alias the same pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer(RgbImage);

impl PixelBuffer {
    /// Samples per pixel.
    pub const CHANNELS: usize = 3;

    /// Build a buffer from raw interleaved RGB samples.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::ZeroDimension`] if either side is zero and
    /// [`BufferError::LengthMismatch`] if `samples` has the wrong length.
    pub fn from_raw(width: u32, height: u32, samples: Vec<u8>) -> Result<Self, BufferError> {
        if width == 0 || height == 0 {
            return Err(BufferError::ZeroDimension { width, height });
        }
        let expected = width as usize * height as usize * Self::CHANNELS;
        let actual = samples.len();
        if actual != expected {
            return Err(BufferError::LengthMismatch { expected, actual });
        }
        RgbImage::from_raw(width, height, samples)
            .map(Self)
            .ok_or(BufferError::LengthMismatch { expected, actual })
    }

    /// Wrap an already-decoded `RgbImage`.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::ZeroDimension`] for an empty image.
    pub fn from_image(image: RgbImage) -> Result<Self, BufferError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(BufferError::ZeroDimension { width, height });
        }
        Ok(Self(image))
    }

    /// Build a buffer by evaluating `f` at every pixel coordinate.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::ZeroDimension`] if either side is zero.
    pub fn from_fn(
        width: u32,
        height: u32,
        mut f: impl FnMut(u32, u32) -> [u8; 3],
    ) -> Result<Self, BufferError> {
        Self::from_image(RgbImage::from_fn(width, height, |x, y| {
            image::Rgb(f(x, y))
        }))
    }

    /// Width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.0.width()
    }

    /// Height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.0.height()
    }

    /// Width and height together.
    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.width(),
            height: self.height(),
        }
    }

    /// Number of pixels.
    #[must_use]
    pub fn pixel_count(&self) -> usize {
        self.0.as_raw().len() / Self::CHANNELS
    }

    /// The raw interleaved samples.
    #[must_use]
    pub fn as_raw(&self) -> &[u8] {
        self.0.as_raw()
    }

    /// Iterate over pixels in row-major order.
    pub fn pixels(&self) -> impl Iterator<Item = [u8; 3]> + '_ {
        self.0
            .as_raw()
            .chunks_exact(Self::CHANNELS)
            .map(|p| [p[0], p[1], p[2]])
    }

    /// RGB triple at `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics if the coordinate is out of bounds.
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> [u8; 3] {
        self.0.get_pixel(x, y).0
    }

    /// Borrow as an `image` crate buffer.
    #[must_use]
    pub const fn as_image(&self) -> &RgbImage {
        &self.0
    }

    /// Consume into an `image` crate buffer.
    #[must_use]
    pub fn into_image(self) -> RgbImage {
        self.0
    }
}

// ───────────────────────────── Formats ─────────────────────────────────

/// Output container requested by the caller.
///
/// `Auto` resolves to JPEG. See [`OutputFormat::from_str`] for the
/// accepted spellings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Let the pipeline pick (currently always JPEG).
    #[default]
    Auto,
    /// Lossy DCT container.
    #[serde(alias = "jpg")]
    Jpeg,
    /// Lossless deflate container.
    Png,
}

impl OutputFormat {
    /// Resolve to the container that will actually be written.
    #[must_use]
    pub const fn resolve(self) -> ImageFormat {
        match self {
            Self::Auto | Self::Jpeg => ImageFormat::Jpeg,
            Self::Png => ImageFormat::Png,
        }
    }
}

impl FromStr for OutputFormat {
    type Err = PipelineError;

    /// Case-insensitive; surrounding whitespace is ignored. The empty
    /// string means `auto`. Anything unrecognised is rejected rather
    /// than silently mapped to a default container.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "auto" => Ok(Self::Auto),
            "jpeg" | "jpg" => Ok(Self::Jpeg),
            "png" => Ok(Self::Png),
            other => Err(PipelineError::InvalidParameter {
                stage: Stage::Encode,
                name: "output_format",
                reason: format!("expected one of auto, jpeg, jpg, png; got {other:?}"),
            }),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => f.write_str("auto"),
            Self::Jpeg => f.write_str("jpeg"),
            Self::Png => f.write_str("png"),
        }
    }
}

/// A concrete container kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// JPEG (lossy).
    Jpeg,
    /// PNG (lossless).
    Png,
}

impl ImageFormat {
    /// MIME type for this container.
    #[must_use]
    pub const fn mime(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
        }
    }

    /// Conventional file extension, without the dot.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Jpeg => f.write_str("jpeg"),
            Self::Png => f.write_str("png"),
        }
    }
}

/// What the encoder should write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "lowercase")]
pub enum EncodeTarget {
    /// JPEG at `quality` (1..=100).
    Jpeg {
        /// Encoder quality, 1 (smallest) to 100 (best).
        quality: u8,
    },
    /// PNG.
    Png,
}

impl EncodeTarget {
    /// The container this target produces.
    #[must_use]
    pub const fn format(self) -> ImageFormat {
        match self {
            Self::Jpeg { .. } => ImageFormat::Jpeg,
            Self::Png => ImageFormat::Png,
        }
    }
}

/// Encoded output bytes plus the container they are in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    /// The encoded file contents.
    pub bytes: Vec<u8>,
    /// How the bytes were produced.
    pub target: EncodeTarget,
}

impl EncodedImage {
    /// Container kind.
    #[must_use]
    pub const fn format(&self) -> ImageFormat {
        self.target.format()
    }

    /// MIME type of [`bytes`](Self::bytes).
    #[must_use]
    pub const fn mime(&self) -> &'static str {
        self.target.format().mime()
    }

    /// Encoded size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the encoder produced no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Consume and return the raw bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

// ───────────────────────────── Configuration ───────────────────────────

/// Configuration for the [`compress`](crate::compress) pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressConfig {
    /// Maximum palette size K. Must be in `1..=256`.
    pub palette_size: u16,

    /// Requested output container.
    pub output_format: OutputFormat,

    /// Whether to shrink the image so its long side is at most
    /// `max_dimension` before quantizing.
    pub reduce_resolution: bool,

    /// JPEG quality (1..=100). Ignored for PNG output.
    pub jpeg_quality: u8,

    /// Long-side ceiling used when `reduce_resolution` is set.
    pub max_dimension: u32,

    /// Floyd–Steinberg error diffusion during palette mapping.
    pub dither: bool,

    /// Spend more encoder effort for smaller output.
    pub optimize: bool,

    /// Ceiling for exact distinct-color counting.
    pub max_distinct_colors: usize,
}

impl CompressConfig {
    /// Default palette size.
    pub const DEFAULT_PALETTE_SIZE: u16 = 16;
    /// Largest accepted palette size.
    pub const MAX_PALETTE_SIZE: u16 = 256;
    /// Default JPEG quality.
    pub const DEFAULT_JPEG_QUALITY: u8 = 85;
    /// Default long-side ceiling.
    pub const DEFAULT_MAX_DIMENSION: u32 = 1024;
    /// Default distinct-color ceiling.
    pub const DEFAULT_MAX_DISTINCT_COLORS: usize = 10_000_000;
}

impl Default for CompressConfig {
    fn default() -> Self {
        Self {
            palette_size: Self::DEFAULT_PALETTE_SIZE,
            output_format: OutputFormat::Auto,
            reduce_resolution: true,
            jpeg_quality: Self::DEFAULT_JPEG_QUALITY,
            max_dimension: Self::DEFAULT_MAX_DIMENSION,
            dither: true,
            optimize: true,
            max_distinct_colors: Self::DEFAULT_MAX_DISTINCT_COLORS,
        }
    }
}

/// Configuration for the [`enhance`](crate::enhance) pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnhanceConfig {
    /// Bilateral window diameter in pixels. Values `<= 0` derive the
    /// radius from `sigma_space`.
    pub diameter: i32,

    /// Spread of the color-difference Gaussian.
    pub sigma_color: f64,

    /// Spread of the spatial Gaussian.
    pub sigma_space: f64,

    /// Resample factor applied before filtering. `1.0` skips resampling.
    pub upsample_scale: f64,

    /// JPEG quality of the output.
    pub jpeg_quality: u8,

    /// Ceiling for exact distinct-color counting.
    pub max_distinct_colors: usize,
}

impl EnhanceConfig {
    /// Default window diameter.
    pub const DEFAULT_DIAMETER: i32 = 9;
    /// Default color sigma.
    pub const DEFAULT_SIGMA_COLOR: f64 = 75.0;
    /// Default spatial sigma.
    pub const DEFAULT_SIGMA_SPACE: f64 = 75.0;
    /// Default resample factor (none).
    pub const DEFAULT_UPSAMPLE_SCALE: f64 = 1.0;
    /// Default output JPEG quality.
    pub const DEFAULT_JPEG_QUALITY: u8 = 95;
}

impl Default for EnhanceConfig {
    fn default() -> Self {
        Self {
            diameter: Self::DEFAULT_DIAMETER,
            sigma_color: Self::DEFAULT_SIGMA_COLOR,
            sigma_space: Self::DEFAULT_SIGMA_SPACE,
            upsample_scale: Self::DEFAULT_UPSAMPLE_SCALE,
            jpeg_quality: Self::DEFAULT_JPEG_QUALITY,
            max_distinct_colors: CompressConfig::DEFAULT_MAX_DISTINCT_COLORS,
        }
    }
}

// ───────────────────────────── Results ─────────────────────────────────

/// Output of [`compress`](crate::compress).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressResult {
    /// The encoded output.
    pub image: EncodedImage,
    /// Distinct colors in the decoded input.
    pub original_colors: usize,
    /// Distinct colors in the quantized output (before lossy encoding).
    pub compressed_colors: usize,
    /// Size of the input bytes.
    pub original_size: usize,
    /// Dimensions of the output image.
    pub dimensions: Dimensions,
    /// Entries in the generated palette.
    pub palette_len: usize,
}

impl CompressResult {
    /// MIME type of the encoded output.
    #[must_use]
    pub const fn mime(&self) -> &'static str {
        self.image.mime()
    }

    /// Size of the encoded output.
    #[must_use]
    pub fn compressed_size(&self) -> usize {
        self.image.len()
    }
}

/// Output of [`enhance`](crate::enhance).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnhanceResult {
    /// The encoded output.
    pub image: EncodedImage,
    /// Distinct colors in the decoded input.
    pub original_colors: usize,
    /// Distinct colors in the smoothed output (before lossy encoding).
    pub result_colors: usize,
    /// Size of the input bytes.
    pub original_size: usize,
    /// Dimensions of the output image.
    pub dimensions: Dimensions,
}

impl EnhanceResult {
    /// MIME type of the encoded output.
    #[must_use]
    pub const fn mime(&self) -> &'static str {
        self.image.mime()
    }

    /// Size of the encoded output.
    #[must_use]
    pub fn result_size(&self) -> usize {
        self.image.len()
    }
}

// ───────────────────────────── Errors ──────────────────────────────────

/// Pipeline stage names, used in errors and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Bytes to pixels.
    Decode,
    /// Exact distinct-color counting.
    CountColors,
    /// Lanczos resampling.
    Resize,
    /// Palette generation and mapping.
    Quantize,
    /// Bilateral filter.
    Smooth,
    /// Pixels to bytes.
    Encode,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Decode => "decode",
            Self::CountColors => "count-colors",
            Self::Resize => "resize",
            Self::Quantize => "quantize",
            Self::Smooth => "smooth",
            Self::Encode => "encode",
        })
    }
}

/// Coarse classification of a [`PipelineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The input bytes are not a readable image.
    Decode,
    /// A caller-supplied parameter is out of range.
    InvalidParameter,
    /// An internal invariant was violated. Indicates a bug.
    Internal,
}

/// Errors that can occur during pipeline processing.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The input image bytes were empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// Failed to decode the input image.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[source] image::ImageError),

    /// A parameter is outside its accepted range.
    #[error("invalid parameter `{name}` for {stage} stage: {reason}")]
    InvalidParameter {
        /// Stage that rejected the parameter.
        stage: Stage,
        /// Parameter name as it appears in the config.
        name: &'static str,
        /// Human-readable explanation.
        reason: String,
    },

    /// A stage produced a malformed pixel buffer.
    #[error("pixel buffer invariant violated in {stage} stage: {source}")]
    InvalidBuffer {
        /// Stage that produced the buffer.
        stage: Stage,
        /// What was wrong with it.
        #[source]
        source: BufferError,
    },

    /// The encoder rejected a well-formed buffer.
    #[error("failed to encode {format} output: {source}")]
    ImageEncode {
        /// Container being written.
        format: ImageFormat,
        /// Codec error.
        #[source]
        source: image::ImageError,
    },
}

impl PipelineError {
    /// Shorthand for [`PipelineError::InvalidParameter`].
    pub(crate) fn invalid(stage: Stage, name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            stage,
            name,
            reason: reason.into(),
        }
    }

    /// Whether this error stems from the caller's input or from a defect.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::EmptyInput | Self::ImageDecode(_) => ErrorKind::Decode,
            Self::InvalidParameter { .. } => ErrorKind::InvalidParameter,
            Self::InvalidBuffer { .. } | Self::ImageEncode { .. } => ErrorKind::Internal,
        }
    }

    /// The stage that raised the error.
    #[must_use]
    pub const fn stage(&self) -> Stage {
        match self {
            Self::EmptyInput | Self::ImageDecode(_) => Stage::Decode,
            Self::InvalidParameter { stage, .. } | Self::InvalidBuffer { stage, .. } => *stage,
            Self::ImageEncode { .. } => Stage::Encode,
        }
    }

    /// `true` for errors caused by caller input rather than a defect.
    #[must_use]
    pub const fn is_user_error(&self) -> bool {
        !matches!(self.kind(), ErrorKind::Internal)
    }
}
