//! Image decoding and RGB normalization.
//!
//! Accepts raw image bytes (PNG, JPEG, BMP, GIF, WebP) and produces an
//! 8-bit RGB [`PixelBuffer`]. This is the first step of both pipelines.
//!
//! Normalization policy: alpha is dropped without compositing against a
//! background, grayscale and paletted sources are expanded to RGB, and
//! 16-bit or float sources are reduced to 8 bits per channel. Animated
//! containers contribute their first frame only.

use crate::types::{PipelineError, PixelBuffer, Stage};

/// Decode raw image bytes into an RGB pixel buffer.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] if `bytes` is empty.
/// Returns [`PipelineError::ImageDecode`] if the image format is
/// unrecognized or the data is corrupt.
pub fn decode(bytes: &[u8]) -> Result<PixelBuffer, PipelineError> {
    if bytes.is_empty() {
        return Err(PipelineError::EmptyInput);
    }

    let image = image::load_from_memory(bytes).map_err(PipelineError::ImageDecode)?;
    tracing::debug!(
        color = ?image.color(),
        width = image.width(),
        height = image.height(),
        "decoded source image",
    );

    PixelBuffer::from_image(image.to_rgb8()).map_err(|source| PipelineError::InvalidBuffer {
        stage: Stage::Decode,
        source,
    })
}
