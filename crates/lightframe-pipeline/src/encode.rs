//! Output encoding.
//!
//! Writes a [`PixelBuffer`] as JPEG or PNG. PNG rows always use adaptive
//! filtering; with `optimize` set, deflate runs at its slowest level.
//! The JPEG encoder has no extra optimization pass, so `optimize` only
//! affects PNG.

use image::ExtendedColorType;
use image::ImageEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};

use crate::types::{EncodeTarget, EncodedImage, ImageFormat, PipelineError, PixelBuffer, Stage};

/// Check that `quality` is a valid JPEG quality.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidParameter`] unless `quality` is in
/// `1..=100`.
pub fn check_jpeg_quality(quality: u8) -> Result<(), PipelineError> {
    if (1..=100).contains(&quality) {
        Ok(())
    } else {
        Err(PipelineError::invalid(
            Stage::Encode,
            "jpeg_quality",
            format!("must be in 1..=100, got {quality}"),
        ))
    }
}

/// Encode `buffer` into the container described by `target`.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidParameter`] for an out-of-range JPEG
/// quality and [`PipelineError::ImageEncode`] if the codec fails.
pub fn encode(
    buffer: &PixelBuffer,
    target: EncodeTarget,
    optimize: bool,
) -> Result<EncodedImage, PipelineError> {
    let mut bytes = Vec::new();
    let (width, height) = (buffer.width(), buffer.height());

    let written = match target {
        EncodeTarget::Jpeg { quality } => {
            check_jpeg_quality(quality)?;
            JpegEncoder::new_with_quality(&mut bytes, quality).write_image(
                buffer.as_raw(),
                width,
                height,
                ExtendedColorType::Rgb8,
            )
        }
        EncodeTarget::Png => {
            let compression = if optimize {
                CompressionType::Best
            } else {
                CompressionType::Default
            };
            PngEncoder::new_with_quality(&mut bytes, compression, FilterType::Adaptive).write_image(
                buffer.as_raw(),
                width,
                height,
                ExtendedColorType::Rgb8,
            )
        }
    };
    written.map_err(|source| PipelineError::ImageEncode {
        format: target.format(),
        source,
    })?;

    tracing::debug!(
        format = %target.format(),
        bytes = bytes.len(),
        optimize,
        "encoded output",
    );
    Ok(EncodedImage { bytes, target })
}

/// The encode target for a resolved container.
///
/// `jpeg_quality` is ignored for PNG.
#[must_use]
pub const fn target_for(format: ImageFormat, jpeg_quality: u8) -> EncodeTarget {
    match format {
        ImageFormat::Jpeg => EncodeTarget::Jpeg {
            quality: jpeg_quality,
        },
        ImageFormat::Png => EncodeTarget::Png,
    }
}
