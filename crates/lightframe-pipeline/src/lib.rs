//! lightframe-pipeline: Pure image transform pipeline (sans-IO).
//!
//! Two orchestrators share one set of stages:
//!
//! - [`compress`]: decode -> count colors -> optional Lanczos shrink ->
//!   median-cut palette quantization (optionally dithered) -> count
//!   colors -> encode (JPEG or PNG).
//! - [`enhance`]: decode -> count colors -> Lanczos resample ->
//!   bilateral filter -> count colors -> encode (JPEG).
//!
//! This crate has **no I/O dependencies** -- it operates on in-memory
//! byte slices and returns encoded bytes plus statistics. Reading and
//! writing files lives in the `lightframe` binary.

pub mod color_count;
pub mod decode;
pub mod diagnostics;
pub mod encode;
pub mod quantize;
pub mod resize;
pub mod smooth;
pub mod types;

pub use color_count::ColorCounter;
pub use diagnostics::{Clock, NullClock, PipelineDiagnostics};
pub use quantize::{Palette, QuantizedImage};
pub use smooth::BilateralParams;
pub use types::{
    CompressConfig, CompressResult, Dimensions, EncodeTarget, EncodedImage, EnhanceConfig,
    EnhanceResult, ErrorKind, ImageFormat, OutputFormat, PipelineError, PixelBuffer, Stage,
};

use diagnostics::{PipelineKind, PipelineSummary, Recorder, StageMetrics};

/// Reduce an image to a small adaptive palette and re-encode it.
///
/// # Pipeline steps
///
/// 1. Decode and normalize to 8-bit RGB
/// 2. Count distinct source colors
/// 3. If `reduce_resolution`, shrink so the long side is at most
///    `max_dimension` (Lanczos3)
/// 4. Median-cut palette of at most `palette_size` colors, mapped with
///    optional Floyd–Steinberg dithering
/// 5. Count distinct result colors
/// 6. Encode in the negotiated container
///
/// # Errors
///
/// Returns [`PipelineError::InvalidParameter`] for an out-of-range
/// parameter, checked before any decoding work.
/// Returns [`PipelineError::EmptyInput`] if `image_bytes` is empty.
/// Returns [`PipelineError::ImageDecode`] if the image format is unrecognized.
pub fn compress(
    image_bytes: &[u8],
    config: &CompressConfig,
) -> Result<CompressResult, PipelineError> {
    compress_with_diagnostics(image_bytes, config, &NullClock).map(|(result, _)| result)
}

/// [`compress`], also returning per-stage diagnostics timed by `clock`.
///
/// # Errors
///
/// Same as [`compress`].
pub fn compress_with_diagnostics<C: Clock>(
    image_bytes: &[u8],
    config: &CompressConfig,
    clock: &C,
) -> Result<(CompressResult, PipelineDiagnostics), PipelineError> {
    validate_compress(config)?;
    let mut recorder = Recorder::new(clock);
    let counter = ColorCounter::new(config.max_distinct_colors);

    // 1. Decode.
    let decoded = run_decode(&mut recorder, image_bytes)?;
    let input_dimensions = decoded.dimensions();

    // 2. Source colors.
    let original_colors = run_count(&mut recorder, &counter, &decoded)?;

    // 3. Optional shrink.
    let working = if config.reduce_resolution {
        let (resized, _) = recorder.run(
            Stage::Resize,
            || resize::fit_within(decoded, config.max_dimension),
            |(resized, applied)| StageMetrics::Resize {
                from: input_dimensions,
                to: resized.dimensions(),
                applied: *applied,
            },
        )?;
        resized
    } else {
        decoded
    };

    // 4. Quantize.
    let (quantized, output) = recorder.run(
        Stage::Quantize,
        || {
            let quantized = quantize::quantize(&working, config.palette_size, config.dither)?;
            let output = quantized.to_pixel_buffer()?;
            Ok((quantized, output))
        },
        |(quantized, _)| StageMetrics::Quantize {
            requested: config.palette_size,
            palette_len: quantized.palette().len(),
            dither: config.dither,
            exact: quantized.is_exact(),
        },
    )?;

    // 5. Result colors.
    let compressed_colors = run_count(&mut recorder, &counter, &output)?;

    // 6. Encode.
    let target = encode::target_for(config.output_format.resolve(), config.jpeg_quality);
    let image = run_encode(&mut recorder, &output, target, config.optimize)?;

    let dimensions = output.dimensions();
    tracing::debug!(
        original_colors,
        compressed_colors,
        original_size = image_bytes.len(),
        compressed_size = image.len(),
        mime = image.mime(),
        "compress finished",
    );

    let diagnostics = recorder.finish(
        PipelineKind::Compress,
        PipelineSummary {
            input_bytes: image_bytes.len(),
            output_bytes: image.len(),
            input_dimensions,
            output_dimensions: dimensions,
            original_colors,
            result_colors: compressed_colors,
        },
    );
    let result = CompressResult {
        image,
        original_colors,
        compressed_colors,
        original_size: image_bytes.len(),
        dimensions,
        palette_len: quantized.palette().len(),
    };
    Ok((result, diagnostics))
}

/// Smooth an image with an edge-preserving bilateral filter and
/// re-encode it as JPEG.
///
/// # Pipeline steps
///
/// 1. Decode and normalize to 8-bit RGB
/// 2. Count distinct source colors
/// 3. Resample by `upsample_scale` (Lanczos3; identity at `1.0`)
/// 4. Bilateral filter
/// 5. Count distinct result colors
/// 6. Encode as JPEG at `jpeg_quality`
///
/// # Errors
///
/// Returns [`PipelineError::InvalidParameter`] for an out-of-range
/// parameter, checked before any decoding work.
/// Returns [`PipelineError::EmptyInput`] if `image_bytes` is empty.
/// Returns [`PipelineError::ImageDecode`] if the image format is unrecognized.
pub fn enhance(
    image_bytes: &[u8],
    config: &EnhanceConfig,
) -> Result<EnhanceResult, PipelineError> {
    enhance_with_diagnostics(image_bytes, config, &NullClock).map(|(result, _)| result)
}

/// [`enhance`], also returning per-stage diagnostics timed by `clock`.
///
/// # Errors
///
/// Same as [`enhance`].
pub fn enhance_with_diagnostics<C: Clock>(
    image_bytes: &[u8],
    config: &EnhanceConfig,
    clock: &C,
) -> Result<(EnhanceResult, PipelineDiagnostics), PipelineError> {
    let params = BilateralParams::from(config);
    validate_enhance(config, &params)?;
    let mut recorder = Recorder::new(clock);
    let counter = ColorCounter::new(config.max_distinct_colors);

    // 1. Decode.
    let decoded = run_decode(&mut recorder, image_bytes)?;
    let input_dimensions = decoded.dimensions();

    // 2. Source colors.
    let original_colors = run_count(&mut recorder, &counter, &decoded)?;

    // 3. Resample.
    let scaled = recorder.run(
        Stage::Resize,
        || resize::scale_by(decoded, config.upsample_scale),
        |scaled| StageMetrics::Resize {
            from: input_dimensions,
            to: scaled.dimensions(),
            applied: scaled.dimensions() != input_dimensions,
        },
    )?;

    // 4. Bilateral filter.
    let smoothed = recorder.run(
        Stage::Smooth,
        || smooth::bilateral_filter(&scaled, &params),
        |_| StageMetrics::Smooth {
            radius: params.radius(),
            sigma_color: params.sigma_color,
            sigma_space: params.sigma_space,
        },
    )?;

    // 5. Result colors.
    let result_colors = run_count(&mut recorder, &counter, &smoothed)?;

    // 6. Encode.
    let target = EncodeTarget::Jpeg {
        quality: config.jpeg_quality,
    };
    let image = run_encode(&mut recorder, &smoothed, target, false)?;

    let dimensions = smoothed.dimensions();
    tracing::debug!(
        original_colors,
        result_colors,
        original_size = image_bytes.len(),
        result_size = image.len(),
        "enhance finished",
    );

    let diagnostics = recorder.finish(
        PipelineKind::Enhance,
        PipelineSummary {
            input_bytes: image_bytes.len(),
            output_bytes: image.len(),
            input_dimensions,
            output_dimensions: dimensions,
            original_colors,
            result_colors,
        },
    );
    let result = EnhanceResult {
        image,
        original_colors,
        result_colors,
        original_size: image_bytes.len(),
        dimensions,
    };
    Ok((result, diagnostics))
}

fn validate_compress(config: &CompressConfig) -> Result<(), PipelineError> {
    quantize::check_palette_size(config.palette_size)?;
    if config.reduce_resolution {
        resize::check_max_dimension(config.max_dimension)?;
    }
    if config.output_format.resolve() == ImageFormat::Jpeg {
        encode::check_jpeg_quality(config.jpeg_quality)?;
    }
    Ok(())
}

fn validate_enhance(config: &EnhanceConfig, params: &BilateralParams) -> Result<(), PipelineError> {
    resize::check_scale(config.upsample_scale)?;
    params.validate()?;
    encode::check_jpeg_quality(config.jpeg_quality)
}

fn run_decode<C: Clock>(
    recorder: &mut Recorder<'_, C>,
    image_bytes: &[u8],
) -> Result<PixelBuffer, PipelineError> {
    recorder.run(
        Stage::Decode,
        || decode::decode(image_bytes),
        |decoded| StageMetrics::Decode {
            input_bytes: image_bytes.len(),
            width: decoded.width(),
            height: decoded.height(),
            pixel_count: decoded.dimensions().pixel_count(),
        },
    )
}

fn run_count<C: Clock>(
    recorder: &mut Recorder<'_, C>,
    counter: &ColorCounter,
    buffer: &PixelBuffer,
) -> Result<usize, PipelineError> {
    recorder.run(
        Stage::CountColors,
        || Ok(counter.count(buffer)),
        |&distinct_colors| StageMetrics::CountColors {
            distinct_colors,
            limit: counter.limit(),
            saturated: distinct_colors >= counter.limit(),
        },
    )
}

fn run_encode<C: Clock>(
    recorder: &mut Recorder<'_, C>,
    buffer: &PixelBuffer,
    target: EncodeTarget,
    optimize: bool,
) -> Result<EncodedImage, PipelineError> {
    recorder.run(
        Stage::Encode,
        || encode::encode(buffer, target, optimize),
        |encoded| StageMetrics::Encode {
            format: encoded.format(),
            quality: match encoded.target {
                EncodeTarget::Jpeg { quality } => Some(quality),
                EncodeTarget::Png => None,
            },
            output_bytes: encoded.len(),
        },
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    /// Encode `img` as a PNG byte buffer.
    fn png_bytes(img: &image::RgbImage) -> Vec<u8> {
        let mut buf = Vec::new();
        let encoder = image::codecs::png::PngEncoder::new(&mut buf);
        image::ImageEncoder::write_image(
            encoder,
            img.as_raw(),
            img.width(),
            img.height(),
            image::ExtendedColorType::Rgb8,
        )
        .unwrap();
        buf
    }

    /// A horizontal red-to-blue gradient with plenty of distinct colors.
    #[allow(clippy::cast_possible_truncation)]
    fn gradient_png(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::from_fn(width, height, |x, y| {
            let t = (x * 255 / width.max(1)) as u8;
            image::Rgb([t, (y % 256) as u8, 255 - t])
        });
        png_bytes(&img)
    }

    #[test]
    fn compress_empty_input() {
        let result = compress(&[], &CompressConfig::default());
        assert!(matches!(result, Err(PipelineError::EmptyInput)));
    }

    #[test]
    fn compress_corrupt_input() {
        let result = compress(&[0xFF, 0xFE, 0x00, 0x01], &CompressConfig::default());
        assert!(matches!(result, Err(PipelineError::ImageDecode(_))));
    }

    #[test]
    fn compress_bounds_palette_and_reports_counts() {
        let bytes = gradient_png(64, 32);
        let config = CompressConfig {
            palette_size: 8,
            output_format: OutputFormat::Png,
            ..CompressConfig::default()
        };
        let result = compress(&bytes, &config).unwrap();
        assert!(result.original_colors > 8);
        assert!(result.compressed_colors <= 8);
        assert!(result.palette_len <= 8);
        assert_eq!(result.original_size, bytes.len());
        assert_eq!(result.mime(), "image/png");

        // PNG is lossless, so the decoded output has the same count.
        let decoded = decode::decode(&result.image.bytes).unwrap();
        assert_eq!(
            ColorCounter::default().count(&decoded),
            result.compressed_colors
        );
    }

    #[test]
    fn compress_auto_format_is_jpeg() {
        let result = compress(&gradient_png(32, 32), &CompressConfig::default()).unwrap();
        assert_eq!(result.mime(), "image/jpeg");
        assert!(result.image.bytes.starts_with(&[0xFF, 0xD8]));
    }

    #[test]
    fn compress_without_reduction_keeps_dimensions() {
        let config = CompressConfig {
            reduce_resolution: false,
            max_dimension: 8,
            ..CompressConfig::default()
        };
        let result = compress(&gradient_png(40, 20), &config).unwrap();
        assert_eq!(
            result.dimensions,
            Dimensions {
                width: 40,
                height: 20
            }
        );
    }

    #[test]
    fn compress_reduces_long_side() {
        let config = CompressConfig {
            max_dimension: 16,
            ..CompressConfig::default()
        };
        let result = compress(&gradient_png(64, 32), &config).unwrap();
        assert_eq!(
            result.dimensions,
            Dimensions {
                width: 16,
                height: 8
            }
        );
    }

    #[test]
    fn compress_rejects_bad_parameters_before_decoding() {
        // Empty input would be a decode error; parameter checks run first.
        let cases = [
            (
                CompressConfig {
                    palette_size: 0,
                    ..CompressConfig::default()
                },
                "palette_size",
            ),
            (
                CompressConfig {
                    palette_size: 257,
                    ..CompressConfig::default()
                },
                "palette_size",
            ),
            (
                CompressConfig {
                    max_dimension: 0,
                    ..CompressConfig::default()
                },
                "max_dimension",
            ),
            (
                CompressConfig {
                    jpeg_quality: 0,
                    ..CompressConfig::default()
                },
                "jpeg_quality",
            ),
        ];
        for (config, expected) in cases {
            let err = compress(&[], &config).unwrap_err();
            assert!(
                matches!(err, PipelineError::InvalidParameter { name, .. } if name == expected),
                "expected {expected}, got {err}",
            );
        }
    }

    #[test]
    fn compress_png_ignores_jpeg_quality() {
        let config = CompressConfig {
            output_format: OutputFormat::Png,
            jpeg_quality: 0,
            ..CompressConfig::default()
        };
        assert!(compress(&gradient_png(8, 8), &config).is_ok());
    }

    #[test]
    fn compress_diagnostics_cover_each_stage() {
        let (result, diag) = compress_with_diagnostics(
            &gradient_png(64, 32),
            &CompressConfig::default(),
            &NullClock,
        )
        .unwrap();
        let stages: Vec<Stage> = diag.stages.iter().map(|s| s.stage).collect();
        assert_eq!(
            stages,
            vec![
                Stage::Decode,
                Stage::CountColors,
                Stage::Resize,
                Stage::Quantize,
                Stage::CountColors,
                Stage::Encode,
            ]
        );
        assert_eq!(diag.summary.original_colors, result.original_colors);
        assert_eq!(diag.summary.result_colors, result.compressed_colors);
        assert_eq!(diag.summary.output_bytes, result.compressed_size());
    }

    #[test]
    fn enhance_uniform_image_keeps_single_color() {
        let img = image::RgbImage::from_fn(50, 50, |_, _| image::Rgb([128, 128, 128]));
        let result = enhance(&png_bytes(&img), &EnhanceConfig::default()).unwrap();
        assert_eq!(result.original_colors, 1);
        assert_eq!(result.result_colors, 1);
        assert_eq!(result.mime(), "image/jpeg");
    }

    #[test]
    fn enhance_upsample_scales_dimensions() {
        let config = EnhanceConfig {
            upsample_scale: 2.0,
            ..EnhanceConfig::default()
        };
        let result = enhance(&gradient_png(20, 10), &config).unwrap();
        assert_eq!(
            result.dimensions,
            Dimensions {
                width: 40,
                height: 20
            }
        );
    }

    #[test]
    fn enhance_rejects_bad_parameters_before_decoding() {
        let cases = [
            (
                EnhanceConfig {
                    upsample_scale: 0.0,
                    ..EnhanceConfig::default()
                },
                "upsample_scale",
            ),
            (
                EnhanceConfig {
                    upsample_scale: f64::NAN,
                    ..EnhanceConfig::default()
                },
                "upsample_scale",
            ),
            (
                EnhanceConfig {
                    sigma_color: -1.0,
                    ..EnhanceConfig::default()
                },
                "sigma_color",
            ),
            (
                EnhanceConfig {
                    jpeg_quality: 101,
                    ..EnhanceConfig::default()
                },
                "jpeg_quality",
            ),
        ];
        for (config, expected) in cases {
            let err = enhance(&[], &config).unwrap_err();
            assert!(
                matches!(err, PipelineError::InvalidParameter { name, .. } if name == expected),
                "expected {expected}, got {err}",
            );
        }
    }

    #[test]
    fn enhance_diagnostics_cover_each_stage() {
        let (_, diag) =
            enhance_with_diagnostics(&gradient_png(16, 16), &EnhanceConfig::default(), &NullClock)
                .unwrap();
        let stages: Vec<Stage> = diag.stages.iter().map(|s| s.stage).collect();
        assert_eq!(
            stages,
            vec![
                Stage::Decode,
                Stage::CountColors,
                Stage::Resize,
                Stage::Smooth,
                Stage::CountColors,
                Stage::Encode,
            ]
        );
        assert!(matches!(
            diag.stage(Stage::Resize).unwrap().metrics,
            StageMetrics::Resize { applied: false, .. }
        ));
    }
}
