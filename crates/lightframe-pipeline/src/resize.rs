//! Lanczos resampling.
//!
//! The compression path only ever shrinks: [`fit_within`] reduces the
//! image so its long side matches `max_dimension` and leaves smaller
//! images untouched. The enhancement path uses [`scale_by`] to resample
//! by an arbitrary positive factor before filtering.
//!
//! Both go through the `image` crate's three-lobe Lanczos filter.

use image::imageops::FilterType;

use crate::types::{Dimensions, PipelineError, PixelBuffer, Stage};

/// Target dimensions for shrinking `source` so its long side is at most
/// `max_dimension`, or `None` if it already fits.
///
/// Each side is scaled by `max_dimension / long_side` and rounded to the
/// nearest pixel, never below one.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::suboptimal_flops
)]
pub fn fit_dimensions(source: Dimensions, max_dimension: u32) -> Option<Dimensions> {
    let long_side = source.long_side();
    if long_side <= max_dimension {
        return None;
    }

    let scale = f64::from(max_dimension) / f64::from(long_side);
    let side = |v: u32| ((f64::from(v) * scale).round() as u32).max(1);
    Some(Dimensions {
        width: side(source.width),
        height: side(source.height),
    })
}

/// Target dimensions for resampling `source` by `factor`.
///
/// Sides are truncated toward zero and clamped to at least one pixel.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn scaled_dimensions(source: Dimensions, factor: f64) -> Dimensions {
    let side = |v: u32| {
        let scaled = (f64::from(v) * factor).floor();
        if scaled >= f64::from(u32::MAX) {
            u32::MAX
        } else {
            (scaled as u32).max(1)
        }
    };
    Dimensions {
        width: side(source.width),
        height: side(source.height),
    }
}

/// Validate a long-side ceiling.
pub(crate) fn check_max_dimension(max_dimension: u32) -> Result<(), PipelineError> {
    if max_dimension == 0 {
        return Err(PipelineError::invalid(
            Stage::Resize,
            "max_dimension",
            "must be at least 1",
        ));
    }
    Ok(())
}

/// Validate a resample factor.
pub(crate) fn check_scale(factor: f64) -> Result<(), PipelineError> {
    if !factor.is_finite() || factor <= 0.0 {
        return Err(PipelineError::invalid(
            Stage::Resize,
            "upsample_scale",
            format!("must be a finite number greater than 0, got {factor}"),
        ));
    }
    Ok(())
}

/// Reject targets whose pixel storage would exceed the `image` crate's
/// default allocation limit, the same ceiling decoding runs under.
pub(crate) fn check_target_size(target: Dimensions) -> Result<(), PipelineError> {
    let limit = image::Limits::default().max_alloc.unwrap_or(u64::MAX);
    let bytes = u64::from(target.width)
        .saturating_mul(u64::from(target.height))
        .saturating_mul(PixelBuffer::CHANNELS as u64);
    if bytes > limit {
        return Err(PipelineError::invalid(
            Stage::Resize,
            "upsample_scale",
            format!("resampled image {target} needs {bytes} bytes, above the {limit} byte limit"),
        ));
    }
    Ok(())
}

/// Shrink `buffer` so its long side is at most `max_dimension`.
///
/// Returns the (possibly unchanged) buffer and whether resampling was
/// actually applied.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidParameter`] if `max_dimension` is 0.
pub fn fit_within(
    buffer: PixelBuffer,
    max_dimension: u32,
) -> Result<(PixelBuffer, bool), PipelineError> {
    check_max_dimension(max_dimension)?;

    match fit_dimensions(buffer.dimensions(), max_dimension) {
        None => Ok((buffer, false)),
        Some(target) => resample(&buffer, target).map(|resized| (resized, true)),
    }
}

/// Resample `buffer` by `factor` (greater than one enlarges).
///
/// A factor of exactly `1.0`, or one that leaves both sides unchanged,
/// returns the input as-is.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidParameter`] unless `factor` is finite
/// and positive, or if the enlarged image would exceed the decoder's
/// default allocation limit.
pub fn scale_by(buffer: PixelBuffer, factor: f64) -> Result<PixelBuffer, PipelineError> {
    check_scale(factor)?;

    let target = scaled_dimensions(buffer.dimensions(), factor);
    if target == buffer.dimensions() {
        return Ok(buffer);
    }
    check_target_size(target)?;
    resample(&buffer, target)
}

/// Lanczos-resample `buffer` to exactly `target`.
fn resample(buffer: &PixelBuffer, target: Dimensions) -> Result<PixelBuffer, PipelineError> {
    tracing::debug!(
        from = %buffer.dimensions(),
        to = %target,
        "lanczos resample",
    );
    let resized = image::imageops::resize(
        buffer.as_image(),
        target.width,
        target.height,
        FilterType::Lanczos3,
    );
    PixelBuffer::from_image(resized).map_err(|source| PipelineError::InvalidBuffer {
        stage: Stage::Resize,
        source,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn test_buffer(w: u32, h: u32) -> PixelBuffer {
        PixelBuffer::from_fn(w, h, |_, _| [128, 128, 128]).unwrap()
    }

    #[test]
    fn no_resize_when_already_small() {
        let buf = test_buffer(100, 80);
        let (result, applied) = fit_within(buf.clone(), 256).unwrap();
        assert!(!applied);
        assert_eq!(result, buf);
    }

    #[test]
    fn no_resize_when_exact_match() {
        let (result, applied) = fit_within(test_buffer(256, 200), 256).unwrap();
        assert!(!applied);
        assert_eq!((result.width(), result.height()), (256, 200));
    }

    #[test]
    fn shrink_landscape() {
        let (result, applied) = fit_within(test_buffer(1024, 768), 256).unwrap();
        assert!(applied);
        assert_eq!(result.width(), 256);
        // Aspect ratio preserved: 768 * 256 / 1024 = 192
        assert_eq!(result.height(), 192);
    }

    #[test]
    fn shrink_portrait() {
        let (result, applied) = fit_within(test_buffer(600, 1200), 256).unwrap();
        assert!(applied);
        // Long axis is height (1200), so height becomes 256
        assert_eq!(result.height(), 256);
        // 600 * 256 / 1200 = 128
        assert_eq!(result.width(), 128);
    }

    #[test]
    fn fit_dimensions_rounds_to_nearest() {
        // 1000 * 1024 / 2000 = 512 exactly
        let d = fit_dimensions(
            Dimensions {
                width: 2000,
                height: 1000,
            },
            1024,
        )
        .unwrap();
        assert_eq!((d.width, d.height), (1024, 512));

        let d = fit_dimensions(
            Dimensions {
                width: 1000,
                height: 337,
            },
            100,
        )
        .unwrap();
        // 33.7 rounds up
        assert_eq!((d.width, d.height), (100, 34));
    }

    #[test]
    fn fit_dimensions_never_collapses_to_zero() {
        let d = fit_dimensions(
            Dimensions {
                width: 5000,
                height: 1,
            },
            10,
        )
        .unwrap();
        assert_eq!((d.width, d.height), (10, 1));
    }

    #[test]
    fn zero_max_dimension_is_rejected() {
        let err = fit_within(test_buffer(4, 4), 0).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::InvalidParameter {
                name: "max_dimension",
                ..
            }
        ));
    }

    #[test]
    fn scale_by_one_is_identity() {
        let buf = PixelBuffer::from_fn(7, 5, |x, y| [x as u8, y as u8, 3]).unwrap();
        assert_eq!(scale_by(buf.clone(), 1.0).unwrap(), buf);
    }

    #[test]
    fn scale_by_two_doubles_sides() {
        let result = scale_by(test_buffer(30, 20), 2.0).unwrap();
        assert_eq!((result.width(), result.height()), (60, 40));
    }

    #[test]
    fn scale_by_truncates_fractional_sides() {
        let result = scale_by(test_buffer(10, 7), 1.5).unwrap();
        assert_eq!((result.width(), result.height()), (15, 10));
    }

    #[test]
    fn scale_by_rejects_non_positive_and_nan() {
        for factor in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let err = scale_by(test_buffer(4, 4), factor).unwrap_err();
            assert!(
                matches!(
                    err,
                    PipelineError::InvalidParameter {
                        name: "upsample_scale",
                        ..
                    }
                ),
                "factor {factor} should be rejected",
            );
        }
    }

    #[test]
    fn scale_by_rejects_oversized_targets() {
        let err = scale_by(test_buffer(10, 10), 1.0e12).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::InvalidParameter {
                name: "upsample_scale",
                ..
            }
        ));
    }

    #[test]
    fn target_size_limit_counts_all_channels() {
        let limit = image::Limits::default().max_alloc.unwrap();
        let side = |pixels: u64| Dimensions {
            width: u32::try_from(pixels).unwrap(),
            height: 1,
        };
        assert!(check_target_size(side(limit / 3)).is_ok());
        assert!(check_target_size(side(limit / 3 + 1)).is_err());
        assert!(
            check_target_size(Dimensions {
                width: u32::MAX,
                height: u32::MAX,
            })
            .is_err()
        );
    }

    #[test]
    fn resampling_uniform_image_keeps_color() {
        let (result, _) = fit_within(test_buffer(400, 300), 100).unwrap();
        assert!(result.pixels().all(|p| p == [128, 128, 128]));
    }
}
