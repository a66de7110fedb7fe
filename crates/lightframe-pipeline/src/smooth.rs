//! Edge-preserving smoothing with a bilateral filter.
//!
//! Every output pixel is a weighted mean of its neighborhood. A
//! neighbor's weight is the product of
//!
//! - a spatial Gaussian on its distance from the center pixel
//!   (`sigma_space`), and
//! - a range Gaussian on its color difference from the center pixel
//!   (`sigma_color`), using the L1 distance between RGB triples.
//!
//! Flat regions therefore blur like a plain Gaussian while pixels across
//! a strong edge contribute almost nothing. The window is circular with
//! radius `diameter / 2`. Borders are handled with reflect-101
//! (`… c b | a b c …`), so every neighborhood is complete.

use serde::{Deserialize, Serialize};

use crate::types::{EnhanceConfig, PipelineError, PixelBuffer, Stage};

/// Largest possible L1 distance between two RGB triples.
const MAX_COLOR_DISTANCE: usize = 3 * 255;

/// Bilateral filter parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BilateralParams {
    /// Window diameter in pixels. `<= 0` derives the radius from
    /// `sigma_space` as `round(1.5 * sigma_space)`.
    pub diameter: i32,
    /// Spread of the color-difference Gaussian.
    pub sigma_color: f64,
    /// Spread of the spatial Gaussian.
    pub sigma_space: f64,
}

impl Default for BilateralParams {
    fn default() -> Self {
        Self {
            diameter: EnhanceConfig::DEFAULT_DIAMETER,
            sigma_color: EnhanceConfig::DEFAULT_SIGMA_COLOR,
            sigma_space: EnhanceConfig::DEFAULT_SIGMA_SPACE,
        }
    }
}

impl From<&EnhanceConfig> for BilateralParams {
    fn from(config: &EnhanceConfig) -> Self {
        Self {
            diameter: config.diameter,
            sigma_color: config.sigma_color,
            sigma_space: config.sigma_space,
        }
    }
}

impl BilateralParams {
    /// Largest accepted window radius in pixels.
    pub const MAX_RADIUS: usize = 255;

    /// Neighborhood radius in pixels.
    ///
    /// Saturates at `usize::MAX` for absurd `sigma_space` values;
    /// [`bilateral_filter`] rejects anything above [`Self::MAX_RADIUS`].
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn radius(&self) -> usize {
        if self.diameter > 0 {
            (self.diameter / 2) as usize
        } else {
            (self.sigma_space * 1.5).round() as usize
        }
    }

    pub(crate) fn validate(&self) -> Result<(), PipelineError> {
        for (name, sigma) in [
            ("sigma_color", self.sigma_color),
            ("sigma_space", self.sigma_space),
        ] {
            if !sigma.is_finite() || sigma <= 0.0 {
                return Err(PipelineError::invalid(
                    Stage::Smooth,
                    name,
                    format!("must be a finite number greater than 0, got {sigma}"),
                ));
            }
        }

        let radius = self.radius();
        if radius > Self::MAX_RADIUS {
            let name = if self.diameter > 0 {
                "diameter"
            } else {
                "sigma_space"
            };
            return Err(PipelineError::invalid(
                Stage::Smooth,
                name,
                format!(
                    "window radius {radius} exceeds the maximum of {}",
                    Self::MAX_RADIUS
                ),
            ));
        }
        Ok(())
    }
}

/// A window offset and its spatial weight.
#[derive(Debug, Clone, Copy)]
struct Tap {
    dx: isize,
    dy: isize,
    weight: f32,
}

/// Offsets inside the circular window of `radius`, with their spatial
/// Gaussian weights. `radius` is at most [`BilateralParams::MAX_RADIUS`].
#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
fn spatial_taps(radius: usize, sigma_space: f64) -> Vec<Tap> {
    let r = radius as isize;
    let denom = -0.5 / (sigma_space * sigma_space);
    let mut taps = Vec::new();
    for dy in -r..=r {
        for dx in -r..=r {
            let dist_sq = dx * dx + dy * dy;
            if dist_sq > r * r {
                continue;
            }
            #[allow(clippy::cast_precision_loss)]
            let weight = (dist_sq as f64 * denom).exp() as f32;
            taps.push(Tap { dx, dy, weight });
        }
    }
    taps
}

/// Range weights indexed by L1 color distance.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn color_weights(sigma_color: f64) -> Vec<f32> {
    let denom = -0.5 / (sigma_color * sigma_color);
    (0..=MAX_COLOR_DISTANCE)
        .map(|d| ((d * d) as f64 * denom).exp() as f32)
        .collect()
}

/// Reflect-101 border index: mirror about the edge pixel without
/// repeating it.
#[allow(clippy::cast_sign_loss, clippy::cast_possible_wrap)]
const fn reflect_101(mut i: isize, len: usize) -> usize {
    let n = len as isize;
    if n == 1 {
        return 0;
    }
    // Loops only when the radius exceeds the image size.
    loop {
        if i < 0 {
            i = -i;
        } else if i >= n {
            i = 2 * n - 2 - i;
        } else {
            return i as usize;
        }
    }
}

/// Apply a bilateral filter to `buffer`.
///
/// Output dimensions equal input dimensions. A radius of zero returns
/// the input unchanged.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidParameter`] if either sigma is not a
/// finite positive number, or if the window radius exceeds
/// [`BilateralParams::MAX_RADIUS`].
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap
)]
pub fn bilateral_filter(
    buffer: &PixelBuffer,
    params: &BilateralParams,
) -> Result<PixelBuffer, PipelineError> {
    params.validate()?;
    let radius = params.radius();
    tracing::debug!(
        radius,
        sigma_color = params.sigma_color,
        sigma_space = params.sigma_space,
        dimensions = %buffer.dimensions(),
        "bilateral filter",
    );
    if radius == 0 {
        return Ok(buffer.clone());
    }

    let taps = spatial_taps(radius, params.sigma_space);
    let range = color_weights(params.sigma_color);

    let (w, h) = (buffer.width() as usize, buffer.height() as usize);
    let src = buffer.as_raw();
    let at = |x: usize, y: usize| {
        let i = (y * w + x) * PixelBuffer::CHANNELS;
        [src[i], src[i + 1], src[i + 2]]
    };

    let mut out = Vec::with_capacity(src.len());
    for y in 0..h {
        for x in 0..w {
            let center = at(x, y);
            let mut sum = [0f32; 3];
            let mut weight_sum = 0f32;

            for tap in &taps {
                let nx = reflect_101(x as isize + tap.dx, w);
                let ny = reflect_101(y as isize + tap.dy, h);
                let neighbor = at(nx, ny);

                let distance: usize = (0..3)
                    .map(|c| usize::from(neighbor[c].abs_diff(center[c])))
                    .sum();
                let weight = tap.weight * range[distance];

                for c in 0..3 {
                    sum[c] += f32::from(neighbor[c]) * weight;
                }
                weight_sum += weight;
            }

            if weight_sum > 0.0 {
                for c in 0..3 {
                    out.push((sum[c] / weight_sum).round().clamp(0.0, 255.0) as u8);
                }
            } else {
                out.extend_from_slice(&center);
            }
        }
    }

    PixelBuffer::from_raw(buffer.width(), buffer.height(), out).map_err(|source| {
        PipelineError::InvalidBuffer {
            stage: Stage::Smooth,
            source,
        }
    })
}
