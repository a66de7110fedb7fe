//! Pipeline diagnostics: timing, counts, and other metrics for each stage.
//!
//! [`compress_with_diagnostics`](crate::compress_with_diagnostics) and
//! [`enhance_with_diagnostics`](crate::enhance_with_diagnostics) collect
//! these alongside their results. The plain [`compress`](crate::compress)
//! and [`enhance`](crate::enhance) entry points run the same code with a
//! [`NullClock`] and discard them.
//!
//! Time is read through the [`Clock`] trait so the library never touches
//! a platform clock itself. Durations are serialized as fractional
//! seconds (`f64`) for JSON compatibility, since `std::time::Duration`
//! does not implement serde traits.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{Dimensions, ImageFormat, PipelineError, Stage};

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// A monotonic time source.
pub trait Clock {
    /// Opaque point in time.
    type Instant;

    /// The current instant.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// A [`Clock`] that never advances. Every duration it reports is zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullClock;

impl Clock for NullClock {
    type Instant = ();

    fn now(&self) -> Self::Instant {}

    fn elapsed(&self, _: &Self::Instant) -> Duration {
        Duration::ZERO
    }
}

/// Which orchestrator produced a set of diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineKind {
    /// Palette compression.
    Compress,
    /// Bilateral enhancement.
    Enhance,
}

impl fmt::Display for PipelineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compress => f.write_str("compress"),
            Self::Enhance => f.write_str("enhance"),
        }
    }
}

/// Diagnostics collected from a single pipeline run.
///
/// Stages appear in execution order. Color counting runs twice, once on
/// the decoded input and once on the result before encoding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDiagnostics {
    /// Orchestrator that ran.
    pub pipeline: PipelineKind,
    /// Per-stage timing and metrics.
    pub stages: Vec<StageDiagnostics>,
    /// Total wall-clock duration of the entire pipeline (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Summary counts across all stages.
    pub summary: PipelineSummary,
}

/// Diagnostics for a single pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Which stage ran.
    pub stage: Stage,
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific metrics (counts, sizes, etc.).
    pub metrics: StageMetrics,
}

/// Stage-specific metrics that vary by pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StageMetrics {
    /// Image decoding metrics.
    Decode {
        /// Size of the input image bytes.
        input_bytes: usize,
        /// Decoded image width in pixels.
        width: u32,
        /// Decoded image height in pixels.
        height: u32,
        /// Total pixel count (`width * height`).
        pixel_count: u64,
    },
    /// Distinct-color counting metrics.
    CountColors {
        /// Distinct colors found (or the ceiling, if saturated).
        distinct_colors: usize,
        /// Configured ceiling.
        limit: usize,
        /// Whether the ceiling was reached.
        saturated: bool,
    },
    /// Resampling metrics.
    Resize {
        /// Dimensions before resampling.
        from: Dimensions,
        /// Dimensions after resampling.
        to: Dimensions,
        /// Whether resampling actually ran.
        applied: bool,
    },
    /// Palette quantization metrics.
    Quantize {
        /// Requested palette size K.
        requested: u16,
        /// Entries in the generated palette.
        palette_len: usize,
        /// Whether error diffusion was requested.
        dither: bool,
        /// Whether the palette held every source color.
        exact: bool,
    },
    /// Bilateral filter metrics.
    Smooth {
        /// Window radius in pixels.
        radius: usize,
        /// Color sigma.
        sigma_color: f64,
        /// Spatial sigma.
        sigma_space: f64,
    },
    /// Encoding metrics.
    Encode {
        /// Container written.
        format: ImageFormat,
        /// JPEG quality, if JPEG.
        quality: Option<u8>,
        /// Size of the encoded output.
        output_bytes: usize,
    },
}

/// High-level summary for the entire pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSummary {
    /// Size of the input bytes.
    pub input_bytes: usize,
    /// Size of the encoded output.
    pub output_bytes: usize,
    /// Decoded input dimensions.
    pub input_dimensions: Dimensions,
    /// Output dimensions.
    pub output_dimensions: Dimensions,
    /// Distinct colors in the decoded input.
    pub original_colors: usize,
    /// Distinct colors in the result before encoding.
    pub result_colors: usize,
}

impl PipelineSummary {
    /// `output_bytes / input_bytes`, or 0 for empty input.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn size_ratio(&self) -> f64 {
        if self.input_bytes == 0 {
            0.0
        } else {
            self.output_bytes as f64 / self.input_bytes as f64
        }
    }
}

impl PipelineDiagnostics {
    /// The first recorded run of `stage`, if any.
    #[must_use]
    pub fn stage(&self, stage: Stage) -> Option<&StageDiagnostics> {
        self.stages.iter().find(|s| s.stage == stage)
    }

    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!(
            "Pipeline Diagnostics Report ({})\n{}",
            self.pipeline,
            "=".repeat(60)
        ));
        lines.push(format!(
            "Image: {} -> {} ({} -> {} bytes, x{:.3})",
            self.summary.input_dimensions,
            self.summary.output_dimensions,
            self.summary.input_bytes,
            self.summary.output_bytes,
            self.summary.size_ratio(),
        ));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        // Per-stage breakdown.
        lines.push(format!(
            "{:<24} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);
        for diag in &self.stages {
            let ms = duration_ms(diag.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let name = diag.stage.to_string();
            let details = format_metrics(&diag.metrics);
            lines.push(format!("{name:<24} {ms:>8.3}ms {pct:>9.1}%  {details}"));
        }

        lines.push(String::new());
        lines.push(format!(
            "Colors: {} -> {}",
            self.summary.original_colors, self.summary.result_colors,
        ));

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Format stage metrics into a compact detail string.
fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Decode {
            input_bytes,
            width,
            height,
            ..
        } => format!("{input_bytes} bytes -> {width}x{height}"),
        StageMetrics::CountColors {
            distinct_colors,
            saturated,
            ..
        } => {
            if *saturated {
                format!("{distinct_colors}+ colors (saturated)")
            } else {
                format!("{distinct_colors} colors")
            }
        }
        StageMetrics::Resize { from, to, applied } => {
            if *applied {
                format!("{from} -> {to}")
            } else {
                format!("{from} (unchanged)")
            }
        }
        StageMetrics::Quantize {
            requested,
            palette_len,
            dither,
            exact,
        } => format!("k={requested} palette={palette_len} dither={dither} exact={exact}"),
        StageMetrics::Smooth {
            radius,
            sigma_color,
            sigma_space,
        } => format!("r={radius} sigma_color={sigma_color:.1} sigma_space={sigma_space:.1}"),
        StageMetrics::Encode {
            format,
            quality,
            output_bytes,
        } => match quality {
            Some(q) => format!("{format} q={q} {output_bytes} bytes"),
            None => format!("{format} {output_bytes} bytes"),
        },
    }
}

/// Times stages against a [`Clock`] and accumulates their metrics.
pub(crate) struct Recorder<'c, C: Clock> {
    clock: &'c C,
    started: C::Instant,
    stages: Vec<StageDiagnostics>,
}

impl<'c, C: Clock> Recorder<'c, C> {
    /// Start the total-duration timer.
    pub(crate) fn new(clock: &'c C) -> Self {
        Self {
            clock,
            started: clock.now(),
            stages: Vec::new(),
        }
    }

    /// Run one stage, timing `work` and recording `metrics` of its output.
    ///
    /// A failed stage is not recorded; the error propagates unchanged.
    pub(crate) fn run<T>(
        &mut self,
        stage: Stage,
        work: impl FnOnce() -> Result<T, PipelineError>,
        metrics: impl FnOnce(&T) -> StageMetrics,
    ) -> Result<T, PipelineError> {
        let start = self.clock.now();
        let value = work()?;
        let duration = self.clock.elapsed(&start);
        self.stages.push(StageDiagnostics {
            stage,
            duration,
            metrics: metrics(&value),
        });
        Ok(value)
    }

    /// Stop the total timer and assemble the diagnostics.
    pub(crate) fn finish(
        self,
        pipeline: PipelineKind,
        summary: PipelineSummary,
    ) -> PipelineDiagnostics {
        PipelineDiagnostics {
            pipeline,
            total_duration: self.clock.elapsed(&self.started),
            stages: self.stages,
            summary,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::cell::Cell;

    use super::*;

    /// Advances one millisecond every time it is read.
    #[derive(Default)]
    struct TickClock {
        ticks: Cell<u64>,
    }

    impl Clock for TickClock {
        type Instant = u64;

        fn now(&self) -> u64 {
            let t = self.ticks.get();
            self.ticks.set(t + 1);
            t
        }

        fn elapsed(&self, since: &u64) -> Duration {
            Duration::from_millis(self.now() - since)
        }
    }

    fn dims(width: u32, height: u32) -> Dimensions {
        Dimensions { width, height }
    }

    fn sample_summary() -> PipelineSummary {
        PipelineSummary {
            input_bytes: 1000,
            output_bytes: 250,
            input_dimensions: dims(2000, 1000),
            output_dimensions: dims(1024, 512),
            original_colors: 5000,
            result_colors: 16,
        }
    }

    #[test]
    fn duration_ms_converts_correctly() {
        let d = Duration::from_millis(1234);
        let ms = duration_ms(d);
        assert!((ms - 1234.0).abs() < 0.01);
    }

    #[test]
    fn null_clock_reports_zero() {
        let clock = NullClock;
        let start = clock.now();
        assert_eq!(clock.elapsed(&start), Duration::ZERO);
    }

    #[test]
    fn recorder_times_stages_in_order() {
        let clock = TickClock::default();
        let mut recorder = Recorder::new(&clock);

        let n = recorder
            .run(
                Stage::CountColors,
                || Ok(7_usize),
                |&n| StageMetrics::CountColors {
                    distinct_colors: n,
                    limit: 10,
                    saturated: false,
                },
            )
            .unwrap();
        assert_eq!(n, 7);
        recorder
            .run(
                Stage::Smooth,
                || Ok(()),
                |()| StageMetrics::Smooth {
                    radius: 4,
                    sigma_color: 75.0,
                    sigma_space: 75.0,
                },
            )
            .unwrap();

        let diag = recorder.finish(PipelineKind::Enhance, sample_summary());
        let stages: Vec<Stage> = diag.stages.iter().map(|s| s.stage).collect();
        assert_eq!(stages, vec![Stage::CountColors, Stage::Smooth]);
        assert!(diag.stages.iter().all(|s| s.duration == Duration::from_millis(1)));
        assert!(diag.total_duration > Duration::from_millis(2));
    }

    #[test]
    fn recorder_skips_failed_stage() {
        let clock = NullClock;
        let mut recorder = Recorder::new(&clock);
        let result: Result<(), _> = recorder.run(
            Stage::Decode,
            || Err(PipelineError::EmptyInput),
            |()| unreachable!(),
        );
        assert!(matches!(result, Err(PipelineError::EmptyInput)));
        let diag = recorder.finish(PipelineKind::Compress, sample_summary());
        assert!(diag.stages.is_empty());
    }

    #[test]
    fn size_ratio_handles_empty_input() {
        let mut summary = sample_summary();
        assert!((summary.size_ratio() - 0.25).abs() < f64::EPSILON);
        summary.input_bytes = 0;
        assert!(summary.size_ratio().abs() < f64::EPSILON);
    }

    #[test]
    fn report_lists_every_stage() {
        let diag = PipelineDiagnostics {
            pipeline: PipelineKind::Compress,
            stages: vec![
                StageDiagnostics {
                    stage: Stage::Decode,
                    duration: Duration::from_millis(10),
                    metrics: StageMetrics::Decode {
                        input_bytes: 1000,
                        width: 2000,
                        height: 1000,
                        pixel_count: 2_000_000,
                    },
                },
                StageDiagnostics {
                    stage: Stage::Resize,
                    duration: Duration::from_millis(30),
                    metrics: StageMetrics::Resize {
                        from: dims(2000, 1000),
                        to: dims(1024, 512),
                        applied: true,
                    },
                },
                StageDiagnostics {
                    stage: Stage::Quantize,
                    duration: Duration::from_millis(50),
                    metrics: StageMetrics::Quantize {
                        requested: 16,
                        palette_len: 16,
                        dither: true,
                        exact: false,
                    },
                },
                StageDiagnostics {
                    stage: Stage::Encode,
                    duration: Duration::from_millis(10),
                    metrics: StageMetrics::Encode {
                        format: ImageFormat::Png,
                        quality: None,
                        output_bytes: 250,
                    },
                },
            ],
            total_duration: Duration::from_millis(100),
            summary: sample_summary(),
        };

        let report = diag.report();
        assert!(report.contains("Pipeline Diagnostics Report (compress)"));
        assert!(report.contains("2000x1000 -> 1024x512"));
        assert!(report.contains("quantize"));
        assert!(report.contains("k=16 palette=16"));
        assert!(report.contains("png 250 bytes"));
        assert!(report.contains("Colors: 5000 -> 16"));
        assert!(diag.stage(Stage::Smooth).is_none());
        assert_eq!(
            diag.stage(Stage::Quantize).unwrap().duration,
            Duration::from_millis(50)
        );
    }

    #[test]
    fn diagnostics_serialize_durations_as_seconds() {
        let diag = PipelineDiagnostics {
            pipeline: PipelineKind::Enhance,
            stages: vec![StageDiagnostics {
                stage: Stage::CountColors,
                duration: Duration::from_millis(1500),
                metrics: StageMetrics::CountColors {
                    distinct_colors: 1,
                    limit: 10,
                    saturated: false,
                },
            }],
            total_duration: Duration::from_secs(2),
            summary: sample_summary(),
        };

        let json = serde_json::to_value(&diag).unwrap();
        assert_eq!(json["pipeline"], "enhance");
        assert_eq!(json["stages"][0]["stage"], "count_colors");
        assert!((json["stages"][0]["duration"].as_f64().unwrap() - 1.5).abs() < 1e-9);
        assert!((json["total_duration"].as_f64().unwrap() - 2.0).abs() < 1e-9);

        let back: PipelineDiagnostics = serde_json::from_value(json).unwrap();
        assert_eq!(back.stages[0].metrics, diag.stages[0].metrics);
    }
}
