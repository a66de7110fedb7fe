//! lightframe: command-line front end for the compress and enhance pipelines.
//!
//! Reads an image file, runs it through
//! [`lightframe_pipeline::compress`] or [`lightframe_pipeline::enhance`],
//! writes the encoded result next to the input (or to `--output`), and
//! prints a summary of sizes and color counts.
//!
//! # Usage
//!
//! ```text
//! lightframe compress [OPTIONS] <INPUT>
//! lightframe enhance [OPTIONS] <INPUT>
//! ```
//!
//! Set `RUST_LOG` (or pass `-v`) to see per-stage pipeline logs.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use lightframe_pipeline::diagnostics::{Clock, PipelineDiagnostics};
use lightframe_pipeline::{CompressConfig, EnhanceConfig, ImageFormat, OutputFormat};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Shrink images with adaptive palettes, or smooth them with an
/// edge-preserving bilateral filter.
#[derive(Parser)]
#[command(name = "lightframe", version)]
struct Cli {
    /// Log pipeline stages at debug level (unless `RUST_LOG` is set).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Reduce the image to a small adaptive palette and re-encode it.
    Compress(CompressArgs),
    /// Smooth the image with a bilateral filter and re-encode it as JPEG.
    Enhance(EnhanceArgs),
}

/// Input, output, and reporting options shared by both subcommands.
#[derive(Args)]
struct IoArgs {
    /// Path to the input image (PNG, JPEG, BMP, GIF, WebP).
    input: PathBuf,

    /// Where to write the result. Defaults to `<stem>.<command>.<ext>`
    /// next to the input.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print the summary and diagnostics as JSON.
    #[arg(long)]
    json: bool,

    /// Print the per-stage diagnostics report.
    #[arg(long)]
    report: bool,

    /// Full pipeline config as a JSON string.
    ///
    /// When provided, all other pipeline parameter flags are ignored.
    /// Missing fields take their defaults.
    #[arg(long)]
    config_json: Option<String>,
}

#[derive(Args)]
struct CompressArgs {
    #[command(flatten)]
    io: IoArgs,

    /// Maximum number of palette colors (1-256).
    #[arg(long, default_value_t = CompressConfig::DEFAULT_PALETTE_SIZE, value_parser = clap::builder::RangedU64ValueParser::<u16>::new().range(1..=256))]
    palette_size: u16,

    /// Output container: auto, jpeg, jpg, or png.
    #[arg(long, default_value_t = OutputFormat::Auto, value_parser = parse_output_format)]
    format: OutputFormat,

    /// Keep the original resolution.
    #[arg(long)]
    no_reduce: bool,

    /// Long-side ceiling in pixels when reducing resolution.
    #[arg(long, default_value_t = CompressConfig::DEFAULT_MAX_DIMENSION, value_parser = clap::builder::RangedU64ValueParser::<u32>::new().range(1..))]
    max_dimension: u32,

    /// JPEG quality (1-100).
    #[arg(long, default_value_t = CompressConfig::DEFAULT_JPEG_QUALITY, value_parser = clap::builder::RangedU64ValueParser::<u8>::new().range(1..=100))]
    jpeg_quality: u8,

    /// Map to the nearest palette color without error diffusion.
    #[arg(long)]
    no_dither: bool,

    /// Use the faster, larger PNG encoding.
    #[arg(long)]
    no_optimize: bool,

    /// Ceiling for exact distinct-color counting.
    #[arg(long, default_value_t = CompressConfig::DEFAULT_MAX_DISTINCT_COLORS)]
    max_distinct_colors: usize,
}

#[derive(Args)]
struct EnhanceArgs {
    #[command(flatten)]
    io: IoArgs,

    /// Bilateral window diameter. Zero or negative derives it from
    /// `--sigma-space`.
    #[arg(long, default_value_t = EnhanceConfig::DEFAULT_DIAMETER, allow_negative_numbers = true)]
    diameter: i32,

    /// Spread of the color-difference Gaussian.
    #[arg(long, default_value_t = EnhanceConfig::DEFAULT_SIGMA_COLOR)]
    sigma_color: f64,

    /// Spread of the spatial Gaussian.
    #[arg(long, default_value_t = EnhanceConfig::DEFAULT_SIGMA_SPACE)]
    sigma_space: f64,

    /// Resample factor applied before filtering.
    #[arg(long, default_value_t = EnhanceConfig::DEFAULT_UPSAMPLE_SCALE)]
    upsample_scale: f64,

    /// JPEG quality (1-100).
    #[arg(long, default_value_t = EnhanceConfig::DEFAULT_JPEG_QUALITY, value_parser = clap::builder::RangedU64ValueParser::<u8>::new().range(1..=100))]
    jpeg_quality: u8,

    /// Ceiling for exact distinct-color counting.
    #[arg(long, default_value_t = CompressConfig::DEFAULT_MAX_DISTINCT_COLORS)]
    max_distinct_colors: usize,
}

fn parse_output_format(s: &str) -> Result<OutputFormat, String> {
    s.parse::<OutputFormat>().map_err(|e| e.to_string())
}

/// Build a [`CompressConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and all
/// individual parameter flags are ignored.
fn compress_config(args: &CompressArgs) -> anyhow::Result<CompressConfig> {
    if let Some(ref json) = args.io.config_json {
        return serde_json::from_str(json).context("parsing --config-json");
    }

    Ok(CompressConfig {
        palette_size: args.palette_size,
        output_format: args.format,
        reduce_resolution: !args.no_reduce,
        jpeg_quality: args.jpeg_quality,
        max_dimension: args.max_dimension,
        dither: !args.no_dither,
        optimize: !args.no_optimize,
        max_distinct_colors: args.max_distinct_colors,
    })
}

/// Build an [`EnhanceConfig`] from CLI arguments. Same `--config-json`
/// rule as [`compress_config`].
fn enhance_config(args: &EnhanceArgs) -> anyhow::Result<EnhanceConfig> {
    if let Some(ref json) = args.io.config_json {
        return serde_json::from_str(json).context("parsing --config-json");
    }

    Ok(EnhanceConfig {
        diameter: args.diameter,
        sigma_color: args.sigma_color,
        sigma_space: args.sigma_space,
        upsample_scale: args.upsample_scale,
        jpeg_quality: args.jpeg_quality,
        max_distinct_colors: args.max_distinct_colors,
        ..EnhanceConfig::default()
    })
}

/// Output path: `--output` if given, else `<stem>.<suffix>.<ext>` beside
/// the input.
fn output_path(io: &IoArgs, suffix: &str, format: ImageFormat) -> PathBuf {
    if let Some(ref path) = io.output {
        return path.clone();
    }
    let stem = io
        .input
        .file_stem()
        .map_or_else(|| "image".into(), |s| s.to_string_lossy());
    io.input
        .with_file_name(format!("{stem}.{suffix}.{}", format.extension()))
}

/// What a run produced, in the shape printed to the user.
#[derive(Serialize)]
struct Summary<'a> {
    input: &'a Path,
    output: &'a Path,
    mime: &'static str,
    width: u32,
    height: u32,
    original_size: usize,
    result_size: usize,
    original_colors: usize,
    result_colors: usize,
}

#[derive(Serialize)]
struct JsonOutput<'a> {
    summary: &'a Summary<'a>,
    diagnostics: &'a PipelineDiagnostics,
}

fn print_summary(summary: &Summary<'_>) {
    println!("Input:   {}", summary.input.display());
    println!(
        "Output:  {} ({}, {}x{})",
        summary.output.display(),
        summary.mime,
        summary.width,
        summary.height,
    );
    println!(
        "Size:    {} -> {} bytes",
        summary.original_size, summary.result_size,
    );
    println!(
        "Colors:  {} -> {}",
        summary.original_colors, summary.result_colors,
    );
}

fn emit(io: &IoArgs, summary: &Summary<'_>, diagnostics: &PipelineDiagnostics) -> anyhow::Result<()> {
    if io.json {
        let json = serde_json::to_string_pretty(&JsonOutput {
            summary,
            diagnostics,
        })
        .context("serializing summary")?;
        println!("{json}");
        return Ok(());
    }

    print_summary(summary);
    if io.report {
        println!();
        println!("{}", diagnostics.report());
    }
    Ok(())
}

fn read_input(path: &Path) -> anyhow::Result<Vec<u8>> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    tracing::debug!(path = %path.display(), bytes = bytes.len(), "read input");
    Ok(bytes)
}

fn write_output(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    std::fs::write(path, bytes).with_context(|| format!("writing {}", path.display()))
}

fn run_compress(args: &CompressArgs) -> anyhow::Result<()> {
    let config = compress_config(args)?;
    let bytes = read_input(&args.io.input)?;

    let (result, diagnostics) =
        lightframe_pipeline::compress_with_diagnostics(&bytes, &config, &StdClock)
            .with_context(|| format!("compressing {}", args.io.input.display()))?;

    let output = output_path(&args.io, "compressed", result.image.format());
    write_output(&output, &result.image.bytes)?;

    let summary = Summary {
        input: &args.io.input,
        output: &output,
        mime: result.mime(),
        width: result.dimensions.width,
        height: result.dimensions.height,
        original_size: result.original_size,
        result_size: result.compressed_size(),
        original_colors: result.original_colors,
        result_colors: result.compressed_colors,
    };
    emit(&args.io, &summary, &diagnostics)
}

fn run_enhance(args: &EnhanceArgs) -> anyhow::Result<()> {
    let config = enhance_config(args)?;
    let bytes = read_input(&args.io.input)?;

    let (result, diagnostics) =
        lightframe_pipeline::enhance_with_diagnostics(&bytes, &config, &StdClock)
            .with_context(|| format!("enhancing {}", args.io.input.display()))?;

    let output = output_path(&args.io, "enhanced", result.image.format());
    write_output(&output, &result.image.bytes)?;

    let summary = Summary {
        input: &args.io.input,
        output: &output,
        mime: result.mime(),
        width: result.dimensions.width,
        height: result.dimensions.height,
        original_size: result.original_size,
        result_size: result.result_size(),
        original_colors: result.original_colors,
        result_colors: result.result_colors,
    };
    emit(&args.io, &summary, &diagnostics)
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "lightframe=debug,lightframe_pipeline=debug"
    } else {
        "lightframe=warn,lightframe_pipeline=warn"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .without_time()
                .with_writer(std::io::stderr),
        )
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let outcome = match &cli.command {
        Command::Compress(args) => run_compress(args),
        Command::Enhance(args) => run_enhance(args),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// [`Clock`] implementation backed by [`std::time::Instant`].
struct StdClock;

impl Clock for StdClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn elapsed(&self, since: &Instant) -> Duration {
        since.elapsed()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("lightframe").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn compress_flags_build_config() {
        let cli = parse(&[
            "compress",
            "photo.png",
            "--palette-size",
            "32",
            "--format",
            "PNG",
            "--no-dither",
            "--no-reduce",
        ]);
        let Command::Compress(args) = cli.command else {
            unreachable!("expected compress subcommand");
        };
        let config = compress_config(&args).unwrap();
        assert_eq!(config.palette_size, 32);
        assert_eq!(config.output_format, OutputFormat::Png);
        assert!(!config.dither);
        assert!(!config.reduce_resolution);
        assert_eq!(config.jpeg_quality, CompressConfig::DEFAULT_JPEG_QUALITY);
    }

    #[test]
    fn compress_defaults_match_library() {
        let cli = parse(&["compress", "photo.png"]);
        let Command::Compress(args) = cli.command else {
            unreachable!("expected compress subcommand");
        };
        assert_eq!(compress_config(&args).unwrap(), CompressConfig::default());
    }

    #[test]
    fn enhance_defaults_match_library() {
        let cli = parse(&["enhance", "photo.png"]);
        let Command::Enhance(args) = cli.command else {
            unreachable!("expected enhance subcommand");
        };
        assert_eq!(enhance_config(&args).unwrap(), EnhanceConfig::default());
    }

    #[test]
    fn enhance_accepts_negative_diameter() {
        let cli = parse(&["enhance", "photo.png", "--diameter", "-1"]);
        let Command::Enhance(args) = cli.command else {
            unreachable!("expected enhance subcommand");
        };
        assert_eq!(enhance_config(&args).unwrap().diameter, -1);
    }

    #[test]
    fn config_json_overrides_flags() {
        let cli = parse(&[
            "compress",
            "photo.png",
            "--palette-size",
            "200",
            "--config-json",
            r#"{"palette_size": 4}"#,
        ]);
        let Command::Compress(args) = cli.command else {
            unreachable!("expected compress subcommand");
        };
        let config = compress_config(&args).unwrap();
        assert_eq!(config.palette_size, 4);
        assert_eq!(config.max_dimension, CompressConfig::DEFAULT_MAX_DIMENSION);
    }

    #[test]
    fn bad_config_json_is_an_error() {
        let cli = parse(&["enhance", "photo.png", "--config-json", "{not json"]);
        let Command::Enhance(args) = cli.command else {
            unreachable!("expected enhance subcommand");
        };
        assert!(enhance_config(&args).is_err());
    }

    #[test]
    fn unknown_format_rejected_at_parse_time() {
        let result = Cli::try_parse_from(["lightframe", "compress", "a.png", "--format", "tiff"]);
        assert!(result.is_err());
    }

    #[test]
    fn palette_size_out_of_range_rejected() {
        for bad in ["0", "257"] {
            let result =
                Cli::try_parse_from(["lightframe", "compress", "a.png", "--palette-size", bad]);
            assert!(result.is_err(), "palette size {bad} should be rejected");
        }
    }

    #[test]
    fn default_output_path_sits_beside_input() {
        let cli = parse(&["compress", "/tmp/shots/photo.jpeg"]);
        let Command::Compress(args) = cli.command else {
            unreachable!("expected compress subcommand");
        };
        assert_eq!(
            output_path(&args.io, "compressed", ImageFormat::Png),
            PathBuf::from("/tmp/shots/photo.compressed.png")
        );

        let cli = parse(&["enhance", "photo.png", "-o", "out.jpg"]);
        let Command::Enhance(args) = cli.command else {
            unreachable!("expected enhance subcommand");
        };
        assert_eq!(
            output_path(&args.io, "enhanced", ImageFormat::Jpeg),
            PathBuf::from("out.jpg")
        );
    }
}
