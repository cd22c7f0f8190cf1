//! curvetrace: digitize plotted curves from graph images.
//!
//! Reads one or more image files, runs the digitization engine on each
//! (in parallel, one independent request per image) and prints the
//! results as JSON on stdout. Logs go to stderr.
//!
//! - `palette` lists the dominant colors of each image, to find out which
//!   curve colors to ask for.
//! - `extract` digitizes the requested colors into calibrated `(x, y)`
//!   series, optionally writing CSV and SVG files next to the JSON.
//!   `--report` prints per-stage timing diagnostics instead.
//!
//! # Usage
//!
//! ```text
//! curvetrace palette graph.png
//! curvetrace -v extract --color red,blue --x-max 10 --y-min 1 --y-max 1000 \
//!     --y-scale-type log graph.png
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand, ValueEnum};
use curvetrace_pipeline::diagnostics::DigitizeDiagnostics;
use curvetrace_pipeline::presets::DEFAULT_LOG_EPSILON;
use curvetrace_pipeline::{
    CalibrationContext, Color, ExtractionResult, GraphConfig, MarginOverrides, Preset,
    PresetSelection, Scale, SystemClock,
};
use rayon::prelude::*;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

/// Digitize plotted curves from datasheet graph images.
#[derive(Parser)]
#[command(name = "curvetrace", version)]
struct Cli {
    /// Increase log verbosity (`-v` info, `-vv` debug). `RUST_LOG` wins
    /// when set.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the dominant colors of each image as JSON.
    Palette(PaletteArgs),
    /// Digitize the curves of the requested colors.
    Extract(ExtractArgs),
}

#[derive(Args)]
struct PaletteArgs {
    /// Input images (PNG, JPEG, BMP, WebP).
    #[arg(required = true)]
    images: Vec<PathBuf>,

    /// Minimum pixel count for a color to be listed.
    #[arg(long, default_value_t = GraphConfig::DEFAULT_MIN_SIZE)]
    min_size: u32,
}

#[derive(Args)]
struct ExtractArgs {
    /// Input images (PNG, JPEG, BMP, WebP).
    #[arg(required = true)]
    images: Vec<PathBuf>,

    /// Curve colors to digitize (repeat or separate with commas).
    #[arg(short, long = "color", value_delimiter = ',', required = true)]
    colors: Vec<String>,

    /// Logical value at the left edge of the plot area.
    #[arg(long, allow_negative_numbers = true)]
    x_min: Option<f64>,

    /// Logical value at the right edge of the plot area.
    #[arg(long, allow_negative_numbers = true)]
    x_max: Option<f64>,

    /// Logical value at the bottom edge of the plot area.
    #[arg(long, allow_negative_numbers = true)]
    y_min: Option<f64>,

    /// Logical value at the top edge of the plot area.
    #[arg(long, allow_negative_numbers = true)]
    y_max: Option<f64>,

    /// Unit multiplier applied to the x bounds.
    #[arg(long, default_value_t = GraphConfig::DEFAULT_UNIT_SCALE)]
    x_scale: f64,

    /// Unit multiplier applied to the y bounds.
    #[arg(long, default_value_t = GraphConfig::DEFAULT_UNIT_SCALE)]
    y_scale: f64,

    /// Spacing of the x axis.
    #[arg(long, value_enum, default_value_t = AxisScale::Linear)]
    x_scale_type: AxisScale,

    /// Spacing of the y axis.
    #[arg(long, value_enum, default_value_t = AxisScale::Linear)]
    y_scale_type: AxisScale,

    /// Minimum pixel count for a color to count as detected.
    #[arg(long, default_value_t = GraphConfig::DEFAULT_MIN_SIZE)]
    min_size: u32,

    /// Per-channel tolerance around each named color.
    #[arg(long, default_value_t = GraphConfig::DEFAULT_COLOR_TOLERANCE)]
    color_tolerance: u8,

    /// X axis label, used to pick a margin preset.
    #[arg(long, default_value = "")]
    x_name: String,

    /// Y axis label, used to pick a margin preset.
    #[arg(long, default_value = "")]
    y_name: String,

    /// Full graph config as a JSON string.
    ///
    /// When provided, all other graph flags are ignored. The JSON must be a
    /// `GraphConfig` serialization; missing fields take their defaults.
    #[arg(long)]
    config_json: Option<String>,

    /// Margin preset (standard, simple, dense-label, device:mosfet-output, ...).
    #[arg(long, conflicts_with = "generic")]
    preset: Option<Preset>,

    /// Skip preset detection and use the scaled default margins.
    #[arg(long)]
    generic: bool,

    /// Left margin override in pixels.
    #[arg(long)]
    margin_left: Option<f64>,

    /// Right margin override in pixels.
    #[arg(long)]
    margin_right: Option<f64>,

    /// Top margin override in pixels.
    #[arg(long)]
    margin_top: Option<f64>,

    /// Bottom margin override in pixels.
    #[arg(long)]
    margin_bottom: Option<f64>,

    /// Value substituted for a non-positive log-axis minimum.
    #[arg(long, default_value_t = DEFAULT_LOG_EPSILON)]
    log_epsilon: f64,

    /// Full calibration context as a JSON string.
    ///
    /// When provided, the preset, margin and epsilon flags are ignored.
    #[arg(long)]
    context_json: Option<String>,

    /// Print per-stage diagnostics instead of JSON results.
    #[arg(long)]
    report: bool,

    /// Number of runs per image for averaging (with `--report`).
    #[arg(long, default_value_t = 1, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    runs: usize,

    /// Directory to write `<image stem>.csv` files into.
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Directory to write `<image stem>.svg` plots into.
    #[arg(long)]
    svg: Option<PathBuf>,
}

/// Axis spacing selection.
#[derive(Clone, Copy, ValueEnum)]
enum AxisScale {
    /// Evenly spaced values.
    Linear,
    /// Evenly spaced decades.
    Log,
}

impl From<AxisScale> for Scale {
    fn from(scale: AxisScale) -> Self {
        match scale {
            AxisScale::Linear => Self::Linear,
            AxisScale::Log => Self::Log,
        }
    }
}

/// Build a [`GraphConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and all
/// individual graph flags are ignored. Otherwise a config is assembled
/// from the flags, with unset bounds taking the library defaults.
fn config_from_cli(args: &ExtractArgs) -> Result<GraphConfig, String> {
    if let Some(ref json) = args.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }

    let defaults = GraphConfig::default();
    Ok(GraphConfig {
        x_min: args.x_min.unwrap_or(defaults.x_min),
        x_max: args.x_max.unwrap_or(defaults.x_max),
        y_min: args.y_min.unwrap_or(defaults.y_min),
        y_max: args.y_max.unwrap_or(defaults.y_max),
        x_scale: args.x_scale,
        y_scale: args.y_scale,
        x_scale_type: args.x_scale_type.into(),
        y_scale_type: args.y_scale_type.into(),
        min_size: args.min_size,
        color_tolerance: args.color_tolerance,
        x_axis_name: args.x_name.clone(),
        y_axis_name: args.y_name.clone(),
        ..defaults
    })
}

/// Build a [`CalibrationContext`] from CLI arguments.
///
/// `--context-json` takes precedence over the individual flags.
fn context_from_cli(args: &ExtractArgs) -> Result<CalibrationContext, String> {
    if let Some(ref json) = args.context_json {
        return serde_json::from_str(json)
            .map_err(|e| format!("Error parsing --context-json: {e}"));
    }

    let preset = match (args.preset, args.generic) {
        (Some(preset), _) => PresetSelection::Manual(preset),
        (None, true) => PresetSelection::Generic,
        (None, false) => PresetSelection::Auto,
    };
    Ok(CalibrationContext {
        preset,
        overrides: MarginOverrides {
            left: args.margin_left,
            right: args.margin_right,
            top: args.margin_top,
            bottom: args.margin_bottom,
        },
        log_epsilon: args.log_epsilon,
    })
}

/// Default log filter for a `-v` count.
const fn default_level(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level(cli.verbose)));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    match cli.command {
        Command::Palette(args) => run_palette(&args),
        Command::Extract(args) => run_extract(&args),
    }
}

/// Palette of one image, as printed.
#[derive(Serialize)]
struct PaletteReport<'a> {
    image: String,
    colors: &'a [Color],
}

fn run_palette(args: &PaletteArgs) -> ExitCode {
    let palettes: Vec<Result<Vec<Color>, String>> = args
        .images
        .par_iter()
        .map(|path| {
            let bytes = read_image(path)?;
            curvetrace_pipeline::classify_bytes(&bytes, args.min_size)
                .map_err(|e| format!("Error classifying {}: {e}", path.display()))
        })
        .collect();

    let mut failed = false;
    let mut reports = Vec::with_capacity(palettes.len());
    for (path, palette) in args.images.iter().zip(&palettes) {
        match palette {
            Ok(colors) => reports.push(PaletteReport {
                image: path.display().to_string(),
                colors,
            }),
            Err(msg) => {
                eprintln!("{msg}");
                failed = true;
            }
        }
    }

    if !print_json(&reports) || failed {
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

/// Everything produced for one input image.
struct ImageOutcome {
    result: ExtractionResult,
    diagnostics: Vec<DigitizeDiagnostics>,
}

/// Extraction result of one image, as printed.
#[derive(Serialize)]
struct ExtractReport<'a> {
    image: String,
    result: &'a ExtractionResult,
}

fn run_extract(args: &ExtractArgs) -> ExitCode {
    let config = match config_from_cli(args) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };
    let context = match context_from_cli(args) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(
        images = args.images.len(),
        colors = ?args.colors,
        "starting extraction"
    );

    // `collect` on an indexed parallel iterator keeps input order.
    let outcomes: Vec<Result<ImageOutcome, String>> = args
        .images
        .par_iter()
        .map(|path| process_image(path, args, &config, &context))
        .collect();

    let mut failed = false;
    let mut reports = Vec::with_capacity(outcomes.len());
    for (path, outcome) in args.images.iter().zip(&outcomes) {
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(msg) => {
                eprintln!("{msg}");
                failed = true;
                continue;
            }
        };
        if !outcome.result.success {
            failed = true;
        }

        if args.report {
            println!("Image: {}", path.display());
            for diagnostics in &outcome.diagnostics {
                println!("{}", diagnostics.report());
                println!();
            }
            if outcome.diagnostics.len() > 1 {
                print_multi_run_summary(&outcome.diagnostics);
            }
        } else {
            reports.push(ExtractReport {
                image: path.display().to_string(),
                result: &outcome.result,
            });
        }

        if !write_exports(path, &outcome.result, args, &config, &context) {
            failed = true;
        }
    }

    if !args.report && !print_json(&reports) {
        failed = true;
    }

    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

/// Run one image through the engine: a plain [`digitize`] call, or
/// `runs` diagnostic runs in report mode.
///
/// [`digitize`]: curvetrace_pipeline::digitize
fn process_image(
    path: &Path,
    args: &ExtractArgs,
    config: &GraphConfig,
    context: &CalibrationContext,
) -> Result<ImageOutcome, String> {
    let bytes = read_image(path)?;
    tracing::debug!(image = %path.display(), bytes = bytes.len(), "image read");

    if !args.report {
        let result = curvetrace_pipeline::digitize(&bytes, config, &args.colors, context);
        return Ok(ImageOutcome {
            result,
            diagnostics: Vec::new(),
        });
    }

    let mut diagnostics = Vec::with_capacity(args.runs);
    let mut last = None;
    for _ in 0..args.runs {
        let (result, diag) = curvetrace_pipeline::digitize_with_diagnostics(
            &bytes,
            config,
            &args.colors,
            context,
            &SystemClock,
        )
        .map_err(|e| format!("Pipeline error on {}: {e}", path.display()))?;
        diagnostics.push(diag);
        last = Some(result);
    }
    let result = last.ok_or_else(|| format!("no runs for {}", path.display()))?;
    Ok(ImageOutcome {
        result,
        diagnostics,
    })
}

fn read_image(path: &Path) -> Result<Vec<u8>, String> {
    std::fs::read(path).map_err(|e| format!("Error reading {}: {e}", path.display()))
}

/// Print `value` as pretty JSON on stdout. Returns `false` on failure.
fn print_json<T: Serialize>(value: &T) -> bool {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            println!("{json}");
            true
        }
        Err(e) => {
            eprintln!("Error serializing results: {e}");
            false
        }
    }
}

/// Write the CSV and SVG files requested for one image. Returns `false`
/// if any write failed.
fn write_exports(
    path: &Path,
    result: &ExtractionResult,
    args: &ExtractArgs,
    config: &GraphConfig,
    context: &CalibrationContext,
) -> bool {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("graph");
    let mut ok = true;

    if let Some(ref dir) = args.csv {
        let csv = curvetrace_export::to_csv(result);
        ok &= write_file(&dir.join(format!("{stem}.csv")), &csv);
    }

    if let Some(ref dir) = args.svg {
        let desc = format!(
            "colors: {}; x: [{}, {}]; y: [{}, {}]",
            args.colors.join(", "),
            config.x_min,
            config.x_max,
            config.y_min,
            config.y_max,
        );
        let metadata = curvetrace_export::SvgMetadata {
            title: Some(stem),
            description: Some(&desc),
        };
        let svg = curvetrace_export::to_svg(result, config, context.log_epsilon, &metadata);
        ok &= write_file(&dir.join(format!("{stem}.svg")), &svg);
    }

    ok
}

fn write_file(path: &Path, contents: &str) -> bool {
    if let Some(parent) = path.parent()
        && let Err(e) = std::fs::create_dir_all(parent)
    {
        eprintln!("Error creating {}: {e}", parent.display());
        return false;
    }
    match std::fs::write(path, contents) {
        Ok(()) => {
            eprintln!("Written {} ({} bytes)", path.display(), contents.len());
            true
        }
        Err(e) => {
            eprintln!("Error writing {}: {e}", path.display());
            false
        }
    }
}

/// Print aggregated statistics across multiple runs of one image.
#[allow(clippy::cast_precision_loss)]
fn print_multi_run_summary(all_diagnostics: &[DigitizeDiagnostics]) {
    println!(
        "Summary ({} runs)\n{}",
        all_diagnostics.len(),
        "=".repeat(60),
    );

    let Some(first) = all_diagnostics.first() else {
        println!("Warning: no diagnostics to summarize");
        return;
    };

    let durations: Vec<f64> = all_diagnostics
        .iter()
        .map(|d| d.total_duration.as_secs_f64() * 1000.0)
        .collect();

    let min = durations.iter().copied().reduce(f64::min).unwrap_or(0.0);
    let max = durations.iter().copied().reduce(f64::max).unwrap_or(0.0);
    let mean = durations.iter().sum::<f64>() / durations.len() as f64;

    println!("Total duration: min={min:.3}ms  mean={mean:.3}ms  max={max:.3}ms");

    // Per-stage means.
    println!();
    println!("{:<24} {:>12}", "Stage", "Mean (ms)");
    println!("{}", "-".repeat(40));

    for (index, (name, _)) in first.stages().iter().enumerate() {
        let total: f64 = all_diagnostics
            .iter()
            .map(|d| d.stages()[index].1.duration.as_secs_f64() * 1000.0)
            .sum();
        let stage_mean = total / all_diagnostics.len() as f64;
        println!("{name:<24} {stage_mean:>10.3}ms");
    }
    println!();
}
