//! Pipeline diagnostics: timing, counts, and other metrics for each stage.
//!
//! [`digitize_with_diagnostics`] drives the typestate [`Pipeline`] one
//! stage at a time and records how long each took and what it produced.
//! Intended for parameter tuning and for spotting the dominant cost on a
//! given image (it is almost always the pixel scans).
//!
//! Time is read through the [`Clock`] trait so callers and tests can
//! supply their own source. [`SystemClock`] uses the `web-time` crate,
//! which maps to `performance.now()` on WASM and `std::time::Instant` on
//! native targets.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::pipeline::Pipeline;
use crate::presets::CalibrationContext;
use crate::types::{DigitizeError, ExtractionResult, GraphConfig, duration_serde};

/// Source of monotonic time.
pub trait Clock {
    /// Opaque point in time.
    type Instant;

    /// The current instant.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// [`Clock`] backed by [`web_time::Instant`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    type Instant = web_time::Instant;

    fn now(&self) -> web_time::Instant {
        web_time::Instant::now()
    }

    fn elapsed(&self, since: &web_time::Instant) -> Duration {
        since.elapsed()
    }
}

/// Diagnostics collected from a single digitization run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DigitizeDiagnostics {
    /// Stage 0: image decoding.
    pub decode: StageDiagnostics,
    /// Stage 1: validation, margin resolution, calibrator construction.
    pub calibrate: StageDiagnostics,
    /// Stage 2: palette proposal and color matching.
    pub classify: StageDiagnostics,
    /// Stage 3a: background detection.
    pub background: StageDiagnostics,
    /// Stage 3b: per-color pixel extraction.
    pub extract: StageDiagnostics,
    /// Stage 4: pixel-to-logical mapping.
    pub synthesize: StageDiagnostics,
    /// Stage 5: curve refinement.
    pub refine: StageDiagnostics,
    /// Total wall-clock duration of the run (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Summary counts across all stages.
    pub summary: DigitizeSummary,
}

/// Diagnostics for a single stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific metrics.
    pub metrics: StageMetrics,
}

/// Stage-specific metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StageMetrics {
    /// Image decoding metrics.
    Decode {
        /// Size of the encoded input (0 when started from a buffer).
        input_bytes: usize,
        /// Decoded width in pixels.
        width: u32,
        /// Decoded height in pixels.
        height: u32,
        /// `width * height`.
        pixel_count: u64,
    },
    /// Margin resolution metrics.
    Calibrate {
        /// Provenance label of the margins.
        margin_source: String,
        /// Plot area width in pixels.
        graph_width: f64,
        /// Plot area height in pixels.
        graph_height: f64,
    },
    /// Palette metrics.
    Classify {
        /// Palette entries reported.
        palette_size: usize,
        /// Colors requested.
        requested: usize,
        /// Requested colors missing from the palette.
        not_found: usize,
    },
    /// Background detection metrics.
    Background {
        /// Quantized buckets flagged as background.
        buckets: usize,
    },
    /// Pixel extraction metrics.
    Extract {
        /// Colors actually scanned (known names).
        colors_scanned: usize,
        /// Matched pixels summed over colors.
        matched_pixels: usize,
    },
    /// Calibration of matched pixels.
    Synthesize {
        /// Points kept inside both axis ranges.
        raw_points: usize,
        /// Pixels dropped as out of range.
        dropped: usize,
    },
    /// Refinement metrics, summed over curves.
    Refine {
        /// Points entering refinement.
        input_points: usize,
        /// Removed by MAD rejection.
        outliers: usize,
        /// Removed as near-duplicates.
        duplicates: usize,
        /// Removed by spacing enforcement.
        too_close: usize,
        /// Points in the final curves.
        output_points: usize,
    },
}

/// High-level summary for the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DigitizeSummary {
    /// Image width in pixels.
    pub image_width: u32,
    /// Image height in pixels.
    pub image_height: u32,
    /// Palette entries reported.
    pub palette_size: usize,
    /// Curves emitted.
    pub curve_count: usize,
    /// Points over all curves.
    pub total_points: usize,
    /// Result quality score.
    pub quality_score: f64,
}

/// Run a digitization request stage by stage, timing each stage.
///
/// # Errors
///
/// Returns the fatal [`DigitizeError`] of the decode or calibrate stage.
/// Per-color problems are recorded in the returned result instead.
pub fn digitize_with_diagnostics<C: Clock>(
    image_bytes: &[u8],
    config: &GraphConfig,
    colors: &[String],
    context: &CalibrationContext,
    clock: &C,
) -> Result<(ExtractionResult, DigitizeDiagnostics), DigitizeError> {
    let run_start = clock.now();

    let pending = Pipeline::new(image_bytes.to_vec(), config.clone(), colors.to_vec(), *context);
    let input_bytes = pending.source_len();

    let t = clock.now();
    let decoded = pending.decode()?;
    let dims = decoded.dimensions();
    let decode = StageDiagnostics {
        duration: clock.elapsed(&t),
        metrics: StageMetrics::Decode {
            input_bytes,
            width: dims.width,
            height: dims.height,
            pixel_count: u64::from(dims.width) * u64::from(dims.height),
        },
    };

    let t = clock.now();
    let calibrated = decoded.calibrate()?;
    let resolved = *calibrated.margins();
    let calibrate = StageDiagnostics {
        duration: clock.elapsed(&t),
        metrics: StageMetrics::Calibrate {
            margin_source: resolved.label(),
            graph_width: resolved.margins.graph_width(dims.width),
            graph_height: resolved.margins.graph_height(dims.height),
        },
    };

    let t = clock.now();
    let classified = calibrated.classify();
    let palette_size = classified.palette().len();
    let classify = StageDiagnostics {
        duration: clock.elapsed(&t),
        metrics: StageMetrics::Classify {
            palette_size,
            requested: classified.requests().len(),
            not_found: classified
                .requests()
                .iter()
                .filter(|r| r.detected.is_none())
                .count(),
        },
    };

    let t = clock.now();
    let background_set = classified.detect_background();
    let background = StageDiagnostics {
        duration: clock.elapsed(&t),
        metrics: StageMetrics::Background {
            buckets: background_set.len(),
        },
    };

    let colors_scanned = classified
        .requests()
        .iter()
        .filter(|r| r.color.is_some())
        .count();
    let t = clock.now();
    let extracted = classified.extract_with(background_set);
    let matched_pixels: usize = extracted.pixels().iter().map(Vec::len).sum();
    let extract = StageDiagnostics {
        duration: clock.elapsed(&t),
        metrics: StageMetrics::Extract {
            colors_scanned,
            matched_pixels,
        },
    };

    let t = clock.now();
    let synthesized = extracted.synthesize();
    let raw_points: usize = synthesized.raw_points().iter().map(Vec::len).sum();
    let synthesize = StageDiagnostics {
        duration: clock.elapsed(&t),
        metrics: StageMetrics::Synthesize {
            raw_points,
            dropped: matched_pixels - raw_points,
        },
    };

    let t = clock.now();
    let refined = synthesized.refine();
    let (outliers, duplicates, too_close) = refined
        .stats()
        .iter()
        .fold((0, 0, 0), |(o, d, c), s| {
            (o + s.outliers, d + s.duplicates, c + s.too_close)
        });
    let output_points: usize = refined.curves().iter().map(|c| c.point_count).sum();
    let refine = StageDiagnostics {
        duration: clock.elapsed(&t),
        metrics: StageMetrics::Refine {
            input_points: raw_points,
            outliers,
            duplicates,
            too_close,
            output_points,
        },
    };

    let total_duration = clock.elapsed(&run_start);
    let result = refined.into_result(total_duration);
    let summary = DigitizeSummary {
        image_width: dims.width,
        image_height: dims.height,
        palette_size,
        curve_count: result.curves.len(),
        total_points: result.total_points,
        quality_score: result.metadata.quality_score,
    };

    Ok((
        result,
        DigitizeDiagnostics {
            decode,
            calibrate,
            classify,
            background,
            extract,
            synthesize,
            refine,
            total_duration,
            summary,
        },
    ))
}

impl DigitizeDiagnostics {
    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Digitize Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Image: {}x{}  |  Palette: {} colors",
            self.summary.image_width, self.summary.image_height, self.summary.palette_size,
        ));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<16} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);
        for (name, diag) in self.stages() {
            let ms = duration_ms(diag.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let details = format_metrics(&diag.metrics);
            lines.push(format!("{name:<16} {ms:>8.3}ms {pct:>9.1}%  {details}"));
        }

        lines.push(String::new());
        lines.push(format!(
            "Curves: {}  |  Points: {}  |  Quality: {:.2}",
            self.summary.curve_count, self.summary.total_points, self.summary.quality_score,
        ));

        lines.join("\n")
    }

    /// Stages in execution order with display names.
    #[must_use]
    pub fn stages(&self) -> [(&'static str, &StageDiagnostics); 7] {
        [
            ("Decode", &self.decode),
            ("Calibrate", &self.calibrate),
            ("Classify", &self.classify),
            ("Background", &self.background),
            ("Extract", &self.extract),
            ("Synthesize", &self.synthesize),
            ("Refine", &self.refine),
        ]
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
        StageMetrics::Calibrate {
            margin_source,
            graph_width,
            graph_height,
        } => format!("{margin_source} plot={graph_width:.0}x{graph_height:.0}px"),
        StageMetrics::Classify {
            palette_size,
            requested,
            not_found,
        } => format!("palette={palette_size} requested={requested} not_found={not_found}"),
        StageMetrics::Background { buckets } => format!("{buckets} buckets"),
        StageMetrics::Extract {
            colors_scanned,
            matched_pixels,
        } => format!("{colors_scanned} colors, {matched_pixels} px"),
        StageMetrics::Synthesize {
            raw_points,
            dropped,
        } => format!("{raw_points} pts ({dropped} out of range)"),
        StageMetrics::Refine {
            input_points,
            outliers,
            duplicates,
            too_close,
            output_points,
        } => format!(
            "{input_points}->{output_points} pts (outliers={outliers} dup={duplicates} spacing={too_close})",
        ),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::presets::MarginOverrides;

    /// Clock that advances one millisecond per reading.
    struct TickClock(Cell<u64>);

    impl Clock for TickClock {
        type Instant = u64;

        fn now(&self) -> u64 {
            let t = self.0.get();
            self.0.set(t + 1);
            t
        }

        fn elapsed(&self, since: &u64) -> Duration {
            Duration::from_millis(self.now() - since)
        }
    }

    fn plot_png() -> Vec<u8> {
        let img = image::RgbaImage::from_fn(60, 60, |x, y| {
            if (5..55).contains(&x) && y == 30 {
                image::Rgba([20, 150, 20, 255])
            } else {
                image::Rgba([255, 255, 255, 255])
            }
        });
        crate::decode::encode_png(&img)
    }

    fn context() -> CalibrationContext {
        CalibrationContext {
            overrides: MarginOverrides {
                left: Some(0.0),
                right: Some(0.0),
                top: Some(0.0),
                bottom: Some(0.0),
            },
            ..CalibrationContext::default()
        }
    }

    #[test]
    fn duration_ms_converts_correctly() {
        let d = Duration::from_millis(1234);
        assert!((duration_ms(d) - 1234.0).abs() < 0.01);
    }

    #[test]
    fn stages_are_timed_and_counted() {
        let config = GraphConfig {
            min_size: 10,
            ..GraphConfig::default()
        };
        let clock = TickClock(Cell::new(0));
        let (result, diag) = digitize_with_diagnostics(
            &plot_png(),
            &config,
            &["green".to_string()],
            &context(),
            &clock,
        )
        .unwrap();

        assert!(result.success);
        assert_eq!(result.processing_time, diag.total_duration);
        assert!(diag.stages().iter().all(|(_, s)| s.duration > Duration::ZERO));
        assert!(matches!(
            diag.extract.metrics,
            StageMetrics::Extract {
                colors_scanned: 1,
                matched_pixels: 50
            }
        ));
        assert!(matches!(
            diag.synthesize.metrics,
            StageMetrics::Synthesize {
                raw_points: 50,
                dropped: 0
            }
        ));
        assert_eq!(diag.summary.curve_count, 1);
        assert_eq!(diag.summary.total_points, result.total_points);
    }

    #[test]
    fn fatal_errors_propagate() {
        let clock = TickClock(Cell::new(0));
        let err = digitize_with_diagnostics(
            &[],
            &GraphConfig::default(),
            &["red".to_string()],
            &context(),
            &clock,
        )
        .unwrap_err();
        assert!(matches!(err, DigitizeError::EmptyInput));
    }

    #[test]
    fn report_lists_every_stage() {
        let config = GraphConfig {
            min_size: 10,
            ..GraphConfig::default()
        };
        let (_, diag) = digitize_with_diagnostics(
            &plot_png(),
            &config,
            &["green".to_string()],
            &context(),
            &SystemClock,
        )
        .unwrap();
        let report = diag.report();
        assert!(report.contains("Digitize Diagnostics Report"));
        for (name, _) in diag.stages() {
            assert!(report.contains(name), "missing {name}");
        }
        assert!(report.contains("override"));
    }

    #[test]
    fn diagnostics_serialize_durations_as_seconds() {
        let stage = StageDiagnostics {
            duration: Duration::from_millis(250),
            metrics: StageMetrics::Background { buckets: 2 },
        };
        let json: serde_json::Value = serde_json::to_value(&stage).unwrap();
        assert!((json["duration"].as_f64().unwrap() - 0.25).abs() < 1e-12);
        assert_eq!(json["metrics"]["Background"]["buckets"], 2);
    }
}
