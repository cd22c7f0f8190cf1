//! curvetrace-pipeline: graph digitization engine (sans-IO).
//!
//! Turns a raster image of a plotted graph into calibrated `(x, y)` curves:
//! decode -> calibrate (margins + axes) -> classify colors -> detect
//! background -> extract pixels per color -> map to logical points ->
//! refine (outliers, smoothing, de-duplication, spacing).
//!
//! This crate has **no I/O dependencies**: it operates on in-memory bytes
//! or a decoded [`RgbaImage`] and returns structured data. Reading files,
//! printing and thread pools live in the `curvetrace` binary.
//!
//! Every request is independent. Preset choice and margin overrides travel
//! in a [`CalibrationContext`] value; nothing is cached between calls, so
//! concurrent requests need no synchronization.

pub mod background;
pub mod calibrate;
pub mod classify;
pub mod color;
pub mod decode;
pub mod diagnostics;
pub mod extract;
pub mod pipeline;
pub mod presets;
pub mod refine;
pub mod synthesize;
pub mod types;

pub use calibrate::{AxisCalibrator, pixel_to_logical_x, pixel_to_logical_y};
pub use classify::{Color, classify_bytes, classify_colors};
pub use color::{NamedColor, Rgb};
pub use diagnostics::{Clock, DigitizeDiagnostics, SystemClock, digitize_with_diagnostics};
pub use pipeline::Pipeline;
pub use presets::{
    CalibrationContext, DeviceLayout, MarginOverrides, MarginSet, Preset, PresetSelection,
    detect_preset, resolve_margins,
};
pub use refine::RefineConfig;
pub use types::{
    AxisConfig, Curve, CurveError, CurveMetadata, Dimensions, DigitizeError, ExtractionMetadata,
    ExtractionResult, GraphConfig, PixelCoord, Point, RgbaImage, Scale,
};

/// Digitize the curves of the requested colors from encoded image bytes.
///
/// Never fails: a fatal error (undecodable image, invalid configuration,
/// no usable plot area) comes back as a result with `success == false`
/// and `error` set. Per-color problems are listed in
/// `metadata.issues`, and `success` is `false` only when every requested
/// curve is empty.
#[must_use]
pub fn digitize(
    image_bytes: &[u8],
    config: &GraphConfig,
    colors: &[String],
    context: &CalibrationContext,
) -> ExtractionResult {
    let clock = SystemClock;
    let start = clock.now();
    match decode::decode_rgba(image_bytes) {
        Ok(image) => run(image, config, colors, context, &clock, &start),
        Err(e) => failed(&e, None, clock.elapsed(&start)),
    }
}

/// Like [`digitize`], for an already decoded image.
#[must_use]
pub fn digitize_image(
    image: RgbaImage,
    config: &GraphConfig,
    colors: &[String],
    context: &CalibrationContext,
) -> ExtractionResult {
    let clock = SystemClock;
    let start = clock.now();
    run(image, config, colors, context, &clock, &start)
}

/// Run the full pipeline on a decoded image, surfacing fatal errors.
///
/// # Errors
///
/// Returns [`DigitizeError::Validation`] for an invalid configuration or
/// an empty color list, and [`DigitizeError::Calibration`] when no margin
/// fallback leaves a plot area.
pub fn try_digitize_image(
    image: RgbaImage,
    config: &GraphConfig,
    colors: &[String],
    context: &CalibrationContext,
) -> Result<ExtractionResult, DigitizeError> {
    let clock = SystemClock;
    let start = clock.now();
    let refined = Pipeline::from_image(image, config.clone(), colors.to_vec(), *context)
        .decode()?
        .calibrate()?
        .classify()
        .extract()
        .synthesize()
        .refine();
    Ok(refined.into_result(clock.elapsed(&start)))
}

fn run<C: Clock>(
    image: RgbaImage,
    config: &GraphConfig,
    colors: &[String],
    context: &CalibrationContext,
    clock: &C,
    start: &C::Instant,
) -> ExtractionResult {
    let dimensions = Dimensions::of(&image);
    match try_digitize_image(image, config, colors, context) {
        Ok(mut result) => {
            result.processing_time = clock.elapsed(start);
            result
        }
        Err(e) => failed(&e, Some(dimensions), clock.elapsed(start)),
    }
}

fn failed(
    error: &DigitizeError,
    dimensions: Option<Dimensions>,
    elapsed: std::time::Duration,
) -> ExtractionResult {
    tracing::warn!(%error, "digitization failed");
    ExtractionResult::failure(error, dimensions, elapsed)
}
