//! Shared types for the curvetrace digitization engine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::presets::MarginSet;
use crate::refine::RefineConfig;

/// Re-export `RgbaImage` so downstream crates can hand the engine a
/// decoded pixel buffer without depending on `image` directly.
pub use image::RgbaImage;

/// A point in logical (calibrated) coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Value on the horizontal axis, in the plot's own units.
    pub x: f64,
    /// Value on the vertical axis, in the plot's own units.
    pub y: f64,
}

impl Point {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Squared Euclidean distance to another point.
    #[must_use]
    pub fn distance_squared(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx.mul_add(dx, dy * dy)
    }

    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        self.distance_squared(other).sqrt()
    }
}

/// A raw `(column, row)` position within the decoded image buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelCoord {
    /// Column, counted from the left edge.
    pub x: u32,
    /// Row, counted from the top edge.
    pub y: u32,
}

impl PixelCoord {
    /// Create a new pixel coordinate.
    #[must_use]
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Dimensions of a decoded image.
    #[must_use]
    pub fn of(image: &RgbaImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
        }
    }

    /// The shorter of width and height, as `f64`.
    #[must_use]
    pub fn shorter_dim(self) -> f64 {
        f64::from(self.width.min(self.height))
    }
}

/// Axis scale type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scale {
    /// Values are evenly spaced along the axis.
    #[default]
    Linear,
    /// Decades are evenly spaced along the axis.
    Log,
}

impl std::fmt::Display for Scale {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Linear => write!(f, "linear"),
            Self::Log => write!(f, "log"),
        }
    }
}

/// Range and scale of one plot axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisConfig {
    /// Logical value at the low end of the axis.
    pub min: f64,
    /// Logical value at the high end of the axis.
    pub max: f64,
    /// Linear or logarithmic spacing.
    pub scale: Scale,
    /// Axis label. Advisory only: used by preset auto-detection.
    pub name: String,
}

impl AxisConfig {
    /// Create an axis configuration.
    #[must_use]
    pub fn new(min: f64, max: f64, scale: Scale, name: impl Into<String>) -> Self {
        Self {
            min,
            max,
            scale,
            name: name.into(),
        }
    }

    /// Linear axis with an empty name.
    #[must_use]
    pub fn linear(min: f64, max: f64) -> Self {
        Self::new(min, max, Scale::Linear, "")
    }

    /// Logarithmic axis with an empty name.
    #[must_use]
    pub fn log(min: f64, max: f64) -> Self {
        Self::new(min, max, Scale::Log, "")
    }

    /// The lower bound actually used by the log mapping:
    /// `max(min, epsilon)`. Equal to `min` for linear axes.
    #[must_use]
    pub fn effective_min(&self, log_epsilon: f64) -> f64 {
        match self.scale {
            Scale::Linear => self.min,
            Scale::Log => self.min.max(log_epsilon),
        }
    }

    /// Whether `value` is finite and within `[min, max]`.
    #[must_use]
    pub fn contains(&self, value: f64) -> bool {
        value.is_finite() && value >= self.min && value <= self.max
    }

    /// Check that the range is finite and non-empty, and that a log axis
    /// has a maximum above `log_epsilon`.
    ///
    /// # Errors
    ///
    /// Returns [`DigitizeError::Validation`] describing the first problem.
    pub fn validate(&self, axis: &str, log_epsilon: f64) -> Result<(), DigitizeError> {
        if !self.min.is_finite() || !self.max.is_finite() {
            return Err(DigitizeError::Validation(format!(
                "{axis} axis range must be finite, got [{}, {}]",
                self.min, self.max,
            )));
        }
        if self.min >= self.max {
            return Err(DigitizeError::Validation(format!(
                "{axis} axis min ({}) must be less than max ({})",
                self.min, self.max,
            )));
        }
        if self.scale == Scale::Log {
            if !(log_epsilon.is_finite() && log_epsilon > 0.0) {
                return Err(DigitizeError::Validation(format!(
                    "log epsilon must be a positive finite number, got {log_epsilon}",
                )));
            }
            if self.max <= log_epsilon {
                return Err(DigitizeError::Validation(format!(
                    "{axis} log axis max ({}) must exceed the log epsilon ({log_epsilon})",
                    self.max,
                )));
            }
        }
        Ok(())
    }
}

/// User-supplied description of the plotted graph.
///
/// Missing fields fall back to their defaults when deserialized, so a
/// caller can send only the ranges it knows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Logical value at the left edge of the plot area.
    pub x_min: f64,
    /// Logical value at the right edge of the plot area.
    pub x_max: f64,
    /// Logical value at the bottom edge of the plot area.
    pub y_min: f64,
    /// Logical value at the top edge of the plot area.
    pub y_max: f64,

    /// Unit multiplier applied to the x bounds (e.g. `1e-3` for mV to V).
    /// Must be strictly positive.
    pub x_scale: f64,
    /// Unit multiplier applied to the y bounds. Must be strictly positive.
    pub y_scale: f64,

    /// Spacing of the x axis.
    pub x_scale_type: Scale,
    /// Spacing of the y axis.
    pub y_scale_type: Scale,

    /// Minimum pixel count for a color to be reported in the palette.
    pub min_size: u32,

    /// Per-channel tolerance added around each named color's RGB box.
    pub color_tolerance: u8,

    /// Label of the x axis (advisory, used for preset detection).
    pub x_axis_name: String,
    /// Label of the y axis (advisory, used for preset detection).
    pub y_axis_name: String,

    /// Statistical cleanup parameters.
    pub refine: RefineConfig,
}

impl GraphConfig {
    /// Default palette threshold in pixels.
    pub const DEFAULT_MIN_SIZE: u32 = 500;
    /// Default color tolerance.
    pub const DEFAULT_COLOR_TOLERANCE: u8 = 30;
    /// Default unit multiplier.
    pub const DEFAULT_UNIT_SCALE: f64 = 1.0;

    /// The x axis with `x_scale` applied to its bounds.
    #[must_use]
    pub fn x_axis(&self) -> AxisConfig {
        AxisConfig::new(
            self.x_min * self.x_scale,
            self.x_max * self.x_scale,
            self.x_scale_type,
            self.x_axis_name.clone(),
        )
    }

    /// The y axis with `y_scale` applied to its bounds.
    #[must_use]
    pub fn y_axis(&self) -> AxisConfig {
        AxisConfig::new(
            self.y_min * self.y_scale,
            self.y_max * self.y_scale,
            self.y_scale_type,
            self.y_axis_name.clone(),
        )
    }

    /// Check the configuration for values no extraction can use.
    ///
    /// # Errors
    ///
    /// Returns [`DigitizeError::Validation`] for a non-positive or
    /// non-finite scale factor, a non-finite bound, or `min >= max` on
    /// either axis.
    pub fn validate(&self, log_epsilon: f64) -> Result<(), DigitizeError> {
        for (axis, factor) in [("x", self.x_scale), ("y", self.y_scale)] {
            if !(factor.is_finite() && factor > 0.0) {
                return Err(DigitizeError::Validation(format!(
                    "{axis} scale factor must be positive, got {factor}",
                )));
            }
        }
        self.x_axis().validate("x", log_epsilon)?;
        self.y_axis().validate("y", log_epsilon)?;
        self.refine.validate()
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            x_min: 0.0,
            x_max: 1.0,
            y_min: 0.0,
            y_max: 1.0,
            x_scale: Self::DEFAULT_UNIT_SCALE,
            y_scale: Self::DEFAULT_UNIT_SCALE,
            x_scale_type: Scale::Linear,
            y_scale_type: Scale::Linear,
            min_size: Self::DEFAULT_MIN_SIZE,
            color_tolerance: Self::DEFAULT_COLOR_TOLERANCE,
            x_axis_name: String::new(),
            y_axis_name: String::new(),
            refine: RefineConfig::default(),
        }
    }
}

/// Summary statistics over a refined curve's points.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CurveMetadata {
    /// Smallest x among kept points.
    pub min_x: f64,
    /// Largest x among kept points.
    pub max_x: f64,
    /// Smallest y among kept points.
    pub min_y: f64,
    /// Largest y among kept points.
    pub max_y: f64,
    /// Mean of `dy/dx` over consecutive kept points, ignoring `dx == 0`.
    pub average_slope: f64,
}

/// One digitized curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Curve {
    /// Requested color name.
    pub name: String,
    /// Source color as `#rrggbb`.
    pub color: String,
    /// Points sorted by ascending x.
    pub points: Vec<Point>,
    /// Number of points (zero when nothing survived extraction).
    pub point_count: usize,
    /// Derived statistics.
    pub metadata: CurveMetadata,
}

impl Curve {
    /// Build a curve, deriving `point_count` from `points`.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        color: impl Into<String>,
        points: Vec<Point>,
        metadata: CurveMetadata,
    ) -> Self {
        let point_count = points.len();
        Self {
            name: name.into(),
            color: color.into(),
            points,
            point_count,
            metadata,
        }
    }

    /// Returns `true` if no points survived.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.point_count == 0
    }
}

/// Method tag recorded in every result.
pub const EXTRACTION_METHOD: &str = "color_segmentation";

/// Request-level metadata attached to an [`ExtractionResult`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionMetadata {
    /// Decoded image width (0 if decoding failed).
    pub image_width: u32,
    /// Decoded image height (0 if decoding failed).
    pub image_height: u32,
    /// Number of palette entries the classifier reported.
    pub detected_colors: usize,
    /// Always [`EXTRACTION_METHOD`].
    pub extraction_method: String,
    /// Mean over requested curves of `min(point_count / 100, 1)`.
    pub quality_score: f64,
    /// Requested colors that produced no points.
    pub empty_colors: Vec<String>,
    /// Non-fatal problems, one or more per affected color.
    pub issues: Vec<CurveError>,
    /// Margins the calibration used, once resolved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub margins: Option<MarginSet>,
    /// Which resolution rule produced `margins`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub margin_source: Option<String>,
}

impl ExtractionMetadata {
    fn empty(dimensions: Option<Dimensions>) -> Self {
        let (image_width, image_height) =
            dimensions.map_or((0, 0), |d| (d.width, d.height));
        Self {
            image_width,
            image_height,
            detected_colors: 0,
            extraction_method: EXTRACTION_METHOD.to_string(),
            quality_score: 0.0,
            empty_colors: Vec::new(),
            issues: Vec::new(),
            margins: None,
            margin_source: None,
        }
    }
}

impl Default for ExtractionMetadata {
    fn default() -> Self {
        Self::empty(None)
    }
}

/// Outcome of one extraction request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    /// One curve per requested color, in request order.
    pub curves: Vec<Curve>,
    /// Sum of `point_count` over all curves.
    pub total_points: usize,
    /// Wall-clock time spent on the request (seconds when serialized).
    #[serde(with = "duration_serde")]
    pub processing_time: Duration,
    /// `false` on a fatal error or when every requested curve is empty.
    pub success: bool,
    /// Description of the failure, if any.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
    /// Request-level metadata.
    pub metadata: ExtractionMetadata,
}

impl ExtractionResult {
    /// Assemble a result from finished curves.
    ///
    /// `success` is `false` only when every curve is empty; in that case
    /// `error` names the colors that produced nothing.
    #[must_use]
    pub fn assemble(
        curves: Vec<Curve>,
        mut metadata: ExtractionMetadata,
        processing_time: Duration,
    ) -> Self {
        let total_points = curves.iter().map(|c| c.point_count).sum();
        metadata.empty_colors = curves
            .iter()
            .filter(|c| c.is_empty())
            .map(|c| c.name.clone())
            .collect();
        metadata.quality_score = quality_score(&curves);

        let success = curves.iter().any(|c| !c.is_empty());
        let error = (!success).then(|| {
            format!(
                "no points extracted for any requested color ({})",
                metadata.empty_colors.join(", "),
            )
        });

        Self {
            curves,
            total_points,
            processing_time,
            success,
            error,
            metadata,
        }
    }

    /// A failed result carrying a fatal error.
    #[must_use]
    pub fn failure(
        error: &DigitizeError,
        dimensions: Option<Dimensions>,
        processing_time: Duration,
    ) -> Self {
        Self {
            curves: Vec::new(),
            total_points: 0,
            processing_time,
            success: false,
            error: Some(error.to_string()),
            metadata: ExtractionMetadata::empty(dimensions),
        }
    }

    /// Look up a curve by requested color name.
    #[must_use]
    pub fn curve(&self, name: &str) -> Option<&Curve> {
        self.curves.iter().find(|c| c.name == name)
    }
}

impl ExtractionMetadata {
    /// Metadata for a request whose image decoded successfully.
    #[must_use]
    pub fn for_image(
        dimensions: Dimensions,
        detected_colors: usize,
        issues: Vec<CurveError>,
        margins: MarginSet,
        margin_source: String,
    ) -> Self {
        Self {
            detected_colors,
            issues,
            margins: Some(margins),
            margin_source: Some(margin_source),
            ..Self::empty(Some(dimensions))
        }
    }
}

/// Mean over curves of `min(point_count / 100, 1)`; zero with no curves.
#[allow(clippy::cast_precision_loss)]
fn quality_score(curves: &[Curve]) -> f64 {
    if curves.is_empty() {
        return 0.0;
    }
    let sum: f64 = curves
        .iter()
        .map(|c| (c.point_count as f64 / 100.0).min(1.0))
        .sum();
    sum / curves.len() as f64
}

/// Fatal errors: any of these aborts the whole request.
///
/// Uses custom `Serialize`/`Deserialize` because `image::ImageError`
/// does not implement serde traits. The `ImageDecode` variant is
/// serialized as its `Display` string.
#[derive(Debug, thiserror::Error)]
pub enum DigitizeError {
    /// The input image bytes were empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// Corrupt or unsupported image data.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// Invalid graph configuration or margin set.
    #[error("invalid configuration: {0}")]
    Validation(String),

    /// No usable plot area remains after every margin fallback.
    #[error("calibration failed: {0}")]
    Calibration(String),
}

/// Serde-compatible proxy for `DigitizeError`.
///
/// A deserialized `ImageDecode` cannot rebuild the typed
/// `image::ImageError`, so it comes back as `Validation` carrying the
/// original message.
#[derive(Serialize, Deserialize)]
enum DigitizeErrorProxy {
    EmptyInput,
    ImageDecode(String),
    Validation(String),
    Calibration(String),
}

impl Serialize for DigitizeError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let proxy = match self {
            Self::EmptyInput => DigitizeErrorProxy::EmptyInput,
            Self::ImageDecode(e) => DigitizeErrorProxy::ImageDecode(e.to_string()),
            Self::Validation(s) => DigitizeErrorProxy::Validation(s.clone()),
            Self::Calibration(s) => DigitizeErrorProxy::Calibration(s.clone()),
        };
        proxy.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for DigitizeError {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let proxy = DigitizeErrorProxy::deserialize(deserializer)?;
        Ok(match proxy {
            DigitizeErrorProxy::EmptyInput => Self::EmptyInput,
            DigitizeErrorProxy::ImageDecode(msg) => {
                Self::Validation(format!("image decode error: {msg}"))
            }
            DigitizeErrorProxy::Validation(s) => Self::Validation(s),
            DigitizeErrorProxy::Calibration(s) => Self::Calibration(s),
        })
    }
}

/// Non-fatal, per-color problems. Recorded, never raised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CurveError {
    /// The requested color is unknown or missing from the detected palette.
    #[error("color '{color}' not found in the detected palette")]
    ColorNotFound {
        /// Requested color name.
        color: String,
    },

    /// No point for this color survived matching, calibration and refinement.
    #[error("no points extracted for color '{color}'")]
    NoPointsExtracted {
        /// Requested color name.
        color: String,
    },
}

/// Serde support for `std::time::Duration` as fractional seconds.
pub(crate) mod duration_serde {
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
