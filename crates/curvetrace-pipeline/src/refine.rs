//! Statistical cleanup of a raw point cloud into a curve.
//!
//! Stages run strictly in this order:
//!
//! 1. sort ascending by x,
//! 2. MAD outlier rejection on y,
//! 3. symmetric moving-average smoothing,
//! 4. near-duplicate removal,
//! 5. minimum x-spacing enforcement.
//!
//! The output is strictly increasing in x. Uniformly spaced linear data
//! passes through unchanged, so refining a refined linear curve is a
//! no-op. Curved data is not a fixed point: the MAD test is global on y,
//! so each pass can trim more of a steep tail, and smoothing shifts
//! points on a bend.

use serde::{Deserialize, Serialize};

use crate::types::{AxisConfig, CurveMetadata, DigitizeError, Point, Scale};

/// Minimum number of points for the outlier and smoothing stages to run.
const MIN_STATISTICAL_POINTS: usize = 3;

/// Tuning for [`refine_points`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefineConfig {
    /// Points farther than `mad_factor * MAD` from the median y are dropped.
    pub mad_factor: f64,
    /// Upper bound on the smoothing window (the window is also capped at
    /// a tenth of the point count).
    pub max_window: usize,
    /// Euclidean distance, in logical units, under which a point
    /// duplicates the last kept one.
    pub duplicate_distance: f64,
    /// The minimum x spacing is the x-axis span divided by this.
    pub spacing_divisions: u32,
}

impl RefineConfig {
    /// Default MAD multiplier.
    pub const DEFAULT_MAD_FACTOR: f64 = 3.0;
    /// Default smoothing window cap.
    pub const DEFAULT_MAX_WINDOW: usize = 5;
    /// Default duplicate distance.
    pub const DEFAULT_DUPLICATE_DISTANCE: f64 = 0.01;
    /// Default spacing divisions.
    pub const DEFAULT_SPACING_DIVISIONS: u32 = 100;

    /// Reject parameters that would make refinement meaningless.
    ///
    /// # Errors
    ///
    /// Returns [`DigitizeError::Validation`] for a non-positive MAD factor,
    /// a negative duplicate distance, or zero spacing divisions.
    pub fn validate(&self) -> Result<(), DigitizeError> {
        if !(self.mad_factor.is_finite() && self.mad_factor > 0.0) {
            return Err(DigitizeError::Validation(format!(
                "refine.mad_factor must be positive, got {}",
                self.mad_factor,
            )));
        }
        if !(self.duplicate_distance.is_finite() && self.duplicate_distance >= 0.0) {
            return Err(DigitizeError::Validation(format!(
                "refine.duplicate_distance must be non-negative, got {}",
                self.duplicate_distance,
            )));
        }
        if self.spacing_divisions == 0 {
            return Err(DigitizeError::Validation(
                "refine.spacing_divisions must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for RefineConfig {
    fn default() -> Self {
        Self {
            mad_factor: Self::DEFAULT_MAD_FACTOR,
            max_window: Self::DEFAULT_MAX_WINDOW,
            duplicate_distance: Self::DEFAULT_DUPLICATE_DISTANCE,
            spacing_divisions: Self::DEFAULT_SPACING_DIVISIONS,
        }
    }
}

/// How many points each stage removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RefineStats {
    /// Raw points handed in.
    pub input: usize,
    /// Dropped by MAD rejection.
    pub outliers: usize,
    /// Dropped as near-duplicates.
    pub duplicates: usize,
    /// Dropped by spacing enforcement.
    pub too_close: usize,
}

/// A refined curve body.
#[derive(Debug, Clone, PartialEq)]
pub struct RefinedCurve {
    /// Points, strictly increasing in x.
    pub points: Vec<Point>,
    /// Bounds and average slope of `points`.
    pub metadata: CurveMetadata,
    /// Per-stage removal counts.
    pub stats: RefineStats,
}

/// Run the full cleanup on one curve's raw points.
///
/// `x_axis` sets the spacing scale: linear axes use
/// `(max - min) / spacing_divisions`, log axes the same fraction of the
/// ln-span, compared in ln-space.
#[must_use]
pub fn refine_points(
    mut points: Vec<Point>,
    x_axis: &AxisConfig,
    log_epsilon: f64,
    config: &RefineConfig,
) -> RefinedCurve {
    let input = points.len();
    points.sort_by(|a, b| a.x.total_cmp(&b.x));

    let before = points.len();
    let points = remove_outliers(points, config.mad_factor);
    let outliers = before - points.len();

    let points = smooth(&points, config.max_window);

    let before = points.len();
    let points = remove_duplicates(points, config.duplicate_distance);
    let duplicates = before - points.len();

    let before = points.len();
    let points = enforce_spacing(points, x_axis, log_epsilon, config.spacing_divisions);
    let too_close = before - points.len();

    let metadata = curve_metadata(&points);
    let stats = RefineStats {
        input,
        outliers,
        duplicates,
        too_close,
    };
    tracing::trace!(?stats, kept = points.len(), "curve refined");

    RefinedCurve {
        points,
        metadata,
        stats,
    }
}

/// Median of a non-empty slice; sorts it in place.
fn median(values: &mut [f64]) -> f64 {
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        f64::midpoint(values[mid - 1], values[mid])
    } else {
        values[mid]
    }
}

/// Drop points whose y deviates from the median by more than
/// `factor * MAD`. Skipped below three points.
///
/// Also skipped when the MAD is zero: more than half the points share the
/// median y, and a zero limit would drop every other point (the rising
/// part of a curve with a long flat run).
fn remove_outliers(points: Vec<Point>, factor: f64) -> Vec<Point> {
    if points.len() < MIN_STATISTICAL_POINTS {
        return points;
    }
    let mut ys: Vec<f64> = points.iter().map(|p| p.y).collect();
    let center = median(&mut ys);
    let mut deviations: Vec<f64> = ys.iter().map(|y| (y - center).abs()).collect();
    let mad = median(&mut deviations);
    if mad <= 0.0 {
        return points;
    }
    let limit = factor * mad;

    points
        .into_iter()
        .filter(|p| (p.y - center).abs() <= limit)
        .collect()
}

/// Symmetric moving average of x and y.
///
/// The window is `min(max_window, n / 10)`; each point averages the
/// `window / 2` neighbours on each side, truncated equally near the ends
/// so the first and last points are never pulled inward.
fn smooth(points: &[Point], max_window: usize) -> Vec<Point> {
    let n = points.len();
    if n < MIN_STATISTICAL_POINTS {
        return points.to_vec();
    }
    let half = max_window.min(n / 10) / 2;
    if half == 0 {
        return points.to_vec();
    }

    (0..n)
        .map(|i| {
            let radius = half.min(i).min(n - 1 - i);
            let neighbourhood = &points[i - radius..=i + radius];
            #[allow(clippy::cast_precision_loss)]
            let count = neighbourhood.len() as f64;
            let (sx, sy) = neighbourhood
                .iter()
                .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
            Point::new(sx / count, sy / count)
        })
        .collect()
}

/// Drop points within `min_distance` of the last kept point.
fn remove_duplicates(points: Vec<Point>, min_distance: f64) -> Vec<Point> {
    let mut kept: Vec<Point> = Vec::with_capacity(points.len());
    for p in points {
        match kept.last() {
            Some(&last) if last.distance(p) < min_distance => {}
            _ => kept.push(p),
        }
    }
    kept
}

/// Drop points closer in x than a fraction of the axis span to the last
/// kept point.
fn enforce_spacing(
    points: Vec<Point>,
    x_axis: &AxisConfig,
    log_epsilon: f64,
    divisions: u32,
) -> Vec<Point> {
    let floor = x_axis.effective_min(log_epsilon);
    let position = |x: f64| match x_axis.scale {
        Scale::Linear => x,
        Scale::Log => x.max(floor).ln(),
    };
    let span = position(x_axis.max) - position(floor);
    let min_gap = span / f64::from(divisions.max(1));

    let mut kept: Vec<Point> = Vec::with_capacity(points.len());
    for p in points {
        match kept.last() {
            Some(&last) if position(p.x) - position(last.x) < min_gap => {}
            _ => kept.push(p),
        }
    }
    kept
}

/// Bounds over the points plus the mean slope of consecutive pairs with
/// distinct x.
#[must_use]
pub fn curve_metadata(points: &[Point]) -> CurveMetadata {
    let Some(first) = points.first() else {
        return CurveMetadata::default();
    };
    let mut meta = CurveMetadata {
        min_x: first.x,
        max_x: first.x,
        min_y: first.y,
        max_y: first.y,
        average_slope: 0.0,
    };
    for p in points {
        meta.min_x = meta.min_x.min(p.x);
        meta.max_x = meta.max_x.max(p.x);
        meta.min_y = meta.min_y.min(p.y);
        meta.max_y = meta.max_y.max(p.y);
    }

    let slopes: Vec<f64> = points
        .windows(2)
        .filter_map(|w| {
            let dx = w[1].x - w[0].x;
            (dx != 0.0).then(|| (w[1].y - w[0].y) / dx)
        })
        .collect();
    if !slopes.is_empty() {
        #[allow(clippy::cast_precision_loss)]
        let count = slopes.len() as f64;
        meta.average_slope = slopes.iter().sum::<f64>() / count;
    }
    meta
}
