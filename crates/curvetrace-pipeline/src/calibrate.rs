//! Pixel-to-logical coordinate mapping.
//!
//! Image columns grow rightward like logical x, but image rows grow
//! downward while logical y grows upward, so the y mapping measures from
//! the bottom margin. Positions are normalized into `[0, 1]` across the
//! plot area, then interpolated linearly or in ln-space.
//!
//! Results are clamped to `[effective_min, max]` of the axis so that
//! floating-point rounding in `exp(ln(max))` cannot push a point on the
//! axis end just outside the bounds. Pixels outside the plot area are
//! not meant to be mapped at all; see [`AxisCalibrator::in_plot_area`].

use crate::presets::MarginSet;
use crate::types::{AxisConfig, Dimensions, DigitizeError, PixelCoord, Point, Scale};

/// Map a pixel column to a logical x value.
///
/// # Errors
///
/// Returns [`DigitizeError::Validation`] if the margins leave no plot
/// width or the axis is invalid.
pub fn pixel_to_logical_x(
    px: f64,
    width: u32,
    margins: &MarginSet,
    axis: &AxisConfig,
    log_epsilon: f64,
) -> Result<f64, DigitizeError> {
    let graph_width = positive_extent("width", margins.graph_width(width))?;
    let mapping = AxisMapping::new(axis, "x", log_epsilon)?;
    Ok(mapping.map((px - margins.left) / graph_width))
}

/// Map a pixel row to a logical y value.
///
/// # Errors
///
/// Returns [`DigitizeError::Validation`] if the margins leave no plot
/// height or the axis is invalid.
pub fn pixel_to_logical_y(
    py: f64,
    height: u32,
    margins: &MarginSet,
    axis: &AxisConfig,
    log_epsilon: f64,
) -> Result<f64, DigitizeError> {
    let graph_height = positive_extent("height", margins.graph_height(height))?;
    let mapping = AxisMapping::new(axis, "y", log_epsilon)?;
    let adjusted = (f64::from(height) - py - margins.bottom).max(0.0);
    Ok(mapping.map(adjusted / graph_height))
}

fn positive_extent(what: &str, extent: f64) -> Result<f64, DigitizeError> {
    if extent.is_finite() && extent > 0.0 {
        Ok(extent)
    } else {
        Err(DigitizeError::Validation(format!(
            "margins leave a non-positive graph {what} ({extent})",
        )))
    }
}

/// Precomputed interpolation endpoints for one axis.
#[derive(Debug, Clone, Copy)]
struct AxisMapping {
    scale: Scale,
    /// `min` (linear) or `ln(max(min, ε))` (log).
    low: f64,
    /// `max` (linear) or `ln(max)` (log).
    high: f64,
    floor: f64,
    ceiling: f64,
}

impl AxisMapping {
    fn new(axis: &AxisConfig, name: &str, log_epsilon: f64) -> Result<Self, DigitizeError> {
        axis.validate(name, log_epsilon)?;
        let floor = axis.effective_min(log_epsilon);
        let (low, high) = match axis.scale {
            Scale::Linear => (axis.min, axis.max),
            Scale::Log => (floor.ln(), axis.max.ln()),
        };
        Ok(Self {
            scale: axis.scale,
            low,
            high,
            floor,
            ceiling: axis.max,
        })
    }

    fn map(&self, normalized: f64) -> f64 {
        let t = normalized.clamp(0.0, 1.0);
        let interpolated = t.mul_add(self.high - self.low, self.low);
        let value = match self.scale {
            Scale::Linear => interpolated,
            Scale::Log => interpolated.exp(),
        };
        value.clamp(self.floor, self.ceiling)
    }
}

/// Validated calibration for one image: margins plus both axes.
///
/// Built once per request; every pixel of every curve goes through
/// [`AxisCalibrator::to_logical`].
#[derive(Debug, Clone)]
pub struct AxisCalibrator {
    dimensions: Dimensions,
    margins: MarginSet,
    x_axis: AxisConfig,
    y_axis: AxisConfig,
    x_map: AxisMapping,
    y_map: AxisMapping,
    graph_width: f64,
    graph_height: f64,
}

impl AxisCalibrator {
    /// Validate margins and axes and precompute the mappings.
    ///
    /// # Errors
    ///
    /// Returns [`DigitizeError::Validation`] for an invalid axis or for
    /// margins leaving no plot area.
    pub fn new(
        dimensions: Dimensions,
        margins: MarginSet,
        x_axis: AxisConfig,
        y_axis: AxisConfig,
        log_epsilon: f64,
    ) -> Result<Self, DigitizeError> {
        let graph_width = positive_extent("width", margins.graph_width(dimensions.width))?;
        let graph_height = positive_extent("height", margins.graph_height(dimensions.height))?;
        let x_map = AxisMapping::new(&x_axis, "x", log_epsilon)?;
        let y_map = AxisMapping::new(&y_axis, "y", log_epsilon)?;
        Ok(Self {
            dimensions,
            margins,
            x_axis,
            y_axis,
            x_map,
            y_map,
            graph_width,
            graph_height,
        })
    }

    /// Logical x for a pixel column.
    #[must_use]
    pub fn x(&self, px: f64) -> f64 {
        self.x_map.map((px - self.margins.left) / self.graph_width)
    }

    /// Logical y for a pixel row.
    #[must_use]
    pub fn y(&self, py: f64) -> f64 {
        let adjusted = (f64::from(self.dimensions.height) - py - self.margins.bottom).max(0.0);
        self.y_map.map(adjusted / self.graph_height)
    }

    /// Whether a pixel lies inside the plot area, edges included.
    ///
    /// Columns span `[left, width - right]` and rows
    /// `[top, height - bottom]`. Pixels outside (legend swatches, tick
    /// labels) have no logical position.
    #[must_use]
    pub fn in_plot_area(&self, pixel: PixelCoord) -> bool {
        let (px, py) = (f64::from(pixel.x), f64::from(pixel.y));
        let right = f64::from(self.dimensions.width) - self.margins.right;
        let bottom = f64::from(self.dimensions.height) - self.margins.bottom;
        (self.margins.left..=right).contains(&px) && (self.margins.top..=bottom).contains(&py)
    }

    /// Logical point for a pixel coordinate.
    #[must_use]
    pub fn to_logical(&self, pixel: PixelCoord) -> Point {
        Point::new(self.x(f64::from(pixel.x)), self.y(f64::from(pixel.y)))
    }

    /// The margins this calibration uses.
    #[must_use]
    pub const fn margins(&self) -> &MarginSet {
        &self.margins
    }

    /// The x axis.
    #[must_use]
    pub const fn x_axis(&self) -> &AxisConfig {
        &self.x_axis
    }

    /// The y axis.
    #[must_use]
    pub const fn y_axis(&self) -> &AxisConfig {
        &self.y_axis
    }

    /// Logical size of one pixel step at the low end of each axis.
    /// Used to judge round-trip accuracy.
    #[must_use]
    pub fn pixel_resolution(&self) -> (f64, f64) {
        let x0 = self.x(self.margins.left);
        let y0 = self.y(f64::from(self.dimensions.height) - self.margins.bottom);
        (
            (self.x(self.margins.left + 1.0) - x0).abs(),
            (self.y(f64::from(self.dimensions.height) - self.margins.bottom - 1.0) - y0).abs(),
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const EPS: f64 = 0.001;

    fn dims(width: u32, height: u32) -> Dimensions {
        Dimensions { width, height }
    }

    #[test]
    fn scenario_a_center_pixel() {
        let m = MarginSet::uniform(0.0);
        let axis = AxisConfig::linear(0.0, 10.0);
        let x = pixel_to_logical_x(50.0, 100, &m, &axis, EPS).unwrap();
        let y = pixel_to_logical_y(50.0, 100, &m, &axis, EPS).unwrap();
        assert!((x - 5.0).abs() < 1e-12);
        assert!((y - 5.0).abs() < 1e-12);
    }

    #[test]
    fn scenario_b_log_axis_edges() {
        let m = MarginSet::new(10.0, 10.0, 20.0, 30.0);
        let axis = AxisConfig::log(1.0, 1000.0);
        let bottom = pixel_to_logical_y(200.0 - 30.0, 200, &m, &axis, EPS).unwrap();
        let top = pixel_to_logical_y(20.0, 200, &m, &axis, EPS).unwrap();
        assert!((bottom - 1.0).abs() < 1e-9);
        assert!((top - 1000.0).abs() < 1e-9);
        assert!(top <= 1000.0);
        let middle = pixel_to_logical_y(95.0, 200, &m, &axis, EPS).unwrap();
        assert!((middle - 1000_f64.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn positions_outside_graph_area_clamp_to_axis_ends() {
        let m = MarginSet::new(10.0, 10.0, 10.0, 10.0);
        let axis = AxisConfig::linear(-1.0, 1.0);
        assert!((pixel_to_logical_x(0.0, 100, &m, &axis, EPS).unwrap() + 1.0).abs() < 1e-12);
        assert!((pixel_to_logical_x(99.0, 100, &m, &axis, EPS).unwrap() - 1.0).abs() < 1e-12);
        assert!((pixel_to_logical_y(99.0, 100, &m, &axis, EPS).unwrap() + 1.0).abs() < 1e-12);
    }

    #[test]
    fn log_axis_with_zero_min_uses_epsilon() {
        let m = MarginSet::uniform(0.0);
        let axis = AxisConfig::log(0.0, 10.0);
        let x = pixel_to_logical_x(0.0, 100, &m, &axis, EPS).unwrap();
        assert!((x - EPS).abs() < 1e-12);
    }

    #[test]
    fn monotonic_across_graph_area() {
        let margins = MarginSet::new(37.0, 21.0, 13.0, 29.0);
        let d = dims(317, 233);
        for (x_axis, y_axis) in [
            (AxisConfig::linear(-5.0, 5.0), AxisConfig::linear(0.0, 100.0)),
            (AxisConfig::log(0.01, 100.0), AxisConfig::log(0.0, 1e6)),
            (AxisConfig::linear(0.0, 1.0), AxisConfig::log(1.0, 1000.0)),
        ] {
            let cal = AxisCalibrator::new(d, margins, x_axis, y_axis, EPS).unwrap();
            let xs: Vec<f64> = (0..d.width).map(|px| cal.x(f64::from(px))).collect();
            assert!(xs.windows(2).all(|w| w[0] <= w[1]));
            // Moving down the image lowers logical y.
            let ys: Vec<f64> = (0..d.height).map(|py| cal.y(f64::from(py))).collect();
            assert!(ys.windows(2).all(|w| w[0] >= w[1]));
        }
    }

    #[test]
    fn rejects_margins_without_plot_area() {
        let m = MarginSet::new(60.0, 40.0, 0.0, 0.0);
        let axis = AxisConfig::linear(0.0, 1.0);
        assert!(matches!(
            pixel_to_logical_x(10.0, 100, &m, &axis, EPS),
            Err(DigitizeError::Validation(_))
        ));
        assert!(AxisCalibrator::new(dims(100, 100), m, axis.clone(), axis, EPS).is_err());
    }

    #[test]
    fn rejects_inverted_axis() {
        let m = MarginSet::uniform(0.0);
        let axis = AxisConfig::linear(3.0, 1.0);
        assert!(pixel_to_logical_x(1.0, 10, &m, &axis, EPS).is_err());
    }

    #[test]
    fn plot_area_excludes_margins_and_keeps_edges() {
        let cal = AxisCalibrator::new(
            dims(200, 100),
            MarginSet::new(40.0, 20.0, 10.0, 30.0),
            AxisConfig::linear(0.0, 1.0),
            AxisConfig::linear(0.0, 1.0),
            EPS,
        )
        .unwrap();
        assert!(cal.in_plot_area(PixelCoord::new(40, 10)));
        assert!(cal.in_plot_area(PixelCoord::new(180, 70)));
        assert!(!cal.in_plot_area(PixelCoord::new(39, 50)));
        assert!(!cal.in_plot_area(PixelCoord::new(181, 50)));
        assert!(!cal.in_plot_area(PixelCoord::new(100, 9)));
        assert!(!cal.in_plot_area(PixelCoord::new(100, 71)));
    }

    #[test]
    fn to_logical_maps_both_axes() {
        let cal = AxisCalibrator::new(
            dims(100, 100),
            MarginSet::uniform(0.0),
            AxisConfig::linear(0.0, 10.0),
            AxisConfig::linear(0.0, 20.0),
            EPS,
        )
        .unwrap();
        let p = cal.to_logical(PixelCoord::new(25, 75));
        assert!((p.x - 2.5).abs() < 1e-12);
        assert!((p.y - 5.0).abs() < 1e-12);
        let (rx, ry) = cal.pixel_resolution();
        assert!((rx - 0.1).abs() < 1e-12);
        assert!((ry - 0.2).abs() < 1e-12);
    }
}
