//! Raw logical points from extracted pixels.

use crate::calibrate::AxisCalibrator;
use crate::types::{AxisConfig, PixelCoord, Point};

/// Calibrate every pixel and keep only points that land inside both axis
/// ranges. Out-of-range and non-finite values are dropped, never clamped.
///
/// Pixels outside the calibrator's plot area are dropped before mapping,
/// since the calibrator would otherwise pin them to the axis ends.
///
/// The pipeline passes the calibrator's own axes; a caller may pass
/// narrower ones to keep a sub-range of the plot.
#[must_use]
pub fn synthesize_points(
    pixels: &[PixelCoord],
    calibrator: &AxisCalibrator,
    x_axis: &AxisConfig,
    y_axis: &AxisConfig,
) -> Vec<Point> {
    let points: Vec<Point> = pixels
        .iter()
        .filter(|&&pixel| calibrator.in_plot_area(pixel))
        .map(|&pixel| calibrator.to_logical(pixel))
        .filter(|p| x_axis.contains(p.x) && y_axis.contains(p.y))
        .collect();

    tracing::trace!(
        pixels = pixels.len(),
        kept = points.len(),
        "points synthesized"
    );
    points
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::presets::MarginSet;
    use crate::types::Dimensions;

    fn square(size: u32, margin: f64, x: AxisConfig, y: AxisConfig) -> AxisCalibrator {
        AxisCalibrator::new(
            Dimensions {
                width: size,
                height: size,
            },
            MarginSet::uniform(margin),
            x,
            y,
            0.001,
        )
        .unwrap()
    }

    fn run(pixels: &[PixelCoord], cal: &AxisCalibrator) -> Vec<Point> {
        synthesize_points(pixels, cal, cal.x_axis(), cal.y_axis())
    }

    #[test]
    fn maps_pixels_in_input_order() {
        let axis = AxisConfig::linear(0.0, 10.0);
        let cal = square(100, 0.0, axis.clone(), axis);
        let points = run(&[PixelCoord::new(50, 50), PixelCoord::new(0, 100)], &cal);
        assert_eq!(points.len(), 2);
        assert!((points[0].x - 5.0).abs() < 1e-12);
        assert!((points[0].y - 5.0).abs() < 1e-12);
        assert!(points[1].x.abs() < 1e-12);
        assert!(points[1].y.abs() < 1e-12);
    }

    #[test]
    fn log_axis_with_non_positive_min_keeps_epsilon_points() {
        let cal = square(
            50,
            5.0,
            AxisConfig::log(-1.0, 100.0),
            AxisConfig::linear(0.0, 1.0),
        );
        // Rows and columns 5..=45 are inside the plot area.
        let pixels: Vec<PixelCoord> = (5..=45).map(|i| PixelCoord::new(i, i)).collect();
        let points = run(&pixels, &cal);
        assert_eq!(points.len(), 41);
        assert!((points[0].x - 0.001).abs() < 1e-12);
    }

    #[test]
    fn margin_pixels_are_dropped_not_pinned_to_axis_ends() {
        let axis = AxisConfig::linear(0.0, 10.0);
        let cal = square(100, 20.0, axis.clone(), axis);
        let pixels = [
            PixelCoord::new(5, 50),
            PixelCoord::new(50, 50),
            PixelCoord::new(95, 50),
            PixelCoord::new(50, 2),
            PixelCoord::new(50, 99),
        ];
        let points = run(&pixels, &cal);
        assert_eq!(points.len(), 1);
        assert!((points[0].x - 5.0).abs() < 1e-12);
    }

    #[test]
    fn points_outside_requested_bounds_are_dropped_not_clamped() {
        let axis = AxisConfig::linear(0.0, 10.0);
        let cal = square(100, 0.0, axis.clone(), axis);
        let pixels: Vec<PixelCoord> = (0..100).map(|i| PixelCoord::new(i, 50)).collect();
        let narrow = AxisConfig::linear(2.0, 4.0);
        let points = synthesize_points(&pixels, &cal, &narrow, cal.y_axis());
        // Columns 20..=40 map to 2.0..=4.0.
        assert_eq!(points.len(), 21);
        assert!(points.iter().all(|p| (2.0..=4.0).contains(&p.x)));
    }
}
