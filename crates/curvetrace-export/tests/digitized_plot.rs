//! Integration test: digitize a generated plot and export it as CSV and SVG.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use curvetrace_pipeline::{CalibrationContext, GraphConfig, MarginOverrides, RgbaImage, digitize};
use image::ImageEncoder;
use image::codecs::png::PngEncoder;

fn plot_png() -> Vec<u8> {
    let img = RgbaImage::from_fn(80, 80, |x, y| {
        if (10..70).contains(&x) && y == 80 - x {
            image::Rgba([200, 20, 20, 255])
        } else {
            image::Rgba([255, 255, 255, 255])
        }
    });
    let mut buf = Vec::new();
    PngEncoder::new(&mut buf)
        .write_image(
            img.as_raw(),
            img.width(),
            img.height(),
            image::ExtendedColorType::Rgba8,
        )
        .unwrap();
    buf
}

fn zero_margins() -> CalibrationContext {
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
fn digitized_plot_exports_to_csv_and_svg() {
    let config = GraphConfig {
        x_max: 8.0,
        y_max: 8.0,
        min_size: 10,
        ..GraphConfig::default()
    };
    let result = digitize(
        &plot_png(),
        &config,
        &["red".to_string(), "blue".to_string()],
        &zero_margins(),
    );
    assert!(result.success, "{:?}", result.error);

    let csv = curvetrace_export::to_csv(&result);
    let mut lines = csv.lines();
    assert_eq!(lines.next(), Some("curve,x,y"));
    let rows: Vec<&str> = lines.collect();
    assert_eq!(rows.len(), result.total_points);
    assert!(rows.iter().all(|row| row.starts_with("red,")));

    let context = zero_margins();
    let svg = curvetrace_export::to_svg(
        &result,
        &config,
        context.log_epsilon,
        &curvetrace_export::SvgMetadata {
            title: Some("diagonal"),
            description: None,
        },
    );
    assert!(svg.contains("<svg"));
    assert!(svg.contains("<title>diagonal</title>"));
    assert_eq!(svg.matches("<path").count(), 1);
    let red = result.curve("red").unwrap();
    assert!(svg.contains(&format!(r#"stroke="{}""#, red.color)));
}
