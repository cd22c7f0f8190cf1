//! SVG export serializer.
//!
//! Plots digitized curves back into an SVG document using the [`svg`]
//! crate for document construction, XML escaping and path data
//! formatting.
//!
//! The plot area is a fixed frame inside the `viewBox`. Logical
//! coordinates are normalized across each axis range (linearly, or in
//! ln-space for log axes) and placed in the frame with y growing upward.
//! Each non-empty curve becomes one `<path>` stroked in its reported
//! color.
//!
//! This is a pure function with no I/O -- it returns a `String`.

use svg::Document;
use svg::node::element::path::Data;
use svg::node::element::{Description, Element, Path, Rectangle, Title};
use svg::node::{Node, Text};

use curvetrace_pipeline::{AxisConfig, Curve, ExtractionResult, GraphConfig, Point, Scale};

/// Document width in user units.
const DOCUMENT_WIDTH: f64 = 640.0;
/// Document height in user units.
const DOCUMENT_HEIGHT: f64 = 480.0;
/// Gap between the document edge and the plot frame.
const PADDING: f64 = 48.0;
/// Font size for the axis range labels.
const LABEL_FONT_SIZE: f64 = 12.0;

/// Metadata to embed in the SVG document.
///
/// Both fields are optional. When present, a `<title>` and/or `<desc>`
/// element is emitted immediately after the opening `<svg>` tag.
///
/// Text values are XML-escaped automatically by the `svg` crate.
#[derive(Debug, Clone, Default)]
pub struct SvgMetadata<'a> {
    /// Document title, emitted as `<title>`.
    ///
    /// Typically the source image filename (without extension).
    pub title: Option<&'a str>,

    /// Document description, emitted as `<desc>`.
    pub description: Option<&'a str>,
}

/// Placement of logical coordinates inside the plot frame.
struct PlotFrame {
    x: AxisSpan,
    y: AxisSpan,
    left: f64,
    top: f64,
    width: f64,
    height: f64,
}

/// One axis range, normalized in the space its scale plots in.
struct AxisSpan {
    scale: Scale,
    low: f64,
    high: f64,
}

impl AxisSpan {
    fn new(axis: &AxisConfig, log_epsilon: f64) -> Self {
        let floor = axis.effective_min(log_epsilon);
        let (low, high) = match axis.scale {
            Scale::Linear => (floor, axis.max),
            Scale::Log => (floor.ln(), axis.max.ln()),
        };
        Self {
            scale: axis.scale,
            low,
            high,
        }
    }

    /// Fraction of the range covered up to `value`, clamped to `[0, 1]`.
    fn fraction(&self, value: f64) -> f64 {
        let position = match self.scale {
            Scale::Linear => value,
            Scale::Log => value.max(self.low.exp()).ln(),
        };
        let span = self.high - self.low;
        if span > 0.0 && span.is_finite() {
            ((position - self.low) / span).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

impl PlotFrame {
    fn new(config: &GraphConfig, log_epsilon: f64) -> Self {
        Self {
            x: AxisSpan::new(&config.x_axis(), log_epsilon),
            y: AxisSpan::new(&config.y_axis(), log_epsilon),
            left: PADDING,
            top: PADDING,
            width: DOCUMENT_WIDTH - 2.0 * PADDING,
            height: DOCUMENT_HEIGHT - 2.0 * PADDING,
        }
    }

    fn place(&self, p: Point) -> (f64, f64) {
        (
            self.left + self.x.fraction(p.x) * self.width,
            self.top + (1.0 - self.y.fraction(p.y)) * self.height,
        )
    }

    fn bottom(&self) -> f64 {
        self.top + self.height
    }
}

/// Build the `d` attribute for a curve inside `frame`.
///
/// Returns `None` for an empty curve. A single point yields a zero-length
/// segment so round line caps still mark it.
fn curve_path_data(curve: &Curve, frame: &PlotFrame) -> Option<Data> {
    let (first, rest) = curve.points.split_first()?;
    let start = frame.place(*first);
    let mut data = Data::new().move_to(start);
    if rest.is_empty() {
        data = data.line_to(start);
    }
    for p in rest {
        data = data.line_to(frame.place(*p));
    }
    Some(data)
}

/// A `<text>` node at `(x, y)`.
fn label(text: &str, x: f64, y: f64, anchor: &str) -> Element {
    let mut el = Element::new("text");
    el.assign("x", x);
    el.assign("y", y);
    el.assign("font-size", LABEL_FONT_SIZE);
    el.assign("font-family", "sans-serif");
    el.assign("text-anchor", anchor);
    el.append(Text::new(text));
    el
}

fn axis_label(axis: &AxisConfig) -> String {
    let suffix = match axis.scale {
        Scale::Linear => "",
        Scale::Log => " (log)",
    };
    if axis.name.is_empty() {
        format!("{} .. {}{suffix}", axis.min, axis.max)
    } else {
        format!("{}: {} .. {}{suffix}", axis.name, axis.min, axis.max)
    }
}

/// Serialize a digitized result into an SVG plot.
///
/// The document holds a frame for the plot area, range labels for both
/// axes and one `<path>` per non-empty curve, stroked in the curve's
/// `color` and tagged with a `data-curve` attribute carrying its name.
/// Points are placed using the axis ranges and scales of `config`, so the
/// plot is faithful to the request that produced `result`. `log_epsilon`
/// must be the value the request was digitized with; it replaces a
/// non-positive log-axis minimum exactly as calibration did.
///
/// # Examples
///
/// ```
/// use curvetrace_pipeline::{
///     Curve, CurveMetadata, ExtractionMetadata, ExtractionResult, GraphConfig, Point,
/// };
/// use curvetrace_export::{SvgMetadata, to_svg};
/// use curvetrace_pipeline::presets::DEFAULT_LOG_EPSILON;
///
/// let curve = Curve::new(
///     "red",
///     "#c81414",
///     vec![Point::new(0.0, 0.0), Point::new(1.0, 1.0)],
///     CurveMetadata::default(),
/// );
/// let result = ExtractionResult::assemble(
///     vec![curve],
///     ExtractionMetadata::default(),
///     std::time::Duration::ZERO,
/// );
/// let metadata = SvgMetadata {
///     title: Some("transfer"),
///     ..SvgMetadata::default()
/// };
/// let svg = to_svg(&result, &GraphConfig::default(), DEFAULT_LOG_EPSILON, &metadata);
/// assert!(svg.contains("<title>transfer</title>"));
/// assert!(svg.contains(r##"stroke="#c81414""##));
/// ```
#[must_use]
pub fn to_svg(
    result: &ExtractionResult,
    config: &GraphConfig,
    log_epsilon: f64,
    metadata: &SvgMetadata<'_>,
) -> String {
    let frame = PlotFrame::new(config, log_epsilon);

    let mut doc = Document::new()
        .set("width", DOCUMENT_WIDTH)
        .set("height", DOCUMENT_HEIGHT)
        .set("viewBox", (0.0, 0.0, DOCUMENT_WIDTH, DOCUMENT_HEIGHT));

    if let Some(title) = metadata.title {
        doc = doc.add(Title::new(title));
    }
    if let Some(description) = metadata.description {
        doc = doc.add(Description::new().add(Text::new(description)));
    }

    doc = doc.add(
        Rectangle::new()
            .set("x", frame.left)
            .set("y", frame.top)
            .set("width", frame.width)
            .set("height", frame.height)
            .set("fill", "none")
            .set("stroke", "#808080")
            .set("stroke-width", 1),
    );
    doc = doc.add(label(
        &axis_label(&config.x_axis()),
        frame.left + frame.width / 2.0,
        frame.bottom() + PADDING / 2.0,
        "middle",
    ));
    doc = doc.add(label(
        &axis_label(&config.y_axis()),
        frame.left,
        frame.top - PADDING / 4.0,
        "start",
    ));

    for curve in &result.curves {
        let Some(data) = curve_path_data(curve, &frame) else {
            continue;
        };
        let path = Path::new()
            .set("d", data)
            .set("data-curve", curve.name.as_str())
            .set("fill", "none")
            .set("stroke", curve.color.as_str())
            .set("stroke-width", 1.5)
            .set("stroke-linecap", "round")
            .set("stroke-linejoin", "round");
        doc = doc.add(path);
    }

    // The svg crate omits the XML declaration, so we prepend it.
    format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{doc}\n")
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use curvetrace_pipeline::presets::DEFAULT_LOG_EPSILON;
    use curvetrace_pipeline::{CurveMetadata, ExtractionMetadata};

    use super::*;

    const EPS: f64 = DEFAULT_LOG_EPSILON;

    fn curve(name: &str, color: &str, points: &[(f64, f64)]) -> Curve {
        Curve::new(
            name,
            color,
            points.iter().map(|&(x, y)| Point::new(x, y)).collect(),
            CurveMetadata::default(),
        )
    }

    fn result(curves: Vec<Curve>) -> ExtractionResult {
        ExtractionResult::assemble(curves, ExtractionMetadata::default(), Duration::ZERO)
    }

    fn no_meta() -> SvgMetadata<'static> {
        SvgMetadata::default()
    }

    fn path_count(svg: &str) -> usize {
        svg.matches("<path").count()
    }

    #[test]
    fn document_has_declaration_frame_and_viewbox() {
        let svg = to_svg(&result(vec![]), &GraphConfig::default(), EPS, &no_meta());
        assert!(svg.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
        assert!(svg.contains(r#"viewBox="0 0 640 480""#));
        assert!(svg.contains("<rect"));
        assert_eq!(path_count(&svg), 0);
        assert!(svg.trim_end().ends_with("</svg>"));
    }

    #[test]
    fn one_path_per_non_empty_curve() {
        let svg = to_svg(
            &result(vec![
                curve("red", "#c81414", &[(0.0, 0.0), (1.0, 1.0)]),
                curve("green", "#000000", &[]),
                curve("blue", "#1414c8", &[(0.5, 0.5)]),
            ]),
            &GraphConfig::default(),
            EPS,
            &no_meta(),
        );
        assert_eq!(path_count(&svg), 2);
        assert!(svg.contains(r#"data-curve="red""#));
        assert!(svg.contains(r#"data-curve="blue""#));
        assert!(!svg.contains(r#"data-curve="green""#));
        assert!(svg.contains(r##"stroke="#1414c8""##));
    }

    #[test]
    fn linear_corners_land_on_frame_corners() {
        let frame = PlotFrame::new(&GraphConfig::default(), EPS);
        let (x0, y0) = frame.place(Point::new(0.0, 0.0));
        let (x1, y1) = frame.place(Point::new(1.0, 1.0));
        assert!((x0 - PADDING).abs() < 1e-9);
        assert!((y0 - (DOCUMENT_HEIGHT - PADDING)).abs() < 1e-9);
        assert!((x1 - (DOCUMENT_WIDTH - PADDING)).abs() < 1e-9);
        assert!((y1 - PADDING).abs() < 1e-9);
    }

    #[test]
    fn log_axis_places_decades_evenly() {
        let config = GraphConfig {
            y_min: 1.0,
            y_max: 100.0,
            y_scale_type: Scale::Log,
            ..GraphConfig::default()
        };
        let frame = PlotFrame::new(&config, EPS);
        let (_, mid) = frame.place(Point::new(0.0, 10.0));
        let expected = PADDING + frame.height / 2.0;
        assert!((mid - expected).abs() < 1e-9);
    }

    #[test]
    fn log_floor_follows_the_request_epsilon() {
        // y on [0, 1] log with epsilon 1e-6: 1e-3 sits halfway up.
        let config = GraphConfig {
            y_min: 0.0,
            y_max: 1.0,
            y_scale_type: Scale::Log,
            ..GraphConfig::default()
        };
        let frame = PlotFrame::new(&config, 1e-6);
        let (_, mid) = frame.place(Point::new(0.0, 1e-3));
        let expected = PADDING + frame.height / 2.0;
        assert!((mid - expected).abs() < 1e-9);
        let (_, low) = frame.place(Point::new(0.0, 1e-5));
        assert!(low < frame.bottom());
    }

    #[test]
    fn out_of_range_values_are_clamped_into_the_frame() {
        let frame = PlotFrame::new(&GraphConfig::default(), EPS);
        let (x, y) = frame.place(Point::new(-5.0, 7.0));
        assert!((x - PADDING).abs() < 1e-9);
        assert!((y - PADDING).abs() < 1e-9);
    }

    #[test]
    fn metadata_is_escaped() {
        let metadata = SvgMetadata {
            title: Some("I_D vs V_GS"),
            description: Some("a < b & c"),
        };
        let svg = to_svg(&result(vec![]), &GraphConfig::default(), EPS, &metadata);
        assert!(svg.contains("<title>I_D vs V_GS</title>"));
        assert!(svg.contains("<desc>a &lt; b &amp; c</desc>"));
    }

    #[test]
    fn axis_labels_name_ranges() {
        let config = GraphConfig {
            x_axis_name: "VGS".to_string(),
            x_max: 5.0,
            ..GraphConfig::default()
        };
        let svg = to_svg(&result(vec![]), &config, EPS, &no_meta());
        assert!(svg.contains("VGS: 0 .. 5"));
        assert!(svg.contains("0 .. 1"));
    }
}
