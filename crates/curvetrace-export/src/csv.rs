//! CSV export.
//!
//! One row per point, in curve order then point order, under a
//! `curve,x,y` header. Floats use Rust's shortest round-trip formatting.

use std::fmt::Write;

use curvetrace_pipeline::ExtractionResult;

/// Column header line, without the trailing newline.
pub const HEADER: &str = "curve,x,y";

/// Serialize every curve point of a result into CSV text.
///
/// Empty curves contribute no rows. A failed result yields just the
/// header.
///
/// # Examples
///
/// ```
/// use curvetrace_pipeline::{Curve, CurveMetadata, ExtractionMetadata, ExtractionResult, Point};
/// use curvetrace_export::to_csv;
///
/// let curve = Curve::new(
///     "red".to_string(),
///     "#c81414".to_string(),
///     vec![Point::new(0.5, 1.25)],
///     CurveMetadata::default(),
/// );
/// let result = ExtractionResult::assemble(
///     vec![curve],
///     ExtractionMetadata::default(),
///     std::time::Duration::ZERO,
/// );
/// assert_eq!(to_csv(&result), "curve,x,y\nred,0.5,1.25\n");
/// ```
#[must_use]
pub fn to_csv(result: &ExtractionResult) -> String {
    let mut out = String::new();
    out.push_str(HEADER);
    out.push('\n');
    for curve in &result.curves {
        let name = escape_field(&curve.name);
        for p in &curve.points {
            // Writing to a String cannot fail.
            let _ = writeln!(out, "{name},{},{}", p.x, p.y);
        }
    }
    out
}

/// Quote a field when it contains a separator, a quote or a line break;
/// embedded quotes are doubled.
fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use curvetrace_pipeline::{Curve, CurveMetadata, ExtractionMetadata, Point};

    use super::*;

    fn curve(name: &str, points: &[(f64, f64)]) -> Curve {
        Curve::new(
            name.to_string(),
            "#000000".to_string(),
            points.iter().map(|&(x, y)| Point::new(x, y)).collect(),
            CurveMetadata::default(),
        )
    }

    fn result(curves: Vec<Curve>) -> ExtractionResult {
        ExtractionResult::assemble(curves, ExtractionMetadata::default(), Duration::ZERO)
    }

    #[test]
    fn rows_follow_curve_then_point_order() {
        let csv = to_csv(&result(vec![
            curve("red", &[(0.0, 1.0), (2.0, 3.0)]),
            curve("blue", &[(0.1, -4.5)]),
        ]));
        assert_eq!(csv, "curve,x,y\nred,0,1\nred,2,3\nblue,0.1,-4.5\n");
    }

    #[test]
    fn empty_curves_emit_only_the_header() {
        let csv = to_csv(&result(vec![curve("green", &[])]));
        assert_eq!(csv, "curve,x,y\n");
    }

    #[test]
    fn awkward_names_are_quoted() {
        assert_eq!(escape_field("red"), "red");
        assert_eq!(escape_field("a,b"), "\"a,b\"");
        assert_eq!(escape_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(escape_field("two\nlines"), "\"two\nlines\"");
    }

    #[test]
    fn tiny_values_round_trip_through_text() {
        let csv = to_csv(&result(vec![curve("red", &[(1e-9, 0.001)])]));
        let row = csv.lines().nth(1).unwrap_or_default();
        let fields: Vec<&str> = row.split(',').collect();
        assert_eq!(fields[1].parse::<f64>().ok(), Some(1e-9));
        assert_eq!(fields[2].parse::<f64>().ok(), Some(0.001));
    }
}
