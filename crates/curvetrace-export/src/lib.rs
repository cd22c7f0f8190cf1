//! curvetrace-export: Pure serializers for digitized curves (sans-IO)
//!
//! Converts an [`ExtractionResult`](curvetrace_pipeline::ExtractionResult)
//! into CSV text or an SVG plot. Every function returns a `String`;
//! writing files is the caller's business.

pub mod csv;
pub mod svg;

pub use csv::to_csv;
pub use svg::{SvgMetadata, to_svg};
