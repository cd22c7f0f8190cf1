//! Incremental pipeline: advance stage-by-stage, inspecting each
//! intermediate result before continuing.
//!
//! [`crate::digitize`] runs the whole chain in one call. [`Pipeline`] lets
//! the caller drive it one step at a time:
//!
//! ```rust
//! # use curvetrace_pipeline::{CalibrationContext, DigitizeError, GraphConfig, Pipeline};
//! # fn run(png: Vec<u8>) -> Result<(), DigitizeError> {
//! let config = GraphConfig::default();
//! let colors = vec!["red".to_string()];
//! let refined = Pipeline::new(png, config, colors, CalibrationContext::default())
//!     .decode()?
//!     .calibrate()?
//!     .classify()
//!     .extract()
//!     .synthesize()
//!     .refine();
//!
//! let result = refined.into_result(std::time::Duration::ZERO);
//! # Ok(())
//! # }
//! ```
//!
//! Each stage method consumes `self` and returns the next state (or a
//! `Result` for the fallible stages), carrying the decoded image and the
//! request along. Only decoding and calibration can fail; everything after
//! records per-color problems as [`CurveError`]s instead.

use crate::background::{BackgroundSet, detect_background};
use crate::calibrate::AxisCalibrator;
use crate::classify::{Color, classify_colors, find_in_palette};
use crate::color::{NamedColor, Rgb};
use crate::extract::extract_colors;
use crate::presets::{CalibrationContext, ResolvedMargins, resolve_margins};
use crate::refine::{RefineStats, refine_points};
use crate::synthesize::synthesize_points;
use crate::types::{
    Curve, CurveError, Dimensions, DigitizeError, ExtractionMetadata, ExtractionResult,
    GraphConfig, PixelCoord, Point, RgbaImage,
};

/// Everything the caller asked for, carried through every stage.
#[derive(Debug, Clone)]
struct Request {
    config: GraphConfig,
    colors: Vec<String>,
    context: CalibrationContext,
}

#[derive(Debug)]
enum Source {
    Bytes(Vec<u8>),
    Image(RgbaImage),
}

/// Entry point for the typestate chain.
pub struct Pipeline;

impl Pipeline {
    /// Start from encoded image bytes (PNG, JPEG, BMP, WebP).
    pub fn new(
        source: Vec<u8>,
        config: GraphConfig,
        colors: Vec<String>,
        context: CalibrationContext,
    ) -> Pending {
        Pending {
            request: Request {
                config,
                colors,
                context,
            },
            source: Source::Bytes(source),
        }
    }

    /// Start from an already decoded buffer; [`Pending::decode`] then only
    /// hands it through.
    pub fn from_image(
        image: RgbaImage,
        config: GraphConfig,
        colors: Vec<String>,
        context: CalibrationContext,
    ) -> Pending {
        Pending {
            request: Request {
                config,
                colors,
                context,
            },
            source: Source::Image(image),
        }
    }
}

// ───────────────────────── Stage 0: Pending ──────────────────────────

/// Pipeline state before any processing has occurred.
#[must_use = "pipeline stages are consumed by advancing; call .decode() to continue"]
pub struct Pending {
    request: Request,
    source: Source,
}

impl Pending {
    /// Size of the encoded input, or zero when started from a buffer.
    #[must_use]
    pub fn source_len(&self) -> usize {
        match &self.source {
            Source::Bytes(bytes) => bytes.len(),
            Source::Image(_) => 0,
        }
    }

    /// Decode the source image and advance to [`Decoded`].
    ///
    /// # Errors
    ///
    /// Returns [`DigitizeError::EmptyInput`] for empty bytes and
    /// [`DigitizeError::ImageDecode`] for corrupt or unsupported data.
    pub fn decode(self) -> Result<Decoded, DigitizeError> {
        let image = match self.source {
            Source::Bytes(bytes) => crate::decode::decode_rgba(&bytes)?,
            Source::Image(image) => image,
        };
        let dimensions = Dimensions::of(&image);
        tracing::debug!(
            width = dimensions.width,
            height = dimensions.height,
            "image decoded"
        );
        Ok(Decoded {
            request: self.request,
            image,
            dimensions,
        })
    }
}

// ───────────────────────── Stage 1: Decoded ──────────────────────────

/// Pipeline state after decoding.
#[must_use = "pipeline stages are consumed by advancing; call .calibrate() to continue"]
pub struct Decoded {
    request: Request,
    image: RgbaImage,
    dimensions: Dimensions,
}

impl Decoded {
    /// The decoded RGBA image.
    #[must_use]
    pub const fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Decoded image dimensions.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    /// Validate the request, resolve margins and build the calibrator.
    ///
    /// # Errors
    ///
    /// Returns [`DigitizeError::Validation`] for an invalid configuration
    /// or an empty color list, and [`DigitizeError::Calibration`] when no
    /// margin fallback leaves a plot area.
    pub fn calibrate(self) -> Result<Calibrated, DigitizeError> {
        let Request {
            config,
            colors,
            context,
        } = &self.request;
        if colors.is_empty() {
            return Err(DigitizeError::Validation(
                "at least one curve color must be requested".to_string(),
            ));
        }
        config.validate(context.log_epsilon)?;

        let x_axis = config.x_axis();
        let y_axis = config.y_axis();
        let margins = resolve_margins(self.dimensions, &x_axis, &y_axis, context)?;
        tracing::info!(
            source = %margins.label(),
            left = margins.margins.left,
            right = margins.margins.right,
            top = margins.margins.top,
            bottom = margins.margins.bottom,
            "margins resolved"
        );

        let calibrator = AxisCalibrator::new(
            self.dimensions,
            margins.margins,
            x_axis,
            y_axis,
            context.log_epsilon,
        )
        .map_err(|e| DigitizeError::Calibration(e.to_string()))?;

        Ok(Calibrated {
            request: self.request,
            image: self.image,
            dimensions: self.dimensions,
            margins,
            calibrator,
        })
    }
}

// ───────────────────────── Stage 2: Calibrated ───────────────────────

/// Pipeline state after margin resolution and calibrator construction.
#[must_use = "pipeline stages are consumed by advancing; call .classify() to continue"]
pub struct Calibrated {
    request: Request,
    image: RgbaImage,
    dimensions: Dimensions,
    margins: ResolvedMargins,
    calibrator: AxisCalibrator,
}

impl Calibrated {
    /// The resolved margins and their provenance.
    #[must_use]
    pub const fn margins(&self) -> &ResolvedMargins {
        &self.margins
    }

    /// The calibrator built from the margins and axes.
    #[must_use]
    pub const fn calibrator(&self) -> &AxisCalibrator {
        &self.calibrator
    }

    /// Propose a palette and match every requested color name against it.
    pub fn classify(self) -> Classified {
        let palette = classify_colors(&self.image, self.request.config.min_size);
        let mut issues = Vec::new();
        let requests: Vec<ColorRequest> = self
            .request
            .colors
            .iter()
            .map(|name| {
                let request = ColorRequest::resolve(name, &palette);
                if request.detected.is_none() {
                    let issue = CurveError::ColorNotFound {
                        color: name.clone(),
                    };
                    tracing::warn!(%issue, known = request.color.is_some(), "requested color");
                    issues.push(issue);
                }
                request
            })
            .collect();

        Classified {
            inner: self,
            palette,
            requests,
            issues,
        }
    }
}

/// One requested curve color after palette matching.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorRequest {
    /// The name as requested.
    pub name: String,
    /// The named color it parses to, if any.
    pub color: Option<NamedColor>,
    /// The highest-ranked palette entry of that color, if detected.
    pub detected: Option<Color>,
}

impl ColorRequest {
    fn resolve(name: &str, palette: &[Color]) -> Self {
        let color = name.parse::<NamedColor>().ok();
        let detected = color.and_then(|c| find_in_palette(palette, c).cloned());
        Self {
            name: name.to_string(),
            color,
            detected,
        }
    }

    /// Color to report for the curve: the detected average, else the
    /// nominal color, else black for an unknown name.
    #[must_use]
    pub fn display_rgb(&self) -> Rgb {
        self.detected.as_ref().map_or_else(
            || self.color.map_or(Rgb::new(0, 0, 0), NamedColor::nominal),
            |c| c.rgb,
        )
    }
}

// ───────────────────────── Stage 3: Classified ───────────────────────

/// Pipeline state after palette classification.
#[must_use = "pipeline stages are consumed by advancing; call .extract() to continue"]
pub struct Classified {
    inner: Calibrated,
    palette: Vec<Color>,
    requests: Vec<ColorRequest>,
    issues: Vec<CurveError>,
}

impl Classified {
    /// The proposed palette.
    #[must_use]
    pub fn palette(&self) -> &[Color] {
        &self.palette
    }

    /// Requested colors in request order.
    #[must_use]
    pub fn requests(&self) -> &[ColorRequest] {
        &self.requests
    }

    /// Per-color issues recorded so far.
    #[must_use]
    pub fn issues(&self) -> &[CurveError] {
        &self.issues
    }

    /// Detect background buckets from the image border.
    #[must_use]
    pub fn detect_background(&self) -> BackgroundSet {
        detect_background(&self.inner.image)
    }

    /// Detect the background, then extract pixels for every requested color.
    pub fn extract(self) -> Extracted {
        let background = self.detect_background();
        self.extract_with(background)
    }

    /// Extract pixels for every requested color with a given background.
    /// Unknown color names get an empty pixel list without scanning.
    pub fn extract_with(self, background: BackgroundSet) -> Extracted {
        let known: Vec<NamedColor> = self.requests.iter().filter_map(|r| r.color).collect();
        let mut scanned = extract_colors(
            &self.inner.image,
            &known,
            self.inner.request.config.color_tolerance,
            &background,
        )
        .into_iter();

        let pixels: Vec<Vec<PixelCoord>> = self
            .requests
            .iter()
            .map(|r| {
                r.color
                    .and_then(|_| scanned.next())
                    .unwrap_or_default()
            })
            .collect();

        Extracted {
            inner: self,
            background,
            pixels,
        }
    }
}

// ───────────────────────── Stage 4: Extracted ────────────────────────

/// Pipeline state after per-color pixel extraction.
#[must_use = "pipeline stages are consumed by advancing; call .synthesize() to continue"]
pub struct Extracted {
    inner: Classified,
    background: BackgroundSet,
    pixels: Vec<Vec<PixelCoord>>,
}

impl Extracted {
    /// Background buckets excluded from matching.
    #[must_use]
    pub const fn background(&self) -> &BackgroundSet {
        &self.background
    }

    /// Matched pixels, one list per requested color.
    #[must_use]
    pub fn pixels(&self) -> &[Vec<PixelCoord>] {
        &self.pixels
    }

    /// Calibrate the pixels into raw logical points.
    pub fn synthesize(self) -> Synthesized {
        let calibrator = &self.inner.inner.calibrator;
        let raw: Vec<Vec<Point>> = self
            .pixels
            .iter()
            .map(|pixels| {
                synthesize_points(pixels, calibrator, calibrator.x_axis(), calibrator.y_axis())
            })
            .collect();
        Synthesized {
            inner: self.inner,
            pixel_count: self.pixels.iter().map(Vec::len).sum(),
            raw,
        }
    }
}

// ───────────────────────── Stage 5: Synthesized ──────────────────────

/// Pipeline state after calibration of every matched pixel.
#[must_use = "pipeline stages are consumed by advancing; call .refine() to continue"]
pub struct Synthesized {
    inner: Classified,
    pixel_count: usize,
    raw: Vec<Vec<Point>>,
}

impl Synthesized {
    /// Raw points, one list per requested color.
    #[must_use]
    pub fn raw_points(&self) -> &[Vec<Point>] {
        &self.raw
    }

    /// Total matched pixels before calibration.
    #[must_use]
    pub const fn pixel_count(&self) -> usize {
        self.pixel_count
    }

    /// Refine every curve and record empty ones.
    pub fn refine(self) -> Refined {
        let Self { mut inner, raw, .. } = self;
        let request = &inner.inner.request;
        let x_axis = inner.inner.calibrator.x_axis();

        let mut stats = Vec::with_capacity(raw.len());
        let mut curves = Vec::with_capacity(raw.len());
        for (color, points) in inner.requests.iter().zip(raw) {
            let refined = refine_points(
                points,
                x_axis,
                request.context.log_epsilon,
                &request.config.refine,
            );
            if refined.points.is_empty() && color.color.is_some() {
                let issue = CurveError::NoPointsExtracted {
                    color: color.name.clone(),
                };
                tracing::warn!(%issue, "empty curve");
                inner.issues.push(issue);
            }
            stats.push(refined.stats);
            curves.push(Curve::new(
                color.name.clone(),
                color.display_rgb().to_hex(),
                refined.points,
                refined.metadata,
            ));
        }

        Refined {
            inner,
            curves,
            stats,
        }
    }
}

// ───────────────────────── Stage 6: Refined ──────────────────────────

/// Final pipeline state: one curve per requested color.
pub struct Refined {
    inner: Classified,
    curves: Vec<Curve>,
    stats: Vec<RefineStats>,
}

impl Refined {
    /// Refined curves in request order.
    #[must_use]
    pub fn curves(&self) -> &[Curve] {
        &self.curves
    }

    /// Per-curve refinement statistics in request order.
    #[must_use]
    pub fn stats(&self) -> &[RefineStats] {
        &self.stats
    }

    /// Every per-color issue recorded during the run.
    #[must_use]
    pub fn issues(&self) -> &[CurveError] {
        &self.inner.issues
    }

    /// Assemble the final result.
    #[must_use]
    pub fn into_result(self, processing_time: std::time::Duration) -> ExtractionResult {
        let calibrated = self.inner.inner;
        let metadata = ExtractionMetadata::for_image(
            calibrated.dimensions,
            self.inner.palette.len(),
            self.inner.issues,
            calibrated.margins.margins,
            calibrated.margins.label(),
        );
        let result = ExtractionResult::assemble(self.curves, metadata, processing_time);
        tracing::info!(
            curves = result.curves.len(),
            total_points = result.total_points,
            quality = result.metadata.quality_score,
            success = result.success,
            "extraction finished"
        );
        result
    }
}
