//! Per-color pixel extraction.
//!
//! A non-background pixel belongs to a named color when any of three tests
//! passes, tried in order:
//!
//! 1. the color's base RGB box,
//! 2. the base box widened by `tolerance` on every channel (clamped to
//!    `0..=255`),
//! 3. the color's HSV rule ([`NamedColor::matches_hsv`]), which handles the
//!    red wraparound at 0°/360°.
//!
//! The first two tests catch the flat interior of a stroke, the last one
//! its anti-aliased fringe. Output coordinates are in scan order, which
//! carries no meaning downstream.

use image::RgbaImage;

use crate::background::BackgroundSet;
use crate::color::{NamedColor, Rgb};
use crate::types::PixelCoord;

/// Inclusive per-channel RGB range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RgbBox {
    lower: Rgb,
    upper: Rgb,
}

impl RgbBox {
    const fn contains(&self, rgb: Rgb) -> bool {
        rgb.r >= self.lower.r
            && rgb.r <= self.upper.r
            && rgb.g >= self.lower.g
            && rgb.g <= self.upper.g
            && rgb.b >= self.lower.b
            && rgb.b <= self.upper.b
    }

    const fn widened(&self, tolerance: u8) -> Self {
        Self {
            lower: Rgb::new(
                self.lower.r.saturating_sub(tolerance),
                self.lower.g.saturating_sub(tolerance),
                self.lower.b.saturating_sub(tolerance),
            ),
            upper: Rgb::new(
                self.upper.r.saturating_add(tolerance),
                self.upper.g.saturating_add(tolerance),
                self.upper.b.saturating_add(tolerance),
            ),
        }
    }
}

/// Precomputed matching rule for one named color.
#[derive(Debug, Clone, Copy)]
pub struct ColorMatcher {
    color: NamedColor,
    base: RgbBox,
    expanded: RgbBox,
}

impl ColorMatcher {
    /// Build the rule for `color` with the given per-channel tolerance.
    #[must_use]
    pub const fn new(color: NamedColor, tolerance: u8) -> Self {
        let (lower, upper) = color.rgb_box();
        let base = RgbBox { lower, upper };
        Self {
            color,
            base,
            expanded: base.widened(tolerance),
        }
    }

    /// The color this rule matches.
    #[must_use]
    pub const fn color(&self) -> NamedColor {
        self.color
    }

    /// Whether `rgb` belongs to the color.
    #[must_use]
    pub fn matches(&self, rgb: Rgb) -> bool {
        self.base.contains(rgb)
            || self.expanded.contains(rgb)
            || self.color.matches_hsv(rgb.to_hsv())
    }
}

/// Pixels of `image` belonging to `color`, skipping background buckets and
/// fully transparent pixels.
#[must_use]
pub fn extract_color(
    image: &RgbaImage,
    color: NamedColor,
    tolerance: u8,
    background: &BackgroundSet,
) -> Vec<PixelCoord> {
    extract_colors(image, &[color], tolerance, background)
        .pop()
        .unwrap_or_default()
}

/// Pixels for several colors in one scan of the image.
///
/// Returns one list per entry of `colors`, in the same order. A pixel
/// may land in more than one list when color rules overlap.
#[must_use]
pub fn extract_colors(
    image: &RgbaImage,
    colors: &[NamedColor],
    tolerance: u8,
    background: &BackgroundSet,
) -> Vec<Vec<PixelCoord>> {
    let matchers: Vec<ColorMatcher> = colors
        .iter()
        .map(|&c| ColorMatcher::new(c, tolerance))
        .collect();
    let mut found: Vec<Vec<PixelCoord>> = vec![Vec::new(); matchers.len()];
    if matchers.is_empty() {
        return found;
    }

    let mut background_pixels = 0_u64;
    for (x, y, pixel) in image.enumerate_pixels() {
        let [r, g, b, a] = pixel.0;
        if a == 0 {
            continue;
        }
        let rgb = Rgb::new(r, g, b);
        if background.contains(rgb) {
            background_pixels += 1;
            continue;
        }
        for (matcher, out) in matchers.iter().zip(found.iter_mut()) {
            if matcher.matches(rgb) {
                out.push(PixelCoord::new(x, y));
            }
        }
    }

    tracing::debug!(
        colors = colors.len(),
        background_pixels,
        matched = found.iter().map(Vec::len).sum::<usize>(),
        "color extraction finished"
    );

    found
}
