//! Palette proposal: rank the non-background colors present in an image.
//!
//! Every pixel is converted to HSV. Near-gray pixels (grid lines,
//! anti-aliased background) and near-white/near-black pixels are skipped;
//! the rest are binned by 30° hue, tenth-of-saturation and tenth-of-value.
//! Bins holding at least `min_pixels` samples become palette entries,
//! averaged in RGB and ranked by pixel count.
//!
//! The palette drives the caller's color selection and tells the
//! extractor which requested colors were actually seen.

use image::RgbaImage;
use serde::{Deserialize, Serialize};

use crate::color::{Hsv, NamedColor, Rgb, hue_bin};
use crate::types::DigitizeError;

/// Default minimum pixel count for a palette entry.
pub const DEFAULT_MIN_PIXELS: u32 = 500;

/// Maximum number of palette entries reported.
pub const MAX_PALETTE_SIZE: usize = 10;

/// Pixel count at which a palette entry reaches full confidence.
const FULL_CONFIDENCE_PIXELS: f64 = 1000.0;

/// Channel spread below which a pixel counts as gray.
const NEAR_GRAY_THRESHOLD: u8 = 10;

const HUE_BINS: usize = 12;
const SATURATION_BINS: usize = 10;
const VALUE_BINS: usize = 10;

/// One proposed palette entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Color {
    /// Human-readable name derived from the bin's hue.
    pub name: NamedColor,
    /// Average RGB of the pixels in the bin.
    pub rgb: Rgb,
    /// HSV of the averaged RGB.
    pub hsv: Hsv,
    /// Number of pixels in the bin.
    pub pixel_count: u64,
    /// `min(pixel_count / 1000, 1)`.
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, Default)]
struct Bin {
    count: u64,
    r_sum: u64,
    g_sum: u64,
    b_sum: u64,
}

impl Bin {
    fn add(&mut self, rgb: Rgb) {
        self.count += 1;
        self.r_sum += u64::from(rgb.r);
        self.g_sum += u64::from(rgb.g);
        self.b_sum += u64::from(rgb.b);
    }

    #[allow(clippy::cast_possible_truncation)]
    fn average(&self) -> Rgb {
        // Averages of u8 samples always fit in u8.
        let avg = |sum: u64| (sum / self.count.max(1)) as u8;
        Rgb::new(avg(self.r_sum), avg(self.g_sum), avg(self.b_sum))
    }
}

/// Combined bin index for an HSV sample.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn bin_index(hsv: Hsv) -> usize {
    let s = ((hsv.s * 10.0).floor() as usize).min(SATURATION_BINS - 1);
    let v = ((hsv.v * 10.0).floor() as usize).min(VALUE_BINS - 1);
    (hue_bin(hsv.h) * SATURATION_BINS + s) * VALUE_BINS + v
}

/// Propose a palette for an already decoded image.
///
/// Returns at most [`MAX_PALETTE_SIZE`] entries ordered by descending
/// pixel count (and therefore descending confidence). An image with no
/// qualifying colors yields an empty palette, not an error.
#[must_use]
pub fn classify_colors(image: &RgbaImage, min_pixels: u32) -> Vec<Color> {
    let mut bins = vec![Bin::default(); HUE_BINS * SATURATION_BINS * VALUE_BINS];
    let mut skipped_gray = 0_u64;
    let mut skipped_extreme = 0_u64;

    for pixel in image.pixels() {
        let [r, g, b, a] = pixel.0;
        if a == 0 {
            continue;
        }
        let rgb = Rgb::new(r, g, b);
        if rgb.is_near_gray(NEAR_GRAY_THRESHOLD) {
            skipped_gray += 1;
            continue;
        }
        let hsv = rgb.to_hsv();
        if hsv.s < 0.1 || hsv.v <= 0.1 || hsv.v >= 0.9 {
            skipped_extreme += 1;
            continue;
        }
        bins[bin_index(hsv)].add(rgb);
    }

    let threshold = u64::from(min_pixels);
    let mut ranked: Vec<&Bin> = bins
        .iter()
        .filter(|b| b.count > 0 && b.count >= threshold)
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count));
    ranked.truncate(MAX_PALETTE_SIZE);

    let palette: Vec<Color> = ranked
        .into_iter()
        .map(|bin| {
            let rgb = bin.average();
            let hsv = rgb.to_hsv();
            #[allow(clippy::cast_precision_loss)]
            let confidence = (bin.count as f64 / FULL_CONFIDENCE_PIXELS).min(1.0);
            Color {
                name: NamedColor::classify(hsv),
                rgb,
                hsv,
                pixel_count: bin.count,
                confidence,
            }
        })
        .collect();

    tracing::debug!(
        skipped_gray,
        skipped_extreme,
        min_pixels,
        palette_size = palette.len(),
        "color classification finished"
    );

    palette
}

/// Decode image bytes and propose a palette.
///
/// # Errors
///
/// Returns [`DigitizeError::EmptyInput`] or [`DigitizeError::ImageDecode`]
/// when the bytes cannot be decoded. Classification itself never fails.
pub fn classify_bytes(bytes: &[u8], min_pixels: u32) -> Result<Vec<Color>, DigitizeError> {
    let image = crate::decode::decode_rgba(bytes)?;
    Ok(classify_colors(&image, min_pixels))
}

/// Find the highest-ranked palette entry carrying `name`.
#[must_use]
pub fn find_in_palette(palette: &[Color], name: NamedColor) -> Option<&Color> {
    palette.iter().find(|c| c.name == name)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    /// White canvas with `red` pixels in the first rows and `blue` pixels
    /// in the rows after.
    fn two_color_image(red: u32, blue: u32) -> RgbaImage {
        let width = 100;
        RgbaImage::from_fn(width, 100, |x, y| {
            let idx = y * width + x;
            if idx < red {
                image::Rgba([200, 20, 20, 255])
            } else if idx < red + blue {
                image::Rgba([20, 20, 200, 255])
            } else {
                image::Rgba([255, 255, 255, 255])
            }
        })
    }

    #[test]
    fn ranks_by_pixel_count() {
        let palette = classify_colors(&two_color_image(600, 1500), 500);
        assert_eq!(palette.len(), 2);
        assert_eq!(palette[0].name, NamedColor::Blue);
        assert_eq!(palette[0].pixel_count, 1500);
        assert!((palette[0].confidence - 1.0).abs() < f64::EPSILON);
        assert_eq!(palette[1].name, NamedColor::Red);
        assert!((palette[1].confidence - 0.6).abs() < 1e-12);
        assert_eq!(palette[1].rgb, Rgb::new(200, 20, 20));
    }

    #[test]
    fn threshold_filters_small_bins() {
        let palette = classify_colors(&two_color_image(100, 1500), 500);
        assert_eq!(palette.len(), 1);
        assert_eq!(palette[0].name, NamedColor::Blue);
    }

    #[test]
    fn gray_and_white_are_never_reported() {
        let img = RgbaImage::from_fn(50, 50, |x, _| {
            if x < 25 {
                image::Rgba([128, 130, 133, 255])
            } else {
                image::Rgba([255, 255, 255, 255])
            }
        });
        assert!(classify_colors(&img, 1).is_empty());
    }

    #[test]
    fn saturated_full_value_pixels_are_skipped() {
        // v = 1.0 lies outside the open (0.1, 0.9) value window.
        let img = RgbaImage::from_pixel(40, 40, image::Rgba([255, 0, 0, 255]));
        assert!(classify_colors(&img, 1).is_empty());
    }

    #[test]
    fn transparent_pixels_are_ignored() {
        let img = RgbaImage::from_pixel(40, 40, image::Rgba([200, 20, 20, 0]));
        assert!(classify_colors(&img, 1).is_empty());
    }

    #[test]
    fn palette_is_truncated_to_ten() {
        // Twelve distinct hue bins, 20 pixels each.
        let img = RgbaImage::from_fn(240, 1, |x, _| {
            let hue_step = x / 20;
            let rgb = match hue_step {
                0 => [200, 30, 30],
                1 => [200, 120, 30],
                2 => [200, 200, 30],
                3 => [90, 200, 30],
                4 => [30, 200, 60],
                5 => [30, 200, 150],
                6 => [30, 170, 200],
                7 => [30, 100, 200],
                8 => [60, 30, 200],
                9 => [140, 30, 200],
                10 => [200, 30, 170],
                _ => [200, 30, 90],
            };
            image::Rgba([rgb[0], rgb[1], rgb[2], 255])
        });
        let palette = classify_colors(&img, 1);
        assert_eq!(palette.len(), MAX_PALETTE_SIZE);
        assert!(palette.windows(2).all(|w| w[0].pixel_count >= w[1].pixel_count));
    }

    #[test]
    fn classify_bytes_reports_decode_errors() {
        assert!(matches!(
            classify_bytes(&[1, 2, 3], 500),
            Err(DigitizeError::ImageDecode(_))
        ));
        let png = crate::decode::encode_png(&two_color_image(600, 0));
        let palette = classify_bytes(&png, 500).unwrap();
        assert_eq!(palette.len(), 1);
        assert!(find_in_palette(&palette, NamedColor::Red).is_some());
        assert!(find_in_palette(&palette, NamedColor::Green).is_none());
    }
}
