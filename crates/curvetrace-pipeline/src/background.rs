//! Background color detection from the image border.
//!
//! Datasheet graphs are framed by a uniform page color. Every border pixel
//! (top and bottom rows, left and right columns, plus the four corners once
//! more) is quantized to a 10-unit RGB bucket; a bucket holding more than
//! 10% of the samples is background for the whole extraction.

use std::collections::{HashMap, HashSet};

use image::RgbaImage;

use crate::color::Rgb;

/// Width of one quantization bucket per channel.
pub const BUCKET_SIZE: u8 = 10;

/// Share of border samples a bucket must exceed to count as background.
pub const BACKGROUND_FRACTION: f64 = 0.1;

/// A quantized RGB bucket: each channel divided by [`BUCKET_SIZE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Bucket([u8; 3]);

impl Bucket {
    /// Bucket containing `rgb`.
    #[must_use]
    pub const fn of(rgb: Rgb) -> Self {
        Self([rgb.r / BUCKET_SIZE, rgb.g / BUCKET_SIZE, rgb.b / BUCKET_SIZE])
    }
}

/// The set of background buckets for one image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackgroundSet {
    buckets: HashSet<Bucket>,
}

impl BackgroundSet {
    /// A set with no background colors.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether `rgb` falls in a background bucket.
    #[must_use]
    pub fn contains(&self, rgb: Rgb) -> bool {
        self.buckets.contains(&Bucket::of(rgb))
    }

    /// Number of background buckets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Whether no bucket was flagged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

impl FromIterator<Rgb> for BackgroundSet {
    fn from_iter<I: IntoIterator<Item = Rgb>>(iter: I) -> Self {
        Self {
            buckets: iter.into_iter().map(Bucket::of).collect(),
        }
    }
}

fn border_samples(image: &RgbaImage) -> Vec<Rgb> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Vec::new();
    }
    let rgb_at = |x: u32, y: u32| {
        let [r, g, b, _] = image.get_pixel(x, y).0;
        Rgb::new(r, g, b)
    };

    let mut samples = Vec::with_capacity(2 * (width + height) as usize + 4);
    for x in 0..width {
        samples.push(rgb_at(x, 0));
        samples.push(rgb_at(x, height - 1));
    }
    for y in 0..height {
        samples.push(rgb_at(0, y));
        samples.push(rgb_at(width - 1, y));
    }
    for (x, y) in [(0, 0), (width - 1, 0), (0, height - 1), (width - 1, height - 1)] {
        samples.push(rgb_at(x, y));
    }
    samples
}

/// Detect the background buckets of an image.
#[must_use]
pub fn detect_background(image: &RgbaImage) -> BackgroundSet {
    let samples = border_samples(image);
    let mut counts: HashMap<Bucket, usize> = HashMap::new();
    for rgb in &samples {
        *counts.entry(Bucket::of(*rgb)).or_default() += 1;
    }

    #[allow(clippy::cast_precision_loss)]
    let limit = samples.len() as f64 * BACKGROUND_FRACTION;
    #[allow(clippy::cast_precision_loss)]
    let buckets: HashSet<Bucket> = counts
        .into_iter()
        .filter(|&(_, count)| count as f64 > limit)
        .map(|(bucket, _)| bucket)
        .collect();

    tracing::debug!(
        samples = samples.len(),
        background_buckets = buckets.len(),
        "background detection finished"
    );

    BackgroundSet { buckets }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_border_is_background() {
        let img = RgbaImage::from_fn(50, 40, |x, y| {
            if x == 0 || y == 0 || x == 49 || y == 39 {
                image::Rgba([252, 251, 250, 255])
            } else {
                image::Rgba([10, 200, 10, 255])
            }
        });
        let bg = detect_background(&img);
        assert_eq!(bg.len(), 1);
        assert!(bg.contains(Rgb::new(255, 255, 255)));
        assert!(!bg.contains(Rgb::new(10, 200, 10)));
    }

    #[test]
    fn border_share_decides_background() {
        let img = RgbaImage::from_fn(100, 100, |x, _| {
            if x < 3 {
                image::Rgba([0, 0, 0, 255])
            } else {
                image::Rgba([255, 255, 255, 255])
            }
        });
        let bg = detect_background(&img);
        assert!(bg.contains(Rgb::new(255, 255, 255)));
        // Left column (100) + 3 top + 3 bottom + 2 corners = 108 of 404.
        assert!(bg.contains(Rgb::new(0, 0, 0)));

        let img = RgbaImage::from_fn(100, 100, |x, y| {
            if x < 3 && y < 5 {
                image::Rgba([0, 0, 0, 255])
            } else {
                image::Rgba([255, 255, 255, 255])
            }
        });
        assert!(!detect_background(&img).contains(Rgb::new(0, 0, 0)));
    }

    #[test]
    fn empty_image_has_no_background() {
        assert!(detect_background(&RgbaImage::new(0, 0)).is_empty());
    }

    #[test]
    fn buckets_quantize_by_ten() {
        assert_eq!(Bucket::of(Rgb::new(200, 30, 39)), Bucket::of(Rgb::new(209, 31, 30)));
        assert_ne!(Bucket::of(Rgb::new(200, 30, 30)), Bucket::of(Rgb::new(200, 29, 30)));
        let set: BackgroundSet = [Rgb::new(0, 0, 0)].into_iter().collect();
        assert!(set.contains(Rgb::new(9, 9, 9)));
    }
}
