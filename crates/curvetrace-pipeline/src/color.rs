//! Color primitives: RGB/HSV values and the named colors curves are
//! requested by.
//!
//! Chromatic names divide the hue wheel into 60° ranges aligned with
//! the classifier's 30° hue bins:
//!
//! | name    | hue range  |
//! |---------|------------|
//! | red     | 330°–30°   |
//! | orange  | 30°–60°    |
//! | yellow  | 60°–90°    |
//! | green   | 90°–150°   |
//! | cyan    | 150°–210°  |
//! | blue    | 210°–270°  |
//! | magenta | 270°–330°  |
//!
//! `black`, `gray` and `white` are achromatic and matched by value and
//! saturation rather than hue.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// An 8-bit RGB triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
}

impl Rgb {
    /// Create a new RGB triple.
    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Hex notation, `#rrggbb`.
    #[must_use]
    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    /// Whether every pairwise channel difference is below `threshold`.
    ///
    /// Grid lines and anti-aliased background are near-gray.
    #[must_use]
    pub const fn is_near_gray(self, threshold: u8) -> bool {
        self.r.abs_diff(self.g) < threshold
            && self.g.abs_diff(self.b) < threshold
            && self.r.abs_diff(self.b) < threshold
    }

    /// Convert to HSV.
    #[must_use]
    pub fn to_hsv(self) -> Hsv {
        let r = f64::from(self.r) / 255.0;
        let g = f64::from(self.g) / 255.0;
        let b = f64::from(self.b) / 255.0;

        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        let delta = max - min;

        let s = if max > 0.0 { delta / max } else { 0.0 };

        // Achromatic case
        if delta < 1e-9 {
            return Hsv { h: 0.0, s, v: max };
        }

        let h = if (max - r).abs() < 1e-9 {
            let h = (g - b) / delta;
            if h < 0.0 { h + 6.0 } else { h }
        } else if (max - g).abs() < 1e-9 {
            (b - r) / delta + 2.0
        } else {
            (r - g) / delta + 4.0
        };

        Hsv {
            h: (h * 60.0) % 360.0,
            s,
            v: max,
        }
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Hue in degrees `[0, 360)`, saturation and value in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Hsv {
    /// Hue in degrees.
    pub h: f64,
    /// Saturation.
    pub s: f64,
    /// Value (brightness).
    pub v: f64,
}

/// Colors a curve can be requested by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamedColor {
    Red,
    Orange,
    Yellow,
    Green,
    Cyan,
    Blue,
    Magenta,
    Black,
    Gray,
    White,
}

/// Minimum saturation for the hue test of a chromatic color.
const HUE_MATCH_MIN_SATURATION: f64 = 0.25;
/// Minimum value for the hue test of a chromatic color.
const HUE_MATCH_MIN_VALUE: f64 = 0.15;

impl NamedColor {
    /// Every named color, chromatic first.
    pub const ALL: [Self; 10] = [
        Self::Red,
        Self::Orange,
        Self::Yellow,
        Self::Green,
        Self::Cyan,
        Self::Blue,
        Self::Magenta,
        Self::Black,
        Self::Gray,
        Self::White,
    ];

    /// Lowercase name, as used in requests and palette entries.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Red => "red",
            Self::Orange => "orange",
            Self::Yellow => "yellow",
            Self::Green => "green",
            Self::Cyan => "cyan",
            Self::Blue => "blue",
            Self::Magenta => "magenta",
            Self::Black => "black",
            Self::Gray => "gray",
            Self::White => "white",
        }
    }

    /// Nominal display color, used when the palette has no sample.
    #[must_use]
    pub const fn nominal(self) -> Rgb {
        match self {
            Self::Red => Rgb::new(220, 30, 30),
            Self::Orange => Rgb::new(240, 140, 20),
            Self::Yellow => Rgb::new(220, 210, 30),
            Self::Green => Rgb::new(30, 170, 50),
            Self::Cyan => Rgb::new(30, 200, 210),
            Self::Blue => Rgb::new(30, 60, 220),
            Self::Magenta => Rgb::new(200, 40, 200),
            Self::Black => Rgb::new(0, 0, 0),
            Self::Gray => Rgb::new(128, 128, 128),
            Self::White => Rgb::new(255, 255, 255),
        }
    }

    /// Base RGB box `(lower, upper)`, inclusive on every channel.
    #[must_use]
    pub const fn rgb_box(self) -> (Rgb, Rgb) {
        match self {
            Self::Red => (Rgb::new(150, 0, 0), Rgb::new(255, 80, 80)),
            Self::Orange => (Rgb::new(200, 100, 0), Rgb::new(255, 180, 60)),
            Self::Yellow => (Rgb::new(180, 180, 0), Rgb::new(255, 255, 100)),
            Self::Green => (Rgb::new(0, 100, 0), Rgb::new(100, 255, 100)),
            Self::Cyan => (Rgb::new(0, 150, 150), Rgb::new(100, 255, 255)),
            Self::Blue => (Rgb::new(0, 0, 150), Rgb::new(100, 100, 255)),
            Self::Magenta => (Rgb::new(150, 0, 150), Rgb::new(255, 100, 255)),
            Self::Black => (Rgb::new(0, 0, 0), Rgb::new(50, 50, 50)),
            Self::Gray => (Rgb::new(100, 100, 100), Rgb::new(180, 180, 180)),
            Self::White => (Rgb::new(230, 230, 230), Rgb::new(255, 255, 255)),
        }
    }

    /// Hue range `[start, end)` in degrees, or `None` for achromatic
    /// colors. `start > end` means the range wraps through 0°.
    #[must_use]
    pub const fn hue_range(self) -> Option<(f64, f64)> {
        match self {
            Self::Red => Some((330.0, 30.0)),
            Self::Orange => Some((30.0, 60.0)),
            Self::Yellow => Some((60.0, 90.0)),
            Self::Green => Some((90.0, 150.0)),
            Self::Cyan => Some((150.0, 210.0)),
            Self::Blue => Some((210.0, 270.0)),
            Self::Magenta => Some((270.0, 330.0)),
            Self::Black | Self::Gray | Self::White => None,
        }
    }

    /// HSV membership test.
    ///
    /// Chromatic colors need the hue inside their range plus enough
    /// saturation and brightness to carry a hue at all. Achromatic colors
    /// are judged on saturation and value alone.
    #[must_use]
    pub fn matches_hsv(self, hsv: Hsv) -> bool {
        match self.hue_range() {
            Some((start, end)) => {
                if hsv.s < HUE_MATCH_MIN_SATURATION || hsv.v < HUE_MATCH_MIN_VALUE {
                    return false;
                }
                if start > end {
                    hsv.h >= start || hsv.h < end
                } else {
                    hsv.h >= start && hsv.h < end
                }
            }
            None => match self {
                Self::Black => hsv.v < 0.2,
                Self::Gray => hsv.s < 0.1 && (0.2..=0.8).contains(&hsv.v),
                _ => hsv.s < 0.1 && hsv.v > 0.9,
            },
        }
    }

    /// Name for a classifier hue bin (`0..12`, 30° each).
    #[must_use]
    pub const fn for_hue_bin(bin: usize) -> Self {
        match bin {
            1 => Self::Orange,
            2 => Self::Yellow,
            3 | 4 => Self::Green,
            5 | 6 => Self::Cyan,
            7 | 8 => Self::Blue,
            9 | 10 => Self::Magenta,
            _ => Self::Red,
        }
    }

    /// Human-readable name for an HSV sample: achromatic overrides first,
    /// then the hue bin.
    #[must_use]
    pub fn classify(hsv: Hsv) -> Self {
        if hsv.v < 0.2 {
            Self::Black
        } else if hsv.s < 0.1 {
            if hsv.v > 0.9 { Self::White } else { Self::Gray }
        } else {
            Self::for_hue_bin(hue_bin(hsv.h))
        }
    }
}

/// 30° hue bin index in `0..12`.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn hue_bin(h: f64) -> usize {
    ((h / 30.0).floor() as usize).min(11)
}

impl fmt::Display for NamedColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when a string names no known color.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown color name '{0}'")]
pub struct UnknownColor(pub String);

impl FromStr for NamedColor {
    type Err = UnknownColor;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        let alias = match lower.as_str() {
            "grey" => "gray",
            "purple" | "violet" => "magenta",
            "teal" | "aqua" => "cyan",
            other => other,
        };
        Self::ALL
            .into_iter()
            .find(|c| c.name() == alias)
            .ok_or_else(|| UnknownColor(s.to_string()))
    }
}
