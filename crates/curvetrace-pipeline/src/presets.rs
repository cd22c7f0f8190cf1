//! Margin presets and margin resolution.
//!
//! A margin is the pixel distance from an image edge to the plotted axis
//! line. Presets describe common datasheet layouts as margin templates
//! drawn for a 600 px reference image; templates are scaled by
//! `min(width, height) / 600` before use.
//!
//! Resolution order, highest priority first:
//!
//! 1. per-field user overrides ([`MarginOverrides`]),
//! 2. a manually selected [`Preset`],
//! 3. a preset auto-detected from the axis names and ranges
//!    ([`detect_preset`]),
//! 4. the scaled [`Preset::Standard`] template.
//!
//! If the result fails the boundary check ([`MarginSet::validate`]), a
//! conservative 10%-of-shorter-side margin is used instead.
//!
//! All preset data is constant. The per-request choice travels in a
//! [`CalibrationContext`] value, never in shared state.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::types::{AxisConfig, Dimensions, DigitizeError, Scale};

/// Image size the preset templates were drawn for.
pub const REFERENCE_SIZE: f64 = 600.0;

/// Fraction of the shorter side used by the conservative fallback.
pub const CONSERVATIVE_MARGIN_FRACTION: f64 = 0.1;

/// Default epsilon substituted for a non-positive log-axis minimum.
pub const DEFAULT_LOG_EPSILON: f64 = 0.001;

/// Pixel margins between the image edges and the plot area.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarginSet {
    /// Left edge to y axis.
    pub left: f64,
    /// Right edge to right end of the x axis.
    pub right: f64,
    /// Top edge to top end of the y axis.
    pub top: f64,
    /// Bottom edge to x axis.
    pub bottom: f64,
}

impl MarginSet {
    /// Create a margin set.
    #[must_use]
    pub const fn new(left: f64, right: f64, top: f64, bottom: f64) -> Self {
        Self {
            left,
            right,
            top,
            bottom,
        }
    }

    /// The same margin on all four sides.
    #[must_use]
    pub const fn uniform(margin: f64) -> Self {
        Self::new(margin, margin, margin, margin)
    }

    /// Every side multiplied by `factor`.
    #[must_use]
    pub fn scaled(self, factor: f64) -> Self {
        Self::new(
            self.left * factor,
            self.right * factor,
            self.top * factor,
            self.bottom * factor,
        )
    }

    /// Width of the plot area in pixels.
    #[must_use]
    pub fn graph_width(&self, width: u32) -> f64 {
        f64::from(width) - self.left - self.right
    }

    /// Height of the plot area in pixels.
    #[must_use]
    pub fn graph_height(&self, height: u32) -> f64 {
        f64::from(height) - self.top - self.bottom
    }

    /// Check the boundary invariant: finite, non-negative margins with
    /// `left + right < width / 2` and `top + bottom < height / 2`.
    ///
    /// # Errors
    ///
    /// Returns [`DigitizeError::Validation`] naming the violated bound.
    pub fn validate(&self, dimensions: Dimensions) -> Result<(), DigitizeError> {
        let sides = [self.left, self.right, self.top, self.bottom];
        if sides.iter().any(|m| !m.is_finite() || *m < 0.0) {
            return Err(DigitizeError::Validation(format!(
                "margins must be finite and non-negative, got {self:?}",
            )));
        }
        let half_width = f64::from(dimensions.width) * 0.5;
        if self.left + self.right >= half_width {
            return Err(DigitizeError::Validation(format!(
                "left + right margins ({}) must be below half the image width ({half_width})",
                self.left + self.right,
            )));
        }
        let half_height = f64::from(dimensions.height) * 0.5;
        if self.top + self.bottom >= half_height {
            return Err(DigitizeError::Validation(format!(
                "top + bottom margins ({}) must be below half the image height ({half_height})",
                self.top + self.bottom,
            )));
        }
        Ok(())
    }
}

/// Graph layouts of specific device characteristic plots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceLayout {
    /// MOSFET output characteristics (`I_D` vs `V_DS`, family of curves).
    MosfetOutput,
    /// MOSFET transfer characteristics (`I_D` vs `V_GS`).
    MosfetTransfer,
    /// Diode forward characteristics (`I_F` vs `V_F`).
    DiodeForward,
    /// Capacitance vs. drain-source voltage.
    Capacitance,
    /// Safe operating area, log-log.
    SafeOperatingArea,
}

impl DeviceLayout {
    /// Every known layout.
    pub const ALL: [Self; 5] = [
        Self::MosfetOutput,
        Self::MosfetTransfer,
        Self::DiodeForward,
        Self::Capacitance,
        Self::SafeOperatingArea,
    ];

    /// Stable identifier used on the command line.
    #[must_use]
    pub const fn id(self) -> &'static str {
        match self {
            Self::MosfetOutput => "mosfet-output",
            Self::MosfetTransfer => "mosfet-transfer",
            Self::DiodeForward => "diode-forward",
            Self::Capacitance => "capacitance",
            Self::SafeOperatingArea => "safe-operating-area",
        }
    }

    const fn template(self) -> MarginSet {
        match self {
            Self::MosfetOutput => MarginSet::new(85.0, 35.0, 35.0, 65.0),
            Self::MosfetTransfer => MarginSet::new(90.0, 30.0, 30.0, 70.0),
            Self::DiodeForward => MarginSet::new(75.0, 30.0, 35.0, 60.0),
            Self::Capacitance => MarginSet::new(95.0, 40.0, 35.0, 70.0),
            Self::SafeOperatingArea => MarginSet::new(100.0, 40.0, 30.0, 80.0),
        }
    }
}

/// A named margin template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preset {
    /// Typical datasheet graph with labelled axes.
    Standard,
    /// Voltage/current transfer curve with a narrow positive range.
    DeviceTransferCurve,
    /// Verbose axis labels and wide numeric ranges (room for long tick labels).
    DenseLabel,
    /// Clean plot with short labels.
    Simple,
    /// Axes with little or no labelling.
    MinimalLabel,
    /// Layout tuned to one device characteristic plot.
    NamedDevice(DeviceLayout),
}

impl Preset {
    /// Margin template at [`REFERENCE_SIZE`].
    #[must_use]
    pub const fn template(self) -> MarginSet {
        match self {
            Self::Standard => MarginSet::new(80.0, 40.0, 40.0, 60.0),
            Self::DeviceTransferCurve => MarginSet::new(90.0, 30.0, 30.0, 70.0),
            Self::DenseLabel => MarginSet::new(110.0, 50.0, 50.0, 90.0),
            Self::Simple => MarginSet::new(60.0, 30.0, 30.0, 50.0),
            Self::MinimalLabel => MarginSet::new(40.0, 20.0, 20.0, 30.0),
            Self::NamedDevice(layout) => layout.template(),
        }
    }

    /// Template scaled to an image.
    #[must_use]
    pub fn margins_for(self, dimensions: Dimensions) -> MarginSet {
        self.template().scaled(dimensions.shorter_dim() / REFERENCE_SIZE)
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Standard => f.write_str("standard"),
            Self::DeviceTransferCurve => f.write_str("device-transfer-curve"),
            Self::DenseLabel => f.write_str("dense-label"),
            Self::Simple => f.write_str("simple"),
            Self::MinimalLabel => f.write_str("minimal-label"),
            Self::NamedDevice(layout) => write!(f, "device:{}", layout.id()),
        }
    }
}

/// Error returned when a string names no preset.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown preset '{0}'")]
pub struct UnknownPreset(pub String);

impl FromStr for Preset {
    type Err = UnknownPreset;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        if let Some(id) = normalized.strip_prefix("device:") {
            return DeviceLayout::ALL
                .into_iter()
                .find(|layout| layout.id() == id)
                .map(Self::NamedDevice)
                .ok_or_else(|| UnknownPreset(s.to_string()));
        }
        match normalized.as_str() {
            "standard" => Ok(Self::Standard),
            "device-transfer-curve" => Ok(Self::DeviceTransferCurve),
            "dense-label" => Ok(Self::DenseLabel),
            "simple" => Ok(Self::Simple),
            "minimal-label" => Ok(Self::MinimalLabel),
            _ => Err(UnknownPreset(s.to_string())),
        }
    }
}

/// How the preset stage of margin resolution is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresetSelection {
    /// Detect a preset from the axis configuration, else use the default.
    #[default]
    Auto,
    /// Use this preset.
    Manual(Preset),
    /// Skip presets and detection; use the scaled default template.
    Generic,
}

/// Per-field margin overrides in pixels. `None` keeps the preset value.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MarginOverrides {
    /// Left margin override.
    pub left: Option<f64>,
    /// Right margin override.
    pub right: Option<f64>,
    /// Top margin override.
    pub top: Option<f64>,
    /// Bottom margin override.
    pub bottom: Option<f64>,
}

impl MarginOverrides {
    /// Replace the fields of `base` that have an override.
    #[must_use]
    pub fn apply(&self, base: MarginSet) -> MarginSet {
        MarginSet::new(
            self.left.unwrap_or(base.left),
            self.right.unwrap_or(base.right),
            self.top.unwrap_or(base.top),
            self.bottom.unwrap_or(base.bottom),
        )
    }

    /// Whether no field is overridden.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.left.is_none() && self.right.is_none() && self.top.is_none() && self.bottom.is_none()
    }
}

/// Per-request calibration choices.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationContext {
    /// Preset stage of margin resolution.
    pub preset: PresetSelection,
    /// Per-field overrides applied on top of the preset.
    pub overrides: MarginOverrides,
    /// Positive value substituted for a non-positive log-axis minimum.
    pub log_epsilon: f64,
}

impl Default for CalibrationContext {
    fn default() -> Self {
        Self {
            preset: PresetSelection::Auto,
            overrides: MarginOverrides::default(),
            log_epsilon: DEFAULT_LOG_EPSILON,
        }
    }
}

/// Which rule produced the final margins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarginSource {
    /// A preset selected by the caller.
    Manual(Preset),
    /// A preset chosen by [`detect_preset`].
    Detected(Preset),
    /// The scaled default template.
    Default,
    /// The 10% fallback after the chosen margins failed validation.
    Conservative,
}

/// Margins after resolution, with their provenance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedMargins {
    /// The margins to calibrate with.
    pub margins: MarginSet,
    /// The rule that produced them.
    pub source: MarginSource,
    /// Whether any user override was applied.
    pub overridden: bool,
}

impl ResolvedMargins {
    /// Short human-readable provenance, e.g. `detected:dense-label+overrides`.
    #[must_use]
    pub fn label(&self) -> String {
        let base = match self.source {
            MarginSource::Manual(p) => format!("manual:{p}"),
            MarginSource::Detected(p) => format!("detected:{p}"),
            MarginSource::Default => "default".to_string(),
            MarginSource::Conservative => "conservative".to_string(),
        };
        if self.overridden {
            format!("{base}+overrides")
        } else {
            base
        }
    }
}

/// Pick a preset from axis names and ranges, or `None` when nothing
/// characteristic is recognized.
///
/// Rules, first match wins:
/// - voltage-like x name, current-like y name, both minima non-negative
///   and an x span of at most 100: [`Preset::DeviceTransferCurve`];
/// - verbose labelling (long names or many words) with a wide range
///   (log axis, span ≥ 1000 or max/min ≥ 1000): [`Preset::DenseLabel`];
/// - both names empty or a single character: [`Preset::MinimalLabel`].
#[must_use]
pub fn detect_preset(x: &AxisConfig, y: &AxisConfig) -> Option<Preset> {
    let x_tokens = tokens(&x.name);
    let y_tokens = tokens(&y.name);

    let voltage_current = x_tokens.iter().any(|t| is_voltage_token(t))
        && y_tokens.iter().any(|t| is_current_token(t));
    if voltage_current && x.min >= 0.0 && y.min >= 0.0 && x.max - x.min <= 100.0 {
        return Some(Preset::DeviceTransferCurve);
    }

    let name_chars = x.name.trim().chars().count() + y.name.trim().chars().count();
    let verbose = name_chars >= 24 || x_tokens.len() + y_tokens.len() >= 5;
    if verbose && (is_wide(x) || is_wide(y)) {
        return Some(Preset::DenseLabel);
    }

    if x.name.trim().chars().count() <= 1 && y.name.trim().chars().count() <= 1 {
        return Some(Preset::MinimalLabel);
    }

    None
}

fn tokens(name: &str) -> Vec<String> {
    name.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_ascii_lowercase)
        .collect()
}

fn is_voltage_token(token: &str) -> bool {
    matches!(token, "voltage" | "volt" | "volts" | "mv" | "kv")
        || (token.starts_with('v') && token.len() <= 4)
}

/// Current units, or a bare `i` / `i` plus a terminal subscript (`id`,
/// `if`, `ic`, `ids`, ...). Words such as `in` or `is` do not count.
fn is_current_token(token: &str) -> bool {
    matches!(
        token,
        "current" | "amp" | "amps" | "ampere" | "amperes" | "a" | "ma" | "ua" | "na"
    ) || token == "i"
        || token.strip_prefix('i').is_some_and(|subscript| {
            matches!(
                subscript,
                "d" | "f" | "c" | "b" | "e" | "g" | "o" | "ds" | "dss" | "gss" | "ce" | "fm"
            )
        })
}

fn is_wide(axis: &AxisConfig) -> bool {
    axis.scale == Scale::Log
        || axis.max - axis.min >= 1000.0
        || (axis.min > 0.0 && axis.max / axis.min >= 1000.0)
}

/// Resolve the margins for one request.
///
/// # Errors
///
/// Returns [`DigitizeError::Calibration`] when even the conservative
/// fallback leaves no plot area (e.g. a zero-sized image).
pub fn resolve_margins(
    dimensions: Dimensions,
    x: &AxisConfig,
    y: &AxisConfig,
    context: &CalibrationContext,
) -> Result<ResolvedMargins, DigitizeError> {
    let (base, source) = match context.preset {
        PresetSelection::Manual(preset) => {
            (preset.margins_for(dimensions), MarginSource::Manual(preset))
        }
        PresetSelection::Auto => match detect_preset(x, y) {
            Some(preset) => (preset.margins_for(dimensions), MarginSource::Detected(preset)),
            None => (Preset::Standard.margins_for(dimensions), MarginSource::Default),
        },
        PresetSelection::Generic => {
            (Preset::Standard.margins_for(dimensions), MarginSource::Default)
        }
    };

    let overridden = !context.overrides.is_empty();
    let margins = context.overrides.apply(base);

    match margins.validate(dimensions) {
        Ok(()) => Ok(ResolvedMargins {
            margins,
            source,
            overridden,
        }),
        Err(reason) => {
            let conservative =
                MarginSet::uniform(dimensions.shorter_dim() * CONSERVATIVE_MARGIN_FRACTION);
            tracing::warn!(
                %reason,
                fallback = conservative.left,
                "resolved margins rejected; using conservative margins"
            );
            conservative.validate(dimensions).map_err(|_| {
                DigitizeError::Calibration(format!(
                    "no usable plot area in a {}x{} image",
                    dimensions.width, dimensions.height,
                ))
            })?;
            Ok(ResolvedMargins {
                margins: conservative,
                source: MarginSource::Conservative,
                overridden: false,
            })
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn dims(width: u32, height: u32) -> Dimensions {
        Dimensions { width, height }
    }

    fn named(name: &str, min: f64, max: f64, scale: Scale) -> AxisConfig {
        AxisConfig::new(min, max, scale, name)
    }

    #[test]
    fn templates_scale_with_shorter_side() {
        let m = Preset::Standard.margins_for(dims(1200, 300));
        assert!((m.left - 40.0).abs() < 1e-12);
        assert!((m.bottom - 30.0).abs() < 1e-12);
    }

    #[test]
    fn boundary_invariant_rejects_wide_margins() {
        let d = dims(100, 100);
        assert!(MarginSet::new(25.0, 24.0, 0.0, 0.0).validate(d).is_ok());
        assert!(MarginSet::new(25.0, 25.0, 0.0, 0.0).validate(d).is_err());
        assert!(MarginSet::new(0.0, 0.0, 30.0, 20.0).validate(d).is_err());
        assert!(MarginSet::new(-1.0, 0.0, 0.0, 0.0).validate(d).is_err());
    }

    #[test]
    fn detects_transfer_curve() {
        let x = named("Vgs (V)", 0.0, 10.0, Scale::Linear);
        let y = named("Id (A)", 0.0, 50.0, Scale::Linear);
        assert_eq!(detect_preset(&x, &y), Some(Preset::DeviceTransferCurve));
    }

    #[test]
    fn negative_range_is_not_a_transfer_curve() {
        let x = named("Vgs", -10.0, 10.0, Scale::Linear);
        let y = named("Id", 0.0, 50.0, Scale::Linear);
        assert_eq!(detect_preset(&x, &y), None);
    }

    #[test]
    fn detects_dense_label() {
        let x = named("Drain-source voltage VDS (V)", 0.1, 1000.0, Scale::Log);
        let y = named("Gate charge Qg (nC)", 0.0, 100.0, Scale::Linear);
        assert_eq!(detect_preset(&x, &y), Some(Preset::DenseLabel));
    }

    #[test]
    fn detects_minimal_label() {
        let x = named("", 0.0, 1.0, Scale::Linear);
        let y = named("t", 0.0, 1.0, Scale::Linear);
        assert_eq!(detect_preset(&x, &y), Some(Preset::MinimalLabel));
    }

    #[test]
    fn words_starting_with_i_are_not_currents() {
        let x = named("Vds (V)", 0.0, 10.0, Scale::Linear);
        let y = named("Capacitance in pF", 0.0, 50.0, Scale::Linear);
        assert_eq!(detect_preset(&x, &y), None);
        assert!(!is_current_token("is"));
        assert!(!is_current_token("ir"));
        assert!(is_current_token("id"));
        assert!(is_current_token("i"));
    }

    #[test]
    fn ordinary_labels_detect_nothing() {
        let x = named("Temperature", 0.0, 150.0, Scale::Linear);
        let y = named("Rds(on)", 0.0, 2.0, Scale::Linear);
        assert_eq!(detect_preset(&x, &y), None);
    }

    #[test]
    fn overrides_beat_manual_preset() {
        let ctx = CalibrationContext {
            preset: PresetSelection::Manual(Preset::Simple),
            overrides: MarginOverrides {
                left: Some(12.0),
                ..MarginOverrides::default()
            },
            ..CalibrationContext::default()
        };
        let x = AxisConfig::linear(0.0, 1.0);
        let resolved = resolve_margins(dims(600, 600), &x, &x, &ctx).unwrap();
        assert!((resolved.margins.left - 12.0).abs() < 1e-12);
        assert!((resolved.margins.right - 30.0).abs() < 1e-12);
        assert_eq!(resolved.source, MarginSource::Manual(Preset::Simple));
        assert_eq!(resolved.label(), "manual:simple+overrides");
    }

    #[test]
    fn manual_preset_beats_detection() {
        let ctx = CalibrationContext {
            preset: PresetSelection::Manual(Preset::NamedDevice(DeviceLayout::DiodeForward)),
            ..CalibrationContext::default()
        };
        let x = named("Vgs", 0.0, 10.0, Scale::Linear);
        let y = named("Id", 0.0, 10.0, Scale::Linear);
        let resolved = resolve_margins(dims(600, 600), &x, &y, &ctx).unwrap();
        assert_eq!(resolved.margins, DeviceLayout::DiodeForward.template());
    }

    #[test]
    fn auto_falls_back_to_scaled_default() {
        let x = named("Temperature", 0.0, 150.0, Scale::Linear);
        let resolved =
            resolve_margins(dims(300, 300), &x, &x, &CalibrationContext::default()).unwrap();
        assert_eq!(resolved.source, MarginSource::Default);
        assert_eq!(resolved.margins, MarginSet::new(40.0, 20.0, 20.0, 30.0));
    }

    #[test]
    fn generic_selection_skips_detection() {
        let ctx = CalibrationContext {
            preset: PresetSelection::Generic,
            ..CalibrationContext::default()
        };
        let x = named("", 0.0, 1.0, Scale::Linear);
        let resolved = resolve_margins(dims(600, 600), &x, &x, &ctx).unwrap();
        assert_eq!(resolved.source, MarginSource::Default);
    }

    #[test]
    fn invalid_overrides_fall_back_to_conservative() {
        let ctx = CalibrationContext {
            overrides: MarginOverrides {
                left: Some(30.0),
                right: Some(30.0),
                ..MarginOverrides::default()
            },
            ..CalibrationContext::default()
        };
        let x = AxisConfig::linear(0.0, 1.0);
        let resolved = resolve_margins(dims(100, 200), &x, &x, &ctx).unwrap();
        assert_eq!(resolved.source, MarginSource::Conservative);
        assert_eq!(resolved.margins, MarginSet::uniform(10.0));
        assert!(resolved.margins.validate(dims(100, 200)).is_ok());
    }

    #[test]
    fn zero_sized_image_is_a_calibration_error() {
        let x = AxisConfig::linear(0.0, 1.0);
        let result = resolve_margins(dims(0, 100), &x, &x, &CalibrationContext::default());
        assert!(matches!(result, Err(DigitizeError::Calibration(_))));
    }

    #[test]
    fn preset_names_parse() {
        assert_eq!("dense_label".parse::<Preset>().unwrap(), Preset::DenseLabel);
        assert_eq!(
            "device:safe-operating-area".parse::<Preset>().unwrap(),
            Preset::NamedDevice(DeviceLayout::SafeOperatingArea)
        );
        assert!("device:unknown".parse::<Preset>().is_err());
        for layout in DeviceLayout::ALL {
            let preset = Preset::NamedDevice(layout);
            assert_eq!(preset.to_string().parse::<Preset>().unwrap(), preset);
        }
    }

    #[test]
    fn context_deserializes_with_defaults() {
        let ctx: CalibrationContext =
            serde_json::from_str(r#"{"preset": {"manual": "dense_label"}}"#).unwrap();
        assert_eq!(ctx.preset, PresetSelection::Manual(Preset::DenseLabel));
        assert!((ctx.log_epsilon - DEFAULT_LOG_EPSILON).abs() < f64::EPSILON);
        assert!(ctx.overrides.is_empty());
    }
}
