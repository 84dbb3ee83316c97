// Copyright 2026 The Afterglow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Configuration
//!
//! A nested record read from TOML.  Every section has documented defaults and deserializes
//! independently: a section that fails to parse is replaced by its defaults with a single
//! warning, and numeric fields that parse but fall out of range are replaced field by field.
//! The only fatal configuration error is a `visualizers.main` group that is missing or empty.
//!
//! The core treats configuration as read-only.  Workers hold an `Arc<Config>` snapshot and pick
//! up a new one at the start of their next pass.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::AfterglowError;

/// Group name that must exist and hold at least one visualizer.
pub const MAIN_GROUP: &str = "main";

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub audio: AudioConfig,
    pub window: WindowConfig,
    pub oscilloscope: OscilloscopeConfig,
    pub lissajous: LissajousConfig,
    pub fft: FftConfig,
    pub spectrogram: SpectrogramConfig,
    pub phosphor: PhosphorConfig,
    pub lufs: LufsConfig,
    pub vu: VuConfig,
    pub visualizers: Visualizers,
}

// Enumerations

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    #[default]
    Auto,
    Pulseaudio,
    Pipewire,
    Wasapi,
    /// Synthetic sine at `audio.tone_hz`.
    Tone,
    Silent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    Left,
    #[default]
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignmentType {
    Peak,
    #[default]
    ZeroCrossing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LissajousMode {
    #[default]
    None,
    Rotate,
    Circle,
    Pulsar,
    BlackHole,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Key {
    #[default]
    Sharp,
    Flat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FftMode {
    #[default]
    Midside,
    Leftright,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(try_from = "String", into = "&'static str")]
pub enum FrequencyScale {
    #[default]
    Log,
    Linear,
}

impl TryFrom<String> for FrequencyScale {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "log" => Ok(FrequencyScale::Log),
            "linear" => Ok(FrequencyScale::Linear),
            // Older configs carry the misspelling.
            "liner" => {
                log::warn!("frequency_scale \"liner\" read as \"linear\"");
                Ok(FrequencyScale::Linear)
            }
            other => Err(format!("unknown frequency scale {other:?}, expected log or linear")),
        }
    }
}

impl From<FrequencyScale> for &'static str {
    fn from(value: FrequencyScale) -> Self {
        match value {
            FrequencyScale::Log => "log",
            FrequencyScale::Linear => "linear",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SpectrogramColor {
    /// Lerp from the background to the main theme color.
    #[default]
    Monochrome,
    /// Interpolate hue between `hue_low` and `hue_high`.
    Hue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LufsMode {
    Momentary,
    #[default]
    Shortterm,
    Integrated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MeterScale {
    #[default]
    Linear,
    Log,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelMode {
    #[default]
    On,
    Off,
    Compact,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VuStyle {
    #[default]
    Digital,
    Analog,
}

/// Quarter turns applied to a visualizer's geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum Rotation {
    #[default]
    R0,
    R90,
    R180,
    R270,
}

impl TryFrom<u32> for Rotation {
    type Error = String;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Rotation::R0),
            90 => Ok(Rotation::R90),
            180 => Ok(Rotation::R180),
            270 => Ok(Rotation::R270),
            other => Err(format!("rotation {other} is not one of 0, 90, 180, 270")),
        }
    }
}

impl From<Rotation> for u32 {
    fn from(value: Rotation) -> Self {
        match value {
            Rotation::R0 => 0,
            Rotation::R90 => 90,
            Rotation::R180 => 180,
            Rotation::R270 => 270,
        }
    }
}

impl Rotation {
    /// True when the long axis of the visual runs vertically.
    pub fn is_vertical(self) -> bool {
        matches!(self, Rotation::R90 | Rotation::R270)
    }

    /// Map a point laid out in the unrotated frame into a `width` × `height` viewport.  For
    /// vertical rotations the unrotated frame is `height` wide and `width` tall.
    pub fn apply(self, x: f32, y: f32, width: f32, height: f32) -> (f32, f32) {
        match self {
            Rotation::R0 => (x, y),
            // Clockwise quarter turn: the unrotated left edge becomes the top edge.
            Rotation::R90 => (width - y, x),
            Rotation::R180 => (width - x, height - y),
            Rotation::R270 => (y, height - x),
        }
    }
}

// Sections

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub engine: Engine,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    pub gain_db: f32,
    /// dBFS.  Ticks whose peak stays below this leave the pitch untouched.
    pub silence_threshold: f32,
    pub tone_hz: f32,
    pub tone_db: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            engine: Engine::Auto,
            device: None,
            gain_db: 0.0,
            silence_threshold: -90.0,
            tone_hz: 440.0,
            tone_db: -12.0,
        }
    }
}

impl AudioConfig {
    pub fn gain_linear(&self) -> f32 {
        10f32.powf(self.gain_db / 20.0)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct WindowConfig {
    pub fps_limit: u32,
    pub default_width: u32,
    pub default_height: u32,
    pub theme: String,
    pub decorations: bool,
    pub always_on_top: bool,
    /// Narrowest width a splitter may leave any visualizer.
    pub min_width: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            fps_limit: 60,
            default_width: 1200,
            default_height: 300,
            theme: "dark".to_owned(),
            decorations: true,
            always_on_top: false,
            min_width: 80,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LowpassConfig {
    pub enabled: bool,
    pub cutoff_hz: f32,
    pub order: usize,
}

impl Default for LowpassConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cutoff_hz: 4_000.0,
            order: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BandpassConfig {
    pub bandwidth_hz: f32,
    pub sidelobe_db: f32,
}

impl Default for BandpassConfig {
    fn default() -> Self {
        Self {
            bandwidth_hz: 400.0,
            sidelobe_db: 60.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct OscilloscopeConfig {
    pub window_ms: f32,
    pub follow_pitch: bool,
    pub alignment: Alignment,
    pub alignment_type: AlignmentType,
    pub cycles: f32,
    /// Shortest period honored when following pitch.  Keeps very high pitches from collapsing
    /// the window.
    pub min_cycle_ms: f32,
    pub beam_multiplier: f32,
    pub flip_x: bool,
    pub rotation: Rotation,
    pub lowpass: LowpassConfig,
    pub bandpass: BandpassConfig,
}

impl Default for OscilloscopeConfig {
    fn default() -> Self {
        Self {
            window_ms: 25.0,
            follow_pitch: true,
            alignment: Alignment::Center,
            alignment_type: AlignmentType::ZeroCrossing,
            cycles: 2.0,
            min_cycle_ms: 0.5,
            beam_multiplier: 1.0,
            flip_x: false,
            rotation: Rotation::R0,
            lowpass: LowpassConfig::default(),
            bandpass: BandpassConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LissajousConfig {
    pub beam_multiplier: f32,
    pub readback_multiplier: f32,
    pub mode: LissajousMode,
    pub rotation: Rotation,
}

impl Default for LissajousConfig {
    fn default() -> Self {
        Self {
            beam_multiplier: 1.0,
            readback_multiplier: 1.5,
            mode: LissajousMode::None,
            rotation: Rotation::R0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Limits {
    pub min_freq: f32,
    pub max_freq: f32,
    pub min_db: f32,
    pub max_db: f32,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            min_freq: 20.0,
            max_freq: 20_000.0,
            min_db: -96.0,
            max_db: 0.0,
        }
    }
}

impl Limits {
    /// Floor amplitude matching `min_db`.
    pub fn min_value(&self) -> f32 {
        10f32.powf(self.min_db / 20.0)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SmoothingConfig {
    pub enabled: bool,
    /// dB per second.
    pub rise_speed: f32,
    /// dB per second.
    pub fall_speed: f32,
    /// dB per second while the pointer hovers the spectrum.
    pub hover_fall_speed: f32,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rise_speed: 500.0,
            fall_speed: 60.0,
            hover_fall_speed: 10.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CqtConfig {
    pub enabled: bool,
    pub bins_per_octave: usize,
}

impl Default for CqtConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bins_per_octave: 24,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SphereConfig {
    pub enabled: bool,
    pub max_freq: f32,
    pub base_radius: f32,
}

impl Default for SphereConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_freq: 2_000.0,
            base_radius: 0.3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct FftConfig {
    pub size: usize,
    pub slope_db_per_oct: f32,
    pub key: Key,
    pub mode: FftMode,
    pub limits: Limits,
    pub smoothing: SmoothingConfig,
    pub cqt: CqtConfig,
    pub sphere: SphereConfig,
    pub rotation: Rotation,
    pub flip_x: bool,
    pub markers: bool,
    pub beam_multiplier: f32,
}

impl Default for FftConfig {
    fn default() -> Self {
        Self {
            size: 4096,
            slope_db_per_oct: 3.0,
            key: Key::Sharp,
            mode: FftMode::Midside,
            limits: Limits::default(),
            smoothing: SmoothingConfig::default(),
            cqt: CqtConfig::default(),
            sphere: SphereConfig::default(),
            rotation: Rotation::R0,
            flip_x: false,
            markers: false,
            beam_multiplier: 1.0,
        }
    }
}

impl FftConfig {
    /// Exponent of the per-octave tilt: `slope / (20·log10 2)`.
    pub fn slope_k(&self) -> f32 {
        self.slope_db_per_oct / (20.0 * std::f32::consts::LOG10_2)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SpectrogramConfig {
    pub window_s: f32,
    pub interpolation: bool,
    pub frequency_scale: FrequencyScale,
    pub limits: Limits,
    pub color_mode: SpectrogramColor,
    /// Degrees, used for the quietest rows in hue mode.
    pub hue_low: f32,
    /// Degrees, used for the loudest rows in hue mode.
    pub hue_high: f32,
}

impl Default for SpectrogramConfig {
    fn default() -> Self {
        Self {
            window_s: 8.0,
            interpolation: true,
            frequency_scale: FrequencyScale::Log,
            limits: Limits::default(),
            color_mode: SpectrogramColor::Monochrome,
            hue_low: 240.0,
            hue_high: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BeamConfig {
    pub energy: f32,
    pub width: f32,
    pub rainbow: bool,
    /// Catmull-Rom tension for Lissajous densification, 0 disables subdivision.
    pub tension: f32,
    pub color: [f32; 3],
}

impl Default for BeamConfig {
    fn default() -> Self {
        Self {
            energy: 90.0,
            width: 1.0,
            rainbow: false,
            tension: 0.5,
            color: [0.35, 1.0, 0.55],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BlurConfig {
    pub spread: f32,
    pub range: f32,
    pub near_intensity: f32,
    pub far_intensity: f32,
}

impl Default for BlurConfig {
    fn default() -> Self {
        Self {
            spread: 1.0,
            range: 2.5,
            near_intensity: 0.6,
            far_intensity: 0.2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DecayConfig {
    /// Per second, applied while a pixel is younger than `threshold_frames`.
    pub fast: f32,
    /// Per second, applied to older pixels.
    pub slow: f32,
    pub threshold_frames: u32,
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            fast: 24.0,
            slow: 6.0,
            threshold_frames: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ScreenConfig {
    pub curvature: f32,
    pub gap: f32,
    pub vignette: f32,
    pub chromatic_aberration: f32,
    pub grain: f32,
    pub background: [f32; 3],
}

impl Default for ScreenConfig {
    fn default() -> Self {
        Self {
            curvature: 0.06,
            gap: 0.01,
            vignette: 0.3,
            chromatic_aberration: 0.002,
            grain: 0.03,
            background: [0.02, 0.03, 0.025],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PhosphorConfig {
    pub enabled: bool,
    pub beam: BeamConfig,
    pub blur: BlurConfig,
    pub decay: DecayConfig,
    pub screen: ScreenConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LufsConfig {
    pub mode: LufsMode,
    pub scale: MeterScale,
    pub label: LabelMode,
    pub width: u32,
}

impl Default for LufsConfig {
    fn default() -> Self {
        Self {
            mode: LufsMode::Shortterm,
            scale: MeterScale::Linear,
            label: LabelMode::On,
            width: 120,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MomentumConfig {
    pub enabled: bool,
    pub spring_constant: f32,
    pub damping_ratio: f32,
}

impl Default for MomentumConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            spring_constant: 180.0,
            damping_ratio: 24.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct VuConfig {
    pub window_ms: f32,
    pub style: VuStyle,
    /// Added to the RMS level in dBFS before display, so that e.g. 18 puts 0 VU at -18 dBFS.
    pub calibration_db: f32,
    pub scale: MeterScale,
    pub needle_width: f32,
    pub momentum: MomentumConfig,
    pub width: u32,
}

impl Default for VuConfig {
    fn default() -> Self {
        Self {
            window_ms: 300.0,
            style: VuStyle::Digital,
            calibration_db: 18.0,
            scale: MeterScale::Linear,
            needle_width: 2.0,
            momentum: MomentumConfig::default(),
            width: 80,
        }
    }
}

/// Group name to ordered visualizer names.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Visualizers(pub BTreeMap<String, Vec<String>>);

impl Default for Visualizers {
    fn default() -> Self {
        let mut groups = BTreeMap::new();
        groups.insert(
            MAIN_GROUP.to_owned(),
            ["spectrum_analyzer", "oscilloscope", "lissajous", "lufs"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        );
        Visualizers(groups)
    }
}

impl Visualizers {
    /// Groups with `main` first and the rest in name order.
    pub fn ordered(&self) -> impl Iterator<Item = (&str, &[String])> {
        let main = self.0.get_key_value(MAIN_GROUP);
        main.into_iter()
            .chain(self.0.iter().filter(|(name, _)| name.as_str() != MAIN_GROUP))
            .map(|(name, list)| (name.as_str(), list.as_slice()))
    }

    pub fn check_main(&self) -> Result<(), AfterglowError> {
        match self.0.get(MAIN_GROUP) {
            Some(list) if !list.is_empty() => Ok(()),
            _ => Err(AfterglowError::ConfigInvalid(
                "visualizers.main must list at least one visualizer".to_owned(),
            )),
        }
    }
}

const SECTIONS: [&str; 10] = [
    "audio",
    "window",
    "oscilloscope",
    "lissajous",
    "fft",
    "spectrogram",
    "phosphor",
    "lufs",
    "vu",
    "visualizers",
];

fn section<T: DeserializeOwned + Default>(table: &toml::Table, key: &str) -> T {
    match table.get(key) {
        None => T::default(),
        Some(value) => match value.clone().try_into::<T>() {
            Ok(parsed) => parsed,
            Err(e) => {
                log::warn!("invalid [{key}] section, using defaults: {e}");
                T::default()
            }
        },
    }
}

/// Replace `value` with `default` unless `ok` accepts it, logging the replacement.
fn check<T>(field: &str, value: &mut T, default: T, ok: impl Fn(&T) -> bool)
where
    T: std::fmt::Debug,
{
    if !ok(value) {
        log::warn!("{field} = {value:?} out of range, using {default:?}");
        *value = default;
    }
}

fn check_limits(prefix: &str, limits: &mut Limits) {
    let default = Limits::default();
    check(
        &format!("{prefix}.min_freq"),
        &mut limits.min_freq,
        default.min_freq,
        |f| *f > 0.0,
    );
    let min_freq = limits.min_freq;
    check(
        &format!("{prefix}.max_freq"),
        &mut limits.max_freq,
        default.max_freq.max(min_freq * 2.0),
        |f| *f > min_freq,
    );
    if limits.max_db <= limits.min_db {
        log::warn!(
            "{prefix} min_db {} must be below max_db {}, using defaults",
            limits.min_db,
            limits.max_db
        );
        limits.min_db = default.min_db;
        limits.max_db = default.max_db;
    }
}

impl Config {
    /// `$XDG_CONFIG_HOME/afterglow/config.toml` or the platform equivalent.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("afterglow").join("config.toml"))
    }

    /// Load from `path`, or the default path when `None`.  A missing default file yields the
    /// defaults.  A missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, AfterglowError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match Self::default_path() {
                Some(p) if p.exists() => p,
                _ => {
                    log::info!("no config file found, using defaults");
                    return Ok(Self::default());
                }
            },
        };
        log::info!("loading config from {}", path.display());
        let text = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&text)
    }

    /// Parse a TOML document, falling back per section and per field as described in the module
    /// docs.  Only TOML syntax errors and an empty main group are errors.
    pub fn from_toml_str(text: &str) -> Result<Self, AfterglowError> {
        let table: toml::Table = toml::from_str(text)?;

        for key in table.keys() {
            if !SECTIONS.contains(&key.as_str()) {
                log::warn!("unknown config section [{key}] ignored");
            }
        }

        let mut config = Config {
            audio: section(&table, "audio"),
            window: section(&table, "window"),
            oscilloscope: section(&table, "oscilloscope"),
            lissajous: section(&table, "lissajous"),
            fft: section(&table, "fft"),
            spectrogram: section(&table, "spectrogram"),
            phosphor: section(&table, "phosphor"),
            lufs: section(&table, "lufs"),
            vu: section(&table, "vu"),
            visualizers: Visualizers::default(),
        };

        if let Some(value) = table.get("visualizers") {
            config.visualizers = value
                .clone()
                .try_into::<Visualizers>()
                .map_err(|e| AfterglowError::ConfigInvalid(format!("[visualizers]: {e}")))?;
        }
        config.visualizers.check_main()?;

        config.validate();
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, AfterglowError> {
        toml::to_string_pretty(self).map_err(|e| AfterglowError::ConfigInvalid(e.to_string()))
    }

    /// Range-check numeric fields, replacing out-of-range values with defaults.
    pub fn validate(&mut self) {
        let d = Config::default();

        check(
            "audio.sample_rate",
            &mut self.audio.sample_rate,
            d.audio.sample_rate,
            |r| (8_000..=384_000).contains(r),
        );
        check(
            "audio.gain_db",
            &mut self.audio.gain_db,
            d.audio.gain_db,
            |g| g.is_finite() && g.abs() <= 60.0,
        );
        check(
            "audio.tone_hz",
            &mut self.audio.tone_hz,
            d.audio.tone_hz,
            |f| *f > 0.0,
        );

        check(
            "window.fps_limit",
            &mut self.window.fps_limit,
            d.window.fps_limit,
            |f| (1..=1000).contains(f),
        );
        check(
            "window.default_width",
            &mut self.window.default_width,
            d.window.default_width,
            |w| *w > 0,
        );
        check(
            "window.default_height",
            &mut self.window.default_height,
            d.window.default_height,
            |h| *h > 0,
        );
        check(
            "window.min_width",
            &mut self.window.min_width,
            d.window.min_width,
            |w| *w > 0,
        );

        let osc = &mut self.oscilloscope;
        check(
            "oscilloscope.window_ms",
            &mut osc.window_ms,
            d.oscilloscope.window_ms,
            |w| *w > 0.0 && *w <= 500.0,
        );
        check(
            "oscilloscope.cycles",
            &mut osc.cycles,
            d.oscilloscope.cycles,
            |c| *c > 0.0,
        );
        check(
            "oscilloscope.min_cycle_ms",
            &mut osc.min_cycle_ms,
            d.oscilloscope.min_cycle_ms,
            |c| *c >= 0.0,
        );
        check(
            "oscilloscope.lowpass.cutoff_hz",
            &mut osc.lowpass.cutoff_hz,
            d.oscilloscope.lowpass.cutoff_hz,
            |c| *c > 0.0,
        );
        check(
            "oscilloscope.lowpass.order",
            &mut osc.lowpass.order,
            d.oscilloscope.lowpass.order,
            |o| (1..=16).contains(o),
        );
        check(
            "oscilloscope.bandpass.bandwidth_hz",
            &mut osc.bandpass.bandwidth_hz,
            d.oscilloscope.bandpass.bandwidth_hz,
            |b| *b > 0.0,
        );
        check(
            "oscilloscope.bandpass.sidelobe_db",
            &mut osc.bandpass.sidelobe_db,
            d.oscilloscope.bandpass.sidelobe_db,
            |s| (0.0..=200.0).contains(s),
        );

        check(
            "lissajous.readback_multiplier",
            &mut self.lissajous.readback_multiplier,
            d.lissajous.readback_multiplier,
            |m| *m > 0.0 && *m <= 16.0,
        );

        let fft = &mut self.fft;
        if !(128..=65_536).contains(&fft.size) || !fft.size.is_power_of_two() {
            let fixed = fft.size.clamp(128, 65_536).next_power_of_two().min(65_536);
            log::warn!("fft.size = {} is not a power of two in 128..=65536, using {fixed}", fft.size);
            fft.size = fixed;
        }
        check_limits("fft.limits", &mut fft.limits);
        check(
            "fft.smoothing.rise_speed",
            &mut fft.smoothing.rise_speed,
            d.fft.smoothing.rise_speed,
            |s| *s > 0.0,
        );
        check(
            "fft.smoothing.fall_speed",
            &mut fft.smoothing.fall_speed,
            d.fft.smoothing.fall_speed,
            |s| *s > 0.0,
        );
        check(
            "fft.smoothing.hover_fall_speed",
            &mut fft.smoothing.hover_fall_speed,
            d.fft.smoothing.hover_fall_speed,
            |s| *s > 0.0,
        );
        check(
            "fft.cqt.bins_per_octave",
            &mut fft.cqt.bins_per_octave,
            d.fft.cqt.bins_per_octave,
            |b| (1..=96).contains(b),
        );
        check(
            "fft.sphere.base_radius",
            &mut fft.sphere.base_radius,
            d.fft.sphere.base_radius,
            |r| *r > 0.0 && *r < 1.0,
        );

        check(
            "spectrogram.window_s",
            &mut self.spectrogram.window_s,
            d.spectrogram.window_s,
            |w| *w > 0.0,
        );
        check_limits("spectrogram.limits", &mut self.spectrogram.limits);

        let ph = &mut self.phosphor;
        check(
            "phosphor.beam.width",
            &mut ph.beam.width,
            d.phosphor.beam.width,
            |w| *w > 0.0,
        );
        check(
            "phosphor.beam.energy",
            &mut ph.beam.energy,
            d.phosphor.beam.energy,
            |e| *e >= 0.0,
        );
        check(
            "phosphor.beam.tension",
            &mut ph.beam.tension,
            d.phosphor.beam.tension,
            |t| (0.0..=1.0).contains(t),
        );
        check(
            "phosphor.blur.spread",
            &mut ph.blur.spread,
            d.phosphor.blur.spread,
            |s| *s > 0.0,
        );
        check(
            "phosphor.blur.range",
            &mut ph.blur.range,
            d.phosphor.blur.range,
            |r| *r > 0.0 && *r <= 8.0,
        );
        check(
            "phosphor.decay.fast",
            &mut ph.decay.fast,
            d.phosphor.decay.fast,
            |r| *r >= 0.0,
        );
        check(
            "phosphor.decay.slow",
            &mut ph.decay.slow,
            d.phosphor.decay.slow,
            |r| *r >= 0.0,
        );

        check(
            "vu.window_ms",
            &mut self.vu.window_ms,
            d.vu.window_ms,
            |w| *w > 0.0 && *w <= 5_000.0,
        );
        check(
            "vu.momentum.spring_constant",
            &mut self.vu.momentum.spring_constant,
            d.vu.momentum.spring_constant,
            |k| *k > 0.0,
        );
        check(
            "vu.momentum.damping_ratio",
            &mut self.vu.momentum.damping_ratio,
            d.vu.momentum.damping_ratio,
            |z| *z >= 0.0,
        );
    }

    /// Stereo frames the DSP thread reads per tick.
    pub fn samples_per_frame(&self, sample_rate: u32) -> usize {
        (sample_rate / self.window.fps_limit.max(1)).max(1) as usize
    }

    /// Ring length large enough for every reader: FFT and CQT input, the widest oscilloscope
    /// window including pitch search, and the VU window.
    pub fn ring_size(&self, sample_rate: u32) -> usize {
        let fs = sample_rate as f32;
        let scope = (self.oscilloscope.window_ms * fs / 1000.0) as usize * 4;
        let vu = (self.vu.window_ms * fs / 1000.0) as usize;
        let fft = self.fft.size;
        scope.max(vu).max(fft * 2).max(32_768).next_power_of_two()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_defaults_round_trip_through_toml() {
        let config = Config::default();
        let text = config.to_toml_string().unwrap();
        let parsed = Config::from_toml_str(&text).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_invalid_section_falls_back() {
        let text = r#"
            [oscilloscope]
            alignment = "diagonal"

            [fft]
            size = 4096
            key = "flat"
        "#;
        let config = Config::from_toml_str(text).unwrap();
        assert_eq!(config.oscilloscope, OscilloscopeConfig::default());
        assert_eq!(config.fft.key, Key::Flat);
    }

    #[test]
    fn test_out_of_range_fields_replaced() {
        let text = r#"
            [fft]
            size = 3000
            [fft.limits]
            min_db = 0.0
            max_db = -10.0
            [window]
            fps_limit = 0
        "#;
        let config = Config::from_toml_str(text).unwrap();
        assert_eq!(config.fft.size, 4096);
        assert_eq!(config.fft.limits.min_db, -96.0);
        assert_eq!(config.fft.limits.max_db, 0.0);
        assert_eq!(config.window.fps_limit, 60);
    }

    #[test]
    fn test_empty_main_is_fatal() {
        let text = r#"
            [visualizers]
            main = []
        "#;
        assert!(matches!(
            Config::from_toml_str(text),
            Err(AfterglowError::ConfigInvalid(_))
        ));

        let text = r#"
            [visualizers]
            side = ["vu"]
        "#;
        assert!(Config::from_toml_str(text).is_err());
    }

    #[test]
    fn test_liner_alias() {
        let text = r#"
            [spectrogram]
            frequency_scale = "liner"
        "#;
        let config = Config::from_toml_str(text).unwrap();
        assert_eq!(config.spectrogram.frequency_scale, FrequencyScale::Linear);
    }

    #[test]
    fn test_rotation_values() {
        let text = r#"
            [oscilloscope]
            rotation = 270
            [lissajous]
            rotation = 45
        "#;
        let config = Config::from_toml_str(text).unwrap();
        assert_eq!(config.oscilloscope.rotation, Rotation::R270);
        assert_eq!(config.lissajous, LissajousConfig::default());
    }

    #[test]
    fn test_groups_ordered_main_first() {
        let text = r#"
            [visualizers]
            aux = ["vu"]
            main = ["oscilloscope"]
            zed = ["lufs"]
        "#;
        let config = Config::from_toml_str(text).unwrap();
        let names: Vec<&str> = config.visualizers.ordered().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["main", "aux", "zed"]);
    }

    #[test]
    fn test_ring_size_covers_readers() {
        let mut config = Config::default();
        config.fft.size = 65_536;
        let n = config.ring_size(48_000);
        assert!(n.is_power_of_two());
        assert!(n >= 2 * 65_536);
    }
}
