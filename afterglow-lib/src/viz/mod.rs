// Copyright 2026 The Afterglow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Visualizers
//!
//! Every visualizer turns one `FrameSnapshot` plus the rings of `DspCore` into `Geometry` for
//! its pane.  Geometry is in pane pixels with the origin at the bottom left and y growing up, the
//! way the formulas read.  The canvas flips rows when rasterizing.
//!
//! With phosphor enabled, beam-style visualizers additionally fill `Geometry::beam` and leave the
//! plain lines empty.

pub mod lissajous;
pub mod lufs;
pub mod oscilloscope;
pub mod spectrogram;
pub mod spectrum;
pub mod vu;

use crate::colors::Rgb;
use crate::config::{Config, Rotation, MAIN_GROUP};
use crate::layout::{Constraint, Layout};
use crate::phosphor::Beam;
use crate::pipeline::{DspCore, FrameSnapshot};
use crate::theme::Theme;
use crate::AfterglowError;

pub use lissajous::Lissajous;
pub use lufs::LufsMeter;
pub use oscilloscope::Oscilloscope;
pub use spectrogram::Spectrogram;
pub use spectrum::SpectrumAnalyzer;
pub use vu::VuMeter;

#[derive(Debug, Clone, PartialEq)]
pub struct Polyline {
    pub points: Vec<[f32; 2]>,
    pub color: Rgb,
    pub width: f32,
}

/// Axis aligned filled rectangle, `(x, y)` its bottom left corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quad {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub color: Rgb,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    Left,
    Center,
    Right,
}

/// Text is carried for frontends that can draw it.
#[derive(Debug, Clone, PartialEq)]
pub struct Label {
    pub x: f32,
    pub y: f32,
    pub text: String,
    pub color: Rgb,
    pub anchor: Anchor,
}

/// A rectangle of the pane filled from the columns `[u0, u1)` of the visualizer's image, in
/// texture coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TexturedQuad {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub u0: f32,
    pub u1: f32,
}

#[derive(Debug, Clone, Default)]
pub struct Geometry {
    pub lines: Vec<Polyline>,
    pub quads: Vec<Quad>,
    pub labels: Vec<Label>,
    pub textured: Vec<TexturedQuad>,
    pub beam: Beam,
}

impl Geometry {
    pub fn clear(&mut self) {
        self.lines.clear();
        self.quads.clear();
        self.labels.clear();
        self.textured.clear();
        self.beam.clear();
    }

    pub fn line(&mut self, points: Vec<[f32; 2]>, color: Rgb, width: f32) {
        if points.len() > 1 {
            self.lines.push(Polyline {
                points,
                color,
                width,
            });
        }
    }

    pub fn quad(&mut self, x: f32, y: f32, width: f32, height: f32, color: Rgb) {
        self.quads.push(Quad {
            x,
            y,
            width,
            height,
            color,
        });
    }

    pub fn label(&mut self, x: f32, y: f32, text: impl Into<String>, color: Rgb, anchor: Anchor) {
        self.labels.push(Label {
            x,
            y,
            text: text.into(),
            color,
            anchor,
        });
    }
}

/// Everything a visualizer may read while building one frame.
pub struct FrameContext<'a> {
    pub config: &'a Config,
    pub core: &'a DspCore,
    pub snapshot: &'a FrameSnapshot,
    pub theme: &'a Theme,
    pub width: f32,
    pub height: f32,
    /// Seconds since the previous frame.
    pub dt: f32,
}

impl FrameContext<'_> {
    /// Extent of the unrotated frame: the long axis becomes vertical under quarter turns.
    pub fn oriented(&self, rotation: Rotation) -> (f32, f32) {
        if rotation.is_vertical() {
            (self.height, self.width)
        } else {
            (self.width, self.height)
        }
    }

    pub fn phosphor(&self) -> bool {
        self.config.phosphor.enabled
    }
}

pub trait Render {
    fn render(&mut self, ctx: &FrameContext, out: &mut Geometry);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Oscilloscope,
    Lissajous,
    SpectrumAnalyzer,
    Spectrogram,
    Lufs,
    Vu,
}

impl Kind {
    pub const ALL: [Kind; 6] = [
        Kind::Oscilloscope,
        Kind::Lissajous,
        Kind::SpectrumAnalyzer,
        Kind::Spectrogram,
        Kind::Lufs,
        Kind::Vu,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Kind::Oscilloscope => "oscilloscope",
            Kind::Lissajous => "lissajous",
            Kind::SpectrumAnalyzer => "spectrum_analyzer",
            Kind::Spectrogram => "spectrogram",
            Kind::Lufs => "lufs",
            Kind::Vu => "vu",
        }
    }

    pub fn from_name(name: &str) -> Option<Kind> {
        match name {
            "spectrum" => Some(Kind::SpectrumAnalyzer),
            name => Self::ALL.into_iter().find(|k| k.name() == name),
        }
    }

    pub fn constraint(self, config: &Config) -> Constraint {
        match self {
            Kind::Lufs => Constraint::Fixed(config.lufs.width),
            Kind::Vu => Constraint::Fixed(config.vu.width),
            Kind::Lissajous => Constraint::Aspect(1.0),
            _ => Constraint::Free,
        }
    }

    /// Visualizers drawn with the beam when phosphor is on.
    pub fn uses_phosphor(self, config: &Config) -> bool {
        config.phosphor.enabled
            && matches!(
                self,
                Kind::Oscilloscope | Kind::Lissajous | Kind::SpectrumAnalyzer
            )
    }
}

/// One pane's renderer and its state.
pub enum Visualizer {
    Oscilloscope(Oscilloscope),
    Lissajous(Lissajous),
    SpectrumAnalyzer(SpectrumAnalyzer),
    Spectrogram(Spectrogram),
    Lufs(LufsMeter),
    Vu(VuMeter),
}

impl Visualizer {
    pub fn new(kind: Kind) -> Self {
        match kind {
            Kind::Oscilloscope => Visualizer::Oscilloscope(Oscilloscope::new()),
            Kind::Lissajous => Visualizer::Lissajous(Lissajous::new()),
            Kind::SpectrumAnalyzer => Visualizer::SpectrumAnalyzer(SpectrumAnalyzer::new()),
            Kind::Spectrogram => Visualizer::Spectrogram(Spectrogram::new()),
            Kind::Lufs => Visualizer::Lufs(LufsMeter::new()),
            Kind::Vu => Visualizer::Vu(VuMeter::new()),
        }
    }

    pub fn kind(&self) -> Kind {
        match self {
            Visualizer::Oscilloscope(_) => Kind::Oscilloscope,
            Visualizer::Lissajous(_) => Kind::Lissajous,
            Visualizer::SpectrumAnalyzer(_) => Kind::SpectrumAnalyzer,
            Visualizer::Spectrogram(_) => Kind::Spectrogram,
            Visualizer::Lufs(_) => Kind::Lufs,
            Visualizer::Vu(_) => Kind::Vu,
        }
    }

    fn renderer(&mut self) -> &mut dyn Render {
        match self {
            Visualizer::Oscilloscope(v) => v,
            Visualizer::Lissajous(v) => v,
            Visualizer::SpectrumAnalyzer(v) => v,
            Visualizer::Spectrogram(v) => v,
            Visualizer::Lufs(v) => v,
            Visualizer::Vu(v) => v,
        }
    }

    /// Clear `out` and fill it for this frame.
    pub fn render(&mut self, ctx: &FrameContext, out: &mut Geometry) {
        out.clear();
        self.renderer().render(ctx, out);
    }

    /// Image sampled by `Geometry::textured`, with its width and height.
    pub fn image(&self) -> Option<(&[rgb::RGBA8], u32, u32)> {
        match self {
            Visualizer::Spectrogram(s) => s.image(),
            _ => None,
        }
    }
}

/// Groups and panes from `visualizers`.  Unknown names are skipped with a warning.  A `main`
/// group left empty is the one fatal configuration error.
pub fn layout_from_config(config: &Config) -> Result<Layout, AfterglowError> {
    config.visualizers.check_main()?;
    let window = &config.window;
    let mut layout = Layout::new(window.min_width);
    for (id, names) in config.visualizers.ordered() {
        let group = layout.add_group(id, window.default_width, window.default_height);
        for name in names {
            match Kind::from_name(name) {
                Some(kind) => group.push(kind.name(), kind.constraint(config)),
                None => log::warn!("unknown visualizer {name:?} in group {id}, skipping"),
            }
        }
        if group.is_empty() && id != MAIN_GROUP {
            log::warn!("group {id} has no usable visualizers");
        }
    }
    match layout.group(MAIN_GROUP) {
        Some(main) if !main.is_empty() => Ok(layout),
        _ => Err(AfterglowError::ConfigInvalid(
            "visualizers.main has no known visualizers".to_owned(),
        )),
    }
}

/// Map a dB value into `[0, 1]` between `min_db` and `max_db`, clamped.
pub fn db_fraction(db: f32, min_db: f32, max_db: f32) -> f32 {
    if max_db <= min_db {
        return 0.0;
    }
    ((db - min_db) / (max_db - min_db)).clamp(0.0, 1.0)
}

/// Logarithmic meter scale: `sign(x)·|x|^(1/a)` applied to the dB value, normalized between the
/// same transform of `min_db` and `max_db`.
pub fn log_scale_fraction(db: f32, min_db: f32, max_db: f32, a: f32) -> f32 {
    let t = |x: f32| x.signum() * x.abs().powf(1.0 / a);
    let (lo, hi) = (t(min_db), t(max_db));
    if hi <= lo {
        return 0.0;
    }
    ((t(db.clamp(min_db, max_db)) - lo) / (hi - lo)).clamp(0.0, 1.0)
}

/// Shared by the beam visualizers: push a polyline into the beam with per-segment energy
/// `beam_energy · dt / segment_length`.
pub(crate) fn trace_beam(
    ctx: &FrameContext,
    points: &[[f32; 2]],
    multiplier: f32,
    color: Rgb,
    beam: &mut Beam,
) {
    let cfg = &ctx.config.phosphor.beam;
    let energy = cfg.energy * multiplier;
    for (i, p) in points.iter().enumerate() {
        let (energy, color) = match points.get(i + 1) {
            Some(next) => {
                let (dx, dy) = (next[0] - p[0], next[1] - p[1]);
                let length = (dx * dx + dy * dy).sqrt();
                let color = if cfg.rainbow {
                    crate::phosphor::rainbow_color(dx, dy)
                } else {
                    color
                };
                (crate::phosphor::segment_energy(energy, ctx.dt, length), color)
            }
            None => (0.0, color),
        };
        beam.push(p[0], p[1], energy, color);
    }
}
