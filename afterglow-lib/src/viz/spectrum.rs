// Copyright 2026 The Afterglow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Spectrum Analyzer
//!
//! Log frequency on x, tilted dB on y.  The tilt gain `(f / 880)^k` is the display half of the
//! slope correction: the smoother's floor carries the inverse tilt, so silence draws a flat line
//! on `min_db`.
//!
//! With phosphor on and `fft.sphere.enabled`, the low bins are instead wrapped around a sphere.
//! Each bin sits on the right meridian at a height given by its frequency and a radius given by
//! its level, then turns about the vertical axis by its phase relative to a reference locked to
//! the harmonics of the current pitch.  A steady tone therefore holds still while everything
//! else spins.

use std::f32::consts::PI;

use super::{db_fraction, trace_beam, Anchor, FrameContext, Geometry, Render};
use crate::colors::{self, Rgb};
use crate::config::{Config, Rotation};
use crate::dsp::amplitude_to_db;
use crate::dsp::spectral::{find_bracket, Spectrum};
use crate::dsp::TILT_REFERENCE_HZ;
use crate::phosphor::{rainbow_color, segment_energy, Beam};

/// Distance from the camera to the sphere's center, in sphere radii.
const CAMERA_DISTANCE: f32 = 3.0;
/// Brightness of the far side of the sphere.
const FAR_SIDE: f32 = 0.3;
/// Fraction of the pane the sphere's diameter fills.
const SPHERE_FILL: f32 = 0.8;

/// Visual dB-per-octave tilt at `freq`.
pub fn tilt_gain(freq: f32, slope_k: f32) -> f32 {
    (freq / TILT_REFERENCE_HZ).powf(slope_k)
}

/// Horizontal position of `freq` in `[0, 1]` on a log axis.
pub fn freq_fraction(freq: f32, min_freq: f32, max_freq: f32) -> f32 {
    let (lo, hi) = (min_freq.max(f32::MIN_POSITIVE).ln(), max_freq.ln());
    if hi <= lo {
        return 0.0;
    }
    (freq.ln() - lo) / (hi - lo)
}

/// Frequencies of every C within `[min_freq, max_freq]`, with their octave.
pub fn c_markers(min_freq: f32, max_freq: f32) -> impl Iterator<Item = (f32, i32)> {
    (0..11i32)
        .map(|octave| {
            let midi = 12 * (octave + 1);
            (440.0 * 2f32.powf((midi - 69) as f32 / 12.0), octave)
        })
        .filter(move |(f, _)| *f >= min_freq && *f <= max_freq)
}

/// Pane points of one spectrum.  Bins outside the frequency limits are dropped.
pub fn spectrum_points(
    config: &Config,
    spectrum: &Spectrum,
    width: f32,
    height: f32,
    out: &mut Vec<[f32; 2]>,
) {
    let fft = &config.fft;
    let limits = &fft.limits;
    let k = fft.slope_k();
    let (w, h) = if fft.rotation.is_vertical() {
        (height, width)
    } else {
        (width, height)
    };
    out.clear();
    for (&f, &mag) in spectrum.freqs.iter().zip(&spectrum.smoothed) {
        if f <= 0.0 || f < limits.min_freq || f > limits.max_freq {
            continue;
        }
        let mut x = freq_fraction(f, limits.min_freq, limits.max_freq) * w;
        if fft.flip_x {
            x = w - x;
        }
        let db = amplitude_to_db(mag * tilt_gain(f, k));
        let y = db_fraction(db, limits.min_db, limits.max_db) * h;
        out.push(place(fft.rotation, x, y, width, height));
    }
}

fn place(rotation: Rotation, x: f32, y: f32, width: f32, height: f32) -> [f32; 2] {
    let (x, y) = rotation.apply(x, y, width, height);
    [x, y]
}

/// Phase reference of the sphere.  Frozen while there is no pitch to lock to.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SphereReference {
    /// Phase of the pitch bin, radians.
    pub phase: f32,
    pub hz: f32,
}

impl SphereReference {
    /// Rotation of a bin at `freq` with `phase`: its phase less the reference's phase carried
    /// up to `freq` as if it were a harmonic.
    pub fn angle(&self, freq: f32, phase: f32) -> f32 {
        if self.hz <= 0.0 {
            return phase;
        }
        phase - self.phase * freq / self.hz
    }

    /// Lock to the bin nearest `hz`.  Leaves the reference alone when `hz` is not a pitch.
    pub fn update(&mut self, spectrum: &Spectrum, hz: f32) {
        if !(hz > 0.0) || spectrum.is_empty() {
            return;
        }
        let (lo, hi) = find_bracket(&spectrum.freqs, hz);
        let bin = if (spectrum.freqs[hi] - hz).abs() < (hz - spectrum.freqs[lo]).abs() {
            hi
        } else {
            lo
        };
        self.phase = spectrum.phase[bin];
        self.hz = hz;
    }
}

#[derive(Debug, Default)]
pub struct SpectrumAnalyzer {
    points: Vec<[f32; 2]>,
    alt: Vec<[f32; 2]>,
    reference: SphereReference,
    /// Sphere points with depth, `[x, y, z]` in sphere radii.
    shell: Vec<[f32; 3]>,
}

impl SpectrumAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reference(&self) -> SphereReference {
        self.reference
    }

    fn markers(&self, ctx: &FrameContext, out: &mut Geometry) {
        let fft = &ctx.config.fft;
        let (w, h) = ctx.oriented(fft.rotation);
        for (f, octave) in c_markers(fft.limits.min_freq, fft.limits.max_freq) {
            let mut x = freq_fraction(f, fft.limits.min_freq, fft.limits.max_freq) * w;
            if fft.flip_x {
                x = w - x;
            }
            let a = place(fft.rotation, x, 0.0, ctx.width, ctx.height);
            let b = place(fft.rotation, x, h, ctx.width, ctx.height);
            out.line(vec![a, b], ctx.theme.secondary, 1.0);
            let [lx, ly] = place(fft.rotation, x + 3.0, h - 14.0, ctx.width, ctx.height);
            out.label(lx, ly, format!("C{octave}"), ctx.theme.secondary, Anchor::Left);
        }
    }

    fn note_label(&self, ctx: &FrameContext, out: &mut Geometry) {
        let note = ctx.snapshot.note;
        if note.name == "-" {
            return;
        }
        let text = format!(
            "{}{} {:+} ({:.1} Hz)",
            note.name, note.octave, note.cents, ctx.snapshot.pitch.hz
        );
        out.label(
            ctx.width - 8.0,
            ctx.height - 20.0,
            text,
            ctx.theme.foreground,
            Anchor::Right,
        );
    }

    fn sphere(&mut self, ctx: &FrameContext, out: &mut Geometry) {
        let config = ctx.config;
        let fft = &config.fft;
        let sphere = &fft.sphere;
        let spectrum = &ctx.snapshot.main;
        if !ctx.snapshot.silent {
            self.reference.update(spectrum, ctx.snapshot.pitch.hz);
        }

        let k = fft.slope_k();
        let min_freq = fft.limits.min_freq.max(1.0);
        let max_freq = sphere.max_freq.min(fft.limits.max_freq);
        self.shell.clear();
        for ((&f, &mag), &phase) in spectrum
            .freqs
            .iter()
            .zip(&spectrum.smoothed)
            .zip(&spectrum.phase)
        {
            if f < min_freq || f > max_freq {
                continue;
            }
            let level = db_fraction(
                amplitude_to_db(mag * tilt_gain(f, k)),
                fft.limits.min_db,
                fft.limits.max_db,
            );
            let radius = sphere.base_radius + (1.0 - sphere.base_radius) * level;
            // Low notes at the top pole, the highest shown at the bottom.
            let polar = PI * freq_fraction(f, min_freq, max_freq).clamp(0.0, 1.0);
            let (x, y) = (radius * polar.sin(), radius * polar.cos());
            let theta = self.reference.angle(f, phase);
            self.shell.push([x * theta.cos(), y, x * theta.sin()]);
        }

        let size = ctx.width.min(ctx.height) * 0.5 * SPHERE_FILL;
        let (cx, cy) = (ctx.width * 0.5, ctx.height * 0.5);
        let beam_cfg = &config.phosphor.beam;
        let energy = beam_cfg.energy * fft.beam_multiplier;
        // Right half, then the mirror image closes the sphere.
        for mirror in [1.0f32, -1.0] {
            let projected: Vec<([f32; 2], f32)> = self
                .shell
                .iter()
                .map(|&[x, y, z]| {
                    let scale = CAMERA_DISTANCE / (CAMERA_DISTANCE + z);
                    let depth = ((z + 1.0) * 0.5).clamp(0.0, 1.0);
                    ([cx + mirror * x * scale * size, cy + y * scale * size], depth)
                })
                .collect();
            push_tinted(&projected, energy, ctx.dt, beam_cfg.rainbow, &mut out.beam);
        }
    }
}

/// Beam stroke through `points`, dimmed toward the far side by each point's depth.
fn push_tinted(points: &[([f32; 2], f32)], energy: f32, dt: f32, rainbow: bool, beam: &mut Beam) {
    for (i, &([x, y], depth)) in points.iter().enumerate() {
        let tint = 1.0 + (FAR_SIDE - 1.0) * depth;
        let (e, color): (f32, Rgb) = match points.get(i + 1) {
            Some(&([nx, ny], _)) => {
                let (dx, dy) = (nx - x, ny - y);
                let base = if rainbow {
                    rainbow_color(dx, dy)
                } else {
                    colors::WHITE
                };
                (
                    segment_energy(energy, dt, (dx * dx + dy * dy).sqrt()),
                    base.map(|c| c * tint),
                )
            }
            None => (0.0, colors::WHITE),
        };
        beam.push(x, y, e, color);
    }
}

impl Render for SpectrumAnalyzer {
    fn render(&mut self, ctx: &FrameContext, out: &mut Geometry) {
        let config = ctx.config;
        let fft = &config.fft;
        if fft.markers {
            self.markers(ctx, out);
        }
        self.note_label(ctx, out);

        let snapshot = ctx.snapshot;
        if snapshot.main.is_empty() {
            return;
        }
        if ctx.phosphor() && fft.sphere.enabled {
            self.sphere(ctx, out);
            return;
        }

        spectrum_points(config, &snapshot.main, ctx.width, ctx.height, &mut self.points);
        if ctx.phosphor() {
            trace_beam(
                ctx,
                &self.points,
                fft.beam_multiplier,
                colors::WHITE,
                &mut out.beam,
            );
            return;
        }
        if !snapshot.alt.is_empty() {
            spectrum_points(config, &snapshot.alt, ctx.width, ctx.height, &mut self.alt);
            out.line(self.alt.clone(), ctx.theme.secondary, 1.0);
        }
        out.line(self.points.clone(), ctx.theme.foreground, 1.5);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::dsp::pitch::Pitch;
    use crate::pipeline::{DspCore, FftRole, FftWorker, FrameSnapshot};
    use crate::theme::Theme;
    use crate::viz::test::core_with;

    fn render(config: &Config, snapshot: &FrameSnapshot, core: &DspCore) -> Geometry {
        let ctx = FrameContext {
            config,
            core,
            snapshot,
            theme: &Theme::DARK,
            width: 600.0,
            height: 300.0,
            dt: 1.0 / 60.0,
        };
        let mut out = Geometry::default();
        SpectrumAnalyzer::new().render(&ctx, &mut out);
        out
    }

    #[test]
    fn test_silence_draws_floor() {
        let config = Config::default();
        let core = core_with(config.clone(), 48_000, &vec![0.0; 96_000]);
        FftWorker::new(core.clone(), FftRole::Main)
            .run_pass(0.25)
            .unwrap();
        let mut snapshot = FrameSnapshot::default();
        core.snapshot(&mut snapshot).unwrap();

        // The smoothed floor falls with frequency.
        let smoothed = &snapshot.main.smoothed;
        assert!(smoothed.windows(2).skip(1).all(|w| w[1] < w[0]));

        // After the tilt it sits on min_db.
        let out = render(&config, &snapshot, &core);
        let line = out.lines.last().unwrap();
        assert!(line.points.len() > 1000);
        assert!(line.points.iter().all(|p| p[1].abs() < 0.01), "{:?}", &line.points[..4]);
        assert!(out.labels.is_empty());
    }

    #[test]
    fn test_full_range_limits() {
        let mut config = Config::default();
        config.fft.limits.min_freq = 1.0;
        config.fft.limits.max_freq = 24_000.0;
        let core = core_with(config.clone(), 48_000, &vec![0.0; 96_000]);
        FftWorker::new(core.clone(), FftRole::Main)
            .run_pass(0.25)
            .unwrap();
        let mut snapshot = FrameSnapshot::default();
        core.snapshot(&mut snapshot).unwrap();

        let mut points = Vec::new();
        spectrum_points(&config, &snapshot.main, 600.0, 300.0, &mut points);
        // Every bin but DC.
        assert_eq!(points.len(), snapshot.main.len() - 1);
        let first_x = freq_fraction(48_000.0 / 4096.0, 1.0, 24_000.0) * 600.0;
        assert!((points[0][0] - first_x).abs() < 1e-3);
        assert!((points.last().unwrap()[0] - 600.0).abs() < 1e-3);
        assert!(points.iter().all(|p| (0.0..=600.0).contains(&p[0])));
    }

    #[test]
    fn test_tilt_and_placement() {
        let mut config = Config::default();
        config.fft.slope_db_per_oct = 6.0;
        config.fft.limits.min_db = -60.0;
        let spectrum = Spectrum {
            freqs: vec![0.0, 880.0, 1760.0],
            raw: vec![0.0; 3],
            smoothed: vec![0.0, 0.01, 0.01],
            phase: vec![0.0; 3],
        };
        let mut points = Vec::new();
        spectrum_points(&config, &spectrum, 600.0, 300.0, &mut points);
        assert_eq!(points.len(), 2);
        // -40 dB at the reference, about 6 dB more an octave up.
        assert!((points[0][1] - 100.0).abs() < 1e-3);
        assert!((points[1][1] - (100.0 + 6.0 / 60.0 * 300.0)).abs() < 0.05);

        config.fft.rotation = Rotation::R90;
        spectrum_points(&config, &spectrum, 300.0, 600.0, &mut points);
        // Frequency runs up the pane, level runs left from the right edge.
        assert!((points[0][0] - 200.0).abs() < 1e-3);
        assert!(points[1][1] > points[0][1]);
    }

    #[test]
    fn test_markers_at_c() {
        let marks: Vec<_> = c_markers(20.0, 20_000.0).collect();
        assert_eq!(marks.len(), 10);
        assert!((marks[0].0 - 32.703).abs() < 0.01);
        assert_eq!(marks[0].1, 1);
        assert!((marks[3].0 - 261.63).abs() < 0.01);
    }

    #[test]
    fn test_sphere_reference_freezes() {
        let spectrum = Spectrum {
            freqs: vec![0.0, 100.0, 200.0, 300.0],
            raw: vec![0.0; 4],
            smoothed: vec![0.0; 4],
            phase: vec![0.0, 0.5, 1.0, 1.5],
        };
        let mut reference = SphereReference::default();
        reference.update(&spectrum, 210.0);
        assert_eq!(reference.phase, 1.0);
        // The second harmonic of a locked tone does not turn.
        assert!(reference.angle(420.0, 2.0).abs() < 1e-6);
        reference.update(&spectrum, 0.0);
        assert_eq!(reference.hz, 210.0);
    }

    #[test]
    fn test_sphere_is_mirrored() {
        let mut config = Config::default();
        config.phosphor.enabled = true;
        config.fft.sphere.enabled = true;
        let core = core_with(config.clone(), 48_000, &vec![0.0; 96_000]);
        core.pitch.store(Pitch { hz: 0.0, db: -90.0 });
        FftWorker::new(core.clone(), FftRole::Main)
            .run_pass(0.25)
            .unwrap();
        let mut snapshot = FrameSnapshot::default();
        core.snapshot(&mut snapshot).unwrap();
        let out = render(&config, &snapshot, &core);
        assert!(out.lines.is_empty());
        let n = out.beam.len() / 2;
        assert!(n > 10);
        for i in 0..n {
            let (a, b) = (out.beam.positions[i], out.beam.positions[n + i]);
            assert!((a[0] - 300.0 + (b[0] - 300.0)).abs() < 1e-3);
            assert_eq!(a[1], b[1]);
        }
    }
}
