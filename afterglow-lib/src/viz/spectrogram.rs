// Copyright 2026 The Afterglow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Spectrogram
//!
//! A moving spectrograph.  Every `window_s / width` seconds the newest spectrum is painted into
//! one column of an image the size of the pane, and the write column advances with wrap around.
//! Two textured quads then show the image rotated so the newest column is always at the right
//! edge, without moving any pixels.

use rgb::RGBA8;

use super::{db_fraction, FrameContext, Geometry, Render, TexturedQuad};
use crate::colors::{self, Rgb};
use crate::config::{FrequencyScale, SpectrogramColor, SpectrogramConfig};
use crate::dsp::amplitude_to_db;
use crate::dsp::spectral::{find_bracket, Spectrum};
use crate::theme::Theme;

/// Frequency shown by image row `row` of `height`, row 0 at the top.
pub fn row_freq(config: &SpectrogramConfig, nyquist: f32, row: u32, height: u32) -> f32 {
    let t = 1.0 - (row as f32 + 0.5) / height.max(1) as f32;
    let min = config.limits.min_freq.max(1.0);
    let max = config.limits.max_freq.min(nyquist).max(min);
    match config.frequency_scale {
        FrequencyScale::Log => min * (max / min).powf(t),
        FrequencyScale::Linear => min + t * (max - min),
    }
}

/// Magnitude of `spectrum` at `hz`, interpolated between the bracketing bins or taken from the
/// lower one.
pub fn sample(spectrum: &Spectrum, hz: f32, interpolate: bool) -> f32 {
    let (lo, hi) = find_bracket(&spectrum.freqs, hz);
    let Some(&a) = spectrum.raw.get(lo) else {
        return 0.0;
    };
    if !interpolate || lo == hi {
        return a;
    }
    let (f0, f1) = (spectrum.freqs[lo], spectrum.freqs[hi]);
    let t = ((hz - f0) / (f1 - f0)).clamp(0.0, 1.0);
    a + (spectrum.raw[hi] - a) * t
}

/// Color of a cell at `level` in `[0, 1]`.
pub fn cell_color(config: &SpectrogramConfig, theme: &Theme, level: f32) -> Rgb {
    match config.color_mode {
        SpectrogramColor::Monochrome => colors::lerp_rgb(theme.background, theme.foreground, level),
        SpectrogramColor::Hue => {
            let hue = colors::lerp_hue(config.hue_low, config.hue_high, level);
            colors::hsv_to_rgb(hue, 1.0, level)
        }
    }
}

#[derive(Debug, Default)]
pub struct Spectrogram {
    image: Vec<RGBA8>,
    width: u32,
    height: u32,
    /// Next column to write.
    current: u32,
    /// Seconds not yet spent on columns.
    elapsed: f32,
}

impl Spectrogram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn image(&self) -> Option<(&[RGBA8], u32, u32)> {
        (!self.image.is_empty()).then_some((&self.image, self.width, self.height))
    }

    pub fn current(&self) -> u32 {
        self.current
    }

    /// A new size starts an empty history.
    fn fit(&mut self, width: u32, height: u32, background: Rgb) {
        if (width, height) == (self.width, self.height) {
            return;
        }
        log::debug!("spectrogram image {width}x{height}");
        self.width = width;
        self.height = height;
        self.image = vec![colors::to_rgba8(background, 1.0); (width * height) as usize];
        self.current = 0;
        self.elapsed = 0.0;
    }

    fn paint_column(&mut self, ctx: &FrameContext) {
        let cfg = &ctx.config.spectrogram;
        let spectrum = &ctx.snapshot.main;
        let nyquist = ctx.snapshot.sample_rate as f32 * 0.5;
        for row in 0..self.height {
            let hz = row_freq(cfg, nyquist, row, self.height);
            let db = amplitude_to_db(sample(spectrum, hz, cfg.interpolation));
            let level = db_fraction(db, cfg.limits.min_db, cfg.limits.max_db);
            let color = cell_color(cfg, ctx.theme, level);
            let at = (row * self.width + self.current) as usize;
            self.image[at] = colors::to_rgba8(color, 1.0);
        }
        self.current = (self.current + 1) % self.width;
    }
}

impl Render for Spectrogram {
    fn render(&mut self, ctx: &FrameContext, out: &mut Geometry) {
        let width = ctx.width.round().max(1.0) as u32;
        let height = ctx.height.round().max(1.0) as u32;
        self.fit(width, height, ctx.theme.background);

        let cfg = &ctx.config.spectrogram;
        let period = cfg.window_s.max(f32::EPSILON) / width as f32;
        self.elapsed += ctx.dt;
        let due = (self.elapsed / period) as u32;
        self.elapsed -= due as f32 * period;
        if !ctx.snapshot.main.is_empty() {
            // More than a full sweep behind just repaints the whole image.
            for _ in 0..due.min(width) {
                self.paint_column(ctx);
            }
        }

        // Oldest columns `[current, width)` on the left, newest `[0, current)` on the right.
        let split = self.current as f32 / width as f32;
        let left = ctx.width * (1.0 - split);
        for quad in [
            TexturedQuad {
                x: 0.0,
                y: 0.0,
                width: left,
                height: ctx.height,
                u0: split,
                u1: 1.0,
            },
            TexturedQuad {
                x: left,
                y: 0.0,
                width: ctx.width - left,
                height: ctx.height,
                u0: 0.0,
                u1: split,
            },
        ] {
            if quad.width > 0.0 {
                out.textured.push(quad);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::Config;
    use crate::dsp::sine_gen;
    use crate::pipeline::{DspCore, FftRole, FftWorker, FrameSnapshot};
    use crate::viz::test::core_with;

    fn frame(
        spectrogram: &mut Spectrogram,
        config: &Config,
        core: &DspCore,
        snapshot: &FrameSnapshot,
        width: f32,
        height: f32,
    ) -> Geometry {
        let ctx = FrameContext {
            config,
            core,
            snapshot,
            theme: &Theme::DARK,
            width,
            height,
            dt: 0.25,
        };
        let mut out = Geometry::default();
        spectrogram.render(&ctx, &mut out);
        out
    }

    fn tone_snapshot(config: &Config) -> (std::sync::Arc<DspCore>, FrameSnapshot) {
        let tone: Vec<f32> = sine_gen(1000.0, 48_000.0)
            .take(48_000)
            .flat_map(|x| [x * 0.5, x * 0.5])
            .collect();
        let core = core_with(config.clone(), 48_000, &tone);
        FftWorker::new(core.clone(), FftRole::Main)
            .run_pass(0.25)
            .unwrap();
        let mut snapshot = FrameSnapshot::default();
        core.snapshot(&mut snapshot).unwrap();
        (core, snapshot)
    }

    #[test]
    fn test_column_cadence_and_scroll() {
        let mut config = Config::default();
        config.spectrogram.window_s = 4.0;
        let (core, snapshot) = tone_snapshot(&config);
        let mut spectrogram = Spectrogram::new();
        let mut out = Geometry::default();
        // 1/64 s per column, 16 columns per quarter second.
        for _ in 0..4 {
            out = frame(&mut spectrogram, &config, &core, &snapshot, 256.0, 50.0);
        }
        assert_eq!(spectrogram.current(), 64);
        assert_eq!(out.textured.len(), 2);
        assert_eq!(out.textured[0].width, 192.0);
        assert_eq!(out.textured[0].u0, 0.25);
        assert_eq!(out.textured[1].x, 192.0);
        assert_eq!(out.textured[1].u1, 0.25);

        // A new size drops the history.
        frame(&mut spectrogram, &config, &core, &snapshot, 300.0, 50.0);
        assert!(spectrogram.current() < 64);
        assert_eq!(spectrogram.image().unwrap().1, 300);
    }

    #[test]
    fn test_tone_row_is_bright() {
        let config = Config::default();
        let (core, snapshot) = tone_snapshot(&config);
        let mut spectrogram = Spectrogram::new();
        frame(&mut spectrogram, &config, &core, &snapshot, 100.0, 400.0);
        let (image, width, height) = spectrogram.image().unwrap();
        let tone_row = (0..height)
            .min_by(|a, b| {
                let fa = (row_freq(&config.spectrogram, 24_000.0, *a, height) - 1000.0).abs();
                let fb = (row_freq(&config.spectrogram, 24_000.0, *b, height) - 1000.0).abs();
                fa.total_cmp(&fb)
            })
            .unwrap();
        let low_row = height - 5;
        let tone = image[(tone_row * width) as usize];
        let low = image[(low_row * width) as usize];
        assert!(tone.b > 200, "{tone:?}");
        assert!(low.b < 60, "{low:?}");
    }

    #[test]
    fn test_row_frequencies() {
        let mut config = SpectrogramConfig::default();
        assert!((row_freq(&config, 24_000.0, 0, 1000) - 20_000.0).abs() < 100.0);
        assert!((row_freq(&config, 24_000.0, 999, 1000) - 20.0).abs() < 0.2);
        // Log puts the geometric mean in the middle.
        assert!((row_freq(&config, 24_000.0, 500, 1001) - 632.5).abs() < 1.0);
        config.frequency_scale = FrequencyScale::Linear;
        assert!((row_freq(&config, 24_000.0, 500, 1001) - 10_010.0).abs() < 1.0);
        // Nyquist caps the top.
        assert!(row_freq(&config, 8_000.0, 0, 1000) <= 8_000.0);
    }

    #[test]
    fn test_hue_mode() {
        let mut config = SpectrogramConfig::default();
        config.color_mode = SpectrogramColor::Hue;
        let quiet = cell_color(&config, &Theme::DARK, 0.0);
        assert_eq!(quiet, [0.0, 0.0, 0.0]);
        let loud = cell_color(&config, &Theme::DARK, 1.0);
        assert!(loud[0] > 0.99 && loud[1] < 0.01 && loud[2] < 0.01, "{loud:?}");
    }
}
