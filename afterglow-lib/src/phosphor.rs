// Copyright 2026 The Afterglow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Phosphor
//!
//! CRT afterglow as four passes over per-window images:
//!
//! 1. **decay** ages the fixed-point energy images `E_R/E_G/E_B` by a two-rate exponential keyed
//!    off the per-pixel age image `A`
//! 2. **compose** deposits the frame's beam segments into `E_*` and zeroes `A` where it landed
//! 3. **blur** sums the energy with three separable Gaussian glows into `T2_*`, using `T1_*` for
//!    the horizontal half of each kernel
//! 4. **colormap** tone maps `T2_*` through the screen model into the RGBA8 output
//!
//! `PhosphorCpu` is the reference for these passes.  GPU frontends run the same math in compute
//! shaders and share `PhosphorParams`, `Beam`, `blur_kernels` and `grain_hash` from here so both
//! sides agree on parameters and layout.

use rgb::RGBA8;

use crate::colors::{self, Rgb};
use crate::config::PhosphorConfig;

/// Fixed-point scale of the energy images.  One unit of beam energy is this many integer steps.
pub const ENERGY_SCALE: f32 = 65536.0;
/// Integer energies below this are cleared by the decay pass.
pub const NEGLIGIBLE_ENERGY: u32 = 8;
/// Longest one-sided blur kernel.  Shaders size their tap arrays with it.
pub const MAX_BLUR_RADIUS: usize = 48;
/// Ratios of the three glow kernels' widths.
pub const BLUR_SIGMA_RATIOS: [f32; 3] = [1.0, 3.0, 9.0];

/// Per-frame scalar inputs to all four passes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhosphorParams {
    /// Seconds since the previous frame.
    pub dt: f32,
    pub frame: u32,
    pub decay_fast: f32,
    pub decay_slow: f32,
    pub age_threshold: u32,
    pub beam_width: f32,
    pub rainbow: bool,
    pub beam_color: Rgb,
    pub blur_spread: f32,
    pub blur_range: f32,
    pub near_intensity: f32,
    pub far_intensity: f32,
    pub curvature: f32,
    pub gap: f32,
    pub vignette: f32,
    pub chromatic_aberration: f32,
    pub grain: f32,
    pub background: Rgb,
}

impl PhosphorParams {
    pub fn from_config(config: &PhosphorConfig, dt: f32, frame: u32) -> Self {
        Self {
            dt,
            frame,
            decay_fast: config.decay.fast,
            decay_slow: config.decay.slow,
            age_threshold: config.decay.threshold_frames,
            beam_width: config.beam.width,
            rainbow: config.beam.rainbow,
            beam_color: config.beam.color,
            blur_spread: config.blur.spread,
            blur_range: config.blur.range,
            near_intensity: config.blur.near_intensity,
            far_intensity: config.blur.far_intensity,
            curvature: config.screen.curvature,
            gap: config.screen.gap,
            vignette: config.screen.vignette,
            chromatic_aberration: config.screen.chromatic_aberration,
            grain: config.screen.grain,
            background: config.screen.background,
        }
    }

    /// Multiplier applied by one decay tick to a pixel of the given age.
    pub fn decay_factor(&self, age: u32) -> f32 {
        let rate = if age < self.age_threshold {
            self.decay_fast
        } else {
            self.decay_slow
        };
        (-self.dt * rate).exp()
    }
}

/// Energy per pixel of travel for a segment, so a slow beam glows brighter than a fast one.
pub fn segment_energy(beam_energy: f32, dt: f32, length: f32) -> f32 {
    beam_energy * dt / length.max(1.0)
}

/// Deposit color for a rainbow beam moving along `(dx, dy)`.  The hue wheel is squished toward
/// its center so reversals and small wobbles do not flash across the whole spectrum.
pub fn rainbow_color(dx: f32, dy: f32) -> Rgb {
    let turn = colors::direction_hue(dx, dy) / 360.0;
    colors::hsv_to_rgb(colors::squish(turn, 0.25) * 360.0, 0.8, 1.0)
}

/// One frame of beam geometry, laid out like the storage buffers the compose shader reads.
///
/// Segment `i` runs from `positions[i]` to `positions[i + 1]` and deposits
/// `positions[i][2]` energy per pixel of length.  A zero energy lifts the pen.
#[derive(Debug, Clone, Default)]
pub struct Beam {
    /// `(x, y, energy, 0)` in window pixels.
    pub positions: Vec<[f32; 4]>,
    /// `(r, g, b, 1)` deposit weights.
    pub colors: Vec<[f32; 4]>,
}

impl Beam {
    pub fn clear(&mut self) {
        self.positions.clear();
        self.colors.clear();
    }

    pub fn push(&mut self, x: f32, y: f32, energy: f32, color: Rgb) {
        self.positions.push([x, y, energy, 0.0]);
        self.colors.push([color[0], color[1], color[2], 1.0]);
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn segments(&self) -> usize {
        self.positions.len().saturating_sub(1)
    }
}

/// Normalized one-sided Gaussian taps plus the weight the glow is added with.
#[derive(Debug, Clone, PartialEq)]
pub struct BlurKernel {
    pub sigma: f32,
    pub weight: f32,
    /// `taps[0]` is the center.  `taps[k]` applies at both `+k` and `-k`.
    pub taps: Vec<f32>,
}

impl BlurKernel {
    pub fn radius(&self) -> usize {
        self.taps.len() - 1
    }
}

/// Near halo, mid glow and far bloom.
pub fn blur_kernels(params: &PhosphorParams) -> [BlurKernel; 3] {
    let weights = [
        params.near_intensity,
        0.5 * (params.near_intensity + params.far_intensity),
        params.far_intensity,
    ];
    let base = (params.blur_spread * params.beam_width).max(0.05);
    std::array::from_fn(|k| {
        let sigma = base * BLUR_SIGMA_RATIOS[k];
        let radius = ((params.blur_range.max(0.5) * sigma).ceil() as usize).clamp(1, MAX_BLUR_RADIUS);
        let mut taps: Vec<f32> = (0..=radius)
            .map(|i| (-(i as f32).powi(2) / (2.0 * sigma * sigma)).exp())
            .collect();
        let total = taps[0] + 2.0 * taps[1..].iter().sum::<f32>();
        taps.iter_mut().for_each(|t| *t /= total);
        BlurKernel {
            sigma,
            weight: weights[k],
            taps,
        }
    })
}

/// Per-pixel, per-frame noise in `[-1, 1]`.
pub fn grain_hash(x: u32, y: u32, frame: u32) -> f32 {
    // PCG-style integer mix
    let mut h = x
        .wrapping_mul(1_973)
        .wrapping_add(y.wrapping_mul(9_277))
        .wrapping_add(frame.wrapping_mul(26_699))
        | 1;
    h = h.wrapping_mul(747_796_405).wrapping_add(2_891_336_453);
    h = ((h >> ((h >> 28) + 4)) ^ h).wrapping_mul(277_803_737);
    h = (h >> 22) ^ h;
    (h as f32 / u32::MAX as f32) * 2.0 - 1.0
}

/// Copy a `from_w` × `from_h` image into a new `to_w` × `to_h` image with both centers aligned.
/// Pixels with no source are `T::default()`.
pub fn copy_centered<T: Copy + Default>(
    src: &[T],
    from_w: usize,
    from_h: usize,
    to_w: usize,
    to_h: usize,
) -> Vec<T> {
    let mut dst = vec![T::default(); to_w * to_h];
    let dx = (to_w as i64 - from_w as i64) / 2;
    let dy = (to_h as i64 - from_h as i64) / 2;
    for y in 0..to_h as i64 {
        let sy = y - dy;
        if sy < 0 || sy >= from_h as i64 {
            continue;
        }
        let x0 = dx.max(0);
        let x1 = (dx + from_w as i64).min(to_w as i64);
        if x1 <= x0 {
            continue;
        }
        let d = (y * to_w as i64 + x0) as usize;
        let s = (sy * from_w as i64 + x0 - dx) as usize;
        let n = (x1 - x0) as usize;
        dst[d..d + n].copy_from_slice(&src[s..s + n]);
    }
    dst
}

/// The CPU phosphor.  Tests check phosphor behavior against it and frontends fall back to it
/// when compute shaders are unavailable.
#[derive(Debug, Clone)]
pub struct PhosphorCpu {
    width: usize,
    height: usize,
    energy: [Vec<u32>; 3],
    age: Vec<u32>,
    t1: [Vec<f32>; 3],
    t2: [Vec<f32>; 3],
    output: Vec<RGBA8>,
}

impl PhosphorCpu {
    pub fn new(width: u32, height: u32) -> Self {
        let n = width as usize * height as usize;
        Self {
            width: width as usize,
            height: height as usize,
            energy: std::array::from_fn(|_| vec![0; n]),
            age: vec![0; n],
            t1: std::array::from_fn(|_| vec![0.0; n]),
            t2: std::array::from_fn(|_| vec![0.0; n]),
            output: vec![RGBA8::default(); n],
        }
    }

    pub fn width(&self) -> u32 {
        self.width as u32
    }

    pub fn height(&self) -> u32 {
        self.height as u32
    }

    /// Recreate every image at the new size, carrying energy, age and output over centered.
    /// Blur temporaries are recomputed each frame and start from zero.
    pub fn resize(&mut self, width: u32, height: u32) {
        let (w, h) = (width as usize, height as usize);
        if (w, h) == (self.width, self.height) {
            return;
        }
        let (ow, oh) = (self.width, self.height);
        for e in &mut self.energy {
            *e = copy_centered(e, ow, oh, w, h);
        }
        self.age = copy_centered(&self.age, ow, oh, w, h);
        self.output = copy_centered(&self.output, ow, oh, w, h);
        let n = w * h;
        self.t1 = std::array::from_fn(|_| vec![0.0; n]);
        self.t2 = std::array::from_fn(|_| vec![0.0; n]);
        self.width = w;
        self.height = h;
    }

    /// Decay, compose, blur, then colormap.
    pub fn render(&mut self, params: &PhosphorParams, beam: &Beam) -> &[RGBA8] {
        self.decay(params);
        self.compose(beam);
        self.blur(params);
        self.colormap(params);
        &self.output
    }

    pub fn decay(&mut self, params: &PhosphorParams) {
        // Only a handful of distinct ages matter, so look the factors up instead of calling exp
        // per pixel.
        let fast = params.decay_factor(0);
        let slow = params.decay_factor(params.age_threshold);
        for i in 0..self.age.len() {
            let age = self.age[i];
            let factor = if age < params.age_threshold { fast } else { slow };
            for e in &mut self.energy {
                let decayed = (e[i] as f32 * factor).round() as u32;
                e[i] = if decayed < NEGLIGIBLE_ENERGY { 0 } else { decayed };
            }
            self.age[i] = age.saturating_add(1);
        }
    }

    pub fn compose(&mut self, beam: &Beam) {
        let n = beam.positions.len().min(beam.colors.len());
        for i in 0..n.saturating_sub(1) {
            let [x0, y0, density, _] = beam.positions[i];
            let [x1, y1, _, _] = beam.positions[i + 1];
            if !(density > 0.0) {
                continue;
            }
            let (dx, dy) = (x1 - x0, y1 - y0);
            let length = (dx * dx + dy * dy).sqrt();
            let c0 = beam.colors[i];
            let c1 = beam.colors[i + 1];

            // One deposit per pixel of length, at least one for a stationary beam.
            let steps = (length.ceil() as usize).max(1);
            let amount = density * length.max(1.0) / steps as f32;
            for s in 0..steps {
                let t = (s as f32 + 0.5) / steps as f32;
                let px = (x0 + dx * t).floor();
                let py = (y0 + dy * t).floor();
                if px < 0.0 || py < 0.0 || px >= self.width as f32 || py >= self.height as f32 {
                    continue;
                }
                let idx = py as usize * self.width + px as usize;
                let color = [
                    c0[0] + (c1[0] - c0[0]) * t,
                    c0[1] + (c1[1] - c0[1]) * t,
                    c0[2] + (c1[2] - c0[2]) * t,
                ];
                let mut landed = false;
                for (c, e) in self.energy.iter_mut().enumerate() {
                    let units = (amount * color[c].max(0.0) * ENERGY_SCALE).round() as u32;
                    if units > 0 {
                        e[idx] = e[idx].saturating_add(units);
                        landed = true;
                    }
                }
                if landed {
                    self.age[idx] = 0;
                }
            }
        }
    }

    /// `T2 = E + Σ w_k · G_k ⊗ E`, each `G_k` split into a horizontal pass into `T1` and a
    /// vertical pass accumulating into `T2`.
    pub fn blur(&mut self, params: &PhosphorParams) {
        let (w, h) = (self.width, self.height);
        for c in 0..3 {
            for (t, e) in self.t2[c].iter_mut().zip(&self.energy[c]) {
                *t = *e as f32 / ENERGY_SCALE;
            }
        }
        for kernel in blur_kernels(params) {
            if kernel.weight == 0.0 {
                continue;
            }
            let r = kernel.radius() as i64;
            for c in 0..3 {
                let energy = &self.energy[c];
                let t1 = &mut self.t1[c];
                for y in 0..h {
                    let row = y * w;
                    for x in 0..w {
                        let mut sum = 0.0;
                        for k in -r..=r {
                            let sx = x as i64 + k;
                            if sx >= 0 && sx < w as i64 {
                                sum += kernel.taps[k.unsigned_abs() as usize]
                                    * energy[row + sx as usize] as f32;
                            }
                        }
                        t1[row + x] = sum / ENERGY_SCALE;
                    }
                }
                let t1 = &self.t1[c];
                let t2 = &mut self.t2[c];
                for y in 0..h {
                    for x in 0..w {
                        let mut sum = 0.0;
                        for k in -r..=r {
                            let sy = y as i64 + k;
                            if sy >= 0 && sy < h as i64 {
                                sum += kernel.taps[k.unsigned_abs() as usize]
                                    * t1[sy as usize * w + x];
                            }
                        }
                        t2[y * w + x] += kernel.weight * sum;
                    }
                }
            }
        }
    }

    pub fn colormap(&mut self, params: &PhosphorParams) {
        let (w, h) = (self.width, self.height);
        for y in 0..h {
            for x in 0..w {
                let glow = self.screen_glow(params, x, y);
                let bg = params.background;
                let pixel = [
                    bg[0] + (1.0 - bg[0]) * glow[0],
                    bg[1] + (1.0 - bg[1]) * glow[1],
                    bg[2] + (1.0 - bg[2]) * glow[2],
                ];
                self.output[y * w + x] = colors::to_rgba8(pixel, 1.0);
            }
        }
    }

    /// Tone-mapped beam light reaching pixel `(x, y)` after the screen model, before the
    /// background is blended in.
    fn screen_glow(&self, params: &PhosphorParams, x: usize, y: usize) -> Rgb {
        let (w, h) = (self.width as f32, self.height as f32);
        let cx = (x as f32 + 0.5) / w * 2.0 - 1.0;
        let cy = (y as f32 + 0.5) / h * 2.0 - 1.0;
        let r2 = cx * cx + cy * cy;

        // Barrel distortion pulls the screen edges inward.
        let bend = 1.0 + params.curvature * r2;
        let (dx, dy) = (cx * bend, cy * bend);
        let edge = 1.0 - params.gap;
        if dx.abs() > edge || dy.abs() > edge {
            return colors::BLACK;
        }

        // Red lands slightly outside green and blue slightly inside.
        let mut energy = [0.0; 3];
        for (c, offset) in [1.0, 0.0, -1.0].into_iter().enumerate() {
            let sx = dx * (1.0 + params.chromatic_aberration * offset);
            let sy = dy * (1.0 + params.chromatic_aberration * offset);
            energy[c] = self.sample_t2(c, (sx + 1.0) * 0.5 * w, (sy + 1.0) * 0.5 * h);
        }
        let tone = |e: f32| 1.0 - (-e).exp();
        let mut glow = if params.rainbow {
            energy.map(tone)
        } else {
            let mean = (energy[0] + energy[1] + energy[2]) / 3.0;
            params.beam_color.map(|c| c * tone(mean))
        };

        let vignette = 1.0 - params.vignette * (r2 * 0.5).min(1.0);
        let luma = (glow[0] + glow[1] + glow[2]) / 3.0;
        let grain = params.grain * luma * grain_hash(x as u32, y as u32, params.frame);
        for g in &mut glow {
            *g = ((*g + grain) * vignette).clamp(0.0, 1.0);
        }
        glow
    }

    fn sample_t2(&self, channel: usize, x: f32, y: f32) -> f32 {
        if x < 0.0 || y < 0.0 {
            return 0.0;
        }
        let (x, y) = (x as usize, y as usize);
        if x >= self.width || y >= self.height {
            return 0.0;
        }
        self.t2[channel][y * self.width + x]
    }

    /// Sum over all three energy images, in beam energy units.
    pub fn total_energy(&self) -> f64 {
        self.energy
            .iter()
            .flat_map(|e| e.iter())
            .map(|e| *e as f64)
            .sum::<f64>()
            / ENERGY_SCALE as f64
    }

    pub fn energy(&self, channel: usize) -> &[u32] {
        &self.energy[channel]
    }

    pub fn energy_mut(&mut self, channel: usize) -> &mut [u32] {
        &mut self.energy[channel]
    }

    pub fn age(&self) -> &[u32] {
        &self.age
    }

    /// Glow after the last blur pass.
    pub fn blurred(&self, channel: usize) -> &[f32] {
        &self.t2[channel]
    }

    pub fn output(&self) -> &[RGBA8] {
        &self.output
    }
}
