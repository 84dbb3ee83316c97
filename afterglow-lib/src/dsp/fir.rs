// Copyright 2026 The Afterglow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Finite Impulse Response
//!
//! A Kaiser-windowed sinc bandpass that follows the detected pitch.  The oscilloscope reads its
//! output to find zero crossings of the fundamental without harmonics smearing them around.
//!
//! The design is linear phase, so every passband frequency is delayed by exactly `order / 2`
//! samples.  Writers compensate by storing output `order / 2` samples earlier in the ring.
//!
//! The delay line is stored twice in a row so the most recent `L` samples are always one
//! contiguous slice.  That makes the dot product a plain slice operation the compiler can
//! vectorize.

use std::f64::consts::PI as PI64;

use super::window::{kaiser_beta, kaiser_window};
use super::Filter;

/// Hard ceiling on the design order.  Narrow bands at high attenuation would otherwise ask for
/// thousands of taps per sample.
pub const MAX_ORDER: usize = 512;

/// Everything that determines the coefficients.  A change in any field triggers a redesign.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandpassDesign {
    pub center_hz: f32,
    pub bandwidth_hz: f32,
    pub sidelobe_db: f32,
    pub sample_rate: u32,
}

impl BandpassDesign {
    /// Band edges in radians per sample, kept strictly inside `(0, π)`.
    fn edges(&self) -> (f64, f64) {
        let fs = self.sample_rate as f64;
        let nyquist = fs * 0.5;
        let half = (self.bandwidth_hz as f64 * 0.5).max(0.5);
        let center = (self.center_hz as f64).clamp(1.0, nyquist - 1.0);
        let lo = (center - half).max(0.5);
        let hi = (center + half).min(nyquist - 0.5).max(lo + 0.5);
        (2.0 * PI64 * lo / fs, 2.0 * PI64 * hi / fs)
    }

    /// Order from the Kaiser estimate, before clamping.
    pub fn ideal_order(&self) -> f64 {
        let (wc1, wc2) = self.edges();
        ((self.sidelobe_db as f64 - 8.0) / (2.285 * (wc2 - wc1))).ceil()
    }

    /// Design order clamped to `[1, MAX_ORDER]`.
    pub fn order(&self) -> usize {
        let ideal = self.ideal_order();
        if ideal.is_finite() {
            (ideal as isize).clamp(1, MAX_ORDER as isize) as usize
        } else {
            MAX_ORDER
        }
    }

    /// Sidelobe attenuation the clamped order can actually deliver.
    pub fn achieved_attenuation_db(&self) -> f64 {
        let (wc1, wc2) = self.edges();
        let achievable = 2.285 * (wc2 - wc1) * self.order() as f64 + 8.0;
        achievable.min(self.sidelobe_db as f64)
    }

    /// Impulse response of length `order + 1`, unit gain at the center frequency.
    pub fn taps(&self) -> Vec<f64> {
        let (wc1, wc2) = self.edges();
        let order = self.order();
        let len = order + 1;
        let c = order as f64 * 0.5;
        let beta = kaiser_beta(self.sidelobe_db as f64);
        let window = kaiser_window(len, beta);

        let mut taps: Vec<f64> = (0..len)
            .map(|n| {
                let t = n as f64 - c;
                let ideal = if t == 0.0 {
                    (wc2 - wc1) / PI64
                } else {
                    ((wc2 * t).sin() - (wc1 * t).sin()) / (PI64 * t)
                };
                ideal * window[n]
            })
            .collect();

        // Normalize |H(e^{jω_c})| to one.
        let fs = self.sample_rate as f64;
        let wc = 2.0 * PI64 * (self.center_hz as f64).clamp(1.0, fs * 0.5 - 1.0) / fs;
        let (re, im) = taps
            .iter()
            .enumerate()
            .fold((0.0, 0.0), |(re, im), (n, h)| {
                let phase = wc * n as f64;
                (re + h * phase.cos(), im - h * phase.sin())
            });
        let mag = (re * re + im * im).sqrt();
        if mag > 1e-12 {
            taps.iter_mut().for_each(|h| *h /= mag);
        }
        taps
    }
}

/// Running bandpass.  Starts as a unit passthrough until the first design arrives.
#[derive(Debug, Clone)]
pub struct FirBandpass {
    design: Option<BandpassDesign>,
    /// Taps in reverse, so `reversed[j]` multiplies the `j`th oldest sample in the window.
    reversed: Vec<f32>,
    /// Mirrored delay line of length `2 * L`.
    delay: Vec<f32>,
    idx: usize,
    order: usize,
}

impl Default for FirBandpass {
    fn default() -> Self {
        Self::new()
    }
}

impl FirBandpass {
    pub fn new() -> Self {
        Self {
            design: None,
            reversed: vec![1.0],
            delay: vec![0.0; 2],
            idx: 0,
            order: 0,
        }
    }

    pub fn order(&self) -> usize {
        self.order
    }

    /// Group delay in whole samples.
    pub fn delay_samples(&self) -> usize {
        self.order / 2
    }

    pub fn design(&self) -> Option<&BandpassDesign> {
        self.design.as_ref()
    }

    /// Install new taps.  History survives when the length is unchanged, so pitch glides do not
    /// click.
    pub fn set_coefficients(&mut self, taps: &[f64]) {
        let len = taps.len().max(1);
        self.reversed = taps.iter().rev().map(|h| *h as f32).collect();
        if self.reversed.is_empty() {
            self.reversed.push(1.0);
        }
        if self.delay.len() != 2 * len {
            self.delay = vec![0.0; 2 * len];
            self.idx = 0;
        }
        self.order = len - 1;
    }

    /// Redesign when any design input differs from the last call.  Returns whether the
    /// coefficients changed.
    pub fn redesign_if_needed(&mut self, design: BandpassDesign) -> bool {
        if self.design.as_ref() == Some(&design) {
            return false;
        }
        let ideal = design.ideal_order();
        if ideal > MAX_ORDER as f64 {
            log::debug!(
                "bandpass order {ideal} clamped to {MAX_ORDER}, attenuation {:.1} dB of {:.1} dB",
                design.achieved_attenuation_db(),
                design.sidelobe_db
            );
        }
        self.set_coefficients(&design.taps());
        self.design = Some(design);
        true
    }

    #[inline]
    fn window(&self) -> &[f32] {
        let len = self.reversed.len();
        &self.delay[self.idx + 1..self.idx + 1 + len]
    }

    #[inline]
    fn push_sample(&mut self, x: f32) {
        let len = self.reversed.len();
        self.idx += 1;
        if self.idx == len {
            self.idx = 0;
        }
        self.delay[self.idx] = x;
        self.delay[self.idx + len] = x;
    }

    /// Filter `input` into `output` sample by sample.  Extra elements of the longer slice are
    /// left alone.
    pub fn process_block(&mut self, input: &[f32], output: &mut [f32]) {
        for (x, y) in input.iter().zip(output.iter_mut()) {
            *y = self.process(*x);
        }
    }

    /// Scalar convolution, the reference the lane path is checked against.
    pub fn process_scalar(&mut self, x: f32) -> f32 {
        self.push_sample(x);
        dot_scalar(&self.reversed, self.window())
    }
}

impl Filter for FirBandpass {
    #[inline]
    fn process(&mut self, x: f32) -> f32 {
        self.push_sample(x);
        dot_lanes(&self.reversed, self.window())
    }

    fn reset(&mut self) {
        self.delay.iter_mut().for_each(|d| *d = 0.0);
        self.idx = 0;
    }
}

pub fn dot_scalar(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Eight independent accumulators, folded at the end.  Sums in a different order than
/// `dot_scalar`, so results agree to rounding rather than bit for bit.
pub fn dot_lanes(a: &[f32], b: &[f32]) -> f32 {
    let n = a.len().min(b.len());
    let (a, b) = (&a[..n], &b[..n]);
    let mut acc = [0f32; 8];
    let mut ac = a.chunks_exact(8);
    let mut bc = b.chunks_exact(8);
    for (x, y) in (&mut ac).zip(&mut bc) {
        for lane in 0..8 {
            acc[lane] += x[lane] * y[lane];
        }
    }
    let tail = dot_scalar(ac.remainder(), bc.remainder());
    (acc[0] + acc[4]) + (acc[1] + acc[5]) + (acc[2] + acc[6]) + (acc[3] + acc[7]) + tail
}
