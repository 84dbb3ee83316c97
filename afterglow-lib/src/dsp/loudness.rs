// Copyright 2026 The Afterglow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Loudness
//!
//! EBU R128 loudness from K-weighted stereo, plus the plain peak and RMS levels the meters show
//! next to it.
//!
//! Audio is folded into 100 ms sub-blocks of K-weighted mean square energy.  Momentary loudness
//! averages the last four (400 ms), short-term the last thirty (3 s).  Every completed sub-block
//! also closes a 400 ms gating block with 75% overlap, and integrated loudness is the gated mean
//! of all gating blocks: first an absolute gate at -70 LUFS, then a relative gate 10 LU below the
//! loudness of what passed the first.
//!
//! Gating blocks are not kept.  They land in a histogram of 0.1 LU bins holding a count and an
//! energy sum each, so memory stays fixed for any program length and `integrated` costs one pass
//! over the bins.

use std::collections::VecDeque;

use super::iir::KWeighting;
use crate::config::LufsMode;

/// Absolute gate, LUFS.
pub const ABSOLUTE_GATE: f64 = -70.0;
/// Relative gate below the ungated loudness, LU.
pub const RELATIVE_GATE: f64 = -10.0;

const MOMENTARY_SUBBLOCKS: usize = 4;
const SHORTTERM_SUBBLOCKS: usize = 30;

/// Histogram resolution, LU.
const BIN_WIDTH: f64 = 0.1;
/// Bins from the absolute gate to +30 LUFS.  Louder blocks share the top bin.
const BINS: usize = 1000;

/// BS.1770 loudness of a channel-summed mean square.
fn loudness_of(energy: f64) -> f64 {
    if energy > 0.0 {
        -0.691 + 10.0 * energy.log10()
    } else {
        f64::NEG_INFINITY
    }
}

/// Mean square energy at a loudness, the inverse of `loudness_of`.
fn energy_of(lufs: f64) -> f64 {
    10f64.powf((lufs + 0.691) / 10.0)
}

#[derive(Debug, Clone, Copy, Default)]
struct Bin {
    blocks: u64,
    energy: f64,
}

/// Gating blocks above the absolute gate, binned by loudness.  Sums are exact per bin; only the
/// bin holding the relative gate is judged as a whole, by its mean.
#[derive(Debug, Clone)]
pub struct GatingHistogram {
    bins: Box<[Bin]>,
}

impl Default for GatingHistogram {
    fn default() -> Self {
        Self::new()
    }
}

impl GatingHistogram {
    pub fn new() -> Self {
        Self {
            bins: vec![Bin::default(); BINS].into_boxed_slice(),
        }
    }

    /// Add one gating block by its mean square energy.  Blocks at or below the absolute gate
    /// never count, so they are dropped here.
    pub fn add(&mut self, energy: f64) {
        let lufs = loudness_of(energy);
        if !(lufs > ABSOLUTE_GATE) {
            return;
        }
        let i = (((lufs - ABSOLUTE_GATE) / BIN_WIDTH) as usize).min(BINS - 1);
        let bin = &mut self.bins[i];
        bin.blocks += 1;
        bin.energy += energy;
    }

    /// Blocks that passed the absolute gate.
    pub fn blocks(&self) -> u64 {
        self.bins.iter().map(|b| b.blocks).sum()
    }

    /// Gated mean loudness, LUFS.
    pub fn integrated(&self) -> f64 {
        let total = |threshold: f64| {
            self.bins
                .iter()
                .filter(|b| b.blocks > 0 && b.energy / b.blocks as f64 > threshold)
                .fold((0.0, 0u64), |(e, n), b| (e + b.energy, n + b.blocks))
        };
        let (energy, n) = total(0.0);
        if n == 0 {
            return f64::NEG_INFINITY;
        }
        let relative = loudness_of(energy / n as f64) + RELATIVE_GATE;
        let (energy, n) = total(energy_of(relative));
        if n == 0 {
            return f64::NEG_INFINITY;
        }
        loudness_of(energy / n as f64)
    }
}

#[derive(Debug, Clone)]
pub struct LoudnessMeter {
    sample_rate: u32,
    filters: [KWeighting; 2],
    subblock_len: usize,
    acc: f64,
    acc_len: usize,
    /// Mean square energy of recent sub-blocks, channels summed, newest last.
    subblocks: VecDeque<f64>,
    /// Every 400 ms gating block since the last reset.
    gating: GatingHistogram,
}

impl LoudnessMeter {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            filters: [KWeighting::new(sample_rate), KWeighting::new(sample_rate)],
            subblock_len: (sample_rate as usize / 10).max(1),
            acc: 0.0,
            acc_len: 0,
            subblocks: VecDeque::with_capacity(SHORTTERM_SUBBLOCKS + 1),
            gating: GatingHistogram::new(),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Forget the program, for example after a sample-rate change.
    pub fn reset(&mut self, sample_rate: u32) {
        *self = Self::new(sample_rate);
    }

    /// Feed one stereo frame.
    #[inline]
    pub fn add_frame(&mut self, left: f32, right: f32) {
        let l = self.filters[0].process_64(left as f64);
        let r = self.filters[1].process_64(right as f64);
        self.acc += l * l + r * r;
        self.acc_len += 1;
        if self.acc_len == self.subblock_len {
            self.close_subblock();
        }
    }

    /// Feed interleaved `L,R` frames.
    pub fn add_interleaved(&mut self, frames: &[f32]) {
        for lr in frames.chunks_exact(2) {
            self.add_frame(lr[0], lr[1]);
        }
    }

    fn close_subblock(&mut self) {
        let energy = self.acc / self.acc_len as f64;
        self.acc = 0.0;
        self.acc_len = 0;

        self.subblocks.push_back(energy);
        if self.subblocks.len() > SHORTTERM_SUBBLOCKS {
            self.subblocks.pop_front();
        }
        if self.subblocks.len() >= MOMENTARY_SUBBLOCKS {
            self.gating.add(self.recent_energy(MOMENTARY_SUBBLOCKS));
        }
    }

    fn recent_energy(&self, count: usize) -> f64 {
        let n = count.min(self.subblocks.len());
        if n == 0 {
            return 0.0;
        }
        self.subblocks.iter().rev().take(n).sum::<f64>() / n as f64
    }

    /// 400 ms window, LUFS.
    pub fn momentary(&self) -> f64 {
        loudness_of(self.recent_energy(MOMENTARY_SUBBLOCKS))
    }

    /// 3 s window, LUFS.
    pub fn shortterm(&self) -> f64 {
        loudness_of(self.recent_energy(SHORTTERM_SUBBLOCKS))
    }

    /// Gated program loudness since the last reset, LUFS.
    pub fn integrated(&self) -> f64 {
        self.gating.integrated()
    }

    pub fn reading(&self, mode: LufsMode) -> f64 {
        match mode {
            LufsMode::Momentary => self.momentary(),
            LufsMode::Shortterm => self.shortterm(),
            LufsMode::Integrated => self.integrated(),
        }
    }
}

/// Per-channel absolute maxima since the last `take`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PeakMeter {
    left: f32,
    right: f32,
}

impl PeakMeter {
    pub fn add_frame(&mut self, left: f32, right: f32) {
        self.left = self.left.max(left.abs());
        self.right = self.right.max(right.abs());
    }

    pub fn add_interleaved(&mut self, frames: &[f32]) {
        for lr in frames.chunks_exact(2) {
            self.add_frame(lr[0], lr[1]);
        }
    }

    /// Return `(left, right)` and start a new peak interval.
    pub fn take(&mut self) -> (f32, f32) {
        let out = (self.left, self.right);
        *self = Self::default();
        out
    }
}

/// Root mean square, accumulated in f64.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|x| (*x as f64) * (*x as f64)).sum();
    (sum / samples.len() as f64).sqrt() as f32
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::dsp::sine_gen;

    fn feed_tone(meter: &mut LoudnessMeter, dbfs: f64, seconds: f64) {
        let amp = 10f64.powf(dbfs / 20.0) as f32;
        let n = (seconds * meter.sample_rate() as f64) as usize;
        for x in sine_gen(1000.0, meter.sample_rate() as f64).take(n) {
            meter.add_frame(x * amp, x * amp);
        }
    }

    #[test]
    fn test_lufs_stereo_sine_minus_23() {
        let mut meter = LoudnessMeter::new(48_000);
        feed_tone(&mut meter, -23.0, 20.0);
        let (m, s, i) = (meter.momentary(), meter.shortterm(), meter.integrated());
        println!("momentary {m:.3} shortterm {s:.3} integrated {i:.3}");
        for v in [m, s, i] {
            assert!((v + 23.0).abs() < 0.1);
        }
    }

    #[test]
    fn test_lufs_relative_gate() {
        let mut meter = LoudnessMeter::new(48_000);
        feed_tone(&mut meter, -36.0, 10.0);
        feed_tone(&mut meter, -23.0, 60.0);
        feed_tone(&mut meter, -36.0, 10.0);
        let i = meter.integrated();
        println!("integrated {i:.3}");
        assert!((i + 23.0).abs() < 0.1);
    }

    #[test]
    fn test_lufs_silence_is_below_gate() {
        let mut meter = LoudnessMeter::new(44_100);
        meter.add_interleaved(&vec![0.0; 44_100 * 2]);
        assert!(meter.momentary() <= -70.0);
        assert!(meter.shortterm() <= -70.0);
        assert_eq!(meter.integrated(), f64::NEG_INFINITY);
        // Nothing measured yet reads the same way.
        meter.reset(48_000);
        assert_eq!(meter.reading(LufsMode::Momentary), f64::NEG_INFINITY);
    }

    /// Gating over every block, kept in full.
    fn gated_exactly(blocks: &[f64]) -> f64 {
        let mean = |blocks: &mut dyn Iterator<Item = f64>| {
            let (sum, n) = blocks.fold((0.0, 0usize), |(s, n), e| (s + e, n + 1));
            (n > 0).then(|| sum / n as f64)
        };
        let above = || blocks.iter().copied().filter(|e| loudness_of(*e) > ABSOLUTE_GATE);
        let Some(ungated) = mean(&mut above()) else {
            return f64::NEG_INFINITY;
        };
        let relative = loudness_of(ungated) + RELATIVE_GATE;
        mean(&mut above().filter(|e| loudness_of(*e) > relative))
            .map_or(f64::NEG_INFINITY, loudness_of)
    }

    #[test]
    fn test_histogram_matches_exact_gating() {
        use rand::{Rng, SeedableRng};
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let mut histogram = GatingHistogram::new();
        let mut blocks = Vec::new();
        // A program that wanders from below the absolute gate up past the top bin.
        for _ in 0..100_000 {
            let lufs: f64 = rng.random_range(-90.0..40.0);
            let energy = energy_of(lufs);
            histogram.add(energy);
            blocks.push(energy);
        }
        let (binned, exact) = (histogram.integrated(), gated_exactly(&blocks));
        println!("binned {binned:.4} exact {exact:.4}");
        assert!((binned - exact).abs() < 0.02);

        let passed = blocks.iter().filter(|e| loudness_of(**e) > ABSOLUTE_GATE).count();
        assert_eq!(histogram.blocks(), passed as u64);
        assert_eq!(histogram.bins.len(), BINS);
    }

    #[test]
    fn test_histogram_gates() {
        let mut histogram = GatingHistogram::new();
        assert_eq!(histogram.integrated(), f64::NEG_INFINITY);
        histogram.add(0.0);
        histogram.add(energy_of(-75.0));
        assert_eq!(histogram.blocks(), 0);
        assert_eq!(histogram.integrated(), f64::NEG_INFINITY);

        // Quiet blocks 20 LU down fall under the relative gate.
        for _ in 0..10 {
            histogram.add(energy_of(-23.0));
            histogram.add(energy_of(-43.0));
        }
        let i = histogram.integrated();
        assert!((i + 23.0).abs() < 1e-9, "{i}");
    }

    #[test]
    fn test_peak_and_rms_of_full_scale_sine() {
        let samples: Vec<f32> = sine_gen(997.0, 48_000.0).take(48_000).collect();
        let r = rms(&samples);
        assert!((r - std::f32::consts::FRAC_1_SQRT_2).abs() < 0.01 * std::f32::consts::FRAC_1_SQRT_2);

        let mut peak = PeakMeter::default();
        for x in &samples {
            peak.add_frame(*x, -*x * 0.5);
        }
        let (l, r) = peak.take();
        // 48 samples per cycle land within a few thousandths of the crest.
        assert!((l - 1.0).abs() < 0.005, "{l}");
        assert!((r - 0.5).abs() < 0.005, "{r}");
        assert_eq!(peak.take(), (0.0, 0.0));
    }
}
