// Copyright 2026 The Afterglow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Digital Signal Processing
//!
//! Everything the analysis threads run on captured audio:
//!
//! - `fir`: a pitch-tracking Kaiser bandpass, redesigned whenever the tracked pitch moves.
//! - `iir`: biquads, the Butterworth lowpass cascade, and BS.1770 K-weighting.
//! - `spectral`: the STFT and the Morlet constant-Q transform behind one `SpectralEngine`.
//! - `smooth`: asymmetric dB smoothing with a slope-tilted floor.
//! - `pitch`: fundamental estimation from a dB spectrum plus musical note naming.
//! - `loudness`: momentary, short-term and gated integrated LUFS, peak and RMS.
//!
//! ## Precision
//!
//! Samples and per-sample state are f32.  Designs (windows, filter coefficients) are computed in
//! f64 and truncated, since poorly conditioned designs at low frequencies are where precision
//! actually gets lost.

use std::f64::consts::TAU as TAU64;

pub mod fir;
pub mod iir;
pub mod loudness;
pub mod pitch;
pub mod smooth;
pub mod spectral;
pub mod window;

/// Floor for values passing through `log10`.  Anything quieter reads as about -200 dB.
pub const EPSILON: f32 = 1e-10;

/// Reference frequency for slope tilt and floor shaping.  A5, the upper end of where most melodic
/// energy lives.
pub const TILT_REFERENCE_HZ: f32 = 880.0;

/// Amplitude to dBFS, never returning `-inf`.
#[inline]
pub fn amplitude_to_db(amplitude: f32) -> f32 {
    20.0 * amplitude.max(EPSILON).log10()
}

#[inline]
pub fn db_to_amplitude(db: f32) -> f32 {
    10f32.powf(db / 20.0)
}

pub trait Filter {
    /// Process a single amplitude sample.
    fn process(&mut self, sample: f32) -> f32;

    /// Forget all history, as if the filter had only ever seen silence.
    fn reset(&mut self);
}

/// Fixed sine wave generator, starting at zero phase.  Truncates to f32.
pub fn sine_gen(f0: f64, fs: f64) -> impl Iterator<Item = f32> {
    Sine::new(f0, fs)
}

/// Endless sine from a rotating phasor.  Behind the tone source and the test signals.
#[derive(Debug, Clone)]
pub struct Sine {
    re: f64,
    im: f64,
    cos: f64,
    sin: f64,
    steps: u32,
}

impl Sine {
    pub fn new(f0: f64, fs: f64) -> Self {
        let omega = TAU64 * f0 / fs;
        Self {
            re: 1.0,
            im: 0.0,
            cos: omega.cos(),
            sin: omega.sin(),
            steps: 0,
        }
    }
}

impl Iterator for Sine {
    type Item = f32;

    fn next(&mut self) -> Option<Self::Item> {
        let out = self.im as f32;
        let new_re = self.re * self.cos - self.im * self.sin;
        let new_im = self.re * self.sin + self.im * self.cos;
        self.re = new_re;
        self.im = new_im;

        // Rotation drifts off the unit circle over millions of steps.  Renormalize occasionally.
        self.steps = self.steps.wrapping_add(1);
        if self.steps % 4096 == 0 {
            let norm = (self.re * self.re + self.im * self.im).sqrt();
            self.re /= norm;
            self.im /= norm;
        }
        Some(out)
    }
}
