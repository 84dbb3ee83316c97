// Copyright 2026 The Afterglow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Window Functions
//!
//! Windows are calculated in f64 and truncated to f32 where the samples live.  The STFT uses the
//! periodic Hann window.  FIR design uses the Kaiser window, whose β trades main-lobe width for
//! sidelobe level and maps directly from a requested attenuation.

use std::f64::consts::PI as PI64;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WindowFunction {
    /// Rectangle.  -13.3dB first sidelobe, smears everything.  Useful only as a reference.
    BoxCar,
    /// Periodic Hann, `0.5·(1 − cos(2πi/M))`.  Coherent gain 0.5 and -31.5dB first sidelobe.
    Hann,
    /// Cancels its first sidelobe to a modest -42.7dB.
    Hamming,
    /// Symmetric Kaiser window of shape `beta`.
    Kaiser { beta: f64 },
}

impl WindowFunction {
    pub fn make_window(&self, size: usize) -> Vec<f64> {
        match self {
            Self::BoxCar => vec![1.0; size],
            Self::Hann => (0..size).map(|i| hann(i, size)).collect(),
            Self::Hamming => (0..size).map(|i| hamming(i, size)).collect(),
            Self::Kaiser { beta } => kaiser_window(size, *beta),
        }
    }

    /// The truncated window, matching what the f32 sample paths multiply by.
    pub fn make_window_32(&self, size: usize) -> Vec<f32> {
        self.make_window(size)
            .into_iter()
            .map(|w| w as f32)
            .collect()
    }

    /// Mean of the window, the factor by which a windowed sinusoid's amplitude shrinks.
    pub fn coherent_gain(&self, size: usize) -> f64 {
        if size == 0 {
            return 0.0;
        }
        self.make_window(size).iter().sum::<f64>() / size as f64
    }
}

fn hann(i: usize, size: usize) -> f64 {
    0.5 * (1.0 - (2.0 * PI64 * i as f64 / size as f64).cos())
}

fn hamming(i: usize, size: usize) -> f64 {
    const A0: f64 = 25.0 / 46.0;
    A0 - (1.0 - A0) * (2.0 * PI64 * i as f64 / size as f64).cos()
}

/// Zeroth order modified Bessel function of the first kind, by power series.  Converges quickly
/// for the β range used by window design.
pub fn bessel_i0(x: f64) -> f64 {
    let half_sq = (x * 0.5) * (x * 0.5);
    let mut term = 1.0;
    let mut sum = 1.0;
    let mut k = 1.0;
    while term > sum * 1e-17 {
        term *= half_sq / (k * k);
        sum += term;
        k += 1.0;
    }
    sum
}

/// Kaiser β for a target sidelobe attenuation in dB.
pub fn kaiser_beta(attenuation_db: f64) -> f64 {
    if attenuation_db < 21.0 {
        0.0
    } else if attenuation_db < 50.0 {
        let a = attenuation_db - 21.0;
        0.5842 * a.powf(0.4) + 0.07886 * a
    } else {
        0.1102 * (attenuation_db - 8.7)
    }
}

/// Symmetric Kaiser window, `I0(β·sqrt(1 − (2n/(L−1) − 1)²)) / I0(β)`.
pub fn kaiser_window(size: usize, beta: f64) -> Vec<f64> {
    match size {
        0 => Vec::new(),
        1 => vec![1.0],
        _ => {
            let denom = bessel_i0(beta);
            let span = (size - 1) as f64;
            (0..size)
                .map(|n| {
                    let r = 2.0 * n as f64 / span - 1.0;
                    bessel_i0(beta * (1.0 - r * r).max(0.0).sqrt()) / denom
                })
                .collect()
        }
    }
}
