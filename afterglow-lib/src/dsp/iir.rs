// Copyright 2026 The Afterglow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Infinite Impulse Response
//!
//! - `Biquad`: direct form I second order section.  Also holds first order sections by leaving
//!   the second order coefficients at zero.
//! - `ButterworthLowpass`: cascade of biquads for the oscilloscope's lowpass view.
//! - `KWeighting`: the BS.1770 pre-filter used by the loudness meter, designed for any rate.
//!
//! Coefficients and state are f64.  The K-weighting highpass has its poles within 0.01 of the
//! unit circle, where f32 state visibly drifts over a long program.

use std::f64::consts::PI as PI64;

use super::Filter;

/// Direct form I biquad.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Biquad {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
}

impl Biquad {
    /// Coefficients already normalized by `a0`.
    pub fn from_coefficients(b0: f64, b1: f64, b2: f64, a1: f64, a2: f64) -> Self {
        Self {
            b0,
            b1,
            b2,
            a1,
            a2,
            ..Default::default()
        }
    }

    /// Bilinear transform lowpass of quality `q`.
    pub fn lowpass(f0: f64, fs: f64, q: f64) -> Self {
        let w0 = 2.0 * PI64 * f0 / fs;
        let (sin, cos) = w0.sin_cos();
        let alpha = sin / (2.0 * q);

        let a0 = 1.0 + alpha;
        let b0 = (1.0 - cos) * 0.5;
        Self::from_coefficients(
            b0 / a0,
            (1.0 - cos) / a0,
            b0 / a0,
            -2.0 * cos / a0,
            (1.0 - alpha) / a0,
        )
    }

    /// Single real pole, for odd Butterworth orders.
    pub fn first_order_lowpass(f0: f64, fs: f64) -> Self {
        let k = (PI64 * f0 / fs).tan();
        let norm = 1.0 / (1.0 + k);
        Self::from_coefficients(k * norm, k * norm, 0.0, (k - 1.0) * norm, 0.0)
    }

    #[inline]
    pub fn process_64(&mut self, x: f64) -> f64 {
        let y = self.b0 * x + self.b1 * self.x1 + self.b2 * self.x2
            - self.a1 * self.y1
            - self.a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        self.y1 = y;
        y
    }

    /// Magnitude response at `f` for a sample rate `fs`.
    pub fn gain_at(&self, f: f64, fs: f64) -> f64 {
        let w = 2.0 * PI64 * f / fs;
        let (s1, c1) = w.sin_cos();
        let (s2, c2) = (2.0 * w).sin_cos();
        let num_re = self.b0 + self.b1 * c1 + self.b2 * c2;
        let num_im = -(self.b1 * s1 + self.b2 * s2);
        let den_re = 1.0 + self.a1 * c1 + self.a2 * c2;
        let den_im = -(self.a1 * s1 + self.a2 * s2);
        ((num_re * num_re + num_im * num_im) / (den_re * den_re + den_im * den_im)).sqrt()
    }
}

impl Filter for Biquad {
    #[inline]
    fn process(&mut self, sample: f32) -> f32 {
        self.process_64(sample as f64) as f32
    }

    fn reset(&mut self) {
        self.x1 = 0.0;
        self.x2 = 0.0;
        self.y1 = 0.0;
        self.y2 = 0.0;
    }
}

/// Q of each second order section of a Butterworth filter, lowest Q first.  Odd orders leave out
/// the real pole, which becomes a first order section.
pub fn butterworth_q_factors(order: usize) -> Vec<f64> {
    (0..order / 2)
        .rev()
        .map(|k| {
            let theta = (2.0 * k as f64 + 1.0) * PI64 / (2.0 * order as f64);
            1.0 / (2.0 * theta.sin())
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LowpassDesign {
    pub cutoff_hz: f32,
    pub order: usize,
    pub sample_rate: u32,
}

/// Butterworth lowpass of any order as a biquad cascade.
#[derive(Debug, Clone, Default)]
pub struct ButterworthLowpass {
    sections: Vec<Biquad>,
    design: Option<LowpassDesign>,
}

impl ButterworthLowpass {
    pub fn new(design: LowpassDesign) -> Self {
        let mut lp = Self::default();
        lp.configure(design);
        lp
    }

    /// Rebuild the sections when the design changed.  State is cleared on rebuild.  Returns
    /// whether anything changed.
    pub fn configure(&mut self, design: LowpassDesign) -> bool {
        if self.design == Some(design) {
            return false;
        }
        let fs = design.sample_rate as f64;
        let f0 = (design.cutoff_hz as f64).clamp(1.0, fs * 0.5 * 0.98);
        let order = design.order.max(1);

        self.sections = butterworth_q_factors(order)
            .into_iter()
            .map(|q| Biquad::lowpass(f0, fs, q))
            .collect();
        if order % 2 == 1 {
            self.sections.push(Biquad::first_order_lowpass(f0, fs));
        }
        self.design = Some(design);
        true
    }

    pub fn sections(&self) -> &[Biquad] {
        &self.sections
    }

    pub fn gain_at(&self, f: f64) -> f64 {
        let fs = self.design.map(|d| d.sample_rate as f64).unwrap_or(48_000.0);
        self.sections.iter().map(|s| s.gain_at(f, fs)).product()
    }
}

impl Filter for ButterworthLowpass {
    #[inline]
    fn process(&mut self, sample: f32) -> f32 {
        let mut y = sample as f64;
        for s in self.sections.iter_mut() {
            y = s.process_64(y);
        }
        y as f32
    }

    fn reset(&mut self) {
        self.sections.iter_mut().for_each(|s| s.reset());
    }
}

/// BS.1770 K-weighting: a high shelf modelling the head followed by the RLB highpass.
#[derive(Debug, Clone)]
pub struct KWeighting {
    shelf: Biquad,
    highpass: Biquad,
}

impl KWeighting {
    pub fn new(sample_rate: u32) -> Self {
        let fs = sample_rate as f64;

        // High shelf, +4 dB above about 1.7 kHz.
        let f0 = 1681.974450955533;
        let gain_db = 3.999843853973347;
        let q = 0.7071752369554196;
        let k = (PI64 * f0 / fs).tan();
        let vh = 10f64.powf(gain_db / 20.0);
        let vb = vh.powf(0.4996667741545416);
        let a0 = 1.0 + k / q + k * k;
        let shelf = Biquad::from_coefficients(
            (vh + vb * k / q + k * k) / a0,
            2.0 * (k * k - vh) / a0,
            (vh - vb * k / q + k * k) / a0,
            2.0 * (k * k - 1.0) / a0,
            (1.0 - k / q + k * k) / a0,
        );

        // RLB highpass near 38 Hz.
        let f0 = 38.13547087602444;
        let q = 0.5003270373238773;
        let k = (PI64 * f0 / fs).tan();
        let a0 = 1.0 + k / q + k * k;
        let highpass = Biquad::from_coefficients(
            1.0,
            -2.0,
            1.0,
            2.0 * (k * k - 1.0) / a0,
            (1.0 - k / q + k * k) / a0,
        );

        Self { shelf, highpass }
    }

    #[inline]
    pub fn process_64(&mut self, x: f64) -> f64 {
        self.highpass.process_64(self.shelf.process_64(x))
    }

    pub fn gain_at(&self, f: f64, fs: f64) -> f64 {
        self.shelf.gain_at(f, fs) * self.highpass.gain_at(f, fs)
    }
}

impl Filter for KWeighting {
    #[inline]
    fn process(&mut self, sample: f32) -> f32 {
        self.process_64(sample as f64) as f32
    }

    fn reset(&mut self) {
        self.shelf.reset();
        self.highpass.reset();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::dsp::sine_gen;

    const TOL: f64 = 0.01;

    #[test]
    fn test_iir_butterworth_factors() {
        let facs = butterworth_q_factors(8);
        let tv = vec![
            0.5097955791041592,
            0.6013448869350453,
            0.8999762231364158,
            2.5629154477415064,
        ];
        assert!(facs.len() == tv.len());
        assert!(facs
            .iter()
            .zip(tv.iter())
            .all(|(x, y)| (*x - *y).abs() <= TOL));

        let facs = butterworth_q_factors(6);
        let tv = vec![0.5176380902050415, 0.7071067811865476, 1.9318516525781368];
        assert!(facs.len() == tv.len());
        assert!(facs
            .iter()
            .zip(tv.iter())
            .all(|(x, y)| (*x - *y).abs() <= TOL));

        // Third order: one section at Q = 1, plus the real pole.
        let facs = butterworth_q_factors(3);
        assert_eq!(facs.len(), 1);
        assert!((facs[0] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_iir_butterworth_cutoff_is_minus_3db() {
        for order in [1, 2, 3, 4, 7] {
            let lp = ButterworthLowpass::new(LowpassDesign {
                cutoff_hz: 2000.0,
                order,
                sample_rate: 48_000,
            });
            let at_cutoff = 20.0 * lp.gain_at(2000.0).log10();
            let dc = 20.0 * lp.gain_at(1.0).log10();
            println!("order {order}: dc {dc:.4} dB, cutoff {at_cutoff:.4} dB");
            assert!(dc.abs() < 0.01);
            assert!((at_cutoff + 3.0103).abs() < 0.05);
        }
    }

    #[test]
    fn test_iir_lowpass_attenuates_above_cutoff() {
        let mut lp = ButterworthLowpass::new(LowpassDesign {
            cutoff_hz: 1000.0,
            order: 4,
            sample_rate: 48_000,
        });
        let peak = sine_gen(8000.0, 48_000.0)
            .take(48_000)
            .map(|x| lp.process(x))
            .skip(24_000)
            .fold(0.0f32, |m, y| m.max(y.abs()));
        let db = 20.0 * peak.log10();
        println!("8k through 1k lowpass: {db:.1} dB");
        // Three octaves at 24 dB per octave.
        assert!(db < -65.0);
    }

    #[test]
    fn test_iir_reconfigure_clears_state() {
        let design = LowpassDesign {
            cutoff_hz: 500.0,
            order: 2,
            sample_rate: 48_000,
        };
        let mut lp = ButterworthLowpass::new(design);
        assert!(!lp.configure(design));
        for x in sine_gen(300.0, 48_000.0).take(100) {
            lp.process(x);
        }
        assert!(lp.configure(LowpassDesign {
            cutoff_hz: 600.0,
            ..design
        }));
        // Fresh state: an impulse of zero stays zero.
        assert_eq!(lp.process(0.0), 0.0);
    }

    #[test]
    fn test_kweighting_48k_matches_reference_coefficients() {
        let k = KWeighting::new(48_000);
        let s = k.shelf;
        assert!((s.b0 - 1.53512485958697).abs() < 1e-9);
        assert!((s.b1 + 2.69169618940638).abs() < 1e-9);
        assert!((s.b2 - 1.19839281085285).abs() < 1e-9);
        assert!((s.a1 + 1.69065929318241).abs() < 1e-9);
        assert!((s.a2 - 0.73248077421585).abs() < 1e-9);
        let h = k.highpass;
        assert_eq!((h.b0, h.b1, h.b2), (1.0, -2.0, 1.0));
        assert!((h.a1 + 1.99004745483398).abs() < 1e-9);
        assert!((h.a2 - 0.99007225036621).abs() < 1e-9);
    }

    #[test]
    fn test_kweighting_response_shape() {
        for fs in [44_100u32, 48_000, 96_000] {
            let k = KWeighting::new(fs);
            let f = fs as f64;
            let at_1k = 20.0 * k.gain_at(1000.0, f).log10();
            let at_20 = 20.0 * k.gain_at(20.0, f).log10();
            let at_10k = 20.0 * k.gain_at(10_000.0, f).log10();
            println!("fs {fs}: 20 Hz {at_20:.2}, 1k {at_1k:.3}, 10k {at_10k:.2}");
            assert!((at_1k - 0.698).abs() < 0.03);
            assert!(at_20 < -12.0);
            assert!((at_10k - 4.04).abs() < 0.1);
        }
    }
}
