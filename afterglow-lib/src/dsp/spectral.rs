// Copyright 2026 The Afterglow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Spectral Engines
//!
//! Two ways to get a magnitude spectrum out of the most recent samples:
//!
//! - **STFT**: Hann window and a real FFT of the last `size` samples.  Linear bins, cheap, and
//!   poor resolution in the bass.
//! - **CQT**: a bank of Morlet wavelets spaced `bins_per_octave` to the octave, each evaluated as
//!   one complex dot product against the tail of the signal.  Constant resolution in musical
//!   terms at the cost of far more multiplies.
//!
//! Both report magnitudes in units of sinusoid amplitude, so a full scale sine reads 1.0 whichever
//! engine is active.  Bins are strictly increasing in frequency.
//!
//! The engine only changes shape through `ensure`, which the FFT workers call between passes.  A
//! pass in flight therefore always finishes against the sizes it started with.

use std::f32::consts::TAU;
use std::sync::Arc;

use num_complex::Complex;
use realfft::{RealFftPlanner, RealToComplex};

use super::window::WindowFunction;
use crate::AfterglowError;

/// Parameters of the constant-Q bank.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CqtShape {
    pub bins_per_octave: u32,
    pub min_freq: f32,
    pub max_freq: f32,
}

/// Everything that determines the engine's bins.  Any difference triggers a rebuild.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpectralShape {
    /// FFT size, and the cap on CQT kernel lengths.
    pub size: usize,
    pub sample_rate: u32,
    pub cqt: Option<CqtShape>,
}

/// Output of one pass.  `smoothed` is owned by the smoother but travels with the rest so a
/// snapshot is always one consistent set of vectors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Spectrum {
    pub freqs: Vec<f32>,
    pub raw: Vec<f32>,
    pub smoothed: Vec<f32>,
    pub phase: Vec<f32>,
}

impl Spectrum {
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    fn resize(&mut self, freqs: &[f32]) {
        if self.freqs.as_slice() != freqs {
            self.freqs = freqs.to_vec();
        }
        self.raw.resize(freqs.len(), 0.0);
        self.phase.resize(freqs.len(), 0.0);
    }
}

pub struct Stft {
    size: usize,
    sample_rate: u32,
    fft: Arc<dyn RealToComplex<f32>>,
    window: Vec<f32>,
    input: Vec<f32>,
    output: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    freqs: Vec<f32>,
}

impl Stft {
    pub fn new(size: usize, sample_rate: u32) -> Self {
        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(size);
        let bin_hz = sample_rate as f32 / size as f32;
        Self {
            size,
            sample_rate,
            window: WindowFunction::Hann.make_window_32(size),
            input: fft.make_input_vec(),
            output: fft.make_output_vec(),
            scratch: fft.make_scratch_vec(),
            freqs: (0..size / 2 + 1).map(|k| k as f32 * bin_hz).collect(),
            fft,
        }
    }

    /// `samples` holds the most recent samples, oldest first.  Shorter input is zero padded in
    /// front, longer input contributes only its last `size` samples.
    pub fn process(&mut self, samples: &[f32], out: &mut Spectrum) -> Result<(), AfterglowError> {
        let take = samples.len().min(self.size);
        let pad = self.size - take;
        let tail = &samples[samples.len() - take..];
        self.input[..pad].iter_mut().for_each(|x| *x = 0.0);
        self.input[pad..]
            .iter_mut()
            .zip(tail.iter().zip(&self.window[pad..]))
            .for_each(|(x, (s, w))| *x = s * w);

        self.fft
            .process_with_scratch(&mut self.input, &mut self.output, &mut self.scratch)?;

        out.resize(&self.freqs);
        let scale = 2.0 / self.size as f32;
        let nyquist = self.output.len() - 1;
        for (k, c) in self.output.iter().enumerate() {
            let mut mag = c.norm() * scale;
            // One-sided energy correction, everywhere but DC and Nyquist.
            if k != 0 && k != nyquist {
                mag *= 2.0;
            }
            out.raw[k] = mag;
            out.phase[k] = c.im.atan2(c.re);
        }
        Ok(())
    }

    pub fn bin_of(&self, hz: f32) -> usize {
        let k = (hz * self.size as f32 / self.sample_rate as f32).round();
        (k.max(0.0) as usize).min(self.freqs.len() - 1)
    }
}

/// One Morlet wavelet, centered in its own support.
#[derive(Debug, Clone)]
struct Kernel {
    re: Vec<f32>,
    im: Vec<f32>,
}

pub struct Cqt {
    shape: CqtShape,
    freqs: Vec<f32>,
    kernels: Vec<Kernel>,
    max_len: usize,
}

impl Cqt {
    /// `size` caps every kernel length, so the ring and input buffers sized for the FFT suffice.
    pub fn new(shape: CqtShape, size: usize, sample_rate: u32) -> Self {
        let fs = sample_rate as f32;
        let bpo = shape.bins_per_octave.max(1) as f32;
        let q = 1.0 / ((1.0 / bpo).exp2() - 1.0);
        let top = shape.max_freq.min(fs * 0.5);
        let bottom = shape.min_freq.max(1.0);

        let cap = if size % 2 == 0 { size.saturating_sub(1) } else { size }.max(1);
        let mut freqs = Vec::new();
        let mut kernels = Vec::new();
        let mut k = 0;
        loop {
            let f = bottom * (k as f32 / bpo).exp2();
            if f > top {
                break;
            }
            freqs.push(f);
            kernels.push(Self::morlet(f, q, fs, cap));
            k += 1;
        }
        let max_len = kernels.iter().map(|k| k.re.len()).max().unwrap_or(1);

        Self {
            shape,
            freqs,
            kernels,
            max_len,
        }
    }

    fn morlet(f: f32, q: f32, fs: f32, cap: usize) -> Kernel {
        let sigma = q / (TAU * f);
        let mut len = (6.0 * sigma * fs).ceil() as usize;
        if len % 2 == 0 {
            len += 1;
        }
        let len = len.min(cap);
        let center = (len - 1) as f32 * 0.5;

        let envelope: Vec<f32> = (0..len)
            .map(|n| {
                let t = (n as f32 - center) / fs;
                (-(t * t) / (2.0 * sigma * sigma)).exp()
            })
            .collect();
        let norm: f32 = envelope.iter().sum();

        let (re, im) = envelope
            .iter()
            .enumerate()
            .map(|(n, e)| {
                let t = (n as f32 - center) / fs;
                let (sin, cos) = (TAU * f * t).sin_cos();
                (e * cos / norm, e * sin / norm)
            })
            .unzip();
        Kernel { re, im }
    }

    /// Longest kernel, the number of samples `process` needs.
    pub fn input_len(&self) -> usize {
        self.max_len
    }

    pub fn kernel_len(&self, bin: usize) -> usize {
        self.kernels[bin].re.len()
    }

    /// `samples` holds the most recent samples, oldest first.
    pub fn process(&self, samples: &[f32], out: &mut Spectrum) {
        out.resize(&self.freqs);
        for (k, kernel) in self.kernels.iter().enumerate() {
            let len = kernel.re.len().min(samples.len());
            let tail = &samples[samples.len() - len..];
            let re_k = &kernel.re[kernel.re.len() - len..];
            let im_k = &kernel.im[kernel.im.len() - len..];
            let mut re = 0.0f32;
            let mut im = 0.0f32;
            for ((s, kr), ki) in tail.iter().zip(re_k).zip(im_k) {
                re += s * kr;
                im -= s * ki;
            }
            out.raw[k] = 2.0 * (re * re + im * im).sqrt();
            out.phase[k] = im.atan2(re);
        }
    }

    pub fn bin_of(&self, hz: f32) -> usize {
        let bpo = self.shape.bins_per_octave.max(1) as f32;
        let k = (bpo * (hz.max(1e-3) / self.freqs[0]).log2()).round();
        (k.max(0.0) as usize).min(self.freqs.len() - 1)
    }
}

/// The active engine.  Rebuilt by `ensure` when the shape changes.
pub enum SpectralEngine {
    Stft(Stft),
    Cqt(Cqt),
}

impl SpectralEngine {
    pub fn new(shape: SpectralShape) -> Result<Self, AfterglowError> {
        if shape.size < 2 || shape.sample_rate == 0 {
            return Err(AfterglowError::ConfigInvalid(format!(
                "spectral engine needs size >= 2 and a sample rate, got {} at {} Hz",
                shape.size, shape.sample_rate
            )));
        }
        let engine = match shape.cqt {
            None => Self::Stft(Stft::new(shape.size, shape.sample_rate)),
            Some(cqt) => {
                let engine = Cqt::new(cqt, shape.size, shape.sample_rate);
                if engine.freqs.is_empty() {
                    return Err(AfterglowError::ConfigInvalid(format!(
                        "no CQT bins between {} and {} Hz",
                        cqt.min_freq, cqt.max_freq
                    )));
                }
                Self::Cqt(engine)
            }
        };
        log::debug!("spectral engine: {} bins for {shape:?}", engine.freqs().len());
        Ok(engine)
    }

    pub fn freqs(&self) -> &[f32] {
        match self {
            Self::Stft(s) => &s.freqs,
            Self::Cqt(c) => &c.freqs,
        }
    }

    pub fn len(&self) -> usize {
        self.freqs().len()
    }

    pub fn is_empty(&self) -> bool {
        self.freqs().is_empty()
    }

    /// Samples a pass consumes.
    pub fn input_len(&self) -> usize {
        match self {
            Self::Stft(s) => s.size,
            Self::Cqt(c) => c.input_len(),
        }
    }

    pub fn process(&mut self, samples: &[f32], out: &mut Spectrum) -> Result<(), AfterglowError> {
        match self {
            Self::Stft(s) => s.process(samples, out),
            Self::Cqt(c) => {
                c.process(samples, out);
                Ok(())
            }
        }
    }

    pub fn freq_of(&self, bin: usize) -> f32 {
        let freqs = self.freqs();
        freqs[bin.min(freqs.len() - 1)]
    }

    /// Nearest bin to `hz`, clamped to the range of bins.
    pub fn bin_of(&self, hz: f32) -> usize {
        match self {
            Self::Stft(s) => s.bin_of(hz),
            Self::Cqt(c) => c.bin_of(hz),
        }
    }

    /// The two bins bracketing `hz`, for interpolation.  Equal at and beyond the ends.
    pub fn find(&self, hz: f32) -> (usize, usize) {
        find_bracket(self.freqs(), hz)
    }
}

/// Bracketing indices of `hz` in strictly increasing `freqs`.
pub fn find_bracket(freqs: &[f32], hz: f32) -> (usize, usize) {
    if freqs.is_empty() {
        return (0, 0);
    }
    let last = freqs.len() - 1;
    match freqs.partition_point(|f| *f <= hz) {
        0 => (0, 0),
        i if i > last => (last, last),
        i if freqs[i - 1] == hz => (i - 1, i - 1),
        i => (i - 1, i),
    }
}

/// Keeps one engine alive across passes and rebuilds it only when the requested shape changes.
pub struct EngineSlot {
    shape: Option<SpectralShape>,
    engine: Option<SpectralEngine>,
}

impl Default for EngineSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineSlot {
    pub fn new() -> Self {
        Self {
            shape: None,
            engine: None,
        }
    }

    /// Returns the engine for `shape`, building it first if needed.
    pub fn ensure(&mut self, shape: SpectralShape) -> Result<&mut SpectralEngine, AfterglowError> {
        if self.shape != Some(shape) || self.engine.is_none() {
            if let Some(old) = self.shape {
                log::debug!("spectral engine rebuild, size {} -> {}", old.size, shape.size);
            }
            self.engine = Some(SpectralEngine::new(shape)?);
            self.shape = Some(shape);
        }
        self.engine
            .as_mut()
            .ok_or(AfterglowError::ConfigInvalid("spectral engine missing".into()))
    }

    pub fn shape(&self) -> Option<SpectralShape> {
        self.shape
    }
}
