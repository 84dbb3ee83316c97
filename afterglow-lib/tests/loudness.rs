// Copyright 2026 The Afterglow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! EBU Tech 3341 compliance cases, measured through the DSP worker the way the meters see them.

use std::sync::Arc;

use afterglow_lib::config::{Config, LufsMode};
use afterglow_lib::dsp::loudness::LoudnessMeter;
use afterglow_lib::dsp::sine_gen;
use afterglow_lib::pipeline::{DspCore, DspWorker};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Paul Kellet's refined pink filter over seeded white noise.
struct Pink {
    rng: StdRng,
    b: [f64; 7],
}

impl Pink {
    fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            b: [0.0; 7],
        }
    }
}

impl Iterator for Pink {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        let white: f64 = self.rng.random_range(-1.0..1.0);
        let b = &mut self.b;
        b[0] = 0.99886 * b[0] + white * 0.0555179;
        b[1] = 0.99332 * b[1] + white * 0.0750759;
        b[2] = 0.96900 * b[2] + white * 0.1538520;
        b[3] = 0.86650 * b[3] + white * 0.3104856;
        b[4] = 0.55000 * b[4] + white * 0.5329522;
        b[5] = -0.7616 * b[5] - white * 0.0168980;
        let pink = b.iter().sum::<f64>() + white * 0.5362;
        b[6] = white * 0.115926;
        Some((pink * 0.11) as f32)
    }
}

struct Meter {
    core: Arc<DspCore>,
    dsp: DspWorker,
    sample_rate: u32,
}

impl Meter {
    fn new(mode: LufsMode, sample_rate: u32) -> Self {
        let mut config = Config::default();
        config.lufs.mode = mode;
        let core = Arc::new(DspCore::new(config, sample_rate));
        let dsp = DspWorker::new(core.clone()).unwrap();
        Self {
            core,
            dsp,
            sample_rate,
        }
    }

    /// Stereo 1 kHz sine at `dbfs` on both channels.
    fn feed(&mut self, dbfs: f32, seconds: f32) {
        let amplitude = 10f32.powf(dbfs / 20.0);
        let frames = (seconds * self.sample_rate as f32) as usize;
        let block: Vec<f32> = sine_gen(1000.0, self.sample_rate as f64)
            .take(frames)
            .flat_map(|x| [x * amplitude, x * amplitude])
            .collect();
        let tick = (self.sample_rate / 60) as usize * 2;
        for chunk in block.chunks(tick) {
            self.dsp.process(chunk).unwrap();
        }
    }

    /// The same mono signal on both channels.
    fn feed_mono(&mut self, samples: &[f32]) {
        let tick = (self.sample_rate / 60) as usize;
        for chunk in samples.chunks(tick) {
            let frames: Vec<f32> = chunk.iter().flat_map(|x| [*x, *x]).collect();
            self.dsp.process(&frames).unwrap();
        }
    }

    fn lufs(&self) -> f32 {
        self.core.levels.load().lufs
    }
}

#[test]
fn case_1_stereo_sine_at_minus_23() {
    for mode in [LufsMode::Momentary, LufsMode::Shortterm, LufsMode::Integrated] {
        let mut meter = Meter::new(mode, 48_000);
        meter.feed(-23.0, 20.0);
        let lufs = meter.lufs();
        assert!((lufs + 23.0).abs() < 0.1, "{mode:?}: {lufs}");
    }
}

#[test]
fn case_2_stereo_sine_at_minus_33() {
    let mut meter = Meter::new(LufsMode::Integrated, 48_000);
    meter.feed(-33.0, 20.0);
    let lufs = meter.lufs();
    assert!((lufs + 33.0).abs() < 0.1, "{lufs}");
}

#[test]
fn case_3_relative_gate() {
    let mut meter = Meter::new(LufsMode::Integrated, 48_000);
    meter.feed(-36.0, 10.0);
    meter.feed(-23.0, 60.0);
    meter.feed(-36.0, 10.0);
    let lufs = meter.lufs();
    assert!((lufs + 23.0).abs() < 0.1, "{lufs}");
}

#[test]
fn pink_noise_calibrated_at_minus_23() {
    const FS: u32 = 48_000;
    // Calibrate the gain on one stretch of noise, then measure a different one.
    let reference: Vec<f32> = Pink::new(1).take(30 * FS as usize).collect();
    let mut calibration = LoudnessMeter::new(FS);
    for x in &reference {
        calibration.add_frame(*x, *x);
    }
    let measured = calibration.integrated();
    let gain = 10f64.powf((-23.0 - measured) / 20.0) as f32;
    println!("uncalibrated pink {measured:.3} LUFS, gain {gain:.4}");

    let program: Vec<f32> = Pink::new(2)
        .take(10 * FS as usize)
        .map(|x| x * gain)
        .collect();
    let mut meter = Meter::new(LufsMode::Integrated, FS);
    meter.feed_mono(&program);
    let lufs = meter.lufs();
    assert!((lufs + 23.0).abs() < 0.1, "{lufs}");
}

#[test]
fn other_sample_rates() {
    for rate in [44_100, 96_000] {
        let mut meter = Meter::new(LufsMode::Integrated, rate);
        meter.feed(-23.0, 20.0);
        let lufs = meter.lufs();
        assert!((lufs + 23.0).abs() < 0.1, "{rate}: {lufs}");
    }
}

#[test]
fn silence_reads_below_the_meter() {
    let mut meter = Meter::new(LufsMode::Shortterm, 48_000);
    meter.feed(-200.0, 5.0);
    assert!(meter.lufs() <= -70.0);
}
