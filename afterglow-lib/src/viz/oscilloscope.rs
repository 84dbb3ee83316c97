// Copyright 2026 The Afterglow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Oscilloscope
//!
//! Shows the mid channel over a window long enough for a few cycles of the tracked pitch.  The
//! trigger is the pitch-locked bandpass: a positive going zero crossing found there is stable
//! even when the waveform itself is busy with harmonics, and the bandpass is stored delay
//! compensated, so the index found applies to the raw signal as is.

use super::{trace_beam, FrameContext, Geometry, Render};
use crate::colors;
use crate::config::{Alignment, AlignmentType, Config};
use crate::pipeline::{DspCore, FrameSnapshot};

/// Where to read from, in unmasked ring indices.  `start` may wrap below zero; readers mask it
/// against the power of two ring capacity, so the arithmetic stays modular throughout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sweep {
    pub start: usize,
    pub samples: usize,
    /// A trigger was found and the window is aligned to it.
    pub triggered: bool,
}

/// Plan the window for this frame.
pub fn sweep(config: &Config, snapshot: &FrameSnapshot, core: &DspCore) -> Option<Sweep> {
    let fs = snapshot.sample_rate as f32;
    if fs <= 0.0 {
        return None;
    }
    let osc = &config.oscilloscope;
    let capacity = core.ring.capacity();

    let period = (!snapshot.silent && snapshot.pitch.hz > 0.0)
        .then(|| (fs / snapshot.pitch.hz).max(osc.min_cycle_ms * fs / 1000.0));
    let window = osc.window_ms * fs / 1000.0;
    let samples = match period {
        Some(p) => window.max(osc.cycles * p),
        None => window,
    };
    let samples = (samples.round() as usize).clamp(2, capacity / 2);

    let follow = osc.follow_pitch && period.is_some();
    // Bandpass output exists only up to the group delay behind the writer.
    let delay = if follow { snapshot.fir_order / 2 } else { 0 };
    let end = snapshot.write_pos + 2 * capacity - delay;
    let start = end.wrapping_sub(samples);

    let Some(period) = period.filter(|_| follow) else {
        return Some(Sweep {
            start,
            samples,
            triggered: false,
        });
    };

    let scan = ((2.0 * period) as usize).min(capacity / 4);
    let bp = |i: usize| core.bandpassed.get(i);
    let Some(crossing) = (0..scan)
        .map(|j| start.wrapping_sub(j))
        .find(|i| bp(i.wrapping_sub(1)) < 0.0 && bp(*i) >= 0.0)
    else {
        return Some(Sweep {
            start,
            samples,
            triggered: false,
        });
    };

    let mut start = match osc.alignment {
        Alignment::Left => crossing,
        Alignment::Center => crossing.wrapping_sub(samples / 2),
        Alignment::Right => crossing.wrapping_sub(samples),
    };
    if osc.alignment_type == AlignmentType::Peak {
        // A quarter cycle after the crossing is the crest, so is three quarters before it.
        let shift = ((0.75 * period).round() as usize).min(capacity / 4);
        start = start.wrapping_sub(shift);
    }
    Some(Sweep {
        start,
        samples,
        triggered: true,
    })
}

#[derive(Debug, Default)]
pub struct Oscilloscope {
    points: Vec<[f32; 2]>,
}

impl Oscilloscope {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Render for Oscilloscope {
    fn render(&mut self, ctx: &FrameContext, out: &mut Geometry) {
        let osc = &ctx.config.oscilloscope;
        let Some(sweep) = sweep(ctx.config, ctx.snapshot, ctx.core) else {
            return;
        };
        let (w, h) = ctx.oriented(osc.rotation);
        let lowpassed = osc.lowpass.enabled;
        let last = (sweep.samples - 1) as f32;

        self.points.clear();
        for k in 0..sweep.samples {
            let i = sweep.start.wrapping_add(k);
            let v = if lowpassed {
                ctx.core.lowpassed.get(i)
            } else {
                ctx.core.ring.sample(crate::ring::Channel::Mid, i)
            };
            let mut x = k as f32 / last * w;
            if osc.flip_x {
                x = w - x;
            }
            let y = (h * 0.5 * (1.0 + v)).clamp(0.0, h);
            let (x, y) = osc.rotation.apply(x, y, ctx.width, ctx.height);
            self.points.push([x, y]);
        }

        if ctx.phosphor() {
            trace_beam(
                ctx,
                &self.points,
                osc.beam_multiplier,
                colors::WHITE,
                &mut out.beam,
            );
        } else {
            out.line(self.points.clone(), ctx.theme.foreground, 1.5);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::Rotation;
    use crate::dsp::pitch::Pitch;
    use crate::dsp::sine_gen;
    use crate::pipeline::{DspWorker, FrameSnapshot};
    use crate::theme::Theme;
    use crate::viz::test::core_with;
    use std::sync::Arc;

    fn render(config: &Config, core: &DspCore, width: f32, height: f32) -> Geometry {
        let mut snapshot = FrameSnapshot::default();
        core.snapshot(&mut snapshot).unwrap();
        let ctx = FrameContext {
            config,
            core,
            snapshot: &snapshot,
            theme: &Theme::DARK,
            width,
            height,
            dt: 1.0 / 60.0,
        };
        let mut out = Geometry::default();
        Oscilloscope::new().render(&ctx, &mut out);
        out
    }

    fn tone_core(config: &Config) -> Arc<DspCore> {
        let core = Arc::new(DspCore::new(config.clone(), 48_000));
        core.pitch.store(Pitch { hz: 1000.0, db: -6.0 });
        let mut dsp = DspWorker::new(core.clone()).unwrap();
        let tone: Vec<f32> = sine_gen(1000.0, 48_000.0)
            .take(48_000)
            .flat_map(|x| [x * 0.5, x * 0.5])
            .collect();
        for chunk in tone.chunks(1600) {
            dsp.process(chunk).unwrap();
        }
        core
    }

    #[test]
    fn test_silence_is_flat() {
        let config = Config::default();
        let core = core_with(config.clone(), 48_000, &vec![0.0; 48_000]);
        let out = render(&config, &core, 400.0, 200.0);
        let line = &out.lines[0];
        // 25 ms at 48 kHz
        assert_eq!(line.points.len(), 1200);
        assert!(line.points.iter().all(|p| p[1] == 100.0));
        assert_eq!(line.points[0][0], 0.0);
        assert_eq!(line.points[1199][0], 400.0);
        assert!(out.beam.is_empty());
    }

    #[test]
    fn test_trigger_on_rising_zero_crossing() {
        let mut config = Config::default();
        config.oscilloscope.alignment = Alignment::Left;
        let core = tone_core(&config);
        let out = render(&config, &core, 400.0, 200.0);
        let points = &out.lines[0].points;
        println!("first samples {:?}", &points[..3]);
        assert!((points[0][1] - 100.0).abs() < 20.0);
        assert!(points[2][1] > points[0][1]);

        config.oscilloscope.alignment_type = AlignmentType::Peak;
        let out = render(&config, &core, 400.0, 200.0);
        let y0 = out.lines[0].points[0][1];
        println!("peak aligned start {y0}");
        assert!(y0 > 100.0 + 0.35 * 100.0);
    }

    #[test]
    fn test_window_covers_cycles() {
        let mut config = Config::default();
        config.oscilloscope.window_ms = 1.0;
        config.oscilloscope.cycles = 4.0;
        let core = tone_core(&config);
        let mut snapshot = FrameSnapshot::default();
        core.snapshot(&mut snapshot).unwrap();
        let sweep = sweep(&config, &snapshot, &core).unwrap();
        // Four 48 sample cycles beat the 48 sample window.
        assert_eq!(sweep.samples, 192);
        assert!(sweep.triggered);
    }

    #[test]
    fn test_low_pitch_right_peak() {
        let mut config = Config::default();
        config.oscilloscope.alignment = Alignment::Right;
        config.oscilloscope.alignment_type = AlignmentType::Peak;
        let core = tone_core(&config);
        let mut snapshot = FrameSnapshot::default();
        core.snapshot(&mut snapshot).unwrap();
        // A one hertz pitch near the start of the ring reaches back past index zero.
        snapshot.pitch = Pitch { hz: 1.0, db: -6.0 };
        snapshot.write_pos = 1000;

        let capacity = core.ring.capacity();
        let sweep = sweep(&config, &snapshot, &core).unwrap();
        println!("low pitch sweep {sweep:?}");
        assert!(sweep.samples >= 2 && sweep.samples <= capacity / 2);

        let ctx = FrameContext {
            config: &config,
            core: &core,
            snapshot: &snapshot,
            theme: &Theme::DARK,
            width: 400.0,
            height: 200.0,
            dt: 1.0 / 60.0,
        };
        let mut out = Geometry::default();
        Oscilloscope::new().render(&ctx, &mut out);
        let points = &out.lines[0].points;
        assert_eq!(points.len(), sweep.samples);
        assert!(points.iter().all(|p| (0.0..=200.0).contains(&p[1])));
    }

    #[test]
    fn test_vertical_rotation() {
        let mut config = Config::default();
        config.oscilloscope.rotation = Rotation::R90;
        let core = core_with(config.clone(), 48_000, &vec![0.0; 9600]);
        let out = render(&config, &core, 200.0, 400.0);
        // The time axis runs down the pane and the zero line sits mid-width.
        assert!(out.lines[0].points.iter().all(|p| p[0] == 100.0));
        assert_eq!(out.lines[0].points[0][1], 0.0);
        assert_eq!(out.lines[0].points[1199][1], 400.0);
    }

    #[test]
    fn test_phosphor_fills_beam() {
        let mut config = Config::default();
        config.phosphor.enabled = true;
        let core = core_with(config.clone(), 48_000, &vec![0.0; 9600]);
        let out = render(&config, &core, 400.0, 200.0);
        assert!(out.lines.is_empty());
        assert_eq!(out.beam.len(), 1200);
        // The last point only ends the stroke.
        assert_eq!(out.beam.positions[1199][2], 0.0);
        let e = out.beam.positions[0][2];
        let expected = config.phosphor.beam.energy / 60.0 / (400.0 / 1199.0f32).max(1.0);
        assert!((e - expected).abs() < 1e-4);
    }
}
