// Copyright 2026 The Afterglow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End to end: samples in through the DSP worker, geometry and pixels out.

use std::sync::Arc;

use afterglow_lib::canvas::{Canvas, Viewport};
use afterglow_lib::config::{Config, LissajousMode, MAIN_GROUP};
use afterglow_lib::dsp::pitch::parabolic_peak;
use afterglow_lib::dsp::{amplitude_to_db, sine_gen};
use afterglow_lib::layout::{Constraint, Group, MAX_SOLVER_ITERATIONS};
use afterglow_lib::phosphor::{PhosphorCpu, PhosphorParams};
use afterglow_lib::pipeline::{DspCore, DspWorker, FftRole, FftWorker, FrameSnapshot};
use afterglow_lib::theme::Theme;
use afterglow_lib::viz::{FrameContext, Geometry, Kind, Visualizer, layout_from_config};

const FS: u32 = 48_000;

/// Push interleaved `lr` through a fresh core a frame at a time, then run one main FFT pass.
fn analyze(config: &Config, lr: &[f32]) -> Arc<DspCore> {
    let core = Arc::new(DspCore::new(config.clone(), FS));
    let mut dsp = DspWorker::new(core.clone()).unwrap();
    let block = config.samples_per_frame(FS) * 2;
    for chunk in lr.chunks(block) {
        dsp.process(chunk).unwrap();
    }
    FftWorker::new(core.clone(), FftRole::Main)
        .run_pass(0.25)
        .unwrap();
    core
}

fn tone(hz: f64, amplitude: f32, seconds: f32) -> Vec<f32> {
    sine_gen(hz, FS as f64)
        .take((seconds * FS as f32) as usize)
        .map(|x| x * amplitude)
        .collect()
}

fn stereo(mono: &[f32]) -> Vec<f32> {
    mono.iter().flat_map(|x| [*x, *x]).collect()
}

fn draw(kind: Kind, config: &Config, core: &DspCore, width: f32, height: f32) -> Geometry {
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
    Visualizer::new(kind).render(&ctx, &mut out);
    out
}

#[test]
fn silent_input() {
    let config = Config::default();
    let core = analyze(&config, &vec![0.0; 10 * FS as usize * 2]);

    let levels = core.levels.load();
    assert_eq!(levels.peak_left, 0.0);
    assert_eq!(levels.peak_right, 0.0);
    assert_eq!(levels.rms, 0.0);
    assert!(levels.lufs <= -70.0);
    assert!(core.is_silent());

    // The oscilloscope is a flat line through the middle, and the canvas draws it there.
    let scope = draw(Kind::Oscilloscope, &config, &core, 400.0, 200.0);
    let line = &scope.lines[0];
    assert!(line.points.iter().all(|p| p[1] == 100.0));
    let mut canvas = Canvas::new(400, 200);
    canvas.clear(Theme::DARK.background);
    let pane = Viewport {
        x: 0.0,
        width: 400.0,
        height: 200.0,
    };
    canvas.draw(&pane, &scope, None);
    let background = canvas.get(200, 20).unwrap();
    let trace = canvas.get(200, 100).unwrap();
    assert_ne!(trace, background);
    assert!(trace.b > background.b);

    // The smoothed floor falls with frequency and the tilt lays it flat on min_db.
    let mut snapshot = FrameSnapshot::default();
    core.snapshot(&mut snapshot).unwrap();
    let floor = &snapshot.main.smoothed;
    assert!(floor[1..].windows(2).all(|w| w[1] < w[0]));
    let spectrum = draw(Kind::SpectrumAnalyzer, &config, &core, 600.0, 300.0);
    assert!(spectrum.lines[0].points.iter().all(|p| p[1].abs() < 0.01));
}

#[test]
fn pure_sine_at_one_kilohertz() {
    let config = Config::default();
    let lr = stereo(&tone(1000.0, 0.5, 1.0));
    let core = analyze(&config, &lr);

    let pitch = core.pitch.load();
    assert!((999.5..=1000.5).contains(&pitch.hz), "{pitch:?}");
    assert!((-6.5..=-5.5).contains(&pitch.db), "{pitch:?}");

    // The next ticks design the bandpass around the new pitch.
    let mut dsp = DspWorker::new(core.clone()).unwrap();
    for chunk in lr[..9600].chunks(1600) {
        dsp.process(chunk).unwrap();
    }
    let order = core.fir_order();
    assert!((1..=512).contains(&order), "{order}");

    let mut snapshot = FrameSnapshot::default();
    core.snapshot(&mut snapshot).unwrap();
    // MIDI 83.21
    assert_eq!((snapshot.note.name, snapshot.note.octave), ("B", 5));
    assert!((snapshot.note.cents - 21).abs() <= 1, "{:?}", snapshot.note);
}

#[test]
fn dual_tones() {
    let config = Config::default();
    let amplitude = 10f32.powf(-12.0 / 20.0);
    let mixed: Vec<f32> = tone(440.0, amplitude, 1.0)
        .iter()
        .zip(tone(880.0, amplitude, 1.0))
        .map(|(a, b)| a + b)
        .collect();
    let core = analyze(&config, &stereo(&mixed));
    let mut snapshot = FrameSnapshot::default();
    core.snapshot(&mut snapshot).unwrap();
    let raw = &snapshot.main.raw;
    let bin_hz = FS as f32 / config.fft.size as f32;

    for hz in [440.0f32, 880.0] {
        let near = (hz / bin_hz).round() as usize;
        let peak = (near - 2..=near + 2)
            .max_by(|a, b| raw[*a].total_cmp(&raw[*b]))
            .unwrap();
        let (offset, _) = parabolic_peak(
            amplitude_to_db(raw[peak - 1]),
            amplitude_to_db(raw[peak]),
            amplitude_to_db(raw[peak + 1]),
        );
        let bin = peak as f32 + offset;
        assert!((bin - hz / bin_hz).abs() < 0.2, "{hz}: {bin}");
    }
    // The tilt favors the octave above.
    let pitch = core.pitch.load();
    assert!((pitch.hz - 880.0).abs() < 2.0, "{pitch:?}");
}

#[test]
fn lissajous_on_mono() {
    let mut config = Config::default();
    let lr = stereo(&tone(330.0, 0.6, 0.5));
    let core = analyze(&config, &lr);

    let out = draw(Kind::Lissajous, &config, &core, 300.0, 300.0);
    let points = &out.lines[0].points;
    assert!(points.iter().all(|p| (p[0] - p[1]).abs() <= 1.0));

    config.lissajous.mode = LissajousMode::Rotate;
    let out = draw(Kind::Lissajous, &config, &core, 300.0, 300.0);
    assert!(out.lines[0].points.iter().all(|p| (p[0] - 150.0).abs() <= 1.0));
}

#[test]
fn splitter_cascade() {
    let mut group = Group::new(MAIN_GROUP, 500, 200, 80);
    group.push("a", Constraint::Free);
    group.push("b", Constraint::Fixed(100));
    group.push("c", Constraint::Free);

    let iterations = group.drag(0, 50.0);
    assert!(iterations <= MAX_SOLVER_ITERATIONS);
    let widths: Vec<u32> = group.panes().iter().map(|p| p.width).collect();
    assert_eq!(widths, vec![80, 100, 320]);
    assert_eq!(group.splitters()[1].x, 180);

    // The same shape through configuration, with the meter width forced.
    let mut config = Config::default();
    config.window.default_width = 500;
    config.vu.width = 100;
    config.visualizers.0.insert(
        MAIN_GROUP.to_owned(),
        vec!["oscilloscope".into(), "vu".into(), "spectrum".into()],
    );
    let mut layout = layout_from_config(&config).unwrap();
    let main = layout.group_mut(MAIN_GROUP).unwrap();
    main.drag(0, 50.0);
    let widths: Vec<u32> = main.panes().iter().map(|p| p.width).collect();
    assert_eq!(widths, vec![80, 100, 320]);
}

#[test]
fn phosphor_resize() {
    let mut config = Config::default();
    config.phosphor.enabled = true;
    let core = analyze(&config, &stereo(&tone(220.0, 0.4, 0.5)));
    let out = draw(Kind::Oscilloscope, &config, &core, 800.0, 200.0);
    assert!(out.beam.len() > 1);

    let params = PhosphorParams::from_config(&config.phosphor, 1.0 / 60.0, 0);
    let mut phosphor = PhosphorCpu::new(800, 200);
    phosphor.render(&params, &out.beam);
    let before = phosphor.total_energy();
    assert!(before > 0.0);
    let old: Vec<u32> = phosphor.energy(0).to_vec();

    phosphor.resize(1200, 300);
    assert_eq!((phosphor.width(), phosphor.height()), (1200, 300));
    assert_eq!(phosphor.total_energy(), before);
    let energy = phosphor.energy(0);
    for y in 0..300usize {
        for x in 0..1200usize {
            let inside = (200..1000).contains(&x) && (50..250).contains(&y);
            let e = energy[y * 1200 + x];
            if inside {
                assert_eq!(e, old[(y - 50) * 800 + x - 200]);
            } else {
                assert_eq!(e, 0, "{x},{y}");
            }
        }
    }
    assert_eq!(phosphor.age().len(), 1200 * 300);
}
