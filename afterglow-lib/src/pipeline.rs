// Copyright 2026 The Afterglow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Pipeline
//!
//! `DspCore` holds everything the analysis threads share with the render thread.  `Workers`
//! runs the threads around it:
//!
//! - The DSP thread reads one frame's worth of audio per tick, pushes it into the ring, signals
//!   the FFT workers, runs the bandpass, the lowpass and the meters over the new samples, and
//!   then signals the render thread.
//! - The main FFT worker analyzes the mid (or left) channel and tracks the pitch.
//! - The alternate FFT worker analyzes the side (or right) channel.  Phosphor rendering never
//!   draws that spectrum, so the pass is skipped while phosphor is on.
//!
//! Every wait also watches the `running` flag.  Shutdown clears it and wakes every gate, then the
//! DSP thread joins both FFT workers before it returns.
//!
//! The render thread only ever reads the most recently completed FFT pass.  That may be a tick
//! behind the bandpass, which follows the pitch of the pass before it.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::audio::{BlockingSource, Source, CHANNELS};
use crate::config::{Config, FftMode};
use crate::dsp::fir::{BandpassDesign, FirBandpass};
use crate::dsp::iir::{ButterworthLowpass, LowpassDesign};
use crate::dsp::loudness::{rms, LoudnessMeter, PeakMeter};
use crate::dsp::pitch::{estimate, BinScale, Note, Pitch, PitchSearch};
use crate::dsp::smooth::{Smoother, SmoothingParams};
use crate::dsp::spectral::{CqtShape, EngineSlot, SpectralEngine, SpectralShape, Spectrum};
use crate::dsp::{db_to_amplitude, Filter};
use crate::ring::{AudioRing, Channel, SignalRing};
use crate::sync::{LevelState, Levels, PitchState, SpectrumSlot, TickGate};
use crate::{AfterglowError, Throttle};

/// Longest `dt` a smoothing step accepts.  Longer gaps, like the first pass or a stall, would
/// otherwise jump straight to the raw spectrum.
const MAX_SMOOTHING_DT: f32 = 0.25;

/// Shared state of the analysis.  Created once, handed to the workers and the render thread in
/// an `Arc`.
pub struct DspCore {
    config: RwLock<Arc<Config>>,
    config_generation: AtomicU64,
    sample_rate: AtomicU32,

    pub ring: AudioRing,
    /// Mid through the pitch-locked bandpass, delay compensated so index `i` lines up with
    /// `ring` index `i`.
    pub bandpassed: SignalRing,
    /// Mid through the Butterworth lowpass.  Only written while the lowpass is enabled.
    pub lowpassed: SignalRing,

    pub pitch: PitchState,
    pub main_spectrum: SpectrumSlot,
    pub alt_spectrum: SpectrumSlot,
    pub levels: LevelState,

    running: AtomicBool,
    /// Signaled by the DSP thread once the ring holds a new tick.
    fft_gate: TickGate,
    /// Signaled by the DSP thread when a tick is complete.
    frame_gate: TickGate,

    fir_order: AtomicUsize,
    silent: AtomicBool,
    hovering: AtomicBool,
}

impl DspCore {
    pub fn new(config: Config, sample_rate: u32) -> Self {
        let capacity = config.ring_size(sample_rate);
        Self {
            config: RwLock::new(Arc::new(config)),
            config_generation: AtomicU64::new(0),
            sample_rate: AtomicU32::new(sample_rate),
            ring: AudioRing::new(capacity),
            bandpassed: SignalRing::new(capacity),
            lowpassed: SignalRing::new(capacity),
            pitch: PitchState::default(),
            main_spectrum: SpectrumSlot::new(),
            alt_spectrum: SpectrumSlot::new(),
            levels: LevelState::default(),
            running: AtomicBool::new(true),
            fft_gate: TickGate::new(),
            frame_gate: TickGate::new(),
            fir_order: AtomicUsize::new(0),
            silent: AtomicBool::new(false),
            hovering: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> Result<Arc<Config>, AfterglowError> {
        Ok(self.config.read()?.clone())
    }

    /// Install a new configuration.  Workers pick it up at the start of their next pass.
    pub fn set_config(&self, config: Config) -> Result<(), AfterglowError> {
        *self.config.write()? = Arc::new(config);
        self.config_generation.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    pub fn config_generation(&self) -> u64 {
        self.config_generation.load(Ordering::Acquire)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.load(Ordering::Acquire)
    }

    /// Forget everything measured at the old rate.
    fn set_sample_rate(&self, sample_rate: u32) -> Result<(), AfterglowError> {
        self.sample_rate.store(sample_rate, Ordering::Release);
        self.ring.clear();
        self.bandpassed.clear();
        self.lowpassed.clear();
        self.pitch.clear();
        self.main_spectrum.clear()?;
        self.alt_spectrum.clear()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Clear `running` and wake every waiter so it can observe it.
    pub fn stop(&self) -> Result<(), AfterglowError> {
        self.running.store(false, Ordering::Release);
        self.fft_gate.wake()?;
        self.frame_gate.wake()
    }

    /// Set while the pointer is over a spectrum, slowing the smoothed fall.
    pub fn set_hovering(&self, hovering: bool) {
        self.hovering.store(hovering, Ordering::Relaxed);
    }

    pub fn is_hovering(&self) -> bool {
        self.hovering.load(Ordering::Relaxed)
    }

    /// Whether the last tick stayed below `audio.silence_threshold`.
    pub fn is_silent(&self) -> bool {
        self.silent.load(Ordering::Acquire)
    }

    /// Order of the running bandpass.  Its group delay is half of this.
    pub fn fir_order(&self) -> usize {
        self.fir_order.load(Ordering::Acquire)
    }

    /// Ticks completed so far.
    pub fn ticks(&self) -> Result<u64, AfterglowError> {
        self.frame_gate.count()
    }

    /// Block the render thread until a tick newer than `seen` completes.  Returns `None` on
    /// timeout or shutdown, so the caller can keep servicing its window.
    pub fn wait_frame(&self, seen: u64, timeout: Duration) -> Result<Option<u64>, AfterglowError> {
        let running = &self.running;
        let got = self
            .frame_gate
            .wait_timeout(timeout, |c| c > seen || !running.load(Ordering::Acquire))?;
        Ok(got.filter(|_| self.is_running()))
    }

    /// Refresh `snap` with the current state.  Spectra are only copied when a newer pass
    /// completed.
    pub fn snapshot(&self, snap: &mut FrameSnapshot) -> Result<(), AfterglowError> {
        let config = self.config()?;
        let frames_written = self.ring.frames_written();

        snap.tick = self.frame_gate.count()?;
        snap.sample_rate = self.sample_rate();
        snap.write_pos = self.ring.write_pos();
        snap.new_frames = (frames_written.saturating_sub(snap.frames_written) as usize)
            .min(self.ring.capacity());
        snap.frames_written = frames_written;
        snap.silent = self.is_silent();
        snap.pitch = self.pitch.load();
        snap.note = if snap.silent {
            Note::NONE
        } else {
            Note::from_hz(snap.pitch.hz, config.fft.key)
        };
        snap.levels = self.levels.load();
        snap.fir_order = self.fir_order();
        snap.main_generation = self
            .main_spectrum
            .read_newer(snap.main_generation, &mut snap.main)?;
        snap.alt_generation = self
            .alt_spectrum
            .read_newer(snap.alt_generation, &mut snap.alt)?;
        Ok(())
    }
}

/// What the render thread reads once per frame.  Reused across frames so spectra are copied
/// into existing allocations.
#[derive(Debug, Clone)]
pub struct FrameSnapshot {
    pub tick: u64,
    pub sample_rate: u32,
    /// Ring index one past the newest sample.
    pub write_pos: usize,
    pub frames_written: u64,
    /// Frames pushed since the previous snapshot, at most the ring capacity.
    pub new_frames: usize,
    pub silent: bool,
    pub pitch: Pitch,
    pub note: Note,
    pub levels: Levels,
    pub fir_order: usize,
    pub main: Spectrum,
    pub main_generation: u64,
    pub alt: Spectrum,
    pub alt_generation: u64,
}

impl Default for FrameSnapshot {
    fn default() -> Self {
        Self {
            tick: 0,
            sample_rate: 0,
            write_pos: 0,
            frames_written: 0,
            new_frames: 0,
            silent: true,
            pitch: Pitch {
                hz: 0.0,
                db: f32::NEG_INFINITY,
            },
            note: Note::NONE,
            levels: Levels::default(),
            fir_order: 0,
            main: Spectrum::default(),
            main_generation: 0,
            alt: Spectrum::default(),
            alt_generation: 0,
        }
    }
}

/// State the DSP thread owns: filters and meters.  `process` is one tick without the read,
/// which is what tests drive.
pub struct DspWorker {
    core: Arc<DspCore>,
    config: Arc<Config>,
    config_generation: u64,
    sample_rate: u32,
    bandpass: FirBandpass,
    lowpass: ButterworthLowpass,
    loudness: LoudnessMeter,
    peak: PeakMeter,
    /// The new frames as `L,R`, reconstructed from the ring.
    lr: Vec<f32>,
    rms_window: Vec<f32>,
}

impl DspWorker {
    pub fn new(core: Arc<DspCore>) -> Result<Self, AfterglowError> {
        let config = core.config()?;
        let sample_rate = core.sample_rate();
        Ok(Self {
            config_generation: core.config_generation(),
            sample_rate,
            bandpass: FirBandpass::new(),
            lowpass: ButterworthLowpass::new(lowpass_design(&config, sample_rate)),
            loudness: LoudnessMeter::new(sample_rate),
            peak: PeakMeter::default(),
            lr: Vec::new(),
            rms_window: Vec::new(),
            config,
            core,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn refresh_config(&mut self) -> Result<(), AfterglowError> {
        let generation = self.core.config_generation();
        if generation != self.config_generation {
            self.config = self.core.config()?;
            self.config_generation = generation;
            log::debug!("DSP picked up config generation {generation}");
        }
        Ok(())
    }

    /// Switch every rate-dependent piece of state to `sample_rate`.
    pub fn set_sample_rate(&mut self, sample_rate: u32) -> Result<(), AfterglowError> {
        if sample_rate == self.sample_rate || sample_rate == 0 {
            return Ok(());
        }
        log::info!(
            "{}",
            AfterglowError::SampleRateChange {
                from: self.sample_rate,
                to: sample_rate
            }
        );
        self.sample_rate = sample_rate;
        self.core.set_sample_rate(sample_rate)?;
        self.loudness.reset(sample_rate);
        self.peak = PeakMeter::default();
        self.bandpass = FirBandpass::new();
        // The lowpass design carries the rate and rebuilds on its next use.
        Ok(())
    }

    /// One tick over interleaved `L,R` frames already read from the source.
    pub fn process(&mut self, block: &[f32]) -> Result<(), AfterglowError> {
        self.refresh_config()?;
        let frames = block.len() / CHANNELS;
        if frames == 0 {
            return Ok(());
        }

        let ring = &self.core.ring;
        ring.push(&block[..frames * CHANNELS], self.config.audio.gain_linear());
        self.core.fft_gate.signal()?;

        let frames = frames.min(ring.capacity());
        let end = ring.write_pos();
        // Ring index of the oldest new frame, unmasked.
        let start = end + ring.capacity() - frames;

        self.lr.resize(frames * CHANNELS, 0.0);
        ring.copy_recent_lr(&mut self.lr);

        self.update_bandpass();
        self.run_bandpass(start, frames);
        self.run_lowpass(start, frames);
        self.update_levels();

        self.core.frame_gate.signal()?;
        Ok(())
    }

    /// Follow the last published pitch.  Silence keeps the previous design.
    fn update_bandpass(&mut self) {
        let pitch = self.core.pitch.load();
        if !(pitch.hz > 0.0) || self.core.is_silent() {
            return;
        }
        let bandpass = &self.config.oscilloscope.bandpass;
        let design = BandpassDesign {
            center_hz: pitch.hz,
            bandwidth_hz: bandpass.bandwidth_hz,
            sidelobe_db: bandpass.sidelobe_db,
            sample_rate: self.sample_rate,
        };
        if self.bandpass.redesign_if_needed(design) {
            log::trace!("bandpass at {:.1} Hz, order {}", pitch.hz, self.bandpass.order());
        }
    }

    fn run_bandpass(&mut self, start: usize, frames: usize) {
        let ring = &self.core.ring;
        let capacity = ring.capacity();
        let delay = self.bandpass.delay_samples();
        for k in 0..frames {
            let i = start + k;
            let y = self.bandpass.process(ring.sample(Channel::Mid, i));
            // The output lags the input by the group delay.  Store it where its input was.
            self.core.bandpassed.store(i + capacity - delay, y);
        }
        self.core
            .fir_order
            .store(self.bandpass.order(), Ordering::Release);
    }

    fn run_lowpass(&mut self, start: usize, frames: usize) {
        if !self.config.oscilloscope.lowpass.enabled {
            return;
        }
        if self
            .lowpass
            .configure(lowpass_design(&self.config, self.sample_rate))
        {
            log::debug!("lowpass reconfigured: {:?}", self.config.oscilloscope.lowpass);
        }
        let ring = &self.core.ring;
        for k in 0..frames {
            let i = start + k;
            let y = self.lowpass.process(ring.sample(Channel::Mid, i));
            self.core.lowpassed.store(i, y);
        }
    }

    fn update_levels(&mut self) {
        self.loudness.add_interleaved(&self.lr);
        self.peak.add_interleaved(&self.lr);
        let (peak_left, peak_right) = self.peak.take();

        let fs = self.sample_rate as f32;
        let window = ((self.config.vu.window_ms * fs / 1000.0) as usize)
            .clamp(1, self.core.ring.capacity());
        self.rms_window.resize(window, 0.0);
        self.core
            .ring
            .copy_recent(Channel::Mid, &mut self.rms_window);

        self.core.levels.store(Levels {
            peak_left,
            peak_right,
            rms: rms(&self.rms_window),
            lufs: self.loudness.reading(self.config.lufs.mode) as f32,
        });

        let threshold = db_to_amplitude(self.config.audio.silence_threshold);
        self.core
            .silent
            .store(peak_left.max(peak_right) < threshold, Ordering::Release);
    }

    /// Tick until shutdown.  Read errors are logged at most once a minute and retried.
    pub fn run(mut self, mut source: Box<dyn BlockingSource>) -> Result<(), AfterglowError> {
        let mut read_errors = Throttle::per_minute();
        let mut requested_rate = self.config.audio.sample_rate;
        self.set_sample_rate(source.format().sample_rate)?;
        let mut block = Vec::new();

        while self.core.is_running() {
            self.refresh_config()?;

            if self.config.audio.sample_rate != requested_rate {
                requested_rate = self.config.audio.sample_rate;
                match source.reconfigure(requested_rate) {
                    Ok(format) => log::info!("audio reopened at {} Hz", format.sample_rate),
                    Err(e) => log::warn!("audio reconfigure to {requested_rate} Hz failed: {e}"),
                }
            }
            // Backends may renegotiate on their own.
            let rate = source.format().sample_rate;
            if rate != self.sample_rate {
                self.set_sample_rate(rate)?;
            }

            block.resize(self.config.samples_per_frame(self.sample_rate) * CHANNELS, 0.0);
            match source.read(&mut block) {
                Ok(0) => {}
                Ok(n) => self.process(&block[..n])?,
                Err(e) => {
                    if let Some(suppressed) = read_errors.ready() {
                        log::warn!("audio read failed: {e} ({suppressed} more suppressed)");
                    }
                    std::thread::sleep(Duration::from_millis(10));
                }
            }
        }

        source.cleanup();
        Ok(())
    }
}

fn lowpass_design(config: &Config, sample_rate: u32) -> LowpassDesign {
    LowpassDesign {
        cutoff_hz: config.oscilloscope.lowpass.cutoff_hz,
        order: config.oscilloscope.lowpass.order,
        sample_rate,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FftRole {
    /// Mid or left.  Tracks the pitch.
    Main,
    /// Side or right.
    Alt,
}

impl FftRole {
    fn thread_name(self) -> &'static str {
        match self {
            FftRole::Main => "fft-main",
            FftRole::Alt => "fft-alt",
        }
    }

    pub fn channel(self, mode: FftMode) -> Channel {
        match (self, mode) {
            (FftRole::Main, FftMode::Midside) => Channel::Mid,
            (FftRole::Alt, FftMode::Midside) => Channel::Side,
            (FftRole::Main, FftMode::Leftright) => Channel::Left,
            (FftRole::Alt, FftMode::Leftright) => Channel::Right,
        }
    }
}

/// Analysis shape a configuration asks for at `sample_rate`.
pub fn spectral_shape(config: &Config, sample_rate: u32) -> SpectralShape {
    let fft = &config.fft;
    SpectralShape {
        size: fft.size,
        sample_rate,
        cqt: fft.cqt.enabled.then(|| CqtShape {
            bins_per_octave: fft.cqt.bins_per_octave as u32,
            min_freq: fft.limits.min_freq,
            max_freq: fft.limits.max_freq,
        }),
    }
}

fn bin_scale(engine: &SpectralEngine, shape: &SpectralShape) -> BinScale {
    match (engine, shape.cqt) {
        (SpectralEngine::Cqt(_), Some(cqt)) => BinScale::Log {
            min_freq: engine.freq_of(0),
            bins_per_octave: cqt.bins_per_octave as f32,
        },
        _ => BinScale::Linear {
            bin_hz: shape.sample_rate as f32 / shape.size as f32,
        },
    }
}

pub struct FftWorker {
    core: Arc<DspCore>,
    role: FftRole,
    engine: EngineSlot,
    smoother: Smoother,
    spectrum: Spectrum,
    input: Vec<f32>,
    last_pass: Option<Instant>,
}

impl FftWorker {
    pub fn new(core: Arc<DspCore>, role: FftRole) -> Self {
        Self {
            core,
            role,
            engine: EngineSlot::new(),
            smoother: Smoother::new(),
            spectrum: Spectrum::default(),
            input: Vec::new(),
            last_pass: None,
        }
    }

    fn slot(&self) -> &SpectrumSlot {
        match self.role {
            FftRole::Main => &self.core.main_spectrum,
            FftRole::Alt => &self.core.alt_spectrum,
        }
    }

    /// Wait for ticks and analyze each one until shutdown.
    pub fn run(mut self) -> Result<(), AfterglowError> {
        let mut seen = self.core.fft_gate.count()?;
        let mut errors = Throttle::per_minute();
        while let Some(tick) = self.core.fft_gate.wait_newer(seen, &self.core.running)? {
            seen = tick;
            let now = Instant::now();
            let dt = self
                .last_pass
                .map(|last| now.duration_since(last).as_secs_f32())
                .unwrap_or(MAX_SMOOTHING_DT);
            self.last_pass = Some(now);
            match self.run_pass(dt) {
                Ok(_) => {}
                Err(AfterglowError::Poison) => return Err(AfterglowError::Poison),
                Err(e) => {
                    if let Some(suppressed) = errors.ready() {
                        log::warn!(
                            "{} pass failed: {e} ({suppressed} more suppressed)",
                            self.role.thread_name()
                        );
                    }
                }
            }
        }
        log::debug!("{} exiting", self.role.thread_name());
        Ok(())
    }

    /// Analyze the most recent samples, smoothing over `dt` seconds.  Returns false when the
    /// pass was skipped.
    pub fn run_pass(&mut self, dt: f32) -> Result<bool, AfterglowError> {
        let config = self.core.config()?;
        if self.role == FftRole::Alt && config.phosphor.enabled {
            return Ok(false);
        }

        let shape = spectral_shape(&config, self.core.sample_rate());
        let previous = self.engine.shape();
        let engine = self.engine.ensure(shape)?;
        if previous.is_some_and(|p| p != shape) {
            log::debug!(
                "{} {}",
                self.role.thread_name(),
                AfterglowError::SizeChange {
                    from: self.spectrum.len(),
                    to: engine.len()
                }
            );
            self.spectrum = Spectrum::default();
        }

        self.input.resize(engine.input_len(), 0.0);
        self.core
            .ring
            .copy_recent(self.role.channel(config.fft.mode), &mut self.input);
        engine.process(&self.input, &mut self.spectrum)?;
        let scale = bin_scale(engine, &shape);

        let limits = &config.fft.limits;
        let smoothing = &config.fft.smoothing;
        let params = SmoothingParams {
            enabled: smoothing.enabled,
            rise_speed: smoothing.rise_speed,
            fall_speed: smoothing.fall_speed,
            hover_fall_speed: smoothing.hover_fall_speed,
            min_db: limits.min_db,
            slope_db_per_oct: config.fft.slope_db_per_oct,
        };
        self.smoother.apply(
            &self.spectrum.freqs,
            &self.spectrum.raw,
            &mut self.spectrum.smoothed,
            &params,
            dt.clamp(0.0, MAX_SMOOTHING_DT),
            self.core.is_hovering(),
        );

        if self.role == FftRole::Main && !self.core.is_silent() {
            let search = PitchSearch {
                min_freq: limits.min_freq,
                max_freq: limits.max_freq.min(shape.sample_rate as f32 * 0.5),
                slope_db_per_oct: config.fft.slope_db_per_oct,
            };
            if let Some(pitch) = estimate(&self.spectrum.freqs, &self.spectrum.raw, scale, &search)
            {
                self.core.pitch.store(pitch);
            }
        }

        self.slot().publish(&self.spectrum)?;
        Ok(true)
    }
}

/// The running analysis threads.  Dropping stops and joins them.
pub struct Workers {
    core: Arc<DspCore>,
    dsp: Option<JoinHandle<Result<(), AfterglowError>>>,
}

impl Workers {
    /// Start the DSP thread, which starts both FFT workers.
    pub fn spawn(core: Arc<DspCore>, source: Source) -> Result<Self, AfterglowError> {
        let source = source.into_blocking()?;
        let dsp_core = core.clone();
        let dsp = std::thread::Builder::new()
            .name("dsp".to_owned())
            .spawn(move || dsp_thread(dsp_core, source))?;
        Ok(Self {
            core,
            dsp: Some(dsp),
        })
    }

    pub fn core(&self) -> &Arc<DspCore> {
        &self.core
    }

    /// Stop every worker and wait for them.  Returns the DSP thread's result.
    pub fn shutdown(mut self) -> Result<(), AfterglowError> {
        self.stop_and_join()
    }

    fn stop_and_join(&mut self) -> Result<(), AfterglowError> {
        let stopped = self.core.stop();
        let joined = match self.dsp.take() {
            Some(handle) => handle.join().map_err(|_| AfterglowError::Poison)?,
            None => Ok(()),
        };
        stopped.and(joined)
    }
}

impl Drop for Workers {
    fn drop(&mut self) {
        if self.dsp.is_some() {
            if let Err(e) = self.stop_and_join() {
                log::warn!("workers stopped with error: {e}");
            }
        }
    }
}

fn dsp_thread(core: Arc<DspCore>, source: Box<dyn BlockingSource>) -> Result<(), AfterglowError> {
    let spawn_fft = |role: FftRole| {
        let core = core.clone();
        std::thread::Builder::new()
            .name(role.thread_name().to_owned())
            .spawn(move || FftWorker::new(core, role).run())
    };
    let fft_workers = [spawn_fft(FftRole::Main)?, spawn_fft(FftRole::Alt)?];

    let result = DspWorker::new(core.clone()).and_then(|worker| worker.run(source));
    if let Err(e) = &result {
        log::error!("DSP thread failed: {e}");
    }

    // The FFT workers only exit once they observe `running` cleared.
    let stopped = core.stop();
    for handle in fft_workers {
        match handle.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::warn!("FFT worker failed: {e}"),
            Err(_) => log::warn!("FFT worker panicked"),
        }
    }
    result.and(stopped)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::audio::SilentSource;
    use crate::dsp::sine_gen;

    fn stereo(mono: &[f32]) -> Vec<f32> {
        mono.iter().flat_map(|x| [*x, *x]).collect()
    }

    fn core_with(config: Config) -> Arc<DspCore> {
        Arc::new(DspCore::new(config, 48_000))
    }

    #[test]
    fn test_process_signals_both_gates() {
        let core = core_with(Config::default());
        let mut dsp = DspWorker::new(core.clone()).unwrap();
        dsp.process(&vec![0.25; 1600]).unwrap();
        dsp.process(&vec![0.25; 1600]).unwrap();
        assert_eq!(core.fft_gate.count().unwrap(), 2);
        assert_eq!(core.ticks().unwrap(), 2);
        assert_eq!(core.ring.frames_written(), 1600);
        assert_eq!(core.ring.write_pos(), 1600);
        // Both channels at 0.25: mid 0.25, side 0.
        assert_eq!(core.ring.sample(Channel::Mid, 1599), 0.25);
        assert_eq!(core.ring.sample(Channel::Side, 1599), 0.0);
    }

    #[test]
    fn test_silence_gate_and_levels() {
        let core = core_with(Config::default());
        let mut dsp = DspWorker::new(core.clone()).unwrap();
        for _ in 0..60 {
            dsp.process(&vec![0.0; 1600]).unwrap();
        }
        assert!(core.is_silent());
        let levels = core.levels.load();
        assert_eq!((levels.peak_left, levels.peak_right, levels.rms), (0.0, 0.0, 0.0));
        assert!(levels.lufs <= -70.0);

        let mut snap = FrameSnapshot::default();
        core.snapshot(&mut snap).unwrap();
        assert_eq!(snap.note, Note::NONE);
        // A second of frames, more than the ring holds.
        assert_eq!(snap.new_frames, core.ring.capacity());
        core.snapshot(&mut snap).unwrap();
        assert_eq!(snap.new_frames, 0);
    }

    #[test]
    fn test_bandpassed_lines_up_with_mid() {
        let core = core_with(Config::default());
        core.pitch.store(Pitch { hz: 1000.0, db: -6.0 });
        let mut dsp = DspWorker::new(core.clone()).unwrap();
        let tone: Vec<f32> = sine_gen(1000.0, 48_000.0)
            .take(48_000)
            .map(|x| x * 0.5)
            .collect();
        for chunk in tone.chunks(800) {
            dsp.process(&stereo(chunk)).unwrap();
        }
        let order = core.fir_order();
        assert_eq!(order, 435);

        // Only indices older than the group delay have output yet.
        let newest = core.ring.write_pos() + core.ring.capacity() - order / 2 - 1;
        let worst = (0..2000)
            .map(|k| newest - k)
            .map(|i| (core.bandpassed.get(i) - core.ring.sample(Channel::Mid, i)).abs())
            .fold(0.0f32, f32::max);
        println!("worst misalignment {worst}");
        assert!(worst < 0.08);
    }

    #[test]
    fn test_main_pass_tracks_pitch_and_publishes() {
        let core = core_with(Config::default());
        let mut dsp = DspWorker::new(core.clone()).unwrap();
        let mut main = FftWorker::new(core.clone(), FftRole::Main);
        let tone: Vec<f32> = sine_gen(440.0, 48_000.0)
            .take(9600)
            .map(|x| x * 0.5)
            .collect();
        for chunk in tone.chunks(800) {
            dsp.process(&stereo(chunk)).unwrap();
        }
        assert!(main.run_pass(1.0 / 60.0).unwrap());
        let pitch = core.pitch.load();
        assert!((pitch.hz - 440.0).abs() < 2.0, "{pitch:?}");
        assert_eq!(core.main_spectrum.generation(), 1);

        let mut snap = FrameSnapshot::default();
        core.snapshot(&mut snap).unwrap();
        assert_eq!(snap.main.len(), 2049);
        assert_eq!((snap.note.name, snap.note.octave), ("A", 4));
    }

    #[test]
    fn test_alt_pass_skipped_under_phosphor() {
        let mut config = Config::default();
        config.phosphor.enabled = true;
        let core = core_with(config);
        let mut alt = FftWorker::new(core.clone(), FftRole::Alt);
        assert!(!alt.run_pass(1.0 / 60.0).unwrap());
        assert_eq!(core.alt_spectrum.generation(), 0);

        let mut main = FftWorker::new(core.clone(), FftRole::Main);
        assert!(main.run_pass(1.0 / 60.0).unwrap());
    }

    #[test]
    fn test_sample_rate_change_resets_state() {
        let core = core_with(Config::default());
        let mut dsp = DspWorker::new(core.clone()).unwrap();
        core.pitch.store(Pitch { hz: 440.0, db: 0.0 });
        dsp.process(&vec![0.5; 3200]).unwrap();
        dsp.set_sample_rate(44_100).unwrap();
        assert_eq!(core.sample_rate(), 44_100);
        assert_eq!(core.pitch.load().hz, 0.0);
        assert_eq!(core.ring.sample(Channel::Mid, 0), 0.0);

        // The next pass runs at the new rate.
        let mut main = FftWorker::new(core.clone(), FftRole::Main);
        main.run_pass(1.0 / 60.0).unwrap();
        let mut snap = FrameSnapshot::default();
        core.snapshot(&mut snap).unwrap();
        let nyquist = *snap.main.freqs.last().unwrap();
        assert_eq!(nyquist, 22_050.0);
    }

    #[test]
    fn test_workers_start_and_stop() {
        let core = core_with(Config::default());
        let workers = Workers::spawn(
            core.clone(),
            Source::Blocking(Box::new(SilentSource::unpaced(48_000))),
        )
        .unwrap();

        let mut seen = 0;
        let deadline = Instant::now() + Duration::from_secs(5);
        while seen < 3 && Instant::now() < deadline {
            if let Some(tick) = core.wait_frame(seen, Duration::from_millis(100)).unwrap() {
                seen = tick;
            }
        }
        assert!(seen >= 3);

        workers.shutdown().unwrap();
        assert!(!core.is_running());
        // Waiters return at once after shutdown.
        assert_eq!(core.wait_frame(u64::MAX, Duration::from_secs(5)).unwrap(), None);
    }
}
