// Copyright 2026 The Afterglow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Sources that need no audio server: silence and a steady sine.  Both pace themselves to the
//! wall clock like a capture device would, unless built unpaced for tests.

use std::time::{Duration, Instant};

use super::{AudioFormat, Backend, BlockingSource, Source};
use crate::dsp::{db_to_amplitude, Sine};
use crate::AfterglowError;

/// Sleeps a reader until the frames it already received are due.
#[derive(Debug, Clone)]
struct Pacer {
    start: Option<Instant>,
    frames: u64,
    sample_rate: u32,
}

impl Pacer {
    fn new(sample_rate: u32) -> Self {
        Self {
            start: None,
            frames: 0,
            sample_rate,
        }
    }

    fn wait_for(&mut self, frames: usize) {
        let start = *self.start.get_or_insert_with(Instant::now);
        self.frames += frames as u64;
        let due = start + Duration::from_secs_f64(self.frames as f64 / self.sample_rate as f64);
        let now = Instant::now();
        if due > now {
            std::thread::sleep(due - now);
        }
    }
}

pub struct SilentSource {
    format: AudioFormat,
    pacer: Option<Pacer>,
}

impl SilentSource {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            format: AudioFormat::stereo(sample_rate),
            pacer: Some(Pacer::new(sample_rate)),
        }
    }

    /// Returns immediately from every read.
    pub fn unpaced(sample_rate: u32) -> Self {
        Self {
            pacer: None,
            ..Self::new(sample_rate)
        }
    }
}

impl BlockingSource for SilentSource {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn read(&mut self, out: &mut [f32]) -> Result<usize, AfterglowError> {
        let n = out.len() & !1;
        out[..n].iter_mut().for_each(|x| *x = 0.0);
        if let Some(pacer) = &mut self.pacer {
            pacer.wait_for(n / 2);
        }
        Ok(n)
    }

    fn reconfigure(&mut self, sample_rate: u32) -> Result<AudioFormat, AfterglowError> {
        self.format = AudioFormat::stereo(sample_rate);
        if self.pacer.is_some() {
            self.pacer = Some(Pacer::new(sample_rate));
        }
        Ok(self.format)
    }

    fn cleanup(&mut self) {}
}

/// Identical sine on both channels.
pub struct ToneSource {
    format: AudioFormat,
    hz: f32,
    amplitude: f32,
    sine: Sine,
    pacer: Option<Pacer>,
}

impl ToneSource {
    pub fn new(hz: f32, db: f32, sample_rate: u32) -> Self {
        Self {
            format: AudioFormat::stereo(sample_rate),
            hz,
            amplitude: db_to_amplitude(db),
            sine: Sine::new(hz as f64, sample_rate as f64),
            pacer: Some(Pacer::new(sample_rate)),
        }
    }

    pub fn unpaced(hz: f32, db: f32, sample_rate: u32) -> Self {
        Self {
            pacer: None,
            ..Self::new(hz, db, sample_rate)
        }
    }
}

impl BlockingSource for ToneSource {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn read(&mut self, out: &mut [f32]) -> Result<usize, AfterglowError> {
        let n = out.len() & !1;
        for frame in out[..n].chunks_exact_mut(2) {
            let x = self.sine.next().unwrap_or(0.0) * self.amplitude;
            frame[0] = x;
            frame[1] = x;
        }
        if let Some(pacer) = &mut self.pacer {
            pacer.wait_for(n / 2);
        }
        Ok(n)
    }

    fn reconfigure(&mut self, sample_rate: u32) -> Result<AudioFormat, AfterglowError> {
        self.format = AudioFormat::stereo(sample_rate);
        self.sine = Sine::new(self.hz as f64, sample_rate as f64);
        if self.pacer.is_some() {
            self.pacer = Some(Pacer::new(sample_rate));
        }
        Ok(self.format)
    }

    fn cleanup(&mut self) {}
}

pub struct SilentBackend;

impl Backend for SilentBackend {
    fn name(&self) -> &'static str {
        "silent"
    }

    fn enumerate(&self) -> Result<Vec<String>, AfterglowError> {
        Ok(vec!["silence".to_owned()])
    }

    fn open(&self, _device: Option<&str>, sample_rate: u32) -> Result<Source, AfterglowError> {
        Ok(Source::Blocking(Box::new(SilentSource::new(sample_rate))))
    }
}

pub struct ToneBackend {
    pub hz: f32,
    pub db: f32,
}

impl Backend for ToneBackend {
    fn name(&self) -> &'static str {
        "tone"
    }

    fn enumerate(&self) -> Result<Vec<String>, AfterglowError> {
        Ok(vec![format!("sine {} Hz {} dBFS", self.hz, self.db)])
    }

    fn open(&self, _device: Option<&str>, sample_rate: u32) -> Result<Source, AfterglowError> {
        if !(self.hz > 0.0 && self.hz < sample_rate as f32 * 0.5) {
            return Err(AfterglowError::AudioUnavailable(format!(
                "tone at {} Hz does not fit under {} Hz",
                self.hz, sample_rate
            )));
        }
        Ok(Source::Blocking(Box::new(ToneSource::new(
            self.hz,
            self.db,
            sample_rate,
        ))))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_tone_source_level() {
        let mut tone = ToneSource::unpaced(1000.0, -6.0, 48_000);
        let mut buf = vec![0.0; 9601];
        let n = tone.read(&mut buf).unwrap();
        assert_eq!(n, 9600);
        let peak = buf[..n].iter().fold(0.0f32, |m, x| m.max(x.abs()));
        assert!((peak - 0.501).abs() < 0.01, "{peak}");
        assert!(buf[..n].chunks_exact(2).all(|lr| lr[0] == lr[1]));
    }

    #[test]
    fn test_silent_source_paces_reads() {
        let mut silent = SilentSource::new(48_000);
        let mut buf = vec![1.0; 2 * 2400];
        let start = Instant::now();
        for _ in 0..3 {
            assert_eq!(silent.read(&mut buf).unwrap(), buf.len());
        }
        // 3 × 50 ms of frames
        assert!(start.elapsed() >= Duration::from_millis(140));
        assert!(buf.iter().all(|x| *x == 0.0));
    }
}
