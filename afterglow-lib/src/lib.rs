// Copyright 2026 The Afterglow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core Afterglow audio analysis and visualizer geometry.
//!
//! Frontends obtain a `DspCore` from a `Config` and an audio `Source`, start its workers, and
//! then read consistent snapshots of everything the visualizers need on every frame:
//!
//! - the mid/side ring of recent samples along with pitch-locked bandpassed and lowpassed copies
//! - raw and smoothed spectra for the main and alternate channels
//! - pitch, loudness, peak and RMS levels
//!
//! The `viz` module turns those snapshots into geometry, `canvas` rasterizes plain geometry, and
//! `phosphor` is the reference implementation of the CRT afterglow that GPU frontends mirror.
//! Nothing in this crate touches a GPU or a window, so alternative frontends can embed the
//! analysis directly.

pub mod audio;
pub mod canvas;
pub mod colors;
pub mod config;
pub mod dsp;
pub mod layout;
pub mod phosphor;
pub mod pipeline;
pub mod ring;
pub mod sync;
pub mod theme;
pub mod viz;

#[cfg(feature = "pipewire")]
use pipewire as pw;

#[derive(thiserror::Error, Debug)]
pub enum AfterglowError {
    #[cfg(feature = "pipewire")]
    #[error("Pipewire: {0}")]
    Pipewire(#[from] pw::Error),
    #[error("thread poisoned")]
    Poison,

    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),
    #[error("config parse: {0}")]
    ConfigParse(#[from] toml::de::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("audio unavailable: {0}")]
    AudioUnavailable(String),
    #[error("audio source error: {0}")]
    AudioSource(String),

    #[error("sample rate changed from {from} to {to}")]
    SampleRateChange { from: u32, to: u32 },
    #[error("size changed from {from} to {to}")]
    SizeChange { from: usize, to: usize },

    #[error("gpu allocation failed: {0}")]
    GpuAllocationFailed(String),

    #[error("fft: {0}")]
    Fft(String),

    #[error("Timeout: {0}")]
    Timeout(&'static str),
}

impl<T> From<std::sync::PoisonError<T>> for AfterglowError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        AfterglowError::Poison
    }
}

impl From<realfft::FftError> for AfterglowError {
    fn from(e: realfft::FftError) -> Self {
        AfterglowError::Fft(e.to_string())
    }
}

pub mod prelude {
    pub use crate::AfterglowError;
    pub use crate::Throttle;
    pub use crate::config::Config;
    pub use crate::pipeline::{DspCore, FrameSnapshot, Workers};
}

/// Rate limiter for log lines that would otherwise repeat every frame.  `ready` returns true at
/// most once per period.
#[derive(Debug)]
pub struct Throttle {
    period: std::time::Duration,
    last: Option<std::time::Instant>,
    suppressed: usize,
}

impl Throttle {
    pub fn new(period: std::time::Duration) -> Self {
        Self {
            period,
            last: None,
            suppressed: 0,
        }
    }

    /// Once per minute, the cadence for repeated resource failures.
    pub fn per_minute() -> Self {
        Self::new(std::time::Duration::from_secs(60))
    }

    /// Returns `Some(suppressed)` when the caller should log, carrying the number of calls that
    /// were swallowed since the last time.
    pub fn ready(&mut self) -> Option<usize> {
        let now = std::time::Instant::now();
        match self.last {
            Some(last) if now.duration_since(last) < self.period => {
                self.suppressed += 1;
                None
            }
            _ => {
                self.last = Some(now);
                Some(std::mem::take(&mut self.suppressed))
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_throttle_suppresses_within_period() {
        let mut t = Throttle::new(std::time::Duration::from_secs(3600));
        assert_eq!(t.ready(), Some(0));
        assert_eq!(t.ready(), None);
        assert_eq!(t.ready(), None);

        let mut t = Throttle::new(std::time::Duration::ZERO);
        assert_eq!(t.ready(), Some(0));
        assert_eq!(t.ready(), Some(0));
    }
}
