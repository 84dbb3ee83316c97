// Copyright 2026 The Afterglow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Audio Sources
//!
//! Everything the DSP thread reads from delivers interleaved stereo `f32` frames at a known
//! sample rate.  Backends come in two shapes:
//!
//! - `BlockingSource`: the DSP thread calls `read` and blocks until a buffer is available.
//! - `PushSource`: the backend owns the thread and calls a handler with every buffer it gets.
//!
//! `Source::into_blocking` adapts a push source through a `SampleQueue`, so the DSP thread only
//! ever sees the blocking shape.
//!
//! Backends are tried in `auto` order for the platform.  When none of them opens, the
//! visualizer runs on silence rather than failing.

#[cfg(feature = "pipewire")]
pub mod pipewire;
mod queue;
mod synthetic;

use crate::config::{AudioConfig, Engine};
use crate::AfterglowError;

pub use queue::SampleQueue;
pub use synthetic::{SilentBackend, SilentSource, ToneBackend, ToneSource};

/// Channels every source delivers.
pub const CHANNELS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioFormat {
    pub fn stereo(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            channels: CHANNELS as u16,
        }
    }
}

/// Called by push sources with interleaved `L,R` samples.
pub type SampleHandler = Box<dyn FnMut(&[f32]) + Send>;

pub trait BlockingSource: Send {
    fn format(&self) -> AudioFormat;

    /// Fill `out` with interleaved frames.  Returns the number of samples written, which is
    /// always even and may be short when the source has nothing for a while.
    fn read(&mut self, out: &mut [f32]) -> Result<usize, AfterglowError>;

    /// Reopen at a new sample rate.  Returns the format actually obtained.
    fn reconfigure(&mut self, sample_rate: u32) -> Result<AudioFormat, AfterglowError>;

    /// Release backend resources.  Safe to call more than once.
    fn cleanup(&mut self);
}

pub trait PushSource: Send {
    /// May change after the backend negotiates with the server.
    fn format(&self) -> AudioFormat;

    /// Install the handler and start delivering.
    fn set_handler(&mut self, handler: SampleHandler) -> Result<(), AfterglowError>;

    fn reconfigure(&mut self, sample_rate: u32) -> Result<AudioFormat, AfterglowError>;

    fn cleanup(&mut self);
}

pub enum Source {
    Blocking(Box<dyn BlockingSource>),
    PushBased(Box<dyn PushSource>),
}

impl Source {
    pub fn format(&self) -> AudioFormat {
        match self {
            Source::Blocking(s) => s.format(),
            Source::PushBased(s) => s.format(),
        }
    }

    /// The shape the DSP thread reads from.
    pub fn into_blocking(self) -> Result<Box<dyn BlockingSource>, AfterglowError> {
        match self {
            Source::Blocking(s) => Ok(s),
            Source::PushBased(s) => Ok(Box::new(SampleQueue::new(s)?)),
        }
    }
}

pub trait Backend {
    fn name(&self) -> &'static str;

    /// Device names `open` accepts.
    fn enumerate(&self) -> Result<Vec<String>, AfterglowError>;

    /// `None` picks the backend's default device.
    fn open(&self, device: Option<&str>, sample_rate: u32) -> Result<Source, AfterglowError>;
}

/// Stand-in for backends this build does not carry.
struct Unavailable(&'static str);

impl Backend for Unavailable {
    fn name(&self) -> &'static str {
        self.0
    }

    fn enumerate(&self) -> Result<Vec<String>, AfterglowError> {
        Err(self.missing())
    }

    fn open(&self, _device: Option<&str>, _sample_rate: u32) -> Result<Source, AfterglowError> {
        Err(self.missing())
    }
}

impl Unavailable {
    fn missing(&self) -> AfterglowError {
        AfterglowError::AudioUnavailable(format!(
            "{} support is not built into this binary",
            self.0
        ))
    }
}

fn pipewire_backend() -> Box<dyn Backend> {
    #[cfg(feature = "pipewire")]
    {
        Box::new(pipewire::PipewireBackend)
    }
    #[cfg(not(feature = "pipewire"))]
    {
        Box::new(Unavailable("pipewire"))
    }
}

fn backend_for(engine: Engine, audio: &AudioConfig) -> Box<dyn Backend> {
    match engine {
        Engine::Pipewire => pipewire_backend(),
        Engine::Pulseaudio => Box::new(Unavailable("pulseaudio")),
        Engine::Wasapi => Box::new(Unavailable("wasapi")),
        Engine::Tone => Box::new(ToneBackend {
            hz: audio.tone_hz,
            db: audio.tone_db,
        }),
        Engine::Silent | Engine::Auto => Box::new(SilentBackend),
    }
}

/// Capture engines tried by `auto` on this platform, best first.
pub fn auto_order() -> &'static [Engine] {
    if cfg!(target_os = "windows") {
        &[Engine::Wasapi]
    } else if cfg!(target_os = "linux") {
        &[Engine::Pipewire, Engine::Pulseaudio]
    } else {
        &[Engine::Pulseaudio]
    }
}

/// Backends to try for the configured engine, in order.
pub fn backends(audio: &AudioConfig) -> Vec<Box<dyn Backend>> {
    match audio.engine {
        Engine::Auto => auto_order()
            .iter()
            .map(|e| backend_for(*e, audio))
            .collect(),
        engine => vec![backend_for(engine, audio)],
    }
}

/// Open the configured source.  Every failure is logged once and the next backend is tried.
/// Falls back to silence when nothing opens.
pub fn open_source(audio: &AudioConfig) -> Source {
    for backend in backends(audio) {
        match backend.open(audio.device.as_deref(), audio.sample_rate) {
            Ok(source) => {
                let format = source.format();
                log::info!(
                    "audio: {} at {} Hz, {} channels",
                    backend.name(),
                    format.sample_rate,
                    format.channels
                );
                return source;
            }
            Err(e) => log::warn!("audio backend {} failed: {e}", backend.name()),
        }
    }
    log::warn!("no audio backend available, running on silence");
    Source::Blocking(Box::new(SilentSource::new(audio.sample_rate)))
}

/// Device names per backend, for `--list-devices`.  Backends that are unavailable carry their
/// error instead.
pub fn list_devices(audio: &AudioConfig) -> Vec<(&'static str, Result<Vec<String>, AfterglowError>)> {
    let mut engines: Vec<Engine> = auto_order().to_vec();
    engines.extend([Engine::Tone, Engine::Silent]);
    engines
        .into_iter()
        .map(|e| {
            let backend = backend_for(e, audio);
            (backend.name(), backend.enumerate())
        })
        .collect()
}
