// Copyright 2026 The Afterglow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Synchronization
//!
//! Small primitives the workers hand data across with.
//!
//! - `TickGate`: a counter behind a mutex with a condition variable.  Producers `signal` to bump
//!   the counter, consumers wait for a predicate over it.  Every predicate also watches the shared
//!   `running` flag, and `wake` exists so shutdown cannot slip between a predicate check and the
//!   wait.
//! - `AtomicF32`: f32 bits in an `AtomicU32`, for values one thread publishes and others poll.
//! - `SpectrumSlot`: the last completed spectrum behind a short mutex plus a generation counter,
//!   so the render thread can skip copying when nothing changed.

use std::sync::{
    atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering},
    Condvar, Mutex,
};
use std::time::Duration;

use crate::dsp::pitch::Pitch;
use crate::dsp::spectral::Spectrum;
use crate::AfterglowError;

pub struct TickGate {
    /// The lock payload is the number of signals so far.
    count: Mutex<u64>,
    ready: Condvar,
}

impl Default for TickGate {
    fn default() -> Self {
        Self::new()
    }
}

impl TickGate {
    pub fn new() -> Self {
        Self {
            count: Mutex::new(0),
            ready: Condvar::new(),
        }
    }

    /// Bump the counter and wake every waiter.  Returns the new count.
    pub fn signal(&self) -> Result<u64, AfterglowError> {
        let mut count = self.count.lock()?;
        *count += 1;
        let now = *count;
        drop(count);
        self.ready.notify_all();
        Ok(now)
    }

    /// Wake every waiter without counting, so they re-check predicates that depend on other
    /// state, such as the `running` flag.
    pub fn wake(&self) -> Result<(), AfterglowError> {
        // Taking the lock orders this wake after any in-progress predicate check.
        let _count = self.count.lock()?;
        self.ready.notify_all();
        Ok(())
    }

    pub fn count(&self) -> Result<u64, AfterglowError> {
        Ok(*self.count.lock()?)
    }

    /// Block until `pred(count)` holds, then return the count.
    pub fn wait_until<F>(&self, mut pred: F) -> Result<u64, AfterglowError>
    where
        F: FnMut(u64) -> bool,
    {
        let mut count = self.count.lock()?;
        while !pred(*count) {
            count = self.ready.wait(count)?;
        }
        Ok(*count)
    }

    /// Like `wait_until`, but gives up after `timeout` and returns `None`.
    pub fn wait_timeout<F>(&self, timeout: Duration, mut pred: F) -> Result<Option<u64>, AfterglowError>
    where
        F: FnMut(u64) -> bool,
    {
        let count = self.count.lock()?;
        let (count, result) = self
            .ready
            .wait_timeout_while(count, timeout, |c| !pred(*c))?;
        if result.timed_out() && !pred(*count) {
            return Ok(None);
        }
        Ok(Some(*count))
    }

    /// Wait for a signal newer than `seen` or for `running` to drop.  Returns the new count, or
    /// `None` on shutdown.
    pub fn wait_newer(&self, seen: u64, running: &AtomicBool) -> Result<Option<u64>, AfterglowError> {
        let count = self.wait_until(|c| c > seen || !running.load(Ordering::Acquire))?;
        if running.load(Ordering::Acquire) {
            Ok(Some(count))
        } else {
            Ok(None)
        }
    }
}

/// An f32 that can be shared without a lock.
#[derive(Debug)]
pub struct AtomicF32(AtomicU32);

impl AtomicF32 {
    pub fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    #[inline]
    pub fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Acquire))
    }

    #[inline]
    pub fn store(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Release);
    }
}

/// The tracked pitch.  Written only by the main FFT worker.  A reader may pair a new `hz` with the
/// previous `db`, which the visualizers tolerate.
#[derive(Debug)]
pub struct PitchState {
    hz: AtomicF32,
    db: AtomicF32,
}

impl Default for PitchState {
    fn default() -> Self {
        Self {
            hz: AtomicF32::new(0.0),
            db: AtomicF32::new(f32::NEG_INFINITY),
        }
    }
}

impl PitchState {
    pub fn store(&self, pitch: Pitch) {
        self.db.store(pitch.db);
        self.hz.store(pitch.hz);
    }

    pub fn load(&self) -> Pitch {
        Pitch {
            hz: self.hz.load(),
            db: self.db.load(),
        }
    }

    /// Zero `hz` reads as "no pitch".
    pub fn clear(&self) {
        self.store(Pitch {
            hz: 0.0,
            db: f32::NEG_INFINITY,
        });
    }
}

/// Meter readings published once per DSP tick.
#[derive(Debug)]
pub struct LevelState {
    pub peak_left: AtomicF32,
    pub peak_right: AtomicF32,
    pub rms: AtomicF32,
    pub lufs: AtomicF32,
}

impl Default for LevelState {
    fn default() -> Self {
        Self {
            peak_left: AtomicF32::new(0.0),
            peak_right: AtomicF32::new(0.0),
            rms: AtomicF32::new(0.0),
            lufs: AtomicF32::new(f32::NEG_INFINITY),
        }
    }
}

/// Plain copy of `LevelState`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Levels {
    pub peak_left: f32,
    pub peak_right: f32,
    pub rms: f32,
    pub lufs: f32,
}

impl Default for Levels {
    fn default() -> Self {
        Self {
            peak_left: 0.0,
            peak_right: 0.0,
            rms: 0.0,
            lufs: f32::NEG_INFINITY,
        }
    }
}

impl LevelState {
    pub fn store(&self, levels: Levels) {
        self.peak_left.store(levels.peak_left);
        self.peak_right.store(levels.peak_right);
        self.rms.store(levels.rms);
        self.lufs.store(levels.lufs);
    }

    pub fn load(&self) -> Levels {
        Levels {
            peak_left: self.peak_left.load(),
            peak_right: self.peak_right.load(),
            rms: self.rms.load(),
            lufs: self.lufs.load(),
        }
    }
}

/// The last completed spectrum pass of one channel.
#[derive(Default)]
pub struct SpectrumSlot {
    spectrum: Mutex<Spectrum>,
    generation: AtomicU64,
}

impl SpectrumSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy `spectrum` in, reusing the slot's allocations.
    pub fn publish(&self, spectrum: &Spectrum) -> Result<u64, AfterglowError> {
        let mut slot = self.spectrum.lock()?;
        slot.clone_from(spectrum);
        // Bumped under the lock so a reader never sees a generation ahead of the data.
        Ok(self.generation.fetch_add(1, Ordering::AcqRel) + 1)
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Copy the slot into `out` when it is newer than `seen`.  Returns the generation `out` now
    /// holds.
    pub fn read_newer(&self, seen: u64, out: &mut Spectrum) -> Result<u64, AfterglowError> {
        if self.generation() == seen {
            return Ok(seen);
        }
        let slot = self.spectrum.lock()?;
        out.clone_from(&slot);
        Ok(self.generation.load(Ordering::Acquire))
    }

    /// Drop the contents, for example when the analysis shape changes.
    pub fn clear(&self) -> Result<(), AfterglowError> {
        let mut slot = self.spectrum.lock()?;
        *slot = Spectrum::default();
        self.generation.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_tick_gate_wakes_waiter() {
        let gate = Arc::new(TickGate::new());
        let running = Arc::new(AtomicBool::new(true));
        let waiter = {
            let gate = gate.clone();
            let running = running.clone();
            std::thread::spawn(move || gate.wait_newer(0, &running))
        };
        gate.signal().unwrap();
        assert_eq!(waiter.join().unwrap().unwrap(), Some(1));
    }

    #[test]
    fn test_tick_gate_shutdown_releases_waiters() {
        let gate = Arc::new(TickGate::new());
        let running = Arc::new(AtomicBool::new(true));
        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let gate = gate.clone();
                let running = running.clone();
                std::thread::spawn(move || gate.wait_newer(100, &running))
            })
            .collect();
        std::thread::sleep(Duration::from_millis(10));
        running.store(false, Ordering::Release);
        gate.wake().unwrap();
        for w in waiters {
            assert_eq!(w.join().unwrap().unwrap(), None);
        }
    }

    #[test]
    fn test_tick_gate_timeout() {
        let gate = TickGate::new();
        let got = gate
            .wait_timeout(Duration::from_millis(5), |c| c > 0)
            .unwrap();
        assert_eq!(got, None);
        gate.signal().unwrap();
        let got = gate
            .wait_timeout(Duration::from_millis(5), |c| c > 0)
            .unwrap();
        assert_eq!(got, Some(1));
    }

    #[test]
    fn test_spectrum_slot_generations() {
        let slot = SpectrumSlot::new();
        let mut out = Spectrum::default();
        assert_eq!(slot.read_newer(0, &mut out).unwrap(), 0);

        let spectrum = Spectrum {
            freqs: vec![0.0, 10.0],
            raw: vec![1.0, 2.0],
            smoothed: vec![1.0, 2.0],
            phase: vec![0.0, 0.5],
        };
        assert_eq!(slot.publish(&spectrum).unwrap(), 1);
        let seen = slot.read_newer(0, &mut out).unwrap();
        assert_eq!(seen, 1);
        assert_eq!(out, spectrum);

        // Nothing new, nothing copied.
        out.raw[0] = 42.0;
        assert_eq!(slot.read_newer(seen, &mut out).unwrap(), 1);
        assert_eq!(out.raw[0], 42.0);
    }

    #[test]
    fn test_pitch_state_round_trip() {
        let p = PitchState::default();
        assert_eq!(p.load().hz, 0.0);
        p.store(Pitch { hz: 440.0, db: -6.0 });
        assert_eq!(p.load(), Pitch { hz: 440.0, db: -6.0 });
        p.clear();
        assert_eq!(p.load().hz, 0.0);
    }
}
