// Copyright 2026 The Afterglow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Ring
//!
//! The most recent `N` captured frames, already split into mid and side.  One writer pushes,
//! any number of readers copy out windows of recent history.  Samples live in `AtomicU32` cells
//! holding `f32` bits, so a reader racing the writer sees either the old or the new sample of a
//! slot and never a torn value.  Readers take one `write_pos` per read and only consult slots
//! strictly older than it.
//!
//! `SignalRing` is the single-channel variant used for the derived `bandpassed` and `lowpassed`
//! signals, which the DSP thread writes at arbitrary (delay compensated) indices.

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};

/// Which half of the mid/side pair to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Mid,
    Side,
    /// `mid + side`, reconstructed on read.
    Left,
    /// `mid - side`, reconstructed on read.
    Right,
}

/// Indices `[start, start + len) mod N` of a window of recent samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingView {
    pub start: usize,
    pub len: usize,
    pub capacity: usize,
}

impl RingView {
    /// Ring index of the `i`th sample in the view, oldest first.
    #[inline]
    pub fn index(&self, i: usize) -> usize {
        (self.start + i) & (self.capacity - 1)
    }
}

fn atomic_buffer(n: usize) -> Box<[AtomicU32]> {
    (0..n).map(|_| AtomicU32::new(0f32.to_bits())).collect()
}

pub struct AudioRing {
    mid: Box<[AtomicU32]>,
    side: Box<[AtomicU32]>,
    /// Next slot to be written, always `< N`.
    write_pos: AtomicUsize,
    /// Total frames ever pushed.  Readers diff this across frames to learn how much is new.
    written: AtomicU64,
    mask: usize,
}

impl AudioRing {
    /// `capacity` is rounded up to a power of two.
    pub fn new(capacity: usize) -> Self {
        let n = capacity.max(2).next_power_of_two();
        Self {
            mid: atomic_buffer(n),
            side: atomic_buffer(n),
            write_pos: AtomicUsize::new(0),
            written: AtomicU64::new(0),
            mask: n - 1,
        }
    }

    pub fn capacity(&self) -> usize {
        self.mask + 1
    }

    pub fn write_pos(&self) -> usize {
        self.write_pos.load(Ordering::Acquire)
    }

    pub fn frames_written(&self) -> u64 {
        self.written.load(Ordering::Acquire)
    }

    /// Append interleaved `L,R` frames.  A trailing odd sample is ignored.  Only one thread may
    /// push.  Pushing more than `N` frames overwrites the oldest ones.
    pub fn push(&self, interleaved_lr: &[f32], gain_linear: f32) {
        let frames = interleaved_lr.len() / 2;
        if frames == 0 {
            return;
        }
        // Only the tail matters if the block is longer than the ring.
        let skip = frames.saturating_sub(self.capacity());
        let half_gain = gain_linear * 0.5;
        let mut pos = self.write_pos.load(Ordering::Relaxed);
        pos = (pos + skip) & self.mask;

        let mut chunks = interleaved_lr[skip * 2..frames * 2].chunks_exact(8);
        for chunk in &mut chunks {
            // Four frames at a time.
            let mut mid = [0f32; 4];
            let mut side = [0f32; 4];
            for f in 0..4 {
                let (l, r) = (chunk[2 * f], chunk[2 * f + 1]);
                mid[f] = (l + r) * half_gain;
                side[f] = (l - r) * half_gain;
            }
            for f in 0..4 {
                self.mid[pos].store(mid[f].to_bits(), Ordering::Relaxed);
                self.side[pos].store(side[f].to_bits(), Ordering::Relaxed);
                pos = (pos + 1) & self.mask;
            }
        }
        for frame in chunks.remainder().chunks_exact(2) {
            let (l, r) = (frame[0], frame[1]);
            self.mid[pos].store(((l + r) * half_gain).to_bits(), Ordering::Relaxed);
            self.side[pos].store(((l - r) * half_gain).to_bits(), Ordering::Relaxed);
            pos = (pos + 1) & self.mask;
        }

        self.write_pos.store(pos, Ordering::Release);
        self.written.fetch_add(frames as u64, Ordering::AcqRel);
    }

    /// Indices of the most recent `length` samples as of now.  `length` is clamped to `N`.
    pub fn snapshot_view(&self, length: usize) -> RingView {
        self.view_at(self.write_pos(), length)
    }

    /// Indices of the `length` samples preceding `write_pos`.
    pub fn view_at(&self, write_pos: usize, length: usize) -> RingView {
        let len = length.min(self.capacity());
        RingView {
            start: (write_pos + self.capacity() - len) & self.mask,
            len,
            capacity: self.capacity(),
        }
    }

    #[inline]
    fn load(cells: &[AtomicU32], i: usize) -> f32 {
        f32::from_bits(cells[i].load(Ordering::Relaxed))
    }

    /// Sample at ring index `i` of `channel`.
    #[inline]
    pub fn sample(&self, channel: Channel, i: usize) -> f32 {
        let i = i & self.mask;
        match channel {
            Channel::Mid => Self::load(&self.mid, i),
            Channel::Side => Self::load(&self.side, i),
            Channel::Left => Self::load(&self.mid, i) + Self::load(&self.side, i),
            Channel::Right => Self::load(&self.mid, i) - Self::load(&self.side, i),
        }
    }

    /// Copy the samples of `view` into `out`, oldest first.  `out` shorter than the view takes
    /// the view's oldest samples.
    pub fn copy_view(&self, channel: Channel, view: RingView, out: &mut [f32]) {
        out.iter_mut()
            .take(view.len)
            .enumerate()
            .for_each(|(i, o)| *o = self.sample(channel, view.index(i)));
    }

    /// Copy the most recent `out.len()` samples of `channel`, oldest first, and return the
    /// `write_pos` the copy was taken against.
    pub fn copy_recent(&self, channel: Channel, out: &mut [f32]) -> usize {
        let write_pos = self.write_pos();
        let view = self.view_at(write_pos, out.len());
        self.copy_view(channel, view, out);
        write_pos
    }

    /// Copy the most recent frames back into interleaved `L,R` pairs.
    pub fn copy_recent_lr(&self, out: &mut [f32]) -> usize {
        let write_pos = self.write_pos();
        let view = self.view_at(write_pos, out.len() / 2);
        out.chunks_exact_mut(2).enumerate().for_each(|(i, lr)| {
            let idx = view.index(i);
            let (m, s) = (Self::load(&self.mid, idx), Self::load(&self.side, idx));
            lr[0] = m + s;
            lr[1] = m - s;
        });
        write_pos
    }

    /// Zero everything, e.g. after a sample-rate change.
    pub fn clear(&self) {
        self.mid
            .iter()
            .chain(self.side.iter())
            .for_each(|c| c.store(0f32.to_bits(), Ordering::Relaxed));
    }
}

/// Single channel of derived samples, indexed like `AudioRing`.
pub struct SignalRing {
    cells: Box<[AtomicU32]>,
    mask: usize,
}

impl SignalRing {
    pub fn new(capacity: usize) -> Self {
        let n = capacity.max(2).next_power_of_two();
        Self {
            cells: atomic_buffer(n),
            mask: n - 1,
        }
    }

    pub fn capacity(&self) -> usize {
        self.mask + 1
    }

    #[inline]
    pub fn store(&self, i: usize, value: f32) {
        self.cells[i & self.mask].store(value.to_bits(), Ordering::Relaxed);
    }

    #[inline]
    pub fn get(&self, i: usize) -> f32 {
        f32::from_bits(self.cells[i & self.mask].load(Ordering::Relaxed))
    }

    pub fn copy_view(&self, view: RingView, out: &mut [f32]) {
        out.iter_mut()
            .take(view.len)
            .enumerate()
            .for_each(|(i, o)| *o = self.get(view.index(i)));
    }

    pub fn clear(&self) {
        self.cells
            .iter()
            .for_each(|c| c.store(0f32.to_bits(), Ordering::Relaxed));
    }
}
