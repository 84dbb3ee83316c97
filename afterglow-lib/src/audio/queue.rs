// Copyright 2026 The Afterglow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapts a push source into a blocking one.  The backend's handler writes into an SPSC ring and
//! bumps a chunk counter.  The DSP thread drains the ring and waits on the counter with a
//! timeout, so it keeps observing shutdown even when the backend goes quiet.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ringbuf::{traits::*, HeapCons, HeapRb};

use super::{AudioFormat, BlockingSource, PushSource};
use crate::sync::TickGate;
use crate::AfterglowError;

/// Ring length in seconds of stereo audio.
const QUEUE_SECONDS: usize = 1;
/// Longest a read waits for the backend before returning short.
const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Shared between the handler and the reader.
struct Shared {
    gate: TickGate,
    /// Samples the handler could not fit.
    dropped: AtomicU64,
}

pub struct SampleQueue {
    source: Box<dyn PushSource>,
    consumer: HeapCons<f32>,
    shared: Arc<Shared>,
    seen: u64,
    /// Samples allowed to pile up beyond one read before the reader skips ahead.
    read_behind: usize,
}

impl SampleQueue {
    pub fn new(mut source: Box<dyn PushSource>) -> Result<Self, AfterglowError> {
        let format = source.format();
        let capacity = (format.sample_rate as usize * super::CHANNELS * QUEUE_SECONDS).max(1024);
        let (mut producer, consumer) = HeapRb::<f32>::new(capacity).split();

        let shared = Arc::new(Shared {
            gate: TickGate::new(),
            dropped: AtomicU64::new(0),
        });
        let handler_shared = shared.clone();
        source.set_handler(Box::new(move |samples: &[f32]| {
            // Whole frames only, so the reader never sees channels swap.
            let room = producer.vacant_len() & !1;
            let take = samples.len().min(room) & !1;
            let written = producer.push_slice(&samples[..take]);
            if written < samples.len() {
                handler_shared
                    .dropped
                    .fetch_add((samples.len() - written) as u64, Ordering::Relaxed);
            }
            // A poisoned gate only means a reader panicked.  Nothing to do from this side.
            let _ = handler_shared.gate.signal();
        }))?;

        Ok(Self {
            source,
            consumer,
            shared,
            seen: 0,
            read_behind: capacity / 8,
        })
    }

    /// Samples the handler dropped because the reader fell behind.
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }
}

impl BlockingSource for SampleQueue {
    fn format(&self) -> AudioFormat {
        self.source.format()
    }

    fn read(&mut self, out: &mut [f32]) -> Result<usize, AfterglowError> {
        let want = out.len() & !1;

        // Far behind the writer means latency the visualizers would show.  Skip to the recent
        // end, keeping whole frames.
        let backlog = self.consumer.occupied_len();
        if backlog > want + self.read_behind {
            let skip = (backlog - want) & !1;
            self.consumer.skip(skip);
            log::trace!("audio queue skipped {skip} samples");
        }

        let mut filled = 0;
        while filled < want {
            filled += self.consumer.pop_slice(&mut out[filled..want]);
            if filled == want {
                break;
            }
            let seen = self.seen;
            match self.shared.gate.wait_timeout(READ_TIMEOUT, |c| c > seen)? {
                Some(count) => self.seen = count,
                None => break,
            }
        }
        Ok(filled & !1)
    }

    fn reconfigure(&mut self, sample_rate: u32) -> Result<AudioFormat, AfterglowError> {
        let format = self.source.reconfigure(sample_rate)?;
        self.consumer.clear();
        Ok(format)
    }

    fn cleanup(&mut self) {
        self.source.cleanup();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::audio::SampleHandler;
    use std::sync::Mutex;

    /// Hands its handler to the test so the test can play backend.
    struct Loopback {
        handler: Arc<Mutex<Option<SampleHandler>>>,
    }

    impl PushSource for Loopback {
        fn format(&self) -> AudioFormat {
            AudioFormat::stereo(8_000)
        }

        fn set_handler(&mut self, handler: SampleHandler) -> Result<(), AfterglowError> {
            *self.handler.lock()? = Some(handler);
            Ok(())
        }

        fn reconfigure(&mut self, _sample_rate: u32) -> Result<AudioFormat, AfterglowError> {
            Ok(self.format())
        }

        fn cleanup(&mut self) {}
    }

    fn loopback() -> (SampleQueue, Arc<Mutex<Option<SampleHandler>>>) {
        let handler = Arc::new(Mutex::new(None));
        let queue = SampleQueue::new(Box::new(Loopback {
            handler: handler.clone(),
        }))
        .unwrap();
        (queue, handler)
    }

    #[test]
    fn test_queue_delivers_in_order() {
        let (mut queue, handler) = loopback();
        let pusher = std::thread::spawn(move || {
            for chunk in 0..4 {
                let samples: Vec<f32> = (0..64).map(|i| (chunk * 64 + i) as f32).collect();
                (handler.lock().unwrap().as_mut().unwrap())(&samples);
                std::thread::sleep(Duration::from_millis(2));
            }
        });
        let mut out = vec![0.0; 256];
        let mut got = 0;
        while got < 256 {
            got += queue.read(&mut out[got..]).unwrap();
        }
        pusher.join().unwrap();
        assert!(out.iter().enumerate().all(|(i, x)| *x == i as f32));
    }

    #[test]
    fn test_queue_read_times_out_short() {
        let (mut queue, _handler) = loopback();
        let mut out = vec![0.0; 32];
        assert_eq!(queue.read(&mut out).unwrap(), 0);
    }

    #[test]
    fn test_queue_skips_backlog() {
        let (mut queue, handler) = loopback();
        // 16000 samples of capacity, read_behind 2000.
        let samples: Vec<f32> = (0..12_000).map(|i| i as f32).collect();
        (handler.lock().unwrap().as_mut().unwrap())(&samples);
        let mut out = vec![0.0; 100];
        assert_eq!(queue.read(&mut out).unwrap(), 100);
        // The most recent samples, not the oldest.
        assert_eq!(out[99], 11_999.0);
        assert_eq!(queue.dropped(), 0);
    }
}
