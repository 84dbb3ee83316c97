// Copyright 2026 The Afterglow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Spectrum Smoothing
//!
//! Each bin chases its raw magnitude in dB at a bounded speed, rising faster than it falls so
//! transients register immediately while the decay stays readable.  Working in dB keeps the
//! motion uniform across quiet and loud bins.
//!
//! The result never drops below a floor that tilts with the configured slope, so once the
//! visualizer applies its dB-per-octave gain the floor lands exactly on the `min_db` line.

use aligned::{A32, Aligned};

use super::{EPSILON, TILT_REFERENCE_HZ};

/// Lane width of the grouped path.
const LANES: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmoothingParams {
    pub enabled: bool,
    /// dB per second.
    pub rise_speed: f32,
    /// dB per second.
    pub fall_speed: f32,
    /// dB per second, replacing `fall_speed` while the pointer hovers the spectrum.
    pub hover_fall_speed: f32,
    pub min_db: f32,
    pub slope_db_per_oct: f32,
}

impl SmoothingParams {
    /// Slope exponent, `slope / (20·log10 2)`.
    pub fn slope_k(&self) -> f32 {
        self.slope_db_per_oct / (20.0 * 2f32.log10())
    }
}

/// Floor for a bin at `freq`: `min_value · (f_ref / f)^k`.
pub fn floor_at(freq: f32, min_db: f32, slope_k: f32) -> f32 {
    let min_value = 10f32.powf(min_db / 20.0);
    min_value * (TILT_REFERENCE_HZ / freq.max(1.0)).powf(slope_k)
}

#[inline]
fn to_db(x: f32) -> f32 {
    20.0 * (x + EPSILON).log10()
}

#[inline]
fn from_db(db: f32) -> f32 {
    10f32.powf(db / 20.0)
}

/// One bin, one step.
#[inline]
fn step(raw: f32, prev: f32, rise: f32, fall: f32, floor: f32) -> f32 {
    let cur_db = to_db(raw);
    let prev_db = to_db(prev);
    let diff = cur_db - prev_db;
    let speed = if diff > 0.0 { rise } else { fall };
    let db = if diff.abs() <= speed {
        cur_db
    } else if diff > 0.0 {
        prev_db + speed
    } else {
        prev_db - speed
    };
    from_db(db).max(floor)
}

/// Smoothed state for one channel.
#[derive(Debug, Clone, Default)]
pub struct Smoother {
    floor: Vec<f32>,
    /// Frequencies the floor was computed for.
    floor_freqs: Vec<f32>,
    /// `min_db` and slope bits the floor was computed for, `None` before the first apply.
    floor_params: Option<(u32, u32)>,
}

impl Smoother {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn floor(&self) -> &[f32] {
        &self.floor
    }

    fn ensure_floor(&mut self, freqs: &[f32], params: &SmoothingParams) {
        let key = (params.min_db.to_bits(), params.slope_db_per_oct.to_bits());
        if self.floor_params == Some(key) && self.floor_freqs == freqs {
            return;
        }
        let k = params.slope_k();
        self.floor.clear();
        self.floor
            .extend(freqs.iter().map(|f| floor_at(*f, params.min_db, k)));
        self.floor_freqs.clear();
        self.floor_freqs.extend_from_slice(freqs);
        self.floor_params = Some(key);
    }

    /// Advance `smoothed` toward `raw` by `dt` seconds.  `smoothed` is reinitialized to the floor
    /// when its length does not match.
    pub fn apply(
        &mut self,
        freqs: &[f32],
        raw: &[f32],
        smoothed: &mut Vec<f32>,
        params: &SmoothingParams,
        dt: f32,
        hovering: bool,
    ) {
        self.ensure_floor(freqs, params);
        if smoothed.len() != raw.len() {
            smoothed.clear();
            smoothed.extend_from_slice(&self.floor[..raw.len().min(self.floor.len())]);
            smoothed.resize(raw.len(), 0.0);
        }

        if !params.enabled {
            for ((s, r), f) in smoothed.iter_mut().zip(raw).zip(&self.floor) {
                *s = r.max(*f);
            }
            return;
        }

        let rise = params.rise_speed * dt;
        let fall = if hovering {
            params.hover_fall_speed
        } else {
            params.fall_speed
        } * dt;
        smooth_lanes(raw, smoothed, &self.floor, rise, fall);
    }
}

/// Reference path, one bin at a time.
pub fn smooth_scalar(raw: &[f32], smoothed: &mut [f32], floor: &[f32], rise: f32, fall: f32) {
    for ((s, r), f) in smoothed.iter_mut().zip(raw).zip(floor) {
        *s = step(*r, *s, rise, fall, *f);
    }
}

/// Eight bins per group through aligned lanes, tail through `step`.  Every lane runs the same
/// operations in the same order as `step`, so results are bit identical to `smooth_scalar`.
pub fn smooth_lanes(raw: &[f32], smoothed: &mut [f32], floor: &[f32], rise: f32, fall: f32) {
    let n = raw.len().min(smoothed.len()).min(floor.len());
    let groups = n / LANES;

    let mut cur: Aligned<A32, [f32; LANES]> = Aligned([0.0; LANES]);
    let mut prev: Aligned<A32, [f32; LANES]> = Aligned([0.0; LANES]);
    for g in 0..groups {
        let base = g * LANES;
        for l in 0..LANES {
            cur[l] = to_db(raw[base + l]);
            prev[l] = to_db(smoothed[base + l]);
        }
        for l in 0..LANES {
            let diff = cur[l] - prev[l];
            let speed = if diff > 0.0 { rise } else { fall };
            cur[l] = if diff.abs() <= speed {
                cur[l]
            } else if diff > 0.0 {
                prev[l] + speed
            } else {
                prev[l] - speed
            };
        }
        for l in 0..LANES {
            smoothed[base + l] = from_db(cur[l]).max(floor[base + l]);
        }
    }

    let tail = groups * LANES;
    smooth_scalar(
        &raw[tail..n],
        &mut smoothed[tail..n],
        &floor[tail..n],
        rise,
        fall,
    );
}

#[cfg(test)]
mod test {
    use super::*;

    fn params() -> SmoothingParams {
        SmoothingParams {
            enabled: true,
            rise_speed: 500.0,
            fall_speed: 60.0,
            hover_fall_speed: 10.0,
            min_db: -96.0,
            slope_db_per_oct: 3.0,
        }
    }

    fn freqs(n: usize) -> Vec<f32> {
        (0..n).map(|k| k as f32 * 48_000.0 / 4096.0).collect()
    }

    fn noise(n: usize, seed: u32) -> Vec<f32> {
        let mut s = seed;
        (0..n)
            .map(|_| {
                s ^= s << 13;
                s ^= s >> 17;
                s ^= s << 5;
                (s as f32 / u32::MAX as f32).powi(3)
            })
            .collect()
    }

    #[test]
    fn test_smooth_lanes_bit_identical_to_scalar() {
        let n = 2049;
        let floor = vec![1e-6; n];
        let mut a = noise(n, 1);
        let mut b = a.clone();
        for seed in 2..20 {
            let raw = noise(n, seed);
            smooth_lanes(&raw, &mut a, &floor, 500.0 / 60.0, 60.0 / 60.0);
            smooth_scalar(&raw, &mut b, &floor, 500.0 / 60.0, 60.0 / 60.0);
            assert!(a.iter().zip(&b).all(|(x, y)| x.to_bits() == y.to_bits()));
        }
    }

    #[test]
    fn test_smooth_step_is_bounded() {
        let p = params();
        let dt = 1.0 / 60.0;
        let f = freqs(257);
        let mut sm = Smoother::new();
        let mut smoothed = vec![0.5; 257];
        let raw_up = vec![1.0; 257];
        let raw_down = vec![1e-4; 257];

        // Start from a known level above the floor.
        smoothed.iter_mut().for_each(|s| *s = 0.01);
        let before: Vec<f32> = smoothed.clone();
        sm.apply(&f, &raw_up, &mut smoothed, &p, dt, false);
        for (b, a) in before.iter().zip(&smoothed) {
            let step = to_db(*a) - to_db(*b);
            assert!(step <= p.rise_speed * dt + 1e-3, "rise step {step}");
        }

        let before: Vec<f32> = smoothed.clone();
        sm.apply(&f, &raw_down, &mut smoothed, &p, dt, false);
        for (b, a) in before.iter().zip(&smoothed) {
            let step = to_db(*b) - to_db(*a);
            assert!(step <= p.fall_speed * dt + 1e-3, "fall step {step}");
        }

        // Hover slows the fall.
        let before: Vec<f32> = smoothed.clone();
        sm.apply(&f, &raw_down, &mut smoothed, &p, dt, true);
        let step = to_db(before[100]) - to_db(smoothed[100]);
        assert!((step - p.hover_fall_speed * dt).abs() < 1e-3, "hover step {step}");
    }

    #[test]
    fn test_smooth_converges_to_constant_raw() {
        let p = params();
        let dt = 1.0 / 60.0;
        let f = freqs(129);
        let raw = noise(129, 7)
            .into_iter()
            .map(|x| x.max(1e-3))
            .collect::<Vec<f32>>();
        let mut sm = Smoother::new();
        let mut smoothed = Vec::new();
        // 10 · 96 dB / 500 dB/s ≈ 2 s
        for _ in 0..(2.0 / dt) as usize * 10 {
            sm.apply(&f, &raw, &mut smoothed, &p, dt, false);
        }
        for ((s, r), fl) in smoothed.iter().zip(&raw).zip(sm.floor()) {
            let expect = r.max(*fl);
            assert!((to_db(*s) - to_db(expect)).abs() < 0.1);
        }
    }

    #[test]
    fn test_floor_follows_inputs_in_place() {
        let mut p = params();
        let f = freqs(65);
        let raw = vec![0.0; 65];
        let mut sm = Smoother::new();
        let mut smoothed = Vec::new();
        sm.apply(&f, &raw, &mut smoothed, &p, 1.0 / 60.0, false);
        let first = sm.floor().to_vec();
        let buffers = (sm.floor.as_ptr(), sm.floor_freqs.as_ptr());

        sm.apply(&f, &raw, &mut smoothed, &p, 1.0 / 60.0, false);
        assert_eq!(sm.floor(), first.as_slice());

        // New frequencies of the same count rebuild the floor in the same storage.
        let doubled: Vec<f32> = f.iter().map(|x| x * 2.0).collect();
        sm.apply(&doubled, &raw, &mut smoothed, &p, 1.0 / 60.0, false);
        assert_ne!(sm.floor(), first.as_slice());
        assert_eq!(buffers, (sm.floor.as_ptr(), sm.floor_freqs.as_ptr()));
        assert_eq!(sm.floor_freqs, doubled);

        p.min_db = -80.0;
        sm.apply(&doubled, &raw, &mut smoothed, &p, 1.0 / 60.0, false);
        // 16 dB up outweighs the octave of tilt.
        assert!(sm.floor()[1] > first[1]);
    }

    #[test]
    fn test_smooth_initializes_to_floor() {
        let p = params();
        let f = freqs(65);
        let mut sm = Smoother::new();
        let mut smoothed = Vec::new();
        sm.apply(&f, &vec![0.0; 65], &mut smoothed, &p, 1.0 / 60.0, false);
        assert_eq!(smoothed.as_slice(), sm.floor());
        // The floor at 880 Hz is the min_db line itself.
        let at_ref = floor_at(880.0, -96.0, p.slope_k());
        assert!((20.0 * at_ref.log10() + 96.0).abs() < 1e-3);
        // And decreases with frequency for a positive slope.
        assert!(sm.floor().windows(2).skip(1).all(|w| w[1] < w[0]));
    }
}
