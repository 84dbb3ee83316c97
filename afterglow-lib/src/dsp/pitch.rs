// Copyright 2026 The Afterglow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Pitch
//!
//! The pitch is the strongest bin of the main spectrum, refined by fitting a parabola through it
//! and its neighbors in dB.  Picking happens on the slope-tilted spectrum, the same one the
//! analyzer draws, so the tracked pitch is the peak the viewer sees.  The refinement uses the raw
//! dB values.

use crate::config::Key;

use super::{amplitude_to_db, TILT_REFERENCE_HZ};

/// How bin indices map to frequency.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinScale {
    /// STFT, `bin_hz = fs / M`.
    Linear { bin_hz: f32 },
    /// CQT, `f_k = min_freq · 2^(k / bins_per_octave)`.
    Log { min_freq: f32, bins_per_octave: f32 },
}

impl BinScale {
    /// Frequency at a fractional bin.
    pub fn freq_at(&self, bin: f32) -> f32 {
        match *self {
            Self::Linear { bin_hz } => bin * bin_hz,
            Self::Log {
                min_freq,
                bins_per_octave,
            } => (min_freq.log2() + bin / bins_per_octave).exp2(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchSearch {
    pub min_freq: f32,
    pub max_freq: f32,
    pub slope_db_per_oct: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pitch {
    pub hz: f32,
    pub db: f32,
}

/// Vertex of the parabola through `(-1, y1)`, `(0, y2)`, `(1, y3)`, as `(offset, height)`.  The
/// offset is clamped to half a bin.
pub fn parabolic_peak(y1: f32, y2: f32, y3: f32) -> (f32, f32) {
    let denom = y1 - 2.0 * y2 + y3;
    if denom.abs() < f32::EPSILON {
        return (0.0, y2);
    }
    let offset = (0.5 * (y1 - y3) / denom).clamp(-0.5, 0.5);
    (offset, y2 - 0.25 * (y1 - y3) * offset)
}

/// Estimate the fundamental from one spectrum pass.  `None` when no bin falls inside the search
/// range.
pub fn estimate(freqs: &[f32], raw: &[f32], scale: BinScale, search: &PitchSearch) -> Option<Pitch> {
    let n = raw.len().min(freqs.len());
    let tilt = search.slope_db_per_oct;

    let (peak, _) = (0..n)
        .filter(|k| {
            let f = freqs[*k];
            f > 0.0 && f >= search.min_freq && f <= search.max_freq
        })
        .map(|k| {
            let tilted = amplitude_to_db(raw[k]) + tilt * (freqs[k] / TILT_REFERENCE_HZ).log2();
            (k, tilted)
        })
        .fold(None, |best: Option<(usize, f32)>, (k, db)| match best {
            Some((_, b)) if b >= db => best,
            _ => Some((k, db)),
        })?;

    let y2 = amplitude_to_db(raw[peak]);
    let (offset, db) = if peak > 0 && peak + 1 < n {
        parabolic_peak(
            amplitude_to_db(raw[peak - 1]),
            y2,
            amplitude_to_db(raw[peak + 1]),
        )
    } else {
        (0.0, y2)
    };

    Some(Pitch {
        hz: scale.freq_at(peak as f32 + offset),
        db,
    })
}

const SHARP_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];
const FLAT_NAMES: [&str; 12] = [
    "C", "Db", "D", "Eb", "E", "F", "Gb", "G", "Ab", "A", "Bb", "B",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Note {
    pub name: &'static str,
    pub octave: i32,
    pub cents: i32,
}

impl Note {
    /// Placeholder for silence and anything outside the MIDI range.
    pub const NONE: Note = Note {
        name: "-",
        octave: 0,
        cents: 0,
    };

    pub fn from_hz(hz: f32, key: Key) -> Note {
        if !(hz > 0.0) {
            return Self::NONE;
        }
        let midi = 69.0 + 12.0 * (hz / 440.0).log2();
        if !(0.0..=127.0).contains(&midi) {
            return Self::NONE;
        }
        let nearest = midi.round();
        let names = match key {
            Key::Sharp => &SHARP_NAMES,
            Key::Flat => &FLAT_NAMES,
        };
        let index = (nearest as i32 + 1200) % 12;
        Note {
            name: names[index as usize],
            octave: nearest as i32 / 12 - 1,
            cents: ((midi - nearest) * 100.0).round() as i32,
        }
    }
}

impl std::fmt::Display for Note {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.name == "-" {
            return write!(f, "-");
        }
        write!(f, "{}{} {:+}", self.name, self.octave, self.cents)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::dsp::sine_gen;
    use crate::dsp::spectral::{SpectralEngine, SpectralShape, Spectrum};

    fn spectrum_of(samples: &[f32], size: usize) -> (SpectralEngine, Spectrum) {
        let mut engine = SpectralEngine::new(SpectralShape {
            size,
            sample_rate: 48_000,
            cqt: None,
        })
        .unwrap();
        let mut out = Spectrum::default();
        engine.process(samples, &mut out).unwrap();
        (engine, out)
    }

    fn search() -> PitchSearch {
        PitchSearch {
            min_freq: 20.0,
            max_freq: 20_000.0,
            slope_db_per_oct: 3.0,
        }
    }

    #[test]
    fn test_parabolic_peak_symmetric() {
        assert_eq!(parabolic_peak(-10.0, 0.0, -10.0), (0.0, 0.0));
        let (offset, _) = parabolic_peak(-4.0, 0.0, -12.0);
        assert!(offset < 0.0 && offset >= -0.5);
        // Flat top does not divide by zero.
        assert_eq!(parabolic_peak(1.0, 1.0, 1.0), (0.0, 1.0));
    }

    #[test]
    fn test_pitch_sweep_accuracy() {
        let size = 4096;
        let bin_hz = 48_000.0 / size as f32;
        for f in [100.0f64, 440.0, 1000.0, 3333.3, 12_000.0, 21_000.0] {
            let samples: Vec<f32> = sine_gen(f, 48_000.0).take(size).map(|x| x * 0.5).collect();
            let (_, spec) = spectrum_of(&samples, size);
            let p = estimate(
                &spec.freqs,
                &spec.raw,
                BinScale::Linear { bin_hz },
                &PitchSearch {
                    max_freq: 24_000.0,
                    ..search()
                },
            )
            .unwrap();
            let err = (p.hz as f64 - f).abs();
            println!("{f} Hz -> {:.3} Hz ({:.2} dB)", p.hz, p.db);
            assert!(err <= (0.2 * bin_hz as f64).max(1.0), "{f}: err {err}");
        }
    }

    #[test]
    fn test_pitch_one_khz_minus_six() {
        let samples: Vec<f32> = sine_gen(1000.0, 48_000.0).take(4096).map(|x| x * 0.5).collect();
        let (_, spec) = spectrum_of(&samples, 4096);
        let p = estimate(
            &spec.freqs,
            &spec.raw,
            BinScale::Linear {
                bin_hz: 48_000.0 / 4096.0,
            },
            &search(),
        )
        .unwrap();
        println!("{p:?}");
        assert!((999.5..=1000.5).contains(&p.hz));
        assert!((-6.5..=-5.5).contains(&p.db));
        let note = Note::from_hz(p.hz, Key::Sharp);
        assert_eq!((note.name, note.octave), ("B", 5));
        assert!((note.cents - 21).abs() <= 10);
    }

    #[test]
    fn test_pitch_log_scale_interpolates_octaves() {
        let scale = BinScale::Log {
            min_freq: 55.0,
            bins_per_octave: 12.0,
        };
        assert!((scale.freq_at(12.0) - 110.0).abs() < 1e-3);
        assert!((scale.freq_at(6.0) - 55.0 * 2f32.sqrt()).abs() < 1e-3);
    }

    #[test]
    fn test_pitch_empty_range() {
        let freqs = [0.0, 10.0, 20.0];
        let raw = [1.0, 1.0, 1.0];
        let s = PitchSearch {
            min_freq: 100.0,
            max_freq: 200.0,
            slope_db_per_oct: 0.0,
        };
        assert_eq!(estimate(&freqs, &raw, BinScale::Linear { bin_hz: 10.0 }, &s), None);
    }

    #[test]
    fn test_note_names() {
        let a4 = Note::from_hz(440.0, Key::Sharp);
        assert_eq!(a4, Note { name: "A", octave: 4, cents: 0 });
        let bb = Note::from_hz(466.1638, Key::Flat);
        assert_eq!((bb.name, bb.octave, bb.cents), ("Bb", 4, 0));
        let cs = Note::from_hz(277.1826, Key::Sharp);
        assert_eq!((cs.name, cs.octave), ("C#", 4));
        // MIDI 0 is C-1, anything below is out of range.
        assert_eq!(Note::from_hz(8.1758, Key::Sharp).octave, -1);
        assert_eq!(Note::from_hz(5.0, Key::Sharp), Note::NONE);
        assert_eq!(Note::from_hz(0.0, Key::Sharp), Note::NONE);
        assert_eq!(Note::from_hz(20_000.0, Key::Sharp), Note::NONE);
        assert_eq!(a4.to_string(), "A4 +0");
    }
}
