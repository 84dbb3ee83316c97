// Copyright 2026 The Afterglow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Loudness Meter
//!
//! Two narrow sample peak bars for left and right beside a wide loudness bar, all on one
//! -70 to 0 dB scale, with the reading printed above.

use super::{db_fraction, log_scale_fraction, Anchor, FrameContext, Geometry, Render};
use crate::config::{LabelMode, LufsConfig, MeterScale};
use crate::dsp::amplitude_to_db;

pub const METER_MIN_DB: f32 = -70.0;
pub const METER_MAX_DB: f32 = 0.0;
/// Exponent of the log scale.
pub const LOG_SCALE_POWER: f32 = 2.0;

const TICKS: [f32; 9] = [0.0, -6.0, -12.0, -18.0, -23.0, -30.0, -40.0, -50.0, -60.0];
const COMPACT_TICKS: [f32; 4] = [0.0, -12.0, -23.0, -40.0];
/// Space above the bars for the reading.
const READOUT_HEIGHT: f32 = 24.0;
const PADDING: f32 = 6.0;
const LABEL_WIDTH: f32 = 30.0;
const COMPACT_LABEL_WIDTH: f32 = 20.0;

/// Reading with two decimals near zero and one elsewhere.
pub fn format_lufs(lufs: f32) -> String {
    if !(lufs > METER_MIN_DB) {
        "-inf".to_owned()
    } else if lufs.abs() < 10.0 {
        format!("{lufs:.2}")
    } else {
        format!("{lufs:.1}")
    }
}

/// Bar height fraction of `db` on the meter scale.
pub fn meter_fraction(config: &LufsConfig, db: f32) -> f32 {
    let db = db.clamp(METER_MIN_DB, METER_MAX_DB);
    match config.scale {
        MeterScale::Linear => db_fraction(db, METER_MIN_DB, METER_MAX_DB),
        MeterScale::Log => log_scale_fraction(db, METER_MIN_DB, METER_MAX_DB, LOG_SCALE_POWER),
    }
}

#[derive(Debug, Default)]
pub struct LufsMeter;

impl LufsMeter {
    pub fn new() -> Self {
        Self
    }
}

impl Render for LufsMeter {
    fn render(&mut self, ctx: &FrameContext, out: &mut Geometry) {
        let cfg = &ctx.config.lufs;
        let theme = ctx.theme;
        let levels = ctx.snapshot.levels;

        let (label_width, ticks): (f32, &[f32]) = match cfg.label {
            LabelMode::On => (LABEL_WIDTH, &TICKS),
            LabelMode::Compact => (COMPACT_LABEL_WIDTH, &COMPACT_TICKS),
            LabelMode::Off => (0.0, &[]),
        };
        let bottom = PADDING;
        let span = (ctx.height - READOUT_HEIGHT - bottom).max(0.0);
        let left = label_width + PADDING;
        let room = (ctx.width - left - PADDING).max(0.0);
        // Peak, gap, peak, gap, loudness.
        let peak_width = room * 0.2;
        let gap = room * 0.05;
        let lufs_width = room - 2.0 * peak_width - 2.0 * gap;

        let bars = [
            (left, peak_width, amplitude_to_db(levels.peak_left)),
            (left + peak_width + gap, peak_width, amplitude_to_db(levels.peak_right)),
            (left + 2.0 * (peak_width + gap), lufs_width, levels.lufs),
        ];
        for (i, (x, width, db)) in bars.into_iter().enumerate() {
            let height = meter_fraction(cfg, db) * span;
            if height <= 0.0 {
                continue;
            }
            let color = if i < 2 && db >= METER_MAX_DB {
                theme.clip
            } else {
                theme.foreground
            };
            out.quad(x, bottom, width, height, color);
        }

        for &db in ticks {
            let y = bottom + meter_fraction(cfg, db) * span;
            out.line(vec![[left - 4.0, y], [left, y]], theme.secondary, 1.0);
            let text = if cfg.label == LabelMode::Compact {
                format!("{}", db.abs())
            } else {
                format!("{db}")
            };
            out.label(left - 6.0, y, text, theme.secondary, Anchor::Right);
        }

        let readout = match cfg.label {
            LabelMode::Compact => format_lufs(levels.lufs),
            _ => format!("{} LUFS", format_lufs(levels.lufs)),
        };
        out.label(
            ctx.width * 0.5,
            ctx.height - READOUT_HEIGHT * 0.75,
            readout,
            theme.foreground,
            Anchor::Center,
        );
    }
}
