// Copyright 2026 The Afterglow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # VU Meter
//!
//! RMS over `vu.window_ms`, offset by `vu.calibration_db` so 0 VU lands on a chosen dBFS level.
//! The digital style is a bar colored by zone.  The analog style is a needle swinging over an
//! arc, optionally driven through a damped spring so it moves like one.

use std::f32::consts::{FRAC_PI_2, PI};

use super::{db_fraction, log_scale_fraction, Anchor, FrameContext, Geometry, Render};
use crate::config::{MeterScale, MomentumConfig, VuConfig, VuStyle};
use crate::dsp::amplitude_to_db;

pub const VU_MIN_DB: f32 = -20.0;
pub const VU_MAX_DB: f32 = 3.0;
/// Top of the main zone and bottom of the caution zone.
pub const CAUTION_DB: f32 = -3.0;
/// Top of the caution zone and bottom of the clip zone.
pub const CLIP_DB: f32 = 0.0;
pub const LOG_SCALE_POWER: f32 = 2.0;

const TICKS: [f32; 7] = [-20.0, -10.0, -7.0, -5.0, -3.0, 0.0, 3.0];
/// Half the needle's swing, from vertical.
const ARC_HALF_ANGLE: f32 = 50.0 * PI / 180.0;
/// Longest integration step of the spring.
const MAX_SPRING_STEP: f32 = 1.0 / 240.0;
const PADDING: f32 = 6.0;

/// Displayed level of `rms`.
pub fn vu_db(rms: f32, calibration_db: f32) -> f32 {
    amplitude_to_db(rms) + calibration_db
}

/// Position of `db` on the meter in `[0, 1]`.
pub fn vu_fraction(config: &VuConfig, db: f32) -> f32 {
    match config.scale {
        MeterScale::Linear => db_fraction(db, VU_MIN_DB, VU_MAX_DB),
        MeterScale::Log => log_scale_fraction(db, VU_MIN_DB, VU_MAX_DB, LOG_SCALE_POWER),
    }
}

/// Needle position and velocity, in meter fractions.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Needle {
    pub position: f32,
    pub velocity: f32,
}

impl Needle {
    /// Advance toward `target` by `dt` seconds: `a = k·(target - θ) - ζ·ω`.  Jumps straight
    /// there with momentum off.
    pub fn advance(&mut self, target: f32, dt: f32, momentum: &MomentumConfig) {
        if !momentum.enabled {
            self.position = target;
            self.velocity = 0.0;
            return;
        }
        let mut left = dt.max(0.0);
        while left > 0.0 {
            let step = left.min(MAX_SPRING_STEP);
            let accel = momentum.spring_constant * (target - self.position)
                - momentum.damping_ratio * self.velocity;
            self.velocity += accel * step;
            self.position += self.velocity * step;
            left -= step;
        }
    }
}

#[derive(Debug, Default)]
pub struct VuMeter {
    needle: Needle,
}

impl VuMeter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn needle(&self) -> Needle {
        self.needle
    }

    fn digital(&self, ctx: &FrameContext, db: f32, out: &mut Geometry) {
        let cfg = &ctx.config.vu;
        let theme = ctx.theme;
        let span = (ctx.height - 2.0 * PADDING).max(0.0);
        let x = ctx.width * 0.4;
        let width = ctx.width * 0.5 - PADDING;
        let at = |db: f32| PADDING + vu_fraction(cfg, db) * span;
        let top = at(db);

        let zones = [
            (VU_MIN_DB, CAUTION_DB, theme.foreground),
            (CAUTION_DB, CLIP_DB, theme.caution),
            (CLIP_DB, VU_MAX_DB, theme.clip),
        ];
        for (lo, hi, color) in zones {
            let (y0, y1) = (at(lo), at(hi).min(top));
            if y1 > y0 {
                out.quad(x, y0, width, y1 - y0, color);
            }
        }
        for db in TICKS {
            let y = at(db);
            out.line(vec![[x - 4.0, y], [x, y]], theme.secondary, 1.0);
            out.label(x - 6.0, y, format!("{db}"), theme.secondary, Anchor::Right);
        }
    }

    fn analog(&mut self, ctx: &FrameContext, db: f32, out: &mut Geometry) {
        let cfg = &ctx.config.vu;
        let theme = ctx.theme;
        self.needle
            .advance(vu_fraction(cfg, db), ctx.dt, &cfg.momentum);

        let pivot = [ctx.width * 0.5, PADDING];
        let length = (ctx.height - 3.0 * PADDING)
            .min((ctx.width * 0.5 - PADDING) / ARC_HALF_ANGLE.sin())
            .max(0.0);
        // 0 points left along the arc, 1 right.
        let point = |fraction: f32, radius: f32| {
            let angle = FRAC_PI_2 + ARC_HALF_ANGLE * (1.0 - 2.0 * fraction);
            [pivot[0] + radius * angle.cos(), pivot[1] + radius * angle.sin()]
        };

        for db in TICKS {
            let f = vu_fraction(cfg, db);
            let color = if db > CLIP_DB { theme.clip } else { theme.secondary };
            out.line(vec![point(f, length * 0.9), point(f, length)], color, 1.0);
        }
        let arc: Vec<[f32; 2]> = (0..=32)
            .map(|i| point(i as f32 / 32.0, length * 0.9))
            .collect();
        out.line(arc, theme.secondary, 1.0);

        let position = self.needle.position.clamp(-0.05, 1.05);
        let color = if db > CLIP_DB {
            theme.clip
        } else {
            theme.foreground
        };
        out.line(vec![pivot, point(position, length)], color, cfg.needle_width);
    }
}

impl Render for VuMeter {
    fn render(&mut self, ctx: &FrameContext, out: &mut Geometry) {
        let cfg = &ctx.config.vu;
        let db = vu_db(ctx.snapshot.levels.rms, cfg.calibration_db);
        match cfg.style {
            VuStyle::Digital => self.digital(ctx, db, out),
            VuStyle::Analog => self.analog(ctx, db, out),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::Config;
    use crate::pipeline::{DspCore, FrameSnapshot};
    use crate::sync::Levels;
    use crate::theme::Theme;

    fn render(meter: &mut VuMeter, config: &Config, rms: f32) -> Geometry {
        let core = DspCore::new(config.clone(), 48_000);
        let snapshot = FrameSnapshot {
            levels: Levels {
                rms,
                ..Levels::default()
            },
            ..FrameSnapshot::default()
        };
        let ctx = FrameContext {
            config,
            core: &core,
            snapshot: &snapshot,
            theme: &Theme::DARK,
            width: 80.0,
            height: 242.0,
            dt: 1.0 / 60.0,
        };
        let mut out = Geometry::default();
        meter.render(&ctx, &mut out);
        out
    }

    #[test]
    fn test_calibration() {
        // A full scale sine reads 18 dB hot with the default calibration.
        let db = vu_db(std::f32::consts::FRAC_1_SQRT_2, 18.0);
        assert!((db - 14.99).abs() < 0.01);
        assert!((vu_db(10f32.powf(-18.0 / 20.0), 18.0)).abs() < 1e-4);
    }

    #[test]
    fn test_digital_zones() {
        let config = Config::default();
        let mut meter = VuMeter::new();
        // -19 dBFS is -1 VU, inside the caution zone.
        let out = render(&mut meter, &config, 10f32.powf(-19.0 / 20.0));
        assert_eq!(out.quads.len(), 2);
        assert_eq!(out.quads[0].color, Theme::DARK.foreground);
        assert_eq!(out.quads[1].color, Theme::DARK.caution);
        // 230 px over 23 dB.
        assert!((out.quads[0].height - 170.0).abs() < 1e-2);
        assert!((out.quads[1].height - 20.0).abs() < 1e-2);

        let out = render(&mut meter, &config, 1.0);
        assert_eq!(out.quads.len(), 3);
        assert_eq!(out.quads[2].color, Theme::DARK.clip);

        let out = render(&mut meter, &config, 0.0);
        assert!(out.quads.is_empty());
        assert_eq!(out.labels.len(), TICKS.len());
    }

    #[test]
    fn test_log_scale() {
        let mut config = VuConfig::default();
        config.scale = MeterScale::Log;
        assert_eq!(vu_fraction(&config, VU_MIN_DB), 0.0);
        assert_eq!(vu_fraction(&config, VU_MAX_DB), 1.0);
        let linear = db_fraction(-10.0, VU_MIN_DB, VU_MAX_DB);
        // The square root pushes quiet levels further down.
        assert!(vu_fraction(&config, -10.0) < linear);
    }

    #[test]
    fn test_spring_settles() {
        let momentum = MomentumConfig::default();
        let mut needle = Needle::default();
        let mut peak = 0f32;
        for _ in 0..120 {
            needle.advance(1.0, 1.0 / 60.0, &momentum);
            peak = peak.max(needle.position);
        }
        assert!((needle.position - 1.0).abs() < 0.01);
        assert!(peak < 1.05);

        let momentum = MomentumConfig {
            enabled: false,
            ..momentum
        };
        needle.advance(0.25, 1.0 / 60.0, &momentum);
        assert_eq!(needle.position, 0.25);
    }

    #[test]
    fn test_analog_needle() {
        let mut config = Config::default();
        config.vu.style = VuStyle::Analog;
        config.vu.momentum.enabled = false;
        let mut meter = VuMeter::new();
        let out = render(&mut meter, &config, 0.0);
        let needle = out.lines.last().unwrap();
        assert_eq!(needle.width, config.vu.needle_width);
        // Silence rests hard left.
        assert!(needle.points[1][0] < needle.points[0][0]);
        assert!(out.quads.is_empty());
    }
}
