// Copyright 2026 The Afterglow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Lissajous
//!
//! Left against right.  Mono content lies on the diagonal and the wider the stereo image the
//! fatter the figure.  The transform modes reshape the unit square:
//!
//! - `rotate` puts mono on the vertical axis, the classic goniometer
//! - `circle` maps the square onto the disk with constant density before rotating
//! - `pulsar` and `black_hole` follow `circle` with a log-radial warp that turns silence into a
//!   ring

use std::f32::consts::{FRAC_1_SQRT_2, FRAC_PI_2, FRAC_PI_4};

use super::{trace_beam, FrameContext, Geometry, Render};
use crate::colors;
use crate::config::LissajousMode;
use crate::ring::Channel;

/// Log warp offset for `pulsar`.  Below `1/e`, so silence lands outside the loudest points.
pub const PULSAR_SIGMA: f32 = 0.15;
/// Log warp offset for `black_hole`.  Above `1/e`, so the warp keeps the order of radii.
pub const BLACK_HOLE_SIGMA: f32 = 0.6;
/// Radius silence maps to in `black_hole`.
pub const BLACK_HOLE_RING: f32 = 0.33;
/// Longest spline step in pixels when densifying for the beam.
const SPLINE_STEP: f32 = 2.0;
const MAX_SUBDIVISIONS: usize = 8;

/// Rotate the diagonal onto the vertical axis.
fn rotate(x: f32, y: f32) -> (f32, f32) {
    ((x - y) * FRAC_1_SQRT_2, (x + y) * FRAC_1_SQRT_2)
}

/// Square to disk with constant area density.
fn square_to_disk(x: f32, y: f32) -> (f32, f32) {
    if x == 0.0 && y == 0.0 {
        return (0.0, 0.0);
    }
    let (r, theta) = if x.abs() > y.abs() {
        (x, FRAC_PI_4 * (y / x))
    } else {
        (y, FRAC_PI_2 - FRAC_PI_4 * (x / y))
    };
    (r * theta.cos(), r * theta.sin())
}

/// `p · s` with `s = -(ln(d + σ) + 1) / d`, scaled by `post`.
fn log_warp(x: f32, y: f32, sigma: f32, post: f32) -> (f32, f32) {
    let d = (x * x + y * y).sqrt();
    let f = -((d + sigma).ln() + 1.0) * post;
    if d < 1e-9 {
        return (0.0, f);
    }
    (x / d * f, y / d * f)
}

/// Apply `mode` to a point of the unit square.
pub fn transform(mode: LissajousMode, x: f32, y: f32) -> (f32, f32) {
    match mode {
        LissajousMode::None => (x, y),
        // The rotated square is wider than the pane.  Shrink it back in.
        LissajousMode::Rotate => {
            let (x, y) = rotate(x, y);
            (x * FRAC_1_SQRT_2, y * FRAC_1_SQRT_2)
        }
        LissajousMode::Circle => {
            let (x, y) = square_to_disk(x, y);
            rotate(x, y)
        }
        LissajousMode::Pulsar => {
            let (x, y) = square_to_disk(x, y);
            let (x, y) = rotate(x, y);
            // The unit circle lands on the unit circle.
            let post = 1.0 / ((1.0 + PULSAR_SIGMA).ln() + 1.0);
            log_warp(x, y, PULSAR_SIGMA, post)
        }
        LissajousMode::BlackHole => {
            let (x, y) = square_to_disk(x, y);
            let (x, y) = rotate(x, y);
            let post = BLACK_HOLE_RING / (BLACK_HOLE_SIGMA.ln() + 1.0).abs();
            log_warp(x, y, BLACK_HOLE_SIGMA, post)
        }
    }
}

/// Cardinal spline through `points` with `tension`, adding points so no step exceeds
/// `SPLINE_STEP` pixels.
pub fn densify(points: &[[f32; 2]], tension: f32, out: &mut Vec<[f32; 2]>) {
    out.clear();
    if points.len() < 3 || tension <= 0.0 {
        out.extend_from_slice(points);
        return;
    }
    let n = points.len();
    for i in 0..n - 1 {
        let p0 = points[i.saturating_sub(1)];
        let p1 = points[i];
        let p2 = points[i + 1];
        let p3 = points[(i + 2).min(n - 1)];
        let m1 = [tension * (p2[0] - p0[0]), tension * (p2[1] - p0[1])];
        let m2 = [tension * (p3[0] - p1[0]), tension * (p3[1] - p1[1])];
        let length = ((p2[0] - p1[0]).powi(2) + (p2[1] - p1[1]).powi(2)).sqrt();
        let steps = ((length / SPLINE_STEP).ceil() as usize).clamp(1, MAX_SUBDIVISIONS);
        for s in 0..steps {
            let t = s as f32 / steps as f32;
            let (t2, t3) = (t * t, t * t * t);
            let h00 = 2.0 * t3 - 3.0 * t2 + 1.0;
            let h10 = t3 - 2.0 * t2 + t;
            let h01 = -2.0 * t3 + 3.0 * t2;
            let h11 = t3 - t2;
            out.push([
                h00 * p1[0] + h10 * m1[0] + h01 * p2[0] + h11 * m2[0],
                h00 * p1[1] + h10 * m1[1] + h01 * p2[1] + h11 * m2[1],
            ]);
        }
    }
    out.push(points[n - 1]);
}

#[derive(Debug, Default)]
pub struct Lissajous {
    points: Vec<[f32; 2]>,
    dense: Vec<[f32; 2]>,
}

impl Lissajous {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Render for Lissajous {
    fn render(&mut self, ctx: &FrameContext, out: &mut Geometry) {
        let cfg = &ctx.config.lissajous;
        let snapshot = ctx.snapshot;
        if snapshot.sample_rate == 0 {
            return;
        }
        let ring = &ctx.core.ring;
        let per_frame = ctx.config.samples_per_frame(snapshot.sample_rate);
        // Redraw a little of the previous frame so consecutive frames join up.
        let fresh = snapshot.new_frames.max(per_frame);
        let count = ((fresh as f32 * cfg.readback_multiplier.max(1.0)) as usize)
            .clamp(2, ring.capacity() / 2);

        let (w, h) = ctx.oriented(cfg.rotation);
        let side = w.min(h);
        let (cx, cy) = (w * 0.5, h * 0.5);
        let view = ring.view_at(snapshot.write_pos, count);

        self.points.clear();
        for k in 0..view.len {
            let i = view.index(k);
            let left = ring.sample(Channel::Left, i).clamp(-1.0, 1.0);
            let right = ring.sample(Channel::Right, i).clamp(-1.0, 1.0);
            let (nx, ny) = transform(cfg.mode, left, right);
            let x = cx + nx.clamp(-1.0, 1.0) * side * 0.5;
            let y = cy + ny.clamp(-1.0, 1.0) * side * 0.5;
            let (x, y) = cfg.rotation.apply(x, y, ctx.width, ctx.height);
            self.points.push([x, y]);
        }

        if ctx.phosphor() {
            densify(&self.points, ctx.config.phosphor.beam.tension, &mut self.dense);
            // Each sample is drawn `readback_multiplier` times across frames.
            let multiplier = cfg.beam_multiplier / cfg.readback_multiplier.max(1.0);
            trace_beam(ctx, &self.dense, multiplier, colors::WHITE, &mut out.beam);
        } else {
            out.line(self.points.clone(), ctx.theme.foreground, 1.0);
        }
    }
}
