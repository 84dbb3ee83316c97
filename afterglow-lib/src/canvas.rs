// Copyright 2026 The Afterglow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Canvas
//!
//! Software rasterizer for plain geometry.  One canvas covers a whole group; each pane draws
//! into its own column range.  Memory rows run top down like the swapchain image, while geometry
//! is bottom up, so every draw flips `y`.
//!
//! Labels are not rasterized.

use rgb::RGBA8;

use crate::colors::{self, Rgb};
use crate::viz::{Geometry, Polyline, Quad, TexturedQuad};

/// Horizontal slice of the canvas one pane draws into.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, Default)]
pub struct Canvas {
    width: u32,
    height: u32,
    pixels: Vec<RGBA8>,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        let mut canvas = Self::default();
        canvas.resize(width, height);
        canvas
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[RGBA8] {
        &self.pixels
    }

    /// Contents are not preserved.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.pixels.clear();
        self.pixels
            .resize((width * height) as usize, RGBA8::new(0, 0, 0, 255));
    }

    pub fn clear(&mut self, color: Rgb) {
        self.pixels.fill(colors::to_rgba8(color, 1.0));
    }

    /// Pixel at column `x` and bottom up row `y`.
    pub fn get(&self, x: u32, y: u32) -> Option<RGBA8> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels
            .get(((self.height - 1 - y) * self.width + x) as usize)
            .copied()
    }

    /// Column range and row count of `view`, clipped to the canvas.
    fn bounds(&self, view: &Viewport) -> (u32, u32, u32) {
        let x0 = view.x.max(0.0).round() as u32;
        let x1 = ((view.x + view.width).round().max(0.0) as u32).min(self.width);
        let rows = (view.height.round().max(0.0) as u32).min(self.height);
        (x0.min(x1), x1, rows)
    }

    fn blend(&mut self, x: u32, y: u32, color: Rgb, coverage: f32) {
        if coverage <= 0.0 {
            return;
        }
        let at = ((self.height - 1 - y) * self.width + x) as usize;
        let under = colors::from_rgba8(self.pixels[at]);
        let mixed = colors::lerp_rgb(under, color, coverage.min(1.0));
        self.pixels[at] = colors::to_rgba8(mixed, 1.0);
    }

    /// Copy a bottom up image of `width × height` into the pane, clipped to it.
    pub fn blit(&mut self, view: &Viewport, image: &[RGBA8], width: u32, height: u32) {
        let (x0, x1, rows) = self.bounds(view);
        for y in 0..rows.min(height) {
            for x in x0..x1 {
                let sx = x - x0;
                if sx >= width {
                    break;
                }
                let at = ((self.height - 1 - y) * self.width + x) as usize;
                self.pixels[at] = image[(y * width + sx) as usize];
            }
        }
    }

    /// Rasterize everything but the beam and labels.  `image` backs the textured quads and is
    /// stored top down.
    pub fn draw(&mut self, view: &Viewport, geometry: &Geometry, image: Option<(&[RGBA8], u32, u32)>) {
        if let Some((pixels, width, height)) = image {
            for quad in &geometry.textured {
                self.textured(view, quad, pixels, width, height);
            }
        }
        for quad in &geometry.quads {
            self.quad(view, quad);
        }
        for line in &geometry.lines {
            self.polyline(view, line);
        }
    }

    pub fn quad(&mut self, view: &Viewport, quad: &Quad) {
        let (x0, x1, rows) = self.bounds(view);
        let left = view.x + quad.x;
        let right = left + quad.width;
        for y in 0..rows {
            let cy = y as f32 + 0.5;
            if cy < quad.y || cy >= quad.y + quad.height {
                continue;
            }
            for x in x0..x1 {
                let cx = x as f32 + 0.5;
                if cx >= left && cx < right {
                    self.blend(x, y, quad.color, 1.0);
                }
            }
        }
    }

    /// Nearest neighbor sampling.
    pub fn textured(
        &mut self,
        view: &Viewport,
        quad: &TexturedQuad,
        image: &[RGBA8],
        width: u32,
        height: u32,
    ) {
        if width == 0 || height == 0 || quad.width <= 0.0 || quad.height <= 0.0 {
            return;
        }
        let (x0, x1, rows) = self.bounds(view);
        let left = view.x + quad.x;
        for y in 0..rows {
            let cy = y as f32 + 0.5;
            let v = 1.0 - (cy - quad.y) / quad.height;
            if !(0.0..1.0).contains(&v) {
                continue;
            }
            let row = ((v * height as f32) as u32).min(height - 1);
            for x in x0..x1 {
                let s = (x as f32 + 0.5 - left) / quad.width;
                if !(0.0..1.0).contains(&s) {
                    continue;
                }
                let u = quad.u0 + s * (quad.u1 - quad.u0);
                let column = ((u * width as f32) as u32).min(width - 1);
                let at = ((self.height - 1 - y) * self.width + x) as usize;
                self.pixels[at] = image[(row * width + column) as usize];
            }
        }
    }

    /// Anti-aliased by distance to each segment.
    pub fn polyline(&mut self, view: &Viewport, line: &Polyline) {
        let (x0, x1, rows) = self.bounds(view);
        if x0 >= x1 || rows == 0 {
            return;
        }
        let half = line.width.max(1.0) * 0.5;
        let reach = half + 1.0;
        for pair in line.points.windows(2) {
            let a = [pair[0][0] + view.x, pair[0][1]];
            let b = [pair[1][0] + view.x, pair[1][1]];
            let min_x = (a[0].min(b[0]) - reach).floor().max(x0 as f32) as u32;
            let max_x = ((a[0].max(b[0]) + reach).ceil().max(0.0) as u32).min(x1);
            let min_y = (a[1].min(b[1]) - reach).floor().max(0.0) as u32;
            let max_y = ((a[1].max(b[1]) + reach).ceil().max(0.0) as u32).min(rows);
            for y in min_y..max_y {
                for x in min_x..max_x {
                    let p = [x as f32 + 0.5, y as f32 + 0.5];
                    let d = segment_distance(p, a, b);
                    self.blend(x, y, line.color, half + 0.5 - d);
                }
            }
        }
    }
}

/// Distance from `p` to the segment `a`–`b`.
pub fn segment_distance(p: [f32; 2], a: [f32; 2], b: [f32; 2]) -> f32 {
    let (dx, dy) = (b[0] - a[0], b[1] - a[1]);
    let len2 = dx * dx + dy * dy;
    let t = if len2 > 0.0 {
        (((p[0] - a[0]) * dx + (p[1] - a[1]) * dy) / len2).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let (qx, qy) = (a[0] + dx * t - p[0], a[1] + dy * t - p[1]);
    (qx * qx + qy * qy).sqrt()
}
