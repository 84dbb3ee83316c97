// Copyright 2026 The Afterglow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Colors
//!
//! Linear-ish float RGB triplets are what geometry and the phosphor carry around.  Conversion to
//! and from HSV goes through `palette` in the sRGB space, without linearization, which is what
//! hue interpolation on screen colors wants.

use palette::convert::FromColorUnclamped;
use rgb::RGBA8;

pub type Rgb = [f32; 3];

pub const WHITE: Rgb = [1.0, 1.0, 1.0];
pub const BLACK: Rgb = [0.0, 0.0, 0.0];

/// `hue` in degrees, saturation and value in `[0, 1]`.
pub fn hsv_to_rgb(hue: f32, saturation: f32, value: f32) -> Rgb {
    let hsv: palette::Hsv = palette::Hsv::new_srgb(hue, saturation, value);
    let rgb: palette::Srgb<f32> = palette::Srgb::from_color_unclamped(hsv);
    [rgb.red, rgb.green, rgb.blue]
}

/// Returns `(hue_degrees, saturation, value)` with hue in `[0, 360)`.
pub fn rgb_to_hsv(rgb: Rgb) -> (f32, f32, f32) {
    let srgb = palette::Srgb::new(rgb[0], rgb[1], rgb[2]);
    let hsv: palette::Hsv = palette::Hsv::from_color_unclamped(srgb);
    (hsv.hue.into_positive_degrees(), hsv.saturation, hsv.value)
}

pub fn rgba_to_hsva(rgba: RGBA8) -> palette::Hsva {
    let srgba = palette::Srgba::new(rgba.r, rgba.g, rgba.b, rgba.a).into_format::<f32, f32>();
    palette::Hsva::from_color_unclamped(srgba)
}

pub fn hsva_to_rgba(hsva: palette::Hsva) -> RGBA8 {
    let srgba: palette::Srgba<f32> = palette::Srgba::from_color_unclamped(hsva);
    let srgba: palette::Srgba<u8> = srgba.into_format();
    RGBA8::new(srgba.red, srgba.green, srgba.blue, srgba.alpha)
}

pub fn to_rgba8(rgb: Rgb, alpha: f32) -> RGBA8 {
    let q = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
    RGBA8::new(q(rgb[0]), q(rgb[1]), q(rgb[2]), q(alpha))
}

pub fn from_rgba8(rgba: RGBA8) -> Rgb {
    [
        rgba.r as f32 / 255.0,
        rgba.g as f32 / 255.0,
        rgba.b as f32 / 255.0,
    ]
}

pub fn lerp_rgb(a: Rgb, b: Rgb, t: f32) -> Rgb {
    let t = t.clamp(0.0, 1.0);
    [
        a[0] + (b[0] - a[0]) * t,
        a[1] + (b[1] - a[1]) * t,
        a[2] + (b[2] - a[2]) * t,
    ]
}

/// Hue between `from` and `to` degrees, along the shorter arc.
pub fn lerp_hue(from: f32, to: f32, t: f32) -> f32 {
    let mut delta = (to - from) % 360.0;
    if delta > 180.0 {
        delta -= 360.0;
    } else if delta < -180.0 {
        delta += 360.0;
    }
    (from + delta * t.clamp(0.0, 1.0)).rem_euclid(360.0)
}

/// Hue wheel over the direction of travel.  Opposite directions share a hue, so a beam tracing
/// back over itself keeps its color.
pub fn direction_hue(dx: f32, dy: f32) -> f32 {
    if dx == 0.0 && dy == 0.0 {
        return 0.0;
    }
    let angle = dy.atan2(dx).rem_euclid(std::f32::consts::PI);
    angle.to_degrees() * 2.0
}

/// Pull saturation toward the middle of its range, keeping extremes from dominating.
pub fn squish(x: f32, amount: f32) -> f32 {
    0.5 + (x.clamp(0.0, 1.0) - 0.5) * (1.0 - amount.clamp(0.0, 1.0))
}

/// Hill function starts at zero, has a controllable halfway point, asymptote, and shape.
///
/// - `x` the variable input.
/// - `half_x` the input that reaches half of the asymptote.
/// - `max` the asymptote.
/// - `c_hill` Hill coefficient.  Choose > 1.0 for double inflection shapes.
pub fn hill_function(x: f32, half_x: f32, max: f32, c_hill: f32) -> f32 {
    let t_n = x.max(0.0).powf(c_hill);
    max * (t_n / (t_n + half_x.powf(c_hill)))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_rgba_hsva_round_trip() {
        let mut worst = 0i32;
        for r in (0..=255).step_by(15) {
            for g in (0..=255).step_by(17) {
                for b in (0..=255).step_by(51) {
                    let c = RGBA8::new(r as u8, g as u8, b as u8, 200);
                    let back = hsva_to_rgba(rgba_to_hsva(c));
                    for (x, y) in [(c.r, back.r), (c.g, back.g), (c.b, back.b), (c.a, back.a)] {
                        worst = worst.max((x as i32 - y as i32).abs());
                    }
                }
            }
        }
        assert!(worst <= 1, "worst channel error {worst}");
    }

    #[test]
    fn test_hsv_primaries() {
        let red = hsv_to_rgb(0.0, 1.0, 1.0);
        assert!((red[0] - 1.0).abs() < 1e-6 && red[1].abs() < 1e-6 && red[2].abs() < 1e-6);
        let (h, s, v) = rgb_to_hsv([0.0, 0.0, 1.0]);
        assert!((h - 240.0).abs() < 1e-3);
        assert_eq!((s, v), (1.0, 1.0));
    }

    #[test]
    fn test_lerp_hue_takes_short_arc() {
        assert!((lerp_hue(350.0, 10.0, 0.5) - 0.0).abs() < 1e-3);
        assert!((lerp_hue(10.0, 350.0, 0.25) - 5.0).abs() < 1e-3);
        assert!((lerp_hue(90.0, 180.0, 1.0) - 180.0).abs() < 1e-3);
    }

    #[test]
    fn test_direction_hue_ignores_reversal() {
        assert_eq!(direction_hue(1.0, 0.0), direction_hue(-1.0, 0.0));
        assert!((direction_hue(0.0, 1.0) - 180.0).abs() < 1e-3);
        assert_eq!(direction_hue(0.0, 0.0), 0.0);
    }

    #[test]
    fn test_hill_function_half_point() {
        assert!((hill_function(0.08, 0.08, 1.5, 1.2) - 0.75).abs() < 1e-6);
        assert_eq!(hill_function(0.0, 0.08, 1.5, 1.2), 0.0);
    }
}
