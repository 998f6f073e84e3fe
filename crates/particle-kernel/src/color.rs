//! Colour utilities shared by the particle and link shaders

use glam::Vec3;

use crate::constants::{BASE_COLOR, COLOR_NOISE_SCALE};
use crate::noise::fractal_noise;

/// Unit grey axis `(1, 1, 1) / sqrt(3)` hue rotations happen around
const HUE_AXIS: Vec3 = Vec3::splat(0.577_350_26);

/// Rotate `color` around the grey axis by `angle` radians.
///
/// Rodrigues rotation, so a shift of `2π` is the identity and luminance along
/// the grey axis is preserved.
pub fn hue_shift(color: Vec3, angle: f32) -> Vec3 {
    let (sin, cos) = angle.sin_cos();
    color * cos + HUE_AXIS.cross(color) * sin + HUE_AXIS * HUE_AXIS.dot(color) * (1.0 - cos)
}

/// Normalised power curve `x^a (1-x)^b`, peaking at 1 when `x = a / (a + b)`.
/// `x` is clamped to `[0, 1]`.
pub fn pcurve(x: f32, a: f32, b: f32) -> f32 {
    let x = x.clamp(0.0, 1.0);
    let k = (a + b).powf(a + b) / (a.powf(a) * b.powf(b));
    k * x.powf(a) * (1.0 - x).powf(b)
}

/// Per-particle palette colour.
///
/// Neighbouring indices get similar hues because the noise lookup is a smooth
/// function of `index * 0.1`; `variance` scales the spread, `offset` rotates
/// the whole palette over time.
pub fn instance_color(index: u32, offset: f32, variance: f32) -> Vec3 {
    let seed = Vec3::splat(index as f32 * COLOR_NOISE_SCALE);
    let hue = offset + fractal_noise(seed, 2, 2.0, 0.5, variance);
    hue_shift(Vec3::from_array(BASE_COLOR), hue)
}

/// Decode one sRGB channel into linear light
pub fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

/// Linear rgb of a `0xRRGGBB` colour
pub fn hex_to_linear(hex: u32) -> Vec3 {
    let channel = |shift: u32| srgb_to_linear(((hex >> shift) & 0xff) as f32 / 255.0);
    Vec3::new(channel(16), channel(8), channel(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::TAU;

    fn assert_close(a: Vec3, b: Vec3) {
        assert!((a - b).abs().max_element() < 1e-5, "{a} != {b}");
    }

    #[test]
    fn test_hue_shift_full_turn_is_identity() {
        let c = Vec3::new(0.2, 0.5, 0.9);
        assert_close(hue_shift(c, 0.0), c);
        assert_close(hue_shift(c, TAU), c);
    }

    #[test]
    fn test_hue_shift_keeps_grey() {
        let grey = Vec3::splat(0.4);
        assert_close(hue_shift(grey, 1.3), grey);
    }

    #[test]
    fn test_hue_shift_cycles_primaries() {
        // A third of a turn maps blue onto red around the grey axis
        let blue = Vec3::new(0.0, 0.0, 1.0);
        assert_close(hue_shift(blue, TAU / 3.0), Vec3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn test_pcurve_peak_and_ends() {
        assert!((pcurve(0.5, 0.25, 0.25) - 1.0).abs() < 1e-5);
        assert!((pcurve(8.0 / 9.0, 8.0, 1.0) - 1.0).abs() < 1e-4);
        assert_eq!(pcurve(0.0, 8.0, 1.0), 0.0);
        assert_eq!(pcurve(1.0, 8.0, 1.0), 0.0);
        assert_eq!(pcurve(2.0, 8.0, 1.0), 0.0);
    }

    #[test]
    fn test_instance_color_zero_variance() {
        // Index 0 samples the noise on the lattice, so only the offset shifts the hue
        assert_close(instance_color(0, 0.0, 2.0), Vec3::new(0.0, 0.0, 1.0));
        assert_close(instance_color(17, 0.7, 0.0), hue_shift(Vec3::Z, 0.7));
    }

    #[test]
    fn test_hex_to_linear() {
        assert_close(hex_to_linear(0xffffff), Vec3::ONE);
        assert_close(hex_to_linear(0x000000), Vec3::ZERO);
        let bg = hex_to_linear(0x14171a);
        assert!(bg.x < bg.y && bg.y < bg.z);
        assert!(bg.z < 0.02);
    }
}
