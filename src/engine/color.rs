// src/engine/color.rs
//
// RGB working-space conversion through linear CIE XYZ (D65).
// 8-bit values are linearized through a per-profile lookup table, run
// through the source and destination matrices, re-encoded and rounded.
// Alpha is never touched.

use crate::engine::buffer::{PixelBuffer, CHANNELS};
use crate::formats::WorkingProfile;
use once_cell::sync::Lazy;
use rayon::prelude::*;

/// Buffers with at least this many pixels are converted row-parallel.
pub const PARALLEL_THRESHOLD_PIXELS: usize = 64 * 1024;

/// Adobe RGB (1998) gamma, 563/256 ≈ 2.19921875
const ADOBE_GAMMA: f64 = 563.0 / 256.0;

/// Row-major 3x3 matrix
#[derive(Debug, Clone, Copy, PartialEq)]
struct Matrix3([[f64; 3]; 3]);

impl Matrix3 {
    #[inline]
    fn apply(&self, v: [f64; 3]) -> [f64; 3] {
        let m = &self.0;
        [
            m[0][0] * v[0] + m[0][1] * v[1] + m[0][2] * v[2],
            m[1][0] * v[0] + m[1][1] * v[1] + m[1][2] * v[2],
            m[2][0] * v[0] + m[2][1] * v[1] + m[2][2] * v[2],
        ]
    }
}

// Lindbloom reference values
const SRGB_TO_XYZ: Matrix3 = Matrix3([
    [0.4124564, 0.3575761, 0.1804375],
    [0.2126729, 0.7151522, 0.0721750],
    [0.0193339, 0.1191920, 0.9503041],
]);

const XYZ_TO_SRGB: Matrix3 = Matrix3([
    [3.2404542, -1.5371385, -0.4985314],
    [-0.9692660, 1.8760108, 0.0415560],
    [0.0556434, -0.2040259, 1.0572252],
]);

const ADOBE_TO_XYZ: Matrix3 = Matrix3([
    [0.5767309, 0.1855540, 0.1881852],
    [0.2973769, 0.6273491, 0.0752741],
    [0.0270343, 0.0706872, 0.9911085],
]);

const XYZ_TO_ADOBE: Matrix3 = Matrix3([
    [2.0413690, -0.5649464, -0.3446944],
    [-0.9692660, 1.8760108, 0.0415560],
    [0.0134474, -0.1183897, 1.0154096],
]);

#[inline]
fn clamp01(v: f64) -> f64 {
    v.clamp(0.0, 1.0)
}

/// sRGB EOTF: encoded [0,1] -> linear [0,1]
pub fn srgb_to_linear(c: f64) -> f64 {
    let c = clamp01(c);
    if c < 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

/// Inverse sRGB EOTF: linear [0,1] -> encoded [0,1]
pub fn linear_to_srgb(c: f64) -> f64 {
    let c = clamp01(c);
    if c <= 0.0031308 {
        12.92 * c
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    }
}

pub fn adobe_to_linear(c: f64) -> f64 {
    clamp01(c).powf(ADOBE_GAMMA)
}

pub fn linear_to_adobe(c: f64) -> f64 {
    clamp01(c).powf(1.0 / ADOBE_GAMMA)
}

fn build_lut(eotf: fn(f64) -> f64) -> [f64; 256] {
    let mut lut = [0.0; 256];
    for (i, slot) in lut.iter_mut().enumerate() {
        *slot = eotf(i as f64 / 255.0);
    }
    lut
}

static SRGB_LINEAR_LUT: Lazy<[f64; 256]> = Lazy::new(|| build_lut(srgb_to_linear));
static ADOBE_LINEAR_LUT: Lazy<[f64; 256]> = Lazy::new(|| build_lut(adobe_to_linear));

/// Everything needed to convert one pixel from one profile to another.
struct Transform {
    decode: &'static [f64; 256],
    to_xyz: Matrix3,
    from_xyz: Matrix3,
    encode: fn(f64) -> f64,
}

impl Transform {
    fn new(from: WorkingProfile, to: WorkingProfile) -> Self {
        let (decode, to_xyz): (&'static [f64; 256], Matrix3) = match from {
            WorkingProfile::Srgb => (&SRGB_LINEAR_LUT, SRGB_TO_XYZ),
            WorkingProfile::AdobeRgb => (&ADOBE_LINEAR_LUT, ADOBE_TO_XYZ),
        };
        let (from_xyz, encode): (Matrix3, fn(f64) -> f64) = match to {
            WorkingProfile::Srgb => (XYZ_TO_SRGB, linear_to_srgb),
            WorkingProfile::AdobeRgb => (XYZ_TO_ADOBE, linear_to_adobe),
        };
        Self {
            decode,
            to_xyz,
            from_xyz,
            encode,
        }
    }

    #[inline]
    fn pixel(&self, rgb: [u8; 3]) -> [u8; 3] {
        let linear = [
            self.decode[rgb[0] as usize],
            self.decode[rgb[1] as usize],
            self.decode[rgb[2] as usize],
        ];
        let xyz = self.to_xyz.apply(linear);
        let out = self.from_xyz.apply(xyz);
        [
            to_byte((self.encode)(out[0])),
            to_byte((self.encode)(out[1])),
            to_byte((self.encode)(out[2])),
        ]
    }

    fn run(&self, pixels: &mut [u8]) {
        for px in pixels.chunks_exact_mut(CHANNELS) {
            let [r, g, b] = self.pixel([px[0], px[1], px[2]]);
            px[0] = r;
            px[1] = g;
            px[2] = b;
        }
    }
}

#[inline]
fn to_byte(c: f64) -> u8 {
    (clamp01(c) * 255.0).round() as u8
}

/// Convert one RGB triple. Exposed for callers and tests that work on
/// single colors.
pub fn convert_pixel(rgb: [u8; 3], from: WorkingProfile, to: WorkingProfile) -> [u8; 3] {
    if from == to {
        return rgb;
    }
    Transform::new(from, to).pixel(rgb)
}

/// Convert `buffer` in place from `from` to `to`.
///
/// Identical profiles return immediately without touching a byte.
pub fn convert_profile(buffer: &mut PixelBuffer, from: WorkingProfile, to: WorkingProfile) {
    if from == to {
        return;
    }

    let transform = Transform::new(from, to);
    let (width, height) = buffer.dimensions();
    let stride = width as usize * CHANNELS;
    let data = buffer.as_raw_mut();

    if (width as usize) * (height as usize) >= PARALLEL_THRESHOLD_PIXELS {
        data.par_chunks_mut(stride)
            .for_each(|row| transform.run(row));
    } else {
        transform.run(data);
    }
}
