// src/engine/buffer.rs
//
// Decoded pixel surface passed between pipeline stages.

use crate::error::{ConvertError, Result};

/// Bytes per pixel: interleaved 8-bit RGBA.
pub const CHANNELS: usize = 4;

/// An owned RGBA8 image. `data.len() == width * height * 4` always holds.
///
/// A buffer belongs to exactly one pipeline at a time; stages take it by
/// value or by `&mut` and hand it on.
#[derive(Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl PixelBuffer {
    /// Wrap raw RGBA bytes, validating the length.
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = expected_len(width, height)
            .ok_or_else(|| ConvertError::invalid_pixel_buffer(width, height, usize::MAX, data.len()))?;
        if width == 0 || height == 0 || data.len() != expected {
            return Err(ConvertError::invalid_pixel_buffer(
                width,
                height,
                expected,
                data.len(),
            ));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Expand tightly packed RGB into RGBA with opaque alpha.
    pub fn from_rgb(width: u32, height: u32, rgb: &[u8]) -> Result<Self> {
        let pixels = width as usize * height as usize;
        if rgb.len() != pixels * 3 {
            return Err(ConvertError::invalid_pixel_buffer(
                width,
                height,
                pixels * 3,
                rgb.len(),
            ));
        }
        let mut data = Vec::with_capacity(pixels * CHANNELS);
        for px in rgb.chunks_exact(3) {
            data.extend_from_slice(&[px[0], px[1], px[2], 255]);
        }
        Self::new(width, height, data)
    }

    /// Single-color buffer. Mostly for tests and benches.
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Result<Self> {
        let pixels = width as usize * height as usize;
        let mut data = Vec::with_capacity(pixels * CHANNELS);
        for _ in 0..pixels {
            data.extend_from_slice(&rgba);
        }
        Self::new(width, height, data)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn as_raw(&self) -> &[u8] {
        &self.data
    }

    pub fn as_raw_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.data
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * CHANNELS;
        Some([
            self.data[i],
            self.data[i + 1],
            self.data[i + 2],
            self.data[i + 3],
        ])
    }

    /// True when every alpha byte is 255.
    pub fn is_opaque(&self) -> bool {
        self.data.chunks_exact(CHANNELS).all(|px| px[3] == 255)
    }

    /// Drop alpha, producing tightly packed RGB.
    pub fn to_rgb(&self) -> Vec<u8> {
        let mut rgb = Vec::with_capacity(self.data.len() / CHANNELS * 3);
        for px in self.data.chunks_exact(CHANNELS) {
            rgb.extend_from_slice(&px[..3]);
        }
        rgb
    }
}

impl std::fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PixelBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .finish()
    }
}

fn expected_len(width: u32, height: u32) -> Option<usize> {
    (width as usize)
        .checked_mul(height as usize)?
        .checked_mul(CHANNELS)
}
