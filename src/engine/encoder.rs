// src/engine/encoder.rs
//
// Encoder operations: JPEG (mozjpeg), PNG (image + oxipng), WebP (libwebp),
// AVIF (libavif) and the built-in TIFF container.

use crate::codecs::avif_safe::{SafeAvifEncoder, SafeAvifImage};
use crate::engine::buffer::PixelBuffer;
use crate::engine::common::run_with_panic_policy;
use crate::engine::container::encode_container;
use crate::error::ConvertError;
use crate::formats::TargetFormat;
use image::{DynamicImage, ImageFormat, RgbImage, RgbaImage};
use libavif_sys::*;
use mozjpeg::{ColorSpace, Compress, ScanMode};
use std::cmp;
use std::io::Cursor;

// Always ConvertError so encode failures keep their category.
type EncoderResult<T> = std::result::Result<T, ConvertError>;

/// Single source of truth for deriving per-codec settings from a 0-100
/// quality value. Bands:
/// - High (>=85): visual quality first, AVIF speed 6
/// - Balanced (70-84): AVIF speed 7
/// - Fast (50-69): AVIF speed 8
/// - Fastest (<50): AVIF speed 9
#[derive(Debug, Clone, Copy)]
pub struct QualitySettings {
    quality: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QualityBand {
    High,
    Balanced,
    Fast,
    Fastest,
}

impl QualitySettings {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.min(100) as f32,
        }
    }

    pub fn quality(&self) -> f32 {
        self.quality
    }

    fn band(&self) -> QualityBand {
        if self.quality >= 85.0 {
            QualityBand::High
        } else if self.quality >= 70.0 {
            QualityBand::Balanced
        } else if self.quality >= 50.0 {
            QualityBand::Fast
        } else {
            QualityBand::Fastest
        }
    }

    pub fn jpeg_smoothing(&self) -> u8 {
        if self.quality >= 90.0 {
            0
        } else if self.quality >= 70.0 {
            5
        } else if self.quality >= 60.0 {
            10
        } else {
            18
        }
    }

    pub fn webp_method(&self) -> i32 {
        4
    }

    pub fn webp_sns_strength(&self) -> i32 {
        match self.band() {
            QualityBand::High => 50,
            QualityBand::Balanced => 70,
            QualityBand::Fast | QualityBand::Fastest => 80,
        }
    }

    pub fn webp_filter_strength(&self) -> i32 {
        if self.quality >= 80.0 {
            20
        } else if self.quality >= 60.0 {
            30
        } else {
            40
        }
    }

    pub fn webp_filter_sharpness(&self) -> i32 {
        match self.band() {
            QualityBand::High => 2,
            QualityBand::Balanced | QualityBand::Fast | QualityBand::Fastest => 0,
        }
    }

    /// libavif speed: 0 (slowest/best) to 10 (fastest/worst)
    pub fn avif_speed(&self) -> i32 {
        match self.band() {
            QualityBand::High => 6,
            QualityBand::Balanced => 7,
            QualityBand::Fast => 8,
            QualityBand::Fastest => 9,
        }
    }
}

/// Encode `buffer` as `target`. `quality` is the 0-100 task quality and is
/// only consulted by formats that take one.
pub fn encode(buffer: &PixelBuffer, target: TargetFormat, quality: u8) -> EncoderResult<Vec<u8>> {
    let quality = target.encoder_quality(quality);
    match (target, quality) {
        (TargetFormat::Jpeg, Some(q)) => encode_jpeg(buffer, q),
        (TargetFormat::Webp, Some(q)) => encode_webp(buffer, q),
        (TargetFormat::Avif, Some(q)) => encode_avif(buffer, q),
        (TargetFormat::Png, _) => encode_png(buffer),
        (TargetFormat::Tiff, _) => encode_container(buffer),
        (other, None) => Err(ConvertError::encode_failed(
            other.name(),
            "format requires a quality value",
        )),
    }
}

/// Encode to JPEG using mozjpeg. Alpha is dropped.
pub fn encode_jpeg(buffer: &PixelBuffer, quality: u8) -> EncoderResult<Vec<u8>> {
    run_with_panic_policy("encode:jpeg", || {
        let settings = QualitySettings::new(quality);
        let (w, h) = buffer.dimensions();
        let pixels = buffer.to_rgb();

        let mut comp = Compress::new(ColorSpace::JCS_RGB);
        comp.set_size(w as usize, h as usize);
        comp.set_color_space(ColorSpace::JCS_YCbCr);
        comp.set_quality(settings.quality());
        comp.set_chroma_sampling_pixel_sizes((2, 2), (2, 2));
        comp.set_progressive_mode();
        comp.set_optimize_coding(true);
        comp.set_optimize_scans(true);
        comp.set_scan_optimization_mode(ScanMode::AllComponentsTogether);
        comp.set_smoothing_factor(settings.jpeg_smoothing());

        let estimated_size = (w as usize * h as usize * 3 / 10).max(4096);
        let mut output = Vec::with_capacity(estimated_size);
        {
            let mut writer = comp.start_compress(&mut output).map_err(|e| {
                ConvertError::encode_failed("jpeg", format!("mozjpeg: failed to start compress: {e:?}"))
            })?;

            let stride = w as usize * 3;
            for row in pixels.chunks(stride) {
                writer.write_scanlines(row).map_err(|e| {
                    ConvertError::encode_failed(
                        "jpeg",
                        format!("mozjpeg: failed to write scanlines: {e:?}"),
                    )
                })?;
            }

            writer.finish().map_err(|e| {
                ConvertError::encode_failed("jpeg", format!("mozjpeg: failed to finish: {e:?}"))
            })?;
        }
        Ok(output)
    })
}

/// Encode to PNG with the image crate, then recompress losslessly with
/// oxipng. Opaque buffers are written as RGB.
pub fn encode_png(buffer: &PixelBuffer) -> EncoderResult<Vec<u8>> {
    run_with_panic_policy("encode:png", || {
        let (w, h) = buffer.dimensions();
        let img = if buffer.is_opaque() {
            RgbImage::from_raw(w, h, buffer.to_rgb()).map(DynamicImage::ImageRgb8)
        } else {
            RgbaImage::from_raw(w, h, buffer.as_raw().to_vec()).map(DynamicImage::ImageRgba8)
        }
        .ok_or_else(|| ConvertError::encode_failed("png", "failed to build image from pixels"))?;

        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .map_err(|e| ConvertError::encode_failed("png", format!("PNG encode failed: {e}")))?;

        let mut options = oxipng::Options::from_preset(4);
        options.strip = oxipng::StripChunks::None;

        oxipng::optimize_from_memory(&buf, &options).map_err(|e| {
            ConvertError::encode_failed("png", format!("oxipng optimization failed: {e}"))
        })
    })
}

/// Encode to lossy WebP. Alpha is kept only when the buffer has some.
pub fn encode_webp(buffer: &PixelBuffer, quality: u8) -> EncoderResult<Vec<u8>> {
    run_with_panic_policy("encode:webp", || {
        let (w, h) = buffer.dimensions();
        let rgb;
        let encoder = if buffer.is_opaque() {
            rgb = buffer.to_rgb();
            webp::Encoder::from_rgb(&rgb, w, h)
        } else {
            webp::Encoder::from_rgba(buffer.as_raw(), w, h)
        };

        let mut config = webp::WebPConfig::new()
            .map_err(|_| ConvertError::codec_unavailable("webp", "failed to create WebPConfig"))?;

        let settings = QualitySettings::new(quality);
        config.quality = settings.quality();
        config.method = settings.webp_method();
        config.pass = 1;
        config.preprocessing = 0;
        config.sns_strength = settings.webp_sns_strength();
        config.autofilter = 1;
        config.filter_strength = settings.webp_filter_strength();
        config.filter_sharpness = settings.webp_filter_sharpness();

        let mem = encoder.encode_advanced(&config).map_err(|e| {
            ConvertError::encode_failed("webp", format!("WebP encode failed: {e:?}"))
        })?;
        Ok(mem.to_vec())
    })
}

/// Encode to AVIF through libavif. Pixels are tagged BT.709 / sRGB
/// transfer, full range.
pub fn encode_avif(buffer: &PixelBuffer, quality: u8) -> EncoderResult<Vec<u8>> {
    run_with_panic_policy("encode:avif", || {
        let settings = QualitySettings::new(quality);
        let quality = quality.min(100);
        let (width, height) = buffer.dimensions();
        let pixels = buffer.as_raw();

        let mut image = SafeAvifImage::new(width, height, 8, AVIF_PIXEL_FORMAT_YUV420)?;
        image.set_color_properties(
            AVIF_COLOR_PRIMARIES_BT709 as u16,
            AVIF_TRANSFER_CHARACTERISTICS_SRGB as u16,
            AVIF_MATRIX_COEFFICIENTS_BT709 as u16,
            AVIF_RANGE_FULL,
        );
        image.set_rgba(pixels)?;
        if !buffer.is_opaque() {
            image.set_alpha_from_rgba(pixels)?;
        }

        let cpu_threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(2);
        let encoder_threads = cmp::max(2, cmp::min(8, cpu_threads)) as i32;

        let mut encoder = SafeAvifEncoder::new()?;
        encoder.configure(quality, quality, settings.avif_speed(), encoder_threads);
        encoder.encode_single(&mut image)
    })
}
