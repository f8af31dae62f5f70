// src/engine/decoder.rs
//
// Decoder operations: JPEG (mozjpeg) and PNG (zune-png) into RGBA8.

use crate::engine::buffer::{PixelBuffer, CHANNELS};
use crate::engine::common::run_with_panic_policy;
use crate::error::ConvertError;
use crate::formats::SourceFormat;
use mozjpeg::Decompress;
use zune_core::colorspace::ColorSpace;
use zune_core::options::DecoderOptions;
use zune_png::PngDecoder;

use crate::engine::{MAX_DIMENSION, MAX_PIXELS};

// Always ConvertError so decode failures keep their category.
type DecoderResult<T> = std::result::Result<T, ConvertError>;

/// Decode `bytes` as `source` into an RGBA buffer.
pub fn decode(source: SourceFormat, bytes: &[u8]) -> DecoderResult<PixelBuffer> {
    match source {
        SourceFormat::Jpeg => decode_jpeg_mozjpeg(bytes),
        SourceFormat::Png => decode_png_zune(bytes),
    }
}

/// Decode JPEG using mozjpeg (backed by libjpeg-turbo)
pub fn decode_jpeg_mozjpeg(data: &[u8]) -> DecoderResult<PixelBuffer> {
    run_with_panic_policy("decode:mozjpeg", || {
        if !data.windows(2).any(|pair| pair == [0xFF, 0xD9]) {
            return Err(ConvertError::decode_failed(
                "jpeg",
                "mozjpeg: missing JPEG EOI marker",
            ));
        }

        let decompress = Decompress::new_mem(data).map_err(|e| {
            ConvertError::decode_failed("jpeg", format!("mozjpeg decompress init failed: {e:?}"))
        })?;

        let mut decompress = decompress.rgb().map_err(|e| {
            ConvertError::decode_failed("jpeg", format!("mozjpeg rgb conversion failed: {e:?}"))
        })?;

        let width = decompress.width();
        let height = decompress.height();
        if width > MAX_DIMENSION as usize || height > MAX_DIMENSION as usize {
            return Err(ConvertError::dimension_exceeds_limit(
                width.max(height).min(u32::MAX as usize) as u32,
                MAX_DIMENSION,
            ));
        }
        let width = width as u32;
        let height = height as u32;
        check_dimensions(width, height)?;

        let pixels: Vec<[u8; 3]> = decompress.read_scanlines().map_err(|e| {
            ConvertError::decode_failed("jpeg", format!("mozjpeg: failed to read scanlines: {e:?}"))
        })?;

        let mut rgba = Vec::with_capacity(pixels.len() * CHANNELS);
        for [r, g, b] in pixels {
            rgba.extend_from_slice(&[r, g, b, 255]);
        }

        PixelBuffer::new(width, height, rgba).map_err(|e| {
            ConvertError::decode_failed("jpeg", format!("mozjpeg: short scanline data: {e}"))
        })
    })
}

/// Decode PNG using zune-png. 16-bit input is stripped to 8-bit.
pub fn decode_png_zune(data: &[u8]) -> DecoderResult<PixelBuffer> {
    run_with_panic_policy("decode:png", || {
        let options = DecoderOptions::default().png_set_strip_to_8bit(true);
        let mut decoder = PngDecoder::new_with_options(data, options);

        decoder
            .decode_headers()
            .map_err(|e| ConvertError::decode_failed("png", format!("header: {e}")))?;
        let info = decoder
            .get_info()
            .ok_or_else(|| ConvertError::decode_failed("png", "missing header info"))?;
        let width = info.width as u32;
        let height = info.height as u32;
        // reject bombs before allocating the pixel buffer
        check_dimensions(width, height)?;

        let pixels = decoder
            .decode()
            .map_err(|e| ConvertError::decode_failed("png", format!("decode failed: {e}")))?;

        let buf = match pixels {
            zune_core::result::DecodingResult::U8(v) => v,
            _ => {
                return Err(ConvertError::decode_failed(
                    "png",
                    "unexpected non-U8 pixel buffer",
                ))
            }
        };

        let colorspace = decoder
            .get_colorspace()
            .ok_or_else(|| ConvertError::decode_failed("png", "missing colorspace"))?;

        let rgba = expand_to_rgba(buf, colorspace)?;
        PixelBuffer::new(width, height, rgba)
            .map_err(|e| ConvertError::decode_failed("png", e.to_string()))
    })
}

fn expand_to_rgba(buf: Vec<u8>, colorspace: ColorSpace) -> DecoderResult<Vec<u8>> {
    let rgba = match colorspace {
        ColorSpace::RGBA => buf,
        ColorSpace::RGB => buf
            .chunks_exact(3)
            .flat_map(|px| [px[0], px[1], px[2], 255])
            .collect(),
        ColorSpace::Luma => buf.iter().flat_map(|&l| [l, l, l, 255]).collect(),
        ColorSpace::LumaA => buf
            .chunks_exact(2)
            .flat_map(|px| [px[0], px[0], px[0], px[1]])
            .collect(),
        other => {
            return Err(ConvertError::decode_failed(
                "png",
                format!("unsupported colorspace {other:?}"),
            ))
        }
    };
    Ok(rgba)
}

/// Check if image dimensions are within safe limits.
/// Returns an error if the image is too large (potential decompression bomb).
pub fn check_dimensions(width: u32, height: u32) -> DecoderResult<()> {
    if width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(ConvertError::dimension_exceeds_limit(
            width.max(height),
            MAX_DIMENSION,
        ));
    }
    let pixels = width as u64 * height as u64;
    if pixels > MAX_PIXELS {
        return Err(ConvertError::pixel_count_exceeds_limit(pixels, MAX_PIXELS));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    fn encode_with_image(img: DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut buffer = Vec::new();
        img.write_to(&mut Cursor::new(&mut buffer), format).unwrap();
        buffer
    }

    #[test]
    fn png_rgb_gets_opaque_alpha() {
        let png = encode_with_image(
            DynamicImage::ImageRgb8(RgbImage::from_pixel(3, 2, Rgb([10, 20, 30]))),
            ImageFormat::Png,
        );
        let buf = decode(SourceFormat::Png, &png).unwrap();
        assert_eq!(buf.dimensions(), (3, 2));
        assert_eq!(buf.pixel(2, 1), Some([10, 20, 30, 255]));
    }

    #[test]
    fn png_keeps_alpha() {
        let png = encode_with_image(
            DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(2, 2, image::Rgba([1, 2, 3, 4]))),
            ImageFormat::Png,
        );
        let buf = decode(SourceFormat::Png, &png).unwrap();
        assert_eq!(buf.pixel(0, 0), Some([1, 2, 3, 4]));
    }

    #[test]
    fn png_grayscale_expands() {
        let png = encode_with_image(
            DynamicImage::ImageLuma8(image::GrayImage::from_pixel(2, 1, image::Luma([77]))),
            ImageFormat::Png,
        );
        let buf = decode(SourceFormat::Png, &png).unwrap();
        assert_eq!(buf.pixel(1, 0), Some([77, 77, 77, 255]));
    }

    #[test]
    fn jpeg_decodes_to_rgba() {
        let jpeg = encode_with_image(
            DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([128, 128, 128]))),
            ImageFormat::Jpeg,
        );
        let buf = decode(SourceFormat::Jpeg, &jpeg).unwrap();
        assert_eq!(buf.dimensions(), (8, 8));
        let px = buf.pixel(4, 4).unwrap();
        assert!(px[0].abs_diff(128) <= 2);
        assert_eq!(px[3], 255);
    }

    #[test]
    fn garbage_is_a_decode_failure() {
        for source in SourceFormat::ALL {
            let err = decode(source, b"definitely not an image").unwrap_err();
            assert_eq!(err.category(), ErrorCategory::Decode, "{source}: {err}");
        }
    }

    #[test]
    fn png_bytes_as_jpeg_fail() {
        let png = encode_with_image(
            DynamicImage::ImageRgb8(RgbImage::new(2, 2)),
            ImageFormat::Png,
        );
        assert!(decode(SourceFormat::Jpeg, &png).is_err());
    }

    #[test]
    fn oversized_png_is_rejected_before_decode() {
        let png = encode_with_image(
            DynamicImage::ImageLuma8(image::GrayImage::new(MAX_DIMENSION + 1, 1)),
            ImageFormat::Png,
        );
        let err = decode(SourceFormat::Png, &png).unwrap_err();
        assert!(matches!(err, ConvertError::DimensionExceedsLimit { .. }));
    }

    #[test]
    fn check_dimensions_limits() {
        assert!(check_dimensions(MAX_DIMENSION, 1).is_ok());
        assert!(matches!(
            check_dimensions(MAX_DIMENSION + 1, 1),
            Err(ConvertError::DimensionExceedsLimit { .. })
        ));
        assert!(matches!(
            check_dimensions(20_000, 20_000),
            Err(ConvertError::PixelCountExceedsLimit { .. })
        ));
    }
}
