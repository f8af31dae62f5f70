// src/engine/resize.rs
//
// Short-edge resampling.
// Primary path is fast_image_resize (Lanczos3, premultiplied alpha); if it
// fails for any reason the image crate's resize is tried before giving up.

use crate::engine::buffer::{PixelBuffer, CHANNELS};
use crate::engine::decoder::check_dimensions;
use crate::error::{ConvertError, Result};
use fast_image_resize::{self as fir, ImageBufferError, MulDiv, PixelType, ResizeOptions};
use image::imageops::FilterType;
use image::RgbaImage;

/// Target dimensions that make the short edge equal `short_edge`.
///
/// Returns `None` when no resampling is needed: no request, a zero
/// request, or a request that already matches.
pub fn short_edge_dimensions(width: u32, height: u32, short_edge: Option<u32>) -> Option<(u32, u32)> {
    let requested = short_edge.filter(|&s| s > 0)?;
    let current = width.min(height);
    if current == 0 || requested == current {
        return None;
    }

    let scale = requested as f64 / current as f64;
    let scaled = |dim: u32| ((dim as f64 * scale).round() as u32).max(1);
    let target = (scaled(width), scaled(height));

    if target == (width, height) {
        None
    } else {
        Some(target)
    }
}

/// Resample `buffer` so its short edge equals `short_edge`.
///
/// When nothing needs to change the same buffer is handed back, allocation
/// included.
pub fn resize_to_short_edge(buffer: PixelBuffer, short_edge: Option<u32>) -> Result<PixelBuffer> {
    let (width, height) = buffer.dimensions();
    match short_edge_dimensions(width, height, short_edge) {
        None => Ok(buffer),
        Some((dst_width, dst_height)) => resize_exact(buffer, dst_width, dst_height),
    }
}

/// Resample to exactly `dst_width` x `dst_height`.
pub fn resize_exact(buffer: PixelBuffer, dst_width: u32, dst_height: u32) -> Result<PixelBuffer> {
    let (src_width, src_height) = buffer.dimensions();
    let source_dims = (src_width, src_height);
    let target_dims = (dst_width, dst_height);

    if dst_width == 0 || dst_height == 0 {
        return Err(ConvertError::resize_failed(
            source_dims,
            target_dims,
            "invalid dimensions for resize",
        ));
    }
    // the target is caller-controlled; reject it before any allocation
    check_dimensions(dst_width, dst_height)
        .map_err(|err| ConvertError::resize_failed(source_dims, target_dims, err.to_string()))?;

    let opaque = buffer.is_opaque();
    let mut pixels = buffer.into_raw();

    let resized = match resize_with_fir(&mut pixels, source_dims, target_dims, opaque) {
        Ok(resized) => resized,
        Err(err) => {
            tracing::debug!(error = %err, "fast_image_resize failed, using image crate fallback");
            resize_with_image_crate(pixels, source_dims, target_dims).map_err(|fallback_err| {
                ConvertError::resize_failed(
                    source_dims,
                    target_dims,
                    format!("{err}; image crate fallback failed: {fallback_err}"),
                )
            })?
        }
    };

    PixelBuffer::new(dst_width, dst_height, resized)
}

fn resize_with_fir(
    pixels: &mut [u8],
    (src_width, src_height): (u32, u32),
    (dst_width, dst_height): (u32, u32),
    opaque: bool,
) -> std::result::Result<Vec<u8>, String> {
    match fir::images::Image::from_slice_u8(src_width, src_height, pixels, PixelType::U8x4) {
        Ok(src_image) => resize_source_image(src_image, dst_width, dst_height, opaque),
        Err(ImageBufferError::InvalidBufferAlignment) => {
            let mut aligned = fir::images::Image::new(src_width, src_height, PixelType::U8x4);
            let aligned_buffer = aligned.buffer_mut();
            if aligned_buffer.len() != pixels.len() {
                return Err(format!(
                    "fir alignment fallback buffer mismatch. expected {} bytes, got {} bytes",
                    pixels.len(),
                    aligned_buffer.len()
                ));
            }
            aligned_buffer.copy_from_slice(pixels);
            resize_source_image(aligned, dst_width, dst_height, opaque)
        }
        Err(other) => Err(format!("fir source image error: {other:?}")),
    }
}

fn resize_source_image(
    mut src_image: fir::images::Image<'_>,
    dst_width: u32,
    dst_height: u32,
    opaque: bool,
) -> std::result::Result<Vec<u8>, String> {
    let mut dst_image = fir::images::Image::new(dst_width, dst_height, PixelType::U8x4);
    let options = ResizeOptions::new().resize_alg(fir::ResizeAlg::Convolution(fir::FilterType::Lanczos3));

    let mul_div = MulDiv::default();
    if !opaque {
        mul_div
            .multiply_alpha_inplace(&mut src_image)
            .map_err(|e| format!("failed to premultiply alpha: {e}"))?;
    }

    let mut resizer = fir::Resizer::new();
    resizer
        .resize(&src_image, &mut dst_image, &options)
        .map_err(|e| format!("fir resize error: {e:?}"))?;

    if !opaque {
        mul_div
            .divide_alpha_inplace(&mut dst_image)
            .map_err(|e| format!("failed to unpremultiply alpha: {e}"))?;
    }

    let out = dst_image.into_vec();
    if out.len() != dst_width as usize * dst_height as usize * CHANNELS {
        return Err("fir produced a buffer of unexpected size".to_string());
    }
    Ok(out)
}

fn resize_with_image_crate(
    pixels: Vec<u8>,
    (src_width, src_height): (u32, u32),
    (dst_width, dst_height): (u32, u32),
) -> std::result::Result<Vec<u8>, String> {
    let rgba = RgbaImage::from_raw(src_width, src_height, pixels)
        .ok_or_else(|| "failed to build rgba image for fallback resize".to_string())?;
    let resized = image::imageops::resize(&rgba, dst_width, dst_height, FilterType::Lanczos3);
    Ok(resized.into_raw())
}
