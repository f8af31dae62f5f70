// src/codecs/avif_safe.rs
//
// RAII wrappers around the libavif encoder FFI.
// Every raw pointer lives inside one of these types and is released in
// Drop, so encoder.rs never touches `unsafe`.
#![deny(unsafe_op_in_unsafe_fn)]

use crate::engine::{MAX_DIMENSION, MAX_PIXELS};
use crate::error::ConvertError;
use libavif_sys::*;
use std::ffi::CStr;
use std::ptr::NonNull;

type AvifResult<T> = std::result::Result<T, ConvertError>;

fn check(result: avifResult, what: &str) -> AvifResult<()> {
    if result == AVIF_RESULT_OK {
        Ok(())
    } else {
        Err(ConvertError::encode_failed(
            "avif",
            format!("{what}: {result:?}"),
        ))
    }
}

fn validate_dimensions(width: u32, height: u32) -> AvifResult<()> {
    if width == 0 || height == 0 {
        return Err(ConvertError::encode_failed(
            "avif",
            "width and height must be greater than 0",
        ));
    }
    if width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(ConvertError::encode_failed(
            "avif",
            format!("dimensions {width}x{height} exceed MAX_DIMENSION {MAX_DIMENSION}"),
        ));
    }
    let pixels = width as u64 * height as u64;
    if pixels > MAX_PIXELS {
        return Err(ConvertError::encode_failed(
            "avif",
            format!("pixel count {pixels} exceeds MAX_PIXELS {MAX_PIXELS}"),
        ));
    }
    Ok(())
}

/// Owned `avifImage`.
pub struct SafeAvifImage {
    ptr: NonNull<avifImage>,
    width: u32,
    height: u32,
}

// The image is only ever touched through &mut self.
unsafe impl Send for SafeAvifImage {}

impl SafeAvifImage {
    pub fn new(width: u32, height: u32, depth: u32, pixel_format: avifPixelFormat) -> AvifResult<Self> {
        validate_dimensions(width, height)?;
        let raw = unsafe { avifImageCreate(width, height, depth, pixel_format) };
        let ptr = NonNull::new(raw)
            .ok_or_else(|| ConvertError::encode_failed("avif", "failed to create AVIF image"))?;
        Ok(Self { ptr, width, height })
    }

    pub fn set_color_properties(
        &mut self,
        primaries: u16,
        transfer: u16,
        matrix: u16,
        yuv_range: avifRange,
    ) {
        let raw = self.ptr.as_ptr();
        unsafe {
            (*raw).colorPrimaries = primaries;
            (*raw).transferCharacteristics = transfer;
            (*raw).matrixCoefficients = matrix;
            (*raw).yuvRange = yuv_range;
        }
    }

    /// Fill the YUV planes from interleaved RGBA8 `pixels`.
    pub fn set_rgba(&mut self, pixels: &[u8]) -> AvifResult<()> {
        let row_bytes = self
            .width
            .checked_mul(4)
            .ok_or_else(|| ConvertError::encode_failed("avif", "row bytes overflow"))?;
        let expected = row_bytes as usize * self.height as usize;
        if pixels.len() != expected {
            return Err(ConvertError::encode_failed(
                "avif",
                format!("expected {expected} RGBA bytes, got {}", pixels.len()),
            ));
        }

        check(
            unsafe { avifImageAllocatePlanes(self.ptr.as_ptr(), AVIF_PLANES_YUV as u32) },
            "failed to allocate YUV planes",
        )?;

        let mut rgb: avifRGBImage = unsafe { std::mem::zeroed() };
        unsafe {
            avifRGBImageSetDefaults(&mut rgb, self.ptr.as_ptr());
        }
        rgb.format = AVIF_RGB_FORMAT_RGBA;
        rgb.depth = 8;
        // libavif only reads from the RGB side during RGB->YUV
        rgb.pixels = pixels.as_ptr() as *mut u8;
        rgb.rowBytes = row_bytes;

        check(
            unsafe { avifImageRGBToYUV(self.ptr.as_ptr(), &rgb) },
            "failed to convert RGB to YUV",
        )
    }

    /// Copy the alpha channel of interleaved RGBA8 `pixels` into a
    /// freshly allocated alpha plane.
    pub fn set_alpha_from_rgba(&mut self, pixels: &[u8]) -> AvifResult<()> {
        let width = self.width as usize;
        let height = self.height as usize;
        if pixels.len() != width * height * 4 {
            return Err(ConvertError::encode_failed("avif", "alpha source size mismatch"));
        }

        check(
            unsafe { avifImageAllocatePlanes(self.ptr.as_ptr(), AVIF_PLANES_A as u32) },
            "failed to allocate alpha plane",
        )?;

        let (plane, row_bytes) = unsafe {
            let raw = self.ptr.as_ptr();
            ((*raw).alphaPlane, (*raw).alphaRowBytes as usize)
        };
        if plane.is_null() || row_bytes < width {
            return Err(ConvertError::encode_failed("avif", "alpha plane is not allocated"));
        }

        let plane = unsafe { std::slice::from_raw_parts_mut(plane, row_bytes * height) };
        for (y, src_row) in pixels.chunks_exact(width * 4).enumerate() {
            let dst_row = &mut plane[y * row_bytes..y * row_bytes + width];
            for (dst, px) in dst_row.iter_mut().zip(src_row.chunks_exact(4)) {
                *dst = px[3];
            }
        }
        Ok(())
    }
}

impl Drop for SafeAvifImage {
    fn drop(&mut self) {
        unsafe { avifImageDestroy(self.ptr.as_ptr()) };
    }
}

/// Owned `avifEncoder`.
pub struct SafeAvifEncoder {
    ptr: NonNull<avifEncoder>,
}

unsafe impl Send for SafeAvifEncoder {}

impl SafeAvifEncoder {
    pub fn new() -> AvifResult<Self> {
        let raw = unsafe { avifEncoderCreate() };
        let ptr = NonNull::new(raw)
            .ok_or_else(|| ConvertError::encode_failed("avif", "failed to create AVIF encoder"))?;
        Ok(Self { ptr })
    }

    /// `quality` is libavif's 0-100 scale; `speed` 0 (slowest) to 10.
    pub fn configure(&mut self, quality: u8, quality_alpha: u8, speed: i32, max_threads: i32) {
        let raw = self.ptr.as_ptr();
        unsafe {
            (*raw).quality = quality as i32;
            (*raw).qualityAlpha = quality_alpha as i32;
            (*raw).speed = speed;
            (*raw).maxThreads = max_threads;
        }
    }

    /// Encode a single still image and return the container bytes.
    pub fn encode_single(&mut self, image: &mut SafeAvifImage) -> AvifResult<Vec<u8>> {
        check(
            unsafe {
                avifEncoderAddImage(
                    self.ptr.as_ptr(),
                    image.ptr.as_ptr(),
                    1,
                    AVIF_ADD_IMAGE_FLAG_SINGLE as u32,
                )
            },
            "failed to add image to encoder",
        )?;

        let mut output = SafeAvifRwData::new();
        check(
            unsafe { avifEncoderFinish(self.ptr.as_ptr(), &mut output.data) },
            "failed to finish encoding",
        )?;
        Ok(output.as_slice().to_vec())
    }
}

impl Drop for SafeAvifEncoder {
    fn drop(&mut self) {
        unsafe { avifEncoderDestroy(self.ptr.as_ptr()) };
    }
}

/// Owned `avifRWData` output buffer.
struct SafeAvifRwData {
    data: avifRWData,
}

impl SafeAvifRwData {
    fn new() -> Self {
        Self {
            data: unsafe { std::mem::zeroed() },
        }
    }

    fn as_slice(&self) -> &[u8] {
        if self.data.data.is_null() || self.data.size == 0 {
            &[]
        } else {
            unsafe { std::slice::from_raw_parts(self.data.data, self.data.size) }
        }
    }
}

impl Drop for SafeAvifRwData {
    fn drop(&mut self) {
        unsafe { avifRWDataFree(&mut self.data) };
    }
}

/// Name of the AV1 encoder compiled into libavif, if any.
pub fn encoder_codec_name() -> Option<String> {
    let name = unsafe {
        avifCodecName(
            AVIF_CODEC_CHOICE_AUTO,
            AVIF_CODEC_FLAG_CAN_ENCODE as avifCodecFlags,
        )
    };
    if name.is_null() {
        return None;
    }
    Some(unsafe { CStr::from_ptr(name) }.to_string_lossy().into_owned())
}

/// libavif version string.
pub fn libavif_version() -> String {
    let version = unsafe { avifVersion() };
    if version.is_null() {
        return "unknown".to_string();
    }
    unsafe { CStr::from_ptr(version) }
        .to_string_lossy()
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_dimensions() {
        let err = SafeAvifImage::new(0, 10, 8, AVIF_PIXEL_FORMAT_YUV420)
            .err()
            .expect("zero width should fail");
        assert!(err.to_string().contains("greater than 0"));
    }

    #[test]
    fn rejects_dimension_limits() {
        let err = SafeAvifImage::new(MAX_DIMENSION + 1, 10, 8, AVIF_PIXEL_FORMAT_YUV420)
            .err()
            .expect("oversized width should fail");
        assert!(err.to_string().contains("MAX_DIMENSION"));
    }

    #[test]
    fn rejects_short_rgba_buffer() {
        let mut img = SafeAvifImage::new(4, 2, 8, AVIF_PIXEL_FORMAT_YUV420).unwrap();
        let err = img.set_rgba(&[0u8; 31]).unwrap_err();
        assert!(err.to_string().contains("expected 32"));
    }

    #[test]
    fn encodes_small_image() {
        let pixels: Vec<u8> = (0..16 * 16).flat_map(|i| [i as u8, 64, 200, 255]).collect();
        let mut img = SafeAvifImage::new(16, 16, 8, AVIF_PIXEL_FORMAT_YUV420).unwrap();
        img.set_rgba(&pixels).unwrap();
        img.set_alpha_from_rgba(&pixels).unwrap();

        let mut encoder = SafeAvifEncoder::new().unwrap();
        encoder.configure(60, 60, 10, 1);
        let bytes = encoder.encode_single(&mut img).unwrap();
        assert_eq!(&bytes[4..8], b"ftyp");
    }

    #[test]
    fn image_drop_runs_on_unwind() {
        let result = std::panic::catch_unwind(|| {
            let _img = SafeAvifImage::new(2, 2, 8, AVIF_PIXEL_FORMAT_YUV444).unwrap();
            let _enc = SafeAvifEncoder::new().unwrap();
            panic!("force unwind");
        });
        assert!(result.is_err());
    }

    #[test]
    fn reports_version() {
        assert!(!libavif_version().is_empty());
    }
}
