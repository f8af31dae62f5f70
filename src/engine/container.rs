// src/engine/container.rs
//
// Minimal baseline TIFF writer: one little-endian IFD, one strip,
// uncompressed 8-bit RGB. No external codec involved.

use crate::engine::buffer::{PixelBuffer, CHANNELS};
use crate::error::{ConvertError, Result};

const HEADER_LEN: usize = 8;
const ENTRY_COUNT: u16 = 10;
const ENTRY_LEN: usize = 12;
const IFD_OFFSET: u32 = HEADER_LEN as u32;
/// Entry count (2) + entries + next-IFD pointer (4)
const IFD_LEN: usize = 2 + ENTRY_COUNT as usize * ENTRY_LEN + 4;
const BITS_PER_SAMPLE_OFFSET: u32 = (HEADER_LEN + IFD_LEN) as u32;
const PIXEL_DATA_OFFSET: u32 = BITS_PER_SAMPLE_OFFSET + 6;

const SAMPLES_PER_PIXEL: u16 = 3;

/// TIFF field types
#[derive(Clone, Copy)]
#[repr(u16)]
enum FieldType {
    Short = 3,
    Long = 4,
}

/// Baseline tags, ascending
mod tag {
    pub const IMAGE_WIDTH: u16 = 256;
    pub const IMAGE_LENGTH: u16 = 257;
    pub const BITS_PER_SAMPLE: u16 = 258;
    pub const COMPRESSION: u16 = 259;
    pub const PHOTOMETRIC_INTERPRETATION: u16 = 262;
    pub const STRIP_OFFSETS: u16 = 273;
    pub const SAMPLES_PER_PIXEL: u16 = 277;
    pub const ROWS_PER_STRIP: u16 = 278;
    pub const STRIP_BYTE_COUNTS: u16 = 279;
    pub const PLANAR_CONFIGURATION: u16 = 284;
}

struct Entry {
    tag: u16,
    field_type: FieldType,
    count: u32,
    value: u32,
}

impl Entry {
    fn short(tag: u16, value: u16) -> Self {
        Self {
            tag,
            field_type: FieldType::Short,
            count: 1,
            value: value as u32,
        }
    }

    fn long(tag: u16, value: u32) -> Self {
        Self {
            tag,
            field_type: FieldType::Long,
            count: 1,
            value,
        }
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.tag.to_le_bytes());
        out.extend_from_slice(&(self.field_type as u16).to_le_bytes());
        out.extend_from_slice(&self.count.to_le_bytes());
        // SHORT values are left-justified in the 4-byte field; in
        // little-endian that is the same as writing the u32.
        out.extend_from_slice(&self.value.to_le_bytes());
    }
}

/// Serialize `buffer` as an uncompressed RGB TIFF. Alpha is dropped.
pub fn encode_container(buffer: &PixelBuffer) -> Result<Vec<u8>> {
    let (width, height) = buffer.dimensions();
    let overflow = || {
        ConvertError::encode_failed(
            "tiff",
            format!("{width}x{height} payload does not fit 32-bit offsets"),
        )
    };

    let payload_len = (width as u64)
        .checked_mul(height as u64)
        .and_then(|p| p.checked_mul(SAMPLES_PER_PIXEL as u64))
        .ok_or_else(overflow)?;
    let strip_bytes = u32::try_from(payload_len).map_err(|_| overflow())?;
    strip_bytes.checked_add(PIXEL_DATA_OFFSET).ok_or_else(overflow)?;

    let entries = [
        Entry::long(tag::IMAGE_WIDTH, width),
        Entry::long(tag::IMAGE_LENGTH, height),
        Entry {
            tag: tag::BITS_PER_SAMPLE,
            field_type: FieldType::Short,
            count: SAMPLES_PER_PIXEL as u32,
            value: BITS_PER_SAMPLE_OFFSET,
        },
        Entry::short(tag::COMPRESSION, 1),
        // RGB
        Entry::short(tag::PHOTOMETRIC_INTERPRETATION, 2),
        Entry::long(tag::STRIP_OFFSETS, PIXEL_DATA_OFFSET),
        Entry::short(tag::SAMPLES_PER_PIXEL, SAMPLES_PER_PIXEL),
        Entry::long(tag::ROWS_PER_STRIP, height),
        Entry::long(tag::STRIP_BYTE_COUNTS, strip_bytes),
        // chunky
        Entry::short(tag::PLANAR_CONFIGURATION, 1),
    ];
    debug_assert_eq!(entries.len(), ENTRY_COUNT as usize);

    let mut out = Vec::with_capacity(PIXEL_DATA_OFFSET as usize + strip_bytes as usize);
    out.extend_from_slice(b"II");
    out.extend_from_slice(&42u16.to_le_bytes());
    out.extend_from_slice(&IFD_OFFSET.to_le_bytes());

    out.extend_from_slice(&ENTRY_COUNT.to_le_bytes());
    for entry in &entries {
        entry.write(&mut out);
    }
    // no further IFDs
    out.extend_from_slice(&0u32.to_le_bytes());

    for _ in 0..SAMPLES_PER_PIXEL {
        out.extend_from_slice(&8u16.to_le_bytes());
    }
    debug_assert_eq!(out.len(), PIXEL_DATA_OFFSET as usize);

    for px in buffer.as_raw().chunks_exact(CHANNELS) {
        out.extend_from_slice(&px[..3]);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_u16(bytes: &[u8], at: usize) -> u16 {
        u16::from_le_bytes([bytes[at], bytes[at + 1]])
    }

    fn read_u32(bytes: &[u8], at: usize) -> u32 {
        u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
    }

    #[test]
    fn layout_constants() {
        assert_eq!(BITS_PER_SAMPLE_OFFSET, 134);
        assert_eq!(PIXEL_DATA_OFFSET, 140);
    }

    #[test]
    fn two_by_two_red_is_byte_exact() {
        let buffer = PixelBuffer::filled(2, 2, [255, 0, 0, 255]).unwrap();
        let bytes = encode_container(&buffer).unwrap();

        let mut expected: Vec<u8> = vec![0x49, 0x49, 0x2A, 0x00, 0x08, 0x00, 0x00, 0x00, 10, 0];
        let entries: [(u16, u16, u32, u32); 10] = [
            (256, 4, 1, 2),
            (257, 4, 1, 2),
            (258, 3, 3, 134),
            (259, 3, 1, 1),
            (262, 3, 1, 2),
            (273, 4, 1, 140),
            (277, 3, 1, 3),
            (278, 4, 1, 2),
            (279, 4, 1, 12),
            (284, 3, 1, 1),
        ];
        for (tag, ty, count, value) in entries {
            expected.extend_from_slice(&tag.to_le_bytes());
            expected.extend_from_slice(&ty.to_le_bytes());
            expected.extend_from_slice(&count.to_le_bytes());
            expected.extend_from_slice(&value.to_le_bytes());
        }
        expected.extend_from_slice(&[0, 0, 0, 0]);
        expected.extend_from_slice(&[8, 0, 8, 0, 8, 0]);
        for _ in 0..4 {
            expected.extend_from_slice(&[255, 0, 0]);
        }

        assert_eq!(bytes.len(), 152);
        assert_eq!(bytes, expected);
    }

    #[test]
    fn entries_are_sorted_and_payload_matches() {
        let buffer = PixelBuffer::filled(3, 5, [1, 2, 3, 0]).unwrap();
        let bytes = encode_container(&buffer).unwrap();

        let count = read_u16(&bytes, 8) as usize;
        assert_eq!(count, 10);
        let tags: Vec<u16> = (0..count).map(|i| read_u16(&bytes, 10 + i * 12)).collect();
        assert!(tags.windows(2).all(|w| w[0] < w[1]));

        // StripByteCounts is entry 8
        assert_eq!(read_u32(&bytes, 10 + 8 * 12 + 8), 3 * 5 * 3);
        assert_eq!(bytes.len(), 140 + 3 * 5 * 3);
        assert_eq!(&bytes[140..143], &[1, 2, 3]);
    }

    #[test]
    fn header_fields_point_at_payload() {
        let buffer = PixelBuffer::filled(7, 1, [9, 8, 7, 255]).unwrap();
        let bytes = encode_container(&buffer).unwrap();
        assert_eq!(&bytes[..4], b"II*\0");
        assert_eq!(read_u32(&bytes, 4), 8);
        assert_eq!(read_u32(&bytes, 130), 0);
        assert_eq!(read_u32(&bytes, 10 + 5 * 12 + 8), 140);
    }
}
