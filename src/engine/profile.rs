// src/engine/profile.rs
//
// Embedded color profile detection.
// Walks JPEG marker segments looking for an APP2 ICC_PROFILE payload and
// classifies it by the description text it carries. Never decodes pixels.

use crate::formats::{ColorProfile, SourceFormat};

/// ICC profile signature at the start of an APP2 payload
pub const ICC_PROFILE_SIGNATURE: &[u8; 12] = b"ICC_PROFILE\0";

const MARKER_PREFIX: u8 = 0xFF;
const SOI: u8 = 0xD8;
const EOI: u8 = 0xD9;
const SOS: u8 = 0xDA;
const APP2: u8 = 0xE2;
const TEM: u8 = 0x01;

const ADOBE_RGB_NEEDLE: &[u8] = b"adobe rgb";
const SRGB_NEEDLES: [&[u8]; 2] = [b"srgb", b"iec61966"];

/// Classify the color profile embedded in `bytes`.
///
/// PNG sources are always reported as sRGB. Anything malformed,
/// truncated or untagged yields `ColorProfile::Unknown`.
pub fn detect_profile(source: SourceFormat, bytes: &[u8]) -> ColorProfile {
    if !source.supports_embedded_profile() {
        return ColorProfile::Srgb;
    }
    detect_jpeg_profile(bytes)
}

fn detect_jpeg_profile(bytes: &[u8]) -> ColorProfile {
    if bytes.len() < 2 || bytes[0] != MARKER_PREFIX || bytes[1] != SOI {
        return ColorProfile::Unknown;
    }

    let mut pos = 2;
    loop {
        if pos + 1 >= bytes.len() || bytes[pos] != MARKER_PREFIX {
            return ColorProfile::Unknown;
        }
        // fill bytes
        while pos + 1 < bytes.len() && bytes[pos + 1] == MARKER_PREFIX {
            pos += 1;
        }
        if pos + 1 >= bytes.len() {
            return ColorProfile::Unknown;
        }

        let marker = bytes[pos + 1];
        match marker {
            SOS | EOI => return ColorProfile::Unknown,
            TEM | 0xD0..=0xD7 => {
                pos += 2;
                continue;
            }
            _ => {}
        }

        if pos + 4 > bytes.len() {
            return ColorProfile::Unknown;
        }
        let length = u16::from_be_bytes([bytes[pos + 2], bytes[pos + 3]]) as usize;
        if length < 2 || pos + 2 + length > bytes.len() {
            return ColorProfile::Unknown;
        }

        if marker == APP2 {
            let payload = &bytes[pos + 4..pos + 2 + length];
            if payload.starts_with(ICC_PROFILE_SIGNATURE) {
                if let Some(profile) = classify_icc_payload(payload) {
                    return profile;
                }
            }
        }

        pos += 2 + length;
    }
}

/// Match the payload's text case-insensitively. Adobe RGB wins over sRGB
/// when both appear.
pub(crate) fn classify_icc_payload(payload: &[u8]) -> Option<ColorProfile> {
    // Latin-1 maps bytes 1:1 onto code points, so ASCII folding is enough
    // for ASCII needles.
    let lowered = payload.to_ascii_lowercase();
    if contains(&lowered, ADOBE_RGB_NEEDLE) {
        return Some(ColorProfile::AdobeRgb);
    }
    if SRGB_NEEDLES.iter().any(|needle| contains(&lowered, needle)) {
        return Some(ColorProfile::Srgb);
    }
    None
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}
