use colorport::engine::{
    convert_pixel, convert_profile, detect_profile, encode_container, short_edge_dimensions,
    PixelBuffer,
};
use colorport::{ColorProfile, SourceFormat, WorkingProfile};
use proptest::prelude::*;

/// Largest per-channel distance from grey over which the sRGB -> Adobe RGB
/// -> sRGB round trip stays within one unit. Saturated colors drift further
/// because 8-bit Adobe RGB quantizes the shared gamut more coarsely.
const NEUTRAL_SPREAD: i16 = 6;

fn profile_strategy() -> impl Strategy<Value = WorkingProfile> {
    prop_oneof![Just(WorkingProfile::Srgb), Just(WorkingProfile::AdobeRgb)]
}

fn near_neutral_strategy() -> impl Strategy<Value = [u8; 3]> {
    (
        0i16..=255,
        -NEUTRAL_SPREAD..=NEUTRAL_SPREAD,
        -NEUTRAL_SPREAD..=NEUTRAL_SPREAD,
        -NEUTRAL_SPREAD..=NEUTRAL_SPREAD,
    )
        .prop_map(|(v, dr, dg, db)| {
            let c = |d: i16| (v + d).clamp(0, 255) as u8;
            [c(dr), c(dg), c(db)]
        })
}

fn max_channel_diff(a: [u8; 3], b: [u8; 3]) -> u8 {
    a.iter().zip(b).map(|(x, y)| x.abs_diff(y)).max().unwrap_or(0)
}

fn surface_strategy() -> impl Strategy<Value = PixelBuffer> {
    (1u32..=24, 1u32..=24).prop_flat_map(|(w, h)| {
        proptest::collection::vec(any::<u8>(), (w * h * 4) as usize)
            .prop_map(move |data| PixelBuffer::new(w, h, data).unwrap())
    })
}

proptest! {
    #[test]
    fn same_profile_is_identity(
        rgb in any::<[u8; 3]>(),
        profile in profile_strategy(),
    ) {
        prop_assert_eq!(convert_pixel(rgb, profile, profile), rgb);
    }

    #[test]
    fn grey_round_trip_within_one(v in any::<u8>()) {
        let grey = [v, v, v];
        let adobe = convert_pixel(grey, WorkingProfile::Srgb, WorkingProfile::AdobeRgb);
        let back = convert_pixel(adobe, WorkingProfile::AdobeRgb, WorkingProfile::Srgb);
        prop_assert!(max_channel_diff(grey, back) <= 1, "{:?} -> {:?} -> {:?}", grey, adobe, back);
    }

    #[test]
    fn near_neutral_round_trip_within_one(rgb in near_neutral_strategy()) {
        let adobe = convert_pixel(rgb, WorkingProfile::Srgb, WorkingProfile::AdobeRgb);
        let back = convert_pixel(adobe, WorkingProfile::AdobeRgb, WorkingProfile::Srgb);
        prop_assert!(max_channel_diff(rgb, back) <= 1, "{:?} -> {:?} -> {:?}", rgb, adobe, back);
    }

    #[test]
    fn buffer_conversion_matches_pixel_conversion(
        surface in surface_strategy(),
        from in profile_strategy(),
        to in profile_strategy(),
    ) {
        let mut converted = surface.clone();
        convert_profile(&mut converted, from, to);
        for (before, after) in surface.as_raw().chunks_exact(4).zip(converted.as_raw().chunks_exact(4)) {
            let expected = convert_pixel([before[0], before[1], before[2]], from, to);
            prop_assert_eq!(&after[..3], &expected[..]);
            prop_assert_eq!(after[3], before[3]);
        }
    }

    #[test]
    fn short_edge_lands_exactly(
        width in 1u32..=6000,
        height in 1u32..=6000,
        short_edge in 1u32..=3000,
    ) {
        let short = width.min(height);
        match short_edge_dimensions(width, height, Some(short_edge)) {
            None => prop_assert_eq!(short, short_edge),
            Some((w, h)) => {
                prop_assert_eq!(w.min(h), short_edge);
                // the long edge keeps the aspect ratio up to rounding
                let (long, new_long) = if width >= height { (width, w) } else { (height, h) };
                let exact = long as f64 * short_edge as f64 / short as f64;
                prop_assert!((new_long as f64 - exact).abs() <= 0.5 + 1e-9);
            }
        }
    }

    #[test]
    fn no_short_edge_means_no_resample(width in 1u32..=6000, height in 1u32..=6000) {
        prop_assert_eq!(short_edge_dimensions(width, height, None), None);
        prop_assert_eq!(short_edge_dimensions(width, height, Some(0)), None);
    }

    #[test]
    fn container_layout_is_fixed(surface in surface_strategy()) {
        let (w, h) = surface.dimensions();
        let tiff = encode_container(&surface).unwrap();
        prop_assert_eq!(tiff.len(), 140 + (w * h * 3) as usize);
        prop_assert_eq!(&tiff[..8], &[0x49, 0x49, 0x2A, 0x00, 0x08, 0x00, 0x00, 0x00][..]);
        // ImageWidth and ImageLength are the first two IFD entries
        prop_assert_eq!(u32::from_le_bytes(tiff[18..22].try_into().unwrap()), w);
        prop_assert_eq!(u32::from_le_bytes(tiff[30..34].try_into().unwrap()), h);
        prop_assert_eq!(&tiff[140..143], &surface.as_raw()[..3]);
    }

    #[test]
    fn detector_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
        let _ = detect_profile(SourceFormat::Jpeg, &bytes);
        let mut jpeg = vec![0xFF, 0xD8];
        jpeg.extend_from_slice(&bytes);
        let _ = detect_profile(SourceFormat::Jpeg, &jpeg);
        prop_assert_eq!(detect_profile(SourceFormat::Png, &bytes), ColorProfile::Srgb);
    }

    #[test]
    fn non_jpeg_prefix_is_unknown(
        first in any::<u8>().prop_filter("not a marker prefix", |b| *b != 0xFF),
        rest in proptest::collection::vec(any::<u8>(), 0..64),
    ) {
        let mut bytes = vec![first];
        bytes.extend(rest);
        prop_assert_eq!(detect_profile(SourceFormat::Jpeg, &bytes), ColorProfile::Unknown);
    }
}
