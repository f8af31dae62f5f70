#![no_main]

//! Fuzz target for the JPEG APP2 marker walk.
//! The detector must never panic or read out of bounds, whatever the input.

use colorport::engine::detect_profile;
use colorport::SourceFormat;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = detect_profile(SourceFormat::Jpeg, data);

    // force the walk past the SOI check
    let mut jpeg = vec![0xFF, 0xD8];
    jpeg.extend_from_slice(data);
    let _ = detect_profile(SourceFormat::Jpeg, &jpeg);

    // an APP2 segment whose declared length comes from the input
    if data.len() >= 2 {
        let mut app2 = vec![0xFF, 0xD8, 0xFF, 0xE2, data[0], data[1]];
        app2.extend_from_slice(b"ICC_PROFILE\0");
        app2.extend_from_slice(&data[2..]);
        let _ = detect_profile(SourceFormat::Jpeg, &app2);
    }
});
