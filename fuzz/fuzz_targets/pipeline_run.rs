#![no_main]

//! Fuzz target for the whole conversion of one task.
//! Arbitrary bytes go in as the source; only panics and crashes matter,
//! conversion errors are expected.

use arbitrary::Arbitrary;
use colorport::{convert, ConversionTask, SourceFormat, TargetFormat, WorkingProfile};
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
struct Input {
    source_png: bool,
    target: u8,
    adobe: bool,
    quality: u8,
    short_edge: Option<u16>,
    buffer: Vec<u8>,
}

fuzz_target!(|input: Input| {
    let source = if input.source_png {
        SourceFormat::Png
    } else {
        SourceFormat::Jpeg
    };
    // AVIF is slow enough to starve the fuzzer; it gets its own unit tests
    let target = match input.target % 4 {
        0 => TargetFormat::Jpeg,
        1 => TargetFormat::Png,
        2 => TargetFormat::Webp,
        _ => TargetFormat::Tiff,
    };
    let profile = if input.adobe {
        WorkingProfile::AdobeRgb
    } else {
        WorkingProfile::Srgb
    };

    let mut task = ConversionTask::new("fuzz", source, target, profile, input.buffer)
        .with_quality(input.quality);
    if let Some(edge) = input.short_edge {
        task = task.with_short_edge(edge as u32);
    }
    let _ = convert(task);
});
