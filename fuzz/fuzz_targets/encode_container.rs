#![no_main]

//! Fuzz target for the baseline TIFF writer.
//! Checks the container length matches its fixed layout for any surface.

use arbitrary::{Arbitrary, Unstructured};
use colorport::engine::{encode_container, PixelBuffer};
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
struct Surface {
    width: u8,
    height: u8,
}

fuzz_target!(|data: &[u8]| {
    let mut unstructured = Unstructured::new(data);
    let Ok(surface) = Surface::arbitrary(&mut unstructured) else {
        return;
    };

    // max 128x128 keeps allocations small
    let w = (surface.width as u32 % 128).max(1);
    let h = (surface.height as u32 % 128).max(1);
    let len = (w * h * 4) as usize;
    let rest = unstructured.take_rest();
    let pixels: Vec<u8> = (0..len)
        .map(|i| rest.get(i % rest.len().max(1)).copied().unwrap_or(0))
        .collect();

    let Ok(buffer) = PixelBuffer::new(w, h, pixels) else {
        return;
    };
    let Ok(tiff) = encode_container(&buffer) else {
        return;
    };
    assert_eq!(tiff.len(), 140 + (w * h * 3) as usize);
});
