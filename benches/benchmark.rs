use colorport::engine::{
    convert_profile, detect_profile, encode_container, resize_to_short_edge, PixelBuffer,
};
use colorport::{SourceFormat, WorkingProfile};
use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use std::hint::black_box;

fn gradient(width: u32, height: u32) -> PixelBuffer {
    let data = (0..height)
        .flat_map(|y| (0..width).flat_map(move |x| [(x % 256) as u8, (y % 256) as u8, 128, 255]))
        .collect();
    PixelBuffer::new(width, height, data).unwrap()
}

fn bench_convert_profile(c: &mut Criterion) {
    let mut group = c.benchmark_group("convert_profile");
    // below and above the row-parallel threshold
    for (width, height) in [(128, 128), (1024, 768)] {
        let source = gradient(width, height);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{width}x{height}")),
            &source,
            |b, source| {
                b.iter_batched(
                    || source.clone(),
                    |mut buffer| {
                        convert_profile(&mut buffer, WorkingProfile::Srgb, WorkingProfile::AdobeRgb);
                        black_box(buffer)
                    },
                    BatchSize::LargeInput,
                )
            },
        );
    }
    group.finish();
}

fn bench_resize(c: &mut Criterion) {
    let source = gradient(1600, 1200);
    c.bench_function("resize 1600x1200 -> short edge 300", |b| {
        b.iter_batched(
            || source.clone(),
            |buffer| black_box(resize_to_short_edge(buffer, Some(300)).unwrap()),
            BatchSize::LargeInput,
        )
    });
}

fn bench_encode_container(c: &mut Criterion) {
    let source = gradient(1024, 768);
    c.bench_function("encode_container 1024x768", |b| {
        b.iter(|| encode_container(black_box(&source)).unwrap())
    });
}

fn bench_detect_profile(c: &mut Criterion) {
    // SOI, a long APP1, an APP2 ICC segment, then SOS
    let mut jpeg = vec![0xFF, 0xD8, 0xFF, 0xE1, 0xFF, 0xFF];
    jpeg.extend(std::iter::repeat(0).take(0xFFFD));
    let mut icc = b"ICC_PROFILE\0\x01\x01".to_vec();
    icc.extend(std::iter::repeat(0).take(400));
    icc.extend_from_slice(b"Adobe RGB (1998)");
    jpeg.extend_from_slice(&[0xFF, 0xE2]);
    jpeg.extend_from_slice(&((icc.len() + 2) as u16).to_be_bytes());
    jpeg.extend_from_slice(&icc);
    jpeg.extend_from_slice(&[0xFF, 0xDA, 0x00, 0x02, 0xFF, 0xD9]);

    c.bench_function("detect_profile", |b| {
        b.iter(|| detect_profile(SourceFormat::Jpeg, black_box(&jpeg)))
    });
}

criterion_group!(
    benches,
    bench_convert_profile,
    bench_resize,
    bench_encode_container,
    bench_detect_profile
);
criterion_main!(benches);
