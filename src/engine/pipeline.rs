// src/engine/pipeline.rs
//
// The conversion pipeline for a single task:
// 1. ensure codecs are ready
// 2. decode the source bytes into RGBA
// 3. detect the embedded profile on the raw bytes and resolve it
// 4. resample to the requested short edge
// 5. convert into the target working space
// 6. encode to the target format
//
// Progress is reported at fixed milestones, all below 100; completion is
// signalled by the returned artifact, never by a progress value.

use crate::codecs;
use crate::engine::buffer::PixelBuffer;
use crate::engine::color::convert_profile;
use crate::engine::decoder::decode;
use crate::engine::encoder::encode;
use crate::engine::pool::TaskRunner;
use crate::engine::profile::detect_profile;
use crate::engine::resize::resize_to_short_edge;
use crate::error::Result;
use crate::formats::{ConversionArtifact, ConversionTask};
use std::time::Instant;
use tracing::debug;

/// Progress milestones reported by `ConversionPipeline::run`.
pub mod progress {
    /// Codecs ready
    pub const READY: u8 = 5;
    /// Source decoded
    pub const DECODED: u8 = 35;
    /// Pixels in the target working space
    pub const CONVERTED: u8 = 70;
    /// About to hand pixels to the encoder
    pub const ENCODING: u8 = 85;
}

/// Per-stage wall clock, logged at debug level.
struct StageTimer<'a> {
    id: &'a str,
    start_total: Instant,
    stage_start: Instant,
}

impl<'a> StageTimer<'a> {
    fn new(id: &'a str) -> Self {
        let now = Instant::now();
        Self {
            id,
            start_total: now,
            stage_start: now,
        }
    }

    fn mark(&mut self, stage: &'static str) {
        let elapsed_ms = self.stage_start.elapsed().as_secs_f64() * 1000.0;
        debug!(task = self.id, stage, elapsed_ms, "stage done");
        self.stage_start = Instant::now();
    }

    fn total_ms(&self) -> f64 {
        self.start_total.elapsed().as_secs_f64() * 1000.0
    }
}

/// Stateless; one instance can serve every execution context.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConversionPipeline;

impl ConversionPipeline {
    pub fn new() -> Self {
        Self
    }

    /// Run `task` to completion, calling `progress` at each milestone.
    ///
    /// Any stage failure aborts the task; nothing partial is returned.
    pub fn run(
        &self,
        task: ConversionTask,
        progress: &mut dyn FnMut(u8),
    ) -> Result<ConversionArtifact> {
        let ConversionTask {
            id,
            source,
            target,
            target_profile,
            quality,
            short_edge,
            buffer: encoded,
        } = task;
        let mut timer = StageTimer::new(&id);

        codecs::ensure_ready()?;
        progress(progress::READY);

        let pixels = decode(source, &encoded)?;
        timer.mark("decode");
        progress(progress::DECODED);

        let detected = detect_profile(source, &encoded);
        // the encoded source is no longer needed
        drop(encoded);
        let working = detected.resolve();
        debug!(task = %id, %source, %detected, %working, "profile resolved");

        let mut pixels: PixelBuffer = resize_to_short_edge(pixels, short_edge)?;
        timer.mark("resize");

        convert_profile(&mut pixels, working, target_profile);
        timer.mark("convert");
        progress(progress::CONVERTED);

        progress(progress::ENCODING);
        let bytes = encode(&pixels, target, quality)?;
        timer.mark("encode");

        debug!(
            task = %id,
            %target,
            width = pixels.width(),
            height = pixels.height(),
            output_len = bytes.len(),
            total_ms = timer.total_ms(),
            "conversion done"
        );

        Ok(ConversionArtifact {
            bytes,
            format: target,
            mime: target.mime(),
            source_profile: detected,
        })
    }
}

impl TaskRunner for ConversionPipeline {
    fn run(
        &self,
        task: ConversionTask,
        progress: &mut dyn FnMut(u8),
    ) -> Result<ConversionArtifact> {
        ConversionPipeline::run(self, task, progress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;
    use crate::formats::{ColorProfile, SourceFormat, TargetFormat, WorkingProfile};
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    fn png(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(color)))
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    fn run(task: ConversionTask) -> (Result<ConversionArtifact>, Vec<u8>) {
        let mut seen = Vec::new();
        let result = ConversionPipeline::new().run(task, &mut |p| seen.push(p));
        (result, seen)
    }

    #[test]
    fn png_to_tiff_with_resize() {
        let task = ConversionTask::new(
            "t1",
            SourceFormat::Png,
            TargetFormat::Tiff,
            WorkingProfile::Srgb,
            png(80, 60, [255, 0, 0]),
        )
        .with_short_edge(30);
        let (result, seen) = run(task);
        let artifact = result.unwrap();

        assert_eq!(artifact.format, TargetFormat::Tiff);
        assert_eq!(artifact.mime, "image/tiff");
        assert_eq!(artifact.source_profile, ColorProfile::Srgb);
        assert_eq!(artifact.bytes.len(), 140 + 40 * 30 * 3);
        assert_eq!(&artifact.bytes[140..143], &[255, 0, 0]);
        assert_eq!(
            seen,
            vec![
                progress::READY,
                progress::DECODED,
                progress::CONVERTED,
                progress::ENCODING
            ]
        );
    }

    #[test]
    fn converts_into_adobe_rgb() {
        let task = ConversionTask::new(
            "t2",
            SourceFormat::Png,
            TargetFormat::Tiff,
            WorkingProfile::AdobeRgb,
            png(2, 2, [255, 0, 0]),
        );
        let artifact = run(task).0.unwrap();
        assert_eq!(&artifact.bytes[140..143], &[219, 0, 0]);
    }

    #[test]
    fn decode_failure_stops_before_decoded_milestone() {
        let task = ConversionTask::new(
            "t3",
            SourceFormat::Jpeg,
            TargetFormat::Png,
            WorkingProfile::Srgb,
            b"not a jpeg".to_vec(),
        );
        let (result, seen) = run(task);
        assert_eq!(result.unwrap_err().category(), ErrorCategory::Decode);
        assert_eq!(seen, vec![progress::READY]);
    }

    #[test]
    fn milestones_are_increasing_and_below_100() {
        let milestones = [
            progress::READY,
            progress::DECODED,
            progress::CONVERTED,
            progress::ENCODING,
        ];
        assert!(milestones.windows(2).all(|w| w[0] < w[1]));
        assert!(milestones.iter().all(|&p| p < 100));
    }
}
