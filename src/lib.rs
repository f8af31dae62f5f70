// lib.rs
//
// colorport: color-managed image conversion on a fixed-size worker pool.
//
// Tasks carry encoded JPEG or PNG bytes. Each one is decoded, its embedded
// profile detected, resampled to a short edge, converted between sRGB and
// Adobe RGB (1998) and encoded as JPEG, PNG, WebP, AVIF or baseline TIFF.

// jemalloc is not supported on Windows/MSVC
#[cfg(all(feature = "jemalloc", not(target_env = "msvc")))]
#[global_allocator]
static ALLOC: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

pub mod codecs;
pub mod engine;
pub mod error;
pub mod formats;

pub use engine::{ConversionPipeline, PoolConfig, PoolStatus, TaskRunner, WorkerPool};
pub use error::{ConvertError, ErrorCategory, Result};
pub use formats::{
    ColorProfile, ConversionArtifact, ConversionEvent, ConversionTask, SourceFormat,
    TargetFormat, WorkingProfile,
};

/// Run one task on the calling thread, without progress reporting.
pub fn convert(task: ConversionTask) -> Result<ConversionArtifact> {
    ConversionPipeline::new().run(task, &mut |_| {})
}

/// Crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_matches_manifest() {
        assert_eq!(version(), env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn convert_reports_decode_errors() {
        let task = ConversionTask::new(
            "bad",
            SourceFormat::Png,
            TargetFormat::Jpeg,
            WorkingProfile::Srgb,
            vec![0x89, b'P', b'N', b'G'],
        );
        let err = convert(task).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Decode);
    }
}
