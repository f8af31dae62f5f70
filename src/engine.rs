// src/engine.rs
//
// The conversion engine. Per task:
// 1. Decode the source bytes into an RGBA surface
// 2. Detect the embedded color profile
// 3. Resample to the requested short edge
// 4. Convert into the target working space through XYZ
// 5. Encode to the target format
//
// This file is a facade over the modules in engine/; the worker pool on
// top runs many tasks on a fixed number of execution contexts.

// =============================================================================
// SECURITY LIMITS
// =============================================================================

/// Maximum allowed image dimension (width or height).
/// Larger images are rejected on decode to stop decompression bombs.
pub const MAX_DIMENSION: u32 = 32768;

/// Maximum allowed total pixels (width * height).
/// 100 megapixels = 400MB uncompressed RGBA.
pub const MAX_PIXELS: u64 = 100_000_000;

// =============================================================================
// MODULE DECOMPOSITION
// =============================================================================

mod buffer;
mod color;
mod common;
mod container;
mod decoder;
mod encoder;
mod memory;
mod pipeline;
mod pool;
mod profile;
mod resize;
mod scheduler;

pub use buffer::{PixelBuffer, CHANNELS};
pub use color::{
    adobe_to_linear, convert_pixel, convert_profile, linear_to_adobe, linear_to_srgb,
    srgb_to_linear, PARALLEL_THRESHOLD_PIXELS,
};
pub use common::{run_with_panic_policy, EngineResult};
pub use container::encode_container;
pub use decoder::{check_dimensions, decode, decode_jpeg_mozjpeg, decode_png_zune};
pub use encoder::{encode, encode_avif, encode_jpeg, encode_png, encode_webp, QualitySettings};
pub use memory::{
    calculate_memory_based_workers, detect_available_memory, ESTIMATED_MEMORY_PER_JOB,
    MAX_MEMORY_BASED_WORKERS,
};
pub use pipeline::{progress, ConversionPipeline};
pub use pool::{PoolConfig, PoolStatus, TaskRunner, WorkerPool, WORKERS_ENV};
pub use profile::{detect_profile, ICC_PROFILE_SIGNATURE};
pub use resize::{resize_exact, resize_to_short_edge, short_edge_dimensions};
pub use scheduler::{ContextState, Dispatch, Scheduler};
