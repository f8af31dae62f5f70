// src/error.rs
//
// Unified error handling for colorport
// Uses thiserror for simple, type-safe error handling
//
// Error Taxonomy:
// - Decode: malformed or unsupported source bytes
// - Surface: pixel surface cannot be built or scaled
// - Encode: a codec rejected the pixels or options
// - Unexpected: panics, crashed workers, misuse of the pool

use std::borrow::Cow;
use thiserror::Error;

/// Error taxonomy used for logging and for tests.
///
/// Only the message crosses the pool's event channel; the category stays
/// on the Rust side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Malformed/unsupported source bytes
    Decode,
    /// Drawing/scaling surface unavailable
    Surface,
    /// External codec rejected input or options
    Encode,
    /// Anything uncaught
    Unexpected,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Decode => "DecodeFailure",
            ErrorCategory::Surface => "SurfaceFailure",
            ErrorCategory::Encode => "EncodeFailure",
            ErrorCategory::Unexpected => "UnexpectedFailure",
        }
    }
}

/// colorport error types
#[derive(Debug, Error)]
pub enum ConvertError {
    // Decode Errors
    #[error("Unsupported image format: {format}")]
    UnsupportedFormat { format: Cow<'static, str> },

    #[error("Failed to decode {format}: {message}")]
    DecodeFailed {
        format: Cow<'static, str>,
        message: Cow<'static, str>,
    },

    #[error("Image dimension {dimension} exceeds maximum {max}")]
    DimensionExceedsLimit { dimension: u32, max: u32 },

    #[error("Image pixel count {pixels} exceeds maximum {max}")]
    PixelCountExceedsLimit { pixels: u64, max: u64 },

    // Surface Errors
    #[error("Invalid pixel buffer {width}x{height}: expected {expected} bytes, got {actual}")]
    InvalidPixelBuffer {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error("Resize failed ({source_width}x{source_height} -> {target_width}x{target_height}): {message}")]
    ResizeFailed {
        source_width: u32,
        source_height: u32,
        target_width: u32,
        target_height: u32,
        message: Cow<'static, str>,
    },

    // Encode Errors
    #[error("Failed to encode as {format}: {message}")]
    EncodeFailed {
        format: Cow<'static, str>,
        message: Cow<'static, str>,
    },

    #[error("Codec unavailable: {codec} ({reason})")]
    CodecUnavailable {
        codec: Cow<'static, str>,
        reason: Cow<'static, str>,
    },

    // Pool Errors
    #[error("Task id '{id}' was already submitted to this pool")]
    DuplicateTaskId { id: String },

    #[error("Worker pool is shut down")]
    PoolClosed,

    #[error("Worker {context} crashed while running the task: {message}")]
    WorkerCrashed {
        context: usize,
        message: Cow<'static, str>,
    },

    #[error("Invalid value for {name}: {value}. {reason}")]
    InvalidArgument {
        name: Cow<'static, str>,
        value: Cow<'static, str>,
        reason: Cow<'static, str>,
    },

    // Internal Errors
    #[error("Internal error: {message}")]
    InternalPanic { message: Cow<'static, str> },

    #[error("{message}")]
    Generic { message: Cow<'static, str> },
}

impl Clone for ConvertError {
    fn clone(&self) -> Self {
        match self {
            Self::UnsupportedFormat { format } => Self::UnsupportedFormat {
                format: format.clone(),
            },
            Self::DecodeFailed { format, message } => Self::DecodeFailed {
                format: format.clone(),
                message: message.clone(),
            },
            Self::DimensionExceedsLimit { dimension, max } => Self::DimensionExceedsLimit {
                dimension: *dimension,
                max: *max,
            },
            Self::PixelCountExceedsLimit { pixels, max } => Self::PixelCountExceedsLimit {
                pixels: *pixels,
                max: *max,
            },
            Self::InvalidPixelBuffer {
                width,
                height,
                expected,
                actual,
            } => Self::InvalidPixelBuffer {
                width: *width,
                height: *height,
                expected: *expected,
                actual: *actual,
            },
            Self::ResizeFailed {
                source_width,
                source_height,
                target_width,
                target_height,
                message,
            } => Self::ResizeFailed {
                source_width: *source_width,
                source_height: *source_height,
                target_width: *target_width,
                target_height: *target_height,
                message: message.clone(),
            },
            Self::EncodeFailed { format, message } => Self::EncodeFailed {
                format: format.clone(),
                message: message.clone(),
            },
            Self::CodecUnavailable { codec, reason } => Self::CodecUnavailable {
                codec: codec.clone(),
                reason: reason.clone(),
            },
            Self::DuplicateTaskId { id } => Self::DuplicateTaskId { id: id.clone() },
            Self::PoolClosed => Self::PoolClosed,
            Self::WorkerCrashed { context, message } => Self::WorkerCrashed {
                context: *context,
                message: message.clone(),
            },
            Self::InvalidArgument {
                name,
                value,
                reason,
            } => Self::InvalidArgument {
                name: name.clone(),
                value: value.clone(),
                reason: reason.clone(),
            },
            Self::InternalPanic { message } => Self::InternalPanic {
                message: message.clone(),
            },
            Self::Generic { message } => Self::Generic {
                message: message.clone(),
            },
        }
    }
}

// Constructor Helpers
impl ConvertError {
    pub fn unsupported_format(format: impl Into<Cow<'static, str>>) -> Self {
        Self::UnsupportedFormat {
            format: format.into(),
        }
    }

    pub fn decode_failed(
        format: impl Into<Cow<'static, str>>,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::DecodeFailed {
            format: format.into(),
            message: message.into(),
        }
    }

    pub fn dimension_exceeds_limit(dimension: u32, max: u32) -> Self {
        Self::DimensionExceedsLimit { dimension, max }
    }

    pub fn pixel_count_exceeds_limit(pixels: u64, max: u64) -> Self {
        Self::PixelCountExceedsLimit { pixels, max }
    }

    pub fn invalid_pixel_buffer(width: u32, height: u32, expected: usize, actual: usize) -> Self {
        Self::InvalidPixelBuffer {
            width,
            height,
            expected,
            actual,
        }
    }

    pub fn resize_failed(
        source_dims: (u32, u32),
        target_dims: (u32, u32),
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::ResizeFailed {
            source_width: source_dims.0,
            source_height: source_dims.1,
            target_width: target_dims.0,
            target_height: target_dims.1,
            message: message.into(),
        }
    }

    pub fn encode_failed(
        format: impl Into<Cow<'static, str>>,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::EncodeFailed {
            format: format.into(),
            message: message.into(),
        }
    }

    pub fn codec_unavailable(
        codec: impl Into<Cow<'static, str>>,
        reason: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::CodecUnavailable {
            codec: codec.into(),
            reason: reason.into(),
        }
    }

    pub fn duplicate_task_id(id: impl Into<String>) -> Self {
        Self::DuplicateTaskId { id: id.into() }
    }

    pub fn pool_closed() -> Self {
        Self::PoolClosed
    }

    pub fn worker_crashed(context: usize, message: impl Into<Cow<'static, str>>) -> Self {
        Self::WorkerCrashed {
            context,
            message: message.into(),
        }
    }

    pub fn invalid_argument(
        name: impl Into<Cow<'static, str>>,
        value: impl Into<Cow<'static, str>>,
        reason: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::InvalidArgument {
            name: name.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn internal_panic(message: impl Into<Cow<'static, str>>) -> Self {
        Self::InternalPanic {
            message: message.into(),
        }
    }

    pub fn generic(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Generic {
            message: message.into(),
        }
    }

    /// Get the error category for this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::UnsupportedFormat { .. }
            | Self::DecodeFailed { .. }
            | Self::DimensionExceedsLimit { .. }
            | Self::PixelCountExceedsLimit { .. } => ErrorCategory::Decode,

            Self::InvalidPixelBuffer { .. } | Self::ResizeFailed { .. } => ErrorCategory::Surface,

            Self::EncodeFailed { .. } | Self::CodecUnavailable { .. } => ErrorCategory::Encode,

            Self::DuplicateTaskId { .. }
            | Self::PoolClosed
            | Self::WorkerCrashed { .. }
            | Self::InvalidArgument { .. }
            | Self::InternalPanic { .. }
            | Self::Generic { .. } => ErrorCategory::Unexpected,
        }
    }
}

// Result type alias
pub type Result<T> = std::result::Result<T, ConvertError>;
