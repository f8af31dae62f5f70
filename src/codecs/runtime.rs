// src/codecs/runtime.rs
//
// One-time codec readiness check shared by every execution context.
// The first caller probes libavif and libwebp; everybody else gets the
// memoized result.

use crate::codecs::avif_safe;
use crate::error::{ConvertError, Result};
use once_cell::sync::OnceCell;

/// What the linked codec libraries report about themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecRuntime {
    pub avif_version: String,
    pub avif_encoder: String,
}

static RUNTIME: OnceCell<CodecRuntime> = OnceCell::new();

/// Probe the codec libraries once.
///
/// Safe to call concurrently: callers racing the first initialization
/// block until it finishes. A failed probe is not cached, so the next call
/// probes again.
pub fn ensure_ready() -> Result<&'static CodecRuntime> {
    RUNTIME.get_or_try_init(|| {
        let avif_encoder = avif_safe::encoder_codec_name().ok_or_else(|| {
            ConvertError::codec_unavailable("avif", "libavif was built without an AV1 encoder")
        })?;
        webp::WebPConfig::new()
            .map_err(|_| ConvertError::codec_unavailable("webp", "failed to create WebPConfig"))?;

        let runtime = CodecRuntime {
            avif_version: avif_safe::libavif_version(),
            avif_encoder,
        };
        tracing::info!(
            avif_version = %runtime.avif_version,
            avif_encoder = %runtime.avif_encoder,
            "codecs ready"
        );
        Ok(runtime)
    })
}
