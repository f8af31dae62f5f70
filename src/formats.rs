// src/formats.rs
//
// Format registry and color profile tags.
// Plus the task, artifact and event types that cross the pool boundary.

use crate::error::ConvertError;
use bitflags::bitflags;
use std::fmt;
use std::str::FromStr;

bitflags! {
    /// What a format can carry. The pipeline consults these instead of
    /// special-casing format names.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct FormatCapabilities: u8 {
        /// Encoder takes a quality parameter
        const QUALITY = 1 << 0;
        /// Source may embed an ICC profile worth scanning for
        const EMBEDDED_PROFILE = 1 << 1;
        /// Output keeps the alpha channel
        const ALPHA = 1 << 2;
    }
}

/// Formats we can decode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SourceFormat {
    /// Marker-segmented lossy format
    Jpeg,
    /// Chunked lossless format
    Png,
}

/// Formats we can encode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TargetFormat {
    Jpeg,
    Png,
    Webp,
    Avif,
    /// Uncompressed container written by `engine::encode_container`
    Tiff,
}

impl SourceFormat {
    pub const ALL: [SourceFormat; 2] = [SourceFormat::Jpeg, SourceFormat::Png];

    pub fn name(self) -> &'static str {
        match self {
            SourceFormat::Jpeg => "jpeg",
            SourceFormat::Png => "png",
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            SourceFormat::Jpeg => "image/jpeg",
            SourceFormat::Png => "image/png",
        }
    }

    pub fn capabilities(self) -> FormatCapabilities {
        match self {
            SourceFormat::Jpeg => FormatCapabilities::QUALITY | FormatCapabilities::EMBEDDED_PROFILE,
            SourceFormat::Png => FormatCapabilities::ALPHA,
        }
    }

    /// Whether detection should scan the raw bytes for an embedded profile.
    pub fn supports_embedded_profile(self) -> bool {
        self.capabilities()
            .contains(FormatCapabilities::EMBEDDED_PROFILE)
    }

    /// Guess from magic bytes. Used by callers that only have a buffer.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(&[0xFF, 0xD8]) {
            Some(SourceFormat::Jpeg)
        } else if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
            Some(SourceFormat::Png)
        } else {
            None
        }
    }
}

impl TargetFormat {
    pub const ALL: [TargetFormat; 5] = [
        TargetFormat::Jpeg,
        TargetFormat::Png,
        TargetFormat::Webp,
        TargetFormat::Avif,
        TargetFormat::Tiff,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TargetFormat::Jpeg => "jpeg",
            TargetFormat::Png => "png",
            TargetFormat::Webp => "webp",
            TargetFormat::Avif => "avif",
            TargetFormat::Tiff => "tiff",
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            TargetFormat::Jpeg => "image/jpeg",
            TargetFormat::Png => "image/png",
            TargetFormat::Webp => "image/webp",
            TargetFormat::Avif => "image/avif",
            TargetFormat::Tiff => "image/tiff",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            TargetFormat::Jpeg => "jpg",
            TargetFormat::Png => "png",
            TargetFormat::Webp => "webp",
            TargetFormat::Avif => "avif",
            TargetFormat::Tiff => "tif",
        }
    }

    pub fn capabilities(self) -> FormatCapabilities {
        match self {
            TargetFormat::Jpeg => FormatCapabilities::QUALITY | FormatCapabilities::EMBEDDED_PROFILE,
            TargetFormat::Png => FormatCapabilities::ALPHA,
            TargetFormat::Webp | TargetFormat::Avif => {
                FormatCapabilities::QUALITY | FormatCapabilities::ALPHA
            }
            TargetFormat::Tiff => FormatCapabilities::empty(),
        }
    }

    pub fn is_quality_parametrized(self) -> bool {
        self.capabilities().contains(FormatCapabilities::QUALITY)
    }

    /// Map the 0-100 UI quality onto what the format's encoder expects.
    /// `None` means the encoder ignores quality.
    pub fn encoder_quality(self, quality: u8) -> Option<u8> {
        let quality = quality.min(100);
        match self {
            // libjpeg treats 0 as 1 anyway; make it explicit
            TargetFormat::Jpeg => Some(quality.max(1)),
            TargetFormat::Webp | TargetFormat::Avif => Some(quality),
            TargetFormat::Png | TargetFormat::Tiff => None,
        }
    }
}

impl From<SourceFormat> for TargetFormat {
    fn from(value: SourceFormat) -> Self {
        match value {
            SourceFormat::Jpeg => TargetFormat::Jpeg,
            SourceFormat::Png => TargetFormat::Png,
        }
    }
}

impl FromStr for SourceFormat {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" | "image/jpeg" => Ok(SourceFormat::Jpeg),
            "png" | "image/png" => Ok(SourceFormat::Png),
            other => Err(ConvertError::unsupported_format(other.to_string())),
        }
    }
}

impl FromStr for TargetFormat {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" | "image/jpeg" => Ok(TargetFormat::Jpeg),
            "png" | "image/png" => Ok(TargetFormat::Png),
            "webp" | "image/webp" => Ok(TargetFormat::Webp),
            "avif" | "image/avif" => Ok(TargetFormat::Avif),
            "tiff" | "tif" | "image/tiff" => Ok(TargetFormat::Tiff),
            other => Err(ConvertError::unsupported_format(other.to_string())),
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Display for TargetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of profile detection. `Unknown` never reaches the converter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ColorProfile {
    Srgb,
    AdobeRgb,
    Unknown,
}

/// RGB space the converter computes in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WorkingProfile {
    Srgb,
    AdobeRgb,
}

impl ColorProfile {
    /// Resolve to a computable profile. Untagged images are treated as sRGB.
    pub fn resolve(self) -> WorkingProfile {
        match self {
            ColorProfile::Srgb | ColorProfile::Unknown => WorkingProfile::Srgb,
            ColorProfile::AdobeRgb => WorkingProfile::AdobeRgb,
        }
    }
}

impl From<WorkingProfile> for ColorProfile {
    fn from(value: WorkingProfile) -> Self {
        match value {
            WorkingProfile::Srgb => ColorProfile::Srgb,
            WorkingProfile::AdobeRgb => ColorProfile::AdobeRgb,
        }
    }
}

impl FromStr for WorkingProfile {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '_'))
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "srgb" => Ok(WorkingProfile::Srgb),
            "adobergb" | "adobergb1998" => Ok(WorkingProfile::AdobeRgb),
            _ => Err(ConvertError::invalid_argument(
                "target_profile",
                s.to_string(),
                "Expected srgb or adobe-rgb",
            )),
        }
    }
}

impl fmt::Display for ColorProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColorProfile::Srgb => f.write_str("sRGB"),
            ColorProfile::AdobeRgb => f.write_str("Adobe RGB"),
            ColorProfile::Unknown => f.write_str("Unknown"),
        }
    }
}

impl fmt::Display for WorkingProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        ColorProfile::from(*self).fmt(f)
    }
}

/// One unit of work submitted to the pool.
///
/// `id` must be unique for the lifetime of the pool. The encoded `buffer`
/// moves into the execution context at dispatch.
#[derive(Clone, PartialEq, Eq)]
pub struct ConversionTask {
    pub id: String,
    pub source: SourceFormat,
    pub target: TargetFormat,
    pub target_profile: WorkingProfile,
    /// 0-100, clamped
    pub quality: u8,
    /// `None` or `Some(0)` keeps the source resolution
    pub short_edge: Option<u32>,
    pub buffer: Vec<u8>,
}

impl ConversionTask {
    /// A task with quality 90 that keeps resolution.
    pub fn new(
        id: impl Into<String>,
        source: SourceFormat,
        target: TargetFormat,
        target_profile: WorkingProfile,
        buffer: Vec<u8>,
    ) -> Self {
        Self {
            id: id.into(),
            source,
            target,
            target_profile,
            quality: 90,
            short_edge: None,
            buffer,
        }
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality.min(100);
        self
    }

    pub fn with_short_edge(mut self, short_edge: u32) -> Self {
        self.short_edge = Some(short_edge);
        self
    }
}

impl fmt::Debug for ConversionTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionTask")
            .field("id", &self.id)
            .field("source", &self.source)
            .field("target", &self.target)
            .field("target_profile", &self.target_profile)
            .field("quality", &self.quality)
            .field("short_edge", &self.short_edge)
            .field("buffer_len", &self.buffer.len())
            .finish()
    }
}

/// Encoded output of a successful conversion.
#[derive(Clone, PartialEq, Eq)]
pub struct ConversionArtifact {
    pub bytes: Vec<u8>,
    pub format: TargetFormat,
    pub mime: &'static str,
    /// Profile as detected, before `Unknown` was resolved
    pub source_profile: ColorProfile,
}

impl fmt::Debug for ConversionArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionArtifact")
            .field("format", &self.format)
            .field("mime", &self.mime)
            .field("source_profile", &self.source_profile)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// What the pool reports back, tagged with the task id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionEvent {
    /// Always below 100
    Progress { id: String, progress: u8 },
    Done { id: String, artifact: ConversionArtifact },
    Error { id: String, message: String },
}

impl ConversionEvent {
    pub fn id(&self) -> &str {
        match self {
            ConversionEvent::Progress { id, .. }
            | ConversionEvent::Done { id, .. }
            | ConversionEvent::Error { id, .. } => id,
        }
    }

    /// Done or Error
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ConversionEvent::Progress { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_is_only_mapped_for_parametrized_formats() {
        for format in TargetFormat::ALL {
            assert_eq!(
                format.encoder_quality(80).is_some(),
                format.is_quality_parametrized(),
                "{format}"
            );
        }
        assert_eq!(TargetFormat::Jpeg.encoder_quality(0), Some(1));
        assert_eq!(TargetFormat::Webp.encoder_quality(250), Some(100));
        assert_eq!(TargetFormat::Tiff.encoder_quality(50), None);
    }

    #[test]
    fn parse_accepts_aliases() {
        assert_eq!("JPG".parse::<TargetFormat>().unwrap(), TargetFormat::Jpeg);
        assert_eq!("tif".parse::<TargetFormat>().unwrap(), TargetFormat::Tiff);
        assert_eq!("image/png".parse::<SourceFormat>().unwrap(), SourceFormat::Png);
        assert!("gif".parse::<SourceFormat>().is_err());
        assert!("webp".parse::<SourceFormat>().is_err());
    }

    #[test]
    fn parse_working_profile() {
        assert_eq!(
            "Adobe RGB".parse::<WorkingProfile>().unwrap(),
            WorkingProfile::AdobeRgb
        );
        assert_eq!("adobe-rgb".parse::<WorkingProfile>().unwrap(), WorkingProfile::AdobeRgb);
        assert_eq!("sRGB".parse::<WorkingProfile>().unwrap(), WorkingProfile::Srgb);
        assert!("unknown".parse::<WorkingProfile>().is_err());
    }

    #[test]
    fn unknown_resolves_to_srgb() {
        assert_eq!(ColorProfile::Unknown.resolve(), WorkingProfile::Srgb);
        assert_eq!(ColorProfile::AdobeRgb.resolve(), WorkingProfile::AdobeRgb);
    }

    #[test]
    fn only_jpeg_source_is_scanned_for_profiles() {
        assert!(SourceFormat::Jpeg.supports_embedded_profile());
        assert!(!SourceFormat::Png.supports_embedded_profile());
    }

    #[test]
    fn task_builder_clamps_quality() {
        let task = ConversionTask::new(
            "a",
            SourceFormat::Png,
            TargetFormat::Webp,
            WorkingProfile::Srgb,
            vec![1, 2, 3],
        )
        .with_quality(180)
        .with_short_edge(64);
        assert_eq!(task.quality, 100);
        assert_eq!(task.short_edge, Some(64));
        assert!(format!("{task:?}").contains("buffer_len: 3"));
    }

    #[test]
    fn event_accessors() {
        let progress = ConversionEvent::Progress {
            id: "x".into(),
            progress: 35,
        };
        let error = ConversionEvent::Error {
            id: "y".into(),
            message: "boom".into(),
        };
        assert_eq!(progress.id(), "x");
        assert!(!progress.is_terminal());
        assert!(error.is_terminal());
    }

    #[test]
    fn sniff_magic_bytes() {
        assert_eq!(SourceFormat::sniff(&[0xFF, 0xD8, 0xFF]), Some(SourceFormat::Jpeg));
        assert_eq!(
            SourceFormat::sniff(b"\x89PNG\r\n\x1a\n...."),
            Some(SourceFormat::Png)
        );
        assert_eq!(SourceFormat::sniff(b"RIFF"), None);
    }
}
