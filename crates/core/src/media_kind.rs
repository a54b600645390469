//! Canonical media kinds.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of media kinds the pipeline knows how to handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MediaKind {
    Jpeg,
    Png,
    Gif,
    Webp,
    Tiff,
    Svg,
    Mp4,
    UnknownBinary,
}

impl MediaKind {
    /// All kinds, in declaration order.
    pub const ALL: [MediaKind; 8] = [
        Self::Jpeg,
        Self::Png,
        Self::Gif,
        Self::Webp,
        Self::Tiff,
        Self::Svg,
        Self::Mp4,
        Self::UnknownBinary,
    ];

    /// Parses a caller-declared format.
    ///
    /// Accepts bare names (`png`, `jpg`), MIME types (`image/svg+xml`) and
    /// dotted extensions. Anything outside the supported set yields `None`.
    pub fn from_declared(declared: &str) -> Option<Self> {
        let value = declared.trim().to_ascii_lowercase();
        let value = value.split(';').next().unwrap_or_default().trim();
        let value = value
            .strip_prefix("image/")
            .or_else(|| value.strip_prefix("video/"))
            .unwrap_or(value);
        Self::from_extension(value.trim_start_matches('.'))
    }

    /// Maps a file extension (without the dot) to a kind.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" | "jpe" | "pjpeg" => Some(Self::Jpeg),
            "png" | "apng" => Some(Self::Png),
            "gif" => Some(Self::Gif),
            "webp" => Some(Self::Webp),
            "tif" | "tiff" => Some(Self::Tiff),
            "svg" | "svg+xml" => Some(Self::Svg),
            "mp4" | "m4v" => Some(Self::Mp4),
            _ => None,
        }
    }

    /// Short name used in logs, API responses and config.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::Webp => "webp",
            Self::Tiff => "tiff",
            Self::Svg => "svg",
            Self::Mp4 => "mp4",
            Self::UnknownBinary => "unknown-binary",
        }
    }

    /// File extension for stored artifacts.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::Webp => "webp",
            Self::Tiff => "tiff",
            Self::Svg => "svg",
            Self::Mp4 => "mp4",
            Self::UnknownBinary => "bin",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
            Self::Webp => "image/webp",
            Self::Tiff => "image/tiff",
            Self::Svg => "image/svg+xml",
            Self::Mp4 => "video/mp4",
            Self::UnknownBinary => "application/octet-stream",
        }
    }

    /// Still raster formats decoded in-process.
    pub fn is_raster(&self) -> bool {
        matches!(self, Self::Jpeg | Self::Png | Self::Webp | Self::Tiff)
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
