//! Canonical media kind resolution.
//!
//! Precedence: a supported declared format, then the locator's extension,
//! then content sniffing, then `png`.

use image::ImageFormat;
use ingest_core::MediaKind;

/// How far into a payload we look for an `<svg` root element.
const SVG_SNIFF_WINDOW: usize = 4096;

/// ISO BMFF brands that identify still-image containers, not video.
const STILL_IMAGE_BRANDS: &[&[u8; 4]] = &[b"avif", b"avis", b"heic", b"heix", b"mif1", b"msf1"];

/// Resolves the media kind of a payload.
///
/// An unsupported declared format is ignored rather than rejected.
pub fn resolve_format(
    declared: Option<&str>,
    locator_kind: Option<MediaKind>,
    bytes: &[u8],
) -> MediaKind {
    declared
        .and_then(MediaKind::from_declared)
        .or(locator_kind)
        .or_else(|| sniff(bytes))
        .unwrap_or(MediaKind::Png)
}

/// Identifies a payload from its leading bytes.
///
/// Returns [`MediaKind::UnknownBinary`] for recognised formats we don't
/// transcode and `None` when the bytes can't be identified at all.
pub fn sniff(bytes: &[u8]) -> Option<MediaKind> {
    if let Some(kind) = sniff_iso_bmff(bytes) {
        return Some(kind);
    }

    if let Ok(format) = image::guess_format(bytes) {
        return Some(match format {
            ImageFormat::Png => MediaKind::Png,
            ImageFormat::Jpeg => MediaKind::Jpeg,
            ImageFormat::Gif => MediaKind::Gif,
            ImageFormat::WebP => MediaKind::Webp,
            ImageFormat::Tiff => MediaKind::Tiff,
            _ => MediaKind::UnknownBinary,
        });
    }

    if looks_like_svg(bytes) {
        return Some(MediaKind::Svg);
    }

    if is_audio_container(bytes) {
        return Some(MediaKind::UnknownBinary);
    }

    None
}

fn sniff_iso_bmff(bytes: &[u8]) -> Option<MediaKind> {
    if bytes.len() < 12 || &bytes[4..8] != b"ftyp" {
        return None;
    }
    let brand = &bytes[8..12];
    if STILL_IMAGE_BRANDS.iter().any(|b| b.as_slice() == brand) {
        return Some(MediaKind::UnknownBinary);
    }
    match brand {
        b"qt  " | b"M4A " | b"M4B " => Some(MediaKind::UnknownBinary),
        _ => Some(MediaKind::Mp4),
    }
}

fn looks_like_svg(bytes: &[u8]) -> bool {
    let window = &bytes[..bytes.len().min(SVG_SNIFF_WINDOW)];
    let text = String::from_utf8_lossy(window);
    let text = text.trim_start_matches('\u{feff}').trim_start();
    if !text.starts_with('<') {
        return false;
    }
    text.to_ascii_lowercase().contains("<svg")
}

fn is_audio_container(bytes: &[u8]) -> bool {
    bytes.starts_with(b"ID3")
        || bytes.starts_with(b"OggS")
        || bytes.starts_with(b"fLaC")
        || (bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WAVE")
}
