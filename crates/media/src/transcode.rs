//! Thumbnail transcoding.
//!
//! `transcode(bytes, kind)` never touches the network. Raster and svg work
//! runs on the blocking pool; a panic inside a codec surfaces as
//! [`Error::Transcode`] instead of tearing down the worker.

use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use resvg::{tiny_skia, usvg};
use std::io::Cursor;
use std::time::Duration;
use tracing::debug;

use ingest_core::{Error, MediaKind, Result};

use crate::config::{MediaConfig, VideoMode};
use crate::ffmpeg::{Ffmpeg, FfmpegJob};

/// Transcoded output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thumbnail {
    pub bytes: Vec<u8>,
    pub kind: MediaKind,
}

/// Turns media payloads into thumbnails.
#[derive(Debug, Clone)]
pub struct Transcoder {
    config: MediaConfig,
    ffmpeg: Ffmpeg,
}

impl Transcoder {
    pub fn new(config: MediaConfig) -> Self {
        let ffmpeg = Ffmpeg::new(
            config.ffmpeg_path.clone(),
            Duration::from_secs(config.ffmpeg_timeout_secs),
            config.scratch_dir.clone(),
        );
        Self { config, ffmpeg }
    }

    pub fn config(&self) -> &MediaConfig {
        &self.config
    }

    /// Kind a thumbnail of `kind` is emitted as.
    pub fn output_kind(&self, kind: MediaKind) -> MediaKind {
        match kind {
            MediaKind::Svg => MediaKind::Png,
            MediaKind::Mp4 => match self.config.video_mode {
                VideoMode::Gif => MediaKind::Gif,
                VideoMode::Frame => MediaKind::Png,
            },
            other => other,
        }
    }

    /// Transcodes `bytes` of the given kind into a thumbnail.
    pub async fn transcode(&self, bytes: Vec<u8>, kind: MediaKind) -> Result<Thumbnail> {
        if bytes.is_empty() {
            return Err(Error::transcode("empty payload"));
        }

        let output_kind = self.output_kind(kind);
        let out = match kind {
            MediaKind::Jpeg | MediaKind::Png | MediaKind::Webp | MediaKind::Tiff => {
                let width = self.config.thumbnail_width;
                let max_pixels = self.config.max_output_pixels;
                blocking(move || resize_raster(&bytes, kind, width, max_pixels)).await?
            }
            MediaKind::Svg => {
                let canvas = self.config.svg_canvas;
                blocking(move || rasterize_svg(&bytes, canvas)).await?
            }
            MediaKind::Gif => {
                let job = FfmpegJob::RescaleGif {
                    width: self.config.thumbnail_width,
                };
                self.ffmpeg.run(&job, &bytes).await?
            }
            MediaKind::Mp4 => {
                let job = match self.config.video_mode {
                    VideoMode::Gif => FfmpegJob::VideoToGif {
                        width: self.config.video_gif_width,
                        fps: self.config.video_fps,
                    },
                    VideoMode::Frame => FfmpegJob::VideoFrame {
                        width: self.config.thumbnail_width,
                    },
                };
                self.ffmpeg.run(&job, &bytes).await?
            }
            MediaKind::UnknownBinary => bytes,
        };

        debug!(kind = %kind, output = %output_kind, size = out.len(), "Transcoded payload");
        Ok(Thumbnail {
            bytes: out,
            kind: output_kind,
        })
    }
}

async fn blocking<F>(f: F) -> Result<Vec<u8>>
where
    F: FnOnce() -> Result<Vec<u8>> + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result,
        Err(e) if e.is_panic() => Err(Error::transcode("codec panicked")),
        Err(e) => Err(Error::transcode(format!("codec task failed: {e}"))),
    }
}

fn image_format(kind: MediaKind) -> Option<ImageFormat> {
    match kind {
        MediaKind::Jpeg => Some(ImageFormat::Jpeg),
        MediaKind::Png => Some(ImageFormat::Png),
        MediaKind::Webp => Some(ImageFormat::WebP),
        MediaKind::Tiff => Some(ImageFormat::Tiff),
        _ => None,
    }
}

/// Resizes to `width`, keeping aspect ratio, and re-encodes as `kind`.
///
/// Fails before allocating when the output would exceed `max_pixels`.
pub fn resize_raster(bytes: &[u8], kind: MediaKind, width: u32, max_pixels: u64) -> Result<Vec<u8>> {
    let format = image_format(kind)
        .ok_or_else(|| Error::transcode(format!("{kind} is not a raster kind")))?;

    let img = image::load_from_memory(bytes)
        .or_else(|_| image::load_from_memory_with_format(bytes, format))
        .map_err(|e| Error::transcode(format!("failed to decode {kind}: {e}")))?;

    let (w, h) = (img.width().max(1), img.height().max(1));
    let height = ((u64::from(h) * u64::from(width) + u64::from(w) / 2) / u64::from(w)).max(1);
    if height.saturating_mul(u64::from(width)) > max_pixels {
        return Err(Error::transcode(format!(
            "image dimensions exceed limit: {w}x{h} resizes to {width}x{height}"
        )));
    }
    let height = u32::try_from(height)
        .map_err(|_| Error::transcode("image dimensions exceed limit"))?;
    let resized = img.resize_exact(width, height, FilterType::Lanczos3);

    // Encoders differ in the color types they accept.
    let resized = match kind {
        MediaKind::Jpeg => DynamicImage::ImageRgb8(resized.to_rgb8()),
        MediaKind::Webp | MediaKind::Tiff => DynamicImage::ImageRgba8(resized.to_rgba8()),
        _ => resized,
    };

    let mut out = Cursor::new(Vec::new());
    resized
        .write_to(&mut out, format)
        .map_err(|e| Error::transcode(format!("failed to encode {kind}: {e}")))?;
    Ok(out.into_inner())
}

/// Renders an svg document onto a square canvas, scaled to fit and centered.
pub fn rasterize_svg(bytes: &[u8], canvas: u32) -> Result<Vec<u8>> {
    let tree = usvg::Tree::from_data(bytes, &usvg::Options::default())
        .map_err(|e| Error::transcode(format!("failed to parse svg: {e}")))?;

    let mut pixmap = tiny_skia::Pixmap::new(canvas, canvas)
        .ok_or_else(|| Error::transcode("invalid svg canvas size"))?;

    let size = tree.size();
    let side = canvas as f32;
    let scale = (side / size.width()).min(side / size.height());
    let tx = (side - size.width() * scale) / 2.0;
    let ty = (side - size.height() * scale) / 2.0;
    let transform = tiny_skia::Transform::from_row(scale, 0.0, 0.0, scale, tx, ty);

    resvg::render(&tree, transform, &mut pixmap.as_mut());

    pixmap
        .encode_png()
        .map_err(|e| Error::transcode(format!("failed to encode png: {e}")))
}
