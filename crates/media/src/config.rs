//! Transcoding configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use ingest_core::{Error, Result};

/// How mp4 sources are turned into thumbnails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoMode {
    /// Rescaled animated gif
    #[default]
    Gif,
    /// Single representative frame as png
    Frame,
}

/// Media transcoding configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Target width for raster and gif thumbnails
    #[serde(default = "default_thumbnail_width")]
    pub thumbnail_width: u32,
    /// Side of the square canvas svg sources are rasterized onto
    #[serde(default = "default_svg_canvas")]
    pub svg_canvas: u32,
    /// Pixel budget of a resized raster; taller sources are rejected
    #[serde(default = "default_max_output_pixels")]
    pub max_output_pixels: u64,
    #[serde(default)]
    pub video_mode: VideoMode,
    /// Width of gifs produced from mp4 sources
    #[serde(default = "default_video_gif_width")]
    pub video_gif_width: u32,
    #[serde(default = "default_video_fps")]
    pub video_fps: u32,
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,
    #[serde(default = "default_ffmpeg_timeout")]
    pub ffmpeg_timeout_secs: u64,
    /// Directory for scratch files; system temp dir when unset
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,
}

fn default_thumbnail_width() -> u32 {
    200
}

fn default_svg_canvas() -> u32 {
    512
}

fn default_max_output_pixels() -> u64 {
    4_000_000
}

fn default_video_gif_width() -> u32 {
    320
}

fn default_video_fps() -> u32 {
    10
}

fn default_ffmpeg_path() -> String {
    "ffmpeg".to_string()
}

fn default_ffmpeg_timeout() -> u64 {
    120
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            thumbnail_width: default_thumbnail_width(),
            svg_canvas: default_svg_canvas(),
            max_output_pixels: default_max_output_pixels(),
            video_mode: VideoMode::default(),
            video_gif_width: default_video_gif_width(),
            video_fps: default_video_fps(),
            ffmpeg_path: default_ffmpeg_path(),
            ffmpeg_timeout_secs: default_ffmpeg_timeout(),
            scratch_dir: None,
        }
    }
}

impl MediaConfig {
    pub fn validate(&self) -> Result<()> {
        if self.thumbnail_width == 0 || self.svg_canvas == 0 || self.video_gif_width == 0 {
            return Err(Error::config("thumbnail dimensions must be positive"));
        }
        if self.max_output_pixels < u64::from(self.thumbnail_width) {
            return Err(Error::config("max_output_pixels is below one thumbnail row"));
        }
        if self.video_fps == 0 {
            return Err(Error::config("video_fps must be positive"));
        }
        if self.ffmpeg_path.trim().is_empty() {
            return Err(Error::config("ffmpeg_path is empty"));
        }
        Ok(())
    }
}
