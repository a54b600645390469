//! External ffmpeg filter pipelines for animated media.
//!
//! Input and output live in scratch files that are removed when the
//! [`tempfile::NamedTempFile`] handles drop, on success and on error alike.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::debug;

use ingest_core::{Error, Result};

/// Max bytes of ffmpeg stderr carried into an error message.
const STDERR_TAIL: usize = 512;

/// A single ffmpeg job description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FfmpegJob {
    /// Rescale an animated gif, palette preserved.
    RescaleGif { width: u32 },
    /// Convert a video into a rescaled animated gif.
    VideoToGif { width: u32, fps: u32 },
    /// Extract one representative frame as png.
    VideoFrame { width: u32 },
}

impl FfmpegJob {
    fn input_suffix(&self) -> &'static str {
        match self {
            Self::RescaleGif { .. } => ".gif",
            Self::VideoToGif { .. } | Self::VideoFrame { .. } => ".mp4",
        }
    }

    fn output_suffix(&self) -> &'static str {
        match self {
            Self::RescaleGif { .. } | Self::VideoToGif { .. } => ".gif",
            Self::VideoFrame { .. } => ".png",
        }
    }

    fn filter(&self) -> String {
        match self {
            Self::RescaleGif { width } => format!(
                "scale={width}:-1:flags=lanczos,split[s0][s1];[s0]palettegen[p];[s1][p]paletteuse"
            ),
            Self::VideoToGif { width, fps } => format!(
                "fps={fps},scale={width}:-1:flags=lanczos,split[s0][s1];[s0]palettegen[p];[s1][p]paletteuse"
            ),
            Self::VideoFrame { width } => format!("thumbnail,scale={width}:-1"),
        }
    }

    /// Command line arguments for this job.
    pub fn args(&self, input: &Path, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-hide_banner".into(),
            "-loglevel".into(),
            "error".into(),
            "-y".into(),
            "-i".into(),
            input.as_os_str().to_owned(),
            "-vf".into(),
            self.filter().into(),
        ];
        if matches!(self, Self::VideoFrame { .. }) {
            args.push("-frames:v".into());
            args.push("1".into());
        }
        args.push(output.as_os_str().to_owned());
        args
    }
}

/// Runs ffmpeg jobs against in-memory payloads.
#[derive(Debug, Clone)]
pub struct Ffmpeg {
    binary: String,
    timeout: Duration,
    scratch_dir: Option<PathBuf>,
}

impl Ffmpeg {
    pub fn new(binary: impl Into<String>, timeout: Duration, scratch_dir: Option<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            timeout,
            scratch_dir,
        }
    }

    fn scratch(&self, suffix: &str) -> Result<NamedTempFile> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("nft-media-").suffix(suffix);
        let file = match &self.scratch_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        };
        file.map_err(|e| Error::transcode(format!("failed to create scratch file: {e}")))
    }

    /// Runs `job` over `input`, returning the produced bytes.
    pub async fn run(&self, job: &FfmpegJob, input: &[u8]) -> Result<Vec<u8>> {
        let source = self.scratch(job.input_suffix())?;
        let target = self.scratch(job.output_suffix())?;

        tokio::fs::write(source.path(), input)
            .await
            .map_err(|e| Error::transcode(format!("failed to write scratch input: {e}")))?;

        let args = job.args(source.path(), target.path());
        debug!(binary = %self.binary, job = ?job, "Running ffmpeg");

        let child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_| Error::transcode(format!("ffmpeg timed out after {:?}", self.timeout)))?
            .map_err(|e| Error::transcode(format!("failed to spawn {}: {e}", self.binary)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let start = stderr.len().saturating_sub(STDERR_TAIL);
            let tail = stderr.get(start..).unwrap_or(&stderr).trim();
            return Err(Error::transcode(format!(
                "ffmpeg exited with {}: {tail}",
                output.status
            )));
        }

        let bytes = tokio::fs::read(target.path())
            .await
            .map_err(|e| Error::transcode(format!("failed to read ffmpeg output: {e}")))?;

        if bytes.is_empty() {
            return Err(Error::transcode("ffmpeg produced no output"));
        }
        Ok(bytes)
    }
}
