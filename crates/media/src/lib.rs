//! Media handling for the ingestion pipeline.
//!
//! - [`resolver`] decides the canonical [`MediaKind`] for a payload
//! - [`transcode`] turns payload bytes into a thumbnail
//! - [`ffmpeg`] drives the external filter used for animated media

pub mod config;
pub mod ffmpeg;
pub mod resolver;
pub mod transcode;

pub use config::{MediaConfig, VideoMode};
pub use ingest_core::MediaKind;
pub use resolver::{resolve_format, sniff};
pub use transcode::{Thumbnail, Transcoder};
