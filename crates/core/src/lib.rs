//! Core types for the NFT media ingestion pipeline.

pub mod error;
pub mod limits;
pub mod locator;
pub mod media_kind;
pub mod record;
pub mod request;

pub use error::{Error, ErrorKind, Result};
pub use locator::{Gateways, InlineMedia, MediaSource, OriginKey, RemoteMedia};
pub use media_kind::MediaKind;
pub use record::{NftRecord, NftUpdate, RecordStatus};
pub use request::ImageRequest;
