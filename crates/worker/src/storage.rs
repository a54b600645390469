//! Thumbnail storage.
//!
//! Routes are `<contract>/<sha256(contract:token)>.<ext>`, so re-running an
//! item overwrites the same artifact.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use ingest_core::{Error, MediaKind, Result};

/// Derives the storage route for a token's thumbnail.
pub fn thumbnail_route(contract_address: &str, token_id: &str, kind: MediaKind) -> String {
    let contract = contract_address.trim().to_ascii_lowercase();
    let digest = Sha256::digest(format!("{contract}:{}", token_id.trim()).as_bytes());
    format!(
        "{}/{}.{}",
        sanitize_segment(&contract),
        hex::encode(digest),
        kind.extension()
    )
}

fn sanitize_segment(segment: &str) -> String {
    let cleaned: String = segment
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}

#[async_trait]
pub trait ThumbnailStorage: Send + Sync {
    /// Writes `bytes` under `route`, replacing any previous artifact.
    async fn put(&self, route: &str, bytes: &[u8]) -> Result<()>;
}

pub type SharedStorage = Arc<dyn ThumbnailStorage>;

/// Stores thumbnails on the local filesystem.
pub struct LocalStorage {
    base_dir: PathBuf,
}

impl LocalStorage {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn path_for(&self, route: &str) -> PathBuf {
        self.base_dir.join(route)
    }
}

#[async_trait]
impl ThumbnailStorage for LocalStorage {
    async fn put(&self, route: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path_for(route);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::storage(format!("Failed to create {}: {e}", parent.display())))?;
        }

        // Write then rename so readers never see a partial file.
        let partial = path.with_extension("partial");
        tokio::fs::write(&partial, bytes)
            .await
            .map_err(|e| Error::storage(format!("Failed to write {}: {e}", partial.display())))?;
        tokio::fs::rename(&partial, &path)
            .await
            .map_err(|e| Error::storage(format!("Failed to move {}: {e}", path.display())))?;

        debug!(route = %route, size = bytes.len(), "Stored thumbnail");
        Ok(())
    }
}
