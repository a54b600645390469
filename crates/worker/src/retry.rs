//! Resumes deferred items when the retry ticker re-fetches them.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error};

use admission::{RetryEntry, RetryHandler};
use ingest_core::Error;

use crate::pipeline::{PendingItem, Pipeline};

/// Hands retried fetches back to the pipeline.
pub struct ResumeHandler {
    pipeline: Arc<Pipeline>,
}

impl ResumeHandler {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self { pipeline }
    }
}

#[async_trait]
impl RetryHandler<PendingItem> for ResumeHandler {
    async fn on_fetched(&self, entry: RetryEntry<PendingItem>, bytes: Vec<u8>) {
        debug!(nft_id = ?entry.nft_id, origin = %entry.origin, "Resuming deferred item");
        if let Err(e) = self.pipeline.resume(entry.payload, bytes).await {
            error!(nft_id = ?entry.nft_id, error = %e, "Failed to record resumed item");
        }
    }

    async fn on_failed(&self, entry: RetryEntry<PendingItem>, failure: Error) {
        if let Err(e) = self.pipeline.abandon(entry.payload, failure).await {
            error!(nft_id = ?entry.nft_id, error = %e, "Failed to record abandoned item");
        }
    }
}
