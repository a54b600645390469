//! Work queues feeding the ingestion workers.
//!
//! One queue per worker slot; every message is a text-encoded record id.

pub mod config;
pub mod health;
pub mod memory;
pub mod redpanda;

use async_trait::async_trait;
use ingest_core::{Error, Result};
use std::sync::Arc;

pub use config::{QueueBackend, QueueConfig, RedpandaConfig};
pub use memory::MemoryQueue;
pub use redpanda::RedpandaQueue;

/// A message handed to a consumer, acknowledged with [`WorkQueue::ack`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub queue: String,
    /// Backend-specific identity of this message
    pub tag: i64,
    pub payload: String,
}

impl Delivery {
    /// Parses the payload as a record id.
    pub fn id(&self) -> Result<i64> {
        self.payload
            .trim()
            .parse()
            .map_err(|_| Error::queue(format!("invalid id payload {:?} on {}", self.payload, self.queue)))
    }
}

#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Drops `queue` if it exists and declares it empty.
    async fn reset(&self, queue: &str) -> Result<()>;

    /// Appends a record id to `queue`.
    async fn publish(&self, queue: &str, id: i64) -> Result<()>;

    /// Waits for the next message on `queue`.
    async fn consume(&self, queue: &str) -> Result<Delivery>;

    /// Acknowledges a delivery.
    async fn ack(&self, delivery: &Delivery) -> Result<()>;
}

/// Shared, dynamically dispatched work queue.
pub type SharedQueue = Arc<dyn WorkQueue>;

/// Builds the configured backend.
pub fn build(config: &QueueConfig) -> SharedQueue {
    match config.backend {
        QueueBackend::Redpanda => Arc::new(RedpandaQueue::new(config.redpanda.clone())),
        QueueBackend::Memory => Arc::new(MemoryQueue::new()),
    }
}
