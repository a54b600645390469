//! Persistent NFT record store.

pub mod client;
pub mod clickhouse_store;
pub mod config;
pub mod health;
pub mod memory;
pub mod schema;

use async_trait::async_trait;
use ingest_core::{NftRecord, NftUpdate, Result};
use std::sync::Arc;

pub use client::ClickHouseClient;
pub use clickhouse_store::ClickHouseStore;
pub use config::{ClickHouseConfig, StoreBackend, StoreConfig};
pub use memory::MemoryStore;

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<NftRecord>>;

    /// Applies a partial update. Returns `false` if the record doesn't exist.
    async fn update(&self, id: i64, update: &NftUpdate) -> Result<bool>;

    /// Inserts or replaces a whole record.
    async fn insert(&self, record: &NftRecord) -> Result<()>;

    /// Records with an error and no route, ordered by id, starting after `after_id`.
    async fn list_failed(&self, after_id: i64, limit: usize) -> Result<Vec<NftRecord>>;
}

/// Shared, dynamically dispatched record store.
pub type SharedStore = Arc<dyn RecordStore>;
