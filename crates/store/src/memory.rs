//! In-memory record store for single-process runs and tests.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use ingest_core::{NftRecord, NftUpdate, Result};

use crate::RecordStore;

#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<i64, NftRecord>>,
    updates: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the store.
    pub fn with_records(records: impl IntoIterator<Item = NftRecord>) -> Self {
        let store = Self::new();
        {
            let mut map = store.records.write();
            for record in records {
                map.insert(record.id, record);
            }
        }
        store
    }

    /// Synchronous read, for assertions.
    pub fn get(&self, id: i64) -> Option<NftRecord> {
        self.records.read().get(&id).cloned()
    }

    /// Number of applied updates.
    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn find_by_id(&self, id: i64) -> Result<Option<NftRecord>> {
        Ok(self.get(id))
    }

    async fn update(&self, id: i64, update: &NftUpdate) -> Result<bool> {
        let mut records = self.records.write();
        let Some(record) = records.get_mut(&id) else {
            return Ok(false);
        };
        record.apply(update);
        self.updates.fetch_add(1, Ordering::Relaxed);
        Ok(true)
    }

    async fn insert(&self, record: &NftRecord) -> Result<()> {
        self.records.write().insert(record.id, record.clone());
        Ok(())
    }

    async fn list_failed(&self, after_id: i64, limit: usize) -> Result<Vec<NftRecord>> {
        let records = self.records.read();
        Ok(records
            .range(after_id.saturating_add(1)..)
            .map(|(_, r)| r)
            .filter(|r| r.thumbnail_route.as_deref().map_or(true, str::is_empty))
            .filter(|r| r.error_message.as_deref().is_some_and(|m| !m.is_empty()))
            .take(limit)
            .cloned()
            .collect())
    }
}
