//! ClickHouse implementation of [`RecordStore`].

use async_trait::async_trait;
use chrono::Utc;
use clickhouse::Row;
use serde::{Deserialize, Serialize};
use tracing::debug;

use ingest_core::{Error, NftRecord, NftUpdate, RecordStatus, Result};

use crate::client::ClickHouseClient;
use crate::schema::RECORD_COLUMNS;
use crate::RecordStore;

/// Row layout of the records table.
#[derive(Debug, Clone, Row, Serialize, Deserialize)]
pub struct NftRow {
    pub id: i64,
    pub contract_address: String,
    pub token_id: String,
    pub raw_media_uri: Option<String>,
    pub declared_format: Option<String>,
    pub thumbnail_route: Option<String>,
    pub uploaded: u8,
    pub error_message: Option<String>,
    pub status: String,
    pub version: u64,
}

impl NftRow {
    fn from_record(record: &NftRecord, version: u64) -> Self {
        Self {
            id: record.id,
            contract_address: record.contract_address.clone(),
            token_id: record.token_id.clone(),
            raw_media_uri: record.raw_media_uri.clone(),
            declared_format: record.declared_format.clone(),
            thumbnail_route: record.thumbnail_route.clone(),
            uploaded: u8::from(record.uploaded),
            error_message: record.error_message.clone(),
            status: record.status.as_str().to_string(),
            version,
        }
    }

    fn into_record(self) -> NftRecord {
        NftRecord {
            id: self.id,
            contract_address: self.contract_address,
            token_id: self.token_id,
            raw_media_uri: self.raw_media_uri,
            declared_format: self.declared_format,
            thumbnail_route: self.thumbnail_route,
            uploaded: self.uploaded != 0,
            error_message: self.error_message,
            status: RecordStatus::parse(&self.status),
        }
    }
}

/// Next row version: wall clock in microseconds, never below `previous + 1`.
fn next_version(previous: u64) -> u64 {
    let now = u64::try_from(Utc::now().timestamp_micros()).unwrap_or_default();
    now.max(previous.saturating_add(1))
}

pub struct ClickHouseStore {
    client: ClickHouseClient,
    table: String,
}

impl ClickHouseStore {
    pub fn new(client: ClickHouseClient) -> Self {
        let table = client.config().qualified_table();
        Self { client, table }
    }

    async fn find_row(&self, id: i64) -> Result<Option<NftRow>> {
        self.client
            .inner()
            .query(&format!(
                "SELECT {RECORD_COLUMNS} FROM {} FINAL WHERE id = ?",
                self.table
            ))
            .bind(id)
            .fetch_optional::<NftRow>()
            .await
            .map_err(|e| Error::store(format!("Query error: {}", e)))
    }

    async fn write_row(&self, row: &NftRow) -> Result<()> {
        let mut insert = self
            .client
            .inner()
            .insert(&self.table)
            .map_err(|e| Error::store(format!("Failed to create insert: {}", e)))?;

        insert
            .write(row)
            .await
            .map_err(|e| Error::store(format!("Failed to write row: {}", e)))?;

        insert
            .end()
            .await
            .map_err(|e| Error::store(format!("Failed to commit insert: {}", e)))?;

        Ok(())
    }
}

#[async_trait]
impl RecordStore for ClickHouseStore {
    async fn find_by_id(&self, id: i64) -> Result<Option<NftRecord>> {
        Ok(self.find_row(id).await?.map(NftRow::into_record))
    }

    async fn update(&self, id: i64, update: &NftUpdate) -> Result<bool> {
        let Some(row) = self.find_row(id).await? else {
            return Ok(false);
        };

        let version = next_version(row.version);
        let mut record = row.into_record();
        record.apply(update);
        self.write_row(&NftRow::from_record(&record, version)).await?;

        debug!(nft_id = id, version, status = record.status.as_str(), "Record updated");
        Ok(true)
    }

    async fn insert(&self, record: &NftRecord) -> Result<()> {
        let previous = self.find_row(record.id).await?.map_or(0, |r| r.version);
        self.write_row(&NftRow::from_record(record, next_version(previous)))
            .await
    }

    async fn list_failed(&self, after_id: i64, limit: usize) -> Result<Vec<NftRecord>> {
        let rows: Vec<NftRow> = self
            .client
            .inner()
            .query(&format!(
                "SELECT {RECORD_COLUMNS} FROM {} FINAL \
                 WHERE id > ? \
                 AND (thumbnail_route IS NULL OR thumbnail_route = '') \
                 AND error_message IS NOT NULL AND error_message != '' \
                 ORDER BY id LIMIT ?",
                self.table
            ))
            .bind(after_id)
            .bind(limit as u64)
            .fetch_all()
            .await
            .map_err(|e| Error::store(format!("Query error: {}", e)))?;

        Ok(rows.into_iter().map(NftRow::into_record).collect())
    }
}
