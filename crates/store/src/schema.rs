//! ClickHouse table schema for NFT records.
//!
//! `ReplacingMergeTree(version)` keeps the newest row per id; reads use
//! `FINAL` so a partial update (written as a full row with a higher
//! version) is visible immediately.

/// DDL for the records table.
pub fn create_records_table(qualified_table: &str) -> String {
    format!(
        r#"
CREATE TABLE IF NOT EXISTS {qualified_table} (
    id Int64,
    contract_address String,
    token_id String,
    raw_media_uri Nullable(String),
    declared_format Nullable(String),
    thumbnail_route Nullable(String),
    uploaded UInt8,
    error_message Nullable(String),
    status LowCardinality(String),
    version UInt64,
    updated_at DateTime64(3) DEFAULT now64(3)
)
ENGINE = ReplacingMergeTree(version)
ORDER BY id
SETTINGS index_granularity = 8192
"#
    )
}

/// Column list shared by every read.
pub const RECORD_COLUMNS: &str = "id, contract_address, token_id, raw_media_uri, declared_format, \
     thumbnail_route, uploaded, error_message, status, version";
