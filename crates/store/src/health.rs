//! ClickHouse health checks and schema bootstrap.

use ingest_core::{Error, Result};
use tracing::{debug, error, info};

use crate::client::ClickHouseClient;
use crate::schema::create_records_table;

/// Check ClickHouse connection health.
pub async fn check_connection(client: &ClickHouseClient) -> bool {
    match client.inner().query("SELECT 1").fetch_one::<u8>().await {
        Ok(_) => {
            debug!("ClickHouse connection healthy");
            true
        }
        Err(e) => {
            error!(error = %e, "ClickHouse health check failed");
            false
        }
    }
}

/// Creates the records table if missing.
pub async fn init_schema(client: &ClickHouseClient) -> Result<()> {
    let table = client.config().qualified_table();
    client
        .inner()
        .query(&create_records_table(&table))
        .execute()
        .await
        .map_err(|e| Error::store(format!("Failed to execute DDL: {}", e)))?;

    info!(table = %table, "ClickHouse schema initialized");
    Ok(())
}
