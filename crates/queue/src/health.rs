//! Redpanda health checks.

use tracing::{debug, error};

use crate::config::RedpandaConfig;
use crate::redpanda::connect;

/// Check Redpanda connection health.
pub async fn check_connection(config: &RedpandaConfig) -> bool {
    let client = match connect(config).await {
        Ok(client) => client,
        Err(e) => {
            error!(error = %e, "Redpanda health check failed");
            return false;
        }
    };

    match client.list_topics().await {
        Ok(topics) => {
            debug!(topics = topics.len(), "Redpanda connection healthy");
            true
        }
        Err(e) => {
            error!(error = %e, "Failed to list Redpanda topics");
            false
        }
    }
}
