//! Work queue configuration.

use serde::{Deserialize, Serialize};

/// Which backend carries the per-worker queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueBackend {
    #[default]
    Redpanda,
    /// In-process channels; nothing survives a restart
    Memory,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default)]
    pub backend: QueueBackend,
    #[serde(default)]
    pub redpanda: RedpandaConfig,
}

/// Redpanda connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedpandaConfig {
    /// Broker addresses
    #[serde(default = "default_brokers")]
    pub brokers: Vec<String>,
    /// SASL username (enables TLS + SCRAM-SHA-256)
    #[serde(default)]
    pub sasl_username: Option<String>,
    #[serde(default)]
    pub sasl_password: Option<String>,
    /// Replication factor for queue topics
    #[serde(default = "default_replication_factor")]
    pub replication_factor: i16,
    /// Broker-side wait for a fetch with no records
    #[serde(default = "default_fetch_max_wait_ms")]
    pub fetch_max_wait_ms: i32,
    #[serde(default = "default_fetch_max_bytes")]
    pub fetch_max_bytes: i32,
    /// Timeout for topic admin requests
    #[serde(default = "default_admin_timeout_ms")]
    pub admin_timeout_ms: i32,
}

fn default_brokers() -> Vec<String> {
    vec!["localhost:9092".to_string()]
}

fn default_replication_factor() -> i16 {
    1
}

fn default_fetch_max_wait_ms() -> i32 {
    500
}

fn default_fetch_max_bytes() -> i32 {
    64 * 1024
}

fn default_admin_timeout_ms() -> i32 {
    5000
}

impl Default for RedpandaConfig {
    fn default() -> Self {
        Self {
            brokers: default_brokers(),
            sasl_username: None,
            sasl_password: None,
            replication_factor: default_replication_factor(),
            fetch_max_wait_ms: default_fetch_max_wait_ms(),
            fetch_max_bytes: default_fetch_max_bytes(),
            admin_timeout_ms: default_admin_timeout_ms(),
        }
    }
}

impl RedpandaConfig {
    /// Returns the broker list as a comma-separated string.
    pub fn broker_string(&self) -> String {
        self.brokers.join(",")
    }

    /// SASL credentials, when both halves are configured.
    pub fn sasl(&self) -> Option<(&str, &str)> {
        match (&self.sasl_username, &self.sasl_password) {
            (Some(user), Some(pass)) if !user.is_empty() => Some((user, pass)),
            _ => None,
        }
    }
}
