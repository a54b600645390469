//! Pipeline configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use ingest_core::{Error, Result};

/// Work distribution and background task configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Number of concurrent ingestion workers
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    /// First record id handed out
    #[serde(default = "default_start_cursor")]
    pub start_cursor: i64,
    /// Last record id handed out (inclusive); unbounded when unset
    #[serde(default)]
    pub end_cursor: Option<i64>,
    /// Rotating credential pool; worker `i` gets `credentials[i % len]`
    #[serde(default)]
    pub credentials: Vec<String>,
    /// Queue name prefix; the worker slot index is appended
    #[serde(default = "default_queue_prefix")]
    pub queue_prefix: String,
    /// Pause before a crashed worker is replaced
    #[serde(default = "default_respawn_delay_ms")]
    pub respawn_delay_ms: u64,
    /// Capacity of the worker event channel
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
    /// Reprocessing sweep period; disabled when unset
    #[serde(default)]
    pub sweep_interval_secs: Option<u64>,
    #[serde(default = "default_metrics_log_interval")]
    pub metrics_log_interval_secs: u64,
    /// How often idle origin throttle state is dropped
    #[serde(default = "default_throttle_cleanup_interval")]
    pub throttle_cleanup_interval_secs: u64,
}

fn default_worker_count() -> usize {
    40
}

fn default_start_cursor() -> i64 {
    6_432_573
}

fn default_queue_prefix() -> String {
    "image-worker-queue-".to_string()
}

fn default_respawn_delay_ms() -> u64 {
    1000
}

fn default_event_buffer() -> usize {
    256
}

fn default_metrics_log_interval() -> u64 {
    60
}

fn default_throttle_cleanup_interval() -> u64 {
    300
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            start_cursor: default_start_cursor(),
            end_cursor: None,
            credentials: Vec::new(),
            queue_prefix: default_queue_prefix(),
            respawn_delay_ms: default_respawn_delay_ms(),
            event_buffer: default_event_buffer(),
            sweep_interval_secs: None,
            metrics_log_interval_secs: default_metrics_log_interval(),
            throttle_cleanup_interval_secs: default_throttle_cleanup_interval(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.worker_count == 0 {
            return Err(Error::config("worker_count must be positive"));
        }
        if self.event_buffer == 0 {
            return Err(Error::config("event_buffer must be positive"));
        }
        if let Some(end) = self.end_cursor {
            if end < self.start_cursor {
                return Err(Error::config("end_cursor is before start_cursor"));
            }
        }
        Ok(())
    }

    /// Queue name for worker slot `slot`.
    pub fn queue_name(&self, slot: usize) -> String {
        format!("{}{}", self.queue_prefix, slot)
    }

    /// Credential for worker slot `slot`, rotating through the pool.
    pub fn credential_for(&self, slot: usize) -> Option<String> {
        if self.credentials.is_empty() {
            None
        } else {
            Some(self.credentials[slot % self.credentials.len()].clone())
        }
    }

    pub fn respawn_delay(&self) -> Duration {
        Duration::from_millis(self.respawn_delay_ms)
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        self.sweep_interval_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

/// Thumbnail storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,
}

fn default_base_dir() -> PathBuf {
    PathBuf::from("./thumbnails")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
        }
    }
}
