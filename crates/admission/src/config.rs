//! Admission control configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use ingest_core::limits::{DEFAULT_INLINE_CAP_BYTES, DEFAULT_MAX_FETCH_BYTES};
use ingest_core::{Error, Gateways, Result};

/// Proxy pool entry meaning "connect directly".
pub const DIRECT: &str = "direct";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionConfig {
    /// Minimum spacing between grants to one origin
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,
    /// Per-origin overrides of `min_interval_ms`, keyed by origin
    #[serde(default)]
    pub origin_intervals_ms: HashMap<String, u64>,
    /// Retry queue scan period
    #[serde(default = "default_retry_tick_ms")]
    pub retry_tick_ms: u64,
    /// Cooldown used when a 429 carries no usable Retry-After
    #[serde(default = "default_retry_after_secs")]
    pub default_retry_after_secs: u64,
    /// Upper bound on honoured Retry-After values
    #[serde(default = "default_max_retry_after_secs")]
    pub max_retry_after_secs: u64,
    /// Egress pool; `direct` (or an empty list) means no proxy
    #[serde(default)]
    pub proxies: Vec<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_fetch_bytes")]
    pub max_fetch_bytes: usize,
    /// Cap on decoded inline `data:` payloads
    #[serde(default = "default_inline_cap_bytes")]
    pub inline_cap_bytes: usize,
    #[serde(default)]
    pub gateways: Gateways,
    /// Header carrying the worker credential on gateway requests
    #[serde(default)]
    pub gateway_auth_header: Option<String>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_min_interval_ms() -> u64 {
    250
}

fn default_retry_tick_ms() -> u64 {
    1000
}

fn default_retry_after_secs() -> u64 {
    10
}

fn default_max_retry_after_secs() -> u64 {
    3600
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_max_fetch_bytes() -> usize {
    DEFAULT_MAX_FETCH_BYTES
}

fn default_inline_cap_bytes() -> usize {
    DEFAULT_INLINE_CAP_BYTES
}

fn default_user_agent() -> String {
    concat!("nft-media-pipeline/", env!("CARGO_PKG_VERSION")).to_string()
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: default_min_interval_ms(),
            origin_intervals_ms: HashMap::new(),
            retry_tick_ms: default_retry_tick_ms(),
            default_retry_after_secs: default_retry_after_secs(),
            max_retry_after_secs: default_max_retry_after_secs(),
            proxies: Vec::new(),
            request_timeout_secs: default_request_timeout_secs(),
            max_fetch_bytes: default_max_fetch_bytes(),
            inline_cap_bytes: default_inline_cap_bytes(),
            gateways: Gateways::default(),
            gateway_auth_header: None,
            user_agent: default_user_agent(),
        }
    }
}

impl AdmissionConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    pub fn retry_tick(&self) -> Duration {
        Duration::from_millis(self.retry_tick_ms.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Egress pool with blanks and `direct` normalized to `None`.
    pub fn egress_pool(&self) -> Vec<Option<String>> {
        let pool: Vec<Option<String>> = self
            .proxies
            .iter()
            .map(|p| p.trim())
            .map(|p| {
                if p.is_empty() || p.eq_ignore_ascii_case(DIRECT) {
                    None
                } else {
                    Some(p.to_string())
                }
            })
            .collect();
        if pool.is_empty() {
            vec![None]
        } else {
            pool
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.request_timeout_secs == 0 {
            return Err(Error::config("request_timeout_secs must be positive"));
        }
        if self.max_fetch_bytes == 0 || self.inline_cap_bytes == 0 {
            return Err(Error::config("payload caps must be positive"));
        }
        Ok(())
    }
}
