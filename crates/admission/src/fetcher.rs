//! HTTP media fetching over a round-robin egress pool.

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, CONTENT_LENGTH, RETRY_AFTER};
use reqwest::{Client, Proxy, StatusCode};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::debug;
use url::Url;

use ingest_core::{Error, Result};

use crate::config::AdmissionConfig;

/// Result of one fetch attempt that did not fail terminally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Fetched(Vec<u8>),
    /// Origin answered 429.
    Throttled { retry_after: Duration },
}

struct Egress {
    label: String,
    client: Client,
}

/// Issues GET requests, rotating through the configured egress paths.
pub struct Fetcher {
    pool: Vec<Egress>,
    next: AtomicUsize,
    max_bytes: usize,
    default_retry_after: Duration,
    max_retry_after: Duration,
    auth_header: Option<String>,
}

impl Fetcher {
    pub fn new(config: &AdmissionConfig) -> Result<Self> {
        let mut pool = Vec::new();
        for proxy in config.egress_pool() {
            let mut builder = Client::builder()
                .timeout(config.request_timeout())
                .user_agent(config.user_agent.clone());

            let label = match &proxy {
                Some(url) => {
                    let proxy = Proxy::all(url)
                        .map_err(|e| Error::config(format!("invalid proxy {url}: {e}")))?;
                    builder = builder.proxy(proxy);
                    url.clone()
                }
                None => {
                    builder = builder.no_proxy();
                    "direct".to_string()
                }
            };

            let client = builder
                .build()
                .map_err(|e| Error::config(format!("failed to build HTTP client: {e}")))?;
            pool.push(Egress { label, client });
        }

        Ok(Self {
            pool,
            next: AtomicUsize::new(0),
            max_bytes: config.max_fetch_bytes,
            default_retry_after: Duration::from_secs(config.default_retry_after_secs),
            max_retry_after: Duration::from_secs(config.max_retry_after_secs),
            auth_header: config.gateway_auth_header.clone(),
        })
    }

    fn pick(&self) -> &Egress {
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.pool.len();
        &self.pool[idx]
    }

    /// Fetches `url`. Any status other than 2xx and 429 is a terminal error.
    ///
    /// `credential` is attached under the configured gateway header, if any.
    pub async fn fetch(&self, url: &Url, credential: Option<&str>) -> Result<FetchOutcome> {
        let egress = self.pick();
        let mut request = egress.client.get(url.clone());
        if let (Some(header), Some(credential)) = (&self.auth_header, credential) {
            request = request.header(header.as_str(), credential);
        }

        debug!(url = %url, egress = %egress.label, "Fetching media");
        let mut response = request.send().await.map_err(transport_error)?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = parse_retry_after(response.headers(), Utc::now())
                .unwrap_or(self.default_retry_after)
                .min(self.max_retry_after);
            return Ok(FetchOutcome::Throttled { retry_after });
        }
        if !status.is_success() {
            return Err(Error::FetchStatus(status.as_u16()));
        }

        if let Some(declared) = content_length(response.headers()) {
            if declared > self.max_bytes {
                return Err(Error::oversize(declared, self.max_bytes));
            }
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(transport_error)? {
            if body.len() + chunk.len() > self.max_bytes {
                return Err(Error::oversize(body.len() + chunk.len(), self.max_bytes));
            }
            body.extend_from_slice(&chunk);
        }

        if body.is_empty() {
            return Err(Error::fetch("empty response body"));
        }
        Ok(FetchOutcome::Fetched(body))
    }
}

fn transport_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::fetch("request timed out")
    } else {
        Error::fetch(e.without_url().to_string())
    }
}

fn content_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// Parses a Retry-After header given as delta-seconds or an HTTP date.
pub fn parse_retry_after(headers: &HeaderMap, now: DateTime<Utc>) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some((at - now).to_std().unwrap_or(Duration::ZERO))
}
