//! Mock collaborators for testing.

use async_trait::async_trait;
use ingest_core::{Error, NftRecord, NftUpdate, Result};
use parking_lot::Mutex;
use record_store::RecordStore;
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use worker::ThumbnailStorage;

/// Media origin served by wiremock.
pub struct MockOrigin {
    pub server: MockServer,
}

impl MockOrigin {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn uri(&self) -> String {
        self.server.uri()
    }

    pub fn url(&self, route: &str) -> String {
        format!("{}{}", self.server.uri(), route)
    }

    /// Serves `body` on `route`.
    pub async fn serve(&self, route: &str, body: Vec<u8>, content_type: &str) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", content_type)
                    .set_body_bytes(body),
            )
            .mount(&self.server)
            .await;
    }

    /// Answers 429 on `route` the next `times` requests.
    ///
    /// Mount before [`MockOrigin::serve`] so the throttle answers first.
    pub async fn throttle(&self, route: &str, retry_after_secs: u64, times: u64) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", retry_after_secs.to_string().as_str()))
            .up_to_n_times(times)
            .mount(&self.server)
            .await;
    }

    /// Answers `status` on `route`.
    pub async fn fail(&self, route: &str, status: u16) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    /// Requests received so far.
    pub async fn request_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map(|requests| requests.len())
            .unwrap_or(0)
    }
}

/// Thumbnail storage that keeps writes in memory.
#[derive(Default)]
pub struct RecordingStorage {
    writes: Mutex<Vec<(String, Vec<u8>)>>,
}

impl RecordingStorage {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn writes(&self) -> Vec<(String, Vec<u8>)> {
        self.writes.lock().clone()
    }

    pub fn get(&self, route: &str) -> Option<Vec<u8>> {
        self.writes
            .lock()
            .iter()
            .rev()
            .find(|(r, _)| r == route)
            .map(|(_, bytes)| bytes.clone())
    }
}

#[async_trait]
impl ThumbnailStorage for RecordingStorage {
    async fn put(&self, route: &str, bytes: &[u8]) -> Result<()> {
        self.writes.lock().push((route.to_string(), bytes.to_vec()));
        Ok(())
    }
}

/// Record store whose every call fails.
pub struct UnavailableStore;

#[async_trait]
impl RecordStore for UnavailableStore {
    async fn find_by_id(&self, _id: i64) -> Result<Option<NftRecord>> {
        Err(Error::store("connection refused"))
    }

    async fn update(&self, _id: i64, _update: &NftUpdate) -> Result<bool> {
        Err(Error::store("connection refused"))
    }

    async fn insert(&self, _record: &NftRecord) -> Result<()> {
        Err(Error::store("connection refused"))
    }

    async fn list_failed(&self, _after_id: i64, _limit: usize) -> Result<Vec<NftRecord>> {
        Err(Error::store("connection refused"))
    }
}
