//! Per-item ingestion pipeline.
//!
//! One item moves through
//! `Start -> Fetched -> FormatResolved -> Transcoded -> Persisted`, or ends
//! `Deferred` when its origin answered 429. Any step error ends the item as
//! failed. Item errors never escape [`Pipeline::process`]; only a failure to
//! write the outcome back to the record store does.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use admission::{Admission, AdmissionConfig, AdmissionController, FetchTarget};
use ingest_core::locator::resolve_source;
use ingest_core::{
    Error, ErrorKind, Gateways, ImageRequest, MediaKind, MediaSource, NftUpdate, OriginKey, Result,
};
use media::{resolve_format, Thumbnail, Transcoder};
use record_store::SharedStore;
use telemetry::metrics;

use crate::storage::{thumbnail_route, SharedStorage};

/// What a deferred fetch needs to resume once its bytes arrive.
#[derive(Debug, Clone)]
pub struct PendingItem {
    pub request: ImageRequest,
    /// Media kind hinted by the locator, kept for format resolution
    pub locator_kind: Option<MediaKind>,
}

/// Admission controller specialised to pipeline items.
pub type ItemAdmission = AdmissionController<PendingItem>;

/// A stored thumbnail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Produced {
    pub route: String,
    pub thumbnail: Thumbnail,
}

/// Terminal result of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Completed(Produced),
    /// Record already had a stored thumbnail.
    Skipped,
    /// Parked in the retry queue until `ready_at`.
    Deferred {
        origin: OriginKey,
        ready_at: Instant,
        retry_after: Duration,
    },
    Failed { kind: ErrorKind, message: String },
}

impl ItemOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed(_) | Self::Skipped)
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Completed(_) => "completed",
            Self::Skipped => "skipped",
            Self::Deferred { .. } => "deferred",
            Self::Failed { .. } => "failed",
        }
    }
}

enum ItemState {
    Start,
    Fetched {
        bytes: Vec<u8>,
        locator_kind: Option<MediaKind>,
    },
    FormatResolved {
        bytes: Vec<u8>,
        kind: MediaKind,
    },
    Transcoded(Thumbnail),
    Persisted(Produced),
    Deferred {
        origin: OriginKey,
        ready_at: Instant,
        retry_after: Duration,
    },
}

/// Shared context every worker runs items through.
pub struct Pipeline {
    store: SharedStore,
    admission: Arc<ItemAdmission>,
    transcoder: Transcoder,
    storage: SharedStorage,
    gateways: Gateways,
    inline_cap: usize,
}

impl Pipeline {
    pub fn new(
        store: SharedStore,
        admission: Arc<ItemAdmission>,
        transcoder: Transcoder,
        storage: SharedStorage,
        config: &AdmissionConfig,
    ) -> Self {
        Self {
            store,
            admission,
            transcoder,
            storage,
            gateways: config.gateways.clone(),
            inline_cap: config.inline_cap_bytes,
        }
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn admission(&self) -> &Arc<ItemAdmission> {
        &self.admission
    }

    /// Runs the record `id` through the pipeline.
    pub async fn process(&self, id: i64, credential: Option<&str>) -> Result<ItemOutcome> {
        let Some(record) = self.store.find_by_id(id).await? else {
            warn!(nft_id = id, "Record not found");
            metrics().items_failed.inc();
            return Ok(ItemOutcome::Failed {
                kind: ErrorKind::Input,
                message: Error::input(format!("record {id} not found")).to_string(),
            });
        };

        if record.is_complete() {
            debug!(nft_id = id, "Thumbnail already stored, skipping");
            metrics().items_skipped.inc();
            return Ok(ItemOutcome::Skipped);
        }

        let Some(locator) = record.media_locator() else {
            let error = Error::input(format!("record {id} has no media reference"));
            return self.finish(Some(id), self.failed(error), Instant::now()).await;
        };

        let request = ImageRequest::from_record(&record, locator);
        self.ingest(&request, credential).await
    }

    /// Runs an explicit request through the pipeline.
    ///
    /// The outcome is written back only when the request names a record.
    pub async fn ingest(&self, request: &ImageRequest, credential: Option<&str>) -> Result<ItemOutcome> {
        let started = Instant::now();
        metrics().items_started.inc();
        metrics().items_in_flight.inc();

        let outcome = match request.media_locator() {
            Some(locator) => {
                self.run(request, ItemState::Start, &locator, credential)
                    .await
            }
            None => self.failed(Error::input("empty media locator")),
        };

        metrics().items_in_flight.dec();
        self.finish(request.nft_id, outcome, started).await
    }

    /// Continues a deferred item from freshly fetched bytes.
    pub async fn resume(&self, item: PendingItem, bytes: Vec<u8>) -> Result<ItemOutcome> {
        let started = Instant::now();
        metrics().items_in_flight.inc();

        let state = ItemState::Fetched {
            bytes,
            locator_kind: item.locator_kind,
        };
        let locator = item.request.media_locator().unwrap_or_default();
        let outcome = self.run(&item.request, state, &locator, None).await;

        metrics().items_in_flight.dec();
        self.finish(item.request.nft_id, outcome, started).await
    }

    /// Records a terminal failure for a deferred item whose retry failed.
    pub async fn abandon(&self, item: PendingItem, error: Error) -> Result<ItemOutcome> {
        let outcome = self.failed(error);
        self.finish(item.request.nft_id, outcome, Instant::now()).await
    }

    async fn run(
        &self,
        request: &ImageRequest,
        mut state: ItemState,
        locator: &str,
        credential: Option<&str>,
    ) -> ItemOutcome {
        loop {
            state = match self.step(request, state, locator, credential).await {
                Ok(ItemState::Persisted(produced)) => return ItemOutcome::Completed(produced),
                Ok(ItemState::Deferred {
                    origin,
                    ready_at,
                    retry_after,
                }) => {
                    return ItemOutcome::Deferred {
                        origin,
                        ready_at,
                        retry_after,
                    };
                }
                Ok(next) => next,
                Err(e) => return self.failed(e),
            };
        }
    }

    async fn step(
        &self,
        request: &ImageRequest,
        state: ItemState,
        locator: &str,
        credential: Option<&str>,
    ) -> Result<ItemState> {
        match state {
            ItemState::Start => {
                let source = resolve_source(locator, &self.gateways, self.inline_cap)?;
                let locator_kind = source.locator_kind();
                match source {
                    MediaSource::Inline(inline) => Ok(ItemState::Fetched {
                        bytes: inline.bytes,
                        locator_kind,
                    }),
                    MediaSource::Remote(remote) => {
                        let target = FetchTarget {
                            url: remote.url,
                            origin: remote.origin.clone(),
                            credential: credential.map(str::to_string),
                        };
                        let pending = PendingItem {
                            request: request.clone(),
                            locator_kind,
                        };
                        match self.admission.fetch(request.nft_id, target, pending).await? {
                            Admission::Fetched(bytes) => Ok(ItemState::Fetched {
                                bytes,
                                locator_kind,
                            }),
                            Admission::Deferred {
                                ready_at,
                                retry_after,
                            } => Ok(ItemState::Deferred {
                                origin: remote.origin,
                                ready_at,
                                retry_after,
                            }),
                        }
                    }
                }
            }
            ItemState::Fetched {
                bytes,
                locator_kind,
            } => {
                let kind = resolve_format(request.format.as_deref(), locator_kind, &bytes);
                debug!(nft_id = ?request.nft_id, kind = %kind, size = bytes.len(), "Format resolved");
                Ok(ItemState::FormatResolved { bytes, kind })
            }
            ItemState::FormatResolved { bytes, kind } => {
                let started = Instant::now();
                let thumbnail = self.transcoder.transcode(bytes, kind).await?;
                metrics()
                    .transcode_latency_ms
                    .observe(started.elapsed().as_millis() as u64);
                Ok(ItemState::Transcoded(thumbnail))
            }
            ItemState::Transcoded(thumbnail) => {
                let route = thumbnail_route(&request.contract_address, &request.token_id, thumbnail.kind);
                self.storage.put(&route, &thumbnail.bytes).await?;
                Ok(ItemState::Persisted(Produced { route, thumbnail }))
            }
            terminal @ (ItemState::Persisted(_) | ItemState::Deferred { .. }) => Ok(terminal),
        }
    }

    fn failed(&self, error: Error) -> ItemOutcome {
        match error.kind() {
            ErrorKind::Transcode => metrics().transcode_failures.inc(),
            ErrorKind::Oversize => metrics().oversize_rejections.inc(),
            _ => {}
        }
        ItemOutcome::Failed {
            kind: error.kind(),
            message: error.to_string(),
        }
    }

    /// Writes the outcome back to the record and updates item metrics.
    async fn finish(&self, nft_id: Option<i64>, outcome: ItemOutcome, started: Instant) -> Result<ItemOutcome> {
        let update = match &outcome {
            ItemOutcome::Completed(produced) => Some(NftUpdate::success(produced.route.clone())),
            ItemOutcome::Failed { message, .. } => Some(NftUpdate::failure(message.clone())),
            ItemOutcome::Deferred {
                origin, retry_after, ..
            } => Some(NftUpdate::deferred(deferral_message(origin, *retry_after))),
            ItemOutcome::Skipped => None,
        };

        if let (Some(id), Some(update)) = (nft_id, update) {
            if !self.store.update(id, &update).await? {
                warn!(nft_id = id, "Record vanished before its outcome was written");
            }
        }

        match &outcome {
            ItemOutcome::Completed(produced) => {
                metrics().items_succeeded.inc();
                info!(nft_id = ?nft_id, route = %produced.route, kind = %produced.thumbnail.kind, "Item completed");
            }
            ItemOutcome::Failed { kind, message } => {
                metrics().items_failed.inc();
                warn!(nft_id = ?nft_id, kind = kind.code(), error = %message, "Item failed");
            }
            ItemOutcome::Skipped => metrics().items_skipped.inc(),
            ItemOutcome::Deferred { .. } => {}
        }
        metrics()
            .item_latency_ms
            .observe(started.elapsed().as_millis() as u64);

        debug!(nft_id = ?nft_id, outcome = outcome.label(), "Item finished");
        Ok(outcome)
    }
}

/// Stored error message for a deferred record.
pub fn deferral_message(origin: &OriginKey, retry_after: Duration) -> String {
    let throttled = Error::Throttled {
        origin: origin.to_string(),
        retry_after_secs: retry_after.as_secs(),
    };
    format!("deferred retry: {throttled}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;
    use ingest_core::{NftRecord, RecordStatus};
    use media::MediaConfig;
    use record_store::MemoryStore;
    use std::io::Cursor;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::storage::LocalStorage;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(width, height, image::Rgba([200, 10, 10, 255]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    fn data_uri(mime: &str, bytes: &[u8]) -> String {
        format!(
            "data:{mime};base64,{}",
            base64::engine::general_purpose::STANDARD.encode(bytes)
        )
    }

    struct Harness {
        pipeline: Pipeline,
        store: Arc<MemoryStore>,
        dir: tempfile::TempDir,
    }

    fn harness(records: Vec<NftRecord>, config: AdmissionConfig) -> Harness {
        let store = Arc::new(MemoryStore::with_records(records));
        let dir = tempfile::tempdir().unwrap();
        let admission = Arc::new(ItemAdmission::new(&config).unwrap());
        let pipeline = Pipeline::new(
            store.clone(),
            admission,
            Transcoder::new(MediaConfig::default()),
            Arc::new(LocalStorage::new(dir.path())),
            &config,
        );
        Harness { pipeline, store, dir }
    }

    fn admission_config() -> AdmissionConfig {
        AdmissionConfig {
            min_interval_ms: 0,
            ..Default::default()
        }
    }

    fn stored_files(dir: &std::path::Path) -> usize {
        fn walk(dir: &std::path::Path) -> usize {
            std::fs::read_dir(dir)
                .map(|entries| {
                    entries
                        .flatten()
                        .map(|e| if e.path().is_dir() { walk(&e.path()) } else { 1 })
                        .sum()
                })
                .unwrap_or(0)
        }
        walk(dir)
    }

    #[tokio::test]
    async fn test_inline_png_completes_record() {
        let record = NftRecord::new(1, "0xabc", "7", data_uri("image/png", &png_bytes(400, 100)));
        let h = harness(vec![record], admission_config());

        let outcome = h.pipeline.process(1, None).await.unwrap();
        let ItemOutcome::Completed(produced) = outcome else {
            panic!("expected completion, got {outcome:?}");
        };
        assert_eq!(produced.thumbnail.kind, MediaKind::Png);

        let thumb = image::load_from_memory(&produced.thumbnail.bytes).unwrap();
        assert_eq!((thumb.width(), thumb.height()), (200, 50));

        let rec = h.store.get(1).unwrap();
        assert!(rec.uploaded);
        assert_eq!(rec.thumbnail_route.as_deref(), Some(produced.route.as_str()));
        assert_eq!(rec.error_message, None);
        assert_eq!(rec.status, RecordStatus::Completed);
        assert!(h.dir.path().join(&produced.route).exists());
    }

    #[tokio::test]
    async fn test_complete_record_is_left_unchanged() {
        let mut record = NftRecord::new(2, "0xabc", "8", "ipfs://Qm1");
        record.apply(&NftUpdate::success("0xabc/done.png"));
        let h = harness(vec![record.clone()], admission_config());

        let outcome = h.pipeline.process(2, None).await.unwrap();
        assert_eq!(outcome, ItemOutcome::Skipped);
        assert_eq!(h.store.get(2).unwrap(), record);
        assert_eq!(h.store.update_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_locator_is_input_failure() {
        let mut record = NftRecord::new(3, "0xabc", "9", "");
        record.raw_media_uri = Some("\0\0".into());
        let h = harness(vec![record], admission_config());

        let outcome = h.pipeline.process(3, None).await.unwrap();
        assert!(matches!(outcome, ItemOutcome::Failed { kind: ErrorKind::Input, .. }));

        let rec = h.store.get(3).unwrap();
        assert!(!rec.uploaded);
        assert!(rec.error_message.unwrap().starts_with("missing input"));
    }

    #[tokio::test]
    async fn test_absent_record_fails_without_update() {
        let h = harness(vec![], admission_config());
        let outcome = h.pipeline.process(99, None).await.unwrap();
        assert!(matches!(outcome, ItemOutcome::Failed { kind: ErrorKind::Input, .. }));
        assert_eq!(h.store.update_count(), 0);
    }

    #[tokio::test]
    async fn test_oversize_inline_writes_nothing() {
        let config = AdmissionConfig {
            inline_cap_bytes: 1024,
            ..admission_config()
        };
        let svg = format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="10" height="10"><!-- {} --></svg>"#,
            "x".repeat(4096)
        );
        let record = NftRecord::new(4, "0xabc", "1", data_uri("image/svg+xml", svg.as_bytes()));
        let h = harness(vec![record], config);

        let outcome = h.pipeline.process(4, None).await.unwrap();
        assert!(matches!(outcome, ItemOutcome::Failed { kind: ErrorKind::Oversize, .. }));

        let rec = h.store.get(4).unwrap();
        assert!(!rec.uploaded);
        assert!(rec.error_message.unwrap().starts_with("oversize payload"));
        assert_eq!(stored_files(h.dir.path()), 0);
    }

    #[tokio::test]
    async fn test_remote_fetch_and_throttle() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "5"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(png_bytes(300, 300)))
            .mount(&server)
            .await;

        let url = format!("{}/media/token.png", server.uri());
        let records = vec![
            NftRecord::new(5, "0xabc", "5", url.clone()),
            NftRecord::new(6, "0xabc", "6", url),
        ];
        let h = harness(records, admission_config());

        let outcome = h.pipeline.process(5, None).await.unwrap();
        let ItemOutcome::Deferred { retry_after, .. } = outcome else {
            panic!("expected deferral, got {outcome:?}");
        };
        assert_eq!(retry_after, Duration::from_secs(5));
        let rec = h.store.get(5).unwrap();
        assert_eq!(rec.status, RecordStatus::Deferred);
        assert!(rec.error_message.unwrap().starts_with("deferred retry"));
        assert_eq!(h.pipeline.admission().retry_depth(), 1);

        let outcome = h.pipeline.process(6, None).await.unwrap();
        assert!(outcome.is_success());
        assert!(h.store.get(6).unwrap().uploaded);
    }

    #[tokio::test]
    async fn test_not_found_status_is_recorded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let record = NftRecord::new(7, "0xabc", "7", format!("{}/missing.png", server.uri()));
        let h = harness(vec![record], admission_config());

        h.pipeline.process(7, None).await.unwrap();
        let rec = h.store.get(7).unwrap();
        assert_eq!(
            rec.error_message.as_deref(),
            Some("Request failed with status code 404")
        );
        assert!(!rec.is_reprocessable());
    }

    #[tokio::test]
    async fn test_resume_continues_from_fetched_bytes() {
        let record = NftRecord::new(8, "0xabc", "8", "https://example.invalid/a.png");
        let h = harness(vec![record.clone()], admission_config());

        let item = PendingItem {
            request: ImageRequest::from_record(&record, "https://example.invalid/a.png".into()),
            locator_kind: Some(MediaKind::Png),
        };
        let outcome = h.pipeline.resume(item.clone(), png_bytes(50, 50)).await.unwrap();
        assert!(matches!(outcome, ItemOutcome::Completed(_)));
        assert!(h.store.get(8).unwrap().is_complete());

        h.pipeline
            .abandon(item, Error::fetch("connection reset"))
            .await
            .unwrap();
        let rec = h.store.get(8).unwrap();
        assert!(!rec.uploaded);
        assert!(rec.is_reprocessable());
    }
}
