//! Common test setup functions.

use admission::AdmissionConfig;
use api::{router, AppState};
use axum::Router;
use ingest_core::{Gateways, NftRecord};
use media::{MediaConfig, Transcoder};
use record_store::{MemoryStore, SharedStore};
use std::sync::Arc;
use worker::{ItemAdmission, Pipeline, ResumeHandler};

use crate::mocks::RecordingStorage;

/// Admission settings for tests: no spacing, `ipfs://` routed to `gateway`.
pub fn admission_config(gateway: Option<&str>) -> AdmissionConfig {
    let mut config = AdmissionConfig {
        min_interval_ms: 0,
        ..Default::default()
    };
    if let Some(gateway) = gateway {
        config.gateways = Gateways {
            ipfs: gateway.to_string(),
            arweave: gateway.to_string(),
        };
    }
    config
}

/// Pipeline wired to in-memory collaborators.
///
/// Uses the production router and pipeline; only the record store, thumbnail
/// storage and media origins are substituted.
pub struct TestContext {
    pub store: Arc<MemoryStore>,
    pub storage: Arc<RecordingStorage>,
    pub pipeline: Arc<Pipeline>,
    pub router: Router,
}

impl TestContext {
    pub fn new(records: Vec<NftRecord>, config: AdmissionConfig) -> Self {
        let store = Arc::new(MemoryStore::with_records(records));
        Self::with_store(store.clone(), store, config)
    }

    /// Runs the pipeline against `backend`; `store` is kept for assertions.
    pub fn with_store(store: Arc<MemoryStore>, backend: SharedStore, config: AdmissionConfig) -> Self {
        telemetry::init_test_tracing();
        let storage = RecordingStorage::new();
        let admission = Arc::new(ItemAdmission::new(&config).expect("valid admission config"));
        let pipeline = Arc::new(Pipeline::new(
            backend,
            admission,
            Transcoder::new(MediaConfig::default()),
            storage.clone(),
            &config,
        ));
        let router = router(AppState::new(pipeline.clone()));

        Self {
            store,
            storage,
            pipeline,
            router,
        }
    }

    pub fn retry_handler(&self) -> Arc<ResumeHandler> {
        Arc::new(ResumeHandler::new(self.pipeline.clone()))
    }

    /// Polls until `check` holds on record `id`.
    pub async fn wait_for_record(&self, id: i64, check: impl Fn(&NftRecord) -> bool) -> NftRecord {
        for _ in 0..300 {
            if let Some(record) = self.store.get(id) {
                if check(&record) {
                    return record;
                }
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("record {id} never reached the expected state: {:?}", self.store.get(id));
    }
}
