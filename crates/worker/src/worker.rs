//! Ingestion worker: one item at a time from its own queue.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use ingest_core::Result;
use work_queue::{Delivery, SharedQueue};

use crate::pipeline::{ItemOutcome, Pipeline};

/// Signals from workers to the distributor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerEvent {
    /// The worker acknowledged its item and is ready for the next id.
    Done { worker_id: u64 },
}

/// Record id a worker is currently holding, shared with its supervisor.
#[derive(Debug, Clone, Default)]
pub struct InProgress(Arc<Mutex<Option<i64>>>);

impl InProgress {
    pub fn get(&self) -> Option<i64> {
        *self.0.lock()
    }

    fn set(&self, id: Option<i64>) {
        *self.0.lock() = id;
    }
}

pub struct IngestionWorker {
    id: u64,
    queue_name: String,
    credential: Option<String>,
    queue: SharedQueue,
    pipeline: Arc<Pipeline>,
    events: mpsc::Sender<WorkerEvent>,
    in_progress: InProgress,
}

impl IngestionWorker {
    pub fn new(
        id: u64,
        queue_name: impl Into<String>,
        credential: Option<String>,
        queue: SharedQueue,
        pipeline: Arc<Pipeline>,
        events: mpsc::Sender<WorkerEvent>,
    ) -> Self {
        Self {
            id,
            queue_name: queue_name.into(),
            credential,
            queue,
            pipeline,
            events,
            in_progress: InProgress::default(),
        }
    }

    pub fn in_progress(&self) -> InProgress {
        self.in_progress.clone()
    }

    /// Consumes until the queue fails or the distributor goes away.
    ///
    /// A returned error means the worker is gone and must be replaced.
    pub async fn run(self) -> Result<()> {
        info!(worker_id = self.id, queue = %self.queue_name, "Ingestion worker started");

        loop {
            let delivery = self.queue.consume(&self.queue_name).await?;
            self.handle(&delivery).await;
            self.queue.ack(&delivery).await?;
            self.in_progress.set(None);

            if self
                .events
                .send(WorkerEvent::Done { worker_id: self.id })
                .await
                .is_err()
            {
                debug!(worker_id = self.id, "Distributor gone, worker stopping");
                return Ok(());
            }
        }
    }

    async fn handle(&self, delivery: &Delivery) {
        let id = match delivery.id() {
            Ok(id) => id,
            Err(e) => {
                warn!(worker_id = self.id, error = %e, "Dropping malformed message");
                return;
            }
        };
        self.in_progress.set(Some(id));

        match self.pipeline.process(id, self.credential.as_deref()).await {
            Ok(ItemOutcome::Deferred { retry_after, .. }) => {
                debug!(
                    worker_id = self.id,
                    nft_id = id,
                    retry_after_secs = retry_after.as_secs(),
                    "Item handed to retry queue"
                );
            }
            Ok(_) => {}
            Err(e) => {
                error!(worker_id = self.id, nft_id = id, error = %e, "Failed to record item outcome");
            }
        }
    }
}
