//! Reprocessing sweep over failed records.
//!
//! Pages through records that carry an error and no route, in id order, and
//! re-runs the ones whose failure is not permanent. Deferred records are
//! re-run only when no retry entry for them is live in this process, which
//! is the case after a restart.

use std::sync::Arc;
use tracing::{debug, info};

use ingest_core::limits::SWEEP_BATCH_SIZE;
use ingest_core::{RecordStatus, Result};
use telemetry::metrics;

use crate::pipeline::{ItemOutcome, Pipeline};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub reprocessed: usize,
    pub completed: usize,
}

pub struct ReprocessSweep {
    pipeline: Arc<Pipeline>,
    credential: Option<String>,
    batch_size: usize,
}

impl ReprocessSweep {
    pub fn new(pipeline: Arc<Pipeline>, credential: Option<String>) -> Self {
        Self {
            pipeline,
            credential,
            batch_size: SWEEP_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub async fn run(&self) -> Result<SweepReport> {
        let mut report = SweepReport::default();
        let mut after_id = i64::MIN;

        loop {
            let batch = self
                .pipeline
                .store()
                .list_failed(after_id, self.batch_size)
                .await?;
            let Some(last) = batch.last() else {
                break;
            };
            after_id = last.id;
            let full = batch.len() == self.batch_size;

            for record in batch {
                report.scanned += 1;
                if !record.is_reprocessable() {
                    continue;
                }
                if record.status == RecordStatus::Deferred
                    && self.pipeline.admission().is_pending(record.id)
                {
                    continue;
                }

                debug!(nft_id = record.id, "Reprocessing failed record");
                report.reprocessed += 1;
                metrics().records_swept.inc();

                let outcome = self
                    .pipeline
                    .process(record.id, self.credential.as_deref())
                    .await?;
                if matches!(outcome, ItemOutcome::Completed(_)) {
                    report.completed += 1;
                }
            }

            if !full {
                break;
            }
        }

        info!(
            scanned = report.scanned,
            reprocessed = report.reprocessed,
            completed = report.completed,
            "Reprocessing sweep finished"
        );
        Ok(report)
    }
}
