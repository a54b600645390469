//! Worker scheduler for background tasks.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{debug, error, info};

use telemetry::metrics;

use crate::pipeline::Pipeline;
use crate::retry::ResumeHandler;
use crate::sweep::ReprocessSweep;

/// Background task periods.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Retry queue scan period
    pub retry_tick: Duration,
    /// Metrics snapshot log period
    pub metrics_log_interval: Duration,
    /// Idle origin throttle cleanup period
    pub throttle_cleanup_interval: Duration,
    /// Reprocessing sweep period; no sweep when unset
    pub sweep_interval: Option<Duration>,
    /// Credential used by sweep fetches
    pub sweep_credential: Option<String>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            retry_tick: Duration::from_secs(1),
            metrics_log_interval: Duration::from_secs(60),
            throttle_cleanup_interval: Duration::from_secs(300),
            sweep_interval: None,
            sweep_credential: None,
        }
    }
}

/// Background worker scheduler.
pub struct WorkerScheduler {
    config: SchedulerConfig,
    pipeline: Arc<Pipeline>,
}

impl WorkerScheduler {
    pub fn new(config: SchedulerConfig, pipeline: Arc<Pipeline>) -> Self {
        Self { config, pipeline }
    }

    /// Starts all background workers.
    pub fn start(self: Arc<Self>) -> Vec<tokio::task::JoinHandle<()>> {
        let mut handles = Vec::new();

        // Retry ticker: the only path that resumes deferred fetches
        let handler = Arc::new(ResumeHandler::new(self.pipeline.clone()));
        handles.push(
            self.pipeline
                .admission()
                .spawn_retry_ticker(self.config.retry_tick, handler),
        );

        let scheduler = self.clone();
        handles.push(tokio::spawn(async move {
            scheduler.run_metrics_log().await;
        }));

        let scheduler = self.clone();
        handles.push(tokio::spawn(async move {
            scheduler.run_throttle_cleanup().await;
        }));

        if let Some(period) = self.config.sweep_interval {
            let scheduler = self.clone();
            handles.push(tokio::spawn(async move {
                scheduler.run_sweep(period).await;
            }));
            info!(period_secs = period.as_secs(), "Reprocessing sweep scheduled");
        }

        info!("Background workers started");
        handles
    }

    async fn run_metrics_log(&self) {
        let mut ticker = interval(self.config.metrics_log_interval);

        loop {
            ticker.tick().await;

            let snapshot = metrics().snapshot();
            info!(
                items_started = snapshot.items_started,
                items_succeeded = snapshot.items_succeeded,
                items_failed = snapshot.items_failed,
                items_skipped = snapshot.items_skipped,
                fetches = snapshot.fetches,
                throttled = snapshot.throttled,
                deferrals = snapshot.deferrals,
                retry_queue_depth = snapshot.retry_queue_depth,
                worker_crashes = snapshot.worker_crashes,
                records_swept = snapshot.records_swept,
                fetch_latency_mean_ms = snapshot.fetch_latency_mean_ms,
                transcode_latency_mean_ms = snapshot.transcode_latency_mean_ms,
                "Pipeline metrics"
            );
        }
    }

    async fn run_throttle_cleanup(&self) {
        let mut ticker = interval(self.config.throttle_cleanup_interval);

        loop {
            ticker.tick().await;

            let throttle = self.pipeline.admission().throttle();
            let removed = throttle.cleanup();
            if removed > 0 {
                debug!(removed, tracked = throttle.tracked(), "Dropped idle origin throttle state");
            }
        }
    }

    async fn run_sweep(&self, period: Duration) {
        let sweep = ReprocessSweep::new(self.pipeline.clone(), self.config.sweep_credential.clone());
        let mut ticker = interval(period);

        loop {
            ticker.tick().await;

            if let Err(e) = sweep.run().await {
                error!("Reprocessing sweep error: {}", e);
            }
        }
    }
}
