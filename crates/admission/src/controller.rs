//! Admission controller: throttle, fetch, defer, retry.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};
use url::Url;

use ingest_core::{Error, OriginKey, Result};
use telemetry::metrics;

use crate::config::AdmissionConfig;
use crate::fetcher::{FetchOutcome, Fetcher};
use crate::retry_queue::{RetryEntry, RetryQueue};
use crate::throttle::OriginThrottle;

/// Everything needed to (re-)issue one fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTarget {
    pub url: Url,
    pub origin: OriginKey,
    /// Worker credential, sent only to gateway origins.
    pub credential: Option<String>,
}

/// Outcome of an admitted fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Fetched(Vec<u8>),
    /// Throttled by the origin; parked in the retry queue.
    Deferred { ready_at: Instant, retry_after: Duration },
}

/// Receives the outcome of retried fetches.
#[async_trait]
pub trait RetryHandler<T>: Send + Sync {
    /// The retried fetch succeeded.
    async fn on_fetched(&self, entry: RetryEntry<T>, bytes: Vec<u8>);

    /// The retried fetch failed terminally.
    async fn on_failed(&self, entry: RetryEntry<T>, error: Error);
}

struct Deferred<T> {
    target: FetchTarget,
    payload: T,
}

/// Shared admission path for every remote fetch in the process.
pub struct AdmissionController<T> {
    throttle: OriginThrottle,
    fetcher: Fetcher,
    retries: Mutex<RetryQueue<Deferred<T>>>,
    /// Ids popped from the queue whose retry fetch has not finished yet.
    retrying: Mutex<HashSet<i64>>,
}

impl<T: Clone + Send + Sync + 'static> AdmissionController<T> {
    pub fn new(config: &AdmissionConfig) -> Result<Self> {
        config.validate()?;

        let mut throttle = OriginThrottle::new(config.min_interval());
        for (origin, ms) in &config.origin_intervals_ms {
            throttle = throttle.with_override(origin.clone(), Duration::from_millis(*ms));
        }

        Ok(Self {
            throttle,
            fetcher: Fetcher::new(config)?,
            retries: Mutex::new(RetryQueue::new()),
            retrying: Mutex::new(HashSet::new()),
        })
    }

    pub fn throttle(&self) -> &OriginThrottle {
        &self.throttle
    }

    /// Pending retry entries.
    pub fn retry_depth(&self) -> usize {
        self.retries.lock().len()
    }

    /// Whether this process still owns a deferred fetch for `nft_id`,
    /// either parked in the retry queue or being retried.
    pub fn is_pending(&self, nft_id: i64) -> bool {
        self.retries.lock().contains(nft_id) || self.retrying.lock().contains(&nft_id)
    }

    /// Fetches `target` under admission control.
    ///
    /// A 429 is never returned as an error: the fetch is parked and
    /// [`Admission::Deferred`] is returned instead.
    pub async fn fetch(&self, nft_id: Option<i64>, target: FetchTarget, payload: T) -> Result<Admission> {
        match self.attempt(&target).await? {
            FetchOutcome::Fetched(bytes) => Ok(Admission::Fetched(bytes)),
            FetchOutcome::Throttled { retry_after } => {
                let ready_at = self.defer(nft_id, target, payload, retry_after);
                Ok(Admission::Deferred { ready_at, retry_after })
            }
        }
    }

    async fn attempt(&self, target: &FetchTarget) -> Result<FetchOutcome> {
        self.throttle.acquire(&target.origin).await;

        let credential = if target.origin.is_gateway() {
            target.credential.as_deref()
        } else {
            None
        };

        let started = std::time::Instant::now();
        let result = self.fetcher.fetch(&target.url, credential).await;
        metrics().fetches.inc();
        metrics()
            .fetch_latency_ms
            .observe(started.elapsed().as_millis() as u64);

        if matches!(result, Ok(FetchOutcome::Throttled { .. })) {
            metrics().throttled.inc();
        }
        result
    }

    fn defer(&self, nft_id: Option<i64>, target: FetchTarget, payload: T, retry_after: Duration) -> Instant {
        let ready_at = Instant::now() + retry_after;
        let origin = target.origin.clone();
        let entry = RetryEntry {
            nft_id,
            origin: origin.clone(),
            ready_at,
            payload: Deferred { target, payload },
        };

        let mut retries = self.retries.lock();
        if retries.push(entry) {
            debug!(nft_id = ?nft_id, origin = %origin, "Superseded earlier retry entry");
        }
        metrics().deferrals.inc();
        metrics().retry_queue_depth.set(retries.len() as u64);
        drop(retries);

        info!(
            nft_id = ?nft_id,
            origin = %origin,
            retry_after_secs = retry_after.as_secs(),
            "Fetch throttled, deferred"
        );
        ready_at
    }

    /// Dispatches every entry ready at `now`. Returns how many were dispatched.
    ///
    /// Each entry is re-fetched on its own task through the same admission
    /// path; a repeat 429 parks it again.
    pub fn dispatch_ready(self: &Arc<Self>, now: Instant, handler: Arc<dyn RetryHandler<T>>) -> usize {
        let ready = {
            let mut retries = self.retries.lock();
            let ready = retries.pop_ready(now);
            metrics().retry_queue_depth.set(retries.len() as u64);
            ready
        };

        let count = ready.len();
        self.retrying.lock().extend(ready.iter().filter_map(|e| e.nft_id));
        for entry in ready {
            metrics().retries_dispatched.inc();
            let controller = Arc::clone(self);
            let handler = Arc::clone(&handler);
            tokio::spawn(async move {
                controller.retry(entry, handler).await;
            });
        }
        count
    }

    async fn retry(&self, entry: RetryEntry<Deferred<T>>, handler: Arc<dyn RetryHandler<T>>) {
        let RetryEntry {
            nft_id,
            origin,
            ready_at,
            payload: Deferred { target, payload },
        } = entry;

        debug!(nft_id = ?nft_id, origin = %origin, "Retrying deferred fetch");
        let result = self.attempt(&target).await;
        let public = RetryEntry {
            nft_id,
            origin,
            ready_at,
            payload: payload.clone(),
        };

        match result {
            Ok(FetchOutcome::Fetched(bytes)) => handler.on_fetched(public, bytes).await,
            Ok(FetchOutcome::Throttled { retry_after }) => {
                self.defer(nft_id, target, payload, retry_after);
            }
            Err(e) => handler.on_failed(public, e).await,
        }

        if let Some(id) = nft_id {
            self.retrying.lock().remove(&id);
        }
    }

    /// Spawns the background ticker that resumes deferred fetches.
    pub fn spawn_retry_ticker(
        self: &Arc<Self>,
        period: Duration,
        handler: Arc<dyn RetryHandler<T>>,
    ) -> JoinHandle<()> {
        let controller = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            info!(period_ms = period.as_millis() as u64, "Retry ticker started");

            loop {
                interval.tick().await;
                let dispatched = controller.dispatch_ready(Instant::now(), Arc::clone(&handler));
                if dispatched > 0 {
                    debug!(dispatched, "Dispatched ready retries");
                }
            }
        })
    }
}
