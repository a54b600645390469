//! Work distributor.
//!
//! Owns one queue per worker slot and hands out record ids from a
//! monotonically increasing cursor. Each slot holds a single credit: an id is
//! published to a slot's queue at startup and then once per `Done` event from
//! that slot's worker, so at most `worker_count` items are in flight.
//!
//! Workers run as supervised tasks. When one exits, a replacement is spawned
//! on the same queue with the same credential, the assignment table is
//! switched over to it, and the next id is dispatched to it unless an
//! undelivered message is still waiting in the slot's queue.
//!
//! Known gap: the cursor only advances on dispatch, so an id a worker was
//! holding when it crashed is not dispatched again. It is logged and left for
//! the reprocessing sweep if its record ever got an error written.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use ingest_core::Result;
use telemetry::metrics;
use work_queue::SharedQueue;

use crate::config::PipelineConfig;
use crate::pipeline::Pipeline;
use crate::worker::{InProgress, IngestionWorker, WorkerEvent};

/// Which worker serves which slot, and with which credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub worker_id: u64,
    pub slot: usize,
    pub credential: Option<String>,
    pub queue_name: String,
}

/// Totals reported when a bounded run finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributionSummary {
    pub dispatched: u64,
    pub crashes: u64,
    pub next_cursor: i64,
    /// Final assignments, ordered by slot
    pub assignments: Vec<Assignment>,
}

struct Running {
    assignment: Assignment,
    in_progress: InProgress,
    abort: AbortHandle,
}

type Exit = (u64, std::result::Result<Result<()>, JoinError>);

enum Step {
    Event(WorkerEvent),
    Exit(std::result::Result<Exit, JoinError>),
}

pub struct Distributor {
    config: PipelineConfig,
    queue: SharedQueue,
    pipeline: Arc<Pipeline>,
    workers: HashMap<u64, Running>,
    joins: JoinSet<Exit>,
    events_tx: mpsc::Sender<WorkerEvent>,
    events_rx: mpsc::Receiver<WorkerEvent>,
    /// Published but not yet acknowledged ids, per slot
    pending: Vec<usize>,
    cursor: i64,
    next_worker_id: u64,
    dispatched: u64,
    crashes: u64,
}

impl Distributor {
    pub fn new(config: PipelineConfig, queue: SharedQueue, pipeline: Arc<Pipeline>) -> Result<Self> {
        config.validate()?;
        let (events_tx, events_rx) = mpsc::channel(config.event_buffer);

        Ok(Self {
            pending: vec![0; config.worker_count],
            cursor: config.start_cursor,
            config,
            queue,
            pipeline,
            workers: HashMap::new(),
            joins: JoinSet::new(),
            events_tx,
            events_rx,
            next_worker_id: 0,
            dispatched: 0,
            crashes: 0,
        })
    }

    /// Runs until the cursor passes `end_cursor` and every slot is drained.
    ///
    /// Without an end cursor this only returns on a queue failure.
    pub async fn run(mut self) -> Result<DistributionSummary> {
        let slots = self.config.worker_count;
        info!(
            workers = slots,
            start_cursor = self.cursor,
            end_cursor = ?self.config.end_cursor,
            "Work distributor starting"
        );

        for slot in 0..slots {
            self.queue.reset(&self.config.queue_name(slot)).await?;
        }
        for slot in 0..slots {
            let credential = self.config.credential_for(slot);
            self.spawn_worker(slot, credential);
        }
        for slot in 0..slots {
            self.dispatch(slot).await?;
        }

        loop {
            if self.is_drained() {
                break;
            }

            let step = tokio::select! {
                Some(event) = self.events_rx.recv() => Step::Event(event),
                Some(exit) = self.joins.join_next() => Step::Exit(exit),
                else => break,
            };

            match step {
                Step::Event(event) => self.on_event(event).await?,
                Step::Exit(Ok((worker_id, result))) => {
                    // Anything the dead worker sent before exiting is already queued.
                    while let Ok(event) = self.events_rx.try_recv() {
                        self.on_event(event).await?;
                    }
                    self.on_exit(worker_id, result).await?;
                }
                Step::Exit(Err(e)) => error!(error = %e, "Worker supervisor task failed"),
            }
        }

        let summary = self.summary();
        info!(
            dispatched = summary.dispatched,
            crashes = summary.crashes,
            next_cursor = summary.next_cursor,
            "Work distributor finished"
        );
        Ok(summary)
    }

    fn exhausted(&self) -> bool {
        self.config.end_cursor.is_some_and(|end| self.cursor > end)
    }

    fn is_drained(&self) -> bool {
        self.exhausted() && self.pending.iter().all(|n| *n == 0)
    }

    fn spawn_worker(&mut self, slot: usize, credential: Option<String>) -> u64 {
        let worker_id = self.next_worker_id;
        self.next_worker_id += 1;

        let assignment = Assignment {
            worker_id,
            slot,
            credential,
            queue_name: self.config.queue_name(slot),
        };
        let worker = IngestionWorker::new(
            worker_id,
            assignment.queue_name.clone(),
            assignment.credential.clone(),
            Arc::clone(&self.queue),
            Arc::clone(&self.pipeline),
            self.events_tx.clone(),
        );
        let in_progress = worker.in_progress();

        let handle = tokio::spawn(worker.run());
        let abort = handle.abort_handle();
        self.joins.spawn(async move { (worker_id, handle.await) });

        self.workers.insert(
            worker_id,
            Running {
                assignment,
                in_progress,
                abort,
            },
        );
        metrics().active_workers.set(self.workers.len() as u64);
        worker_id
    }

    /// Publishes the next id to `slot`, unless the cursor is exhausted.
    async fn dispatch(&mut self, slot: usize) -> Result<()> {
        if self.exhausted() {
            debug!(slot, "Cursor exhausted, slot idle");
            return Ok(());
        }

        let queue_name = self.config.queue_name(slot);
        self.queue.publish(&queue_name, self.cursor).await?;
        debug!(slot, nft_id = self.cursor, "Dispatched id");

        self.cursor += 1;
        self.pending[slot] += 1;
        self.dispatched += 1;
        metrics().ids_dispatched.inc();
        Ok(())
    }

    async fn on_event(&mut self, event: WorkerEvent) -> Result<()> {
        match event {
            WorkerEvent::Done { worker_id } => {
                let Some(running) = self.workers.get(&worker_id) else {
                    debug!(worker_id, "Ignoring event from retired worker");
                    return Ok(());
                };
                let slot = running.assignment.slot;
                self.pending[slot] = self.pending[slot].saturating_sub(1);
                self.dispatch(slot).await
            }
        }
    }

    async fn on_exit(&mut self, worker_id: u64, result: std::result::Result<Result<()>, JoinError>) -> Result<()> {
        let Some(old) = self.workers.get(&worker_id) else {
            return Ok(());
        };
        let slot = old.assignment.slot;
        let credential = old.assignment.credential.clone();
        let lost = old.in_progress.get();

        match &result {
            Ok(Ok(())) => warn!(worker_id, slot, "Worker exited"),
            Ok(Err(e)) => error!(worker_id, slot, error = %e, "Worker failed"),
            Err(e) if e.is_panic() => error!(worker_id, slot, "Worker panicked"),
            Err(_) => warn!(worker_id, slot, "Worker cancelled"),
        }
        if let Some(nft_id) = lost {
            warn!(worker_id, nft_id, "Item lost with crashed worker, not re-dispatched");
            self.pending[slot] = self.pending[slot].saturating_sub(1);
        }

        self.crashes += 1;
        metrics().worker_crashes.inc();

        let delay = self.config.respawn_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        // The replacement is registered before the old mapping goes away.
        let replacement = self.spawn_worker(slot, credential);
        self.workers.remove(&worker_id);
        metrics().active_workers.set(self.workers.len() as u64);
        info!(old_worker_id = worker_id, worker_id = replacement, slot, "Worker replaced");

        // A message still sitting in the queue is the slot's credit.
        if self.pending[slot] == 0 {
            self.dispatch(slot).await?;
        }
        Ok(())
    }

    /// Current assignments, ordered by slot.
    pub fn assignments(&self) -> Vec<Assignment> {
        let mut assignments: Vec<_> = self
            .workers
            .values()
            .map(|running| running.assignment.clone())
            .collect();
        assignments.sort_by_key(|a| a.slot);
        assignments
    }

    fn summary(&self) -> DistributionSummary {
        DistributionSummary {
            dispatched: self.dispatched,
            crashes: self.crashes,
            next_cursor: self.cursor,
            assignments: self.assignments(),
        }
    }
}

impl Drop for Distributor {
    fn drop(&mut self) {
        for running in self.workers.values() {
            running.abort.abort();
        }
        metrics().active_workers.set(0);
    }
}
