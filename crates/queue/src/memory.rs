//! In-process work queue backed by tokio channels.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use ingest_core::{Error, Result};

use crate::{Delivery, WorkQueue};

struct Channel {
    tx: mpsc::UnboundedSender<(i64, String)>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<(i64, String)>>,
    next_tag: AtomicI64,
    unacked: Mutex<HashSet<i64>>,
}

impl Channel {
    fn new() -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            tx,
            rx: tokio::sync::Mutex::new(rx),
            next_tag: AtomicI64::new(0),
            unacked: Mutex::new(HashSet::new()),
        })
    }
}

/// Work queue living entirely in this process.
#[derive(Default)]
pub struct MemoryQueue {
    channels: Mutex<HashMap<String, Arc<Channel>>>,
    history: Mutex<Vec<(String, i64)>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn channel(&self, queue: &str) -> Arc<Channel> {
        self.channels
            .lock()
            .entry(queue.to_string())
            .or_insert_with(Channel::new)
            .clone()
    }

    /// Every id published so far, in order, with its queue.
    pub fn published(&self) -> Vec<(String, i64)> {
        self.history.lock().clone()
    }

    /// Ids published to one queue.
    pub fn published_to(&self, queue: &str) -> Vec<i64> {
        self.history
            .lock()
            .iter()
            .filter(|(q, _)| q == queue)
            .map(|(_, id)| *id)
            .collect()
    }

    /// Deliveries handed out but not yet acknowledged.
    pub fn unacked(&self, queue: &str) -> usize {
        self.channels
            .lock()
            .get(queue)
            .map_or(0, |c| c.unacked.lock().len())
    }
}

#[async_trait]
impl WorkQueue for MemoryQueue {
    async fn reset(&self, queue: &str) -> Result<()> {
        self.channels.lock().insert(queue.to_string(), Channel::new());
        Ok(())
    }

    async fn publish(&self, queue: &str, id: i64) -> Result<()> {
        let channel = self.channel(queue);
        let tag = channel.next_tag.fetch_add(1, Ordering::Relaxed);
        channel
            .tx
            .send((tag, id.to_string()))
            .map_err(|_| Error::queue(format!("queue {queue} is closed")))?;
        self.history.lock().push((queue.to_string(), id));
        Ok(())
    }

    async fn consume(&self, queue: &str) -> Result<Delivery> {
        let channel = self.channel(queue);
        let mut rx = channel.rx.lock().await;
        let (tag, payload) = rx
            .recv()
            .await
            .ok_or_else(|| Error::queue(format!("queue {queue} is closed")))?;
        channel.unacked.lock().insert(tag);

        Ok(Delivery {
            queue: queue.to_string(),
            tag,
            payload,
        })
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        let channel = self.channel(&delivery.queue);
        if channel.unacked.lock().remove(&delivery.tag) {
            Ok(())
        } else {
            Err(Error::queue(format!(
                "unknown delivery tag {} on {}",
                delivery.tag, delivery.queue
            )))
        }
    }
}
