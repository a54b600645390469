//! Redpanda-backed work queues.
//!
//! Each queue is a single-partition topic. `reset` deletes and recreates
//! the topic. Consumption reads partition 0 in offset order; the delivery
//! tag is the record offset and `ack` advances the committed offset kept in
//! this process. A restarted process starts again from the earliest
//! retained offset of a freshly reset topic.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rskafka::client::{
    partition::{Compression, OffsetAt, PartitionClient, UnknownTopicHandling},
    Client, ClientBuilder, Credentials, SaslConfig,
};
use rskafka::record::Record;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, info, warn};

use ingest_core::{Error, Result};

use crate::config::RedpandaConfig;
use crate::{Delivery, WorkQueue};

/// Creates a TLS configuration for Redpanda Cloud.
fn create_tls_config() -> Arc<rustls::ClientConfig> {
    let root_store =
        rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    Arc::new(config)
}

/// Builds a client, adding TLS and SASL when credentials are configured.
pub(crate) async fn connect(config: &RedpandaConfig) -> Result<Client> {
    let mut builder = ClientBuilder::new(vec![config.broker_string()]);
    if let Some((username, password)) = config.sasl() {
        builder = builder
            .tls_config(create_tls_config())
            .sasl_config(SaslConfig::ScramSha256(Credentials::new(
                username.to_string(),
                password.to_string(),
            )));
    }
    builder
        .build()
        .await
        .map_err(|e| Error::queue(format!("Failed to connect to Redpanda: {e}")))
}

#[derive(Default)]
struct Cursor {
    /// Next offset to fetch; `None` until the first fetch
    next: Option<i64>,
    committed: i64,
    buffered: VecDeque<(i64, String)>,
}

pub struct RedpandaQueue {
    config: RedpandaConfig,
    client: OnceCell<Arc<Client>>,
    partitions: RwLock<BTreeMap<String, Arc<PartitionClient>>>,
    cursors: Mutex<HashMap<String, Cursor>>,
}

impl RedpandaQueue {
    pub fn new(config: RedpandaConfig) -> Self {
        Self {
            config,
            client: OnceCell::new(),
            partitions: RwLock::new(BTreeMap::new()),
            cursors: Mutex::new(HashMap::new()),
        }
    }

    async fn client(&self) -> Result<Arc<Client>> {
        self.client
            .get_or_try_init(|| async { connect(&self.config).await.map(Arc::new) })
            .await
            .cloned()
    }

    async fn partition(&self, queue: &str) -> Result<Arc<PartitionClient>> {
        {
            let partitions = self.partitions.read().await;
            if let Some(client) = partitions.get(queue) {
                return Ok(client.clone());
            }
        }

        let client = self.client().await?;
        let partition = client
            .partition_client(queue.to_string(), 0, UnknownTopicHandling::Retry)
            .await
            .map_err(|e| Error::queue(format!("Failed to get partition client for {queue}: {e}")))?;
        let partition = Arc::new(partition);

        self.partitions
            .write()
            .await
            .insert(queue.to_string(), partition.clone());
        Ok(partition)
    }

    /// Offset up to which `queue` has been acknowledged.
    pub fn committed(&self, queue: &str) -> i64 {
        self.cursors.lock().get(queue).map_or(0, |c| c.committed)
    }

    fn take_buffered(&self, queue: &str) -> Option<(i64, String)> {
        self.cursors.lock().get_mut(queue)?.buffered.pop_front()
    }
}

#[async_trait]
impl WorkQueue for RedpandaQueue {
    async fn reset(&self, queue: &str) -> Result<()> {
        let client = self.client().await?;
        let controller = client
            .controller_client()
            .map_err(|e| Error::queue(format!("Failed to get controller client: {e}")))?;

        if let Err(e) = controller
            .delete_topic(queue.to_string(), self.config.admin_timeout_ms)
            .await
        {
            // Absent on first start.
            debug!(queue = %queue, error = %e, "Queue topic not deleted");
        }

        controller
            .create_topic(
                queue.to_string(),
                1,
                self.config.replication_factor,
                self.config.admin_timeout_ms,
            )
            .await
            .map_err(|e| Error::queue(format!("Failed to create queue {queue}: {e}")))?;

        self.partitions.write().await.remove(queue);
        self.cursors.lock().remove(queue);

        info!(queue = %queue, "Queue reset");
        Ok(())
    }

    async fn publish(&self, queue: &str, id: i64) -> Result<()> {
        let partition = self.partition(queue).await?;
        let record = Record {
            key: None,
            value: Some(id.to_string().into_bytes()),
            headers: BTreeMap::new(),
            timestamp: Utc::now(),
        };

        partition
            .produce(vec![record], Compression::NoCompression)
            .await
            .map_err(|e| Error::queue(format!("Failed to publish to {queue}: {e}")))?;

        debug!(queue = %queue, id, "Published id");
        Ok(())
    }

    async fn consume(&self, queue: &str) -> Result<Delivery> {
        let partition = self.partition(queue).await?;

        loop {
            if let Some((offset, payload)) = self.take_buffered(queue) {
                return Ok(Delivery {
                    queue: queue.to_string(),
                    tag: offset,
                    payload,
                });
            }

            let known = self.cursors.lock().get(queue).and_then(|c| c.next);
            let next = match known {
                Some(offset) => offset,
                None => partition
                    .get_offset(OffsetAt::Earliest)
                    .await
                    .map_err(|e| Error::queue(format!("Failed to get offset for {queue}: {e}")))?,
            };

            let (records, _high_watermark) = partition
                .fetch_records(next, 1..self.config.fetch_max_bytes, self.config.fetch_max_wait_ms)
                .await
                .map_err(|e| Error::queue(format!("Failed to fetch from {queue}: {e}")))?;

            let mut cursors = self.cursors.lock();
            let cursor = cursors.entry(queue.to_string()).or_default();
            let mut advanced = next;
            for record in records {
                if record.offset < next {
                    continue;
                }
                advanced = advanced.max(record.offset + 1);
                match record.record.value.map(String::from_utf8) {
                    Some(Ok(payload)) => cursor.buffered.push_back((record.offset, payload)),
                    _ => warn!(queue = %queue, offset = record.offset, "Skipping non-text message"),
                }
            }
            cursor.next = Some(advanced);
        }
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        let mut cursors = self.cursors.lock();
        let cursor = cursors.entry(delivery.queue.clone()).or_default();
        cursor.committed = cursor.committed.max(delivery.tag + 1);
        debug!(queue = %delivery.queue, offset = delivery.tag, "Acknowledged");
        Ok(())
    }
}
