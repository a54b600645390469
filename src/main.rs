//! NFT Media Ingestion Pipeline
//!
//! Turns token media into stored thumbnails:
//! - Work distribution over per-worker Redpanda queues
//! - Per-origin admission control with deferred retry on 429
//! - Format resolution and transcoding (raster, svg, gif, mp4)
//! - Outcome write-back to the ClickHouse record store
//! - `/image` HTTP endpoints over the same pipeline

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info, warn};

use admission::AdmissionConfig;
use api::{router, AppState};
use media::{MediaConfig, Transcoder};
use record_store::{ClickHouseClient, ClickHouseStore, MemoryStore, SharedStore, StoreBackend, StoreConfig};
use telemetry::{health, init_tracing_from_env};
use work_queue::{QueueBackend, QueueConfig, SharedQueue};
use worker::{
    Distributor, ItemAdmission, LocalStorage, Pipeline, PipelineConfig, SchedulerConfig, StorageConfig,
    WorkerScheduler,
};

/// Application configuration.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct Config {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,

    /// Run the distributor and workers in this process
    #[serde(default = "default_run_workers")]
    run_workers: bool,

    #[serde(default)]
    pipeline: PipelineConfig,

    #[serde(default)]
    admission: AdmissionConfig,

    #[serde(default)]
    media: MediaConfig,

    #[serde(default)]
    storage: StorageConfig,

    #[serde(default)]
    queue: QueueConfig,

    #[serde(default)]
    store: StoreConfig,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_run_workers() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            run_workers: default_run_workers(),
            pipeline: PipelineConfig::default(),
            admission: AdmissionConfig::default(),
            media: MediaConfig::default(),
            storage: StorageConfig::default(),
            queue: QueueConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Install rustls crypto provider BEFORE any TLS operations
    // rustls 0.23+ requires explicit crypto provider selection
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    // Load .env file if present
    dotenvy::dotenv().ok();

    init_tracing_from_env();

    info!("Starting NFT Media Pipeline v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config()?;
    config.media.validate().context("Invalid media configuration")?;

    info!(
        workers = config.pipeline.worker_count,
        start_cursor = config.pipeline.start_cursor,
        credentials = config.pipeline.credentials.len(),
        queue_backend = ?config.queue.backend,
        store_backend = ?config.store.backend,
        storage_dir = %config.storage.base_dir.display(),
        "Configuration loaded"
    );

    let store = build_store(&config.store).await?;
    let queue = build_queue(&config.queue).await;

    let admission =
        Arc::new(ItemAdmission::new(&config.admission).context("Invalid admission configuration")?);
    let pipeline = Arc::new(Pipeline::new(
        store,
        admission,
        Transcoder::new(config.media.clone()),
        Arc::new(LocalStorage::new(config.storage.base_dir.clone())),
        &config.admission,
    ));

    // Background tasks: retry ticker, metrics log, throttle cleanup, sweep
    let scheduler = Arc::new(WorkerScheduler::new(
        SchedulerConfig {
            retry_tick: config.admission.retry_tick(),
            metrics_log_interval: std::time::Duration::from_secs(config.pipeline.metrics_log_interval_secs),
            throttle_cleanup_interval: std::time::Duration::from_secs(
                config.pipeline.throttle_cleanup_interval_secs,
            ),
            sweep_interval: config.pipeline.sweep_interval(),
            sweep_credential: config.pipeline.credential_for(0),
        },
        pipeline.clone(),
    ));
    let _worker_handles = scheduler.start();

    let distributor = if config.run_workers {
        let distributor = Distributor::new(config.pipeline.clone(), queue, pipeline.clone())
            .context("Invalid pipeline configuration")?;
        Some(tokio::spawn(async move {
            match distributor.run().await {
                Ok(summary) => info!(
                    dispatched = summary.dispatched,
                    crashes = summary.crashes,
                    "Distributor finished"
                ),
                Err(e) => error!("Distributor fatal error: {}", e),
            }
        }))
    } else {
        info!("Workers disabled, serving API only");
        None
    };

    let state = AppState::new(pipeline).with_credential(config.pipeline.credential_for(0));
    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid server address")?;

    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shutting down...");

    // Dropping the distributor aborts its workers
    if let Some(handle) = distributor {
        handle.abort();
    }

    info!("Shutdown complete");
    Ok(())
}

/// Load configuration from files and environment.
fn load_config() -> Result<Config> {
    let config = config::Config::builder()
        // Start with defaults
        .add_source(config::Config::try_from(&Config::default())?)
        // Load from config file if exists
        .add_source(
            config::File::with_name("config/default")
                .required(false)
                .format(config::FileFormat::Toml),
        )
        // Override with environment variables
        .add_source(
            config::Environment::default()
                .separator("__")
                .prefix("INGEST")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    let mut config: Config = config
        .try_deserialize()
        .context("Failed to deserialize configuration")?;

    // Manual overrides for list values and underscored nested fields
    if let Ok(credentials) = std::env::var("INGEST_PIPELINE_CREDENTIALS") {
        config.pipeline.credentials = split_list(&credentials);
    }
    if let Ok(count) = std::env::var("INGEST_PIPELINE_WORKER_COUNT") {
        config.pipeline.worker_count = count.parse().context("INGEST_PIPELINE_WORKER_COUNT")?;
    }
    if let Ok(cursor) = std::env::var("INGEST_PIPELINE_START_CURSOR") {
        config.pipeline.start_cursor = cursor.parse().context("INGEST_PIPELINE_START_CURSOR")?;
    }
    if let Ok(proxies) = std::env::var("INGEST_ADMISSION_PROXIES") {
        config.admission.proxies = split_list(&proxies);
    }
    if let Ok(header) = std::env::var("INGEST_ADMISSION_GATEWAY_AUTH_HEADER") {
        config.admission.gateway_auth_header = Some(header);
    }
    if let Ok(dir) = std::env::var("INGEST_STORAGE_BASE_DIR") {
        config.storage.base_dir = dir.into();
    }

    // Redpanda
    if let Ok(brokers) = std::env::var("INGEST_REDPANDA_BROKERS") {
        config.queue.redpanda.brokers = split_list(&brokers);
    }
    if let Ok(username) = std::env::var("INGEST_REDPANDA_SASL_USERNAME") {
        config.queue.redpanda.sasl_username = Some(username);
    }
    if let Ok(password) = std::env::var("INGEST_REDPANDA_SASL_PASSWORD") {
        config.queue.redpanda.sasl_password = Some(password);
    }

    // ClickHouse
    if let Ok(url) = std::env::var("INGEST_CLICKHOUSE_URL") {
        config.store.clickhouse.url = url;
    }
    if let Ok(database) = std::env::var("INGEST_CLICKHOUSE_DATABASE") {
        config.store.clickhouse.database = database;
    }
    if let Ok(username) = std::env::var("INGEST_CLICKHOUSE_USERNAME") {
        config.store.clickhouse.username = Some(username);
    }
    if let Ok(password) = std::env::var("INGEST_CLICKHOUSE_PASSWORD") {
        config.store.clickhouse.password = Some(password);
    }

    Ok(config)
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Builds the record store and records its health.
async fn build_store(config: &StoreConfig) -> Result<SharedStore> {
    match config.backend {
        StoreBackend::Memory => {
            warn!("Using in-memory record store");
            health().store.set_healthy();
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Clickhouse => {
            let client = ClickHouseClient::new(config.clickhouse.clone())
                .context("Failed to create ClickHouse client")?;

            if record_store::health::check_connection(&client).await {
                health().store.set_healthy();
                info!("ClickHouse connection: healthy");
            } else {
                health().store.set_unhealthy("Connection failed");
                error!("ClickHouse connection: unhealthy");
            }

            if config.clickhouse.init_schema {
                record_store::health::init_schema(&client)
                    .await
                    .context("Failed to initialize ClickHouse schema")?;
            }

            Ok(Arc::new(ClickHouseStore::new(client)))
        }
    }
}

/// Builds the work queue and records its health.
async fn build_queue(config: &QueueConfig) -> SharedQueue {
    match config.backend {
        QueueBackend::Memory => {
            warn!("Using in-memory work queue");
            health().queue.set_healthy();
        }
        QueueBackend::Redpanda => {
            if work_queue::health::check_connection(&config.redpanda).await {
                health().queue.set_healthy();
                info!("Redpanda connection: healthy");
            } else {
                health().queue.set_unhealthy("Connection failed");
                error!("Redpanda connection: unhealthy");
            }
        }
    }
    work_queue::build(config)
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received terminate signal");
        }
    }
}
