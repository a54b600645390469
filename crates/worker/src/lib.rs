//! Ingestion workers and background tasks for the NFT media pipeline.
//!
//! - [`pipeline`]: fetch, resolve, transcode and persist one item
//! - [`worker`]: consumes ids from one queue, one at a time
//! - [`distributor`]: feeds per-worker queues and supervises workers
//! - [`retry`]: resumes items the admission controller deferred
//! - [`sweep`]: re-runs records that failed transiently
//! - [`scheduler`]: periodic background tasks

pub mod config;
pub mod distributor;
pub mod pipeline;
pub mod retry;
pub mod scheduler;
pub mod storage;
pub mod sweep;
pub mod worker;

pub use config::{PipelineConfig, StorageConfig};
pub use distributor::{Assignment, DistributionSummary, Distributor};
pub use pipeline::{ItemAdmission, ItemOutcome, PendingItem, Pipeline, Produced};
pub use retry::ResumeHandler;
pub use scheduler::{SchedulerConfig, WorkerScheduler};
pub use storage::{thumbnail_route, LocalStorage, SharedStorage, ThumbnailStorage};
pub use sweep::{ReprocessSweep, SweepReport};
pub use worker::{IngestionWorker, WorkerEvent};
