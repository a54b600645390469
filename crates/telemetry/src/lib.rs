//! Internal telemetry for the NFT media pipeline.
//!
//! Structured logging setup plus in-process metrics and health registries.

pub mod health;
pub mod metrics;
pub mod tracing_setup;

pub use health::*;
pub use metrics::*;
pub use tracing_setup::*;
