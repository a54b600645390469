//! Origin admission control for media fetches.
//!
//! Every remote fetch goes through [`AdmissionController`]:
//! 1. [`OriginThrottle`] spaces grants to each origin by a minimum interval
//! 2. [`Fetcher`] issues the request over a round-robin egress pool
//! 3. a 429 answer is parked in the [`RetryQueue`] until its `ready_at`
//! 4. a ticker re-issues ready entries and hands results to a [`RetryHandler`]

pub mod config;
pub mod controller;
pub mod fetcher;
pub mod retry_queue;
pub mod throttle;

pub use config::AdmissionConfig;
pub use controller::{Admission, AdmissionController, FetchTarget, RetryHandler};
pub use fetcher::{FetchOutcome, Fetcher};
pub use retry_queue::{RetryEntry, RetryQueue};
pub use throttle::OriginThrottle;
