//! Size limits for the ingestion pipeline.
//!
//! Request field limits live on the `#[validate]` attributes in `request.rs`.

/// Default cap on decoded inline `data:` payloads (5MB).
pub const DEFAULT_INLINE_CAP_BYTES: usize = 5 * 1024 * 1024;

/// Default cap on remote fetch bodies (50MB).
///
/// Videos are the largest legitimate payloads.
pub const DEFAULT_MAX_FETCH_BYTES: usize = 50 * 1024 * 1024;

/// Reprocessing sweep page size.
pub const SWEEP_BATCH_SIZE: usize = 500;
