//! Unified error types for the ingestion pipeline.
//!
//! Item-level failures are classified by [`ErrorKind`]:
//! - INPUT: missing or invalid record fields (terminal, never auto-retried)
//! - THROTTLE: origin answered 429 (deferred through the retry queue)
//! - FETCH: any other fetch failure (terminal, eligible for the sweep)
//! - TRANSCODE: codec or external filter failure (terminal)
//! - OVERSIZE: payload above the configured cap (terminal)
//! - INFRA: store, queue, storage and configuration failures

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Message prefix used for every status-code fetch failure.
///
/// The reprocessing sweep parses this prefix back out of stored error
/// messages, so it must stay stable.
pub const FETCH_STATUS_PREFIX: &str = "Request failed with status code";

/// Stored message for records with no usable media reference.
pub const MISSING_INPUT: &str = "missing input";

/// Coarse classification of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Input,
    Throttle,
    Fetch,
    Transcode,
    Oversize,
    Infrastructure,
}

impl ErrorKind {
    /// Get the error code string.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Input => "INPUT",
            Self::Throttle => "THROTTLE",
            Self::Fetch => "FETCH",
            Self::Transcode => "TRANSCODE",
            Self::Oversize => "OVERSIZE",
            Self::Infrastructure => "INFRA",
        }
    }

    /// Whether an item failing with this kind reaches a terminal state.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Throttle)
    }
}

/// Unified error type for the ingestion pipeline.
#[derive(Debug, Error)]
pub enum Error {
    #[error("missing input: {0}")]
    Input(String),

    #[error("origin {origin} throttled, retry after {retry_after_secs}s")]
    Throttled {
        origin: String,
        retry_after_secs: u64,
    },

    #[error("Request failed with status code {0}")]
    FetchStatus(u16),

    #[error("fetch failed: {0}")]
    Fetch(String),

    #[error("transcode failed: {0}")]
    Transcode(String),

    #[error("oversize payload: {size} bytes exceeds the {limit} byte limit")]
    Oversize { size: usize, limit: usize },

    #[error("store error: {0}")]
    Store(String),

    #[error("queue error: {0}")]
    Queue(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn input(msg: impl Into<String>) -> Self {
        Self::Input(msg.into())
    }

    pub fn fetch(msg: impl Into<String>) -> Self {
        Self::Fetch(msg.into())
    }

    pub fn transcode(msg: impl Into<String>) -> Self {
        Self::Transcode(msg.into())
    }

    pub fn oversize(size: usize, limit: usize) -> Self {
        Self::Oversize { size, limit }
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    pub fn queue(msg: impl Into<String>) -> Self {
        Self::Queue(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Input(_) => ErrorKind::Input,
            Self::Throttled { .. } => ErrorKind::Throttle,
            Self::FetchStatus(_) | Self::Fetch(_) => ErrorKind::Fetch,
            Self::Transcode(_) => ErrorKind::Transcode,
            Self::Oversize { .. } => ErrorKind::Oversize,
            Self::Store(_)
            | Self::Queue(_)
            | Self::Storage(_)
            | Self::Config(_)
            | Self::Serialization(_)
            | Self::Internal(_) => ErrorKind::Infrastructure,
        }
    }

    /// HTTP status returned by the origin, if this is a status failure.
    pub fn fetch_status(&self) -> Option<u16> {
        match self {
            Self::FetchStatus(status) => Some(*status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_message_matches_sweep_prefix() {
        let err = Error::FetchStatus(404);
        assert_eq!(err.to_string(), format!("{FETCH_STATUS_PREFIX} 404"));
        assert_eq!(err.fetch_status(), Some(404));
    }

    #[test]
    fn test_throttle_is_not_terminal() {
        let err = Error::Throttled {
            origin: "ipfs".into(),
            retry_after_secs: 5,
        };
        assert_eq!(err.kind(), ErrorKind::Throttle);
        assert!(!err.kind().is_terminal());
        assert!(Error::oversize(10, 5).kind().is_terminal());
    }

    #[test]
    fn test_input_message_starts_with_missing_input() {
        let err = Error::input("record 7 not found");
        assert!(err.to_string().starts_with(MISSING_INPUT));
        assert_eq!(err.kind().code(), "INPUT");
    }
}
