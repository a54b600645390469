//! NFT record model and partial updates.
//!
//! A record's `thumbnail_route` is only ever set together with
//! `uploaded = true`; every failure update clears the route again.

use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::error::{FETCH_STATUS_PREFIX, MISSING_INPUT};

/// HTTP status codes that mark a fetch failure as permanent.
///
/// The whole 5xx family is permanent as well, see [`is_permanent_status`].
pub const PERMANENT_FETCH_STATUSES: &[u16] = &[400, 401, 403, 404, 410, 422, 451];

/// Processing status of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    /// Not processed yet.
    #[default]
    Pending,
    /// Fetch was throttled; waiting in the retry queue.
    Deferred,
    /// Thumbnail stored and route recorded.
    Completed,
    /// Terminal failure recorded in `error_message`.
    Failed,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Deferred => "deferred",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "deferred" => Self::Deferred,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            _ => Self::Pending,
        }
    }
}

/// An NFT metadata record as owned by the record store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NftRecord {
    pub id: i64,
    pub contract_address: String,
    pub token_id: String,
    pub raw_media_uri: Option<String>,
    pub declared_format: Option<String>,
    pub thumbnail_route: Option<String>,
    pub uploaded: bool,
    pub error_message: Option<String>,
    pub status: RecordStatus,
}

impl NftRecord {
    /// Creates a pending record.
    pub fn new(
        id: i64,
        contract_address: impl Into<String>,
        token_id: impl Into<String>,
        raw_media_uri: impl Into<String>,
    ) -> Self {
        Self {
            id,
            contract_address: contract_address.into(),
            token_id: token_id.into(),
            raw_media_uri: Some(raw_media_uri.into()),
            declared_format: None,
            thumbnail_route: None,
            uploaded: false,
            error_message: None,
            status: RecordStatus::Pending,
        }
    }

    pub fn with_declared_format(mut self, format: impl Into<String>) -> Self {
        self.declared_format = Some(format.into());
        self
    }

    /// Whether the thumbnail is already stored; such records are skipped.
    pub fn is_complete(&self) -> bool {
        self.uploaded
            && self
                .thumbnail_route
                .as_deref()
                .is_some_and(|route| !route.is_empty())
    }

    /// Raw media locator with embedded NUL characters removed.
    ///
    /// Returns `None` when nothing usable remains.
    pub fn media_locator(&self) -> Option<String> {
        let raw = self.raw_media_uri.as_deref()?;
        let cleaned: String = raw.chars().filter(|c| *c != '\0').collect();
        let cleaned = cleaned.trim();
        if cleaned.is_empty() {
            None
        } else {
            Some(cleaned.to_string())
        }
    }

    /// Applies a partial update in place.
    pub fn apply(&mut self, update: &NftUpdate) {
        if let Some(route) = &update.thumbnail_route {
            self.thumbnail_route = route.clone();
        }
        if let Some(uploaded) = update.uploaded {
            self.uploaded = uploaded;
        }
        if let Some(error) = &update.error_message {
            self.error_message = error.clone();
        }
        if let Some(status) = update.status {
            self.status = status;
        }
    }

    /// Whether the reprocessing sweep should pick this record up again.
    ///
    /// Deferred records qualify too; the caller skips those still held by a
    /// live retry queue.
    pub fn is_reprocessable(&self) -> bool {
        if self.thumbnail_route.is_some() {
            return false;
        }
        match self.error_message.as_deref() {
            Some(message) if !message.is_empty() => !is_permanent_failure(message),
            _ => false,
        }
    }
}

/// Partial update of an NFT record.
///
/// Outer `None` leaves a field untouched; `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NftUpdate {
    pub thumbnail_route: Option<Option<String>>,
    pub uploaded: Option<bool>,
    pub error_message: Option<Option<String>>,
    pub status: Option<RecordStatus>,
}

impl NftUpdate {
    /// Successful upload: route set, prior error cleared.
    pub fn success(route: impl Into<String>) -> Self {
        Self {
            thumbnail_route: Some(Some(route.into())),
            uploaded: Some(true),
            error_message: Some(None),
            status: Some(RecordStatus::Completed),
        }
    }

    /// Terminal failure: upload flag dropped, route cleared, message stored.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            thumbnail_route: Some(None),
            uploaded: Some(false),
            error_message: Some(Some(message.into())),
            status: Some(RecordStatus::Failed),
        }
    }

    /// Fetch deferred into the retry queue.
    pub fn deferred(message: impl Into<String>) -> Self {
        Self {
            thumbnail_route: Some(None),
            uploaded: Some(false),
            error_message: Some(Some(message.into())),
            status: Some(RecordStatus::Deferred),
        }
    }
}

static STATUS_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(&format!(r"^{}\s+(\d{{3}})$", regex::escape(FETCH_STATUS_PREFIX)))
        .expect("status pattern is valid")
});

/// Whether a status code is known to be permanent.
pub fn is_permanent_status(status: u16) -> bool {
    PERMANENT_FETCH_STATUSES.contains(&status) || (500..600).contains(&status)
}

/// Whether a stored error message describes a permanent failure.
pub fn is_permanent_failure(message: &str) -> bool {
    if message.starts_with(MISSING_INPUT) {
        return true;
    }
    STATUS_RE
        .captures(message.trim())
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u16>().ok())
        .is_some_and(is_permanent_status)
}
