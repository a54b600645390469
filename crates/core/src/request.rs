//! Request types for the `/image` ingestion endpoints.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::record::NftRecord;

/// Body of `POST /image` and `POST /image/thumbnail`.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ImageRequest {
    /// Record to update with the outcome; omitted for ad-hoc thumbnails
    pub nft_id: Option<i64>,
    #[validate(length(min = 1, max = 8388608))]
    pub image_url: String,
    #[validate(length(min = 1, max = 128))]
    pub contract_address: String,
    #[validate(length(min = 1, max = 128))]
    pub token_id: String,
    #[validate(length(max = 64))]
    pub format: Option<String>,
}

impl ImageRequest {
    /// Builds the request the pipeline would issue for a stored record.
    pub fn from_record(record: &NftRecord, locator: String) -> Self {
        Self {
            nft_id: Some(record.id),
            image_url: locator,
            contract_address: record.contract_address.clone(),
            token_id: record.token_id.clone(),
            format: record.declared_format.clone(),
        }
    }

    /// Locator with NUL characters stripped, or `None` if nothing remains.
    pub fn media_locator(&self) -> Option<String> {
        let cleaned: String = self.image_url.chars().filter(|c| *c != '\0').collect();
        let cleaned = cleaned.trim();
        (!cleaned.is_empty()).then(|| cleaned.to_string())
    }
}
