//! Standardized API responses.
//!
//! Failures carry no detail: callers only ever see `{"success": false}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use base64::Engine;
use serde::{Deserialize, Serialize};

use worker::Produced;

/// Response of `POST /image`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ImageResponse {
    pub success: bool,
}

/// Response of `POST /image/thumbnail`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThumbnailResponse {
    pub success: bool,
    pub base64_image_data: String,
    pub format: String,
    pub content_type: String,
}

impl From<&Produced> for ThumbnailResponse {
    fn from(produced: &Produced) -> Self {
        let kind = produced.thumbnail.kind;
        Self {
            success: true,
            base64_image_data: base64::engine::general_purpose::STANDARD.encode(&produced.thumbnail.bytes),
            format: kind.as_str().to_string(),
            content_type: kind.content_type().to_string(),
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub queue_connected: bool,
    pub store_connected: bool,
    pub retry_queue_depth: u64,
    pub active_workers: u64,
    pub items_in_flight: u64,
}

/// Any failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiError;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (StatusCode::BAD_REQUEST, Json(ImageResponse { success: false })).into_response()
    }
}
