//! Image ingestion endpoints.
//!
//! Both endpoints run the request through the same pipeline the workers
//! use. When the body names an `nftId`, the outcome is written to that
//! record as well.

use axum::{body::Bytes, extract::State, Json};
use tracing::{debug, error, info, warn};
use validator::Validate;

use ingest_core::ImageRequest;
use worker::ItemOutcome;

use crate::response::{ApiError, ImageResponse, ThumbnailResponse};
use crate::state::AppState;

fn parse_request(body: &[u8]) -> Result<ImageRequest, ApiError> {
    let request: ImageRequest = serde_json::from_slice(body).map_err(|e| {
        debug!(error = %e, "Rejected malformed image request");
        ApiError
    })?;
    request.validate().map_err(|e| {
        debug!(error = %e, "Rejected invalid image request");
        ApiError
    })?;
    Ok(request)
}

async fn run(state: &AppState, request: &ImageRequest) -> Result<ItemOutcome, ApiError> {
    state
        .pipeline
        .ingest(request, state.credential.as_deref())
        .await
        .map_err(|e| {
            error!(nft_id = ?request.nft_id, error = %e, "Failed to record image request outcome");
            ApiError
        })
}

/// POST /image - Ingest one image, reporting only whether it succeeded.
///
/// A throttled fetch answers `{"success": false}` with 200: the item is in
/// the retry queue and will finish on its own.
pub async fn image_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ImageResponse>, ApiError> {
    let request = parse_request(&body)?;

    match run(&state, &request).await? {
        ItemOutcome::Completed(_) | ItemOutcome::Skipped => Ok(Json(ImageResponse { success: true })),
        ItemOutcome::Deferred { retry_after, .. } => {
            info!(nft_id = ?request.nft_id, retry_after_secs = retry_after.as_secs(), "Image request deferred");
            Ok(Json(ImageResponse { success: false }))
        }
        ItemOutcome::Failed { kind, .. } => {
            warn!(nft_id = ?request.nft_id, kind = kind.code(), "Image request failed");
            Err(ApiError)
        }
    }
}

/// POST /image/thumbnail - Ingest one image and return the thumbnail.
///
/// Deferred items have no bytes to return yet and answer 400.
pub async fn thumbnail_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ThumbnailResponse>, ApiError> {
    let request = parse_request(&body)?;

    match run(&state, &request).await? {
        ItemOutcome::Completed(produced) => Ok(Json(ThumbnailResponse::from(&produced))),
        other => {
            debug!(nft_id = ?request.nft_id, outcome = ?other, "No thumbnail to return");
            Err(ApiError)
        }
    }
}
