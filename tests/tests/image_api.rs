//! Tests for the `/image` endpoints.

use axum::http::StatusCode;
use axum_test::TestServer;
use base64::Engine;
use std::sync::Arc;

use ingest_core::RecordStatus;
use integration_tests::{fixtures, mocks::MockOrigin, mocks::UnavailableStore, setup};
use record_store::MemoryStore;

fn server(ctx: &setup::TestContext) -> TestServer {
    TestServer::new(ctx.router.clone()).expect("Failed to create test server")
}

#[tokio::test]
async fn test_image_updates_named_record() {
    let origin = MockOrigin::start().await;
    origin
        .serve("/ipfs/QmApi", fixtures::png_bytes(400, 400), "image/png")
        .await;

    let ctx = setup::TestContext::new(
        vec![fixtures::record(10, "ipfs://QmApi")],
        setup::admission_config(Some(&origin.uri())),
    );
    let server = server(&ctx);

    let response = server
        .post("/image")
        .json(&fixtures::image_request(Some(10), "ipfs://QmApi", None))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body, serde_json::json!({ "success": true }));

    let record = ctx.store.get(10).unwrap();
    assert!(record.uploaded);
    assert_eq!(record.status, RecordStatus::Completed);
    assert_eq!(ctx.storage.writes().len(), 1);
}

#[tokio::test]
async fn test_thumbnail_returns_encoded_image() {
    let ctx = setup::TestContext::new(vec![], setup::admission_config(None));
    let server = server(&ctx);

    let locator = fixtures::base64_data_uri("image/png", &fixtures::png_bytes(800, 400));
    let response = server
        .post("/image/thumbnail")
        .json(&fixtures::image_request(None, &locator, Some("png")))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["success"], true);
    assert_eq!(body["format"], "png");
    assert_eq!(body["contentType"], "image/png");

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(body["base64ImageData"].as_str().unwrap())
        .unwrap();
    let thumb = image::load_from_memory(&bytes).unwrap();
    assert_eq!((thumb.width(), thumb.height()), (200, 100));
}

#[tokio::test]
async fn test_svg_thumbnail_reports_png() {
    let ctx = setup::TestContext::new(vec![], setup::admission_config(None));
    let server = server(&ctx);

    let locator = fixtures::base64_data_uri("image/svg+xml", fixtures::svg_document().as_bytes());
    let response = server
        .post("/image/thumbnail")
        .json(&fixtures::image_request(None, &locator, None))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["format"], "png");
    assert_eq!(body["contentType"], "image/png");
}

#[tokio::test]
async fn test_failures_are_opaque_400s() {
    let origin = MockOrigin::start().await;
    origin.fail("/missing.png", 404).await;

    let ctx = setup::TestContext::new(vec![], setup::admission_config(None));
    let server = server(&ctx);
    let expected = serde_json::json!({ "success": false });

    // Origin failure
    let response = server
        .post("/image")
        .json(&fixtures::image_request(None, &origin.url("/missing.png"), None))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<serde_json::Value>(), expected);

    // Malformed body
    let response = server.post("/image").text("not json").await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<serde_json::Value>(), expected);

    // Missing required field
    let response = server
        .post("/image/thumbnail")
        .json(&serde_json::json!({ "imageUrl": "ipfs://Qm1", "tokenId": "1" }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<serde_json::Value>(), expected);

    // Empty locator
    let response = server
        .post("/image")
        .json(&fixtures::image_request(None, "", None))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<serde_json::Value>(), expected);
}

#[tokio::test]
async fn test_throttled_requests() {
    let origin = MockOrigin::start().await;
    origin.throttle("/busy.png", 30, 2).await;

    let ctx = setup::TestContext::new(
        vec![fixtures::record(11, origin.url("/busy.png"))],
        setup::admission_config(None),
    );
    let server = server(&ctx);

    // Plain variant: accepted into the retry queue, not a success yet
    let response = server
        .post("/image")
        .json(&fixtures::image_request(Some(11), &origin.url("/busy.png"), None))
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<serde_json::Value>(), serde_json::json!({ "success": false }));
    assert_eq!(ctx.store.get(11).unwrap().status, RecordStatus::Deferred);

    // Synchronous variant has nothing to return
    let response = server
        .post("/image/thumbnail")
        .json(&fixtures::image_request(None, &origin.url("/busy.png"), None))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);

    assert_eq!(ctx.pipeline.admission().retry_depth(), 2);
}

#[tokio::test]
async fn test_store_outage_is_a_400() {
    let store = Arc::new(MemoryStore::new());
    let ctx = setup::TestContext::with_store(store, Arc::new(UnavailableStore), setup::admission_config(None));
    let server = server(&ctx);

    let locator = fixtures::base64_data_uri("image/png", &fixtures::png_bytes(10, 10));
    let response = server
        .post("/image")
        .json(&fixtures::image_request(Some(1), &locator, None))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<serde_json::Value>(), serde_json::json!({ "success": false }));
}
