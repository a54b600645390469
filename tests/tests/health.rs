//! Tests for health check endpoints.

use axum::http::StatusCode;
use axum_test::TestServer;
use integration_tests::setup::{self, TestContext};
use telemetry::health;

#[tokio::test]
async fn test_health_endpoint_structure() {
    let ctx = TestContext::new(vec![], setup::admission_config(None));
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");

    let response = server.get("/health").await;
    response.assert_status_ok();

    let body: serde_json::Value = response.json();
    for field in [
        "status",
        "queue_connected",
        "store_connected",
        "retry_queue_depth",
        "active_workers",
        "items_in_flight",
    ] {
        assert!(body.get(field).is_some(), "Response should have '{field}' field");
    }

    let status = body["status"].as_str().unwrap_or("");
    assert!(
        matches!(status, "healthy" | "degraded" | "unhealthy"),
        "unexpected status '{status}'"
    );
    assert_eq!(body["retry_queue_depth"], 0);
}

#[tokio::test]
async fn test_liveness_and_readiness() {
    let ctx = TestContext::new(vec![], setup::admission_config(None));
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");

    server.get("/health/live").await.assert_status_ok();

    health().queue.set_healthy();
    health().store.set_healthy();
    server.get("/health/ready").await.assert_status_ok();

    health().store.set_unhealthy("connection refused");
    server
        .get("/health/ready")
        .await
        .assert_status(StatusCode::SERVICE_UNAVAILABLE);
    health().store.set_healthy();
}
