//! End-to-end tests for the ingestion pipeline.
//!
//! Records live in the in-memory store, media is served by wiremock, and
//! thumbnails are captured by a recording storage.

use std::time::Duration;
use tokio::time::Instant;

use ingest_core::{MediaKind, NftUpdate, RecordStatus};
use integration_tests::{fixtures, mocks::MockOrigin, setup};
use worker::{thumbnail_route, ItemOutcome};

/// Scenario A: an `ipfs://` record resolves to png bytes and completes.
#[tokio::test]
async fn test_ipfs_record_completes() {
    let origin = MockOrigin::start().await;
    origin
        .serve("/ipfs/Qm123", fixtures::png_bytes(640, 480), "image/png")
        .await;

    let mut record = fixtures::record(1, "ipfs://Qm123");
    record.apply(&NftUpdate::failure("fetch failed: timed out"));
    let ctx = setup::TestContext::new(vec![record], setup::admission_config(Some(&origin.uri())));

    let outcome = ctx.pipeline.process(1, None).await.unwrap();
    assert!(matches!(outcome, ItemOutcome::Completed(_)));

    let record = ctx.store.get(1).unwrap();
    assert!(record.uploaded);
    assert_eq!(record.error_message, None);
    assert_eq!(record.status, RecordStatus::Completed);

    let route = record.thumbnail_route.unwrap();
    assert_eq!(route, thumbnail_route(fixtures::CONTRACT, "1", MediaKind::Png));

    let stored = ctx.storage.get(&route).unwrap();
    let thumb = image::load_from_memory(&stored).unwrap();
    assert_eq!((thumb.width(), thumb.height()), (200, 150));
}

/// Scenario B: a 429 defers the item; the retry pass after the cooldown
/// completes it.
#[tokio::test]
async fn test_throttled_record_is_retried_after_cooldown() {
    let origin = MockOrigin::start().await;
    origin.throttle("/ipfs/QmSlow", 5, 1).await;
    origin
        .serve("/ipfs/QmSlow", fixtures::png_bytes(300, 300), "image/png")
        .await;

    let record = fixtures::record(2, "ipfs://QmSlow");
    let ctx = setup::TestContext::new(vec![record], setup::admission_config(Some(&origin.uri())));

    let before = Instant::now();
    let outcome = ctx.pipeline.process(2, None).await.unwrap();
    let ItemOutcome::Deferred { ready_at, retry_after, .. } = outcome else {
        panic!("expected deferral, got {outcome:?}");
    };
    assert_eq!(retry_after, Duration::from_secs(5));
    assert!(ready_at >= before + Duration::from_secs(5));

    let record = ctx.store.get(2).unwrap();
    assert!(!record.uploaded);
    assert_eq!(record.status, RecordStatus::Deferred);
    assert!(record.error_message.unwrap().starts_with("deferred retry"));

    let admission = ctx.pipeline.admission();
    let handler = ctx.retry_handler();

    // Not ready yet
    assert_eq!(admission.dispatch_ready(Instant::now(), handler.clone()), 0);
    assert_eq!(admission.retry_depth(), 1);

    // First pass at or after the cooldown
    assert_eq!(admission.dispatch_ready(ready_at, handler), 1);
    assert_eq!(admission.retry_depth(), 0);

    let record = ctx.wait_for_record(2, |r| r.uploaded).await;
    assert_eq!(record.error_message, None);
    assert_eq!(record.status, RecordStatus::Completed);
    assert_eq!(origin.request_count().await, 2);
}

/// Lets spawned tasks run without moving the paused clock.
async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

/// Scenario B driven by the background ticker: nothing is retried before the
/// cooldown, the first tick after it completes the record.
#[tokio::test]
async fn test_retry_ticker_resumes_throttled_record() {
    let origin = MockOrigin::start().await;
    origin.throttle("/ipfs/QmTick", 5, 1).await;
    origin
        .serve("/ipfs/QmTick", fixtures::png_bytes(300, 300), "image/png")
        .await;

    let ctx = setup::TestContext::new(
        vec![fixtures::record(12, "ipfs://QmTick")],
        setup::admission_config(Some(&origin.uri())),
    );
    let outcome = ctx.pipeline.process(12, None).await.unwrap();
    assert!(matches!(outcome, ItemOutcome::Deferred { .. }));

    tokio::time::pause();
    let admission = ctx.pipeline.admission();
    let ticker = admission.spawn_retry_ticker(Duration::from_secs(1), ctx.retry_handler());
    settle().await;

    tokio::time::advance(Duration::from_secs(4)).await;
    settle().await;
    assert_eq!(admission.retry_depth(), 1);
    assert_eq!(ctx.store.get(12).unwrap().status, RecordStatus::Deferred);

    tokio::time::advance(Duration::from_millis(1100)).await;
    settle().await;
    assert_eq!(admission.retry_depth(), 0);

    // The retried fetch goes over a real socket.
    tokio::time::resume();
    let record = ctx.wait_for_record(12, |r| r.uploaded).await;
    assert_eq!(record.status, RecordStatus::Completed);
    assert_eq!(record.error_message, None);
    assert_eq!(origin.request_count().await, 2);

    ticker.abort();
}

/// Scenario C: an inline svg above the cap fails as oversize with nothing stored.
#[tokio::test]
async fn test_oversize_inline_svg_is_rejected() {
    let svg = fixtures::padded_svg(6 * 1024 * 1024);
    let locator = fixtures::base64_data_uri("image/svg+xml", svg.as_bytes());
    let ctx = setup::TestContext::new(vec![fixtures::record(3, locator)], setup::admission_config(None));

    let outcome = ctx.pipeline.process(3, None).await.unwrap();
    assert!(matches!(
        outcome,
        ItemOutcome::Failed {
            kind: ingest_core::ErrorKind::Oversize,
            ..
        }
    ));

    let record = ctx.store.get(3).unwrap();
    assert!(!record.uploaded);
    assert_eq!(record.thumbnail_route, None);
    assert!(record.error_message.unwrap().starts_with("oversize payload"));
    assert!(ctx.storage.writes().is_empty());
}

#[tokio::test]
async fn test_rerun_of_completed_record_changes_nothing() {
    let origin = MockOrigin::start().await;
    origin
        .serve("/ipfs/QmDone", fixtures::png_bytes(64, 64), "image/png")
        .await;

    let ctx = setup::TestContext::new(
        vec![fixtures::record(4, "ipfs://QmDone")],
        setup::admission_config(Some(&origin.uri())),
    );

    ctx.pipeline.process(4, None).await.unwrap();
    let first = ctx.store.get(4).unwrap();
    let updates = ctx.store.update_count();

    let outcome = ctx.pipeline.process(4, None).await.unwrap();
    assert_eq!(outcome, ItemOutcome::Skipped);
    assert_eq!(ctx.store.get(4).unwrap(), first);
    assert_eq!(ctx.store.update_count(), updates);
    assert_eq!(origin.request_count().await, 1);
}

#[tokio::test]
async fn test_svg_becomes_png_thumbnail() {
    let locator = format!("data:image/svg+xml;utf8,{}", fixtures::svg_document());
    let ctx = setup::TestContext::new(vec![fixtures::record(5, locator)], setup::admission_config(None));

    let outcome = ctx.pipeline.process(5, None).await.unwrap();
    let ItemOutcome::Completed(produced) = outcome else {
        panic!("expected completion, got {outcome:?}");
    };
    assert_eq!(produced.thumbnail.kind, MediaKind::Png);
    assert!(produced.route.ends_with(".png"));

    let thumb = image::load_from_memory(&produced.thumbnail.bytes).unwrap();
    assert_eq!((thumb.width(), thumb.height()), (512, 512));
}

#[tokio::test]
async fn test_declared_format_wins_over_extension() {
    let origin = MockOrigin::start().await;
    origin
        .serve("/media/token.png", fixtures::jpeg_bytes(400, 400), "image/jpeg")
        .await;

    let record = fixtures::record(6, origin.url("/media/token.png")).with_declared_format("image/jpeg");
    let ctx = setup::TestContext::new(vec![record], setup::admission_config(None));

    let outcome = ctx.pipeline.process(6, None).await.unwrap();
    let ItemOutcome::Completed(produced) = outcome else {
        panic!("expected completion, got {outcome:?}");
    };
    assert_eq!(produced.thumbnail.kind, MediaKind::Jpeg);
    assert!(produced.route.ends_with(".jpg"));
}

#[tokio::test]
async fn test_permanent_fetch_failure_is_recorded() {
    let origin = MockOrigin::start().await;
    origin.fail("/gone.png", 410).await;

    let ctx = setup::TestContext::new(
        vec![fixtures::record(7, origin.url("/gone.png"))],
        setup::admission_config(None),
    );

    let outcome = ctx.pipeline.process(7, None).await.unwrap();
    assert!(!outcome.is_success());

    let record = ctx.store.get(7).unwrap();
    assert_eq!(
        record.error_message.as_deref(),
        Some("Request failed with status code 410")
    );
    assert!(!record.is_reprocessable());
    assert!(ctx.storage.writes().is_empty());
}

#[tokio::test]
async fn test_undecodable_payload_fails_without_crashing() {
    let origin = MockOrigin::start().await;
    origin
        .serve("/broken.png", b"\x89PNG\r\n\x1a\nnot really".to_vec(), "image/png")
        .await;

    let ctx = setup::TestContext::new(
        vec![
            fixtures::record(8, origin.url("/broken.png")),
            fixtures::record(9, fixtures::base64_data_uri("image/png", &fixtures::png_bytes(10, 10))),
        ],
        setup::admission_config(None),
    );

    let outcome = ctx.pipeline.process(8, None).await.unwrap();
    assert!(matches!(
        outcome,
        ItemOutcome::Failed {
            kind: ingest_core::ErrorKind::Transcode,
            ..
        }
    ));
    assert!(ctx
        .store
        .get(8)
        .unwrap()
        .error_message
        .unwrap()
        .starts_with("transcode failed"));

    // The same pipeline keeps serving items
    assert!(ctx.pipeline.process(9, None).await.unwrap().is_success());
}
