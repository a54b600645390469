//! Distributor runs over a bounded id range against an in-process queue.

use std::collections::HashSet;
use std::sync::Arc;

use ingest_core::RecordStatus;
use integration_tests::{fixtures, mocks::MockOrigin, setup};
use work_queue::MemoryQueue;
use worker::{Distributor, PipelineConfig};

fn bounded(start: i64, end: i64, credentials: &[&str]) -> PipelineConfig {
    PipelineConfig {
        worker_count: 2,
        start_cursor: start,
        end_cursor: Some(end),
        credentials: credentials.iter().map(|c| c.to_string()).collect(),
        queue_prefix: "slot-".to_string(),
        respawn_delay_ms: 10,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_bounded_run_completes_every_record() {
    let origin = MockOrigin::start().await;
    for id in 1..=6 {
        origin
            .serve(&format!("/ipfs/Qm{id}"), fixtures::png_bytes(300, 300), "image/png")
            .await;
    }

    let mut admission = setup::admission_config(Some(&origin.uri()));
    admission.gateway_auth_header = Some("x-api-key".to_string());
    let records = (1..=6)
        .map(|id| fixtures::record(id, format!("ipfs://Qm{id}")))
        .collect();
    let ctx = setup::TestContext::new(records, admission);

    let queue = Arc::new(MemoryQueue::new());
    let distributor = Distributor::new(
        bounded(1, 6, &["key-a", "key-b"]),
        queue.clone(),
        ctx.pipeline.clone(),
    )
    .unwrap();
    let summary = distributor.run().await.unwrap();

    assert_eq!(summary.dispatched, 6);
    assert_eq!(summary.crashes, 0);
    assert_eq!(summary.next_cursor, 7);

    for id in 1..=6 {
        let record = ctx.store.get(id).unwrap();
        assert_eq!(record.status, RecordStatus::Completed, "record {id}");
        assert!(record.uploaded);
    }
    assert_eq!(ctx.storage.writes().len(), 6);

    // Each id went to exactly one slot, in cursor order overall.
    let slot_a: HashSet<i64> = queue.published_to("slot-0").into_iter().collect();
    let slot_b: HashSet<i64> = queue.published_to("slot-1").into_iter().collect();
    assert!(slot_a.is_disjoint(&slot_b));
    assert_eq!(slot_a.len() + slot_b.len(), 6);
    let order: Vec<i64> = queue.published().into_iter().map(|(_, id)| id).collect();
    assert_eq!(order, vec![1, 2, 3, 4, 5, 6]);

    // The gateway saw the credential of whichever slot fetched the id.
    let requests = origin.server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 6);
    for request in &requests {
        let id: i64 = request.url.path().trim_start_matches("/ipfs/Qm").parse().unwrap();
        let key = request
            .headers
            .get("x-api-key")
            .and_then(|v| v.to_str().ok())
            .unwrap();
        let expected = if slot_a.contains(&id) { "key-a" } else { "key-b" };
        assert_eq!(key, expected, "credential for id {id}");
    }
}

#[tokio::test]
async fn test_failures_do_not_stall_distribution() {
    let origin = MockOrigin::start().await;
    origin
        .serve("/ipfs/QmGood", fixtures::png_bytes(64, 64), "image/png")
        .await;
    origin.fail("/ipfs/QmGone", 404).await;

    // Id 3 has no record at all.
    let mut records = vec![
        fixtures::record(1, "ipfs://QmGood"),
        fixtures::record(2, "ipfs://QmGone"),
        fixtures::record(4, "ipfs://QmGood"),
    ];
    let mut empty = fixtures::record(5, "");
    empty.raw_media_uri = None;
    records.push(empty);

    let ctx = setup::TestContext::new(records, setup::admission_config(Some(&origin.uri())));
    let queue = Arc::new(MemoryQueue::new());
    let summary = Distributor::new(bounded(1, 5, &[]), queue, ctx.pipeline.clone())
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(summary.dispatched, 5);
    assert_eq!(ctx.store.get(1).unwrap().status, RecordStatus::Completed);
    assert_eq!(ctx.store.get(4).unwrap().status, RecordStatus::Completed);

    let gone = ctx.store.get(2).unwrap();
    assert_eq!(gone.status, RecordStatus::Failed);
    assert!(gone.error_message.unwrap().contains("404"));

    assert!(ctx.store.get(3).is_none());
    assert_eq!(ctx.store.get(5).unwrap().status, RecordStatus::Failed);
}
