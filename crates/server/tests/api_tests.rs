//! HTTP API tests against an in-process router.

mod common;

use std::time::Duration;

use axum::http::StatusCode;
use serde_json::json;

use archivist_core::QcPoll;
use common::{fixtures, TestFixture};

#[tokio::test]
async fn test_health() {
    let fixture = TestFixture::new().await;
    let response = fixture.get("/api/v1/health").await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["status"], "ok");
}

#[tokio::test]
async fn test_config_is_sanitized() {
    let fixture = TestFixture::new().await;
    let response = fixture.get("/api/v1/config").await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["storage"]["root"], "/srv/archive");
    assert_eq!(response.body["auth"]["privileged_user_count"], 1);
    assert_eq!(response.body["qc"]["api_key_configured"], false);
    assert!(response.body["qc"].get("api_key").is_none());
}

#[tokio::test]
async fn test_rejected_batch_status_shows_history_and_artifact() {
    let fixture = TestFixture::new().await;
    fixture.storage.add_file("ingestion/B1/data.h5").await;
    fixture
        .qc
        .script("B1", vec![QcPoll::fail("reports/B1/qc.json", "checksum mismatch")])
        .await;
    fixture
        .runner
        .batches()
        .submit_batch(fixtures::submit_request("B1", "carol"))
        .await
        .unwrap();
    fixture.drain().await;

    let response = fixture.get("/api/v1/batches/B1").await;
    assert_status!(response, StatusCode::OK);
    let body = &response.body;
    assert_eq!(body["kind"], "batch");
    assert_eq!(body["state_type"], "rejected");
    assert_eq!(body["terminal"], true);
    assert_eq!(body["state"]["artifact_path"], "reports/B1/qc.json");
    assert_eq!(body["failure_reason"], "checksum mismatch");
    assert_eq!(body["history"].as_array().unwrap().len(), 3);
    assert_eq!(body["qc_jobs"][0]["result"], "fail");
}

#[tokio::test]
async fn test_list_batches_with_state_filter() {
    let fixture = TestFixture::new().await;
    fixture.storage.add_file("ingestion/B2/data.h5").await;
    for id in ["B2", "B3"] {
        fixture
            .runner
            .batches()
            .submit_batch(fixtures::submit_request(id, "carol"))
            .await
            .unwrap();
    }
    // B3 has no data and is rejected; B2 waits on QC.
    fixture.drain().await;

    let all = fixture.get("/api/v1/batches").await;
    assert_status!(all, StatusCode::OK);
    assert_eq!(all.body["total"], 2);

    let rejected = fixture.get("/api/v1/batches?state=rejected").await;
    assert_eq!(rejected.body["total"], 1);
    assert_eq!(rejected.body["batches"][0]["id"], "B3");

    let paged = fixture.get("/api/v1/batches?limit=1&offset=1").await;
    assert_eq!(paged.body["batches"].as_array().unwrap().len(), 1);
    assert_eq!(paged.body["total"], 2);
    assert_eq!(paged.body["limit"], 1);
}

#[tokio::test]
async fn test_unknown_entities_are_not_found() {
    let fixture = TestFixture::new().await;
    assert_status!(fixture.get("/api/v1/batches/nope").await, StatusCode::NOT_FOUND);
    assert_status!(fixture.get("/api/v1/orders/nope").await, StatusCode::NOT_FOUND);
    assert_status!(
        fixture.delete_as("/api/v1/batches/nope", "erin", None).await,
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn test_cancel_batch() {
    let fixture = TestFixture::new().await;
    fixture
        .runner
        .batches()
        .submit_batch(fixtures::submit_request("B4", "carol"))
        .await
        .unwrap();

    let response = fixture
        .delete_as(
            "/api/v1/batches/B4",
            "erin",
            Some(json!({ "reason": "duplicate upload" })),
        )
        .await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["state"]["type"], "cancelled");
    assert_eq!(response.body["state"]["cancelled_by"], "erin");
    assert_eq!(response.body["state"]["reason"], "duplicate upload");

    // Already terminal.
    let again = fixture.delete_as("/api/v1/batches/B4", "erin", None).await;
    assert_status!(again, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_delete_batch_data() {
    let fixture = TestFixture::new().await;
    fixture
        .runner
        .batches()
        .submit_batch(fixtures::submit_request("B8", "carol"))
        .await
        .unwrap();

    // Still staged.
    let early = fixture.delete_as("/api/v1/batches/B8/data", "erin", None).await;
    assert_status!(early, StatusCode::CONFLICT);

    // No ingestion data, so the batch is rejected.
    fixture.drain().await;
    fixture.storage.add_file("ingestion/B8/partial.nc").await;

    let response = fixture.delete_as("/api/v1/batches/B8/data", "erin", None).await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["state"]["type"], "rejected");
    assert!(response.body["cleaned_up_at"].is_string());
    assert!(!fixture.storage.has("ingestion/B8").await);

    assert_status!(
        fixture.delete_as("/api/v1/batches/nope/data", "erin", None).await,
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn test_order_ticket_and_confirmation() {
    let fixture = TestFixture::new().await;
    fixture.storage.add_file("production/B1/data.h5").await;
    fixture
        .runner
        .orders()
        .create_order(fixtures::order_request("O1", "dave", &["B1"]))
        .await
        .unwrap();

    // No ticket yet, nothing to confirm.
    assert_status!(
        fixture.post("/api/v1/orders/O1/confirm").await,
        StatusCode::CONFLICT
    );

    fixture.drain().await;
    let status = fixture.get("/api/v1/orders/O1").await;
    assert_status!(status, StatusCode::OK);
    assert_eq!(status.body["state_type"], "ticket_issued");
    assert_eq!(status.body["state"]["ticket"]["path"], "orders/O1");

    let confirmed = fixture.post("/api/v1/orders/O1/confirm").await;
    assert_status!(confirmed, StatusCode::OK);
    assert_eq!(confirmed.body["state"]["type"], "fulfilled");

    let listed = fixture.get("/api/v1/orders?state=fulfilled").await;
    assert_eq!(listed.body["total"], 1);
}

#[tokio::test]
async fn test_invalid_order_names_missing_item() {
    let fixture = TestFixture::new().await;
    fixture
        .runner
        .orders()
        .create_order(fixtures::order_request("O2", "dave", &["B-gone"]))
        .await
        .unwrap();
    fixture.drain().await;

    let status = fixture.get("/api/v1/orders/O2").await;
    assert_eq!(status.body["state_type"], "invalid");
    assert_eq!(status.body["state"]["missing_path"], "production/B-gone");
    assert!(status.body["failure_reason"]
        .as_str()
        .unwrap()
        .contains("production/B-gone"));
}

#[tokio::test]
async fn test_orchestrator_status_and_control() {
    let fixture = TestFixture::new().await;
    fixture
        .runner
        .batches()
        .submit_batch(fixtures::submit_request("B5", "carol"))
        .await
        .unwrap();

    let status = fixture.get("/api/v1/orchestrator/status").await;
    assert_status!(status, StatusCode::OK);
    assert_eq!(status.body["running"], false);
    assert_eq!(status.body["pending_tasks"], 1);
    assert_eq!(status.body["batches_by_state"]["staged"], 1);

    assert_status!(fixture.post("/api/v1/orchestrator/start").await, StatusCode::OK);
    assert_eq!(
        fixture.get("/api/v1/orchestrator/status").await.body["running"],
        true
    );

    assert_status!(fixture.post("/api/v1/orchestrator/stop").await, StatusCode::OK);
    assert_eq!(
        fixture.get("/api/v1/orchestrator/status").await.body["running"],
        false
    );
}

#[tokio::test]
async fn test_audit_trail_by_entity() {
    let fixture = TestFixture::new().await;
    fixture
        .runner
        .batches()
        .submit_batch(fixtures::submit_request("B6", "carol"))
        .await
        .unwrap();
    fixture.drain().await;

    // B6 has no data: submitted, then rejected.
    let mut total = 0;
    for _ in 0..40 {
        let response = fixture.get("/api/v1/audit?entity_id=B6").await;
        assert_status!(response, StatusCode::OK);
        total = response.body["total"].as_i64().unwrap_or(0);
        if total >= 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    assert!(total >= 2, "expected audit events for B6, got {}", total);

    let submitted = fixture
        .get("/api/v1/audit?entity_id=B6&event_type=batch_submitted")
        .await;
    assert_eq!(submitted.body["total"], 1);
    assert_eq!(submitted.body["events"][0]["user_id"], "carol");
    assert_eq!(submitted.body["events"][0]["entity_type"], "batch");

    let as_batch = fixture
        .get("/api/v1/audit?entity_type=batch&entity_id=B6")
        .await;
    assert!(as_batch.body["total"].as_i64().unwrap_or(0) >= total);
    let as_order = fixture
        .get("/api/v1/audit?entity_type=order&entity_id=B6")
        .await;
    assert_eq!(as_order.body["total"], 0);

    let bad = fixture.get("/api/v1/audit?entity_type=ticket").await;
    assert_status!(bad, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let fixture = TestFixture::new().await;
    fixture
        .runner
        .batches()
        .submit_batch(fixtures::submit_request("B7", "carol"))
        .await
        .unwrap();
    fixture.get("/api/v1/health").await;

    let (status, text) = fixture.get_text("/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(text.contains("archivist_batches_by_state"));
    assert!(text.contains("archivist_queue_depth"));
    assert!(text.contains("archivist_http_requests_total"));
}
