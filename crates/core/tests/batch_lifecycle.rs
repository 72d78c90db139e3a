//! Batch lifecycle integration tests.
//!
//! These drive batches through the real task runner over in-memory stores:
//! staged -> qc_submitted -> qc_passed|qc_failed -> promoted|rejected

use std::time::Duration;

use archivist_core::{
    testing::{fixtures, HarnessOptions, TestHarness},
    AutoApproveScope, BatchManifest, BatchState, BatchStore, LifecycleStore, OrchestratorConfig,
    OrchestratorError, QcError, QcJobResult, QcPoll, StorageError, StorageGateway,
    SubmitBatchRequest, TaskQueue,
};
use chrono::Utc;
use archivist_core::lifecycle::TransitionRecord;

fn rank(state: &str) -> usize {
    match state {
        "staged" => 0,
        "qc_submitted" => 1,
        "qc_passed" | "qc_failed" => 2,
        "promoted" | "rejected" => 3,
        other => panic!("state {} is off the documented path", other),
    }
}

/// Recorded states must appear in documented order, without repeats.
fn assert_documented_path(history: &[TransitionRecord]) {
    let mut states = vec![history[0].from_state.as_str()];
    states.extend(history.iter().map(|t| t.to_state.as_str()));
    for pair in states.windows(2) {
        assert!(
            rank(pair[0]) < rank(pair[1]),
            "{} -> {} breaks the documented order",
            pair[0],
            pair[1]
        );
    }
}

fn harness_with(auth_users: &str, scope: AutoApproveScope) -> TestHarness {
    TestHarness::with_options(HarnessOptions {
        auth: fixtures::auto_approve(auth_users, scope),
        ..Default::default()
    })
    .unwrap()
}

#[tokio::test]
async fn test_failed_qc_rejects_batch_and_keeps_artifact() {
    let h = TestHarness::new().unwrap();
    h.storage.add_file("ingestion/B1/data.h5").await;
    h.qc.script(
        "B1",
        vec![
            QcPoll::pending(),
            QcPoll::fail("reports/B1/qc.json", "checksum mismatch"),
        ],
    )
    .await;

    h.batches()
        .submit_batch(fixtures::submit_request("B1", "carol"))
        .await
        .unwrap();
    h.drain(50).await;

    let batch = h.batch_store.load("B1").unwrap();
    match &batch.state {
        BatchState::Rejected {
            artifact_path,
            reason,
            ..
        } => {
            assert_eq!(artifact_path.as_deref(), Some("reports/B1/qc.json"));
            assert_eq!(reason, "checksum mismatch");
        }
        other => panic!("expected rejected, got {:?}", other),
    }
    assert!(batch.terminal_at.is_some());
    assert!(batch.production_path.is_none());

    let history = h.batch_store.history("B1").unwrap();
    let path: Vec<_> = history.iter().map(|t| t.to_state.as_str()).collect();
    assert_eq!(path, vec!["qc_submitted", "qc_failed", "rejected"]);
    assert_documented_path(&history);

    let jobs = h.batch_store.list_qc_jobs("B1").unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].result, QcJobResult::Fail);
    assert_eq!(h.qc.submissions().await.len(), 1);
}

#[tokio::test]
async fn test_privileged_batch_promoted_without_qc() {
    let h = harness_with("alice,bob,", AutoApproveScope::Batch);
    h.storage.add_file("ingestion/B2/data.h5").await;

    let batch = h
        .batches()
        .submit_batch(fixtures::submit_request("B2", "alice"))
        .await
        .unwrap();
    assert!(batch.submitter_privileged);
    h.drain(20).await;

    let batch = h.batch_store.load("B2").unwrap();
    assert!(matches!(batch.state, BatchState::Promoted { .. }));
    assert_eq!(batch.production_path.as_deref(), Some("production/B2"));
    assert!(h.storage.has("production/B2/data.h5").await);
    assert!(!h.storage.has("ingestion/B2").await);

    // Auto-approval still checks the data is there.
    assert!(h
        .storage
        .calls_to("exists")
        .await
        .contains(&"ingestion/B2".to_string()));

    assert!(h.qc.submissions().await.is_empty());
    assert!(h.qc.polls().await.is_empty());
    assert!(h.batch_store.list_qc_jobs("B2").unwrap().is_empty());

    let history = h.batch_store.history("B2").unwrap();
    let path: Vec<_> = history.iter().map(|t| t.to_state.as_str()).collect();
    assert_eq!(path, vec!["qc_passed", "promoted"]);
    assert_documented_path(&history);
}

#[tokio::test]
async fn test_privileged_batch_with_missing_data_is_rejected() {
    let h = harness_with("alice", AutoApproveScope::Submission);

    h.batches()
        .submit_batch(fixtures::submit_request("B3", "alice"))
        .await
        .unwrap();
    h.drain(20).await;

    let batch = h.batch_store.load("B3").unwrap();
    match &batch.state {
        BatchState::Rejected { reason, .. } => assert!(reason.contains("ingestion/B3")),
        other => panic!("expected rejected, got {:?}", other),
    }
    assert!(h.qc.submissions().await.is_empty());
}

#[tokio::test]
async fn test_privileged_user_without_auto_approve_runs_qc() {
    let h = TestHarness::with_options(HarnessOptions {
        auth: archivist_core::AuthConfig {
            privileged_users: "alice".to_string(),
            ..Default::default()
        },
        ..Default::default()
    })
    .unwrap();
    h.storage.add_file("ingestion/B4/data.h5").await;
    h.qc.script("B4", vec![QcPoll::pass("reports/B4.json")]).await;

    h.batches()
        .submit_batch(fixtures::submit_request("B4", "alice"))
        .await
        .unwrap();
    h.drain(20).await;

    let batch = h.batch_store.load("B4").unwrap();
    assert!(matches!(batch.state, BatchState::Promoted { .. }));
    assert_eq!(h.qc.submissions().await.len(), 1);

    let history = h.batch_store.history("B4").unwrap();
    let path: Vec<_> = history.iter().map(|t| t.to_state.as_str()).collect();
    assert_eq!(path, vec!["qc_submitted", "qc_passed", "promoted"]);
    assert_documented_path(&history);
}

#[tokio::test]
async fn test_duplicate_submit_delivery_submits_once() {
    let h = TestHarness::new().unwrap();
    h.storage.add_file("ingestion/B5/data.h5").await;

    h.batches()
        .submit_batch(fixtures::submit_request("B5", "carol"))
        .await
        .unwrap();

    // Two workers handle the same task at once, then a late redelivery.
    let (_a, _b) = tokio::join!(
        h.batches().handle_submit_qc("B5"),
        h.batches().handle_submit_qc("B5")
    );
    let _ = h.batches().handle_submit_qc("B5").await;
    h.drain(5).await;

    assert_eq!(h.qc.submissions().await.len(), 1);
    let batch = h.batch_store.load("B5").unwrap();
    assert!(matches!(batch.state, BatchState::QcSubmitted { .. }));
    let pending: Vec<_> = h
        .batch_store
        .list_qc_jobs("B5")
        .unwrap()
        .into_iter()
        .filter(|j| j.result == QcJobResult::Pending)
        .collect();
    assert_eq!(pending.len(), 1);
}

#[tokio::test]
async fn test_submit_retries_exhausted_marks_submission_failed() {
    let h = TestHarness::new().unwrap();
    h.storage.add_file("ingestion/B6/data.h5").await;
    h.qc.fail_submissions(QcError::Retryable("backend down".to_string()))
        .await;

    h.batches()
        .submit_batch(fixtures::submit_request("B6", "carol"))
        .await
        .unwrap();
    h.drain(20).await;

    let batch = h.batch_store.load("B6").unwrap();
    match &batch.state {
        BatchState::SubmissionFailed { error, attempts, .. } => {
            assert_eq!(*attempts, 3);
            assert!(error.contains("backend down"));
        }
        other => panic!("expected submission_failed, got {:?}", other),
    }

    // Each attempt released its claim.
    let jobs = h.batch_store.list_qc_jobs("B6").unwrap();
    assert_eq!(jobs.len(), 3);
    assert!(jobs.iter().all(|j| j.result == QcJobResult::Abandoned));
    assert_eq!(h.queue.pending_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_backend_refusal_rejects_batch() {
    let h = TestHarness::new().unwrap();
    h.storage.add_file("ingestion/B7/data.h5").await;
    h.qc.fail_submissions(QcError::Rejected("HTTP 422: unknown image".to_string()))
        .await;

    h.batches()
        .submit_batch(fixtures::submit_request("B7", "carol"))
        .await
        .unwrap();
    h.drain(10).await;

    let batch = h.batch_store.load("B7").unwrap();
    match &batch.state {
        BatchState::Rejected { reason, .. } => assert!(reason.contains("unknown image")),
        other => panic!("expected rejected, got {:?}", other),
    }
}

#[tokio::test]
async fn test_qc_timeout_fails_batch() {
    let h = TestHarness::with_options(HarnessOptions {
        orchestrator: OrchestratorConfig {
            qc_timeout_secs: 0,
            ..fixtures::fast_config()
        },
        ..Default::default()
    })
    .unwrap();
    h.storage.add_file("ingestion/B8/data.h5").await;

    h.batches()
        .submit_batch(fixtures::submit_request("B8", "carol"))
        .await
        .unwrap();
    h.drain(10).await;

    let batch = h.batch_store.load("B8").unwrap();
    match &batch.state {
        BatchState::Rejected { reason, .. } => assert!(reason.contains("timed out")),
        other => panic!("expected rejected, got {:?}", other),
    }
    let jobs = h.batch_store.list_qc_jobs("B8").unwrap();
    assert_eq!(jobs[0].result, QcJobResult::TimedOut);
    assert!(h.qc.polls().await.is_empty());
}

#[tokio::test]
async fn test_poll_rate_limit_reschedules() {
    let h = TestHarness::with_options(HarnessOptions {
        orchestrator: OrchestratorConfig {
            qc_max_polls_per_minute: 1,
            ..fixtures::fast_config()
        },
        ..Default::default()
    })
    .unwrap();
    for id in ["B9a", "B9b"] {
        h.storage.add_file(&format!("ingestion/{}/data.h5", id)).await;
        h.batches()
            .submit_batch(fixtures::submit_request(id, "carol"))
            .await
            .unwrap();
    }
    h.drain(20).await;

    assert_eq!(h.qc.polls().await.len(), 1);
    for id in ["B9a", "B9b"] {
        let batch = h.batch_store.load(id).unwrap();
        assert!(matches!(batch.state, BatchState::QcSubmitted { .. }));
    }
    // Throttled polls are waiting, not failed.
    assert_eq!(h.queue.pending_count().await.unwrap(), 2);
}

#[tokio::test]
async fn test_promotion_failure_retries_only_promotion() {
    let h = harness_with("alice", AutoApproveScope::Batch);
    h.storage.add_file("ingestion/B10/data.h5").await;

    h.batches()
        .submit_batch(fixtures::submit_request("B10", "alice"))
        .await
        .unwrap();
    assert!(h.runner.process_one().await.unwrap());
    assert!(matches!(
        h.batch_store.load("B10").unwrap().state,
        BatchState::QcPassed { .. }
    ));

    h.storage
        .fail_next(StorageError::Unavailable("connection reset".to_string()))
        .await;
    h.drain(10).await;

    let batch = h.batch_store.load("B10").unwrap();
    assert!(matches!(batch.state, BatchState::Promoted { .. }));
    let history = h.batch_store.history("B10").unwrap();
    assert_eq!(history.len(), 2);
    assert_documented_path(&history);
}

#[tokio::test]
async fn test_poll_outage_is_retried() {
    let h = TestHarness::new().unwrap();
    h.storage.add_file("ingestion/B12/data.h5").await;
    h.qc.fail_polls(QcError::Retryable("backend restarting".to_string()))
        .await;

    h.batches()
        .submit_batch(fixtures::submit_request("B12", "carol"))
        .await
        .unwrap();
    // Submit, then one failed poll.
    h.drain(2).await;
    assert_eq!(h.qc.polls().await.len(), 1);
    assert!(matches!(
        h.batch_store.load("B12").unwrap().state,
        BatchState::QcSubmitted { .. }
    ));

    h.qc.clear_failures().await;
    h.qc.script("B12", vec![QcPoll::pass("reports/B12/qc.json")])
        .await;
    h.drain(10).await;

    let batch = h.batch_store.load("B12").unwrap();
    assert!(matches!(batch.state, BatchState::Promoted { .. }));
    assert_eq!(h.qc.submissions().await.len(), 1);
    assert_documented_path(&h.batch_store.history("B12").unwrap());
}

#[tokio::test]
async fn test_separate_poll_outages_each_get_full_retry_budget() {
    let h = TestHarness::new().unwrap();
    h.storage.add_file("ingestion/B13/data.h5").await;
    h.qc.script("B13", vec![QcPoll::pending()]).await;

    h.batches()
        .submit_batch(fixtures::submit_request("B13", "carol"))
        .await
        .unwrap();
    assert!(h.runner.process_one().await.unwrap());

    // More outages in total than max_attempts, each followed by a good poll.
    for _ in 0..5 {
        h.qc.fail_polls(QcError::Retryable("blip".to_string())).await;
        assert!(h.runner.process_one().await.unwrap());
        h.qc.clear_failures().await;
        assert!(h.runner.process_one().await.unwrap());
        assert!(matches!(
            h.batch_store.load("B13").unwrap().state,
            BatchState::QcSubmitted { .. }
        ));
    }

    h.qc.script("B13", vec![QcPoll::pass("reports/B13/qc.json")])
        .await;
    h.drain(10).await;
    assert!(matches!(
        h.batch_store.load("B13").unwrap().state,
        BatchState::Promoted { .. }
    ));
    assert_eq!(h.qc.polls().await.len(), 11);
}

#[tokio::test]
async fn test_promotion_with_vanished_data_fails() {
    let h = harness_with("alice", AutoApproveScope::Batch);
    h.storage.add_file("ingestion/B14/data.h5").await;

    h.batches()
        .submit_batch(fixtures::submit_request("B14", "alice"))
        .await
        .unwrap();
    assert!(h.runner.process_one().await.unwrap());
    assert!(matches!(
        h.batch_store.load("B14").unwrap().state,
        BatchState::QcPassed { .. }
    ));

    h.storage.remove_collection("ingestion/B14").await.unwrap();
    h.drain(10).await;

    match h.batch_store.load("B14").unwrap().state {
        BatchState::Failed { error, .. } => assert!(error.contains("ingestion/B14")),
        other => panic!("expected failed, got {:?}", other),
    }
    assert!(!h.storage.has("production/B14").await);
}

#[tokio::test]
async fn test_replayed_promotion_after_move_succeeds() {
    let h = harness_with("alice", AutoApproveScope::Batch);
    h.storage.add_file("ingestion/B15/data.h5").await;

    h.batches()
        .submit_batch(fixtures::submit_request("B15", "alice"))
        .await
        .unwrap();
    assert!(h.runner.process_one().await.unwrap());

    // A worker moved the data and crashed before recording it.
    h.storage
        .move_entries("ingestion/B15", "production/B15")
        .await
        .unwrap();
    h.drain(10).await;

    let batch = h.batch_store.load("B15").unwrap();
    assert!(matches!(batch.state, BatchState::Promoted { .. }));
    assert!(h.storage.has("production/B15/data.h5").await);
}

fn with_manifest(batch_id: &str, submitted_by: &str, files: &[(&str, &str)]) -> SubmitBatchRequest {
    SubmitBatchRequest {
        manifest: Some(BatchManifest {
            files: files
                .iter()
                .map(|(path, contents)| fixtures::manifest_entry(path, contents.as_bytes()))
                .collect(),
        }),
        ..fixtures::submit_request(batch_id, submitted_by)
    }
}

/// Drive a batch to `Rejected` through a missing ingestion collection.
async fn rejected_batch(h: &TestHarness, batch_id: &str) {
    h.batches()
        .submit_batch(fixtures::submit_request(batch_id, "carol"))
        .await
        .unwrap();
    h.drain(5).await;
    assert!(matches!(
        h.batch_store.load(batch_id).unwrap().state,
        BatchState::Rejected { .. }
    ));
}

#[tokio::test]
async fn test_verified_manifest_goes_through_qc() {
    let h = TestHarness::new().unwrap();
    h.storage.add_file_with("ingestion/B16/data.nc", b"salinity").await;
    h.storage.add_file_with("ingestion/B16/meta/info.json", b"{}").await;
    h.qc.script("B16", vec![QcPoll::pass("reports/B16.json")]).await;

    h.batches()
        .submit_batch(with_manifest(
            "B16",
            "carol",
            &[("data.nc", "salinity"), ("meta/info.json", "{}")],
        ))
        .await
        .unwrap();
    h.drain(20).await;

    let batch = h.batch_store.load("B16").unwrap();
    assert!(matches!(batch.state, BatchState::Promoted { .. }));
    assert_eq!(batch.manifest.unwrap().files.len(), 2);
    assert_eq!(h.storage.calls_to("list_files").await, vec!["ingestion/B16"]);
    assert!(h.storage.has("production/B16/meta/info.json").await);
}

#[tokio::test]
async fn test_checksum_mismatch_rejects_before_qc() {
    let h = TestHarness::new().unwrap();
    h.storage.add_file_with("ingestion/B17/data.nc", b"truncated").await;

    h.batches()
        .submit_batch(with_manifest("B17", "carol", &[("data.nc", "truncatedX")]))
        .await
        .unwrap();
    h.drain(10).await;

    match h.batch_store.load("B17").unwrap().state {
        BatchState::Rejected { reason, .. } => {
            assert!(
                reason.starts_with("integrity check failed: size mismatch for data.nc"),
                "{}",
                reason
            )
        }
        other => panic!("expected rejected, got {:?}", other),
    }
    assert!(h.qc.submissions().await.is_empty());
    assert!(h.batch_store.list_qc_jobs("B17").unwrap().is_empty());
    // The data stays for inspection until cleanup.
    assert!(h.storage.has("ingestion/B17/data.nc").await);
}

#[tokio::test]
async fn test_auto_approval_still_verifies_manifest() {
    let h = harness_with("alice", AutoApproveScope::Batch);
    h.storage.add_file_with("ingestion/B18/data.nc", b"depth").await;
    h.storage.add_file("ingestion/B18/stray.tmp").await;

    h.batches()
        .submit_batch(with_manifest("B18", "alice", &[("data.nc", "depth")]))
        .await
        .unwrap();
    h.drain(10).await;

    match h.batch_store.load("B18").unwrap().state {
        BatchState::Rejected { reason, .. } => {
            assert_eq!(reason, "integrity check failed: file count mismatch: expected 1, found 2")
        }
        other => panic!("expected rejected, got {:?}", other),
    }
    assert!(!h.storage.has("production/B18").await);
}

#[tokio::test]
async fn test_malformed_manifest_refused() {
    let h = TestHarness::new().unwrap();
    let mut request = with_manifest("B19", "carol", &[("data.nc", "x")]);
    if let Some(ref mut manifest) = request.manifest {
        manifest.files[0].sha256 = "not-a-digest".to_string();
    }

    let err = h.batches().submit_batch(request).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::InvalidRequest(_)));
    assert!(h.batch_store.get("B19").unwrap().is_none());
    assert_eq!(h.queue.pending_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_delete_batch_data() {
    let h = TestHarness::new().unwrap();
    h.storage.add_file_with("ingestion/B20/data.nc", b"good").await;
    h.batches()
        .submit_batch(with_manifest("B20", "carol", &[("data.nc", "bad!")]))
        .await
        .unwrap();
    h.drain(10).await;
    assert!(matches!(
        h.batch_store.load("B20").unwrap().state,
        BatchState::Rejected { .. }
    ));

    let cleaned = h.batches().delete_batch_data("B20", "operator").await.unwrap();
    let stamped = cleaned.cleaned_up_at.expect("cleanup should be stamped");
    assert!(!h.storage.has("ingestion/B20").await);
    // The record and its outcome stay.
    assert!(matches!(cleaned.state, BatchState::Rejected { .. }));

    let again = h.batches().delete_batch_data("B20", "operator").await.unwrap();
    assert_eq!(again.cleaned_up_at, Some(stamped));
    assert_eq!(h.storage.calls_to("remove_collection").await.len(), 1);

    let err = h.batches().delete_batch_data("B0", "operator").await.unwrap_err();
    assert!(err.to_string().contains("B0"));
}

#[tokio::test]
async fn test_delete_refused_for_live_and_promoted_batches() {
    let h = harness_with("alice", AutoApproveScope::Batch);
    h.storage.add_file("ingestion/B21/data.h5").await;

    h.batches()
        .submit_batch(fixtures::submit_request("B21", "alice"))
        .await
        .unwrap();
    let err = h.batches().delete_batch_data("B21", "operator").await.unwrap_err();
    assert!(matches!(err, OrchestratorError::InvalidState { .. }));

    h.drain(10).await;
    assert!(matches!(
        h.batch_store.load("B21").unwrap().state,
        BatchState::Promoted { .. }
    ));
    let err = h.batches().delete_batch_data("B21", "operator").await.unwrap_err();
    assert!(err.to_string().contains("promoted"));
    assert!(h.storage.has("production/B21/data.h5").await);
    assert!(h.storage.calls_to("remove_collection").await.is_empty());
}

#[tokio::test]
async fn test_cleanup_sweep_waits_for_retention() {
    let h = TestHarness::new().unwrap();
    rejected_batch(&h, "B23").await;
    // Data arrived after the rejection.
    h.storage.add_file("ingestion/B23/late.nc").await;

    assert_eq!(h.batches().cleanup_sweep(Utc::now()).await.unwrap(), 0);
    assert!(h.storage.has("ingestion/B23/late.nc").await);

    let after_retention = Utc::now() + chrono::Duration::days(8);
    h.storage
        .fail_next(StorageError::Unavailable("store offline".to_string()))
        .await;
    assert_eq!(h.batches().cleanup_sweep(after_retention).await.unwrap(), 0);
    assert!(h.batch_store.load("B23").unwrap().cleaned_up_at.is_none());

    assert_eq!(h.batches().cleanup_sweep(after_retention).await.unwrap(), 1);
    assert!(!h.storage.has("ingestion/B23").await);
    assert!(h.batch_store.load("B23").unwrap().cleaned_up_at.is_some());

    // Already cleaned batches are not visited again.
    assert_eq!(h.batches().cleanup_sweep(after_retention).await.unwrap(), 0);
    assert_eq!(h.storage.calls_to("remove_collection").await.len(), 2);
}

#[tokio::test]
async fn test_cancel_stops_polling() {
    let h = TestHarness::new().unwrap();
    h.storage.add_file("ingestion/B11/data.h5").await;

    h.batches()
        .submit_batch(fixtures::submit_request("B11", "carol"))
        .await
        .unwrap();
    h.drain(4).await;
    assert!(matches!(
        h.batch_store.load("B11").unwrap().state,
        BatchState::QcSubmitted { .. }
    ));

    let cancelled = h
        .batches()
        .cancel_batch("B11", "operator", Some("wrong instrument".to_string()))
        .await
        .unwrap();
    match &cancelled.state {
        BatchState::Cancelled {
            cancelled_by,
            reason,
            ..
        } => {
            assert_eq!(cancelled_by, "operator");
            assert_eq!(reason.as_deref(), Some("wrong instrument"));
        }
        other => panic!("expected cancelled, got {:?}", other),
    }

    let polls_before = h.qc.polls().await.len();
    h.drain(10).await;
    assert_eq!(h.qc.polls().await.len(), polls_before);
    assert_eq!(h.queue.pending_count().await.unwrap(), 0);

    let jobs = h.batch_store.list_qc_jobs("B11").unwrap();
    assert!(jobs.iter().all(|j| j.result != QcJobResult::Pending));

    // Terminal batches cannot be cancelled again.
    assert!(h.batches().cancel_batch("B11", "operator", None).await.is_err());
}

#[tokio::test]
async fn test_invalid_batch_id_refused() {
    let h = TestHarness::new().unwrap();
    let err = h
        .batches()
        .submit_batch(fixtures::submit_request("../etc", "carol"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("invalid batch id"));
    assert_eq!(h.queue.pending_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_runner_loops_drive_batch_to_promotion() {
    let h = TestHarness::new().unwrap();
    h.storage.add_file("ingestion/B12/data.h5").await;
    h.qc.script("B12", vec![QcPoll::pending(), QcPoll::pass("reports/B12.json")])
        .await;

    h.runner.start().await;
    h.batches()
        .submit_batch(fixtures::submit_request("B12", "carol"))
        .await
        .unwrap();

    let promoted = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let batch = h.batch_store.load("B12").unwrap();
            if matches!(batch.state, BatchState::Promoted { .. }) {
                break batch;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("batch was not promoted in time");
    h.runner.stop().await;

    assert_eq!(
        promoted.state.artifact_path(),
        None,
        "promoted state carries no artifact"
    );
    let status = h.runner.status().await;
    assert!(!status.running);
    assert_eq!(status.batches_by_state.get("promoted"), Some(&1));
}
