//! Order lifecycle integration tests.
//!
//! requested -> staged -> ticket_issued -> fulfilled|expired, with the
//! cleanup sweep removing staging collections afterwards.

use chrono::{Duration, Utc};

use archivist_core::{
    testing::{fixtures, TestHarness},
    LifecycleStore, OrderState, StorageError, TaskQueue,
};

async fn harness_with_production(items: &[&str]) -> TestHarness {
    let h = TestHarness::new().unwrap();
    for item in items {
        h.storage.add_file(&format!("production/{}", item)).await;
    }
    h
}

#[tokio::test]
async fn test_order_staged_and_ticket_issued() {
    let h = harness_with_production(&["B1/a.h5", "B2/b.h5"]).await;

    let order = h
        .orders()
        .create_order(fixtures::order_request("O1", "dave", &["B1", "B2/b.h5"]))
        .await
        .unwrap();
    assert_eq!(order.staging_path, "orders/O1");
    assert_eq!(order.state, OrderState::Requested);
    h.drain(10).await;

    let order = h.order_store.load("O1").unwrap();
    let ticket = order.ticket().expect("ticket issued").clone();
    assert_eq!(ticket.path, "orders/O1");
    assert!(ticket.expires_at > ticket.issued_at);
    assert!(h.storage.has("orders/O1/B1/a.h5").await);
    assert!(h.storage.has("orders/O1/b.h5").await);
    // Production is copied from, never moved.
    assert!(h.storage.has("production/B1/a.h5").await);

    let history = h.order_store.history("O1").unwrap();
    let path: Vec<_> = history.iter().map(|t| t.to_state.as_str()).collect();
    assert_eq!(path, vec!["staged", "ticket_issued"]);

    // The expiry check waits on the queue for the ticket lifetime.
    assert_eq!(h.queue.pending_count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_missing_item_invalidates_order() {
    let h = harness_with_production(&["B1/a.h5"]).await;

    h.orders()
        .create_order(fixtures::order_request("O2", "dave", &["B1", "B-missing"]))
        .await
        .unwrap();
    h.drain(10).await;

    let order = h.order_store.load("O2").unwrap();
    match &order.state {
        OrderState::Invalid {
            missing_path,
            reason,
            ..
        } => {
            assert_eq!(missing_path, "production/B-missing");
            assert!(reason.contains("production/B-missing"));
        }
        other => panic!("expected invalid, got {:?}", other),
    }
    assert!(h.storage.issued_tickets().await.is_empty());
    assert!(h.storage.calls_to("issue_ticket").await.is_empty());
}

#[tokio::test]
async fn test_no_ticket_before_staging() {
    let h = harness_with_production(&["B1/a.h5"]).await;
    h.orders()
        .create_order(fixtures::order_request("O3", "dave", &["B1"]))
        .await
        .unwrap();

    // An early ticket delivery leaves the order alone.
    h.orders().handle_issue_ticket("O3").await.unwrap();
    assert_eq!(h.order_store.load("O3").unwrap().state, OrderState::Requested);
    assert!(h.storage.issued_tickets().await.is_empty());

    // Staging that keeps failing ends in failure, still without a ticket.
    h.storage
        .fail_always(StorageError::Unavailable("collection store offline".to_string()))
        .await;
    h.drain(10).await;

    let order = h.order_store.load("O3").unwrap();
    match &order.state {
        OrderState::Failed { error, .. } => assert!(error.contains("offline")),
        other => panic!("expected failed, got {:?}", other),
    }
    assert!(h.storage.issued_tickets().await.is_empty());
}

#[tokio::test]
async fn test_expiry_is_strictly_after_expires_at() {
    let h = harness_with_production(&["B1/a.h5"]).await;
    h.orders()
        .create_order(fixtures::order_request("O4", "dave", &["B1"]))
        .await
        .unwrap();
    h.drain(10).await;

    let expires_at = h.order_store.load("O4").unwrap().ticket().unwrap().expires_at;

    let order = h.orders().check_expiry("O4", expires_at).await.unwrap();
    assert!(matches!(order.state, OrderState::TicketIssued { .. }));

    let order = h
        .orders()
        .check_expiry("O4", expires_at + Duration::milliseconds(1))
        .await
        .unwrap();
    assert!(matches!(order.state, OrderState::Expired { .. }));

    // Confirming an expired order does not resurrect it.
    let order = h.orders().confirm_fulfilled("O4", Utc::now()).await.unwrap();
    assert!(matches!(order.state, OrderState::Expired { .. }));
}

#[tokio::test]
async fn test_confirm_fulfilled_then_cleanup() {
    let h = harness_with_production(&["B1/a.h5"]).await;
    h.orders()
        .create_order(fixtures::order_request("O5", "dave", &["B1"]))
        .await
        .unwrap();
    h.drain(10).await;

    let order = h.orders().confirm_fulfilled("O5", Utc::now()).await.unwrap();
    assert!(matches!(order.state, OrderState::Fulfilled { .. }));
    assert!(order.terminal_at.is_some());

    assert_eq!(h.orders().cleanup_sweep().await.unwrap(), 1);
    assert!(!h.storage.has("orders/O5").await);
    assert!(h.storage.issued_tickets().await.is_empty());
    assert!(h.order_store.load("O5").unwrap().cleaned_up_at.is_some());

    // Already cleaned.
    assert_eq!(h.orders().cleanup_sweep().await.unwrap(), 0);
}

#[tokio::test]
async fn test_confirm_requires_ticket() {
    let h = harness_with_production(&["B1/a.h5"]).await;
    h.orders()
        .create_order(fixtures::order_request("O6", "dave", &["B1"]))
        .await
        .unwrap();

    assert!(h.orders().confirm_fulfilled("O6", Utc::now()).await.is_err());
}

#[tokio::test]
async fn test_expire_due_sweeps_all_past_due() {
    let h = harness_with_production(&["B1/a.h5"]).await;
    for id in ["O7a", "O7b"] {
        h.orders()
            .create_order(fixtures::order_request(id, "dave", &["B1"]))
            .await
            .unwrap();
    }
    h.drain(10).await;

    assert_eq!(h.orders().expire_due(Utc::now()).await.unwrap(), 0);

    let later = Utc::now() + Duration::days(30);
    assert_eq!(h.orders().expire_due(later).await.unwrap(), 2);
    for id in ["O7a", "O7b"] {
        assert!(matches!(
            h.order_store.load(id).unwrap().state,
            OrderState::Expired { .. }
        ));
    }
    assert_eq!(h.orders().cleanup_sweep().await.unwrap(), 2);
}

#[tokio::test]
async fn test_restage_expired_order() {
    let h = harness_with_production(&["B1/a.h5"]).await;
    h.orders()
        .create_order(fixtures::order_request("O8", "dave", &["B1"]))
        .await
        .unwrap();
    h.drain(10).await;

    // Live orders cannot be restaged.
    assert!(h.orders().restage("O8", "O8-again", "dave").await.is_err());

    let later = Utc::now() + Duration::days(30);
    h.orders().check_expiry("O8", later).await.unwrap();
    h.orders().cleanup_sweep().await.unwrap();

    let order = h.orders().restage("O8", "O8-again", "dave").await.unwrap();
    assert_eq!(order.restaged_from.as_deref(), Some("O8"));
    assert_eq!(order.items, vec!["B1".to_string()]);
    h.drain(10).await;

    let order = h.order_store.load("O8-again").unwrap();
    assert!(order.ticket().is_some());
    assert!(h.storage.has("orders/O8-again/B1/a.h5").await);
}

#[tokio::test]
async fn test_cancel_before_staging() {
    let h = harness_with_production(&["B1/a.h5"]).await;
    h.orders()
        .create_order(fixtures::order_request("O9", "dave", &["B1"]))
        .await
        .unwrap();

    let order = h
        .orders()
        .cancel_order("O9", "dave", Some("ordered by mistake".to_string()))
        .await
        .unwrap();
    assert!(matches!(order.state, OrderState::Cancelled { .. }));

    h.drain(10).await;
    assert!(h.storage.calls_to("copy_entry").await.is_empty());
    assert_eq!(h.queue.pending_count().await.unwrap(), 0);
    assert!(h.orders().cancel_order("O9", "dave", None).await.is_err());
}

#[tokio::test]
async fn test_invalid_order_requests_refused() {
    let h = TestHarness::new().unwrap();

    let cases = [
        fixtures::order_request("O10", "dave", &[]),
        fixtures::order_request("O10", "dave", &["../secrets"]),
        fixtures::order_request("O10", "dave", &["/B1"]),
        fixtures::order_request("O10", " ", &["B1"]),
        fixtures::order_request("bad/id", "dave", &["B1"]),
    ];
    for request in cases {
        assert!(h.orders().create_order(request).await.is_err());
    }
    assert_eq!(h.queue.pending_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_staging_into_existing_collection() {
    let h = harness_with_production(&["B1/a.h5"]).await;
    // Left over from a crashed attempt.
    h.storage.add_collection("orders/O11").await;

    h.orders()
        .create_order(fixtures::order_request("O11", "dave", &["B1"]))
        .await
        .unwrap();
    h.drain(10).await;

    let order = h.order_store.load("O11").unwrap();
    assert!(matches!(order.state, OrderState::TicketIssued { .. }));
    assert!(h.storage.has("orders/O11/B1/a.h5").await);
}
