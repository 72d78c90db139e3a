//! In-process server with mock collaborators for API tests.
//!
//! Stores are in-memory SQLite; the collection store and QC backend are the
//! core crate's mocks. Tasks only run when a test calls [`TestFixture::drain`].

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use archivist_core::{
    create_audit_system, load_config_from_str, AuditStore, AuthorizationRegistry,
    BatchOrchestrator, BatchStore, OrderOrchestrator, OrderStore, QcExecutor, SqliteAuditStore,
    SqliteBatchStore, SqliteOrderStore, SqliteTaskQueue, StatusService, StorageGateway,
    TaskQueue, TaskRunner,
    testing::{MockQcExecutor, MockStorageGateway},
};
use archivist_server::{api::create_router, state::AppState};

/// Re-export fixtures for test convenience
pub use archivist_core::testing::fixtures;

pub struct TestFixture {
    pub router: Router,
    pub runner: Arc<TaskRunner>,
    pub storage: Arc<MockStorageGateway>,
    pub qc: Arc<MockQcExecutor>,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestFixture {
    pub async fn new() -> Self {
        let config = load_config_from_str(
            r#"
[storage]
root = "/srv/archive"

[auth]
privileged_users = "alice"
"#,
        )
        .expect("Failed to parse config");
        let orchestrator_config = fixtures::fast_config();

        let audit_store: Arc<dyn AuditStore> =
            Arc::new(SqliteAuditStore::in_memory().expect("Failed to create audit store"));
        let batch_store: Arc<dyn BatchStore> =
            Arc::new(SqliteBatchStore::in_memory().expect("Failed to create batch store"));
        let order_store: Arc<dyn OrderStore> =
            Arc::new(SqliteOrderStore::in_memory().expect("Failed to create order store"));
        let queue: Arc<dyn TaskQueue> = Arc::new(
            SqliteTaskQueue::in_memory(Duration::from_secs(300))
                .expect("Failed to create task queue"),
        );
        let storage = Arc::new(MockStorageGateway::new());
        let qc = Arc::new(MockQcExecutor::new());

        let (audit_handle, audit_writer) = create_audit_system(Arc::clone(&audit_store), 100);
        tokio::spawn(audit_writer.run());

        let batches = Arc::new(
            BatchOrchestrator::new(
                orchestrator_config.clone(),
                config.auth.clone(),
                Arc::new(AuthorizationRegistry::from_delimited(
                    &config.auth.privileged_users,
                )),
                Arc::clone(&batch_store),
                Arc::clone(&storage) as Arc<dyn StorageGateway>,
                Arc::clone(&qc) as Arc<dyn QcExecutor>,
                Arc::clone(&queue),
            )
            .with_audit(audit_handle.clone()),
        );
        let orders = Arc::new(
            OrderOrchestrator::new(
                orchestrator_config.clone(),
                Arc::clone(&order_store),
                Arc::clone(&storage) as Arc<dyn StorageGateway>,
                Arc::clone(&queue),
            )
            .with_audit(audit_handle.clone()),
        );
        let runner = Arc::new(TaskRunner::new(
            orchestrator_config,
            queue,
            batches,
            orders,
            Some(audit_handle),
        ));

        let state = Arc::new(AppState::new(
            config,
            audit_store,
            StatusService::new(batch_store, order_store),
            Arc::clone(&runner),
        ));

        Self {
            router: create_router(state),
            runner,
            storage,
            qc,
        }
    }

    /// Run queued tasks until nothing is visible.
    pub async fn drain(&self) {
        self.runner
            .run_until_idle(100)
            .await
            .expect("Failed to drain task queue");
    }

    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None, None).await
    }

    pub async fn post(&self, path: &str) -> TestResponse {
        self.request("POST", path, None, None).await
    }

    /// DELETE with an optional JSON body, as `operator`.
    pub async fn delete_as(&self, path: &str, operator: &str, body: Option<Value>) -> TestResponse {
        self.request("DELETE", path, body, Some(operator)).await
    }

    /// Raw response body as text, for non-JSON endpoints.
    pub async fn get_text(&self, path: &str) -> (StatusCode, String) {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .unwrap();
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    async fn request(
        &self,
        method: &str,
        path: &str,
        body: Option<Value>,
        operator: Option<&str>,
    ) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);
        if let Some(operator) = operator {
            request_builder =
                request_builder.header(archivist_server::api::middleware::OPERATOR_HEADER, operator);
        }

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        let request = request_builder.body(body).unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}
