//! Fully wired orchestrators over in-memory stores and mock collaborators.

use std::sync::Arc;
use std::time::Duration;

use crate::auth::AuthorizationRegistry;
use crate::batch::{BatchStore, SqliteBatchStore};
use crate::config::AuthConfig;
use crate::orchestrator::{
    BatchOrchestrator, OrchestratorConfig, OrchestratorError, OrderOrchestrator, TaskRunner,
};
use crate::order::{OrderStore, SqliteOrderStore};
use crate::queue::{SqliteTaskQueue, TaskQueue};
use crate::storage::StorageGateway;
use crate::qc::QcExecutor;

use super::{fixtures, MockQcExecutor, MockStorageGateway};

/// Options for [`TestHarness::with_options`].
#[derive(Debug, Clone)]
pub struct HarnessOptions {
    pub auth: AuthConfig,
    pub orchestrator: OrchestratorConfig,
    pub visibility_timeout: Duration,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            auth: AuthConfig::default(),
            orchestrator: fixtures::fast_config(),
            visibility_timeout: Duration::from_secs(300),
        }
    }
}

pub struct TestHarness {
    pub batch_store: Arc<SqliteBatchStore>,
    pub order_store: Arc<SqliteOrderStore>,
    pub queue: Arc<SqliteTaskQueue>,
    pub storage: Arc<MockStorageGateway>,
    pub qc: Arc<MockQcExecutor>,
    pub runner: TaskRunner,
}

impl TestHarness {
    pub fn new() -> Result<Self, OrchestratorError> {
        Self::with_options(HarnessOptions::default())
    }

    pub fn with_options(options: HarnessOptions) -> Result<Self, OrchestratorError> {
        let batch_store = Arc::new(SqliteBatchStore::in_memory()?);
        let order_store = Arc::new(SqliteOrderStore::in_memory()?);
        let queue = Arc::new(SqliteTaskQueue::in_memory(options.visibility_timeout)?);
        let storage = Arc::new(MockStorageGateway::new());
        let qc = Arc::new(MockQcExecutor::new());
        let registry = Arc::new(AuthorizationRegistry::from_delimited(
            &options.auth.privileged_users,
        ));

        let batches = Arc::new(BatchOrchestrator::new(
            options.orchestrator.clone(),
            options.auth.clone(),
            registry,
            Arc::clone(&batch_store) as Arc<dyn BatchStore>,
            Arc::clone(&storage) as Arc<dyn StorageGateway>,
            Arc::clone(&qc) as Arc<dyn QcExecutor>,
            Arc::clone(&queue) as Arc<dyn TaskQueue>,
        ));
        let orders = Arc::new(OrderOrchestrator::new(
            options.orchestrator.clone(),
            Arc::clone(&order_store) as Arc<dyn OrderStore>,
            Arc::clone(&storage) as Arc<dyn StorageGateway>,
            Arc::clone(&queue) as Arc<dyn TaskQueue>,
        ));
        let runner = TaskRunner::new(
            options.orchestrator,
            Arc::clone(&queue) as Arc<dyn TaskQueue>,
            batches,
            orders,
            None,
        );

        Ok(Self {
            batch_store,
            order_store,
            queue,
            storage,
            qc,
            runner,
        })
    }

    pub fn batches(&self) -> &BatchOrchestrator {
        self.runner.batches()
    }

    pub fn orders(&self) -> &OrderOrchestrator {
        self.runner.orders()
    }

    /// Process tasks until nothing is visible, at most `max_tasks`.
    pub async fn drain(&self, max_tasks: usize) -> usize {
        self.runner.run_until_idle(max_tasks).await.unwrap_or(0)
    }
}
