use std::sync::Arc;

use archivist_core::{
    AuditStore, BatchOrchestrator, Config, OrderOrchestrator, SanitizedConfig, StatusService,
    TaskRunner,
};

/// Shared application state
pub struct AppState {
    config: Config,
    audit_store: Arc<dyn AuditStore>,
    status: StatusService,
    runner: Arc<TaskRunner>,
}

impl AppState {
    pub fn new(
        config: Config,
        audit_store: Arc<dyn AuditStore>,
        status: StatusService,
        runner: Arc<TaskRunner>,
    ) -> Self {
        Self {
            config,
            audit_store,
            status,
            runner,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn audit_store(&self) -> &dyn AuditStore {
        self.audit_store.as_ref()
    }

    pub fn status(&self) -> &StatusService {
        &self.status
    }

    pub fn runner(&self) -> &Arc<TaskRunner> {
        &self.runner
    }

    pub fn batches(&self) -> &BatchOrchestrator {
        self.runner.batches()
    }

    pub fn orders(&self) -> &OrderOrchestrator {
        self.runner.orders()
    }
}
