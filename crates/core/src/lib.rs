//! Orchestration engine for archive ingestion batches and delivery orders.

pub mod audit;
pub mod auth;
pub mod batch;
pub mod config;
pub mod lifecycle;
pub mod metrics;
pub mod orchestrator;
pub mod order;
pub mod qc;
pub mod queue;
pub mod status;
pub mod storage;
pub mod testing;

pub use audit::{
    create_audit_system, AuditError, AuditEvent, AuditEventEnvelope, AuditFilter, AuditHandle,
    AuditRecord, AuditStore, AuditSubject, AuditWriter, SqliteAuditStore,
};
pub use auth::{
    AuthorizationRegistry, PrivilegedUser, PrivilegedUserStore, SqlitePrivilegedUserStore,
    SyncReport, UserStoreError,
};
pub use batch::{
    Batch, BatchFilter, BatchManifest, BatchState, BatchStore, ManifestEntry, QcJob, QcJobResult,
    SqliteBatchStore, SubmitBatchRequest,
};
pub use config::{
    load_config, load_config_from_str, validate_config, AuthConfig, AutoApproveScope, Config,
    ConfigError, SanitizedConfig,
};
pub use lifecycle::{Lifecycle, LifecycleError, LifecycleState, LifecycleStore, StoreError};
pub use orchestrator::{
    BatchOrchestrator, ErrorKind, OrchestratorConfig, OrchestratorError, OrchestratorStatus,
    OrderOrchestrator, TaskRunner,
};
pub use order::{CreateOrderRequest, Order, OrderFilter, OrderState, OrderStore, SqliteOrderStore};
pub use qc::{HttpQcExecutor, QcError, QcExecutor, QcOutcome, QcPoll};
pub use queue::{SqliteTaskQueue, Task, TaskKind, TaskQueue};
pub use status::{EntityKind, EntityStatus, StatusService};
pub use storage::{
    CollectionLayout, DownloadTicket, FsStorageGateway, StorageError, StorageGateway, StoredFile,
};
