use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use archivist_core::{
    create_audit_system, load_config, validate_config, AuditEvent, AuditStore,
    AuthorizationRegistry, BatchOrchestrator, BatchStore, CollectionLayout, FsStorageGateway,
    HttpQcExecutor, OrderOrchestrator, OrderStore, QcExecutor, SqliteAuditStore,
    SqliteBatchStore, SqliteOrderStore, SqlitePrivilegedUserStore, SqliteTaskQueue,
    StatusService, StorageGateway, TaskQueue, TaskRunner,
};
use archivist_server::{api::create_router, state::AppState};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Buffer size for audit event channel
const AUDIT_BUFFER_SIZE: usize = 1000;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = std::env::var("ARCHIVIST_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Database path: {:?}", config.database.path);
    info!("Collection store root: {:?}", config.storage.root);

    // Compute config hash for audit
    let config_json = serde_json::to_string(&config).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    let config_hash_short = &config_hash[..16];

    let db_path = &config.database.path;
    let audit_store: Arc<dyn AuditStore> = Arc::new(
        SqliteAuditStore::new(db_path).context("Failed to create audit store")?,
    );
    let batch_store: Arc<dyn BatchStore> = Arc::new(
        SqliteBatchStore::new(db_path).context("Failed to create batch store")?,
    );
    let order_store: Arc<dyn OrderStore> = Arc::new(
        SqliteOrderStore::new(db_path).context("Failed to create order store")?,
    );
    let queue: Arc<dyn TaskQueue> = Arc::new(
        SqliteTaskQueue::new(
            db_path,
            Duration::from_secs(config.queue.visibility_timeout_secs),
        )
        .context("Failed to create task queue")?,
    );
    let user_store =
        SqlitePrivilegedUserStore::new(db_path).context("Failed to create privileged user store")?;
    info!("Stores initialized");

    // Create audit system
    let (audit_handle, audit_writer) =
        create_audit_system(Arc::clone(&audit_store), AUDIT_BUFFER_SIZE);
    let writer_handle = tokio::spawn(audit_writer.run());

    audit_handle
        .emit(AuditEvent::ServiceStarted {
            version: VERSION.to_string(),
            config_hash: config_hash_short.to_string(),
        })
        .await;

    // Privileged identities are read once per process start.
    let registry = Arc::new(AuthorizationRegistry::from_delimited(
        &config.auth.privileged_users,
    ));
    let report = registry
        .sync_to(&user_store)
        .context("Failed to record privileged users")?;
    info!(
        active = report.active,
        deactivated = report.deactivated,
        auto_approve = config.auth.auto_approve,
        "Privileged users loaded"
    );
    audit_handle
        .emit(AuditEvent::PrivilegedUsersSynced {
            active: report.active,
            deactivated: report.deactivated,
        })
        .await;

    let layout = CollectionLayout::from(&config.storage);
    let storage: Arc<dyn StorageGateway> =
        Arc::new(FsStorageGateway::new(config.storage.root.clone(), &layout));
    let qc: Arc<dyn QcExecutor> = Arc::new(
        HttpQcExecutor::new(config.qc.clone()).context("Failed to create QC client")?,
    );
    info!("Using QC backend at {}", config.qc.url);

    let batches = Arc::new(
        BatchOrchestrator::new(
            config.orchestrator.clone(),
            config.auth.clone(),
            registry,
            Arc::clone(&batch_store),
            Arc::clone(&storage),
            qc,
            Arc::clone(&queue),
        )
        .with_layout(layout.clone())
        .with_audit(audit_handle.clone()),
    );
    let orders = Arc::new(
        OrderOrchestrator::new(
            config.orchestrator.clone(),
            Arc::clone(&order_store),
            storage,
            Arc::clone(&queue),
        )
        .with_layout(layout)
        .with_audit(audit_handle.clone()),
    );
    let runner = Arc::new(TaskRunner::new(
        config.orchestrator.clone(),
        queue,
        batches,
        orders,
        Some(audit_handle.clone()),
    ));

    if config.orchestrator.enabled {
        runner.start().await;
    } else {
        info!("Task runner disabled in config");
    }

    let state = Arc::new(AppState::new(
        config.clone(),
        audit_store,
        StatusService::new(batch_store, order_store),
        Arc::clone(&runner),
    ));
    let app = create_router(state);

    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    if runner.is_running() {
        runner.stop().await;
    }

    info!("Server shutting down...");
    audit_handle
        .emit(AuditEvent::ServiceStopped {
            reason: "graceful_shutdown".to_string(),
        })
        .await;

    // The writer exits once every AuditHandle clone is gone; the runner
    // and both orchestrators hold one.
    drop(runner);
    drop(audit_handle);

    let _ = writer_handle.await;
    info!("Audit writer stopped");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
