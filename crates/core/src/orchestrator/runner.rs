//! Worker pool consuming the task queue.
//!
//! Each worker leases one task at a time and dispatches it to the batch or
//! order orchestrator. The outcome decides what happens to the lease:
//! - `Done` acks it, `Reschedule` releases it without counting an attempt
//! - lost state races are re-evaluated in place a few times
//! - retryable errors back off exponentially until attempts run out
//! - everything else is recorded on the entity and acked

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::audit::{AuditEvent, AuditHandle};
use crate::metrics;
use crate::queue::{Delivery, QueueError, Task, TaskKind, TaskQueue};

use super::batch::BatchOrchestrator;
use super::config::OrchestratorConfig;
use super::order::OrderOrchestrator;
use super::types::{ErrorKind, OrchestratorError, OrchestratorStatus, Transition};

/// State shared by every worker loop.
struct Dispatcher {
    config: OrchestratorConfig,
    queue: Arc<dyn TaskQueue>,
    batches: Arc<BatchOrchestrator>,
    orders: Arc<OrderOrchestrator>,
    audit: Option<AuditHandle>,
}

/// Drives queued tasks through the orchestrators.
pub struct TaskRunner {
    dispatcher: Arc<Dispatcher>,
    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl TaskRunner {
    pub fn new(
        config: OrchestratorConfig,
        queue: Arc<dyn TaskQueue>,
        batches: Arc<BatchOrchestrator>,
        orders: Arc<OrderOrchestrator>,
        audit: Option<AuditHandle>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            dispatcher: Arc::new(Dispatcher {
                config,
                queue,
                batches,
                orders,
                audit,
            }),
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn batches(&self) -> &Arc<BatchOrchestrator> {
        &self.dispatcher.batches
    }

    pub fn orders(&self) -> &Arc<OrderOrchestrator> {
        &self.dispatcher.orders
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Start the worker loops and the sweep loop.
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Task runner already running");
            return;
        }

        let workers = self.dispatcher.config.workers;
        info!(workers, "Starting task runner");

        let mut handles = self.handles.lock().await;
        for worker in 0..workers {
            handles.push(self.spawn_worker_loop(worker));
        }
        handles.push(self.spawn_sweep_loop());

        info!("Task runner started");
    }

    /// Stop the loops. In-flight tasks finish; their leases are kept until then.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Task runner not running");
            return;
        }

        info!("Stopping task runner");
        let _ = self.shutdown_tx.send(());

        let handles: Vec<_> = self.handles.lock().await.drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("Worker loop ended abnormally: {}", e);
            }
        }

        info!("Task runner stopped");
    }

    pub async fn status(&self) -> OrchestratorStatus {
        let d = &self.dispatcher;
        OrchestratorStatus {
            running: self.is_running(),
            workers: d.config.workers,
            pending_tasks: d.queue.pending_count().await.unwrap_or(0),
            batches_by_state: d
                .batches
                .store()
                .count_by_state()
                .unwrap_or_default()
                .into_iter()
                .collect(),
            orders_by_state: d
                .orders
                .store()
                .count_by_state()
                .unwrap_or_default()
                .into_iter()
                .collect(),
        }
    }

    /// Lease and handle one task. Returns false when nothing was available.
    pub async fn process_one(&self) -> Result<bool, QueueError> {
        self.dispatcher.process_one().await
    }

    /// Handle tasks until the queue has nothing visible or `max_tasks` ran.
    pub async fn run_until_idle(&self, max_tasks: usize) -> Result<usize, QueueError> {
        let mut processed = 0;
        while processed < max_tasks && self.process_one().await? {
            processed += 1;
        }
        Ok(processed)
    }

    fn spawn_worker_loop(&self, worker: usize) -> JoinHandle<()> {
        let running = Arc::clone(&self.running);
        let dispatcher = Arc::clone(&self.dispatcher);
        let poll_interval = Duration::from_millis(dispatcher.config.poll_interval_ms);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            debug!(worker, "Worker loop started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        debug!(worker, "Worker loop received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(poll_interval) => {
                        // Drain whatever is visible before sleeping again.
                        while running.load(Ordering::Relaxed) {
                            match dispatcher.process_one().await {
                                Ok(true) => {}
                                Ok(false) => break,
                                Err(e) => {
                                    warn!(worker, "Queue error: {}", e);
                                    break;
                                }
                            }
                        }
                        if !running.load(Ordering::Relaxed) {
                            break;
                        }
                    }
                }
            }
            debug!(worker, "Worker loop stopped");
        })
    }

    fn spawn_sweep_loop(&self) -> JoinHandle<()> {
        let running = Arc::clone(&self.running);
        let orders = Arc::clone(&self.dispatcher.orders);
        let batches = Arc::clone(&self.dispatcher.batches);
        let interval = Duration::from_millis(self.dispatcher.config.sweep_interval_ms);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            info!("Sweep loop started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Sweep loop received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        if !running.load(Ordering::Relaxed) {
                            break;
                        }
                        match orders.expire_due(Utc::now()).await {
                            Ok(0) => {}
                            Ok(n) => info!("Expired {} orders", n),
                            Err(e) => warn!("Expiry sweep failed: {}", e),
                        }
                        match orders.cleanup_sweep().await {
                            Ok(0) => {}
                            Ok(n) => info!("Cleaned up {} staging collections", n),
                            Err(e) => warn!("Cleanup sweep failed: {}", e),
                        }
                        match batches.cleanup_sweep(Utc::now()).await {
                            Ok(0) => {}
                            Ok(n) => info!("Removed ingestion data of {} batches", n),
                            Err(e) => warn!("Ingestion cleanup sweep failed: {}", e),
                        }
                    }
                }
            }
            info!("Sweep loop stopped");
        })
    }
}

impl Dispatcher {
    async fn process_one(&self) -> Result<bool, QueueError> {
        let Some(delivery) = self.queue.consume().await? else {
            return Ok(false);
        };

        let kind = delivery.task.kind;
        debug!(
            kind = %kind,
            entity_id = %delivery.task.entity_id,
            attempts = delivery.attempts,
            "Handling task"
        );

        let timer = metrics::TASK_DURATION
            .with_label_values(&[kind.as_str()])
            .start_timer();
        let result = self.run(&delivery.task).await;
        timer.observe_duration();

        self.settle(&delivery, result).await?;
        Ok(true)
    }

    /// Run the handler, re-evaluating after lost state races.
    async fn run(&self, task: &Task) -> Result<Transition, OrchestratorError> {
        let mut conflicts = 0;
        loop {
            match self.dispatch(task).await {
                Err(e) if e.is_conflict() && conflicts < self.config.conflict_retries => {
                    conflicts += 1;
                    metrics::TRANSITION_CONFLICTS
                        .with_label_values(&[task.kind.as_str()])
                        .inc();
                    debug!(kind = %task.kind, entity_id = %task.entity_id, "Re-evaluating after conflict: {}", e);
                }
                other => return other,
            }
        }
    }

    async fn dispatch(&self, task: &Task) -> Result<Transition, OrchestratorError> {
        let id = task.entity_id.as_str();
        match task.kind {
            TaskKind::SubmitQc => self.batches.handle_submit_qc(id).await,
            TaskKind::PollQc => self.batches.handle_poll_qc(id).await,
            TaskKind::PromoteBatch => self.batches.handle_promote(id).await,
            TaskKind::StageOrder => self.orders.handle_stage(id).await,
            TaskKind::IssueTicket => self.orders.handle_issue_ticket(id).await,
            TaskKind::ExpireOrder => self.orders.handle_expire(id).await,
        }
    }

    async fn settle(
        &self,
        delivery: &Delivery,
        result: Result<Transition, OrchestratorError>,
    ) -> Result<(), QueueError> {
        let task = &delivery.task;
        let outcome = match result {
            Ok(Transition::Done) => {
                self.queue.ack(delivery).await?;
                "done"
            }
            Ok(Transition::Reschedule(delay)) => {
                self.queue.reschedule(delivery, delay).await?;
                "rescheduled"
            }
            Ok(Transition::Progress(delay)) => {
                if delivery.attempts > 0 {
                    debug!(kind = %task.kind, entity_id = %task.entity_id, attempts = delivery.attempts, "Progress made, retry budget restored");
                }
                self.queue.renew(delivery, delay).await?;
                "rescheduled"
            }
            Err(e) => match e.kind() {
                ErrorKind::Conflict => {
                    debug!(kind = %task.kind, entity_id = %task.entity_id, "Conflicts persisted, rescheduling");
                    self.queue
                        .reschedule(delivery, Duration::from_millis(self.config.poll_interval_ms))
                        .await?;
                    "rescheduled"
                }
                ErrorKind::Retryable => self.retry_or_exhaust(delivery, &e).await?,
                ErrorKind::Rejected | ErrorKind::Fatal => {
                    error!(kind = %task.kind, entity_id = %task.entity_id, "Task failed: {}", e);
                    let recorded = self.record_failure(task, &e.to_string(), None).await;
                    self.finish_failed(delivery, &e.to_string(), delivery.attempts + 1, recorded)
                        .await?
                }
            },
        };

        metrics::TASKS_PROCESSED
            .with_label_values(&[task.kind.as_str(), outcome])
            .inc();
        Ok(())
    }

    async fn retry_or_exhaust(
        &self,
        delivery: &Delivery,
        e: &OrchestratorError,
    ) -> Result<&'static str, QueueError> {
        let task = &delivery.task;
        let attempts = delivery.attempts + 1;
        let policy = self.config.retry_policy();

        if policy.allows_retry(attempts) {
            let delay = policy.backoff(delivery.attempts);
            warn!(
                kind = %task.kind,
                entity_id = %task.entity_id,
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                "Task failed, retrying: {}",
                e
            );
            self.emit(AuditEvent::TaskRetryScheduled {
                task_kind: task.kind.as_str().to_string(),
                entity_id: task.entity_id.clone(),
                attempt: attempts,
                delay_ms: delay.as_millis() as u64,
                error: e.to_string(),
            })
            .await;
            self.queue.retry(delivery, delay).await?;
            return Ok("retried");
        }

        error!(
            kind = %task.kind,
            entity_id = %task.entity_id,
            attempts,
            "Retries exhausted: {}",
            e
        );
        let recorded = self
            .record_failure(task, &e.to_string(), Some(attempts))
            .await;
        self.finish_failed(delivery, &e.to_string(), attempts, recorded)
            .await
    }

    /// Ack after the failure is on the entity; if it could not be written, keep the task.
    async fn finish_failed(
        &self,
        delivery: &Delivery,
        error: &str,
        attempts: u32,
        recorded: Result<(), OrchestratorError>,
    ) -> Result<&'static str, QueueError> {
        let task = &delivery.task;
        match recorded {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::Retryable => {
                warn!(kind = %task.kind, entity_id = %task.entity_id, "Could not record failure, retrying later: {}", e);
                let delay = self.config.retry_policy().backoff(delivery.attempts);
                self.queue.retry(delivery, delay).await?;
                return Ok("retried");
            }
            Err(e) => {
                warn!(kind = %task.kind, entity_id = %task.entity_id, "Could not record failure: {}", e);
            }
        }

        self.emit(AuditEvent::TaskFailed {
            task_kind: task.kind.as_str().to_string(),
            entity_id: task.entity_id.clone(),
            attempts,
            error: error.to_string(),
        })
        .await;
        self.queue.ack(delivery).await?;
        Ok("failed")
    }

    async fn record_failure(
        &self,
        task: &Task,
        error: &str,
        exhausted_after: Option<u32>,
    ) -> Result<(), OrchestratorError> {
        let id = task.entity_id.as_str();
        match (task.kind.is_batch_task(), exhausted_after) {
            (true, Some(attempts)) => self.batches.on_exhausted(task.kind, id, error, attempts).await,
            (true, None) => self.batches.on_failed(id, error).await,
            (false, Some(attempts)) => self.orders.on_exhausted(task.kind, id, error, attempts).await,
            (false, None) => self.orders.on_failed(id, error).await,
        }
    }

    async fn emit(&self, event: AuditEvent) {
        if let Some(ref audit) = self.audit {
            audit.emit(event).await;
        }
    }
}
