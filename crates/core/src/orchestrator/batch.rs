//! Batch lifecycle handlers.
//!
//! Drives a batch from `Staged` through QC to `Promoted` or `Rejected`.
//! Every handler reloads the batch, treats work that is already done as
//! success and applies transitions with compare-and-swap, so a task may be
//! delivered any number of times.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::audit::{AuditEvent, AuditHandle, AuditSubject};
use crate::auth::AuthorizationRegistry;
use crate::batch::{
    Batch, BatchFilter, BatchState, BatchStore, QcJob, QcJobResult, SubmitBatchRequest,
};
use crate::config::{AuthConfig, AutoApproveScope};
use crate::lifecycle::{advance, LifecycleState, LifecycleStore};
use crate::metrics;
use crate::qc::{PollRateLimiter, QcError, QcExecutor, QcOutcome};
use crate::queue::{Task, TaskKind, TaskQueue};
use crate::storage::{CollectionLayout, StorageGateway};

use super::config::OrchestratorConfig;
use super::types::{OrchestratorError, Transition};
use super::validation::{validate_identifier, validate_identity, validate_manifest};

const SYSTEM_ACTOR: &str = "system";
const SWEEP_PAGE: i64 = 100;

pub struct BatchOrchestrator {
    config: OrchestratorConfig,
    auth: AuthConfig,
    registry: Arc<AuthorizationRegistry>,
    store: Arc<dyn BatchStore>,
    storage: Arc<dyn StorageGateway>,
    qc: Arc<dyn QcExecutor>,
    queue: Arc<dyn TaskQueue>,
    limiter: PollRateLimiter,
    layout: CollectionLayout,
    audit: Option<AuditHandle>,
}

impl BatchOrchestrator {
    pub fn new(
        config: OrchestratorConfig,
        auth: AuthConfig,
        registry: Arc<AuthorizationRegistry>,
        store: Arc<dyn BatchStore>,
        storage: Arc<dyn StorageGateway>,
        qc: Arc<dyn QcExecutor>,
        queue: Arc<dyn TaskQueue>,
    ) -> Self {
        let limiter = PollRateLimiter::new(config.qc_max_polls_per_minute);
        Self {
            config,
            auth,
            registry,
            store,
            storage,
            qc,
            queue,
            limiter,
            layout: CollectionLayout::default(),
            audit: None,
        }
    }

    pub fn with_layout(mut self, layout: CollectionLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_audit(mut self, audit: AuditHandle) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn store(&self) -> &Arc<dyn BatchStore> {
        &self.store
    }

    /// Record a new batch and queue its QC submission.
    pub async fn submit_batch(&self, request: SubmitBatchRequest) -> Result<Batch, OrchestratorError> {
        validate_identifier("batch", &request.batch_id)?;
        validate_identity(&request.submitted_by)?;
        if let Some(ref manifest) = request.manifest {
            validate_manifest(manifest)?;
        }

        let privileged = self.registry.is_privileged(&request.submitted_by);
        let ingestion_path = self.layout.ingestion_path(&request.batch_id);
        let batch = self.store.create(&request, &ingestion_path, privileged)?;

        info!(
            batch_id = %batch.id,
            submitted_by = %batch.submitted_by,
            privileged,
            "Batch submitted"
        );
        self.emit(AuditEvent::BatchSubmitted {
            batch_id: batch.id.clone(),
            submitted_by: batch.submitted_by.clone(),
            privileged,
            ingestion_path: batch.ingestion_path.clone(),
        })
        .await;

        self.queue.enqueue(Task::new(TaskKind::SubmitQc, &batch.id)).await?;
        Ok(batch)
    }

    /// `Staged -> QcSubmitted`, or the privileged shortcut to `QcPassed`.
    pub async fn handle_submit_qc(&self, batch_id: &str) -> Result<Transition, OrchestratorError> {
        let batch = self.store.load(batch_id)?;
        if self.settle_if_cancelled(&batch).await? {
            return Ok(Transition::Done);
        }

        match batch.state {
            BatchState::Staged => {}
            BatchState::QcSubmitted { .. } | BatchState::QcFailed { .. } => {
                self.enqueue(TaskKind::PollQc, &batch.id).await?;
                return Ok(Transition::Done);
            }
            BatchState::QcPassed { .. } => {
                self.enqueue(TaskKind::PromoteBatch, &batch.id).await?;
                return Ok(Transition::Done);
            }
            _ => return Ok(Transition::Done),
        }

        if !self.storage.exists(&batch.ingestion_path).await? {
            let reason = format!("ingestion path not found: {}", batch.ingestion_path);
            self.transition(
                &batch,
                BatchState::Rejected {
                    artifact_path: None,
                    reason,
                    rejected_at: Utc::now(),
                },
            )
            .await?;
            return Ok(Transition::Done);
        }

        let pending = self.store.pending_qc_job(&batch.id)?;
        let handed_to_qc = pending
            .as_ref()
            .is_some_and(|job| job.backend_job_id.is_some());
        if !handed_to_qc {
            if let Some(problem) = self.integrity_problem(&batch).await? {
                warn!(batch_id = %batch.id, "Integrity check failed: {}", problem);
                self.transition(
                    &batch,
                    BatchState::Rejected {
                        artifact_path: None,
                        reason: format!("integrity check failed: {}", problem),
                        rejected_at: Utc::now(),
                    },
                )
                .await?;
                self.abandon_pending_job(&batch.id)?;
                return Ok(Transition::Done);
            }
        }

        if self.should_auto_approve(&batch) {
            self.transition(
                &batch,
                BatchState::QcPassed {
                    artifact_path: None,
                    auto_approved: true,
                    passed_at: Utc::now(),
                },
            )
            .await?;
            metrics::BATCHES_AUTO_APPROVED.inc();
            self.enqueue(TaskKind::PromoteBatch, &batch.id).await?;
            return Ok(Transition::Done);
        }

        let job = match pending {
            Some(job) if job.backend_job_id.is_some() => {
                // Submitted before a crash, state never recorded.
                info!(batch_id = %batch.id, job_id = %job.id, "Adopting submitted QC job");
                metrics::QC_SUBMISSIONS.with_label_values(&["adopted"]).inc();
                return self.record_submitted(&batch, &job).await;
            }
            Some(job) => {
                let age = (Utc::now() - job.submitted_at).to_std().unwrap_or_default();
                let claim_timeout = Duration::from_secs(self.config.submit_claim_timeout_secs);
                if age < claim_timeout {
                    debug!(batch_id = %batch.id, job_id = %job.id, "QC submission in flight elsewhere");
                    return Ok(Transition::Reschedule(claim_timeout - age));
                }
                warn!(batch_id = %batch.id, job_id = %job.id, "Abandoning stale QC submission claim");
                self.store.finish_qc_job(
                    &job.id,
                    QcJobResult::Abandoned,
                    None,
                    Some("stale submission claim"),
                )?;
                self.store.claim_qc_job(&batch.id)?
            }
            None => self.store.claim_qc_job(&batch.id)?,
        };

        match self.qc.submit(&batch.id, &batch.ingestion_path).await {
            Ok(backend_job_id) => {
                let job = self.store.attach_backend_job(&job.id, &backend_job_id)?;
                metrics::QC_SUBMISSIONS.with_label_values(&["submitted"]).inc();
                self.record_submitted(&batch, &job).await
            }
            Err(QcError::Rejected(message)) => {
                metrics::QC_SUBMISSIONS.with_label_values(&["rejected"]).inc();
                self.store
                    .finish_qc_job(&job.id, QcJobResult::Abandoned, None, Some(&message))?;
                self.transition(
                    &batch,
                    BatchState::Rejected {
                        artifact_path: None,
                        reason: format!("QC backend refused submission: {}", message),
                        rejected_at: Utc::now(),
                    },
                )
                .await?;
                Ok(Transition::Done)
            }
            Err(e) => {
                metrics::QC_SUBMISSIONS.with_label_values(&["error"]).inc();
                self.store.finish_qc_job(
                    &job.id,
                    QcJobResult::Abandoned,
                    None,
                    Some(&e.to_string()),
                )?;
                Err(e.into())
            }
        }
    }

    /// `QcSubmitted -> QcPassed | QcFailed`, and `QcFailed -> Rejected`.
    pub async fn handle_poll_qc(&self, batch_id: &str) -> Result<Transition, OrchestratorError> {
        let batch = self.store.load(batch_id)?;
        if self.settle_if_cancelled(&batch).await? {
            return Ok(Transition::Done);
        }

        let job_id = match &batch.state {
            BatchState::QcSubmitted { job_id, .. } => job_id.clone(),
            BatchState::QcFailed { .. } => {
                self.reject_failed(&batch).await?;
                return Ok(Transition::Done);
            }
            BatchState::QcPassed { .. } => {
                self.enqueue(TaskKind::PromoteBatch, &batch.id).await?;
                return Ok(Transition::Done);
            }
            _ => return Ok(Transition::Done),
        };

        let job = self
            .store
            .get_qc_job(&job_id)?
            .ok_or_else(|| OrchestratorError::Inconsistent {
                id: batch.id.clone(),
                message: format!("QC job {} is missing", job_id),
            })?;

        match job.result {
            QcJobResult::Pending => {}
            QcJobResult::Pass => return self.record_pass(&batch, &job).await,
            QcJobResult::Fail | QcJobResult::TimedOut => return self.record_fail(&batch, &job).await,
            QcJobResult::Abandoned => {
                return Err(OrchestratorError::Inconsistent {
                    id: batch.id.clone(),
                    message: format!("QC job {} was abandoned", job.id),
                })
            }
        }

        let now = Utc::now();
        let running_for = (now - job.submitted_at).to_std().unwrap_or_default();
        if running_for >= Duration::from_secs(self.config.qc_timeout_secs) {
            metrics::QC_TIMEOUTS.inc();
            let reason = format!(
                "QC job timed out after {}s without a result",
                self.config.qc_timeout_secs
            );
            warn!(batch_id = %batch.id, job_id = %job.id, "{}", reason);
            let job = self
                .store
                .finish_qc_job(&job.id, QcJobResult::TimedOut, None, Some(&reason))?;
            self.emit_result(&batch, &job).await;
            return self.record_fail(&batch, &job).await;
        }

        let interval = self.config.qc_poll_interval();
        if let Some(last) = job.last_polled_at {
            let since = (now - last).to_std().unwrap_or_default();
            if since < interval {
                return Ok(Transition::Reschedule(interval - since));
            }
        }

        if let Err(wait) = self.limiter.try_acquire() {
            metrics::QC_POLLS.with_label_values(&["throttled"]).inc();
            debug!(batch_id = %batch.id, wait_ms = wait.as_millis() as u64, "QC poll throttled");
            return Ok(Transition::Reschedule(wait));
        }

        let backend_job_id =
            job.backend_job_id
                .as_deref()
                .ok_or_else(|| OrchestratorError::Inconsistent {
                    id: batch.id.clone(),
                    message: format!("QC job {} has no backend id", job.id),
                })?;

        self.store.mark_qc_polled(&job.id, now)?;
        let poll = match self.qc.poll_result(backend_job_id).await {
            Ok(poll) => poll,
            Err(e) => {
                metrics::QC_POLLS.with_label_values(&["error"]).inc();
                return Err(e.into());
            }
        };

        match poll.outcome {
            QcOutcome::Pending => {
                metrics::QC_POLLS.with_label_values(&["pending"]).inc();
                Ok(Transition::Progress(interval))
            }
            QcOutcome::Pass => {
                metrics::QC_POLLS.with_label_values(&["pass"]).inc();
                let job = self.store.finish_qc_job(
                    &job.id,
                    QcJobResult::Pass,
                    poll.artifact_path.as_deref(),
                    poll.message.as_deref(),
                )?;
                self.emit_result(&batch, &job).await;
                self.record_pass(&batch, &job).await
            }
            QcOutcome::Fail => {
                metrics::QC_POLLS.with_label_values(&["fail"]).inc();
                let reason = poll
                    .message
                    .unwrap_or_else(|| "QC reported failure".to_string());
                let job = self.store.finish_qc_job(
                    &job.id,
                    QcJobResult::Fail,
                    poll.artifact_path.as_deref(),
                    Some(&reason),
                )?;
                self.emit_result(&batch, &job).await;
                self.record_fail(&batch, &job).await
            }
        }
    }

    /// `QcPassed -> Promoted`: move the ingestion collection into production.
    pub async fn handle_promote(&self, batch_id: &str) -> Result<Transition, OrchestratorError> {
        let batch = self.store.load(batch_id)?;
        if self.settle_if_cancelled(&batch).await? {
            return Ok(Transition::Done);
        }
        if !matches!(batch.state, BatchState::QcPassed { .. }) {
            return Ok(Transition::Done);
        }

        let production_path = self.layout.production_path(&batch.id);
        if self.storage.exists(&batch.ingestion_path).await? {
            // The move creates the production collection.
            self.storage
                .move_entries(&batch.ingestion_path, &production_path)
                .await?;
        } else if !self.storage.exists(&production_path).await? {
            let error = format!(
                "ingestion data disappeared before promotion: {} (nothing at {})",
                batch.ingestion_path, production_path
            );
            warn!(batch_id = %batch.id, "{}", error);
            self.transition(
                &batch,
                BatchState::Failed {
                    error,
                    failed_at: Utc::now(),
                },
            )
            .await?;
            return Ok(Transition::Done);
        } else {
            debug!(batch_id = %batch.id, "Ingestion already moved to {}", production_path);
        }

        self.transition(
            &batch,
            BatchState::Promoted {
                production_path,
                promoted_at: Utc::now(),
            },
        )
        .await?;
        Ok(Transition::Done)
    }

    /// Operator removal of the ingestion data of an unsuccessful batch.
    ///
    /// The batch record stays. Repeating the call returns the batch unchanged.
    pub async fn delete_batch_data(
        &self,
        batch_id: &str,
        requested_by: &str,
    ) -> Result<Batch, OrchestratorError> {
        let batch = self.store.load(batch_id)?;
        if batch.cleaned_up_at.is_some() {
            return Ok(batch);
        }
        if !BatchState::CLEANABLE.contains(&batch.state.state_type()) {
            return Err(OrchestratorError::InvalidState {
                id: batch.id.clone(),
                message: format!(
                    "ingestion data of a {} batch cannot be removed",
                    batch.state.state_type()
                ),
            });
        }
        self.remove_ingestion(&batch, requested_by).await
    }

    /// Remove ingestion collections of unsuccessful batches that ended more
    /// than `ingestion_retention_secs` before `now`. Returns how many were removed.
    pub async fn cleanup_sweep(&self, now: DateTime<Utc>) -> Result<usize, OrchestratorError> {
        let cutoff = chrono::Duration::from_std(self.config.ingestion_retention())
            .ok()
            .and_then(|retention| now.checked_sub_signed(retention));
        let Some(cutoff) = cutoff else {
            return Ok(0);
        };

        let batches = self
            .store
            .list(&BatchFilter::new().needing_cleanup(cutoff).with_limit(SWEEP_PAGE))?;

        let mut removed = 0;
        for batch in batches {
            match self.remove_ingestion(&batch, SYSTEM_ACTOR).await {
                Ok(_) => removed += 1,
                Err(OrchestratorError::Storage(e)) => {
                    warn!(batch_id = %batch.id, error = %e, "Failed to remove ingestion collection");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(removed)
    }

    /// Operator cancellation.
    ///
    /// Sets the flag, then tries to move the batch to `Cancelled` directly. If
    /// a worker keeps winning the race, the flag makes its next handler do it.
    pub async fn cancel_batch(
        &self,
        batch_id: &str,
        requested_by: &str,
        reason: Option<String>,
    ) -> Result<Batch, OrchestratorError> {
        let batch = self.store.load(batch_id)?;
        if batch.state.is_terminal() {
            return Err(OrchestratorError::InvalidState {
                id: batch.id.clone(),
                message: format!("batch is already {}", batch.state.state_type()),
            });
        }

        self.store.request_cancel(batch_id)?;
        self.emit(AuditEvent::CancellationRequested {
            entity_type: AuditSubject::Batch,
            entity_id: batch_id.to_string(),
            requested_by: requested_by.to_string(),
            reason: reason.clone(),
        })
        .await;

        for _ in 0..=self.config.conflict_retries {
            let current = self.store.load(batch_id)?;
            if current.state.is_terminal() {
                return Ok(current);
            }
            let next = BatchState::Cancelled {
                cancelled_by: requested_by.to_string(),
                reason: reason.clone(),
                cancelled_at: Utc::now(),
            };
            match self.transition(&current, next).await {
                Ok(cancelled) => {
                    self.abandon_pending_job(batch_id)?;
                    return Ok(cancelled);
                }
                Err(e) if e.is_conflict() => continue,
                Err(e) => return Err(e),
            }
        }

        info!(batch_id = %batch_id, "Cancellation deferred to the next handler");
        Ok(self.store.load(batch_id)?)
    }

    /// Retries for `kind` ran out. Submission gets its own terminal state.
    pub async fn on_exhausted(
        &self,
        kind: TaskKind,
        batch_id: &str,
        error: &str,
        attempts: u32,
    ) -> Result<(), OrchestratorError> {
        self.fail_with(batch_id, |batch| match (kind, &batch.state) {
            (TaskKind::SubmitQc, BatchState::Staged) => BatchState::SubmissionFailed {
                error: error.to_string(),
                attempts,
                failed_at: Utc::now(),
            },
            _ => BatchState::Failed {
                error: format!("{} failed after {} attempts: {}", kind, attempts, error),
                failed_at: Utc::now(),
            },
        })
        .await
    }

    /// A non-retryable error; record it on the batch.
    pub async fn on_failed(&self, batch_id: &str, error: &str) -> Result<(), OrchestratorError> {
        self.fail_with(batch_id, |_| BatchState::Failed {
            error: error.to_string(),
            failed_at: Utc::now(),
        })
        .await
    }

    async fn fail_with<F>(&self, batch_id: &str, next: F) -> Result<(), OrchestratorError>
    where
        F: Fn(&Batch) -> BatchState,
    {
        for _ in 0..=self.config.conflict_retries {
            let batch = self.store.load(batch_id)?;
            if batch.state.is_terminal() {
                return Ok(());
            }
            match self.transition(&batch, next(&batch)).await {
                Ok(_) => {
                    self.abandon_pending_job(batch_id)?;
                    return Ok(());
                }
                Err(e) if e.is_conflict() => continue,
                Err(e) => return Err(e),
            }
        }
        warn!(batch_id = %batch_id, "Could not record failure, state kept changing");
        Ok(())
    }

    async fn remove_ingestion(
        &self,
        batch: &Batch,
        removed_by: &str,
    ) -> Result<Batch, OrchestratorError> {
        if let Err(e) = self.storage.remove_collection(&batch.ingestion_path).await {
            metrics::INGESTION_CLEANUPS.with_label_values(&["error"]).inc();
            return Err(e.into());
        }
        let cleaned = self.store.mark_cleaned_up(&batch.id, Utc::now())?;
        metrics::INGESTION_CLEANUPS.with_label_values(&["removed"]).inc();
        info!(
            batch_id = %batch.id,
            path = %batch.ingestion_path,
            removed_by,
            "Ingestion collection removed"
        );
        self.emit(AuditEvent::BatchCleanedUp {
            batch_id: batch.id.clone(),
            ingestion_path: batch.ingestion_path.clone(),
            removed_by: removed_by.to_string(),
        })
        .await;
        Ok(cleaned)
    }

    /// Compare the ingestion collection with the submitted manifest.
    /// Returns the first discrepancy; batches without a manifest pass.
    async fn integrity_problem(&self, batch: &Batch) -> Result<Option<String>, OrchestratorError> {
        let Some(ref manifest) = batch.manifest else {
            return Ok(None);
        };
        let found = self.storage.list_files(&batch.ingestion_path).await?;
        match manifest.verify(&found) {
            Ok(()) => {
                metrics::INTEGRITY_CHECKS.with_label_values(&["verified"]).inc();
                debug!(
                    batch_id = %batch.id,
                    files = found.len(),
                    bytes = manifest.total_bytes(),
                    "Ingestion data matches manifest"
                );
                Ok(None)
            }
            Err(problem) => {
                metrics::INTEGRITY_CHECKS.with_label_values(&["mismatch"]).inc();
                Ok(Some(problem))
            }
        }
    }

    fn should_auto_approve(&self, batch: &Batch) -> bool {
        if !self.auth.auto_approve {
            return false;
        }
        match self.auth.auto_approve_scope {
            AutoApproveScope::Batch => batch.submitter_privileged,
            AutoApproveScope::Submission => self.registry.is_privileged(&batch.submitted_by),
        }
    }

    /// Returns true when the batch needs no further work.
    async fn settle_if_cancelled(&self, batch: &Batch) -> Result<bool, OrchestratorError> {
        if batch.state.is_terminal() {
            return Ok(true);
        }
        if !batch.cancel_requested {
            return Ok(false);
        }

        self.transition(
            batch,
            BatchState::Cancelled {
                cancelled_by: SYSTEM_ACTOR.to_string(),
                reason: Some("cancellation requested".to_string()),
                cancelled_at: Utc::now(),
            },
        )
        .await?;
        self.abandon_pending_job(&batch.id)?;
        Ok(true)
    }

    fn abandon_pending_job(&self, batch_id: &str) -> Result<(), OrchestratorError> {
        if let Some(job) = self.store.pending_qc_job(batch_id)? {
            self.store
                .finish_qc_job(&job.id, QcJobResult::Abandoned, None, Some("batch closed"))?;
        }
        Ok(())
    }

    async fn record_submitted(&self, batch: &Batch, job: &QcJob) -> Result<Transition, OrchestratorError> {
        let backend_job_id =
            job.backend_job_id
                .clone()
                .ok_or_else(|| OrchestratorError::Inconsistent {
                    id: batch.id.clone(),
                    message: format!("QC job {} has no backend id", job.id),
                })?;

        self.transition(
            batch,
            BatchState::QcSubmitted {
                job_id: job.id.clone(),
                backend_job_id: backend_job_id.clone(),
                submitted_at: job.submitted_at,
            },
        )
        .await?;

        self.emit(AuditEvent::QcJobSubmitted {
            batch_id: batch.id.clone(),
            job_id: job.id.clone(),
            backend_job_id,
        })
        .await;

        self.queue
            .enqueue_after(
                Task::new(TaskKind::PollQc, &batch.id),
                self.config.qc_poll_interval(),
            )
            .await?;
        Ok(Transition::Done)
    }

    async fn record_pass(&self, batch: &Batch, job: &QcJob) -> Result<Transition, OrchestratorError> {
        self.transition(
            batch,
            BatchState::QcPassed {
                artifact_path: job.artifact_path.clone(),
                auto_approved: false,
                passed_at: job.finished_at.unwrap_or_else(Utc::now),
            },
        )
        .await?;
        self.enqueue(TaskKind::PromoteBatch, &batch.id).await?;
        Ok(Transition::Done)
    }

    async fn record_fail(&self, batch: &Batch, job: &QcJob) -> Result<Transition, OrchestratorError> {
        let failed = self
            .transition(
                batch,
                BatchState::QcFailed {
                    artifact_path: job.artifact_path.clone(),
                    reason: job
                        .reason
                        .clone()
                        .unwrap_or_else(|| "QC reported failure".to_string()),
                    failed_at: job.finished_at.unwrap_or_else(Utc::now),
                },
            )
            .await?;
        self.reject_failed(&failed).await?;
        Ok(Transition::Done)
    }

    /// `QcFailed -> Rejected`, keeping the artifact.
    async fn reject_failed(&self, batch: &Batch) -> Result<(), OrchestratorError> {
        if let BatchState::QcFailed {
            artifact_path,
            reason,
            ..
        } = &batch.state
        {
            self.transition(
                batch,
                BatchState::Rejected {
                    artifact_path: artifact_path.clone(),
                    reason: reason.clone(),
                    rejected_at: Utc::now(),
                },
            )
            .await?;
        }
        Ok(())
    }

    async fn transition(&self, batch: &Batch, next: BatchState) -> Result<Batch, OrchestratorError> {
        let from = batch.state.state_type();
        let updated = advance(self.store.as_ref(), batch, next)?;
        let to = updated.state.state_type();

        metrics::BATCH_TRANSITIONS.with_label_values(&[to]).inc();
        info!(batch_id = %batch.id, from, to, "Batch state changed");
        self.emit(AuditEvent::BatchStateChanged {
            batch_id: batch.id.clone(),
            from_state: from.to_string(),
            to_state: to.to_string(),
            reason: updated.state.failure_reason().map(str::to_string),
        })
        .await;

        Ok(updated)
    }

    async fn enqueue(&self, kind: TaskKind, batch_id: &str) -> Result<(), OrchestratorError> {
        self.queue.enqueue(Task::new(kind, batch_id)).await?;
        Ok(())
    }

    async fn emit_result(&self, batch: &Batch, job: &QcJob) {
        self.emit(AuditEvent::QcResultRecorded {
            batch_id: batch.id.clone(),
            job_id: job.id.clone(),
            result: job.result.as_str().to_string(),
            artifact_path: job.artifact_path.clone(),
        })
        .await;
    }

    async fn emit(&self, event: AuditEvent) {
        if let Some(ref audit) = self.audit {
            audit.emit(event).await;
        }
    }
}
