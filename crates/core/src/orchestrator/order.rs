//! Order lifecycle handlers: staging, download tickets, expiry and cleanup.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use tracing::{debug, info, warn};

use crate::audit::{AuditEvent, AuditHandle, AuditSubject};
use crate::lifecycle::{advance, LifecycleState, LifecycleStore};
use crate::metrics;
use crate::order::{CreateOrderRequest, Order, OrderFilter, OrderState, OrderStore};
use crate::queue::{Task, TaskKind, TaskQueue};
use crate::storage::{CollectionLayout, DownloadTicket, StorageError, StorageGateway};

use super::config::OrchestratorConfig;
use super::types::{OrchestratorError, Transition};
use super::validation::{validate_identifier, validate_identity, validate_item};

const SYSTEM_ACTOR: &str = "system";
const SWEEP_PAGE: i64 = 100;

/// Expiry tasks run a little after the deadline, since expiry is strict.
const EXPIRY_GRACE: Duration = Duration::from_secs(1);

pub struct OrderOrchestrator {
    config: OrchestratorConfig,
    store: Arc<dyn OrderStore>,
    storage: Arc<dyn StorageGateway>,
    queue: Arc<dyn TaskQueue>,
    layout: CollectionLayout,
    audit: Option<AuditHandle>,
}

impl OrderOrchestrator {
    pub fn new(
        config: OrchestratorConfig,
        store: Arc<dyn OrderStore>,
        storage: Arc<dyn StorageGateway>,
        queue: Arc<dyn TaskQueue>,
    ) -> Self {
        Self {
            config,
            store,
            storage,
            queue,
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

    pub fn store(&self) -> &Arc<dyn OrderStore> {
        &self.store
    }

    /// Record a new order and queue its staging.
    pub async fn create_order(&self, request: CreateOrderRequest) -> Result<Order, OrchestratorError> {
        self.insert_order(request, None).await
    }

    /// Start a fresh staging cycle for the items of a finished order.
    pub async fn restage(
        &self,
        order_id: &str,
        new_order_id: &str,
        requested_by: &str,
    ) -> Result<Order, OrchestratorError> {
        let previous = self.store.load(order_id)?;
        if !matches!(
            previous.state,
            OrderState::Expired { .. } | OrderState::Fulfilled { .. }
        ) {
            return Err(OrchestratorError::InvalidState {
                id: previous.id.clone(),
                message: format!(
                    "only expired or fulfilled orders can be restaged, order is {}",
                    previous.state.state_type()
                ),
            });
        }

        let request = CreateOrderRequest {
            order_id: new_order_id.to_string(),
            requested_by: requested_by.to_string(),
            items: previous.items.clone(),
        };
        self.insert_order(request, Some(&previous.id)).await
    }

    async fn insert_order(
        &self,
        request: CreateOrderRequest,
        restaged_from: Option<&str>,
    ) -> Result<Order, OrchestratorError> {
        validate_identifier("order", &request.order_id)?;
        validate_identity(&request.requested_by)?;
        if request.items.is_empty() {
            return Err(OrchestratorError::InvalidRequest(
                "order must name at least one item".to_string(),
            ));
        }
        for item in &request.items {
            validate_item(item)?;
        }

        let staging_path = self.layout.order_path(&request.order_id);
        let order = self.store.create(&request, &staging_path, restaged_from)?;

        info!(
            order_id = %order.id,
            requested_by = %order.requested_by,
            items = order.items.len(),
            restaged_from = ?restaged_from,
            "Order created"
        );
        self.emit(AuditEvent::OrderCreated {
            order_id: order.id.clone(),
            requested_by: order.requested_by.clone(),
            item_count: order.items.len(),
        })
        .await;

        self.queue
            .enqueue(Task::new(TaskKind::StageOrder, &order.id))
            .await?;
        Ok(order)
    }

    /// `Requested -> Staged`: copy every item out of production.
    pub async fn handle_stage(&self, order_id: &str) -> Result<Transition, OrchestratorError> {
        let order = self.store.load(order_id)?;
        if self.settle_if_cancelled(&order).await? {
            return Ok(Transition::Done);
        }

        match &order.state {
            OrderState::Requested => {}
            OrderState::Staged { .. } => {
                self.enqueue(TaskKind::IssueTicket, &order.id, Duration::ZERO)
                    .await?;
                return Ok(Transition::Done);
            }
            OrderState::TicketIssued { ticket, .. } => {
                self.schedule_expiry(&order.id, ticket).await?;
                return Ok(Transition::Done);
            }
            _ => return Ok(Transition::Done),
        }

        self.storage.create_collection(&order.staging_path).await?;

        let copies = order.items.iter().map(|item| {
            let src = self.layout.production_item(item);
            let dst = order.staging_path.as_str();
            async move { self.storage.copy_entry(&src, dst).await }
        });

        match try_join_all(copies).await {
            Ok(_) => {}
            Err(StorageError::NotFound(missing_path)) => {
                warn!(order_id = %order.id, missing = %missing_path, "Ordered item missing");
                self.transition(
                    &order,
                    OrderState::Invalid {
                        reason: format!("ordered item not found: {}", missing_path),
                        missing_path,
                        failed_at: Utc::now(),
                    },
                )
                .await?;
                return Ok(Transition::Done);
            }
            Err(e) => return Err(e.into()),
        }
        metrics::ITEMS_STAGED.inc_by(order.items.len() as u64);

        self.transition(
            &order,
            OrderState::Staged {
                staging_path: order.staging_path.clone(),
                staged_at: Utc::now(),
            },
        )
        .await?;
        self.enqueue(TaskKind::IssueTicket, &order.id, Duration::ZERO)
            .await?;
        Ok(Transition::Done)
    }

    /// `Staged -> TicketIssued`. Never runs before staging succeeded.
    pub async fn handle_issue_ticket(&self, order_id: &str) -> Result<Transition, OrchestratorError> {
        let order = self.store.load(order_id)?;
        if self.settle_if_cancelled(&order).await? {
            return Ok(Transition::Done);
        }

        let staging_path = match &order.state {
            OrderState::Staged { staging_path, .. } => staging_path.clone(),
            OrderState::TicketIssued { ticket, .. } => {
                self.schedule_expiry(&order.id, ticket).await?;
                return Ok(Transition::Done);
            }
            _ => return Ok(Transition::Done),
        };

        let ticket = self
            .storage
            .issue_ticket(&staging_path, self.config.ticket_ttl())
            .await?;

        self.transition(
            &order,
            OrderState::TicketIssued {
                staging_path: staging_path.clone(),
                ticket: ticket.clone(),
                issued_at: ticket.issued_at,
            },
        )
        .await?;

        metrics::TICKETS_ISSUED.inc();
        self.emit(AuditEvent::DownloadTicketIssued {
            order_id: order.id.clone(),
            staging_path,
            expires_at: ticket.expires_at,
        })
        .await;

        self.schedule_expiry(&order.id, &ticket).await?;
        Ok(Transition::Done)
    }

    /// `TicketIssued -> Expired` once the ticket is past its expiry.
    pub async fn handle_expire(&self, order_id: &str) -> Result<Transition, OrchestratorError> {
        let order = self.store.load(order_id)?;
        if self.settle_if_cancelled(&order).await? {
            return Ok(Transition::Done);
        }

        let now = Utc::now();
        match &order.state {
            OrderState::TicketIssued { ticket, .. } if !ticket.is_expired_at(now) => {
                Ok(Transition::Reschedule(Self::until_expired(ticket, now)))
            }
            OrderState::TicketIssued { .. } => {
                self.expire(&order, now).await?;
                Ok(Transition::Done)
            }
            _ => Ok(Transition::Done),
        }
    }

    /// Expire the order if its ticket is past due at `now`.
    ///
    /// Returns the order as stored afterwards.
    pub async fn check_expiry(&self, order_id: &str, now: DateTime<Utc>) -> Result<Order, OrchestratorError> {
        for _ in 0..=self.config.conflict_retries {
            let order = self.store.load(order_id)?;
            let due = order.ticket().is_some_and(|t| t.is_expired_at(now));
            if !due {
                return Ok(order);
            }
            match self.expire(&order, now).await {
                Ok(expired) => return Ok(expired),
                Err(e) if e.is_conflict() => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(self.store.load(order_id)?)
    }

    /// The consumer finished downloading.
    ///
    /// A ticket that has already expired yields `Expired` instead.
    pub async fn confirm_fulfilled(&self, order_id: &str, now: DateTime<Utc>) -> Result<Order, OrchestratorError> {
        let order = self.store.load(order_id)?;
        match &order.state {
            OrderState::Fulfilled { .. } | OrderState::Expired { .. } => Ok(order),
            OrderState::TicketIssued { ticket, .. } if ticket.is_expired_at(now) => {
                self.expire(&order, now).await
            }
            OrderState::TicketIssued { staging_path, .. } => {
                self.transition(
                    &order,
                    OrderState::Fulfilled {
                        staging_path: staging_path.clone(),
                        fulfilled_at: now,
                    },
                )
                .await
            }
            other => Err(OrchestratorError::InvalidState {
                id: order.id.clone(),
                message: format!("no ticket has been issued, order is {}", other.state_type()),
            }),
        }
    }

    /// Expire every order whose ticket is past due at `now`. Returns how many moved.
    pub async fn expire_due(&self, now: DateTime<Utc>) -> Result<usize, OrchestratorError> {
        let mut due = Vec::new();
        let mut offset = 0;
        loop {
            let page = self.store.list(
                &OrderFilter::new()
                    .with_state("ticket_issued")
                    .with_limit(SWEEP_PAGE)
                    .with_offset(offset),
            )?;
            let page_len = page.len() as i64;
            due.extend(
                page.into_iter()
                    .filter(|order| order.ticket().is_some_and(|t| t.is_expired_at(now))),
            );
            if page_len < SWEEP_PAGE {
                break;
            }
            offset += page_len;
        }

        let mut expired = 0;
        for order in due {
            match self.expire(&order, now).await {
                Ok(_) => expired += 1,
                Err(e) if e.is_conflict() => {
                    debug!(order_id = %order.id, "Order changed during expiry sweep");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(expired)
    }

    /// Remove staging collections of finished orders. Returns how many were removed.
    pub async fn cleanup_sweep(&self) -> Result<usize, OrchestratorError> {
        let orders = self
            .store
            .list(&OrderFilter::new().needing_cleanup().with_limit(SWEEP_PAGE))?;

        let mut removed = 0;
        for order in orders {
            if let Err(e) = self.storage.remove_collection(&order.staging_path).await {
                metrics::STAGING_CLEANUPS.with_label_values(&["error"]).inc();
                warn!(order_id = %order.id, error = %e, "Failed to remove staging collection");
                continue;
            }
            self.store.mark_cleaned_up(&order.id, Utc::now())?;
            metrics::STAGING_CLEANUPS.with_label_values(&["removed"]).inc();
            info!(order_id = %order.id, path = %order.staging_path, "Staging collection removed");
            self.emit(AuditEvent::OrderCleanedUp {
                order_id: order.id.clone(),
                staging_path: order.staging_path.clone(),
            })
            .await;
            removed += 1;
        }
        Ok(removed)
    }

    pub async fn cancel_order(
        &self,
        order_id: &str,
        requested_by: &str,
        reason: Option<String>,
    ) -> Result<Order, OrchestratorError> {
        let order = self.store.load(order_id)?;
        if order.state.is_terminal() {
            return Err(OrchestratorError::InvalidState {
                id: order.id.clone(),
                message: format!("order is already {}", order.state.state_type()),
            });
        }

        self.store.request_cancel(order_id)?;
        self.emit(AuditEvent::CancellationRequested {
            entity_type: AuditSubject::Order,
            entity_id: order_id.to_string(),
            requested_by: requested_by.to_string(),
            reason: reason.clone(),
        })
        .await;

        for _ in 0..=self.config.conflict_retries {
            let current = self.store.load(order_id)?;
            if current.state.is_terminal() {
                return Ok(current);
            }
            let next = OrderState::Cancelled {
                cancelled_by: requested_by.to_string(),
                reason: reason.clone(),
                cancelled_at: Utc::now(),
            };
            match self.transition(&current, next).await {
                Ok(cancelled) => return Ok(cancelled),
                Err(e) if e.is_conflict() => continue,
                Err(e) => return Err(e),
            }
        }

        info!(order_id = %order_id, "Cancellation deferred to the next handler");
        Ok(self.store.load(order_id)?)
    }

    pub async fn on_exhausted(
        &self,
        kind: TaskKind,
        order_id: &str,
        error: &str,
        attempts: u32,
    ) -> Result<(), OrchestratorError> {
        self.fail(
            order_id,
            format!("{} failed after {} attempts: {}", kind, attempts, error),
        )
        .await
    }

    pub async fn on_failed(&self, order_id: &str, error: &str) -> Result<(), OrchestratorError> {
        self.fail(order_id, error.to_string()).await
    }

    async fn fail(&self, order_id: &str, error: String) -> Result<(), OrchestratorError> {
        for _ in 0..=self.config.conflict_retries {
            let order = self.store.load(order_id)?;
            if order.state.is_terminal() {
                return Ok(());
            }
            let next = OrderState::Failed {
                error: error.clone(),
                failed_at: Utc::now(),
            };
            match self.transition(&order, next).await {
                Ok(_) => return Ok(()),
                Err(e) if e.is_conflict() => continue,
                Err(e) => return Err(e),
            }
        }
        warn!(order_id = %order_id, "Could not record failure, state kept changing");
        Ok(())
    }

    async fn expire(&self, order: &Order, now: DateTime<Utc>) -> Result<Order, OrchestratorError> {
        self.transition(
            order,
            OrderState::Expired {
                staging_path: order.staging_path.clone(),
                expired_at: now,
            },
        )
        .await
    }

    async fn settle_if_cancelled(&self, order: &Order) -> Result<bool, OrchestratorError> {
        if order.state.is_terminal() {
            return Ok(true);
        }
        if !order.cancel_requested {
            return Ok(false);
        }
        self.transition(
            order,
            OrderState::Cancelled {
                cancelled_by: SYSTEM_ACTOR.to_string(),
                reason: Some("cancellation requested".to_string()),
                cancelled_at: Utc::now(),
            },
        )
        .await?;
        Ok(true)
    }

    async fn schedule_expiry(&self, order_id: &str, ticket: &DownloadTicket) -> Result<(), OrchestratorError> {
        let delay = Self::until_expired(ticket, Utc::now());
        self.enqueue(TaskKind::ExpireOrder, order_id, delay).await
    }

    fn until_expired(ticket: &DownloadTicket, now: DateTime<Utc>) -> Duration {
        (ticket.expires_at - now).to_std().unwrap_or_default() + EXPIRY_GRACE
    }

    async fn transition(&self, order: &Order, next: OrderState) -> Result<Order, OrchestratorError> {
        let from = order.state.state_type();
        let updated = advance(self.store.as_ref(), order, next)?;
        let to = updated.state.state_type();

        metrics::ORDER_TRANSITIONS.with_label_values(&[to]).inc();
        info!(order_id = %order.id, from, to, "Order state changed");
        self.emit(AuditEvent::OrderStateChanged {
            order_id: order.id.clone(),
            from_state: from.to_string(),
            to_state: to.to_string(),
            reason: updated.state.failure_reason().map(str::to_string),
        })
        .await;

        Ok(updated)
    }

    async fn enqueue(&self, kind: TaskKind, order_id: &str, delay: Duration) -> Result<(), OrchestratorError> {
        self.queue
            .enqueue_after(Task::new(kind, order_id), delay)
            .await?;
        Ok(())
    }

    async fn emit(&self, event: AuditEvent) {
        if let Some(ref audit) = self.audit {
            audit.emit(event).await;
        }
    }
}
