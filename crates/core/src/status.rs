//! Read-only operator view of batches and orders.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::batch::{Batch, BatchFilter, BatchStore, QcJob};
use crate::lifecycle::{Lifecycle, LifecycleState, StoreError, TransitionRecord};
use crate::order::{Order, OrderFilter, OrderStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Batch,
    Order,
}

/// Current state of one batch or order plus how it got there.
#[derive(Debug, Clone, Serialize)]
pub struct EntityStatus {
    pub id: String,
    pub kind: EntityKind,
    pub state_type: String,
    /// Full state payload (artifact paths, tickets, reasons).
    pub state: serde_json::Value,
    pub terminal: bool,
    pub cancel_requested: bool,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub terminal_at: Option<DateTime<Utc>>,
    pub history: Vec<TransitionRecord>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub qc_jobs: Vec<QcJob>,
}

pub struct StatusService {
    batches: Arc<dyn BatchStore>,
    orders: Arc<dyn OrderStore>,
}

impl StatusService {
    pub fn new(batches: Arc<dyn BatchStore>, orders: Arc<dyn OrderStore>) -> Self {
        Self { batches, orders }
    }

    pub fn batch_status(&self, id: &str) -> Result<Option<EntityStatus>, StoreError> {
        let Some(batch) = self.batches.get(id)? else {
            return Ok(None);
        };
        let history = self.batches.history(id)?;
        let qc_jobs = self.batches.list_qc_jobs(id)?;

        let mut status = Self::build(
            EntityKind::Batch,
            &batch,
            history,
            batch.created_at,
            batch.updated_at,
            batch.terminal_at,
        );
        status.qc_jobs = qc_jobs;
        Ok(Some(status))
    }

    pub fn order_status(&self, id: &str) -> Result<Option<EntityStatus>, StoreError> {
        let Some(order) = self.orders.get(id)? else {
            return Ok(None);
        };
        let history = self.orders.history(id)?;
        Ok(Some(Self::build(
            EntityKind::Order,
            &order,
            history,
            order.created_at,
            order.updated_at,
            order.terminal_at,
        )))
    }

    pub fn list_batches(&self, filter: &BatchFilter) -> Result<(Vec<Batch>, i64), StoreError> {
        Ok((self.batches.list(filter)?, self.batches.count(filter)?))
    }

    pub fn list_orders(&self, filter: &OrderFilter) -> Result<(Vec<Order>, i64), StoreError> {
        Ok((self.orders.list(filter)?, self.orders.count(filter)?))
    }

    fn build<E: Lifecycle>(
        kind: EntityKind,
        entity: &E,
        history: Vec<TransitionRecord>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
        terminal_at: Option<DateTime<Utc>>,
    ) -> EntityStatus {
        let state = entity.state();
        EntityStatus {
            id: entity.id().to_string(),
            kind,
            state_type: state.state_type().to_string(),
            state: serde_json::to_value(state).unwrap_or(serde_json::Value::Null),
            terminal: state.is_terminal(),
            cancel_requested: entity.cancel_requested(),
            failure_reason: state.failure_reason().map(str::to_string),
            created_at,
            updated_at,
            terminal_at,
            history,
            qc_jobs: Vec::new(),
        }
    }
}
