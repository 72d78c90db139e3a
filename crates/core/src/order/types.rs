use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::lifecycle::{Lifecycle, LifecycleState};
use crate::storage::DownloadTicket;

/// A request to retrieve archived items through a download ticket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub requested_by: String,
    /// Item paths relative to the production collection.
    pub items: Vec<String>,
    /// Collection the items are staged into.
    pub staging_path: String,
    pub state: OrderState,
    pub cancel_requested: bool,
    /// Set when this order re-stages the items of an expired one.
    pub restaged_from: Option<String>,
    pub created_at: DateTime<Utc>,
    pub terminal_at: Option<DateTime<Utc>>,
    /// When the staging collection was removed by the cleanup sweep.
    pub cleaned_up_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// The issued ticket, while one is live.
    pub fn ticket(&self) -> Option<&DownloadTicket> {
        match &self.state {
            OrderState::TicketIssued { ticket, .. } => Some(ticket),
            _ => None,
        }
    }
}

impl Lifecycle for Order {
    type State = OrderState;

    fn id(&self) -> &str {
        &self.id
    }

    fn state(&self) -> &OrderState {
        &self.state
    }

    fn cancel_requested(&self) -> bool {
        self.cancel_requested
    }
}

/// Order lifecycle.
///
/// ```text
/// Requested -> Staged -> TicketIssued -> Fulfilled
///     |                      \-> Expired
///     \-> Invalid (an item is missing from production)
/// ```
/// Any non-terminal state may also move to `Failed` or `Cancelled`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderState {
    Requested,
    Staged {
        staging_path: String,
        staged_at: DateTime<Utc>,
    },
    TicketIssued {
        staging_path: String,
        ticket: DownloadTicket,
        issued_at: DateTime<Utc>,
    },
    Fulfilled {
        staging_path: String,
        fulfilled_at: DateTime<Utc>,
    },
    Expired {
        staging_path: String,
        expired_at: DateTime<Utc>,
    },
    Invalid {
        missing_path: String,
        reason: String,
        failed_at: DateTime<Utc>,
    },
    Failed {
        error: String,
        failed_at: DateTime<Utc>,
    },
    Cancelled {
        cancelled_by: String,
        reason: Option<String>,
        cancelled_at: DateTime<Utc>,
    },
}

impl OrderState {
    /// States whose staging collection the cleanup sweep may remove.
    pub const CLEANABLE: [&'static str; 5] =
        ["expired", "fulfilled", "cancelled", "invalid", "failed"];
}

impl LifecycleState for OrderState {
    fn state_type(&self) -> &'static str {
        match self {
            OrderState::Requested => "requested",
            OrderState::Staged { .. } => "staged",
            OrderState::TicketIssued { .. } => "ticket_issued",
            OrderState::Fulfilled { .. } => "fulfilled",
            OrderState::Expired { .. } => "expired",
            OrderState::Invalid { .. } => "invalid",
            OrderState::Failed { .. } => "failed",
            OrderState::Cancelled { .. } => "cancelled",
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderState::Fulfilled { .. }
                | OrderState::Expired { .. }
                | OrderState::Invalid { .. }
                | OrderState::Failed { .. }
                | OrderState::Cancelled { .. }
        )
    }

    fn can_transition_to(&self, next: &Self) -> bool {
        use OrderState::*;

        if self.is_terminal() {
            return false;
        }
        if matches!(next, Failed { .. } | Cancelled { .. }) {
            return true;
        }
        matches!(
            (self, next),
            (Requested, Staged { .. })
                | (Requested, Invalid { .. })
                | (Staged { .. }, TicketIssued { .. })
                | (TicketIssued { .. }, Fulfilled { .. })
                | (TicketIssued { .. }, Expired { .. })
        )
    }

    fn failure_reason(&self) -> Option<&str> {
        match self {
            OrderState::Invalid { reason, .. } => Some(reason),
            OrderState::Failed { error, .. } => Some(error),
            OrderState::Cancelled { reason, .. } => reason.as_deref(),
            _ => None,
        }
    }
}

/// Request to record a new order.
#[derive(Debug, Clone)]
pub struct CreateOrderRequest {
    pub order_id: String,
    pub requested_by: String,
    pub items: Vec<String>,
}

/// Filter for listing orders.
#[derive(Debug, Clone)]
pub struct OrderFilter {
    pub state: Option<String>,
    pub requested_by: Option<String>,
    /// Only terminal orders whose staging collection is still present.
    pub needs_cleanup: bool,
    pub limit: i64,
    pub offset: i64,
}

impl Default for OrderFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderFilter {
    pub fn new() -> Self {
        Self {
            state: None,
            requested_by: None,
            needs_cleanup: false,
            limit: 100,
            offset: 0,
        }
    }

    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    pub fn with_requested_by(mut self, requested_by: impl Into<String>) -> Self {
        self.requested_by = Some(requested_by.into());
        self
    }

    pub fn needing_cleanup(mut self) -> Self {
        self.needs_cleanup = true;
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}
