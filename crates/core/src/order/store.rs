use chrono::{DateTime, Utc};

use super::{CreateOrderRequest, Order, OrderFilter};
use crate::lifecycle::{LifecycleStore, StoreError};

/// Persistence for orders.
pub trait OrderStore: LifecycleStore<Order> {
    /// Record a new order in `Requested`. Fails with `AlreadyExists` on id reuse.
    fn create(
        &self,
        request: &CreateOrderRequest,
        staging_path: &str,
        restaged_from: Option<&str>,
    ) -> Result<Order, StoreError>;

    fn get(&self, id: &str) -> Result<Option<Order>, StoreError>;

    fn list(&self, filter: &OrderFilter) -> Result<Vec<Order>, StoreError>;

    fn count(&self, filter: &OrderFilter) -> Result<i64, StoreError>;

    fn count_by_state(&self) -> Result<Vec<(String, i64)>, StoreError>;

    /// Record that the staging collection has been removed.
    fn mark_cleaned_up(&self, id: &str, at: DateTime<Utc>) -> Result<(), StoreError>;
}
