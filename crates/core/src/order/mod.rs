//! Order records and their lifecycle states.

mod sqlite_store;
mod store;
mod types;

pub use sqlite_store::SqliteOrderStore;
pub use store::OrderStore;
pub use types::{CreateOrderRequest, Order, OrderFilter, OrderState};
