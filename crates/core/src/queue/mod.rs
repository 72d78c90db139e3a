//! Durable work queue driving the orchestrators.
//!
//! Delivery is at-least-once: a consumed task stays leased until it is
//! acked, retried or rescheduled, and a lease that outlives the visibility
//! timeout makes the task available to another worker.

mod sqlite;
mod traits;
mod types;

pub use sqlite::SqliteTaskQueue;
pub use traits::TaskQueue;
pub use types::{Delivery, QueueError, Task, TaskKind};
