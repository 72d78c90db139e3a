use std::time::Duration;

use async_trait::async_trait;

use super::{Delivery, QueueError, Task};

#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Make a task available now. An identical task that is still waiting
    /// is reused instead of duplicated.
    async fn enqueue(&self, task: Task) -> Result<(), QueueError> {
        self.enqueue_after(task, Duration::ZERO).await
    }

    async fn enqueue_after(&self, task: Task, delay: Duration) -> Result<(), QueueError>;

    /// Lease the next available task, if any.
    async fn consume(&self) -> Result<Option<Delivery>, QueueError>;

    /// Remove a finished task.
    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError>;

    /// Release after a failure; counts as an attempt.
    async fn retry(&self, delivery: &Delivery, delay: Duration) -> Result<(), QueueError>;

    /// Release without counting an attempt (waiting on something external).
    async fn reschedule(&self, delivery: &Delivery, delay: Duration) -> Result<(), QueueError>;

    /// Release after progress; the attempt count starts over.
    async fn renew(&self, delivery: &Delivery, delay: Duration) -> Result<(), QueueError>;

    async fn pending_count(&self) -> Result<u64, QueueError>;
}
