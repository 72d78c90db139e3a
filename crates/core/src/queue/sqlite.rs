use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;
use uuid::Uuid;

use super::{Delivery, QueueError, Task, TaskKind, TaskQueue};

/// SQLite-backed task queue. Times are stored as unix milliseconds.
pub struct SqliteTaskQueue {
    conn: Mutex<Connection>,
    visibility_timeout: Duration,
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn ms(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}

impl SqliteTaskQueue {
    pub fn new(path: &Path, visibility_timeout: Duration) -> Result<Self, QueueError> {
        let conn = Connection::open(path).map_err(QueueError::db)?;
        Self::with_connection(conn, visibility_timeout)
    }

    pub fn in_memory(visibility_timeout: Duration) -> Result<Self, QueueError> {
        let conn = Connection::open_in_memory().map_err(QueueError::db)?;
        Self::with_connection(conn, visibility_timeout)
    }

    fn with_connection(conn: Connection, visibility_timeout: Duration) -> Result<Self, QueueError> {
        conn.busy_timeout(Duration::from_secs(5))
            .map_err(QueueError::db)?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                kind TEXT NOT NULL,
                entity_id TEXT NOT NULL,
                attempts INTEGER NOT NULL DEFAULT 0,
                available_at INTEGER NOT NULL,
                leased_until INTEGER,
                lease TEXT,
                created_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_tasks_available ON tasks(available_at);
            CREATE INDEX IF NOT EXISTS idx_tasks_entity ON tasks(kind, entity_id);
            "#,
        )
        .map_err(QueueError::db)?;

        Ok(Self {
            conn: Mutex::new(conn),
            visibility_timeout,
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, QueueError> {
        self.conn
            .lock()
            .map_err(|_| QueueError::Database("connection mutex poisoned".to_string()))
    }

    /// Release a lease, setting the attempt counter to `attempts`.
    fn release(&self, delivery: &Delivery, delay: Duration, attempts: u32) -> Result<(), QueueError> {
        let conn = self.lock()?;
        let updated = conn
            .execute(
                "UPDATE tasks SET attempts = ?, available_at = ?, leased_until = NULL, lease = NULL
                 WHERE id = ? AND lease = ?",
                params![attempts, now_ms() + ms(delay), delivery.id, delivery.lease],
            )
            .map_err(QueueError::db)?;

        if updated == 0 {
            debug!(task_id = delivery.id, kind = %delivery.task.kind, "Lease lost before release");
        }
        Ok(())
    }
}

#[async_trait]
impl TaskQueue for SqliteTaskQueue {
    async fn enqueue_after(&self, task: Task, delay: Duration) -> Result<(), QueueError> {
        let mut conn = self.lock()?;
        let now = now_ms();
        let available_at = now + ms(delay);
        let tx = conn.transaction().map_err(QueueError::db)?;

        let waiting: Option<(i64, i64)> = tx
            .query_row(
                "SELECT id, available_at FROM tasks
                 WHERE kind = ? AND entity_id = ? AND lease IS NULL
                 ORDER BY available_at ASC LIMIT 1",
                params![task.kind.as_str(), task.entity_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(QueueError::db)?;

        match waiting {
            Some((id, existing_at)) => {
                if available_at < existing_at {
                    tx.execute(
                        "UPDATE tasks SET available_at = ? WHERE id = ?",
                        params![available_at, id],
                    )
                    .map_err(QueueError::db)?;
                }
            }
            None => {
                tx.execute(
                    "INSERT INTO tasks (kind, entity_id, attempts, available_at, created_at) VALUES (?, ?, 0, ?, ?)",
                    params![task.kind.as_str(), task.entity_id, available_at, now],
                )
                .map_err(QueueError::db)?;
            }
        }

        tx.commit().map_err(QueueError::db)
    }

    async fn consume(&self) -> Result<Option<Delivery>, QueueError> {
        let mut conn = self.lock()?;
        let now = now_ms();
        let tx = conn.transaction().map_err(QueueError::db)?;

        let row: Option<(i64, String, String, u32)> = tx
            .query_row(
                "SELECT id, kind, entity_id, attempts FROM tasks
                 WHERE available_at <= ?1 AND (leased_until IS NULL OR leased_until <= ?1)
                 ORDER BY available_at ASC, id ASC LIMIT 1",
                params![now],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()
            .map_err(QueueError::db)?;

        let Some((id, kind, entity_id, attempts)) = row else {
            return Ok(None);
        };

        let lease = Uuid::new_v4().to_string();
        tx.execute(
            "UPDATE tasks SET lease = ?, leased_until = ? WHERE id = ?",
            params![lease, now + ms(self.visibility_timeout), id],
        )
        .map_err(QueueError::db)?;
        tx.commit().map_err(QueueError::db)?;

        let kind = match TaskKind::parse(&kind) {
            Ok(kind) => kind,
            Err(e) => {
                // Unknown rows can never be handled; drop them.
                conn.execute("DELETE FROM tasks WHERE id = ?", params![id])
                    .map_err(QueueError::db)?;
                return Err(e);
            }
        };

        Ok(Some(Delivery {
            id,
            task: Task { kind, entity_id },
            attempts,
            lease,
        }))
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let conn = self.lock()?;
        let deleted = conn
            .execute(
                "DELETE FROM tasks WHERE id = ? AND lease = ?",
                params![delivery.id, delivery.lease],
            )
            .map_err(QueueError::db)?;

        if deleted == 0 {
            debug!(task_id = delivery.id, kind = %delivery.task.kind, "Lease lost before ack");
        }
        Ok(())
    }

    async fn retry(&self, delivery: &Delivery, delay: Duration) -> Result<(), QueueError> {
        self.release(delivery, delay, delivery.attempts + 1)
    }

    async fn reschedule(&self, delivery: &Delivery, delay: Duration) -> Result<(), QueueError> {
        self.release(delivery, delay, delivery.attempts)
    }

    async fn renew(&self, delivery: &Delivery, delay: Duration) -> Result<(), QueueError> {
        self.release(delivery, delay, 0)
    }

    async fn pending_count(&self) -> Result<u64, QueueError> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM tasks", [], |row| row.get(0))
            .map_err(QueueError::db)?;
        Ok(count as u64)
    }
}
