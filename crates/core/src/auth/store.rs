use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UserStoreError {
    #[error("Database error: {0}")]
    Database(String),
}

/// A persisted privileged identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PrivilegedUser {
    pub identity: String,
    pub active: bool,
    pub updated_at: DateTime<Utc>,
}

/// Durable record of which identities are privileged.
pub trait PrivilegedUserStore: Send + Sync {
    /// Insert the identity, or reactivate it if present.
    fn upsert_active(&self, identity: &str) -> Result<(), UserStoreError>;

    /// Deactivate every active identity not in `keep`. Returns how many changed.
    fn deactivate_except(&self, keep: &[&str]) -> Result<usize, UserStoreError>;

    fn get(&self, identity: &str) -> Result<Option<PrivilegedUser>, UserStoreError>;

    fn list(&self) -> Result<Vec<PrivilegedUser>, UserStoreError>;
}

/// SQLite-backed privileged user store.
pub struct SqlitePrivilegedUserStore {
    conn: Mutex<Connection>,
}

impl SqlitePrivilegedUserStore {
    pub fn new(path: &Path) -> Result<Self, UserStoreError> {
        let conn = Connection::open(path).map_err(|e| UserStoreError::Database(e.to_string()))?;
        Self::with_connection(conn)
    }

    pub fn in_memory() -> Result<Self, UserStoreError> {
        let conn =
            Connection::open_in_memory().map_err(|e| UserStoreError::Database(e.to_string()))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, UserStoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS privileged_users (
                identity TEXT PRIMARY KEY,
                active INTEGER NOT NULL DEFAULT 1,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .map_err(|e| UserStoreError::Database(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, UserStoreError> {
        self.conn
            .lock()
            .map_err(|_| UserStoreError::Database("connection mutex poisoned".to_string()))
    }

    fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<PrivilegedUser> {
        let updated_at: String = row.get(2)?;
        Ok(PrivilegedUser {
            identity: row.get(0)?,
            active: row.get(1)?,
            updated_at: DateTime::parse_from_rfc3339(&updated_at)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
        })
    }
}

impl PrivilegedUserStore for SqlitePrivilegedUserStore {
    fn upsert_active(&self, identity: &str) -> Result<(), UserStoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO privileged_users (identity, active, updated_at) VALUES (?, 1, ?)
             ON CONFLICT(identity) DO UPDATE SET active = 1, updated_at = excluded.updated_at",
            params![identity, Utc::now().to_rfc3339()],
        )
        .map_err(|e| UserStoreError::Database(e.to_string()))?;
        Ok(())
    }

    fn deactivate_except(&self, keep: &[&str]) -> Result<usize, UserStoreError> {
        let conn = self.lock()?;
        let now = Utc::now().to_rfc3339();

        let mut stmt = conn
            .prepare("SELECT identity FROM privileged_users WHERE active = 1")
            .map_err(|e| UserStoreError::Database(e.to_string()))?;
        let active: Vec<String> = stmt
            .query_map([], |row| row.get(0))
            .map_err(|e| UserStoreError::Database(e.to_string()))?
            .collect::<Result<_, _>>()
            .map_err(|e| UserStoreError::Database(e.to_string()))?;

        let mut changed = 0;
        for identity in active.iter().filter(|id| !keep.contains(&id.as_str())) {
            changed += conn
                .execute(
                    "UPDATE privileged_users SET active = 0, updated_at = ? WHERE identity = ?",
                    params![now, identity],
                )
                .map_err(|e| UserStoreError::Database(e.to_string()))?;
        }
        Ok(changed)
    }

    fn get(&self, identity: &str) -> Result<Option<PrivilegedUser>, UserStoreError> {
        let conn = self.lock()?;
        match conn.query_row(
            "SELECT identity, active, updated_at FROM privileged_users WHERE identity = ?",
            params![identity],
            Self::row_to_user,
        ) {
            Ok(user) => Ok(Some(user)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(UserStoreError::Database(e.to_string())),
        }
    }

    fn list(&self) -> Result<Vec<PrivilegedUser>, UserStoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT identity, active, updated_at FROM privileged_users ORDER BY identity")
            .map_err(|e| UserStoreError::Database(e.to_string()))?;
        let users = stmt
            .query_map([], Self::row_to_user)
            .map_err(|e| UserStoreError::Database(e.to_string()))?
            .collect::<Result<_, _>>()
            .map_err(|e| UserStoreError::Database(e.to_string()))?;
        Ok(users)
    }
}
