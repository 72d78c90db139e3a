//! SQLite-backed order store.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::{CreateOrderRequest, Order, OrderFilter, OrderState, OrderStore};
use crate::lifecycle::sqlite::{
    cas_miss, count_by_state, insert_transition, is_constraint_violation, load_transitions,
    parse_opt_ts, parse_ts, ts,
};
use crate::lifecycle::{LifecycleState, LifecycleStore, StoreError, TransitionRecord};

const ORDER_COLUMNS: &str = "id, requested_by, items, staging_path, state, cancel_requested, restaged_from, created_at, terminal_at, cleaned_up_at, updated_at";

/// SQLite-backed order store.
pub struct SqliteOrderStore {
    conn: Mutex<Connection>,
}

impl SqliteOrderStore {
    pub fn new(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(StoreError::db)?;
        Self::with_connection(conn)
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(StoreError::db)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.busy_timeout(Duration::from_secs(5))
            .map_err(StoreError::db)?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS orders (
                id TEXT PRIMARY KEY,
                requested_by TEXT NOT NULL,
                items TEXT NOT NULL,
                staging_path TEXT NOT NULL,
                state TEXT NOT NULL,
                state_type TEXT NOT NULL,
                cancel_requested INTEGER NOT NULL DEFAULT 0,
                restaged_from TEXT,
                created_at TEXT NOT NULL,
                terminal_at TEXT,
                cleaned_up_at TEXT,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_orders_state_type ON orders(state_type);
            CREATE INDEX IF NOT EXISTS idx_orders_requested_by ON orders(requested_by);

            CREATE TABLE IF NOT EXISTS order_transitions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                entity_id TEXT NOT NULL,
                from_state TEXT NOT NULL,
                to_state TEXT NOT NULL,
                reason TEXT,
                at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_order_transitions_entity ON order_transitions(entity_id);
            "#,
        )
        .map_err(StoreError::db)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("connection mutex poisoned".to_string()))
    }

    fn build_where_clause(filter: &OrderFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions: Vec<String> = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref state) = filter.state {
            conditions.push("state_type = ?".to_string());
            params.push(Box::new(state.clone()));
        }

        if let Some(ref requested_by) = filter.requested_by {
            conditions.push("requested_by = ?".to_string());
            params.push(Box::new(requested_by.clone()));
        }

        if filter.needs_cleanup {
            let placeholders = vec!["?"; OrderState::CLEANABLE.len()].join(", ");
            conditions.push(format!(
                "cleaned_up_at IS NULL AND state_type IN ({})",
                placeholders
            ));
            for name in OrderState::CLEANABLE {
                params.push(Box::new(name));
            }
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }

    fn row_to_order(row: &rusqlite::Row) -> rusqlite::Result<Order> {
        let items_json: String = row.get(2)?;
        let items: Vec<String> = serde_json::from_str(&items_json).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
        })?;
        let state_json: String = row.get(4)?;
        let state: OrderState = serde_json::from_str(&state_json).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?;
        let created_at: String = row.get(7)?;
        let updated_at: String = row.get(10)?;

        Ok(Order {
            id: row.get(0)?,
            requested_by: row.get(1)?,
            items,
            staging_path: row.get(3)?,
            state,
            cancel_requested: row.get(5)?,
            restaged_from: row.get(6)?,
            created_at: parse_ts(&created_at),
            terminal_at: parse_opt_ts(row.get(8)?),
            cleaned_up_at: parse_opt_ts(row.get(9)?),
            updated_at: parse_ts(&updated_at),
        })
    }

    fn load_order(conn: &Connection, id: &str) -> Result<Option<Order>, StoreError> {
        let sql = format!("SELECT {} FROM orders WHERE id = ?", ORDER_COLUMNS);
        conn.query_row(&sql, params![id], Self::row_to_order)
            .optional()
            .map_err(StoreError::db)
    }
}

impl LifecycleStore<Order> for SqliteOrderStore {
    fn load(&self, id: &str) -> Result<Order, StoreError> {
        let conn = self.lock()?;
        Self::load_order(&conn, id)?.ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn compare_and_swap(
        &self,
        id: &str,
        expected: &str,
        next: &OrderState,
    ) -> Result<Order, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(StoreError::db)?;

        let now = Utc::now();
        let state_json = serde_json::to_string(next).map_err(StoreError::db)?;
        let terminal_at = next.is_terminal().then(|| ts(&now));

        let changed = tx
            .execute(
                "UPDATE orders SET state = ?, state_type = ?, terminal_at = COALESCE(?, terminal_at), updated_at = ?
                 WHERE id = ? AND state_type = ?",
                params![
                    state_json,
                    next.state_type(),
                    terminal_at,
                    ts(&now),
                    id,
                    expected
                ],
            )
            .map_err(StoreError::db)?;

        if changed == 0 {
            return Err(cas_miss(&tx, "orders", id, expected));
        }

        insert_transition(
            &tx,
            "order_transitions",
            id,
            &TransitionRecord {
                from_state: expected.to_string(),
                to_state: next.state_type().to_string(),
                at: now,
                reason: next.failure_reason().map(String::from),
            },
        )?;

        let order =
            Self::load_order(&tx, id)?.ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        tx.commit().map_err(StoreError::db)?;
        Ok(order)
    }

    fn request_cancel(&self, id: &str) -> Result<Order, StoreError> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE orders SET cancel_requested = 1, updated_at = ? WHERE id = ?",
                params![ts(&Utc::now()), id],
            )
            .map_err(StoreError::db)?;
        if changed == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Self::load_order(&conn, id)?.ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn history(&self, id: &str) -> Result<Vec<TransitionRecord>, StoreError> {
        let conn = self.lock()?;
        load_transitions(&conn, "order_transitions", id)
    }
}

impl OrderStore for SqliteOrderStore {
    fn create(
        &self,
        request: &CreateOrderRequest,
        staging_path: &str,
        restaged_from: Option<&str>,
    ) -> Result<Order, StoreError> {
        let conn = self.lock()?;
        let now = Utc::now();
        let state = OrderState::Requested;
        let state_json = serde_json::to_string(&state).map_err(StoreError::db)?;
        let items_json = serde_json::to_string(&request.items).map_err(StoreError::db)?;

        conn.execute(
            "INSERT INTO orders (id, requested_by, items, staging_path, state, state_type, restaged_from, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                request.order_id,
                request.requested_by,
                items_json,
                staging_path,
                state_json,
                state.state_type(),
                restaged_from,
                ts(&now),
                ts(&now),
            ],
        )
        .map_err(|e| {
            if is_constraint_violation(&e) {
                StoreError::AlreadyExists(request.order_id.clone())
            } else {
                StoreError::db(e)
            }
        })?;

        Ok(Order {
            id: request.order_id.clone(),
            requested_by: request.requested_by.clone(),
            items: request.items.clone(),
            staging_path: staging_path.to_string(),
            state,
            cancel_requested: false,
            restaged_from: restaged_from.map(String::from),
            created_at: now,
            terminal_at: None,
            cleaned_up_at: None,
            updated_at: now,
        })
    }

    fn get(&self, id: &str) -> Result<Option<Order>, StoreError> {
        let conn = self.lock()?;
        Self::load_order(&conn, id)
    }

    fn list(&self, filter: &OrderFilter) -> Result<Vec<Order>, StoreError> {
        let conn = self.lock()?;
        let (where_clause, params) = Self::build_where_clause(filter);

        let sql = format!(
            "SELECT {} FROM orders {} ORDER BY created_at ASC, id ASC LIMIT ? OFFSET ?",
            ORDER_COLUMNS, where_clause
        );
        let mut stmt = conn.prepare(&sql).map_err(StoreError::db)?;

        let mut all_params: Vec<Box<dyn rusqlite::ToSql>> = params;
        all_params.push(Box::new(filter.limit));
        all_params.push(Box::new(filter.offset));
        let param_refs: Vec<&dyn rusqlite::ToSql> = all_params.iter().map(|p| p.as_ref()).collect();

        let rows = stmt
            .query_map(param_refs.as_slice(), Self::row_to_order)
            .map_err(StoreError::db)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::db)
    }

    fn count(&self, filter: &OrderFilter) -> Result<i64, StoreError> {
        let conn = self.lock()?;
        let (where_clause, params) = Self::build_where_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM orders {}", where_clause);
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))
            .map_err(StoreError::db)
    }

    fn count_by_state(&self) -> Result<Vec<(String, i64)>, StoreError> {
        let conn = self.lock()?;
        count_by_state(&conn, "orders")
    }

    fn mark_cleaned_up(&self, id: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE orders SET cleaned_up_at = COALESCE(cleaned_up_at, ?), updated_at = ? WHERE id = ?",
                params![ts(&at), ts(&Utc::now()), id],
            )
            .map_err(StoreError::db)?;
        if changed == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }
}
