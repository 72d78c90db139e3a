use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, types::ToSql, Connection, Row};

use super::{AuditError, AuditEvent, AuditFilter, AuditRecord, AuditStore, AuditSubject};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS audit_events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        timestamp TEXT NOT NULL,
        event_type TEXT NOT NULL,
        entity_type TEXT,
        entity_id TEXT,
        user_id TEXT,
        data TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_audit_events_timestamp ON audit_events(timestamp);
    CREATE INDEX IF NOT EXISTS idx_audit_events_entity ON audit_events(entity_type, entity_id);
    CREATE INDEX IF NOT EXISTS idx_audit_events_entity_id ON audit_events(entity_id);
    CREATE INDEX IF NOT EXISTS idx_audit_events_event_type ON audit_events(event_type);
    CREATE INDEX IF NOT EXISTS idx_audit_events_user_id ON audit_events(user_id);
"#;

const COLUMNS: &str = "id, timestamp, event_type, entity_type, entity_id, user_id, data";

type AuditRow = (
    i64,
    String,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    String,
);

fn db(e: rusqlite::Error) -> AuditError {
    AuditError::Database(e.to_string())
}

/// Audit trail in the shared SQLite database.
pub struct SqliteAuditStore {
    conn: Mutex<Connection>,
}

impl SqliteAuditStore {
    pub fn new(path: &Path) -> Result<Self, AuditError> {
        Self::with_connection(Connection::open(path).map_err(db)?)
    }

    pub fn in_memory() -> Result<Self, AuditError> {
        Self::with_connection(Connection::open_in_memory().map_err(db)?)
    }

    fn with_connection(conn: Connection) -> Result<Self, AuditError> {
        conn.execute_batch(SCHEMA).map_err(db)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, AuditError> {
        self.conn
            .lock()
            .map_err(|_| AuditError::Database("connection mutex poisoned".to_string()))
    }

    fn where_clause(filter: &AuditFilter) -> (String, Vec<Box<dyn ToSql>>) {
        let mut conditions = Vec::new();
        let mut values: Vec<Box<dyn ToSql>> = Vec::new();

        let equals = [
            ("entity_type", filter.entity_type.map(|s| s.as_str().to_string())),
            ("entity_id", filter.entity_id.clone()),
            ("event_type", filter.event_type.clone()),
            ("user_id", filter.user_id.clone()),
        ];
        for (column, value) in equals {
            if let Some(value) = value {
                conditions.push(format!("{} = ?", column));
                values.push(Box::new(value));
            }
        }
        if let Some(from) = filter.from {
            conditions.push("timestamp >= ?".to_string());
            values.push(Box::new(from.to_rfc3339()));
        }
        if let Some(to) = filter.to {
            conditions.push("timestamp <= ?".to_string());
            values.push(Box::new(to.to_rfc3339()));
        }

        if conditions.is_empty() {
            (String::new(), values)
        } else {
            (format!("WHERE {}", conditions.join(" AND ")), values)
        }
    }

    fn read_row(row: &Row<'_>) -> rusqlite::Result<AuditRow> {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
            row.get(6)?,
        ))
    }
}

impl AuditStore for SqliteAuditStore {
    fn append(&self, records: &[AuditRecord]) -> Result<usize, AuditError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(db)?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO audit_events (timestamp, event_type, entity_type, entity_id, user_id, data)
                     VALUES (?, ?, ?, ?, ?, ?)",
                )
                .map_err(db)?;
            for record in records {
                let data = serde_json::to_string(&record.data)
                    .map_err(|e| AuditError::Serialization(e.to_string()))?;
                stmt.execute(params![
                    record.timestamp.to_rfc3339(),
                    record.event_type,
                    record.entity_type.map(|s| s.as_str()),
                    record.entity_id,
                    record.user_id,
                    data,
                ])
                .map_err(db)?;
            }
        }
        tx.commit().map_err(db)?;
        Ok(records.len())
    }

    fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditRecord>, AuditError> {
        let conn = self.lock()?;
        let (where_clause, mut values) = Self::where_clause(filter);
        values.push(Box::new(filter.limit));
        values.push(Box::new(filter.offset));

        let sql = format!(
            "SELECT {} FROM audit_events {} ORDER BY id DESC LIMIT ? OFFSET ?",
            COLUMNS, where_clause
        );
        let mut stmt = conn.prepare(&sql).map_err(db)?;
        let refs: Vec<&dyn ToSql> = values.iter().map(|v| v.as_ref()).collect();
        let rows = stmt
            .query_map(refs.as_slice(), Self::read_row)
            .map_err(db)?;

        let mut records = Vec::new();
        for row in rows {
            let (id, timestamp, event_type, entity_type, entity_id, user_id, data) =
                row.map_err(db)?;
            let timestamp: DateTime<Utc> = DateTime::parse_from_rfc3339(&timestamp)
                .map_err(|e| AuditError::Database(format!("Invalid timestamp: {}", e)))?
                .into();
            let data: AuditEvent = serde_json::from_str(&data)
                .map_err(|e| AuditError::Serialization(e.to_string()))?;

            records.push(AuditRecord {
                id,
                timestamp,
                event_type,
                entity_type: entity_type.as_deref().and_then(AuditSubject::parse),
                entity_id,
                user_id,
                data,
            });
        }
        Ok(records)
    }

    fn count(&self, filter: &AuditFilter) -> Result<i64, AuditError> {
        let conn = self.lock()?;
        let (where_clause, values) = Self::where_clause(filter);
        let refs: Vec<&dyn ToSql> = values.iter().map(|v| v.as_ref()).collect();
        conn.query_row(
            &format!("SELECT COUNT(*) FROM audit_events {}", where_clause),
            refs.as_slice(),
            |row| row.get(0),
        )
        .map_err(db)
    }
}
