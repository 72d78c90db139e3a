//! Helpers shared by the SQLite entity stores.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use super::{StoreError, TransitionRecord};

pub(crate) fn ts(value: &DateTime<Utc>) -> String {
    value.to_rfc3339()
}

pub(crate) fn parse_ts(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

pub(crate) fn parse_opt_ts(raw: Option<String>) -> Option<DateTime<Utc>> {
    raw.as_deref().map(parse_ts)
}

pub(crate) fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

/// After a CAS update touched no rows, tell "missing" from "lost the race".
pub(crate) fn cas_miss(
    conn: &Connection,
    table: &str,
    id: &str,
    expected: &str,
) -> StoreError {
    let sql = format!("SELECT state_type FROM {} WHERE id = ?", table);
    match conn.query_row(&sql, params![id], |row| row.get::<_, String>(0)) {
        Ok(actual) => StoreError::Conflict {
            id: id.to_string(),
            expected: expected.to_string(),
            actual,
        },
        Err(rusqlite::Error::QueryReturnedNoRows) => StoreError::NotFound(id.to_string()),
        Err(e) => StoreError::db(e),
    }
}

pub(crate) fn insert_transition(
    conn: &Connection,
    table: &str,
    entity_id: &str,
    record: &TransitionRecord,
) -> Result<(), StoreError> {
    let sql = format!(
        "INSERT INTO {} (entity_id, from_state, to_state, reason, at) VALUES (?, ?, ?, ?, ?)",
        table
    );
    conn.execute(
        &sql,
        params![
            entity_id,
            record.from_state,
            record.to_state,
            record.reason,
            ts(&record.at)
        ],
    )
    .map_err(StoreError::db)?;
    Ok(())
}

pub(crate) fn load_transitions(
    conn: &Connection,
    table: &str,
    entity_id: &str,
) -> Result<Vec<TransitionRecord>, StoreError> {
    let sql = format!(
        "SELECT from_state, to_state, reason, at FROM {} WHERE entity_id = ? ORDER BY id ASC",
        table
    );
    let mut stmt = conn.prepare(&sql).map_err(StoreError::db)?;
    let rows = stmt
        .query_map(params![entity_id], |row| {
            let at: String = row.get(3)?;
            Ok(TransitionRecord {
                from_state: row.get(0)?,
                to_state: row.get(1)?,
                reason: row.get(2)?,
                at: parse_ts(&at),
            })
        })
        .map_err(StoreError::db)?;

    rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::db)
}

pub(crate) fn count_by_state(
    conn: &Connection,
    table: &str,
) -> Result<Vec<(String, i64)>, StoreError> {
    let sql = format!(
        "SELECT state_type, COUNT(*) FROM {} GROUP BY state_type ORDER BY state_type",
        table
    );
    let mut stmt = conn.prepare(&sql).map_err(StoreError::db)?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
        .map_err(StoreError::db)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::db)
}
