//! SQLite-backed batch store.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::{
    Batch, BatchFilter, BatchManifest, BatchState, BatchStore, QcJob, QcJobResult,
    SubmitBatchRequest,
};
use crate::lifecycle::sqlite::{
    cas_miss, count_by_state, insert_transition, is_constraint_violation, load_transitions,
    parse_opt_ts, parse_ts, ts,
};
use crate::lifecycle::{LifecycleState, LifecycleStore, StoreError, TransitionRecord};

const BATCH_COLUMNS: &str = "id, submitted_by, submitter_privileged, staging_path, ingestion_path, production_path, state, qc_job_id, cancel_requested, created_at, qc_submitted_at, terminal_at, updated_at, manifest, cleaned_up_at";

const QC_JOB_COLUMNS: &str =
    "id, batch_id, backend_job_id, submitted_at, result, artifact_path, reason, last_polled_at, finished_at";

/// SQLite-backed batch store.
pub struct SqliteBatchStore {
    conn: Mutex<Connection>,
}

impl SqliteBatchStore {
    /// Open (or create) the store at `path`.
    pub fn new(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(StoreError::db)?;
        Self::with_connection(conn)
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(StoreError::db)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.busy_timeout(Duration::from_secs(5))
            .map_err(StoreError::db)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS batches (
                id TEXT PRIMARY KEY,
                submitted_by TEXT NOT NULL,
                submitter_privileged INTEGER NOT NULL DEFAULT 0,
                staging_path TEXT,
                ingestion_path TEXT NOT NULL,
                production_path TEXT,
                state TEXT NOT NULL,
                state_type TEXT NOT NULL,
                qc_job_id TEXT,
                cancel_requested INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                qc_submitted_at TEXT,
                terminal_at TEXT,
                updated_at TEXT NOT NULL,
                manifest TEXT,
                cleaned_up_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_batches_state_type ON batches(state_type);
            CREATE INDEX IF NOT EXISTS idx_batches_submitted_by ON batches(submitted_by);

            CREATE TABLE IF NOT EXISTS batch_transitions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                entity_id TEXT NOT NULL,
                from_state TEXT NOT NULL,
                to_state TEXT NOT NULL,
                reason TEXT,
                at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_batch_transitions_entity ON batch_transitions(entity_id);

            CREATE TABLE IF NOT EXISTS qc_jobs (
                id TEXT PRIMARY KEY,
                batch_id TEXT NOT NULL,
                backend_job_id TEXT,
                submitted_at TEXT NOT NULL,
                result TEXT NOT NULL,
                artifact_path TEXT,
                reason TEXT,
                last_polled_at TEXT,
                finished_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_qc_jobs_batch ON qc_jobs(batch_id);
            CREATE UNIQUE INDEX IF NOT EXISTS idx_qc_jobs_one_pending
                ON qc_jobs(batch_id) WHERE result = 'pending';
            "#,
        )
        .map_err(StoreError::db)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("connection mutex poisoned".to_string()))
    }

    fn build_where_clause(filter: &BatchFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions: Vec<String> = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref state) = filter.state {
            conditions.push("state_type = ?".to_string());
            params.push(Box::new(state.clone()));
        }

        if let Some(ref submitted_by) = filter.submitted_by {
            conditions.push("submitted_by = ?".to_string());
            params.push(Box::new(submitted_by.clone()));
        }

        if let Some(ended_before) = filter.cleanup_due_before {
            let placeholders = vec!["?"; BatchState::CLEANABLE.len()].join(", ");
            conditions.push(format!(
                "cleaned_up_at IS NULL AND terminal_at <= ? AND state_type IN ({})",
                placeholders
            ));
            params.push(Box::new(ts(&ended_before)));
            for name in BatchState::CLEANABLE {
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

    fn row_to_batch(row: &rusqlite::Row) -> rusqlite::Result<Batch> {
        let state_json: String = row.get(6)?;
        let state: BatchState = serde_json::from_str(&state_json).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
        })?;
        let created_at: String = row.get(9)?;
        let updated_at: String = row.get(12)?;
        let manifest = row
            .get::<_, Option<String>>(13)?
            .map(|raw| serde_json::from_str::<BatchManifest>(&raw))
            .transpose()
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    13,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })?;

        Ok(Batch {
            id: row.get(0)?,
            submitted_by: row.get(1)?,
            submitter_privileged: row.get(2)?,
            staging_path: row.get(3)?,
            ingestion_path: row.get(4)?,
            production_path: row.get(5)?,
            manifest,
            state,
            qc_job_id: row.get(7)?,
            cancel_requested: row.get(8)?,
            created_at: parse_ts(&created_at),
            qc_submitted_at: parse_opt_ts(row.get(10)?),
            terminal_at: parse_opt_ts(row.get(11)?),
            cleaned_up_at: parse_opt_ts(row.get(14)?),
            updated_at: parse_ts(&updated_at),
        })
    }

    fn row_to_qc_job(row: &rusqlite::Row) -> rusqlite::Result<QcJob> {
        let submitted_at: String = row.get(3)?;
        let result: String = row.get(4)?;
        let result = QcJobResult::parse(&result).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                4,
                rusqlite::types::Type::Text,
                format!("unknown qc job result: {}", result).into(),
            )
        })?;

        Ok(QcJob {
            id: row.get(0)?,
            batch_id: row.get(1)?,
            backend_job_id: row.get(2)?,
            submitted_at: parse_ts(&submitted_at),
            result,
            artifact_path: row.get(5)?,
            reason: row.get(6)?,
            last_polled_at: parse_opt_ts(row.get(7)?),
            finished_at: parse_opt_ts(row.get(8)?),
        })
    }

    fn load_batch(conn: &Connection, id: &str) -> Result<Option<Batch>, StoreError> {
        let sql = format!("SELECT {} FROM batches WHERE id = ?", BATCH_COLUMNS);
        conn.query_row(&sql, params![id], Self::row_to_batch)
            .optional()
            .map_err(StoreError::db)
    }

    fn load_qc_job(conn: &Connection, job_id: &str) -> Result<Option<QcJob>, StoreError> {
        let sql = format!("SELECT {} FROM qc_jobs WHERE id = ?", QC_JOB_COLUMNS);
        conn.query_row(&sql, params![job_id], Self::row_to_qc_job)
            .optional()
            .map_err(StoreError::db)
    }
}

impl LifecycleStore<Batch> for SqliteBatchStore {
    fn load(&self, id: &str) -> Result<Batch, StoreError> {
        let conn = self.lock()?;
        Self::load_batch(&conn, id)?.ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn compare_and_swap(
        &self,
        id: &str,
        expected: &str,
        next: &BatchState,
    ) -> Result<Batch, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(StoreError::db)?;

        let now = Utc::now();
        let state_json = serde_json::to_string(next).map_err(StoreError::db)?;

        let qc_job_id = match next {
            BatchState::QcSubmitted { job_id, .. } => Some(job_id.clone()),
            _ => None,
        };
        let qc_submitted_at = match next {
            BatchState::QcSubmitted { submitted_at, .. } => Some(ts(submitted_at)),
            _ => None,
        };
        let production_path = match next {
            BatchState::Promoted {
                production_path, ..
            } => Some(production_path.clone()),
            _ => None,
        };
        let terminal_at = next.is_terminal().then(|| ts(&now));

        let changed = tx
            .execute(
                "UPDATE batches SET state = ?, state_type = ?,
                    qc_job_id = COALESCE(?, qc_job_id),
                    qc_submitted_at = COALESCE(?, qc_submitted_at),
                    production_path = COALESCE(?, production_path),
                    terminal_at = COALESCE(?, terminal_at),
                    updated_at = ?
                 WHERE id = ? AND state_type = ?",
                params![
                    state_json,
                    next.state_type(),
                    qc_job_id,
                    qc_submitted_at,
                    production_path,
                    terminal_at,
                    ts(&now),
                    id,
                    expected
                ],
            )
            .map_err(StoreError::db)?;

        if changed == 0 {
            return Err(cas_miss(&tx, "batches", id, expected));
        }

        insert_transition(
            &tx,
            "batch_transitions",
            id,
            &TransitionRecord {
                from_state: expected.to_string(),
                to_state: next.state_type().to_string(),
                at: now,
                reason: next.failure_reason().map(String::from),
            },
        )?;

        let batch =
            Self::load_batch(&tx, id)?.ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        tx.commit().map_err(StoreError::db)?;
        Ok(batch)
    }

    fn request_cancel(&self, id: &str) -> Result<Batch, StoreError> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE batches SET cancel_requested = 1, updated_at = ? WHERE id = ?",
                params![ts(&Utc::now()), id],
            )
            .map_err(StoreError::db)?;
        if changed == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Self::load_batch(&conn, id)?.ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn history(&self, id: &str) -> Result<Vec<TransitionRecord>, StoreError> {
        let conn = self.lock()?;
        load_transitions(&conn, "batch_transitions", id)
    }
}

impl BatchStore for SqliteBatchStore {
    fn create(
        &self,
        request: &SubmitBatchRequest,
        ingestion_path: &str,
        submitter_privileged: bool,
    ) -> Result<Batch, StoreError> {
        let conn = self.lock()?;
        let now = Utc::now();
        let state = BatchState::Staged;
        let state_json = serde_json::to_string(&state).map_err(StoreError::db)?;
        let manifest_json = request
            .manifest
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(StoreError::db)?;

        conn.execute(
            "INSERT INTO batches (id, submitted_by, submitter_privileged, staging_path, ingestion_path, manifest, state, state_type, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                request.batch_id,
                request.submitted_by,
                submitter_privileged,
                request.staging_path,
                ingestion_path,
                manifest_json,
                state_json,
                state.state_type(),
                ts(&now),
                ts(&now),
            ],
        )
        .map_err(|e| {
            if is_constraint_violation(&e) {
                StoreError::AlreadyExists(request.batch_id.clone())
            } else {
                StoreError::db(e)
            }
        })?;

        Ok(Batch {
            id: request.batch_id.clone(),
            submitted_by: request.submitted_by.clone(),
            submitter_privileged,
            staging_path: request.staging_path.clone(),
            ingestion_path: ingestion_path.to_string(),
            production_path: None,
            manifest: request.manifest.clone(),
            state,
            qc_job_id: None,
            cancel_requested: false,
            created_at: now,
            qc_submitted_at: None,
            terminal_at: None,
            cleaned_up_at: None,
            updated_at: now,
        })
    }

    fn get(&self, id: &str) -> Result<Option<Batch>, StoreError> {
        let conn = self.lock()?;
        Self::load_batch(&conn, id)
    }

    fn list(&self, filter: &BatchFilter) -> Result<Vec<Batch>, StoreError> {
        let conn = self.lock()?;
        let (where_clause, params) = Self::build_where_clause(filter);

        let sql = format!(
            "SELECT {} FROM batches {} ORDER BY created_at ASC, id ASC LIMIT ? OFFSET ?",
            BATCH_COLUMNS, where_clause
        );
        let mut stmt = conn.prepare(&sql).map_err(StoreError::db)?;

        let mut all_params: Vec<Box<dyn rusqlite::ToSql>> = params;
        all_params.push(Box::new(filter.limit));
        all_params.push(Box::new(filter.offset));
        let param_refs: Vec<&dyn rusqlite::ToSql> = all_params.iter().map(|p| p.as_ref()).collect();

        let rows = stmt
            .query_map(param_refs.as_slice(), Self::row_to_batch)
            .map_err(StoreError::db)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::db)
    }

    fn count(&self, filter: &BatchFilter) -> Result<i64, StoreError> {
        let conn = self.lock()?;
        let (where_clause, params) = Self::build_where_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM batches {}", where_clause);
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))
            .map_err(StoreError::db)
    }

    fn count_by_state(&self) -> Result<Vec<(String, i64)>, StoreError> {
        let conn = self.lock()?;
        count_by_state(&conn, "batches")
    }

    fn mark_cleaned_up(&self, id: &str, at: DateTime<Utc>) -> Result<Batch, StoreError> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE batches SET cleaned_up_at = COALESCE(cleaned_up_at, ?), updated_at = ? WHERE id = ?",
                params![ts(&at), ts(&Utc::now()), id],
            )
            .map_err(StoreError::db)?;
        if changed == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Self::load_batch(&conn, id)?.ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn claim_qc_job(&self, batch_id: &str) -> Result<QcJob, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(StoreError::db)?;
        let job_id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();

        tx.execute(
            "INSERT INTO qc_jobs (id, batch_id, submitted_at, result) VALUES (?, ?, ?, ?)",
            params![job_id, batch_id, ts(&now), QcJobResult::Pending.as_str()],
        )
        .map_err(|e| {
            if is_constraint_violation(&e) {
                StoreError::Conflict {
                    id: batch_id.to_string(),
                    expected: "no pending qc job".to_string(),
                    actual: "pending qc job".to_string(),
                }
            } else {
                StoreError::db(e)
            }
        })?;

        tx.execute(
            "UPDATE batches SET qc_job_id = ?, updated_at = ? WHERE id = ?",
            params![job_id, ts(&now), batch_id],
        )
        .map_err(StoreError::db)?;

        let job = Self::load_qc_job(&tx, &job_id)?
            .ok_or_else(|| StoreError::NotFound(job_id.clone()))?;
        tx.commit().map_err(StoreError::db)?;
        Ok(job)
    }

    fn attach_backend_job(&self, job_id: &str, backend_job_id: &str) -> Result<QcJob, StoreError> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE qc_jobs SET backend_job_id = ? WHERE id = ?",
                params![backend_job_id, job_id],
            )
            .map_err(StoreError::db)?;
        if changed == 0 {
            return Err(StoreError::NotFound(job_id.to_string()));
        }
        Self::load_qc_job(&conn, job_id)?.ok_or_else(|| StoreError::NotFound(job_id.to_string()))
    }

    fn pending_qc_job(&self, batch_id: &str) -> Result<Option<QcJob>, StoreError> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {} FROM qc_jobs WHERE batch_id = ? AND result = 'pending'",
            QC_JOB_COLUMNS
        );
        conn.query_row(&sql, params![batch_id], Self::row_to_qc_job)
            .optional()
            .map_err(StoreError::db)
    }

    fn get_qc_job(&self, job_id: &str) -> Result<Option<QcJob>, StoreError> {
        let conn = self.lock()?;
        Self::load_qc_job(&conn, job_id)
    }

    fn finish_qc_job(
        &self,
        job_id: &str,
        result: QcJobResult,
        artifact_path: Option<&str>,
        reason: Option<&str>,
    ) -> Result<QcJob, StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE qc_jobs SET result = ?, artifact_path = COALESCE(?, artifact_path), reason = COALESCE(?, reason), finished_at = ?
             WHERE id = ? AND result = 'pending'",
            params![result.as_str(), artifact_path, reason, ts(&Utc::now()), job_id],
        )
        .map_err(StoreError::db)?;
        Self::load_qc_job(&conn, job_id)?.ok_or_else(|| StoreError::NotFound(job_id.to_string()))
    }

    fn mark_qc_polled(&self, job_id: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE qc_jobs SET last_polled_at = ? WHERE id = ?",
            params![ts(&at), job_id],
        )
        .map_err(StoreError::db)?;
        Ok(())
    }

    fn list_qc_jobs(&self, batch_id: &str) -> Result<Vec<QcJob>, StoreError> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {} FROM qc_jobs WHERE batch_id = ? ORDER BY submitted_at ASC",
            QC_JOB_COLUMNS
        );
        let mut stmt = conn.prepare(&sql).map_err(StoreError::db)?;
        let rows = stmt
            .query_map(params![batch_id], Self::row_to_qc_job)
            .map_err(StoreError::db)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::db)
    }
}
