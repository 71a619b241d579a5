//! Audit table for answered questions.
//!
//! Two backends share one contract: a round is logged at most once per distinct SQL text.
//! The local SQLite file is the default; the Postgres backend writes to a table on a
//! separate, write-enabled pool so the business connection can stay read-only.

use async_trait::async_trait;
use rusqlite::Connection as SqliteConnection;
use sqlx::{PgPool, Row};
use std::sync::Mutex;

use crate::db::sqlite;
use crate::error::{Error, Result};
use crate::models::{validate_schema_name, AuditOutcome, LogEntry, LogSource, NewLogEntry};

#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Insert the entry unless its SQL text is already logged.
    async fn record(&self, entry: &NewLogEntry) -> Result<AuditOutcome>;

    async fn set_feedback(&self, entry_id: &str, positive: bool) -> Result<bool>;

    async fn recent(&self, limit: i64) -> Result<Vec<LogEntry>>;

    async fn previous_questions(&self) -> Result<Vec<String>>;

    async fn random_question(&self) -> Result<Option<String>>;

    async fn clear(&self) -> Result<usize>;
}

pub struct SqliteAuditStore {
    conn: Mutex<SqliteConnection>,
}

impl SqliteAuditStore {
    pub fn new(conn: SqliteConnection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, SqliteConnection>> {
        self.conn
            .lock()
            .map_err(|e| Error::Config(format!("Audit store lock poisoned: {}", e)))
    }
}

#[async_trait]
impl AuditStore for SqliteAuditStore {
    async fn record(&self, entry: &NewLogEntry) -> Result<AuditOutcome> {
        let mut conn = self.lock()?;
        Ok(sqlite::record_log_entry(&mut conn, entry)?)
    }

    async fn set_feedback(&self, entry_id: &str, positive: bool) -> Result<bool> {
        let conn = self.lock()?;
        Ok(sqlite::set_feedback(&conn, entry_id, positive)?)
    }

    async fn recent(&self, limit: i64) -> Result<Vec<LogEntry>> {
        let conn = self.lock()?;
        Ok(sqlite::load_log_entries(&conn, limit)?)
    }

    async fn previous_questions(&self) -> Result<Vec<String>> {
        let conn = self.lock()?;
        Ok(sqlite::load_questions(&conn)?)
    }

    async fn random_question(&self) -> Result<Option<String>> {
        let conn = self.lock()?;
        Ok(sqlite::random_question(&conn)?)
    }

    async fn clear(&self) -> Result<usize> {
        let conn = self.lock()?;
        Ok(sqlite::clear_log(&conn)?)
    }
}

pub struct PgAuditStore {
    pool: PgPool,
    table: String,
}

impl PgAuditStore {
    /// Create the audit table if needed.
    pub async fn new(pool: PgPool, table: &str) -> Result<Self> {
        validate_schema_name(table)?;
        let store = Self {
            pool,
            table: format!("\"{}\"", table.replace('"', "\"\"")),
        };

        let create_sql = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id TEXT PRIMARY KEY,
                question TEXT NOT NULL,
                sql_query TEXT NOT NULL,
                answer TEXT NOT NULL,
                sql_gen_seconds DOUBLE PRECISION NOT NULL,
                exec_seconds DOUBLE PRECISION NOT NULL,
                answer_gen_seconds DOUBLE PRECISION NOT NULL,
                row_count BIGINT NOT NULL,
                results_returned BOOLEAN NOT NULL,
                feedback BOOLEAN,
                source TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
            store.table
        );
        sqlx::query(&create_sql).execute(&store.pool).await?;

        Ok(store)
    }
}

#[async_trait]
impl AuditStore for PgAuditStore {
    async fn record(&self, entry: &NewLogEntry) -> Result<AuditOutcome> {
        let mut tx = self.pool.begin().await?;

        // Serialize concurrent writers of the same SQL text
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(entry.dedup_key())
            .execute(&mut *tx)
            .await?;

        let existing: Option<String> = sqlx::query_scalar(&format!(
            "SELECT id FROM {} WHERE sql_query = $1 LIMIT 1",
            self.table
        ))
        .bind(entry.dedup_key())
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(id) = existing {
            tx.rollback().await?;
            return Ok(AuditOutcome::Duplicate(id));
        }

        let id = uuid::Uuid::new_v4().to_string();
        sqlx::query(&format!(
            r#"
            INSERT INTO {} (id, question, sql_query, answer, sql_gen_seconds, exec_seconds,
                            answer_gen_seconds, row_count, results_returned, source)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
            self.table
        ))
        .bind(&id)
        .bind(&entry.question)
        .bind(entry.dedup_key())
        .bind(&entry.answer)
        .bind(entry.sql_gen_seconds)
        .bind(entry.exec_seconds)
        .bind(entry.answer_gen_seconds)
        .bind(entry.row_count)
        .bind(entry.row_count > 0)
        .bind(entry.source.as_str())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(AuditOutcome::Inserted(id))
    }

    async fn set_feedback(&self, entry_id: &str, positive: bool) -> Result<bool> {
        let result = sqlx::query(&format!(
            "UPDATE {} SET feedback = $1 WHERE id = $2",
            self.table
        ))
        .bind(positive)
        .bind(entry_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn recent(&self, limit: i64) -> Result<Vec<LogEntry>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT id, question, sql_query, answer, sql_gen_seconds, exec_seconds, answer_gen_seconds,
                   row_count, results_returned, feedback, source, created_at
            FROM {}
            ORDER BY created_at DESC
            LIMIT $1
            "#,
            self.table
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let entries = rows
            .into_iter()
            .map(|row| {
                let source: String = row.get("source");
                let created_at: chrono::DateTime<chrono::Utc> = row.get("created_at");
                LogEntry {
                    id: row.get("id"),
                    question: row.get("question"),
                    sql_query: row.get("sql_query"),
                    answer: row.get("answer"),
                    sql_gen_seconds: row.get("sql_gen_seconds"),
                    exec_seconds: row.get("exec_seconds"),
                    answer_gen_seconds: row.get("answer_gen_seconds"),
                    row_count: row.get("row_count"),
                    results_returned: row.get("results_returned"),
                    feedback: row.get("feedback"),
                    source: LogSource::parse(&source),
                    created_at: created_at.to_rfc3339(),
                }
            })
            .collect();

        Ok(entries)
    }

    async fn previous_questions(&self) -> Result<Vec<String>> {
        let questions = sqlx::query_scalar(&format!(
            "SELECT question FROM {} ORDER BY created_at",
            self.table
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(questions)
    }

    async fn random_question(&self) -> Result<Option<String>> {
        let question = sqlx::query_scalar(&format!(
            "SELECT question FROM {} ORDER BY random() LIMIT 1",
            self.table
        ))
        .fetch_optional(&self.pool)
        .await?;
        Ok(question)
    }

    async fn clear(&self) -> Result<usize> {
        let result = sqlx::query(&format!("DELETE FROM {}", self.table))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() as usize)
    }
}
