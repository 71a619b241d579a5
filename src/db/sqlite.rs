use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult};
use std::path::Path;

use crate::models::{AppSettings, AuditOutcome, LogEntry, LogSource, NewLogEntry};

pub const DATABASE_FILE: &str = "askql.db";

/// Open (or create) the local store in `data_dir` and create tables if they don't exist
pub fn init_database(data_dir: &Path) -> SqliteResult<Connection> {
    std::fs::create_dir_all(data_dir).ok();
    open_database(&data_dir.join(DATABASE_FILE))
}

pub fn open_database(db_path: &Path) -> SqliteResult<Connection> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        r#"
        -- One row per successful question round
        CREATE TABLE IF NOT EXISTS query_log (
            id TEXT PRIMARY KEY,
            question TEXT NOT NULL,
            sql_query TEXT NOT NULL,
            answer TEXT NOT NULL,
            sql_gen_seconds REAL NOT NULL,
            exec_seconds REAL NOT NULL,
            answer_gen_seconds REAL NOT NULL,
            row_count INTEGER NOT NULL,
            results_returned INTEGER NOT NULL,
            feedback INTEGER,
            source TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_query_log_sql ON query_log (sql_query);

        -- App settings (single row)
        CREATE TABLE IF NOT EXISTS app_settings (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            settings_json TEXT NOT NULL,
            updated_at TEXT DEFAULT CURRENT_TIMESTAMP
        );
        "#,
    )
}

// ==================== Query Log ====================

/// Insert a log entry unless one with the same SQL text already exists.
pub fn record_log_entry(conn: &mut Connection, entry: &NewLogEntry) -> SqliteResult<AuditOutcome> {
    let tx = conn.transaction()?;

    let existing: Option<String> = tx
        .query_row(
            "SELECT id FROM query_log WHERE sql_query = ?1 LIMIT 1",
            [entry.dedup_key()],
            |row| row.get(0),
        )
        .optional()?;

    if let Some(id) = existing {
        return Ok(AuditOutcome::Duplicate(id));
    }

    let id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();

    tx.execute(
        r#"
        INSERT INTO query_log (id, question, sql_query, answer, sql_gen_seconds, exec_seconds,
                               answer_gen_seconds, row_count, results_returned, feedback, source, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, NULL, ?10, ?11)
        "#,
        params![
            id,
            entry.question,
            entry.dedup_key(),
            entry.answer,
            entry.sql_gen_seconds,
            entry.exec_seconds,
            entry.answer_gen_seconds,
            entry.row_count,
            entry.row_count > 0,
            entry.source.as_str(),
            now,
        ],
    )?;
    tx.commit()?;

    Ok(AuditOutcome::Inserted(id))
}

/// Record thumbs up/down for an entry. Returns false when the id is unknown.
pub fn set_feedback(conn: &Connection, entry_id: &str, positive: bool) -> SqliteResult<bool> {
    let rows_affected = conn.execute(
        "UPDATE query_log SET feedback = ?1 WHERE id = ?2",
        params![positive, entry_id],
    )?;
    Ok(rows_affected > 0)
}

/// Most recent entries first
pub fn load_log_entries(conn: &Connection, limit: i64) -> SqliteResult<Vec<LogEntry>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT id, question, sql_query, answer, sql_gen_seconds, exec_seconds, answer_gen_seconds,
               row_count, results_returned, feedback, source, created_at
        FROM query_log
        ORDER BY created_at DESC
        LIMIT ?1
        "#,
    )?;

    let entries = stmt.query_map([limit], |row| {
        let source: String = row.get(10)?;
        Ok(LogEntry {
            id: row.get(0)?,
            question: row.get(1)?,
            sql_query: row.get(2)?,
            answer: row.get(3)?,
            sql_gen_seconds: row.get(4)?,
            exec_seconds: row.get(5)?,
            answer_gen_seconds: row.get(6)?,
            row_count: row.get(7)?,
            results_returned: row.get(8)?,
            feedback: row.get(9)?,
            source: LogSource::parse(&source),
            created_at: row.get(11)?,
        })
    })?;

    entries.collect()
}

/// Every logged question, oldest first.
pub fn load_questions(conn: &Connection) -> SqliteResult<Vec<String>> {
    let mut stmt = conn.prepare("SELECT question FROM query_log ORDER BY created_at")?;
    let questions = stmt.query_map([], |row| row.get(0))?;
    questions.collect()
}

pub fn random_question(conn: &Connection) -> SqliteResult<Option<String>> {
    conn.query_row(
        "SELECT question FROM query_log ORDER BY RANDOM() LIMIT 1",
        [],
        |row| row.get(0),
    )
    .optional()
}

pub fn clear_log(conn: &Connection) -> SqliteResult<usize> {
    conn.execute("DELETE FROM query_log", [])
}

// ==================== App Settings ====================

/// Load app settings from the database, returns default if none exist
pub fn load_settings(conn: &Connection) -> SqliteResult<AppSettings> {
    let json: Option<String> = conn
        .query_row("SELECT settings_json FROM app_settings WHERE id = 1", [], |row| {
            row.get(0)
        })
        .optional()?;

    match json {
        Some(json) => match serde_json::from_str(&json) {
            Ok(settings) => Ok(settings),
            Err(e) => {
                log::warn!("Ignoring unreadable stored settings: {}", e);
                Ok(AppSettings::default())
            }
        },
        None => Ok(AppSettings::default()),
    }
}

/// Save app settings to the database
pub fn save_settings(conn: &Connection, settings: &AppSettings) -> SqliteResult<()> {
    let json = serde_json::to_string(settings).unwrap_or_else(|_| "{}".to_string());

    conn.execute(
        r#"
        INSERT INTO app_settings (id, settings_json, updated_at)
        VALUES (1, ?1, CURRENT_TIMESTAMP)
        ON CONFLICT(id) DO UPDATE SET
            settings_json = excluded.settings_json,
            updated_at = CURRENT_TIMESTAMP
        "#,
        [&json],
    )?;
    Ok(())
}
