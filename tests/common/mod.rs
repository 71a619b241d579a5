#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use askql::commands::query::{check_read_only, ColumnDef, QueryExecutor, ResultSet};
use askql::commands::Assistant;
use askql::db::audit::SqliteAuditStore;
use askql::db::sqlite;
use askql::error::{Error, Result};
use askql::llm::CompletionModel;
use askql::models::{ColumnInfo, SchemaSnapshot, TableInfo, TableSchema, TableType};
use askql::state::AppState;

pub const COUNT_SQL: &str = "SELECT count(*) AS count FROM orders";
pub const BROKEN_SQL: &str = "SELECT * FROM missing_table";

/// Completion model that answers from fixed tables keyed on the question text.
#[derive(Default)]
pub struct ScriptedModel {
    sql_by_question: Vec<(String, String)>,
    questions: Mutex<VecDeque<String>>,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sql(mut self, question: &str, sql: &str) -> Self {
        self.sql_by_question.push((question.to_string(), sql.to_string()));
        self
    }

    pub fn generated_questions(self, questions: &[&str]) -> Self {
        *self.questions.lock().unwrap() = questions.iter().map(|q| q.to_string()).collect();
        self
    }

    pub fn prompts_containing(&self, needle: &str) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.contains(needle))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl CompletionModel for ScriptedModel {
    async fn complete(&self, prompt: &str, _json_mode: bool) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());

        if prompt.contains(r#"{"sql_query""#) {
            let sql = self
                .sql_by_question
                .iter()
                .find(|(q, _)| prompt.contains(&format!("`{}`", q)))
                .map(|(_, sql)| sql.clone())
                .ok_or_else(|| Error::Llm("no scripted SQL for this question".into()))?;
            return Ok(serde_json::json!({ "sql_query": sql }).to_string());
        }
        if prompt.contains(r#"{"answer""#) {
            return Ok(r#"{"answer": "There are 3 orders."}"#.to_string());
        }
        if prompt.contains(r#"{"question""#) {
            let question = self
                .questions
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| Error::Llm("out of questions".into()))?;
            return Ok(serde_json::json!({ "question": question }).to_string());
        }
        Err(Error::Llm("unexpected prompt".into()))
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// Executor that enforces the read-only check and pretends `missing_table` does not exist.
#[derive(Default)]
pub struct FakeDatabase {
    pub executed: Mutex<Vec<String>>,
}

#[async_trait]
impl QueryExecutor for FakeDatabase {
    async fn execute(&self, sql: &str) -> Result<ResultSet> {
        check_read_only(sql)?;
        self.executed.lock().unwrap().push(sql.to_string());

        if sql.contains("missing_table") {
            return Err(Error::Database(sqlx::Error::Protocol(
                "relation \"missing_table\" does not exist".into(),
            )));
        }
        Ok(ResultSet {
            columns: vec![ColumnDef {
                name: "count".into(),
                data_type: "INT8".into(),
            }],
            rows: vec![serde_json::json!({ "count": 3 })],
            row_count: 1,
            truncated: false,
            execution_time_ms: 1,
        })
    }
}

pub fn snapshot() -> SchemaSnapshot {
    SchemaSnapshot {
        schema_name: "public".into(),
        tables: vec![TableSchema {
            table: TableInfo {
                name: "orders".into(),
                schema_name: "public".into(),
                table_type: TableType::Table,
            },
            columns: vec![ColumnInfo {
                name: "id".into(),
                data_type: "integer".into(),
                is_nullable: false,
                is_primary_key: true,
                ordinal_position: 1,
                column_default: None,
            }],
        }],
    }
}

pub fn audit_store() -> Arc<SqliteAuditStore> {
    let conn = rusqlite::Connection::open_in_memory().unwrap();
    sqlite::init_schema(&conn).unwrap();
    Arc::new(SqliteAuditStore::new(conn))
}

pub struct Harness {
    pub model: Arc<ScriptedModel>,
    pub database: Arc<FakeDatabase>,
    pub audit: Arc<SqliteAuditStore>,
    pub state: AppState,
}

pub fn harness(model: ScriptedModel) -> Harness {
    let model = Arc::new(model);
    let database = Arc::new(FakeDatabase::default());
    let audit = audit_store();
    let snapshot = snapshot();

    let assistant = Assistant::new(
        model.clone(),
        model.clone(),
        database.clone(),
        audit.clone(),
        snapshot.render(),
        100,
    );

    Harness {
        model,
        database,
        audit,
        state: AppState::new(assistant, snapshot, 20),
    }
}

pub fn default_model() -> ScriptedModel {
    ScriptedModel::new()
        .sql("How many orders?", COUNT_SQL)
        .sql("Count all orders", COUNT_SQL)
        .sql("Anything broken?", BROKEN_SQL)
        .sql("Wipe it", "DELETE FROM orders")
}
