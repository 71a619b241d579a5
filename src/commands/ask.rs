//! One question, end to end: generate SQL, run it read-only, explain the result, audit it.
//!
//! A round never returns an error. Whatever fails is captured on the [`Round`] together with
//! everything produced before the failure, so callers can show the failing SQL and carry on.

use serde::{Serialize, Serializer};
use std::sync::Arc;
use std::time::Instant;

use crate::commands::query::{QueryExecutor, ResultSet};
use crate::db::audit::AuditStore;
use crate::error::{sanitize_error, Error};
use crate::llm::{self, CompletionModel, GeneratedQuery};
use crate::models::{AuditOutcome, LogSource, NewLogEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    SqlGeneration,
    Execution,
    AnswerGeneration,
    Audit,
}

impl Stage {
    pub fn label(&self) -> &'static str {
        match self {
            Stage::SqlGeneration => "SQL generation",
            Stage::Execution => "SQL execution",
            Stage::AnswerGeneration => "Answer generation",
            Stage::Audit => "Audit logging",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Timings {
    pub sql_gen_seconds: f64,
    pub exec_seconds: f64,
    pub answer_gen_seconds: f64,
    pub total_seconds: f64,
}

#[derive(Debug, Serialize)]
pub struct Round {
    pub question: String,
    pub query: Option<GeneratedQuery>,
    pub results: Option<ResultSet>,
    pub answer: Option<String>,
    pub timings: Timings,
    pub failed_stage: Option<Stage>,
    #[serde(serialize_with = "serialize_error")]
    pub error: Option<Error>,
    pub audit: Option<AuditOutcome>,
}

fn serialize_error<S: Serializer>(error: &Option<Error>, s: S) -> Result<S::Ok, S::Error> {
    match error {
        Some(e) => s.serialize_some(&sanitize_error(&e.to_string())),
        None => s.serialize_none(),
    }
}

impl Round {
    fn new(question: &str) -> Self {
        Round {
            question: question.to_string(),
            query: None,
            results: None,
            answer: None,
            timings: Timings::default(),
            failed_stage: None,
            error: None,
            audit: None,
        }
    }

    fn fail(&mut self, stage: Stage, error: Error) {
        log::error!("{} failed: {}", stage.label(), error);
        self.failed_stage = Some(stage);
        self.error = Some(error);
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    pub fn sql(&self) -> Option<&str> {
        self.query.as_ref().map(|q| q.sql_query.as_str())
    }

    /// "<stage> failed: <error>" with credentials masked, for error logs and displays.
    pub fn error_text(&self) -> Option<String> {
        let error = self.error.as_ref()?;
        let stage = self.failed_stage.map_or("Round", |s| s.label());
        Some(sanitize_error(&format!("{} failed: {}", stage, error)))
    }
}

pub struct Assistant {
    sql_model: Arc<dyn CompletionModel>,
    answer_model: Arc<dyn CompletionModel>,
    executor: Arc<dyn QueryExecutor>,
    audit: Arc<dyn AuditStore>,
    schema_text: String,
    prompt_rows: usize,
}

impl Assistant {
    pub fn new(
        sql_model: Arc<dyn CompletionModel>,
        answer_model: Arc<dyn CompletionModel>,
        executor: Arc<dyn QueryExecutor>,
        audit: Arc<dyn AuditStore>,
        schema_text: String,
        prompt_rows: usize,
    ) -> Self {
        Self {
            sql_model,
            answer_model,
            executor,
            audit,
            schema_text,
            prompt_rows,
        }
    }

    pub fn schema_text(&self) -> &str {
        &self.schema_text
    }

    pub fn audit(&self) -> &dyn AuditStore {
        self.audit.as_ref()
    }

    pub fn executor(&self) -> &dyn QueryExecutor {
        self.executor.as_ref()
    }

    pub fn sql_model(&self) -> &dyn CompletionModel {
        self.sql_model.as_ref()
    }

    pub async fn ask(&self, question: &str, source: LogSource) -> Round {
        let question = question.trim();
        let started = Instant::now();
        let mut round = Round::new(question);

        self.run_stages(&mut round, source).await;

        round.timings.total_seconds = started.elapsed().as_secs_f64();
        log::info!(
            "Round finished in {:.2}s (sql {:.2}s, exec {:.2}s, answer {:.2}s)",
            round.timings.total_seconds,
            round.timings.sql_gen_seconds,
            round.timings.exec_seconds,
            round.timings.answer_gen_seconds
        );
        round
    }

    async fn run_stages(&self, round: &mut Round, source: LogSource) {
        let stage_start = Instant::now();
        let generated =
            llm::generate_sql(self.sql_model.as_ref(), &self.schema_text, &round.question).await;
        round.timings.sql_gen_seconds = stage_start.elapsed().as_secs_f64();
        let query = match generated {
            Ok(query) => query,
            Err(e) => return round.fail(Stage::SqlGeneration, e),
        };
        let sql = query.sql_query.clone();
        round.query = Some(query);

        let stage_start = Instant::now();
        let executed = self.executor.execute(&sql).await;
        round.timings.exec_seconds = stage_start.elapsed().as_secs_f64();
        let results = match executed {
            Ok(results) => results,
            Err(e) => return round.fail(Stage::Execution, e),
        };
        let results_markdown = results.to_markdown(self.prompt_rows);
        let row_count = results.row_count as i64;
        round.results = Some(results);

        let stage_start = Instant::now();
        let answered = llm::generate_answer(
            self.answer_model.as_ref(),
            &round.question,
            &sql,
            &results_markdown,
        )
        .await;
        round.timings.answer_gen_seconds = stage_start.elapsed().as_secs_f64();
        let answer = match answered {
            Ok(answer) => answer.answer,
            Err(e) => return round.fail(Stage::AnswerGeneration, e),
        };
        round.answer = Some(answer.clone());

        let entry = NewLogEntry {
            question: round.question.clone(),
            sql_query: sql,
            answer,
            sql_gen_seconds: round.timings.sql_gen_seconds,
            exec_seconds: round.timings.exec_seconds,
            answer_gen_seconds: round.timings.answer_gen_seconds,
            row_count,
            source,
        };
        match self.audit.record(&entry).await {
            Ok(outcome) => {
                if outcome.is_duplicate() {
                    log::info!("Duplicate query found, not logged again");
                }
                round.audit = Some(outcome);
            }
            Err(e) => round.fail(Stage::Audit, e),
        }
    }
}
