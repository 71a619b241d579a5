use std::io::{self, Write};
use std::time::Instant;

use crate::commands::ask::Assistant;
use crate::commands::metadata;
use crate::llm;
use crate::models::{AuditOutcome, ExploreSettings, LogSource, SchemaSnapshot};
use crate::state::ErrorLog;
use crate::ui::display;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExploreReport {
    pub attempted: usize,
    pub new_kpis: usize,
    pub duplicates: usize,
    pub failures: usize,
}

/// Generate `count` novel questions and answer each through the normal pipeline.
pub async fn explore<W: Write>(
    assistant: &Assistant,
    snapshot: &SchemaSnapshot,
    settings: &ExploreSettings,
    count: usize,
    preview_rows: usize,
    errors: &ErrorLog,
    out: &mut W,
) -> io::Result<ExploreReport> {
    let mut previous = match assistant.audit().previous_questions().await {
        Ok(questions) => questions,
        Err(e) => {
            log::warn!("Could not load previous questions: {}", e);
            Vec::new()
        }
    };
    let sample = metadata::sample_data(
        assistant.executor(),
        snapshot,
        settings.sample_tables,
        settings.sample_rows,
    )
    .await;

    let mut report = ExploreReport::default();
    for i in 0..count {
        report.attempted += 1;
        writeln!(out, "\n[{}/{}] Thinking . . .", i + 1, count)?;

        let started = Instant::now();
        let generated = llm::generate_question(
            assistant.sql_model(),
            assistant.schema_text(),
            &sample,
            &previous,
        )
        .await;
        let question_gen_seconds = started.elapsed().as_secs_f64();

        let question = match generated {
            Ok(q) => q.question,
            Err(e) => {
                let message = format!("Question generation failed: {}", e);
                writeln!(out, "Error: {}", message)?;
                errors.log_error(message);
                report.failures += 1;
                continue;
            }
        };
        writeln!(out, "Question ({:.2}s): {}", question_gen_seconds, question)?;
        previous.push(question.clone());

        let round = assistant.ask(&question, LogSource::Explore).await;
        display::print_round(out, &round, preview_rows)?;

        if let Some(error) = round.error_text() {
            errors.log_error(error);
            report.failures += 1;
        }
        match round.audit {
            Some(AuditOutcome::Inserted(_)) => report.new_kpis += 1,
            Some(AuditOutcome::Duplicate(_)) => report.duplicates += 1,
            None => {}
        }
    }

    writeln!(out, "\nNew KPIs generated: {}", report.new_kpis)?;
    Ok(report)
}
