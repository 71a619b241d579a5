use std::io::{self, Write};

use sqlformat::{FormatOptions, QueryParams};

use crate::commands::ask::Round;
use crate::models::AuditOutcome;

pub const SAVED_MESSAGE: &str = "Query saved to database.";
pub const DUPLICATE_MESSAGE: &str = "Duplicate query found, skipping...";

pub fn format_sql(sql: &str) -> String {
    sqlformat::format(sql, &QueryParams::None, &FormatOptions::default())
}

/// Print everything the round produced, then its failure if any.
pub fn print_round<W: Write>(out: &mut W, round: &Round, preview_rows: usize) -> io::Result<()> {
    let t = &round.timings;

    if let Some(error) = round.error_text() {
        // The failing SQL is shown raw so it can be copied as-is
        if let Some(sql) = round.sql() {
            writeln!(out, "{}", sql)?;
        }
        if let Some(answer) = &round.answer {
            writeln!(out, "Answer ({:.2}s):\n{}", t.answer_gen_seconds, answer)?;
        }
        writeln!(out, "Error: {}", error)?;
        return Ok(());
    }

    if let Some(sql) = round.sql() {
        writeln!(out, "SQL ({:.2}s):\n{}", t.sql_gen_seconds, format_sql(sql))?;
    }
    if let Some(results) = &round.results {
        writeln!(
            out,
            "Dataset ({:.2}s):\n{}",
            t.exec_seconds,
            results.to_markdown(preview_rows)
        )?;
    }
    writeln!(out)?;
    if let Some(answer) = &round.answer {
        writeln!(
            out,
            "Answer ({:.2}s) ({:.2}s total):\n{}",
            t.answer_gen_seconds, t.total_seconds, answer
        )?;
    }
    match &round.audit {
        Some(AuditOutcome::Inserted(_)) => writeln!(out, "{}", SAVED_MESSAGE)?,
        Some(AuditOutcome::Duplicate(_)) => writeln!(out, "{}", DUPLICATE_MESSAGE)?,
        None => {}
    }
    Ok(())
}
