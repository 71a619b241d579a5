use std::io::Write;

use crate::db::audit::AuditStore;
use crate::error::{Error, Result};
use crate::models::LogEntry;

fn feedback_label(feedback: Option<bool>) -> &'static str {
    match feedback {
        Some(true) => "good",
        Some(false) => "bad",
        None => "-",
    }
}

pub fn format_entry(entry: &LogEntry) -> String {
    let sql = entry.sql_query.split_whitespace().collect::<Vec<_>>().join(" ");
    format!(
        "{} [{}] {}\n  id: {}\n  sql: {}\n  rows: {}, sql {:.2}s, exec {:.2}s, answer {:.2}s, feedback: {}",
        entry.created_at,
        entry.source.as_str(),
        entry.question,
        entry.id,
        sql,
        entry.row_count,
        entry.sql_gen_seconds,
        entry.exec_seconds,
        entry.answer_gen_seconds,
        feedback_label(entry.feedback)
    )
}

/// Print the newest `limit` audit entries, newest first.
pub async fn list_entries<W: Write>(store: &dyn AuditStore, limit: i64, out: &mut W) -> Result<usize> {
    let entries = store.recent(limit).await?;
    if entries.is_empty() {
        writeln!(out, "No logged questions yet.")?;
    }
    for entry in &entries {
        writeln!(out, "{}\n", format_entry(entry))?;
    }
    Ok(entries.len())
}

pub async fn record_feedback(store: &dyn AuditStore, entry_id: &str, positive: bool) -> Result<()> {
    if store.set_feedback(entry_id, positive).await? {
        log::info!("Stored feedback for {}", entry_id);
        Ok(())
    } else {
        Err(Error::Config(format!("No logged question with id {}", entry_id)))
    }
}
