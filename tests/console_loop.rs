mod common;

use std::io::Cursor;

use askql::db::audit::AuditStore;
use askql::ui::console::{run_console, ConsoleOptions};
use common::{default_model, harness, BROKEN_SQL};

async fn drive(h: &common::Harness, options: &ConsoleOptions, input: &str) -> String {
    let mut out = Vec::new();
    run_console(&h.state, options, Cursor::new(input.to_string()), &mut out)
        .await
        .unwrap();
    String::from_utf8(out).unwrap()
}

#[tokio::test]
async fn loop_survives_failed_sql_and_reports_it() {
    let h = harness(default_model());
    let input = "\n   \nHow many orders?\n:errors\nAnything broken?\n:errors\nCount all orders\n:clear-errors\n:errors\nQUIT\nHow many orders?\n";

    let out = drive(&h, &ConsoleOptions::default(), input).await;

    assert_eq!(out.matches("Please enter a valid question.").count(), 2);
    assert_eq!(out.matches("Thinking . . .").count(), 3);

    // The failing round shows its SQL and the error text, then the loop goes on
    let failure_at = out.find("Error: SQL execution failed").expect("error printed");
    let sql_at = out.find(BROKEN_SQL).expect("failing SQL printed");
    assert!(sql_at < failure_at);
    assert!(out.contains("missing_table\" does not exist"));
    assert!(out.contains("1. SQL execution failed"));

    // Same SQL from a different question is not logged again
    assert_eq!(out.matches("Query saved to database.").count(), 1);
    let duplicate_at = out.find("Duplicate query found, skipping...").expect("duplicate reported");
    assert!(duplicate_at > failure_at);

    assert_eq!(out.matches("No errors recorded.").count(), 2);
    assert!(out.contains("Error log cleared."));
    assert!(out.trim_end().ends_with("Goodbye!"));

    // Nothing after the exit keyword was asked
    assert_eq!(h.model.prompts_containing(r#"{"sql_query""#).len(), 3);
    assert_eq!(h.audit.recent(10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn end_of_input_stops_the_loop() {
    let h = harness(default_model());

    let out = drive(&h, &ConsoleOptions::default(), "How many orders?").await;

    assert!(out.contains("There are 3 orders."));
    assert!(!out.contains("Goodbye!"));
    assert_eq!(h.audit.recent(10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn non_read_only_sql_never_reaches_the_database() {
    let h = harness(default_model());

    let out = drive(&h, &ConsoleOptions::default(), "Wipe it\nexit\n").await;

    assert!(out.contains("DELETE FROM orders"));
    assert!(out.contains("Error: SQL execution failed: Refusing to run non read-only SQL"));
    assert!(h.database.executed.lock().unwrap().is_empty());
    assert_eq!(h.state.errors.errors().len(), 1);
}

#[tokio::test]
async fn feedback_is_stored_on_the_new_entry() {
    let h = harness(default_model());
    let options = ConsoleOptions {
        banner: "askql test".into(),
        feedback: true,
    };

    let out = drive(&h, &options, "How many orders?\ny\nCount all orders\nexit\n").await;

    assert!(out.starts_with("askql test\n"));
    // Only the inserted entry asks for feedback; the duplicate does not
    assert_eq!(out.matches("Was this answer helpful? (y/n): ").count(), 1);
    assert!(out.contains("Thanks, feedback saved."));
    let entries = h.audit.recent(10).await.unwrap();
    assert_eq!(entries[0].feedback, Some(true));
}

#[tokio::test]
async fn history_and_export() {
    let h = harness(default_model());
    let dir = tempfile::tempdir().unwrap();
    let csv_path = dir.path().join("orders.csv");
    let input = format!(
        ":export {}\nHow many orders?\n:history\n:export {}\n:export\n:nope\nq\n",
        csv_path.display(),
        csv_path.display()
    );

    let out = drive(&h, &ConsoleOptions::default(), &input).await;

    assert!(out.contains("No result to export yet."));
    assert!(out.contains("You: How many orders?"));
    assert!(out.contains("Answer: There are 3 orders."));
    assert!(out.contains(&format!("Exported 1 rows to {}", csv_path.display())));
    assert!(out.contains("Usage: :export <path>"));
    assert!(out.contains("Unknown command :nope."));
    assert_eq!(std::fs::read_to_string(&csv_path).unwrap(), "count\n3\n");
}

#[tokio::test]
async fn schema_command_lists_tables() {
    let h = harness(default_model());

    let out = drive(&h, &ConsoleOptions::default(), ":schema\n:help\nexit\n").await;

    assert!(out.contains("Schema \"public\" (1 tables)"));
    assert!(out.contains("orders\n  id integer [pk, not null]"));
    assert!(out.contains(":clear-errors"));
}
