mod common;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use std::sync::Arc;

use askql::commands::explore::{explore, ExploreReport};
use askql::db::audit::AuditStore;
use askql::models::{ExploreSettings, MessageContent};
use askql::state::ErrorLog;
use askql::ui::web::{self, AskRequest, FeedbackRequest};
use common::{default_model, harness, snapshot, BROKEN_SQL, COUNT_SQL};

#[tokio::test]
async fn explore_counts_only_new_kpis() {
    let model = default_model()
        .sql("Which weekday has the most orders?", COUNT_SQL)
        .sql("Which region lost the most orders?", BROKEN_SQL)
        .sql("What is the order volume per weekday?", COUNT_SQL)
        .generated_questions(&[
            "Which weekday has the most orders?",
            "Which region lost the most orders?",
            "What is the order volume per weekday?",
        ]);
    let h = harness(model);
    let errors = ErrorLog::default();
    let mut out = Vec::new();

    let report = explore(
        &h.state.assistant,
        &snapshot(),
        &ExploreSettings::default(),
        4,
        20,
        &errors,
        &mut out,
    )
    .await
    .unwrap();

    assert_eq!(
        report,
        ExploreReport {
            attempted: 4,
            new_kpis: 1,
            duplicates: 1,
            failures: 2,
        }
    );
    let out = String::from_utf8(out).unwrap();
    assert!(out.trim_end().ends_with("New KPIs generated: 1"));
    assert!(out.contains("Question generation failed"));
    assert_eq!(errors.errors().len(), 2);

    // Each generation sees the questions produced before it
    let question_prompts = h.model.prompts_containing(r#"{"question""#);
    assert!(question_prompts[0].contains("No previous questions."));
    assert!(question_prompts[2].contains("- Which weekday has the most orders?\n- Which region lost the most orders?"));

    // Sample rows were fetched for the explorer prompt
    let executed = h.database.executed.lock().unwrap();
    assert_eq!(executed[0], "SELECT * FROM \"orders\" ORDER BY random() LIMIT 10");
}

#[tokio::test]
async fn web_chat_round_trip() {
    let h = harness(default_model());
    let state = Arc::new(h.state);

    let Json(round) = web::ask(
        State(state.clone()),
        Json(AskRequest {
            question: "How many orders?".into(),
        }),
    )
    .await
    .unwrap();
    assert_eq!(round.answer.as_deref(), Some("There are 3 orders."));
    let log_id = round.audit.as_ref().unwrap().id().to_string();

    let Json(failed) = web::ask(
        State(state.clone()),
        Json(AskRequest {
            question: "Anything broken?".into(),
        }),
    )
    .await
    .unwrap();
    let body = serde_json::to_value(&failed).unwrap();
    assert_eq!(body["query"]["sql_query"], BROKEN_SQL);
    assert!(body["error"].as_str().unwrap().contains("missing_table"));

    let (status, _) = web::ask(State(state.clone()), Json(AskRequest { question: "  ".into() }))
        .await
        .unwrap_err();
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let Json(messages) = web::messages(State(state.clone())).await;
    assert_eq!(messages.len(), 7);
    assert!(matches!(messages.last().unwrap().content, MessageContent::Error(_)));

    let status = web::feedback(
        State(state.clone()),
        Json(FeedbackRequest {
            log_id: log_id.clone(),
            positive: false,
        }),
    )
    .await
    .unwrap();
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(h.audit.recent(1).await.unwrap()[0].feedback, Some(false));

    let (status, _) = web::feedback(
        State(state.clone()),
        Json(FeedbackRequest {
            log_id: "nope".into(),
            positive: true,
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(status, StatusCode::NOT_FOUND);

    let Json(suggestion) = web::suggestion(State(state)).await;
    assert_eq!(suggestion.question.as_deref(), Some("How many orders?"));
}
