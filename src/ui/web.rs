//! Chat widget served over HTTP.

use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, Json},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::commands::ask::Round;
use crate::error::{sanitize_error, Result};
use crate::models::{ChatMessage, LogSource};
use crate::state::AppState;
use crate::ui::console::EMPTY_INPUT;

pub type SharedState = Arc<AppState>;

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub question: String,
}

#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    pub log_id: String,
    pub positive: bool,
}

#[derive(Debug, Serialize)]
pub struct Suggestion {
    pub question: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorBody {
            error: sanitize_error(&message.into()),
        }),
    )
}

pub fn router(state: SharedState) -> Router {
    let api_routes = Router::new()
        .route("/ask", post(ask))
        .route("/messages", get(messages))
        .route("/feedback", post(feedback))
        .route("/suggestion", get(suggestion))
        .route("/health", get(health))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .route("/", get(index))
        .layer(CorsLayer::permissive())
}

pub async fn serve(state: SharedState, bind: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    log::info!("Chat listening on http://{}", listener.local_addr()?);
    println!("askql chat running on http://{}", bind);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// Run one round. Round failures are reported inside the body with a 200 status.
pub async fn ask(
    State(state): State<SharedState>,
    Json(request): Json<AskRequest>,
) -> std::result::Result<Json<Round>, ApiError> {
    let question = request.question.trim();
    if question.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, EMPTY_INPUT));
    }

    let round = state.assistant.ask(question, LogSource::Web).await;
    state.absorb_round(&round);
    Ok(Json(round))
}

pub async fn messages(State(state): State<SharedState>) -> Json<Vec<ChatMessage>> {
    Json(state.transcript.messages())
}

pub async fn feedback(
    State(state): State<SharedState>,
    Json(request): Json<FeedbackRequest>,
) -> std::result::Result<StatusCode, ApiError> {
    match state
        .assistant
        .audit()
        .set_feedback(&request.log_id, request.positive)
        .await
    {
        Ok(true) => Ok(StatusCode::NO_CONTENT),
        Ok(false) => Err(api_error(
            StatusCode::NOT_FOUND,
            format!("No logged question with id {}", request.log_id),
        )),
        Err(e) => {
            state.errors.log_error(format!("Saving feedback failed: {}", e));
            Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

/// A previously logged question, offered as an example.
pub async fn suggestion(State(state): State<SharedState>) -> Json<Suggestion> {
    let question = match state.assistant.audit().random_question().await {
        Ok(question) => question,
        Err(e) => {
            log::warn!("No suggestion available: {}", e);
            None
        }
    };
    Json(Suggestion { question })
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>askql</title>
<style>
  body { font-family: system-ui, sans-serif; margin: 0; background: #f4f5f7; }
  #chat { max-width: 820px; margin: 0 auto; padding: 16px 16px 96px; }
  .msg { margin: 10px 0; padding: 10px 14px; border-radius: 8px; background: #fff; white-space: pre-wrap; }
  .user { background: #dbeafe; margin-left: 20%; }
  .query, .rows { font-family: ui-monospace, monospace; font-size: 13px; overflow-x: auto; }
  .error { background: #fee2e2; }
  .feedback button { margin-right: 6px; }
  form { position: fixed; bottom: 0; left: 0; right: 0; display: flex; gap: 8px; padding: 12px;
         background: #fff; border-top: 1px solid #ddd; }
  input { flex: 1; padding: 10px; font-size: 15px; }
</style>
</head>
<body>
<div id="chat"></div>
<form id="ask">
  <input id="question" autocomplete="off" placeholder="Ask a question about your data">
  <button type="submit">Ask</button>
</form>
<script>
const chat = document.getElementById('chat');
const input = document.getElementById('question');

function add(kind, text) {
  const div = document.createElement('div');
  div.className = 'msg ' + kind;
  div.textContent = text;
  chat.appendChild(div);
  window.scrollTo(0, document.body.scrollHeight);
  return div;
}

function render(message) {
  const c = message.content;
  if (message.role === 'user') return add('user', c.data);
  if (c.type === 'query') return add('query', c.data);
  if (c.type === 'rows') return add('rows', c.data.markdown);
  if (c.type === 'error') return add('error', c.data);
  return add('answer', c.data);
}

function addFeedback(logId) {
  const div = add('feedback', 'Was this helpful? ');
  for (const [label, positive] of [['Yes', true], ['No', false]]) {
    const b = document.createElement('button');
    b.textContent = label;
    b.onclick = async () => {
      await fetch('/api/feedback', { method: 'POST', headers: { 'Content-Type': 'application/json' },
        body: JSON.stringify({ log_id: logId, positive }) });
      div.textContent = 'Thanks for the feedback.';
    };
    div.appendChild(b);
  }
}

document.getElementById('ask').onsubmit = async (e) => {
  e.preventDefault();
  const question = input.value.trim();
  if (!question) return;
  input.value = '';
  add('user', question);
  const thinking = add('answer', 'Thinking . . .');
  const res = await fetch('/api/ask', { method: 'POST', headers: { 'Content-Type': 'application/json' },
    body: JSON.stringify({ question }) });
  const round = await res.json();
  thinking.remove();
  if (!res.ok) { add('error', round.error); return; }
  if (round.query) add('query', round.query.sql_query);
  if (round.results) add('rows', round.results.row_count + ' rows');
  if (round.answer) add('answer', round.answer);
  if (round.error) add('error', round.error);
  if (round.audit && round.audit.status === 'inserted') addFeedback(round.audit.id);
};

(async () => {
  const messages = await (await fetch('/api/messages')).json();
  messages.forEach(render);
  if (!messages.length) {
    const s = await (await fetch('/api/suggestion')).json();
    if (s.question) input.placeholder = 'e.g. ' + s.question;
  }
})();
</script>
</body>
</html>
"#;
