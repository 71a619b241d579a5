use std::sync::{Mutex, MutexGuard};

use crate::commands::ask::{Assistant, Round};
use crate::commands::query::ResultSet;
use crate::models::{ChatMessage, MessageContent, SchemaSnapshot};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panic while holding one of these locks leaves plain data behind; keep using it
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Errors reported during this session.
#[derive(Default)]
pub struct ErrorLog {
    entries: Mutex<Vec<String>>,
}

impl ErrorLog {
    pub fn log_error(&self, message: impl Into<String>) {
        lock(&self.entries).push(message.into());
    }

    pub fn errors(&self) -> Vec<String> {
        lock(&self.entries).clone()
    }

    pub fn clear(&self) {
        lock(&self.entries).clear();
    }
}

#[derive(Default)]
pub struct Transcript {
    messages: Mutex<Vec<ChatMessage>>,
}

impl Transcript {
    pub fn push(&self, message: ChatMessage) {
        lock(&self.messages).push(message);
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        lock(&self.messages).clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.messages).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append the question and one assistant message per artifact the round produced.
    pub fn record_round(&self, round: &Round, preview_rows: usize) {
        let mut messages = vec![ChatMessage::user(round.question.clone())];
        if let Some(sql) = round.sql() {
            messages.push(ChatMessage::assistant(MessageContent::Query(sql.to_string())));
        }
        if let Some(results) = &round.results {
            messages.push(ChatMessage::assistant(MessageContent::Rows {
                markdown: results.to_markdown(preview_rows),
                row_count: results.row_count,
            }));
        }
        if let Some(answer) = &round.answer {
            messages.push(ChatMessage::assistant(MessageContent::Answer(answer.clone())));
        }
        if let Some(error) = round.error_text() {
            messages.push(ChatMessage::assistant(MessageContent::Error(error)));
        }
        lock(&self.messages).extend(messages);
    }
}

/// Everything a chat session shares between requests.
pub struct AppState {
    pub assistant: Assistant,
    pub snapshot: SchemaSnapshot,
    pub errors: ErrorLog,
    pub transcript: Transcript,
    pub preview_rows: usize,
    last_result: Mutex<Option<ResultSet>>,
}

impl AppState {
    pub fn new(assistant: Assistant, snapshot: SchemaSnapshot, preview_rows: usize) -> Self {
        Self {
            assistant,
            snapshot,
            errors: ErrorLog::default(),
            transcript: Transcript::default(),
            preview_rows,
            last_result: Mutex::new(None),
        }
    }

    /// Record a finished round in the transcript, the error log and the last-result slot.
    pub fn absorb_round(&self, round: &Round) {
        self.transcript.record_round(round, self.preview_rows);
        if let Some(error) = round.error_text() {
            self.errors.log_error(error);
        }
        if let Some(results) = &round.results {
            *lock(&self.last_result) = Some(results.clone());
        }
    }

    pub fn last_result(&self) -> Option<ResultSet> {
        lock(&self.last_result).clone()
    }
}
