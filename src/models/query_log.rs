use serde::{Deserialize, Serialize};

/// Where a round originated.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogSource {
    Console,
    Web,
    Explore,
    Cli,
}

impl LogSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogSource::Console => "console",
            LogSource::Web => "web",
            LogSource::Explore => "explore",
            LogSource::Cli => "cli",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "web" => LogSource::Web,
            "explore" => LogSource::Explore,
            "cli" => LogSource::Cli,
            _ => LogSource::Console,
        }
    }
}

/// A successful round, ready to be written to the audit table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLogEntry {
    pub question: String,
    pub sql_query: String,
    pub answer: String,
    pub sql_gen_seconds: f64,
    pub exec_seconds: f64,
    pub answer_gen_seconds: f64,
    pub row_count: i64,
    pub source: LogSource,
}

impl NewLogEntry {
    /// SQL text compared for duplicate detection.
    pub fn dedup_key(&self) -> &str {
        self.sql_query.trim()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub id: String,
    pub question: String,
    pub sql_query: String,
    pub answer: String,
    pub sql_gen_seconds: f64,
    pub exec_seconds: f64,
    pub answer_gen_seconds: f64,
    pub row_count: i64,
    pub results_returned: bool,
    pub feedback: Option<bool>,
    pub source: LogSource,
    pub created_at: String, // ISO 8601
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "id", rename_all = "lowercase")]
pub enum AuditOutcome {
    Inserted(String),
    /// An entry with the same SQL text already exists; carries its id.
    Duplicate(String),
}

impl AuditOutcome {
    pub fn id(&self) -> &str {
        match self {
            AuditOutcome::Inserted(id) | AuditOutcome::Duplicate(id) => id,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, AuditOutcome::Duplicate(_))
    }
}
