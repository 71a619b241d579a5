use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// Any OpenAI-compatible chat completions endpoint (OpenAI, LiteLLM, vLLM).
    #[default]
    OpenAi,
    Ollama,
}

impl std::str::FromStr for LlmProvider {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> crate::error::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "openai" => Ok(LlmProvider::OpenAi),
            "ollama" => Ok(LlmProvider::Ollama),
            other => Err(crate::error::Error::Config(format!(
                "Unknown LLM provider: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LlmSettings {
    pub provider: LlmProvider,
    pub base_url: String,
    pub model: String,
    /// Model used for summarizing results; falls back to `model`.
    pub answer_model: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_seconds: u64,
    /// Never persisted; resolved from flags, environment or the keychain.
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for LlmSettings {
    fn default() -> Self {
        LlmSettings {
            provider: LlmProvider::OpenAi,
            base_url: "http://localhost:8000".to_string(),
            model: "llama3.1:8b".to_string(),
            answer_model: None,
            temperature: 0.1,
            max_tokens: 4096,
            timeout_seconds: 120,
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QuerySettings {
    /// Rows kept from a result set.
    pub row_limit: u32,
    /// Rows shown on screen.
    pub preview_rows: usize,
    /// Rows handed to the answer prompt.
    pub prompt_rows: usize,
    pub statement_timeout_seconds: u32,
}

impl Default for QuerySettings {
    fn default() -> Self {
        QuerySettings {
            row_limit: 1000,
            preview_rows: 20,
            prompt_rows: 100,
            statement_timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectSettings {
    pub max_attempts: u32,
    pub retry_delay_seconds: u64,
    /// Per-attempt limit for the first connection, also the pool acquire timeout.
    pub acquire_timeout_seconds: u64,
}

impl Default for ConnectSettings {
    fn default() -> Self {
        ConnectSettings {
            max_attempts: 5,
            retry_delay_seconds: 2,
            acquire_timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AuditBackend {
    #[default]
    Sqlite,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuditSettings {
    pub backend: AuditBackend,
    /// SQLite file; defaults to `askql.db` in the data directory.
    pub path: Option<PathBuf>,
    /// Postgres audit table, used with the postgres backend.
    pub table: String,
    /// Connection string of a write-enabled role for the postgres backend.
    #[serde(skip)]
    pub url: Option<String>,
}

impl Default for AuditSettings {
    fn default() -> Self {
        AuditSettings {
            backend: AuditBackend::Sqlite,
            path: None,
            table: "askql_query_log".to_string(),
            url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExploreSettings {
    pub sample_rows: u32,
    pub sample_tables: usize,
}

impl Default for ExploreSettings {
    fn default() -> Self {
        ExploreSettings {
            sample_rows: 10,
            sample_tables: 3,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub llm: LlmSettings,
    pub query: QuerySettings,
    pub connect: ConnectSettings,
    pub audit: AuditSettings,
    pub explore: ExploreSettings,
}
