use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::models::{AppSettings, AuditBackend, ConnectionConfig, LlmProvider, SslMode};

#[derive(Parser, Debug)]
#[command(name = "askql")]
#[command(version, about = "Ask questions about a PostgreSQL database in plain language", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Args, Debug, Default)]
pub struct GlobalArgs {
    /// Database host
    #[arg(long, global = true, env = "PGHOST")]
    pub host: Option<String>,

    #[arg(long, global = true, env = "PGPORT")]
    pub port: Option<u16>,

    #[arg(long, global = true, env = "PGDATABASE")]
    pub database: Option<String>,

    #[arg(long, global = true, env = "PGUSER")]
    pub user: Option<String>,

    /// Falls back to the OS keychain when not given
    #[arg(long, global = true, env = "PGPASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// disable, prefer or require
    #[arg(long, global = true, env = "PGSSLMODE")]
    pub sslmode: Option<SslMode>,

    /// Schema whose tables questions are answered from
    #[arg(long, global = true, env = "ASKQL_SCHEMA")]
    pub schema: Option<String>,

    /// Base URL of the completion endpoint
    #[arg(long, global = true, env = "ASKQL_LLM_URL")]
    pub llm_url: Option<String>,

    #[arg(long, global = true, env = "ASKQL_LLM_MODEL")]
    pub llm_model: Option<String>,

    /// Model used for answers; defaults to --llm-model
    #[arg(long, global = true, env = "ASKQL_ANSWER_MODEL")]
    pub answer_model: Option<String>,

    /// openai (any compatible gateway) or ollama
    #[arg(long, global = true, env = "ASKQL_LLM_PROVIDER")]
    pub llm_provider: Option<LlmProvider>,

    #[arg(long, global = true, env = "ASKQL_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Log rounds to a Postgres table through this connection string instead of the local file
    #[arg(long, global = true, env = "ASKQL_AUDIT_URL", hide_env_values = true)]
    pub audit_url: Option<String>,

    /// Directory holding the local store (default: ~/.askql)
    #[arg(long, global = true, env = "ASKQL_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// JSON settings file layered over the stored settings
    #[arg(long, global = true, env = "ASKQL_CONFIG")]
    pub config: Option<PathBuf>,

    /// More log output (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Interactive question loop (default)
    Chat {
        /// Ask for y/n feedback after each logged answer
        #[arg(long)]
        feedback: bool,
    },

    /// Answer a single question and exit
    Ask {
        question: String,

        /// Also write the result rows to this CSV file
        #[arg(long)]
        csv: Option<PathBuf>,
    },

    /// Generate and answer new KPI questions
    Explore {
        #[arg(long, default_value = "10")]
        count: usize,
    },

    /// Serve the chat widget over HTTP
    Serve {
        #[arg(long, default_value = "127.0.0.1:8080")]
        bind: String,
    },

    /// Print the introspected schema
    Schema,

    /// Inspect the audit log
    Log {
        #[command(subcommand)]
        action: LogAction,
    },

    /// Manage stored settings and secrets
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum LogAction {
    /// Show the most recent entries
    List {
        #[arg(long, default_value = "20")]
        limit: i64,
    },
    /// Rate a logged answer
    Feedback {
        id: String,
        /// good/bad, y/n or yes/no
        verdict: String,
    },
    /// Delete every entry
    Clear,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective settings
    Show,
    /// Persist the effective settings to the local store
    Save,
    /// Store the database password in the OS keychain
    SetPassword { password: String },
    /// Store the LLM API key in the OS keychain
    SetApiKey { api_key: String },
}

pub fn parse_verdict(verdict: &str) -> Option<bool> {
    match verdict.to_ascii_lowercase().as_str() {
        "y" | "yes" | "good" | "up" | "1" | "true" => Some(true),
        "n" | "no" | "bad" | "down" | "0" | "false" => Some(false),
        _ => None,
    }
}

impl GlobalArgs {
    pub fn connection_config(&self) -> ConnectionConfig {
        let mut config = ConnectionConfig::default();
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(database) = &self.database {
            config.database = database.clone();
        }
        if let Some(user) = &self.user {
            config.username = user.clone();
        }
        if let Some(password) = &self.password {
            config.password = password.clone();
        }
        if let Some(ssl_mode) = self.sslmode {
            config.ssl_mode = ssl_mode;
        }
        if let Some(schema) = &self.schema {
            config.schema = schema.clone();
        }
        config
    }

    /// Flags and environment win over every other settings source.
    pub fn apply_overrides(&self, settings: &mut AppSettings) {
        if let Some(url) = &self.llm_url {
            settings.llm.base_url = url.clone();
        }
        if let Some(model) = &self.llm_model {
            settings.llm.model = model.clone();
        }
        if let Some(model) = &self.answer_model {
            settings.llm.answer_model = Some(model.clone());
        }
        if let Some(provider) = self.llm_provider {
            settings.llm.provider = provider;
        }
        if let Some(key) = &self.api_key {
            settings.llm.api_key = Some(key.clone());
        }
        if let Some(url) = &self.audit_url {
            settings.audit.backend = AuditBackend::Postgres;
            settings.audit.url = Some(url.clone());
        }
    }
}
