//! Ask questions about a PostgreSQL database in plain language.
//!
//! A question goes through SQL generation, read-only execution, answer generation and an
//! audit log that keeps one entry per distinct SQL text. The console loop, the one-shot `ask`
//! command, the KPI explorer and the web chat all drive the same [`commands::Assistant`].

pub mod cli;
pub mod commands;
pub mod db;
pub mod error;
pub mod llm;
pub mod models;
pub mod state;
pub mod ui;

use rusqlite::Connection as SqliteConnection;
use sqlx::PgPool;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use cli::{Cli, Command, ConfigAction, GlobalArgs, LogAction};
use commands::{Assistant, ExecOptions, PgExecutor};
use db::audit::{AuditStore, PgAuditStore, SqliteAuditStore};
use db::{credentials, postgres, sqlite};
use error::{Error, Result};
use llm::{CompletionModel, LlmClient};
use models::{validate_schema_name, AppSettings, AuditBackend, ConnectionConfig, LogSource, SchemaSnapshot};
use state::{AppState, ErrorLog};
use ui::console::{self, ConsoleOptions};

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    // RUST_LOG still wins when set
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_millis()
        .try_init();
}

pub fn default_data_dir() -> PathBuf {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(|home| PathBuf::from(home).join(".askql"))
        .unwrap_or_else(|| PathBuf::from(".askql"))
}

/// Defaults, then stored settings, then the settings file, then flags and environment.
fn resolve_settings(global: &GlobalArgs, local: &SqliteConnection) -> Result<AppSettings> {
    let mut settings = commands::settings::load_settings(local, global.config.as_deref())?;
    global.apply_overrides(&mut settings);
    if settings.llm.api_key.is_none() {
        settings.llm.api_key = credentials::lookup_or_none(credentials::get_api_key());
    }
    Ok(settings)
}

fn resolve_connection(global: &GlobalArgs) -> Result<ConnectionConfig> {
    let mut connection = global.connection_config();
    validate_schema_name(&connection.schema)?;
    if connection.password.is_empty() {
        connection.password =
            credentials::lookup_or_none(credentials::get_password(&connection.credential_key()))
                .unwrap_or_default();
    }
    Ok(connection)
}

async fn open_audit_store(
    settings: &AppSettings,
    local: SqliteConnection,
) -> Result<Arc<dyn AuditStore>> {
    match settings.audit.backend {
        AuditBackend::Sqlite => {
            let conn = match &settings.audit.path {
                Some(path) => sqlite::open_database(path)?,
                None => local,
            };
            Ok(Arc::new(SqliteAuditStore::new(conn)))
        }
        AuditBackend::Postgres => {
            let url = settings.audit.url.as_deref().ok_or_else(|| {
                Error::Config("The postgres audit backend needs --audit-url".to_string())
            })?;
            let pool = postgres::connect_url_with_retry(url, &settings.connect).await?;
            Ok(Arc::new(PgAuditStore::new(pool, &settings.audit.table).await?))
        }
    }
}

struct Session {
    assistant: Assistant,
    snapshot: SchemaSnapshot,
    connection: ConnectionConfig,
}

async fn start_session(
    global: &GlobalArgs,
    settings: &AppSettings,
    audit: Arc<dyn AuditStore>,
) -> Result<Session> {
    let connection = resolve_connection(global)?;
    let pool: PgPool = postgres::connect_with_retry(&connection, &settings.connect).await?;
    let snapshot = postgres::load_schema(&pool, &connection.schema).await?;
    if snapshot.is_empty() {
        log::warn!("Schema {} has no tables; generated SQL will have nothing to use", connection.schema);
    }

    let sql_model: Arc<dyn CompletionModel> = Arc::new(LlmClient::new(&settings.llm)?);
    let answer_model: Arc<dyn CompletionModel> = match &settings.llm.answer_model {
        Some(model) => Arc::new(LlmClient::with_model(&settings.llm, model)?),
        None => sql_model.clone(),
    };
    let executor = Arc::new(PgExecutor::new(
        pool,
        ExecOptions::new(&connection.schema, &settings.query),
    ));

    let assistant = Assistant::new(
        sql_model,
        answer_model,
        executor,
        audit,
        snapshot.render(),
        settings.query.prompt_rows,
    );

    Ok(Session {
        assistant,
        snapshot,
        connection,
    })
}

fn banner(session: &Session, settings: &AppSettings) -> String {
    let c = &session.connection;
    format!(
        "askql: {}@{}:{}/{} schema {} ({} tables), model {}",
        c.username,
        c.host,
        c.port,
        c.database,
        c.schema,
        session.snapshot.tables.len(),
        settings.llm.model
    )
}

fn run_config(
    action: ConfigAction,
    global: &GlobalArgs,
    settings: &AppSettings,
    local: &SqliteConnection,
    data_dir: &Path,
) -> Result<()> {
    match action {
        ConfigAction::Show => {
            println!("{}", commands::settings::show_settings(settings)?);
            let connection = global.connection_config();
            println!("{}", serde_json::to_string_pretty(&connection)?);
        }
        ConfigAction::Save => {
            commands::settings::save_settings(local, settings)?;
            println!("Settings saved to {}", data_dir.join(sqlite::DATABASE_FILE).display());
        }
        ConfigAction::SetPassword { password } => {
            let key = global.connection_config().credential_key();
            credentials::store_password(&key, &password)?;
            println!("Password stored in the keychain for {}", key);
        }
        ConfigAction::SetApiKey { api_key } => {
            credentials::store_api_key(&api_key)?;
            println!("API key stored in the keychain");
        }
    }
    Ok(())
}

async fn run_log(action: LogAction, audit: &dyn AuditStore) -> Result<()> {
    match action {
        LogAction::List { limit } => {
            commands::query_log::list_entries(audit, limit, &mut io::stdout().lock()).await?;
        }
        LogAction::Feedback { id, verdict } => {
            let positive = cli::parse_verdict(&verdict)
                .ok_or_else(|| Error::Config(format!("Unrecognized verdict: {}", verdict)))?;
            commands::query_log::record_feedback(audit, &id, positive).await?;
            println!("Feedback stored.");
        }
        LogAction::Clear => {
            let deleted = audit.clear().await?;
            println!("Deleted {} entries.", deleted);
        }
    }
    Ok(())
}

pub async fn run(cli: Cli) -> Result<ExitCode> {
    let Cli { global, command } = cli;
    init_logging(global.verbose);

    let data_dir = global.data_dir.clone().unwrap_or_else(default_data_dir);
    let local = sqlite::init_database(&data_dir)?;
    let settings = resolve_settings(&global, &local)?;

    let command = command.unwrap_or(Command::Chat { feedback: false });
    if let Command::Config { action } = command {
        run_config(action, &global, &settings, &local, &data_dir)?;
        return Ok(ExitCode::SUCCESS);
    }

    let audit = open_audit_store(&settings, local).await?;
    if let Command::Log { action } = command {
        run_log(action, audit.as_ref()).await?;
        return Ok(ExitCode::SUCCESS);
    }

    let session = start_session(&global, &settings, audit).await?;
    let preview_rows = settings.query.preview_rows;

    match command {
        Command::Chat { feedback } => {
            let options = ConsoleOptions {
                banner: banner(&session, &settings),
                feedback,
            };
            let state = AppState::new(session.assistant, session.snapshot, preview_rows);
            let stdin = io::stdin();
            console::run_console(&state, &options, stdin.lock(), &mut io::stdout()).await?;
        }
        Command::Ask { question, csv } => {
            let round = session.assistant.ask(&question, LogSource::Cli).await;
            let mut out = io::stdout();
            ui::display::print_round(&mut out, &round, preview_rows)?;
            if let (Some(path), Some(results)) = (csv, &round.results) {
                results.write_csv(&path)?;
                writeln!(out, "Wrote {} rows to {}", results.rows.len(), path.display())?;
            }
            if !round.succeeded() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Explore { count } => {
            let errors = ErrorLog::default();
            commands::explore::explore(
                &session.assistant,
                &session.snapshot,
                &settings.explore,
                count,
                preview_rows,
                &errors,
                &mut io::stdout(),
            )
            .await?;
        }
        Command::Serve { bind } => {
            let state = Arc::new(AppState::new(session.assistant, session.snapshot, preview_rows));
            ui::web::serve(state, &bind).await?;
        }
        Command::Schema => {
            println!("{}", session.snapshot.render().trim_start());
        }
        Command::Config { .. } | Command::Log { .. } => {}
    }

    Ok(ExitCode::SUCCESS)
}
