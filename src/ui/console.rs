//! Interactive question loop.
//!
//! Generic over its input and output so the loop can be driven from tests. A failed round is
//! printed and recorded in the error log; only an exit keyword or end of input stops the loop.

use std::io::{self, BufRead, Write};
use std::path::Path;

use crate::commands::metadata;
use crate::models::{AuditOutcome, ChatMessage, LogSource, MessageContent, Role};
use crate::state::AppState;
use crate::ui::display;

pub const PROMPT: &str = "Enter your question: ";
pub const EMPTY_INPUT: &str = "Please enter a valid question.";
pub const THINKING: &str = "Thinking . . .";
pub const GOODBYE: &str = "Goodbye!";

const EXIT_KEYWORDS: [&str; 3] = ["exit", "quit", "q"];

const HELP: &str = "Commands:
  :schema            show the tables and columns questions are answered from
  :errors            list errors reported in this session
  :clear-errors      empty the error list
  :history           show this session's questions and answers
  :export <path>     write the last result set to a CSV file
  :help              show this help
  exit, quit, q      leave";

#[derive(Debug, Clone, Default)]
pub struct ConsoleOptions {
    pub banner: String,
    /// Ask for y/n feedback after each newly logged answer.
    pub feedback: bool,
}

pub fn is_exit_keyword(input: &str) -> bool {
    EXIT_KEYWORDS.iter().any(|k| input.eq_ignore_ascii_case(k))
}

fn read_trimmed<R: BufRead>(input: &mut R) -> io::Result<Option<String>> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

pub async fn run_console<R: BufRead, W: Write>(
    state: &AppState,
    options: &ConsoleOptions,
    mut input: R,
    out: &mut W,
) -> io::Result<()> {
    if !options.banner.is_empty() {
        writeln!(out, "{}", options.banner)?;
    }
    writeln!(out, "Type a question, :help for commands, or exit to leave.\n")?;

    loop {
        write!(out, "{}", PROMPT)?;
        out.flush()?;

        let Some(line) = read_trimmed(&mut input)? else {
            writeln!(out)?;
            break;
        };

        if is_exit_keyword(&line) {
            writeln!(out, "{}", GOODBYE)?;
            break;
        }
        if line.is_empty() {
            writeln!(out, "{}", EMPTY_INPUT)?;
            continue;
        }
        if let Some(command) = line.strip_prefix(':') {
            run_meta_command(state, command, out)?;
            continue;
        }

        writeln!(out, "{}", THINKING)?;
        let round = state.assistant.ask(&line, LogSource::Console).await;
        display::print_round(out, &round, state.preview_rows)?;
        state.absorb_round(&round);

        if options.feedback {
            if let Some(AuditOutcome::Inserted(id)) = &round.audit {
                ask_feedback(state, id, &mut input, out).await?;
            }
        }
        writeln!(out)?;
    }

    Ok(())
}

async fn ask_feedback<R: BufRead, W: Write>(
    state: &AppState,
    entry_id: &str,
    input: &mut R,
    out: &mut W,
) -> io::Result<()> {
    write!(out, "Was this answer helpful? (y/n): ")?;
    out.flush()?;

    let positive = match read_trimmed(input)?.as_deref().map(str::to_ascii_lowercase).as_deref() {
        Some("y") | Some("yes") => true,
        Some("n") | Some("no") => false,
        _ => return Ok(()),
    };

    if let Err(e) = state.assistant.audit().set_feedback(entry_id, positive).await {
        let message = format!("Saving feedback failed: {}", e);
        writeln!(out, "Error: {}", message)?;
        state.errors.log_error(message);
    } else {
        writeln!(out, "Thanks, feedback saved.")?;
    }
    Ok(())
}

fn run_meta_command<W: Write>(state: &AppState, command: &str, out: &mut W) -> io::Result<()> {
    let (name, arg) = match command.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (command, ""),
    };

    match name {
        "schema" => write!(out, "{}", metadata::describe_schema(&state.snapshot))?,
        "errors" => {
            let errors = state.errors.errors();
            if errors.is_empty() {
                writeln!(out, "No errors recorded.")?;
            }
            for (i, error) in errors.iter().enumerate() {
                writeln!(out, "{}. {}", i + 1, error)?;
            }
        }
        "clear-errors" => {
            state.errors.clear();
            writeln!(out, "Error log cleared.")?;
        }
        "history" => print_history(&state.transcript.messages(), out)?,
        "export" if arg.is_empty() => writeln!(out, "Usage: :export <path>")?,
        "export" => match state.last_result() {
            None => writeln!(out, "No result to export yet.")?,
            Some(results) => match results.write_csv(Path::new(arg)) {
                Ok(()) => writeln!(out, "Exported {} rows to {}", results.rows.len(), arg)?,
                Err(e) => {
                    let message = format!("Export failed: {}", e);
                    writeln!(out, "Error: {}", message)?;
                    state.errors.log_error(message);
                }
            },
        },
        "help" => writeln!(out, "{}", HELP)?,
        other => writeln!(out, "Unknown command :{}. Type :help for a list.", other)?,
    }
    Ok(())
}

fn print_history<W: Write>(messages: &[ChatMessage], out: &mut W) -> io::Result<()> {
    if messages.is_empty() {
        return writeln!(out, "No questions asked yet.");
    }
    for message in messages {
        match (&message.role, &message.content) {
            (Role::User, MessageContent::Text(text)) => writeln!(out, "\nYou: {}", text)?,
            (_, MessageContent::Text(text)) => writeln!(out, "{}", text)?,
            (_, MessageContent::Query(sql)) => writeln!(out, "SQL: {}", sql)?,
            (_, MessageContent::Rows { row_count, .. }) => writeln!(out, "Rows: {}", row_count)?,
            (_, MessageContent::Answer(answer)) => writeln!(out, "Answer: {}", answer)?,
            (_, MessageContent::Error(error)) => writeln!(out, "Error: {}", error)?,
        }
    }
    Ok(())
}
