use clap::Parser;
use std::process::ExitCode;

use askql::cli::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match askql::run(cli).await {
        Ok(code) => code,
        Err(e) => {
            let message = e.user_message();
            log::error!("{}", message);
            eprintln!("Error: {}", message);
            ExitCode::FAILURE
        }
    }
}
