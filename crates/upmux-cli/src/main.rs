//! Upmux CLI entry point

mod check;
mod cli;
mod logging;

use std::process::ExitCode;

use clap::Parser;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present, before any configuration is read
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let _guard = logging::init_tracing(cli.verbose);

    let outcome = match cli.command {
        Commands::Check(args) => check::run(args).await,
    };

    match outcome {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
