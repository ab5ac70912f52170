//! SpendTrack command-line client

use std::process::ExitCode;

use clap::Parser;

use crate::cli::Cli;

mod cli;
mod config;
mod observability;

#[tokio::main]
pub async fn main() -> ExitCode {
    // Load .env file if present (ignore if missing)
    _ = dotenvy::dotenv();

    let cli = Cli::parse();

    if let Err(error) = observability::init_subscriber(&cli.config.logging) {
        #[expect(
            clippy::print_stderr,
            reason = "logging failed to initialise, must use eprintln"
        )]
        {
            eprintln!("{error}");
        }

        return ExitCode::FAILURE;
    }

    if let Err(error) = cli.run().await {
        #[expect(
            clippy::print_stderr,
            reason = "command errors are reported to the user on stderr"
        )]
        {
            eprintln!("{error}");
        }

        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
