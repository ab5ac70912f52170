use std::sync::Arc;

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use serde_json::Value;
use spendtrack_client::{Method, UnauthorizedHandler};

use crate::config::Config;

mod account;
mod call;

#[derive(Debug, Parser)]
#[command(name = "spendtrack", about = "SpendTrack API client", long_about = None)]
pub(crate) struct Cli {
    #[command(flatten)]
    pub config: Config,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Sign in and store the session
    Login(account::LoginArgs),
    /// Create an account and sign in to it
    Register(account::RegisterArgs),
    /// Sign out and forget the stored session
    Logout,
    /// Show the signed-in user
    Whoami,
    /// GET an API path
    Get(call::ReadArgs),
    /// DELETE an API path
    Delete(call::ReadArgs),
    /// POST a JSON body to an API path
    Post(call::WriteArgs),
    /// PUT a JSON body to an API path
    Put(call::WriteArgs),
    /// PATCH an API path with a JSON body
    Patch(call::WriteArgs),
}

impl Cli {
    pub(crate) async fn run(self) -> Result<(), String> {
        let client = self.config.build_client(Arc::new(LoginHint))?;

        match self.command {
            Commands::Login(args) => account::login(&client, args).await,
            Commands::Register(args) => account::register(&client, args).await,
            Commands::Logout => account::logout(&client).await,
            Commands::Whoami => account::whoami(&client).await,
            Commands::Get(args) => call::read(&client, Method::Get, args).await,
            Commands::Delete(args) => call::read(&client, Method::Delete, args).await,
            Commands::Post(args) => call::write(&client, Method::Post, args).await,
            Commands::Put(args) => call::write(&client, Method::Put, args).await,
            Commands::Patch(args) => call::write(&client, Method::Patch, args).await,
        }
    }
}

/// Tells the user how to recover from an expired session.
#[derive(Debug)]
struct LoginHint;

#[async_trait]
impl UnauthorizedHandler for LoginHint {
    async fn on_session_expired(&self) {
        #[expect(
            clippy::print_stderr,
            reason = "user-facing hint, independent of the configured log level"
        )]
        {
            eprintln!("session expired; run `spendtrack login` to sign in again");
        }
    }
}

fn print_json(value: &Value) -> Result<(), String> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|error| format!("failed to render response: {error}"))?;

    println!("{rendered}");

    Ok(())
}
