//! SmartNotes CLI - offline-first notes from the terminal
//!
//! Every command works against the local cache; `sync` and `watch` talk to
//! the server when a session is stored.

mod auth;
mod cli;
mod commands;
mod config;
mod error;

use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use crate::cli::{AddArgs, Cli, Commands};
use crate::commands::add::run_add;
use crate::commands::auth_cmd::run_auth;
use crate::commands::common::resolve_db_path;
use crate::commands::completions::run_completions;
use crate::commands::config::run_config;
use crate::commands::delete::run_delete;
use crate::commands::edit::run_edit;
use crate::commands::list::run_list;
use crate::commands::show::run_show;
use crate::commands::sync::{run_conflicts, run_resolve, run_sync};
use crate::commands::toggle::run_toggle;
use crate::commands::watch::run_watch;
use crate::config::{load_effective, resolve_config_path};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("smartnotes=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_path = resolve_config_path(cli.config)?;

    let command = match cli.command {
        Some(Commands::Config { command }) => return run_config(command, &config_path),
        Some(Commands::Completions { shell, output }) => {
            return run_completions(shell, output.as_deref());
        }
        Some(command) => command,
        None if cli.note.is_empty() => {
            Cli::command().print_help()?;
            println!();
            return Ok(());
        }
        // Quick capture mode: smartnotes "my note"
        None => Commands::Add(AddArgs {
            title: cli.note,
            content: None,
            tags: Vec::new(),
            remind: None,
            pin: false,
            favorite: false,
        }),
    };

    let config = load_effective(&config_path)?;
    let db_path = resolve_db_path(cli.db_path)?;

    match command {
        Commands::Add(args) => run_add(args, &config, &db_path),
        Commands::List(args) => run_list(&args, &config, &db_path),
        Commands::Show { id, json } => run_show(&id, json, &config, &db_path),
        Commands::Edit(args) => run_edit(&args, &config, &db_path),
        Commands::Delete { id } => run_delete(&id, &config, &db_path),
        Commands::Toggle { field, id } => run_toggle(field, &id, &config, &db_path),
        Commands::Sync => run_sync(&config, &db_path).await,
        Commands::Conflicts { json } => run_conflicts(json, &config, &db_path),
        Commands::Resolve { id, resubmit, .. } => run_resolve(&id, resubmit, &config, &db_path),
        Commands::Auth { command } => run_auth(command, &config).await,
        Commands::Watch => run_watch(&config, &db_path).await,
        Commands::Config { .. } | Commands::Completions { .. } => Ok(()),
    }
}
