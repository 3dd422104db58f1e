//! Notely CLI - read and write Dicoding notes from the terminal
//!
//! Writes made while the API is unreachable are queued on disk and replayed
//! by `notely sync`.

mod cli;
mod commands;
mod config;
mod error;

use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::commands::add::run_add;
use crate::commands::archive::{run_archive, run_unarchive};
use crate::commands::common::open_context;
use crate::commands::completions::run_completions;
use crate::commands::config::run_config;
use crate::commands::delete::run_delete;
use crate::commands::edit::run_edit;
use crate::commands::export::run_export;
use crate::commands::list::run_list;
use crate::commands::queue::run_queue;
use crate::commands::show::run_show;
use crate::commands::stats::run_stats;
use crate::commands::sync::run_sync;
use crate::config::{CliConfig, Overrides, Settings};
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

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("notely=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let overrides = Overrides::from_flags_and_env(cli.api_url, cli.data_dir);

    match cli.command {
        Commands::Completions { shell, output } => run_completions(shell, output.as_deref()),
        Commands::Config { command } => run_config(command, &overrides),
        command => {
            let settings = Settings::resolve(&CliConfig::load()?, &overrides)?;
            let context = open_context(&settings)?;
            match command {
                Commands::List {
                    archived,
                    query,
                    sort,
                    json,
                } => run_list(&context, archived, query.as_deref(), sort.into(), json).await,
                Commands::Show { id, json } => run_show(&context, &id, json).await,
                Commands::Add { title, body } => run_add(&context, &title, &body).await,
                Commands::Edit { id, title, body } => run_edit(&context, &id, title, body).await,
                Commands::Delete { id } => run_delete(&context, &id).await,
                Commands::Archive { id } => run_archive(&context, &id).await,
                Commands::Unarchive { id } => run_unarchive(&context, &id).await,
                Commands::Stats { json } => run_stats(&context, json).await,
                Commands::Export { format, output } => {
                    run_export(&context, format, output.as_deref()).await
                }
                Commands::Sync => run_sync(&context).await,
                Commands::Queue { command } => run_queue(&context, command),
                Commands::Completions { .. } | Commands::Config { .. } => Ok(()),
            }
        }
    }
}
