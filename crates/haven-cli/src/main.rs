//! Haven CLI - raise emergencies and sync them from the terminal.

mod auth;
mod cli;
mod commands;
mod error;

use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::commands::{
    alert::{run_alert, AlertArgs},
    auth_cmd::run_auth,
    cancel::run_cancel,
    common::resolve_db_path,
    completions::run_completions,
    conflicts::run_conflicts,
    delete::run_delete,
    list::run_list,
    purge::run_purge,
    resolve::run_resolve,
    sync::run_sync,
    watch::run_watch,
};
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
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(
                "haven=info"
                    .parse()
                    .map_err(|error| CliError::Config(format!("{error}")))?,
            ),
        )
        .init();

    let cli = Cli::parse();
    if let Commands::Completions { shell, output } = &cli.command {
        return run_completions(*shell, output.as_deref());
    }
    let db_path = resolve_db_path(cli.db_path)?;

    match cli.command {
        Commands::Alert {
            emergency_type,
            lat,
            lon,
            address,
            message,
            priority,
            user,
            offline,
        } => {
            let args = AlertArgs {
                emergency_type,
                coordinates: lat.zip(lon),
                address,
                message,
                priority,
                user,
                offline,
            };
            run_alert(args, &db_path).await?;
        }
        Commands::List { user, json } => run_list(user.as_deref(), json, &db_path).await?,
        Commands::Cancel { id } => run_cancel(&id, &db_path).await?,
        Commands::Delete { id } => run_delete(&id, &db_path).await?,
        Commands::Sync => run_sync(&db_path).await?,
        Commands::Watch => run_watch(&db_path).await?,
        Commands::Conflicts { json } => run_conflicts(json, &db_path).await?,
        Commands::Resolve { id, strategy } => run_resolve(&id, strategy, &db_path).await?,
        Commands::Purge { days } => run_purge(days, &db_path).await?,
        Commands::Auth { command } => run_auth(command).await?,
        Commands::Completions { .. } => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests;
