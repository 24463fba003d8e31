//! `stockctl` entry point.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use movements::MovementEngine;
use serde::Serialize;
use stockctl::{CliError, Config, EXIT_INCONSISTENT, EXIT_REJECTED, LogNotifier, commands};

#[derive(Parser)]
#[command(name = "stockctl", about = "Inventory movement ledger operations", version)]
struct Cli {
    /// PostgreSQL connection string.
    #[arg(long, global = true, env = "DATABASE_URL", hide_env_values = true)]
    database_url: Option<String>,

    /// Catalog JSON file with materials and locations.
    #[arg(long, global = true, env = "STOCKCTL_CATALOG")]
    catalog: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply database migrations.
    Migrate,
    /// Record one movement from JSON (`-` reads standard input).
    Record {
        #[arg(value_name = "JSON|-")]
        input: String,
    },
    /// Show the balance of one material at one location.
    Balance {
        #[arg(long)]
        material: String,
        #[arg(long)]
        location: String,
        #[arg(long)]
        lot: Option<String>,
    },
    /// Replay the ledger and compare it with the materialized balances.
    Reconcile,
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(cli: Cli, mut config: Config) -> Result<ExitCode, CliError> {
    if let Some(url) = cli.database_url {
        config.database_url = url;
    }
    if cli.catalog.is_some() {
        config.catalog_path = cli.catalog;
    }

    let store = commands::connect(&config).await?;

    match cli.command {
        Command::Migrate => {
            commands::migrate(&store).await?;
        }
        Command::Record { input } => {
            let path = config.catalog_path.as_deref().ok_or(CliError::CatalogMissing)?;
            let catalog = commands::load_catalog(path).await?;
            let engine = MovementEngine::new(store, catalog, LogNotifier)
                .with_config(config.engine.clone());
            let json = commands::read_input(&input).await?;

            match commands::record(&engine, &json).await {
                Ok(receipt) => print_json(&receipt)?,
                Err(rejection) => {
                    print_json(&rejection)?;
                    return Ok(ExitCode::from(EXIT_REJECTED));
                }
            }
        }
        Command::Balance {
            material,
            location,
            lot,
        } => {
            let entry = commands::balance(&store, &material, &location, lot.as_deref()).await?;
            print_json(&entry)?;
        }
        Command::Reconcile => {
            let report = commands::reconcile(&store).await?;
            print_json(&report)?;
            if !report.is_consistent() {
                return Ok(ExitCode::from(EXIT_INCONSISTENT));
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = Config::from_env();
    stockctl::telemetry::init(&config);

    match run(cli, config).await {
        Ok(code) => code,
        Err(err) => {
            tracing::error!(error = %err, "command failed");
            eprintln!("stockctl: {err}");
            ExitCode::from(err.exit_code())
        }
    }
}
