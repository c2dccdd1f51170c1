mod browser;
mod cli;
mod config;
mod error;
mod extract;
mod locator;
mod login;
mod notion;
mod probe;
mod report;
mod scan;

use std::fs::OpenOptions;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use colored::Colorize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command, MenuChoice};
use crate::config::Config;
use crate::notion::NotionClient;
use crate::scan::Mode;

const LOG_FILE: &str = "rma-sync.log";

/// Structured logs go to a file next to the binary; the console stays free
/// for the operator-facing output.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match OpenOptions::new().create(true).append(true).open(LOG_FILE) {
        Ok(file) => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Arc::new(file))
                .init();
        }
        Err(_) => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env before anything reads the environment, the log filter
    // included.
    let _ = dotenvy::dotenv();
    init_logging();

    let cli = Cli::parse();
    match cli.command {
        Some(Command::Sync) => run_sync(Mode::Full).await,
        Some(Command::Single { id }) => run_sync(Mode::Single(id)).await,
        Some(Command::Credentials) => cli::update_credentials().await,
        None => run_menu().await,
    }
}

async fn run_menu() -> anyhow::Result<()> {
    let result = match cli::prompt_menu().await {
        MenuChoice::SyncAll => run_sync(Mode::Full).await,
        MenuChoice::SingleOrder => match cli::prompt("RMA number: ").await {
            Some(input) => match input.parse::<u32>() {
                Ok(id) => run_sync(Mode::Single(id)).await,
                Err(_) => {
                    println!("{}", "The RMA number must be a positive integer.".red());
                    Ok(())
                }
            },
            None => Ok(()),
        },
        MenuChoice::UpdatePassword => cli::update_credentials().await,
    };

    if let Err(e) = &result {
        println!("{}", format!("The run failed: {e:#}").red());
    }
    println!();
    println!("{}", "Done.".bright_green().bold());
    let _ = cli::prompt("Press Enter to close...").await;
    result
}

async fn run_sync(mode: Mode) -> anyhow::Result<()> {
    let config = Config::from_env().context("configuration is incomplete")?;
    let store = NotionClient::new(&config);
    let report = scan::run(&config, &store, mode).await?;
    report::print_summary(&report);
    info!(
        synced = report.synced,
        stopped_at = report.stopped_at,
        "run finished"
    );
    Ok(())
}
