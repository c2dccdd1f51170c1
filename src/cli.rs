//! Command-line surface: subcommands for scripted use, and a short timed
//! menu for interactive runs so a scheduled start never blocks on a human.

use std::io::Write;
use std::time::Duration;

use clap::{Parser, Subcommand};
use colored::Colorize;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::config;

#[derive(Debug, Parser)]
#[command(name = "rma-sync", version, about = "Sync Gincore repair orders into Notion")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Scan every new repair order and sync it to Notion
    Sync,
    /// Sync a single repair order
    Single {
        /// RMA number of the order
        #[arg(long)]
        id: u32,
    },
    /// Update the stored CRM password
    Credentials,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuChoice {
    SyncAll,
    SingleOrder,
    UpdatePassword,
}

/// Anything that is not an explicit 2 or 3 starts the full scan, so garbage
/// input and silence behave the same.
pub fn parse_menu_choice(input: &str) -> MenuChoice {
    match input.trim() {
        "2" => MenuChoice::SingleOrder,
        "3" => MenuChoice::UpdatePassword,
        _ => MenuChoice::SyncAll,
    }
}

const MENU_TIMEOUT: Duration = Duration::from_secs(3);

/// Show the menu and wait shortly for a pick. A closed or silent stdin means
/// the default: scan everything.
pub async fn prompt_menu() -> MenuChoice {
    println!("{}", "Pick a mode:".bold());
    println!("  1. {}", "Scan all new repair orders".cyan());
    println!("  2. {}", "Process a single order".magenta());
    println!("  3. {}", "Change the CRM password".yellow());
    println!("Nothing picked within 3 seconds starts the full scan.");
    println!();

    match tokio::time::timeout(MENU_TIMEOUT, read_line()).await {
        Ok(Some(line)) => parse_menu_choice(&line),
        _ => MenuChoice::SyncAll,
    }
}

async fn read_line() -> Option<String> {
    let mut line = String::new();
    let mut reader = BufReader::new(tokio::io::stdin());
    reader.read_line(&mut line).await.ok()?;
    Some(line)
}

/// Prompt on the same line and read the trimmed reply.
pub async fn prompt(message: &str) -> Option<String> {
    print!("{message}");
    let _ = std::io::stdout().flush();
    read_line().await.map(|line| line.trim().to_string())
}

/// Interactive CRM password update against the `.env` file the runtime
/// loads (dotenvy's lookup: the working directory, then its ancestors).
pub async fn update_credentials() -> anyhow::Result<()> {
    let Ok(path) = dotenvy::dotenv() else {
        println!(
            "{}",
            "No .env file in the working directory or any directory above it.".red()
        );
        return Ok(());
    };
    let Some(new_password) = prompt("New CRM password: ").await else {
        return Ok(());
    };
    if new_password.is_empty() {
        println!("{}", "Nothing entered; password left unchanged.".yellow());
        return Ok(());
    }
    config::update_env_password(&path, &new_password)?;
    println!("{}", "CRM password updated.".green());
    Ok(())
}
