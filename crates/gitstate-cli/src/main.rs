//! gitstate CLI
//!
//! Command-line access to the cached repository state: queries, writes,
//! event reports and drift reconciliation.

mod cli;
mod commands;
mod error;
mod interactive;

use std::path::PathBuf;

use clap::Parser;
use colored::Colorize;
use gitstate_core::StateEngine;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use error::Result;

fn main() {
    if let Err(e) = run() {
        eprintln!("{}: {}", "error".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    tracing::debug!("Verbose mode enabled");

    let Some(command) = cli.command else {
        println!("{} Cached repository state", "gitstate".green().bold());
        println!();
        println!("Run {} for available commands.", "gitstate --help".cyan());
        return Ok(());
    };

    let root = match cli.workspace {
        Some(root) => root,
        None => std::env::current_dir()?,
    };
    execute_command(root, command)
}

fn execute_command(root: PathBuf, command: Commands) -> Result<()> {
    let mut engine = StateEngine::open(&root)?;
    tracing::debug!(root = %root.display(), "Opened workspace");

    match command {
        Commands::Refresh { full } => commands::run_refresh(&mut engine, full),
        Commands::Get { path, default } => commands::run_get(&mut engine, &path, default.as_deref()),
        Commands::Dump => commands::run_dump(&mut engine),
        Commands::Summary => commands::run_summary(&mut engine),
        Commands::Set { path, value } => commands::run_set(&mut engine, &path, &value),
        Commands::SetMany { entries } => commands::run_set_many(&mut engine, &entries),
        Commands::Incr { path, by } => commands::run_incr(&mut engine, &path, by),
        Commands::Append { path, value, max } => commands::run_append(&mut engine, &path, &value, max),
        Commands::Remove { path } => commands::run_remove(&mut engine, &path),
        Commands::Event { event } => commands::run_event(&mut engine, event),
        Commands::Drift { repair, json } => commands::run_drift(&mut engine, repair.map(Into::into), json),
        Commands::Verify => commands::run_verify(&mut engine),
    }
}
