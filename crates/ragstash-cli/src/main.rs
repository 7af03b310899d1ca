//! Ragstash CLI Application

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

mod commands;
mod utils;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use commands::{providers::ProvidersCommand, run::RunCommand, shell::ShellCommand};
use log::LevelFilter;
use ragstash_core::{load_settings, load_settings_from, RagService, Registry};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "ragstash")]
#[command(about = "Register retrieval backends, ingest documents and run similarity queries")]
#[command(version)]
pub struct Cli {
    /// Settings file [default: <config dir>/ragstash/settings.toml]
    #[arg(long, global = true, env = "RAGSTASH_SETTINGS")]
    settings: Option<PathBuf>,

    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the supported providers
    Providers(ProvidersCommand),
    /// Create a RAG, ingest files into it and run queries
    Run(RunCommand),
    /// Line-oriented session over stdin with JSON replies
    Shell(ShellCommand),
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    let mut builder = pretty_env_logger::formatted_builder();
    builder.filter_level(level);
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    // Only fails if a logger is already installed.
    let _ = builder.try_init();
}

fn build_service(settings: Option<&PathBuf>) -> Result<RagService> {
    let settings = match settings {
        Some(path) => load_settings_from(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => load_settings().context("Failed to load settings")?,
    };
    log::debug!("Using settings: {:?}", settings);
    Ok(RagService::new(Arc::new(Registry::new(settings))))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Providers(cmd) => cmd.execute(),
        Commands::Run(cmd) => {
            let service = build_service(cli.settings.as_ref())?;
            cmd.execute(&service).await
        }
        Commands::Shell(cmd) => {
            let service = build_service(cli.settings.as_ref())?;
            cmd.execute(&service).await
        }
    }
}
