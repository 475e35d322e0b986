//! transload CLI
//!
//! Transforms source files through an external engine command, caching the
//! results across runs.

use std::process::ExitCode;

use clap::Parser;
use miette::Result;
use tracing::error;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;
mod engine;

use cli::{CacheCommands, Cli, Commands};
use commands::cache::{run_cache_clear, run_cache_path, run_cache_stats};
use commands::compile::run_compile;

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:?}", e);
            ExitCode::from(2)
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Compile {
            files,
            engine,
            engine_version,
        } => run_compile(cli, files, engine, engine_version.as_deref()),
        Commands::Cache { command } => match command {
            CacheCommands::Path => run_cache_path(cli),
            CacheCommands::Stats => run_cache_stats(cli),
            CacheCommands::Clear => run_cache_clear(cli),
        },
    }
}
