//! CLI argument definitions

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// transload - run source files through a transform engine with a persistent cache
#[derive(Parser)]
#[command(name = "transload")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path (JSON register options)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Cache store path (overrides TRANSLOAD_CACHE_PATH)
    #[arg(long, global = true)]
    pub cache_path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable caching
    #[arg(long, global = true)]
    pub no_cache: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Transform files and print the generated code
    Compile {
        /// Files to transform
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Engine command; receives the source on stdin and prints generated code
        #[arg(short, long)]
        engine: String,

        /// Engine version folded into cache keys (defaults to the engine command)
        #[arg(long)]
        engine_version: Option<String>,
    },

    /// Inspect or reset the cache store
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
}

#[derive(Subcommand)]
pub enum CacheCommands {
    /// Print the store path
    Path,
    /// Print entry counts
    Stats,
    /// Remove every entry
    Clear,
}
