//! Cache command implementations

use miette::{IntoDiagnostic, Result};
use tracing::info;
use transload_cache::{CacheStore, ValidityStamp};

use crate::cli::Cli;
use crate::commands::env_settings;

pub fn run_cache_path(cli: &Cli) -> Result<()> {
    println!("{}", env_settings(cli).cache_path().display());
    Ok(())
}

pub fn run_cache_stats(cli: &Cli) -> Result<()> {
    let path = env_settings(cli).cache_path();
    let store = CacheStore::new(&path);
    store.load().into_diagnostic()?;

    let entries = store.snapshot();
    let checksum = entries
        .values()
        .filter(|entry| matches!(entry.stamp, ValidityStamp::Checksum(_)))
        .count();

    println!("path: {}", path.display());
    println!("entries: {}", entries.len());
    println!("mtime: {}", entries.len() - checksum);
    println!("checksum: {}", checksum);
    Ok(())
}

pub fn run_cache_clear(cli: &Cli) -> Result<()> {
    let path = env_settings(cli).cache_path();
    if !path.exists() {
        info!("No cache at {}", path.display());
        return Ok(());
    }

    let store = CacheStore::new(&path);
    store.clear();
    store.flush_now().into_diagnostic()?;
    info!("Cleared cache at {}", path.display());
    Ok(())
}
