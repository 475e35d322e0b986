//! Command implementations

pub mod cache;
pub mod compile;

use std::path::Path;

use miette::{IntoDiagnostic, Result};
use transload_core::{EnvSettings, RegisterOptions};

use crate::cli::Cli;

/// Config file picked up from the working directory when `--config` is absent.
const DEFAULT_CONFIG_FILE: &str = "transload.json";

/// Environment settings with command-line overrides applied.
pub fn env_settings(cli: &Cli) -> EnvSettings {
    let mut env = EnvSettings::from_env();
    if let Some(path) = &cli.cache_path {
        env.cache_path = Some(path.clone());
    }
    if cli.no_cache {
        env.disable_cache = true;
    }
    env
}

/// Register options from `--config`, or from `transload.json` if present.
pub fn load_options(cli: &Cli) -> Result<RegisterOptions> {
    if let Some(path) = &cli.config {
        return RegisterOptions::from_file(path).into_diagnostic();
    }

    let default = Path::new(DEFAULT_CONFIG_FILE);
    if default.exists() {
        return RegisterOptions::from_file(default).into_diagnostic();
    }

    Ok(RegisterOptions::new())
}
