//! Compile command implementation

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use miette::{IntoDiagnostic, Result};
use tracing::debug;
use transload_cache::{CacheStore, TurnQueue};
use transload_core::{ExtensionTable, Module, Register, RegisterError};

use crate::cli::Cli;
use crate::commands::{env_settings, load_options};
use crate::engine::CommandEngine;

/// Collects the code the loader hands over for each file.
#[derive(Default)]
struct Output {
    code: Option<String>,
}

impl Module for Output {
    fn compile(&mut self, code: &str, _path: &Path) -> Result<(), RegisterError> {
        self.code = Some(code.to_string());
        Ok(())
    }
}

/// Loads each file through the intercepted extension table and prints the result.
///
/// Files excluded by `only`/`ignore` are printed unchanged.
pub fn run_compile(
    cli: &Cli,
    files: &[PathBuf],
    engine: &str,
    engine_version: Option<&str>,
) -> Result<()> {
    let engine = CommandEngine::parse(engine, engine_version).into_diagnostic()?;
    let options = load_options(cli)?;
    let env = env_settings(cli);
    let cwd = std::env::current_dir().into_diagnostic()?;

    let store = if env.disable_cache {
        CacheStore::disabled(env.cache_path())
    } else {
        CacheStore::open(env.cache_path())
    };
    debug!("Using cache store {}", store.path().display());

    let queue = Arc::new(TurnQueue::new());
    let mut register = Register::with_parts(
        ExtensionTable::new(),
        Arc::new(engine),
        queue.clone(),
        store,
        env,
        cwd,
    );
    register.configure(options).into_diagnostic()?;

    let mut stdout = io::stdout().lock();
    for file in files {
        let path = std::path::absolute(file).into_diagnostic()?;
        let mut output = Output::default();
        register
            .host()
            .load(&mut output, &path, None)
            .into_diagnostic()?;

        if let Some(code) = output.code {
            write!(stdout, "{}", code).into_diagnostic()?;
            if !code.ends_with('\n') {
                writeln!(stdout).into_diagnostic()?;
            }
        }
    }
    stdout.flush().into_diagnostic()?;

    queue.drain();
    register.teardown();
    Ok(())
}
