//! Interception of the host's module-loading mechanism.
//!
//! A host exposes its per-extension handler table through [`LoaderHook`].
//! [`HookManager`] places extensions under interception and remembers what
//! answered each one before, so that it can be put back exactly.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::RegisterError;

/// Extension whose prior handler serves extensions that had none.
pub const FALLBACK_EXTENSION: &str = ".js";

/// A module being loaded by the host.
pub trait Module {
    /// Hands `code` to the host as the body of the module at `path`.
    fn compile(&mut self, code: &str, path: &Path) -> Result<(), RegisterError>;
}

/// Loads the file at a path into a module, optionally from inline source text.
pub type LoadHandler =
    Arc<dyn Fn(&mut dyn Module, &Path, Option<&str>) -> Result<(), RegisterError> + Send + Sync>;

/// The host's extension → handler table.
pub trait LoaderHook {
    /// The handler currently answering `extension`.
    fn handler(&self, extension: &str) -> Option<LoadHandler>;

    /// Installs `handler` for `extension`, returning the one it replaced.
    fn register(&mut self, extension: &str, handler: LoadHandler) -> Option<LoadHandler>;

    /// Puts `previous` back for `extension`, or removes the entry if `previous` is `None`.
    fn unregister(&mut self, extension: &str, previous: Option<LoadHandler>);
}

/// Wraps a closure as a [`LoadHandler`].
pub fn load_handler<F>(f: F) -> LoadHandler
where
    F: Fn(&mut dyn Module, &Path, Option<&str>) -> Result<(), RegisterError>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}

/// A handler that loads the file's text unchanged.
pub fn passthrough_handler() -> LoadHandler {
    load_handler(|module, path, inline| match inline {
        Some(source) => module.compile(source, path),
        None => {
            let source = fs::read_to_string(path).map_err(|e| {
                RegisterError::file(format!("Failed to read {}: {}", path.display(), e))
            })?;
            module.compile(&source, path)
        }
    })
}

/// An in-process extension table, usable as a host on its own.
#[derive(Clone, Default)]
pub struct ExtensionTable {
    handlers: BTreeMap<String, LoadHandler>,
}

impl ExtensionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `handler` for `extension`.
    pub fn with_handler(mut self, extension: impl Into<String>, handler: LoadHandler) -> Self {
        self.handlers.insert(extension.into(), handler);
        self
    }

    /// Extensions that currently have a handler.
    pub fn extensions(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    /// Loads `path` through the handler registered for its extension.
    pub fn load(
        &self,
        module: &mut dyn Module,
        path: &Path,
        inline: Option<&str>,
    ) -> Result<(), RegisterError> {
        let extension = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        let handler = self.handlers.get(&extension).cloned().ok_or_else(|| {
            RegisterError::load(format!(
                "No loader for '{}' ({})",
                extension,
                path.display()
            ))
        })?;
        handler(module, path, inline)
    }
}

impl LoaderHook for ExtensionTable {
    fn handler(&self, extension: &str) -> Option<LoadHandler> {
        self.handlers.get(extension).cloned()
    }

    fn register(&mut self, extension: &str, handler: LoadHandler) -> Option<LoadHandler> {
        self.handlers.insert(extension.to_string(), handler)
    }

    fn unregister(&mut self, extension: &str, previous: Option<LoadHandler>) {
        match previous {
            Some(handler) => {
                self.handlers.insert(extension.to_string(), handler);
            }
            None => {
                self.handlers.remove(extension);
            }
        }
    }
}

impl fmt::Debug for ExtensionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.handlers.keys()).finish()
    }
}

/// Tracks the handlers displaced by interception.
#[derive(Default)]
pub struct HookManager {
    prior: BTreeMap<String, Option<LoadHandler>>,
}

impl HookManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restores every intercepted extension, then intercepts exactly `extensions`.
    ///
    /// `make_handler` receives the extension and the handler to delegate to for
    /// files that are not transformed.
    pub fn install<H, S, F>(&mut self, host: &mut H, extensions: &[S], make_handler: F)
    where
        H: LoaderHook + ?Sized,
        S: AsRef<str>,
        F: Fn(&str, LoadHandler) -> LoadHandler,
    {
        self.restore_all(host);

        for extension in extensions {
            let extension = extension.as_ref();
            if self.prior.contains_key(extension) {
                continue;
            }

            let previous = host.handler(extension);
            let delegate = previous
                .clone()
                .or_else(|| self.fallback(host))
                .unwrap_or_else(passthrough_handler);

            let displaced = host.register(extension, make_handler(extension, delegate));
            debug!(
                "Hooked {} (prior handler: {})",
                extension,
                if displaced.is_some() { "yes" } else { "none" }
            );
            self.prior.insert(extension.to_string(), displaced);
        }
    }

    /// Puts back every displaced handler and forgets them.
    pub fn restore_all<H: LoaderHook + ?Sized>(&mut self, host: &mut H) {
        for (extension, previous) in std::mem::take(&mut self.prior) {
            debug!("Restoring {}", extension);
            host.unregister(&extension, previous);
        }
    }

    /// Extensions currently under interception.
    pub fn hooked(&self) -> impl Iterator<Item = &str> {
        self.prior.keys().map(String::as_str)
    }

    pub fn is_hooked(&self, extension: &str) -> bool {
        self.prior.contains_key(extension)
    }

    // Handler for files of an extension that had none of its own. The host's
    // current fallback handler is only used while it is not one of ours.
    fn fallback<H: LoaderHook + ?Sized>(&self, host: &H) -> Option<LoadHandler> {
        match self.prior.get(FALLBACK_EXTENSION) {
            Some(previous) => previous.clone(),
            None => host.handler(FALLBACK_EXTENSION),
        }
    }
}
