//! Register configuration.
//!
//! [`RegisterOptions`] is what callers pass to `configure()`. It is merged into the
//! current [`ResolvedConfig`] to produce a new immutable value.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::RegisterError;
use crate::filter::PathFilter;
use crate::invalidation::InvalidationMode;

/// Label used in messages when no project name is configured.
pub const DEFAULT_LABEL: &str = "TRANSLOAD";

/// Callback receiving a formatted status message.
pub type MessageFn = Arc<dyn Fn(&str) + Send + Sync>;

/// Options forwarded to the transform engine.
///
/// Keys are kept sorted, so serialization is canonical.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransformOptions(Map<String, Value>);

impl TransformOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an option, replacing any previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Returns a copy with `key` set to `value`.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Returns a copy with `other`'s top-level keys written over this one's.
    pub fn merged(&self, other: &TransformOptions) -> Self {
        let mut merged = self.clone();
        for (key, value) in &other.0 {
            merged.0.insert(key.clone(), value.clone());
        }
        merged
    }

    /// Returns a copy carrying `filename` as the per-file override.
    pub fn with_filename(&self, filename: &Path) -> Self {
        self.clone()
            .with("filename", filename.to_string_lossy().into_owned())
    }

    /// Canonical JSON text of the options.
    pub fn to_canonical_json(&self) -> Result<String, RegisterError> {
        serde_json::to_string(&self.0)
            .map_err(|e| RegisterError::config(format!("Unserializable transform options: {}", e)))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Map<String, Value>> for TransformOptions {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Options accepted by `Register::configure`.
///
/// Unrecognized fields are collected into [`RegisterOptions::transform`] and
/// forwarded to the engine.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterOptions {
    /// Allow-list of path patterns. Disables the default vendoring heuristic.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub only: Option<Vec<String>>,

    /// Deny-list of path patterns. Takes precedence over `only`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignore: Option<Vec<String>>,

    /// `false` disables the cache for the rest of the register's life.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache: Option<bool>,

    /// Root that cache identities are made relative to. Requires `project_name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_source_root: Option<PathBuf>,

    /// Project name used in relocatable cache identities. Requires `cache_source_root`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,

    /// Extensions to intercept, replacing the current set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Vec<String>>,

    /// Receives human-facing status messages.
    #[serde(skip)]
    pub log: Option<MessageFn>,

    /// Receives fine-grained tracing messages.
    #[serde(skip)]
    pub debug: Option<MessageFn>,

    /// Everything else, forwarded verbatim to the transform engine.
    #[serde(flatten)]
    pub transform: TransformOptions,
}

impl RegisterOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads options from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, RegisterError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| RegisterError::config(format!("Failed to read config: {}", e)))?;

        let mut options = Self::from_json(&content)?;

        // relative source roots are taken relative to the config file
        if let (Some(root), Some(parent)) = (&options.cache_source_root, path.parent())
            && root.is_relative()
        {
            options.cache_source_root = Some(parent.join(root));
        }

        Ok(options)
    }

    /// Parses options from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, RegisterError> {
        serde_json::from_str(json)
            .map_err(|e| RegisterError::config(format!("Invalid config: {}", e)))
    }

    pub fn with_only<S: Into<String>>(mut self, patterns: impl IntoIterator<Item = S>) -> Self {
        self.only = Some(patterns.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_ignore<S: Into<String>>(mut self, patterns: impl IntoIterator<Item = S>) -> Self {
        self.ignore = Some(patterns.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.cache = Some(enabled);
        self
    }

    pub fn with_cache_source_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.cache_source_root = Some(root.into());
        self
    }

    pub fn with_project_name(mut self, name: impl Into<String>) -> Self {
        self.project_name = Some(name.into());
        self
    }

    pub fn with_extensions<S: Into<String>>(
        mut self,
        extensions: impl IntoIterator<Item = S>,
    ) -> Self {
        self.extensions = Some(extensions.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_log(mut self, log: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.log = Some(Arc::new(log));
        self
    }

    pub fn with_debug(mut self, debug: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.debug = Some(Arc::new(debug));
        self
    }

    /// Adds a transform engine option.
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.transform.insert(key, value);
        self
    }
}

impl fmt::Debug for RegisterOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterOptions")
            .field("only", &self.only)
            .field("ignore", &self.ignore)
            .field("cache", &self.cache)
            .field("cache_source_root", &self.cache_source_root)
            .field("project_name", &self.project_name)
            .field("extensions", &self.extensions)
            .field("log", &self.log.is_some())
            .field("debug", &self.debug.is_some())
            .field("transform", &self.transform)
            .finish()
    }
}

/// Routes status messages to `tracing` and to the user's callbacks.
#[derive(Clone, Default)]
pub struct Reporter {
    log: Option<MessageFn>,
    debug: Option<MessageFn>,
}

impl Reporter {
    /// Human-facing status message.
    pub fn log(&self, label: &str, message: &str) {
        info!("[{}] {}", label, message);
        if let Some(log) = &self.log {
            log(&format!("[{}] {}", label, message));
        }
    }

    /// Configuration problem that does not stop the register.
    pub fn warn(&self, label: &str, message: &str) {
        warn!("[{}] {}", label, message);
        if let Some(log) = &self.log {
            log(&format!("[{}] {}", label, message));
        }
    }

    /// Fine-grained tracing message.
    pub fn debug(&self, label: &str, message: &str) {
        debug!("[{}] {}", label, message);
        if let Some(debug) = &self.debug {
            debug(&format!("[{}] {}", label, message));
        }
    }
}

/// The effective configuration of a register.
///
/// Never mutated in place; [`ResolvedConfig::merge`] produces the next value.
#[derive(Clone)]
pub struct ResolvedConfig {
    /// Eligibility filter.
    pub filter: PathFilter,
    /// Whether cached results may be used and recorded.
    pub cache_enabled: bool,
    /// Invalidation strategy.
    pub mode: InvalidationMode,
    /// Base options for the transform engine.
    pub transform: TransformOptions,
    /// Message sinks.
    pub reporter: Reporter,
}

impl ResolvedConfig {
    /// Default configuration for a process running in `cwd`.
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self {
            filter: PathFilter::new(cwd),
            cache_enabled: true,
            mode: InvalidationMode::Mtime,
            transform: TransformOptions::new(),
            reporter: Reporter::default(),
        }
    }

    /// Label used to prefix messages.
    pub fn label(&self) -> &str {
        self.mode.project_name().unwrap_or(DEFAULT_LABEL)
    }

    /// Produces the configuration that results from applying `options` on top of this one.
    ///
    /// `options.extensions` is ignored here; hooks are the register's concern.
    pub fn merge(&self, options: &RegisterOptions) -> Result<Self, RegisterError> {
        let mut next = self.clone();

        if let Some(log) = &options.log {
            next.reporter.log = Some(log.clone());
        }
        if let Some(debug) = &options.debug {
            next.reporter.debug = Some(debug.clone());
        }

        if options.only.is_some() || options.ignore.is_some() {
            next.filter = self
                .filter
                .with_patterns(options.only.clone(), options.ignore.clone())?;
        }

        if options.cache == Some(false) {
            next.cache_enabled = false;
        }

        match (&options.cache_source_root, &options.project_name) {
            (Some(root), Some(name)) => {
                next.mode = InvalidationMode::Checksum {
                    source_root: root.clone(),
                    project_name: name.clone(),
                };
            }
            (None, None) => {}
            _ => {
                next.reporter.warn(
                    next.label(),
                    "must have both cacheSourceRoot and projectName; invalidation mode unchanged",
                );
            }
        }

        next.transform = self.transform.merged(&options.transform);

        Ok(next)
    }
}
