//! Settings read from the process environment.

use std::path::PathBuf;

/// Overrides the path of the cache store file.
pub const CACHE_PATH_VAR: &str = "TRANSLOAD_CACHE_PATH";
/// Disables the cache when set to any non-empty value.
pub const DISABLE_CACHE_VAR: &str = "TRANSLOAD_DISABLE_CACHE";
/// Environment discriminator folded into cache keys. Takes priority over [`FALLBACK_ENV_VAR`].
pub const ENV_VAR: &str = "TRANSLOAD_ENV";
/// Environment discriminator used when [`ENV_VAR`] is unset.
pub const FALLBACK_ENV_VAR: &str = "NODE_ENV";

const DEFAULT_CACHE_FILE: &str = ".transload-register.json";

/// Environment-derived settings, captured once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvSettings {
    /// Explicit cache store path.
    pub cache_path: Option<PathBuf>,
    /// Whether the cache is disabled outright.
    pub disable_cache: bool,
    /// Discriminator appended to cache keys.
    pub discriminator: Option<String>,
}

impl EnvSettings {
    /// Reads settings from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads settings through `lookup`, which maps a variable name to its value.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |name: &str| lookup(name).filter(|v| !v.is_empty());

        Self {
            cache_path: get(CACHE_PATH_VAR).map(PathBuf::from),
            disable_cache: get(DISABLE_CACHE_VAR).is_some(),
            discriminator: get(ENV_VAR).or_else(|| get(FALLBACK_ENV_VAR)),
        }
    }

    /// Path of the cache store: the override if set, otherwise a file in the
    /// home directory, or the temp directory when there is no home.
    pub fn cache_path(&self) -> PathBuf {
        self.cache_path.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join(DEFAULT_CACHE_FILE)
        })
    }
}
