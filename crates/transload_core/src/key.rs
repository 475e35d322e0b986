//! Cache key construction.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use crate::RegisterError;
use crate::config::TransformOptions;
use crate::invalidation::InvalidationMode;

/// Opaque key identifying one transform result in the cache store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Builds the key for `path`.
    ///
    /// `options` is serialized canonically and followed by the engine version and,
    /// when set, the environment discriminator. In relocatable mode the options
    /// additionally carry `filename = "{project}:{relative path}"` so the key does
    /// not depend on where the project lives on disk.
    pub fn build(
        options: &TransformOptions,
        path: &Path,
        mode: &InvalidationMode,
        engine_version: &str,
        discriminator: Option<&str>,
    ) -> Result<Self, RegisterError> {
        let serialized = match mode {
            InvalidationMode::Mtime => options.to_canonical_json()?,
            InvalidationMode::Checksum {
                source_root,
                project_name,
            } => {
                let identity = relocatable_identity(project_name, source_root, path)?;
                options
                    .clone()
                    .with("filename", identity)
                    .to_canonical_json()?
            }
        };

        let mut key = format!("{}:{}", serialized, engine_version);
        if let Some(env) = discriminator {
            key.push(':');
            key.push_str(env);
        }
        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `{project_name}:{path relative to source_root}` with `/` separators.
pub fn relocatable_identity(
    project_name: &str,
    source_root: &Path,
    path: &Path,
) -> Result<String, RegisterError> {
    let relative = relative_path(source_root, path).ok_or_else(|| {
        RegisterError::config(format!(
            "Cannot make {} relative to cache source root {}",
            path.display(),
            source_root.display()
        ))
    })?;

    let segments: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Ok(format!("{}:{}", project_name, segments.join("/")))
}

/// Lexical path from `base` to `path`, using `..` where `path` is outside `base`.
///
/// Returns `None` when the two cannot be related, e.g. one is absolute and the
/// other relative, or they live under different prefixes.
pub fn relative_path(base: &Path, path: &Path) -> Option<PathBuf> {
    if base.is_absolute() != path.is_absolute() {
        return None;
    }

    fn normalize(p: &Path) -> Vec<Component<'_>> {
        p.components()
            .filter(|c| !matches!(c, Component::CurDir))
            .collect()
    }

    let base = normalize(base);
    let path = normalize(path);

    let common = base
        .iter()
        .zip(path.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let rooted = |c: &Component<'_>| matches!(c, Component::Prefix(_) | Component::RootDir);
    if base[common..].iter().any(rooted) || path[common..].iter().any(rooted) {
        return None;
    }

    let mut relative = PathBuf::new();
    for _ in common..base.len() {
        relative.push("..");
    }
    for component in &path[common..] {
        relative.push(component.as_os_str());
    }
    Some(relative)
}
