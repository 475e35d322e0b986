//! Ignore/only eligibility filter for intercepted files.

use std::path::{Component, Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::RegisterError;
use crate::key::relative_path;

/// Directory segment that marks vendored dependencies.
pub const VENDOR_DIR: &str = "node_modules";

/// A list of glob patterns and its compiled matcher.
#[derive(Debug, Clone)]
struct PatternList {
    patterns: Vec<String>,
    globs: GlobSet,
}

/// Decides which files pass through the interception handler.
#[derive(Debug, Clone)]
pub struct PathFilter {
    cwd: PathBuf,
    only: Option<PatternList>,
    ignore: Option<PatternList>,
}

impl PathFilter {
    /// A filter using the default vendoring-directory heuristic relative to `cwd`.
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: cwd.into(),
            only: None,
            ignore: None,
        }
    }

    /// Returns a filter with the given lists replacing the current ones.
    ///
    /// A `None` list keeps the current one.
    pub fn with_patterns(
        &self,
        only: Option<Vec<String>>,
        ignore: Option<Vec<String>>,
    ) -> Result<Self, RegisterError> {
        let only = match only {
            Some(patterns) => Some(Self::build_list(patterns)?),
            None => self.only.clone(),
        };
        let ignore = match ignore {
            Some(patterns) => Some(Self::build_list(patterns)?),
            None => self.ignore.clone(),
        };

        Ok(Self {
            cwd: self.cwd.clone(),
            only,
            ignore,
        })
    }

    fn build_list(patterns: Vec<String>) -> Result<PatternList, RegisterError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &patterns {
            let glob = Glob::new(pattern).map_err(|e| {
                RegisterError::config(format!("Invalid pattern '{}': {}", pattern, e))
            })?;
            builder.add(glob);
        }

        let globs = builder
            .build()
            .map_err(|e| RegisterError::config(format!("Failed to build globset: {}", e)))?;

        Ok(PatternList { patterns, globs })
    }

    pub fn only(&self) -> Option<&[String]> {
        self.only.as_ref().map(|list| list.patterns.as_slice())
    }

    pub fn ignore(&self) -> Option<&[String]> {
        self.ignore.as_ref().map(|list| list.patterns.as_slice())
    }

    /// Returns true if `path` should be transformed.
    pub fn is_eligible(&self, path: &Path) -> bool {
        !self.should_ignore(path)
    }

    /// Returns true if `path` should be loaded unmodified.
    ///
    /// With no lists configured, paths inside a vendoring directory below the
    /// working directory are ignored. Once either list is configured, only the
    /// lists decide, and `ignore` wins over `only`.
    pub fn should_ignore(&self, path: &Path) -> bool {
        if self.only.is_none() && self.ignore.is_none() {
            return self.is_vendored(path);
        }

        if self
            .ignore
            .as_ref()
            .is_some_and(|list| self.matches(&list.globs, path))
        {
            return true;
        }

        if self
            .only
            .as_ref()
            .is_some_and(|list| !self.matches(&list.globs, path))
        {
            return true;
        }

        false
    }

    // Only segments below the working directory count; `..` steps never match.
    fn is_vendored(&self, path: &Path) -> bool {
        let relative = relative_path(&self.cwd, path).unwrap_or_else(|| path.to_path_buf());
        relative
            .components()
            .any(|c| matches!(c, Component::Normal(name) if name == VENDOR_DIR))
    }

    // Patterns may be written against the absolute path or the cwd-relative one.
    fn matches(&self, globs: &GlobSet, path: &Path) -> bool {
        if globs.is_match(path) {
            return true;
        }
        path.strip_prefix(&self.cwd)
            .is_ok_and(|relative| globs.is_match(relative))
    }
}
