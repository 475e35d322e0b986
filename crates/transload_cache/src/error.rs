//! Cache error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while loading or persisting the cache store.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Failed to read the store file.
    #[error("Failed to read cache store {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write the store file.
    #[error("Failed to write cache store {path}: {source}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Store content could not be parsed.
    #[error("Corrupted cache store: {0}")]
    Corrupted(String),

    /// Entries could not be serialized.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Serialized store exceeds the configured size limit.
    #[error("Cache too large to save ({size} bytes, limit {limit}); skipping this save")]
    TooLarge { size: usize, limit: usize },
}

impl CacheError {
    /// Creates a read error.
    pub fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ReadError {
            path: path.into(),
            source,
        }
    }

    /// Creates a write error.
    pub fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::WriteError {
            path: path.into(),
            source,
        }
    }

    /// Creates a corrupted cache error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted(message.into())
    }
}
