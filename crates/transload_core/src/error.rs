//! Register error types.

use thiserror::Error;

use crate::transform::TransformError;

/// Errors that can surface from configuring the register or loading a file.
#[derive(Debug, Error)]
pub enum RegisterError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The transform engine failed on a file.
    #[error("Transform error: {0}")]
    Transform(#[from] TransformError),

    /// A source file could not be read or inspected.
    #[error("File error: {0}")]
    File(String),

    /// Cache error.
    #[error("Cache error: {0}")]
    Cache(#[from] transload_cache::CacheError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The host failed to load a module.
    #[error("Load error: {0}")]
    Load(String),
}

impl RegisterError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Creates a file error.
    pub fn file(message: impl Into<String>) -> Self {
        Self::File(message.into())
    }

    /// Creates a load error.
    pub fn load(message: impl Into<String>) -> Self {
        Self::Load(message.into())
    }
}
