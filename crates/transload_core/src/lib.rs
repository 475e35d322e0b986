//! # transload_core
//!
//! Transparent, cached source transforms at module-load time.
//!
//! This crate provides:
//! - Loader hooks that intercept a host's per-extension module loading
//! - Ignore/only filtering of which files are transformed
//! - Cache keys and mtime or checksum invalidation
//! - Invocation of an external transform engine with source map capture
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use transload_cache::TurnQueue;
//! use transload_core::{ExtensionTable, Register, RegisterOptions};
//!
//! let queue = Arc::new(TurnQueue::new());
//! let mut register = Register::new(ExtensionTable::new(), Arc::new(MyEngine), queue.clone())?;
//! register.configure(RegisterOptions::new().with_ignore(["**/vendor/**"]))?;
//!
//! let code = register.compile(Path::new("src/app.es"), None)?;
//! queue.run_turn(); // persists the cache
//! ```

pub mod config;
pub mod env;
mod error;
pub mod filter;
pub mod hook;
pub mod invalidation;
pub mod key;
mod register;
pub mod transform;

pub use config::{RegisterOptions, ResolvedConfig, TransformOptions};
pub use env::EnvSettings;
pub use error::RegisterError;
pub use filter::PathFilter;
pub use hook::{ExtensionTable, HookManager, LoadHandler, LoaderHook, Module, load_handler};
pub use invalidation::InvalidationMode;
pub use key::CacheKey;
pub use register::Register;
pub use transform::{
    RetrievedSourceMap, SourceMapRegistry, TransformEngine, TransformError, TransformOutput,
    TransformRequest,
};
