//! # transload_cache
//!
//! Persistent cache of transform results for transload.
//!
//! ## Cache Strategy
//!
//! 1. **Keyed by configuration**: the key encodes options, engine version and environment
//! 2. **Validity stamp**: each entry carries either an mtime or a content checksum
//! 3. **Deferred persistence**: writes are coalesced into one flush per scheduling turn
//!
//! ## Storage
//!
//! The store is a single pretty-printed JSON file mapping cache keys to entries,
//! so it can be inspected or diffed by hand.

pub mod entry;
mod error;
pub mod scheduler;
mod store;

pub use entry::{CacheEntry, ValidityStamp};
pub use error::CacheError;
pub use scheduler::{DebounceScheduler, Scheduler, Task, TurnQueue};
pub use store::{CacheStore, DEFAULT_SIZE_LIMIT};
