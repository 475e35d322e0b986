//! Cache entry types.

use serde::{Deserialize, Serialize};

/// Data used to judge whether a cached transform is still current.
///
/// Serialized inline with the entry as either an `"mtime"` or a `"checksum"` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidityStamp {
    /// Modification time of the source file in milliseconds since the Unix epoch.
    Mtime(i64),
    /// Hex-encoded digest of the source file's text.
    Checksum(String),
}

/// The stored result of one transform invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Generated code.
    pub code: String,

    /// Source map produced alongside the code, if any.
    #[serde(default)]
    pub map: Option<serde_json::Value>,

    /// Validity stamp captured when the entry was written.
    #[serde(flatten)]
    pub stamp: ValidityStamp,
}

impl CacheEntry {
    /// Creates a new cache entry.
    pub fn new(
        code: impl Into<String>,
        map: Option<serde_json::Value>,
        stamp: ValidityStamp,
    ) -> Self {
        Self {
            code: code.into(),
            map,
            stamp,
        }
    }

    /// Returns true if the stored stamp equals `current`.
    ///
    /// A stamp of a different kind never matches.
    pub fn matches(&self, current: &ValidityStamp) -> bool {
        self.stamp == *current
    }
}
