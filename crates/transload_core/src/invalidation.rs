//! Cache invalidation strategies.
//!
//! In mtime mode an entry is valid while the file's modification time is unchanged.
//! In checksum (relocatable) mode it is valid while the file's content digest is
//! unchanged, which survives moving the project to another directory.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use transload_cache::{CacheEntry, ValidityStamp};

use crate::RegisterError;

/// Number of bytes in a content checksum.
const CHECKSUM_LEN: usize = 16;

/// How cached entries are judged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum InvalidationMode {
    /// Compare modification times. Keys include the absolute file path.
    #[default]
    Mtime,
    /// Compare content checksums. Keys use `{project_name}:{path relative to source_root}`.
    Checksum {
        source_root: PathBuf,
        project_name: String,
    },
}

/// Outcome of checking a cache candidate.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    /// The entry is current.
    Hit(CacheEntry),
    /// No entry was stored under the key.
    Absent,
    /// An entry exists but its stamp no longer matches.
    Stale,
}

impl InvalidationMode {
    pub fn is_relocatable(&self) -> bool {
        matches!(self, Self::Checksum { .. })
    }

    pub fn project_name(&self) -> Option<&str> {
        match self {
            Self::Mtime => None,
            Self::Checksum { project_name, .. } => Some(project_name),
        }
    }

    /// Short name used in messages.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Mtime => "mtime",
            Self::Checksum { .. } => "checksum",
        }
    }

    /// Computes the stamp describing the current state of `path`.
    pub fn current_stamp(&self, path: &Path) -> Result<ValidityStamp, RegisterError> {
        match self {
            Self::Mtime => mtime(path).map(ValidityStamp::Mtime),
            Self::Checksum { .. } => checksum(path).map(ValidityStamp::Checksum),
        }
    }

    /// Checks a candidate entry against the current stamp.
    pub fn check(&self, candidate: Option<CacheEntry>, current: &ValidityStamp) -> Lookup {
        match candidate {
            None => Lookup::Absent,
            Some(entry) if entry.matches(current) => Lookup::Hit(entry),
            Some(_) => Lookup::Stale,
        }
    }
}

/// Modification time of `path` in milliseconds since the Unix epoch.
pub fn mtime(path: &Path) -> Result<i64, RegisterError> {
    let modified = fs::metadata(path)
        .and_then(|m| m.modified())
        .map_err(|e| RegisterError::file(format!("Failed to stat {}: {}", path.display(), e)))?;

    let millis = match modified.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_millis() as i64,
        Err(e) => -(e.duration().as_millis() as i64),
    };
    Ok(millis)
}

/// Hex checksum of the text of `path`. Invalid UTF-8 is replaced, not rejected.
pub fn checksum(path: &Path) -> Result<String, RegisterError> {
    let bytes = fs::read(path)
        .map_err(|e| RegisterError::file(format!("Failed to read {}: {}", path.display(), e)))?;
    Ok(checksum_text(&String::from_utf8_lossy(&bytes)))
}

/// 128-bit BLAKE3 digest of `text`, hex-encoded.
pub fn checksum_text(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex()[..CHECKSUM_LEN * 2].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs::File;
    use std::time::{Duration, SystemTime};
    use tempfile::tempdir;

    fn set_mtime(path: &Path, time: SystemTime) {
        File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(time)
            .unwrap();
    }

    fn relocatable() -> InvalidationMode {
        InvalidationMode::Checksum {
            source_root: PathBuf::from("/work"),
            project_name: "app".to_string(),
        }
    }

    #[test]
    fn test_checksum_text_shape() {
        let sum = checksum_text("hello");
        assert_eq!(sum.len(), CHECKSUM_LEN * 2);
        assert!(sum.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(sum, checksum_text("hello"));
        assert_ne!(sum, checksum_text("hello!"));
    }

    #[test]
    fn test_checksum_text_unicode() {
        assert_eq!(checksum_text("日本語"), checksum_text("日本語"));
        assert_ne!(checksum_text("日本語"), checksum_text("中文"));
    }

    #[test]
    fn test_mtime_mode_ignores_content_with_same_mtime() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.js");
        let fixed = UNIX_EPOCH + Duration::from_secs(1_700_000_000);

        fs::write(&path, "one").unwrap();
        set_mtime(&path, fixed);
        let before = InvalidationMode::Mtime.current_stamp(&path).unwrap();

        fs::write(&path, "two").unwrap();
        set_mtime(&path, fixed);
        let after = InvalidationMode::Mtime.current_stamp(&path).unwrap();

        assert_eq!(before, ValidityStamp::Mtime(1_700_000_000_000));
        assert_eq!(before, after);
    }

    #[test]
    fn test_mtime_mode_touch_invalidates() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.js");
        fs::write(&path, "same").unwrap();
        set_mtime(&path, UNIX_EPOCH + Duration::from_secs(1_700_000_000));

        let mode = InvalidationMode::Mtime;
        let entry = CacheEntry::new("code", None, mode.current_stamp(&path).unwrap());

        set_mtime(&path, UNIX_EPOCH + Duration::from_secs(1_700_000_100));
        let current = mode.current_stamp(&path).unwrap();

        assert_eq!(mode.check(Some(entry), &current), Lookup::Stale);
    }

    #[test]
    fn test_checksum_mode_content_change_invalidates_with_fixed_mtime() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.js");
        let fixed = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let mode = relocatable();

        fs::write(&path, "one").unwrap();
        set_mtime(&path, fixed);
        let entry = CacheEntry::new("code", None, mode.current_stamp(&path).unwrap());

        fs::write(&path, "two").unwrap();
        set_mtime(&path, fixed);
        let current = mode.current_stamp(&path).unwrap();

        assert_eq!(mode.check(Some(entry), &current), Lookup::Stale);
    }

    #[test]
    fn test_checksum_mode_survives_touch() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.js");
        let mode = relocatable();

        fs::write(&path, "same").unwrap();
        set_mtime(&path, UNIX_EPOCH + Duration::from_secs(1_700_000_000));
        let entry = CacheEntry::new("code", None, mode.current_stamp(&path).unwrap());

        set_mtime(&path, UNIX_EPOCH + Duration::from_secs(1_700_000_100));
        let current = mode.current_stamp(&path).unwrap();

        assert_eq!(mode.check(Some(entry.clone()), &current), Lookup::Hit(entry));
    }

    #[test]
    fn test_check_absent() {
        let current = ValidityStamp::Mtime(1);
        assert_eq!(InvalidationMode::Mtime.check(None, &current), Lookup::Absent);
    }

    #[test]
    fn test_checksum_accepts_invalid_utf8() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("latin1.js");
        fs::write(&path, b"let s = '\xe9';").unwrap();

        let sum = checksum(&path).unwrap();

        assert_eq!(sum, checksum_text("let s = '\u{fffd}';"));
        assert_ne!(sum, checksum_text("let s = 'e';"));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing.js");

        assert!(matches!(
            InvalidationMode::Mtime.current_stamp(&path),
            Err(RegisterError::File(_))
        ));
        assert!(matches!(
            relocatable().current_stamp(&path),
            Err(RegisterError::File(_))
        ));
    }

    #[test]
    fn test_mode_accessors() {
        assert!(!InvalidationMode::Mtime.is_relocatable());
        assert_eq!(InvalidationMode::Mtime.project_name(), None);
        assert!(relocatable().is_relocatable());
        assert_eq!(relocatable().project_name(), Some("app"));
        assert_eq!(relocatable().name(), "checksum");
    }
}
