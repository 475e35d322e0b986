//! File-backed cache store with coalesced, deferred flushing.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::{CacheEntry, CacheError, Scheduler};

/// Largest serialized store that will be written to disk.
pub const DEFAULT_SIZE_LIMIT: usize = 512 * 1024 * 1024;

/// Owns the in-memory key → entry mapping and its backing file.
///
/// Cloning yields another handle to the same store, which is how deferred
/// flush tasks reach it.
#[derive(Clone)]
pub struct CacheStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, CacheEntry>>,
    enabled: AtomicBool,
    pending_flush: AtomicBool,
    size_limit: usize,
}

impl CacheStore {
    /// Creates an empty store backed by `path`. Nothing is read from disk.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_size_limit(path, DEFAULT_SIZE_LIMIT)
    }

    /// Creates an empty store that refuses to save payloads above `size_limit` bytes.
    pub fn with_size_limit(path: impl Into<PathBuf>, size_limit: usize) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                path: path.into(),
                entries: Mutex::new(BTreeMap::new()),
                enabled: AtomicBool::new(true),
                pending_flush: AtomicBool::new(false),
                size_limit,
            }),
        }
    }

    /// Creates a store that never holds entries and never touches disk.
    pub fn disabled(path: impl Into<PathBuf>) -> Self {
        let store = Self::new(path);
        store.disable();
        store
    }

    /// Opens the store at `path`, loading any existing entries.
    ///
    /// A missing or unparsable file yields an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let store = Self::new(path);
        if let Err(e) = store.load() {
            warn!("Failed to load cache, starting empty: {}", e);
        }
        store
    }

    /// Replaces the in-memory entries with the content of the backing file.
    ///
    /// Returns the number of entries loaded. A missing file is not an error.
    pub fn load(&self) -> Result<usize, CacheError> {
        let path = &self.inner.path;

        if !path.exists() {
            debug!("No cache file found at {}", path.display());
            return Ok(0);
        }

        let content = fs::read(path).map_err(|e| CacheError::read(path, e))?;
        let entries: BTreeMap<String, CacheEntry> = serde_json::from_slice(&content)
            .map_err(|e| CacheError::corrupted(e.to_string()))?;

        let count = entries.len();
        info!("Loaded {} cache entries", count);
        *self.inner.entries.lock() = entries;

        Ok(count)
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Disables the store. Lookups miss and writes are dropped from then on.
    pub fn disable(&self) {
        self.inner.enabled.store(false, Ordering::Release);
    }

    /// Returns whether the store is enabled.
    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::Acquire)
    }

    /// Looks up an entry by cache key.
    pub fn lookup(&self, key: &str) -> Option<CacheEntry> {
        if !self.is_enabled() {
            return None;
        }
        self.inner.entries.lock().get(key).cloned()
    }

    /// Stores an entry, replacing any previous entry for the key.
    pub fn put(&self, key: impl Into<String>, entry: CacheEntry) {
        if self.is_enabled() {
            self.inner.entries.lock().insert(key.into(), entry);
        }
    }

    /// Requests a flush on the scheduler's next turn.
    ///
    /// Calls made while a flush is already pending are coalesced into it. The
    /// pending flag is cleared right before the flush runs, so requests made
    /// while it runs schedule a new flush.
    pub fn schedule_flush(&self, scheduler: &dyn Scheduler) {
        if !self.is_enabled() {
            return;
        }
        if self.inner.pending_flush.swap(true, Ordering::AcqRel) {
            return;
        }

        let store = self.clone();
        scheduler.defer(Box::new(move || {
            store.inner.pending_flush.store(false, Ordering::Release);
            store.flush();
        }));
    }

    /// Returns true if a scheduled flush has not run yet.
    pub fn is_flush_pending(&self) -> bool {
        self.inner.pending_flush.load(Ordering::Acquire)
    }

    /// Flushes now, logging and swallowing any failure.
    pub fn flush(&self) {
        if let Err(e) = self.flush_now() {
            warn!("Failed to save cache: {}", e);
        }
    }

    /// Serializes the current entries and writes them to the backing file.
    pub fn flush_now(&self) -> Result<(), CacheError> {
        if !self.is_enabled() {
            return Ok(());
        }

        let (payload, count) = {
            let entries = self.inner.entries.lock();
            let payload = serde_json::to_vec_pretty(&*entries)
                .map_err(|e| CacheError::Serialization(e.to_string()))?;
            (payload, entries.len())
        };

        if payload.len() > self.inner.size_limit {
            return Err(CacheError::TooLarge {
                size: payload.len(),
                limit: self.inner.size_limit,
            });
        }

        let path = &self.inner.path;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| CacheError::write(path, e))?;
        }
        fs::write(path, payload).map_err(|e| CacheError::write(path, e))?;

        info!("Saved {} cache entries to {}", count, path.display());
        Ok(())
    }

    /// Removes every entry from memory. The backing file is rewritten on the next flush.
    pub fn clear(&self) {
        self.inner.entries.lock().clear();
    }

    /// Copies out the entries currently held in memory.
    pub fn snapshot(&self) -> BTreeMap<String, CacheEntry> {
        self.inner.entries.lock().clone()
    }

    /// Returns the number of entries held in memory.
    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    /// Returns true if no entries are held in memory.
    pub fn is_empty(&self) -> bool {
        self.inner.entries.lock().is_empty()
    }
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("path", &self.inner.path)
            .field("enabled", &self.is_enabled())
            .field("entries", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{TurnQueue, ValidityStamp};
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use tempfile::tempdir;

    fn entry(code: &str) -> CacheEntry {
        CacheEntry::new(code, None, ValidityStamp::Mtime(1))
    }

    fn read_store(path: &Path) -> BTreeMap<String, CacheEntry> {
        serde_json::from_slice(&fs::read(path).unwrap()).unwrap()
    }

    #[test]
    fn test_put_lookup() {
        let store = CacheStore::new("/tmp/unused.json");
        store.put("k", entry("a"));

        assert_eq!(store.lookup("k"), Some(entry("a")));
        assert_eq!(store.lookup("missing"), None);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_put_replaces_entry() {
        let store = CacheStore::new("/tmp/unused.json");
        store.put("k", entry("a"));
        store.put("k", entry("b"));

        assert_eq!(store.lookup("k").unwrap().code, "b");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_disabled_store_ignores_writes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let store = CacheStore::disabled(&path);
        let queue = TurnQueue::new();

        store.put("k", entry("a"));
        store.schedule_flush(&queue);

        assert!(store.is_empty());
        assert_eq!(store.lookup("k"), None);
        assert_eq!(queue.pending(), 0);
        store.flush_now().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_open_missing_file_starts_empty() {
        let dir = tempdir().unwrap();
        let store = CacheStore::open(dir.path().join("absent.json"));
        assert!(store.is_empty());
    }

    #[rstest]
    #[case::garbage("this is not json")]
    #[case::truncated(r#"{ "key": { "code": "x", "mtime": 1 "#)]
    #[case::wrong_shape(r#"[1, 2, 3]"#)]
    #[case::missing_stamp(r#"{ "key": { "code": "x" } }"#)]
    fn test_open_corrupted_file_starts_empty(#[case] content: &str) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");
        fs::write(&path, content).unwrap();

        let store = CacheStore::open(&path);
        assert!(store.is_empty());

        let strict = CacheStore::new(&path);
        assert!(matches!(strict.load(), Err(CacheError::Corrupted(_))));
    }

    #[test]
    fn test_flush_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("cache.json");

        let store = CacheStore::new(&path);
        store.put("one", entry("1"));
        store.put(
            "two",
            CacheEntry::new("2", None, ValidityStamp::Checksum("ff".to_string())),
        );
        store.flush_now().unwrap();

        let reopened = CacheStore::open(&path);
        assert_eq!(reopened.len(), 2);
        assert_eq!(reopened.lookup("one"), Some(entry("1")));
        assert_eq!(
            reopened.lookup("two").unwrap().stamp,
            ValidityStamp::Checksum("ff".to_string())
        );
    }

    #[test]
    fn test_flush_writes_indented_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");

        let store = CacheStore::new(&path);
        store.put("k", entry("a"));
        store.flush_now().unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("\n  \"k\": {\n"));
    }

    #[test]
    fn test_puts_in_one_turn_coalesce_into_one_flush() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let store = CacheStore::new(&path);
        let queue = TurnQueue::new();

        for i in 0..5 {
            store.put(format!("key{}", i), entry(&i.to_string()));
            store.schedule_flush(&queue);
        }

        assert_eq!(queue.pending(), 1);
        assert!(store.is_flush_pending());
        assert!(!path.exists());

        assert_eq!(queue.run_turn(), 1);
        assert!(!store.is_flush_pending());
        assert_eq!(read_store(&path).len(), 5);
    }

    #[test]
    fn test_flush_snapshots_at_run_time() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let store = CacheStore::new(&path);
        let queue = TurnQueue::new();

        store.put("early", entry("e"));
        store.schedule_flush(&queue);
        store.put("late", entry("l"));

        queue.run_turn();

        let saved = read_store(&path);
        assert!(saved.contains_key("early"));
        assert!(saved.contains_key("late"));
    }

    #[test]
    fn test_schedule_after_flush_queues_new_flush() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let store = CacheStore::new(&path);
        let queue = TurnQueue::new();

        store.put("a", entry("a"));
        store.schedule_flush(&queue);
        queue.run_turn();

        store.put("b", entry("b"));
        store.schedule_flush(&queue);
        assert_eq!(queue.pending(), 1);
        queue.run_turn();

        assert_eq!(read_store(&path).len(), 2);
    }

    #[test]
    fn test_write_failure_keeps_memory() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "x").unwrap();
        let store = CacheStore::new(blocker.join("cache.json"));

        store.put("k", entry("a"));
        let result = store.flush_now();

        assert!(matches!(result, Err(CacheError::WriteError { .. })));
        assert_eq!(store.lookup("k"), Some(entry("a")));

        // swallowing variant must not panic
        store.flush();
    }

    #[test]
    fn test_too_large_skips_save() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let store = CacheStore::with_size_limit(&path, 16);

        store.put("k", entry("a fairly long piece of generated code"));
        let result = store.flush_now();

        assert!(matches!(result, Err(CacheError::TooLarge { .. })));
        assert!(!path.exists());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_clear() {
        let store = CacheStore::new("/tmp/unused.json");
        store.put("a", entry("a"));
        store.put("b", entry("b"));
        store.clear();
        assert!(store.is_empty());
    }
}
