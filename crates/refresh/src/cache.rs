//! TTL cache over a pluggable storage backend.
//!
//! Expiry is decided by the cache, not the backend: backends store entries
//! with their `expires_at` stamp and hand them back verbatim. That is what
//! lets `get_stale` return a logically expired entry for the
//! serve-stale-on-error path.
//!
//! Backend failures never reach callers of `get`/`set`: a failed read is a
//! miss and a failed write is logged and dropped.

use std::fs;
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::Error;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::clock::Clock;

/// Upper bound on a TTL (ten years); longer values are clamped.
const MAX_TTL_SECS: u64 = 10 * 365 * 24 * 3600;

/// Longest key the disk backend hex-encodes as is. Hex doubles the length
/// and most filesystems cap a file name at 255 bytes.
const MAX_PLAIN_KEY_BYTES: usize = 100;

/// One stored value with its expiry stamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEntry {
    pub key: String,
    pub value: Value,
    pub expires_at: DateTime<Utc>,
}

impl StoredEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Raw storage under the TTL cache.
pub trait CacheBackend: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<StoredEntry>, Error>;
    fn store(&self, entry: StoredEntry) -> Result<(), Error>;
    /// Removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<(), Error>;
    fn clear(&self) -> Result<(), Error>;
    fn entries(&self) -> Result<Vec<StoredEntry>, Error>;
    fn describe(&self) -> String;
}

// ── Memory backend ────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: DashMap<String, StoredEntry>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheBackend for MemoryBackend {
    fn load(&self, key: &str) -> Result<Option<StoredEntry>, Error> {
        Ok(self.entries.get(key).map(|e| e.value().clone()))
    }

    fn store(&self, entry: StoredEntry) -> Result<(), Error> {
        self.entries.insert(entry.key.clone(), entry);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), Error> {
        self.entries.remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<(), Error> {
        self.entries.clear();
        Ok(())
    }

    fn entries(&self) -> Result<Vec<StoredEntry>, Error> {
        Ok(self.entries.iter().map(|e| e.value().clone()).collect())
    }

    fn describe(&self) -> String {
        "memory".into()
    }
}

// ── Disk backend ──────────────────────────────────────────────────────

/// One JSON file per key. File names are the hex-encoded key, so any key
/// is a valid name and distinct keys never collide. Keys longer than
/// `MAX_PLAIN_KEY_BYTES` are named by their SHA-256 instead; the file keeps
/// the full key and `load` checks it.
#[derive(Debug, Clone)]
pub struct DiskBackend {
    dir: PathBuf,
}

impl DiskBackend {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, Error> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .map_err(|e| Error::Cache(format!("cannot create {}: {}", dir.display(), e)))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let name = if key.len() <= MAX_PLAIN_KEY_BYTES {
            hex(key.as_bytes())
        } else {
            format!("sha256-{}", hex(&Sha256::digest(key.as_bytes())))
        };
        self.dir.join(format!("{name}.json"))
    }

    fn read_entry(path: &Path) -> Result<Option<StoredEntry>, Error> {
        match fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents)
                .map(Some)
                .map_err(|e| Error::Cache(format!("corrupt cache file {}: {}", path.display(), e))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Cache(format!("read {}: {}", path.display(), e))),
        }
    }
}

impl CacheBackend for DiskBackend {
    fn load(&self, key: &str) -> Result<Option<StoredEntry>, Error> {
        match Self::read_entry(&self.path_for(key))? {
            Some(entry) if entry.key != key => {
                debug!("Cache file for {} holds {}, treating as miss", key, entry.key);
                Ok(None)
            }
            other => Ok(other),
        }
    }

    fn store(&self, entry: StoredEntry) -> Result<(), Error> {
        let path = self.path_for(&entry.key);
        let tmp = path.with_extension("json.tmp");
        let contents = serde_json::to_vec(&entry)?;
        fs::write(&tmp, contents)
            .and_then(|_| fs::rename(&tmp, &path))
            .map_err(|e| Error::Cache(format!("write {}: {}", path.display(), e)))
    }

    fn remove(&self, key: &str) -> Result<(), Error> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Cache(format!("remove {}: {}", path.display(), e))),
        }
    }

    fn clear(&self) -> Result<(), Error> {
        for entry in self.entries()? {
            self.remove(&entry.key)?;
        }
        Ok(())
    }

    fn entries(&self) -> Result<Vec<StoredEntry>, Error> {
        let listing = fs::read_dir(&self.dir)
            .map_err(|e| Error::Cache(format!("list {}: {}", self.dir.display(), e)))?;

        let mut entries = Vec::new();
        for item in listing {
            let path = item?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::read_entry(&path) {
                Ok(Some(entry)) => entries.push(entry),
                Ok(None) => {}
                Err(e) => warn!("Ignoring unreadable cache file: {}", e),
            }
        }
        Ok(entries)
    }

    fn describe(&self) -> String {
        format!("disk ({})", self.dir.display())
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

// ── TTL cache ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub expired: usize,
    pub backend: String,
}

pub struct TtlCache {
    backend: Arc<dyn CacheBackend>,
    clock: Arc<dyn Clock>,
}

impl TtlCache {
    pub fn new(backend: Arc<dyn CacheBackend>, clock: Arc<dyn Clock>) -> Self {
        Self { backend, clock }
    }

    fn load(&self, key: &str) -> Option<StoredEntry> {
        match self.backend.load(key) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Cache read for {} failed, treating as miss: {}", key, e);
                None
            }
        }
    }

    /// Value under `key` if present and not yet expired.
    pub fn get(&self, key: &str) -> Option<Value> {
        match self.load(key) {
            Some(entry) if !entry.is_expired(self.clock.now()) => {
                debug!("Cache hit: {}", key);
                Some(entry.value)
            }
            Some(_) => {
                debug!("Cache expired: {}", key);
                None
            }
            None => {
                debug!("Cache miss: {}", key);
                None
            }
        }
    }

    /// Value under `key` regardless of expiry.
    pub fn get_stale(&self, key: &str) -> Option<Value> {
        self.load(key).map(|entry| entry.value)
    }

    /// Store `value` for `ttl_secs`, replacing any previous entry.
    pub fn set(&self, key: &str, value: Value, ttl_secs: u64) {
        let ttl = chrono::Duration::seconds(ttl_secs.min(MAX_TTL_SECS) as i64);
        let entry = StoredEntry {
            key: key.to_string(),
            value,
            expires_at: self.clock.now() + ttl,
        };
        if let Err(e) = self.backend.store(entry) {
            warn!("Cache write for {} dropped: {}", key, e);
        }
    }

    pub fn delete(&self, key: &str) {
        if let Err(e) = self.backend.remove(key) {
            warn!("Cache delete for {} failed: {}", key, e);
        }
    }

    pub fn clear(&self) {
        if let Err(e) = self.backend.clear() {
            warn!("Cache clear failed: {}", e);
        }
    }

    /// Cached value for `key`, or the result of `compute` stored for `ttl_secs`.
    ///
    /// `compute` runs at most once and only on a miss. Its error is returned
    /// as is and nothing is cached.
    pub async fn get_or_compute<T, F, Fut>(
        &self,
        key: &str,
        ttl_secs: u64,
        compute: F,
    ) -> Result<T, Error>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        if let Some(cached) = self.get(key) {
            match serde_json::from_value(cached) {
                Ok(value) => return Ok(value),
                Err(e) => debug!("Cached {} has an unexpected shape, recomputing: {}", key, e),
            }
        }

        let value = compute().await?;
        match serde_json::to_value(&value) {
            Ok(json) => self.set(key, json, ttl_secs),
            Err(e) => warn!("Computed value for {} is not serializable: {}", key, e),
        }
        Ok(value)
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_except(&[])
    }

    /// Like `purge_expired`, but entries under `keep` survive expiry so they
    /// remain available to `get_stale`.
    pub fn purge_expired_except(&self, keep: &[&str]) -> usize {
        let now = self.clock.now();
        let entries = match self.backend.entries() {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Cache purge skipped: {}", e);
                return 0;
            }
        };

        let mut purged = 0;
        let expired = entries
            .iter()
            .filter(|e| e.is_expired(now) && !keep.contains(&e.key.as_str()));
        for entry in expired {
            match self.backend.remove(&entry.key) {
                Ok(()) => purged += 1,
                Err(e) => warn!("Cache purge of {} failed: {}", entry.key, e),
            }
        }
        if purged > 0 {
            debug!("Purged {} expired cache entries", purged);
        }
        purged
    }

    pub fn stats(&self) -> CacheStats {
        let now = self.clock.now();
        let entries = self.backend.entries().unwrap_or_else(|e| {
            warn!("Cache stats unavailable: {}", e);
            Vec::new()
        });
        CacheStats {
            entries: entries.len(),
            expired: entries.iter().filter(|e| e.is_expired(now)).count(),
            backend: self.backend.describe(),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Backend whose storage is always unavailable.
    pub(crate) struct FailingBackend;

    impl CacheBackend for FailingBackend {
        fn load(&self, _key: &str) -> Result<Option<StoredEntry>, Error> {
            Err(Error::Cache("storage offline".into()))
        }
        fn store(&self, _entry: StoredEntry) -> Result<(), Error> {
            Err(Error::Cache("storage offline".into()))
        }
        fn remove(&self, _key: &str) -> Result<(), Error> {
            Err(Error::Cache("storage offline".into()))
        }
        fn clear(&self) -> Result<(), Error> {
            Err(Error::Cache("storage offline".into()))
        }
        fn entries(&self) -> Result<Vec<StoredEntry>, Error> {
            Err(Error::Cache("storage offline".into()))
        }
        fn describe(&self) -> String {
            "failing".into()
        }
    }

    fn memory_cache() -> (TtlCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        (TtlCache::new(Arc::new(MemoryBackend::new()), clock.clone()), clock)
    }

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("airwatch-cache-{}-{}", std::process::id(), name));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_get_respects_ttl() {
        let (cache, clock) = memory_cache();
        cache.set("k", json!({"a": 1}), 300);

        clock.advance_secs(299);
        assert_eq!(cache.get("k"), Some(json!({"a": 1})));

        clock.advance_secs(1);
        assert_eq!(cache.get("k"), None);
        assert_eq!(cache.get_stale("k"), Some(json!({"a": 1})), "expired entry still stored");
    }

    #[test]
    fn test_set_overwrites_and_delete_is_idempotent() {
        let (cache, _clock) = memory_cache();
        cache.set("k", json!(1), 60);
        cache.set("k", json!(2), 60);
        assert_eq!(cache.get("k"), Some(json!(2)));

        cache.delete("k");
        cache.delete("k");
        assert_eq!(cache.get_stale("k"), None);
    }

    #[test]
    fn test_clear_and_purge() {
        let (cache, clock) = memory_cache();
        cache.set("short", json!("s"), 10);
        cache.set("long", json!("l"), 1000);
        clock.advance_secs(11);

        assert_eq!(cache.stats().expired, 1);
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.stats().entries, 1);
        assert_eq!(cache.get("long"), Some(json!("l")));

        cache.clear();
        assert_eq!(cache.stats().entries, 0);
    }

    #[test]
    fn test_purge_keeps_listed_keys() {
        let (cache, clock) = memory_cache();
        cache.set("locations:all", json!([1, 2]), 10);
        cache.set("scratch", json!("s"), 10);
        clock.advance_secs(60);

        assert_eq!(cache.purge_expired_except(&["locations:all"]), 1);
        assert_eq!(cache.get("locations:all"), None);
        assert_eq!(cache.get_stale("locations:all"), Some(json!([1, 2])));
        assert_eq!(cache.get_stale("scratch"), None);
    }

    #[tokio::test]
    async fn test_get_or_compute_runs_once_on_miss() {
        let (cache, _clock) = memory_cache();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let value: Vec<u32> = cache
                .get_or_compute("numbers", 60, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(vec![1, 2, 3])
                })
                .await
                .unwrap();
            assert_eq!(value, vec![1, 2, 3]);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_get_or_compute_does_not_cache_errors() {
        let (cache, _clock) = memory_cache();

        let failed: Result<u32, Error> = cache
            .get_or_compute("flaky", 60, || async { Err(Error::Http("down".into())) })
            .await;
        assert!(matches!(failed, Err(Error::Http(_))));
        assert_eq!(cache.get_stale("flaky"), None);

        let ok: u32 = cache.get_or_compute("flaky", 60, || async { Ok(7) }).await.unwrap();
        assert_eq!(ok, 7);
    }

    #[test]
    fn test_failing_backend_degrades_to_miss() {
        let cache = TtlCache::new(Arc::new(FailingBackend), Arc::new(ManualClock::default()));
        cache.set("k", json!(1), 60);
        assert_eq!(cache.get("k"), None);
        assert_eq!(cache.get_stale("k"), None);
        assert_eq!(cache.purge_expired(), 0);
        assert_eq!(cache.stats().entries, 0);
    }

    #[test]
    fn test_disk_backend_round_trip() {
        let dir = temp_dir("round-trip");
        let clock = Arc::new(ManualClock::default());
        let cache = TtlCache::new(Arc::new(DiskBackend::open(&dir).unwrap()), clock.clone());

        let raw = json!([{"id": 1, "coordinates": {"latitude": 48.856614, "longitude": 2.3522219}}]);
        cache.set("locations:all", raw.clone(), 300);
        assert_eq!(cache.get("locations:all"), Some(raw.clone()));

        // A second handle on the same directory sees the entry.
        let reopened = TtlCache::new(Arc::new(DiskBackend::open(&dir).unwrap()), clock.clone());
        assert_eq!(reopened.get("locations:all"), Some(raw));
        assert_eq!(reopened.stats().entries, 1);

        cache.delete("locations:all");
        assert_eq!(reopened.get_stale("locations:all"), None);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_disk_backend_keys_do_not_collide() {
        let dir = temp_dir("collide");
        let backend = DiskBackend::open(&dir).unwrap();
        assert_ne!(backend.path_for("a:b"), backend.path_for("a_b"));

        let cache = TtlCache::new(Arc::new(backend), Arc::new(ManualClock::default()));
        cache.set("a:b", json!(1), 60);
        cache.set("a_b", json!(2), 60);
        assert_eq!(cache.get("a:b"), Some(json!(1)));
        assert_eq!(cache.get("a_b"), Some(json!(2)));

        cache.clear();
        assert_eq!(cache.stats().entries, 0);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_disk_backend_stores_long_keys() {
        let dir = temp_dir("long-keys");
        let backend = DiskBackend::open(&dir).unwrap();
        let long_a = format!("measurements:{}:a", "x".repeat(300));
        let long_b = format!("measurements:{}:b", "x".repeat(300));

        let name_len = backend
            .path_for(&long_a)
            .file_name()
            .map(|n| n.len())
            .unwrap_or(usize::MAX);
        assert!(name_len < 255, "file name is {name_len} bytes");
        assert_ne!(backend.path_for(&long_a), backend.path_for(&long_b));

        let cache = TtlCache::new(Arc::new(backend), Arc::new(ManualClock::default()));
        cache.set(&long_a, json!("a"), 60);
        cache.set(&long_b, json!("b"), 60);
        assert_eq!(cache.get(&long_a), Some(json!("a")));
        assert_eq!(cache.get(&long_b), Some(json!("b")));
        assert_eq!(cache.stats().entries, 2);

        cache.delete(&long_a);
        assert_eq!(cache.get_stale(&long_a), None);
        assert_eq!(cache.get(&long_b), Some(json!("b")));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_disk_backend_ignores_file_for_another_key() {
        let dir = temp_dir("mismatch");
        let backend = DiskBackend::open(&dir).unwrap();
        let entry = StoredEntry {
            key: "other".into(),
            value: json!(1),
            expires_at: ManualClock::default().now() + chrono::Duration::seconds(60),
        };
        fs::write(backend.path_for("k"), serde_json::to_vec(&entry).unwrap()).unwrap();

        assert_eq!(backend.load("k").unwrap(), None);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_disk_backend_corrupt_file_is_a_miss() {
        let dir = temp_dir("corrupt");
        let backend = DiskBackend::open(&dir).unwrap();
        fs::write(backend.path_for("k"), b"{not json").unwrap();

        let cache = TtlCache::new(Arc::new(backend), Arc::new(ManualClock::default()));
        assert_eq!(cache.get("k"), None);
        let _ = fs::remove_dir_all(&dir);
    }
}
