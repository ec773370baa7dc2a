//! Content-addressed cache of compiled code objects.
//!
//! Keys are the full kernel identity (name, GPU architecture, toolchain
//! version and generator hash), so a hit is exactly reusable. Storage is
//! a single transactional file fronted by a write-through in-process map;
//! `get`/`put` serialize on their own mutexes, `deserialize` (the merge
//! path) takes every lock. A corrupt or unreadable file disables the
//! cache for the process: `get` always misses, `put` is a no-op, and one
//! warning is logged.

pub mod store;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache I/O failed: {0}")]
    Io(String),
    #[error("cache file corrupted: {reason}")]
    Corrupted { reason: String },
    #[error("cache encoding failed: {0}")]
    Encode(String),
}

/// Full identity of one compiled code object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub kernel_name: String,
    pub gpu_arch: String,
    pub toolchain_version: u32,
    pub generator_sum: [u8; 32],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub code: Vec<u8>,
    pub crc32: u32,
    /// Insertion wall-clock seconds; newer wins on merge.
    pub timestamp: u64,
    /// Monotonic recency counter for LRU eviction.
    pub last_used: u64,
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn parse_env_u64(var: &str) -> Option<u64> {
    std::env::var(var)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|v| *v > 0)
}

/// Default size budget for the cache file.
pub const DEFAULT_MAX_BYTES: u64 = 256 * 1024 * 1024;

/// Platform cache file location, overridable via `RUNFFT_RTC_CACHE_PATH`.
pub fn default_cache_path() -> Option<PathBuf> {
    if let Ok(p) = std::env::var("RUNFFT_RTC_CACHE_PATH") {
        return Some(PathBuf::from(p));
    }
    #[cfg(windows)]
    {
        std::env::var("LOCALAPPDATA")
            .ok()
            .map(|base| PathBuf::from(base).join("runfft").join("rtc_cache.bin"))
    }
    #[cfg(not(windows))]
    {
        let base = std::env::var("XDG_CACHE_HOME")
            .map(PathBuf::from)
            .or_else(|_| std::env::var("HOME").map(|h| PathBuf::from(h).join(".cache")))
            .ok()?;
        Some(base.join("runfft").join("rtc_cache.bin"))
    }
}

static DISABLED_WARNING: OnceCell<()> = OnceCell::new();

fn warn_disabled(reason: &dyn std::fmt::Display) {
    DISABLED_WARNING.get_or_init(|| {
        log::warn!("code object cache disabled: {reason}");
    });
}

pub struct RtcCache {
    path: Option<PathBuf>,
    max_bytes: u64,
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
    get_lock: Mutex<()>,
    store_lock: Mutex<()>,
    deserialize_lock: Mutex<()>,
    use_counter: AtomicU64,
    disabled: AtomicBool,
    disabled_reason: Option<String>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl RtcCache {
    /// Open the per-user cache at the default location. Never fails: an
    /// unusable file yields a disabled cache.
    pub fn open_default() -> RtcCache {
        let max_bytes =
            parse_env_u64("RUNFFT_RTC_CACHE_MAX_BYTES").unwrap_or(DEFAULT_MAX_BYTES);
        match default_cache_path() {
            Some(path) => RtcCache::open(&path, max_bytes),
            None => {
                warn_disabled(&"no cache directory available");
                RtcCache::disabled_cache("no cache directory available".to_string())
            }
        }
    }

    /// Open a cache file at an explicit location.
    pub fn open(path: &Path, max_bytes: u64) -> RtcCache {
        match store::read_store(path) {
            Ok(entries) => {
                let mut map = HashMap::with_capacity(entries.len());
                let mut counter = 0u64;
                for (k, e) in entries {
                    counter = counter.max(e.last_used);
                    map.insert(k, e);
                }
                RtcCache {
                    path: Some(path.to_path_buf()),
                    max_bytes,
                    entries: RwLock::new(map),
                    get_lock: Mutex::new(()),
                    store_lock: Mutex::new(()),
                    deserialize_lock: Mutex::new(()),
                    use_counter: AtomicU64::new(counter + 1),
                    disabled: AtomicBool::new(false),
                    disabled_reason: None,
                    hits: AtomicU64::new(0),
                    misses: AtomicU64::new(0),
                }
            }
            Err(err) => {
                warn_disabled(&err);
                RtcCache::disabled_cache(err.to_string())
            }
        }
    }

    /// A cache with no file backing: fully functional in-process, nothing
    /// persisted. Used by tooling that must not touch the user's cache.
    pub fn in_memory(max_bytes: u64) -> RtcCache {
        RtcCache {
            path: None,
            max_bytes,
            entries: RwLock::new(HashMap::new()),
            get_lock: Mutex::new(()),
            store_lock: Mutex::new(()),
            deserialize_lock: Mutex::new(()),
            use_counter: AtomicU64::new(1),
            disabled: AtomicBool::new(false),
            disabled_reason: None,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn disabled_cache(reason: String) -> RtcCache {
        RtcCache {
            path: None,
            max_bytes: 0,
            entries: RwLock::new(HashMap::new()),
            get_lock: Mutex::new(()),
            store_lock: Mutex::new(()),
            deserialize_lock: Mutex::new(()),
            use_counter: AtomicU64::new(1),
            disabled: AtomicBool::new(true),
            disabled_reason: Some(reason),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::Relaxed)
    }

    /// Why the cache is disabled, when it is.
    pub fn disabled_reason(&self) -> Option<&str> {
        self.disabled_reason.as_deref()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `(hits, misses)` since open.
    pub fn counters(&self) -> (u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }

    /// Look up a code object by its full identity.
    pub fn get(&self, key: &CacheKey) -> Option<Vec<u8>> {
        if self.is_disabled() {
            return None;
        }
        let _guard = self.get_lock.lock().ok()?;
        let mut map = self.entries.write().ok()?;
        let stamp = self.use_counter.fetch_add(1, Ordering::Relaxed);
        let intact = map
            .get(key)
            .map(|entry| crc32fast::hash(&entry.code) == entry.crc32);
        match intact {
            Some(true) => {
                let entry = map.get_mut(key)?;
                entry.last_used = stamp;
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.code.clone())
            }
            Some(false) => {
                // A damaged entry behaves like a miss and gets replaced
                // by the next put.
                log::warn!("dropping cache entry with bad checksum: {}", key.kernel_name);
                map.remove(key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert or replace a code object and persist the file.
    pub fn put(&self, key: CacheKey, code: Vec<u8>) {
        if self.is_disabled() {
            return;
        }
        let Ok(_guard) = self.store_lock.lock() else {
            return;
        };
        {
            let Ok(mut map) = self.entries.write() else {
                return;
            };
            let stamp = self.use_counter.fetch_add(1, Ordering::Relaxed);
            let entry = CacheEntry {
                crc32: crc32fast::hash(&code),
                code,
                timestamp: now_secs(),
                last_used: stamp,
            };
            map.insert(key, entry);
            evict_over_budget(&mut map, self.max_bytes);
        }
        self.persist();
    }

    /// Export the cache as a self-contained blob.
    pub fn serialize(&self) -> Result<Vec<u8>, CacheError> {
        let map = self
            .entries
            .read()
            .map_err(|_| CacheError::Io("cache lock poisoned".into()))?;
        let entries: Vec<(CacheKey, CacheEntry)> =
            map.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        store::encode(entries)
    }

    /// Merge a blob produced by [`RtcCache::serialize`]: existing entries
    /// are kept; an incoming entry with the same key replaces only when
    /// its timestamp is newer.
    pub fn deserialize(&self, bytes: &[u8]) -> Result<(), CacheError> {
        if self.is_disabled() {
            return Ok(());
        }
        let _excl = self
            .deserialize_lock
            .lock()
            .map_err(|_| CacheError::Io("cache lock poisoned".into()))?;
        let _get = self.get_lock.lock();
        let _store = self.store_lock.lock();
        let incoming = store::decode(bytes)?;
        {
            let Ok(mut map) = self.entries.write() else {
                return Err(CacheError::Io("cache lock poisoned".into()));
            };
            for (key, entry) in incoming {
                match map.get(&key) {
                    Some(existing) if existing.timestamp >= entry.timestamp => {}
                    _ => {
                        map.insert(key, entry);
                    }
                }
            }
            evict_over_budget(&mut map, self.max_bytes);
        }
        self.persist();
        Ok(())
    }

    fn persist(&self) {
        let Some(path) = &self.path else {
            return;
        };
        let entries: Vec<(CacheKey, CacheEntry)> = match self.entries.read() {
            Ok(map) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            Err(_) => return,
        };
        if let Err(err) = store::write_store(path, entries) {
            log::warn!("failed to persist code object cache: {err}");
        }
    }
}

/// Drop least-recently-used entries until the code payload fits the
/// byte budget.
fn evict_over_budget(map: &mut HashMap<CacheKey, CacheEntry>, max_bytes: u64) {
    if max_bytes == 0 {
        return;
    }
    let mut total: u64 = map.values().map(|e| e.code.len() as u64).sum();
    while total > max_bytes && map.len() > 1 {
        let Some(oldest) = map
            .iter()
            .min_by_key(|(_, e)| e.last_used)
            .map(|(k, _)| k.clone())
        else {
            break;
        };
        if let Some(removed) = map.remove(&oldest) {
            log::debug!("evicting cached kernel {}", oldest.kernel_name);
            total -= removed.code.len() as u64;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    static TEST_ID: AtomicUsize = AtomicUsize::new(0);

    fn temp_cache(max_bytes: u64) -> (RtcCache, PathBuf) {
        let id = TEST_ID.fetch_add(1, Ordering::Relaxed);
        let path = std::env::temp_dir().join(format!(
            "runfft-cache-test-{}-{id}.bin",
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);
        (RtcCache::open(&path, max_bytes), path)
    }

    fn key(name: &str) -> CacheKey {
        CacheKey {
            kernel_name: name.into(),
            gpu_arch: "gfx90a".into(),
            toolchain_version: 600,
            generator_sum: [3u8; 32],
        }
    }

    #[test]
    fn put_then_get_round_trips() {
        let (cache, path) = temp_cache(DEFAULT_MAX_BYTES);
        assert_eq!(cache.get(&key("k")), None);
        cache.put(key("k"), b"object".to_vec());
        cache.put(key("k"), b"object".to_vec());
        assert_eq!(cache.get(&key("k")), Some(b"object".to_vec()));
        assert_eq!(cache.counters(), (1, 1));
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn replace_never_serves_stale_code() {
        let (cache, path) = temp_cache(DEFAULT_MAX_BYTES);
        cache.put(key("k"), b"v1".to_vec());
        cache.put(key("k"), b"v2".to_vec());
        assert_eq!(cache.get(&key("k")), Some(b"v2".to_vec()));
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn keys_differ_on_every_tuple_field() {
        let (cache, path) = temp_cache(DEFAULT_MAX_BYTES);
        cache.put(key("k"), b"a".to_vec());
        let mut other_arch = key("k");
        other_arch.gpu_arch = "gfx1100".into();
        assert_eq!(cache.get(&other_arch), None);
        let mut other_sum = key("k");
        other_sum.generator_sum = [9u8; 32];
        assert_eq!(cache.get(&other_sum), None);
        let mut other_ver = key("k");
        other_ver.toolchain_version = 601;
        assert_eq!(cache.get(&other_ver), None);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn cache_survives_reopen() {
        let (cache, path) = temp_cache(DEFAULT_MAX_BYTES);
        cache.put(key("persist"), b"bytes".to_vec());
        drop(cache);
        let reopened = RtcCache::open(&path, DEFAULT_MAX_BYTES);
        assert_eq!(reopened.get(&key("persist")), Some(b"bytes".to_vec()));
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn serialize_deserialize_preserves_entries() {
        let (a, pa) = temp_cache(DEFAULT_MAX_BYTES);
        a.put(key("one"), b"1".to_vec());
        a.put(key("two"), b"2".to_vec());
        let blob = a.serialize().unwrap();

        let (b, pb) = temp_cache(DEFAULT_MAX_BYTES);
        b.put(key("two"), b"fresher".to_vec());
        b.deserialize(&blob).unwrap();
        assert_eq!(b.get(&key("one")), Some(b"1".to_vec()));
        // Existing entry with an equal-or-newer timestamp is kept.
        assert_eq!(b.get(&key("two")), Some(b"fresher".to_vec()));
        let _ = std::fs::remove_file(pa);
        let _ = std::fs::remove_file(pb);
    }

    #[test]
    fn corrupt_file_disables_the_cache() {
        let id = TEST_ID.fetch_add(1, Ordering::Relaxed);
        let path = std::env::temp_dir().join(format!(
            "runfft-cache-corrupt-{}-{id}.bin",
            std::process::id()
        ));
        std::fs::write(&path, b"not a cache file at all").unwrap();
        let cache = RtcCache::open(&path, DEFAULT_MAX_BYTES);
        assert!(cache.is_disabled());
        assert!(cache.disabled_reason().is_some());
        cache.put(key("k"), b"ignored".to_vec());
        assert_eq!(cache.get(&key("k")), None);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn lru_eviction_respects_the_byte_budget() {
        let (cache, path) = temp_cache(14);
        cache.put(key("a"), vec![0u8; 6]);
        cache.put(key("b"), vec![0u8; 6]);
        // Touch "a" so "b" is the eviction candidate on the next insert.
        assert!(cache.get(&key("a")).is_some());
        cache.put(key("c"), vec![0u8; 6]);
        assert!(cache.get(&key("b")).is_none());
        assert!(cache.get(&key("a")).is_some());
        assert!(cache.get(&key("c")).is_some());
        let _ = std::fs::remove_file(path);
    }
}
