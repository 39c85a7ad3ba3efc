//! Key/value caches with TTL for source bodies and rendered scripts.
//!
//! Two independent instances are used at runtime: the source cache (fetched
//! hosts files, long TTL) and the result cache (rendered scripts keyed by the
//! whole request, short TTL). Expiration is checked lazily on read; there is no
//! background eviction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

#[cfg(test)]
use mockall::automock;

use crate::config::{CacheBackend, CacheConfig};
use crate::error::CacheError;

/// Shared cache handle, injected into the fetcher and the generate command.
pub type SharedCache = Arc<dyn Cache>;

/// Contract shared by every cache backend.
///
/// A `put` overwrites any previous value for the key as a whole; readers see
/// either the old or the new value, never a mix of both.
#[cfg_attr(test, automock)]
pub trait Cache: Send + Sync {
    /// Get a live value. Expired and missing keys both yield `Ok(None)`.
    fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Store a value for `ttl`. Empty keys and empty values are refused.
    fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Remove a key, returning whether it was present.
    fn delete(&self, key: &str) -> Result<bool, CacheError>;

    /// Remove every entry, returning how many were dropped.
    fn clear(&self) -> Result<usize, CacheError>;

    /// Check for a live value.
    fn has(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.get(key)?.is_some())
    }
}

/// Stable cache key: `<namespace>:<sha256 hex of the parts>`.
///
/// Parts are separated by a NUL byte so `["ab", "c"]` and `["a", "bc"]`
/// produce different keys.
pub fn cache_key(namespace: &str, parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update([0u8]);
        }
        hasher.update(part.as_bytes());
    }
    format!("{}:{:x}", namespace, hasher.finalize())
}

/// Read through a cache, degrading any backend failure to a miss.
pub fn get_or_miss(cache: &dyn Cache, key: &str) -> Option<String> {
    match cache.get(key) {
        Ok(value) => value,
        Err(e) => {
            warn!("Cache read failed for {}: {}", key, e);
            None
        }
    }
}

/// Write through a cache, logging and dropping any backend failure.
pub fn put_or_log(cache: &dyn Cache, key: &str, value: &str, ttl: Duration) {
    if let Err(e) = cache.put(key, value, ttl) {
        warn!("Cache write failed for {}: {}", key, e);
    }
}

/// Build the source and result caches described by the configuration.
pub fn open_caches(config: &CacheConfig) -> (SharedCache, SharedCache) {
    match config.backend {
        CacheBackend::Memory => (Arc::new(MemoryCache::new()), Arc::new(MemoryCache::new())),
        CacheBackend::File => (
            Arc::new(FileCache::new(config.dir.join("sources"))),
            Arc::new(FileCache::new(config.dir.join("results"))),
        ),
        CacheBackend::Disabled => (Arc::new(NoCache), Arc::new(NoCache)),
    }
}

fn check_entry(key: &str, value: &str) -> Result<(), CacheError> {
    if key.is_empty() {
        return Err(CacheError::EmptyKey);
    }
    if value.is_empty() {
        return Err(CacheError::EmptyValue);
    }
    Ok(())
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: Arc<str>,
    /// `None` when the TTL reaches past what `Instant` can represent
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }
}

/// In-process cache guarded by a `RwLock`.
#[derive(Debug, Default)]
pub struct MemoryCache {
    storage: RwLock<HashMap<String, MemoryEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.storage.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Cache for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        if key.is_empty() {
            return Err(CacheError::EmptyKey);
        }

        let expired = {
            let storage = self.storage.read().unwrap_or_else(|e| e.into_inner());
            match storage.get(key) {
                Some(entry) if !entry.is_expired(Instant::now()) => {
                    return Ok(Some(entry.value.to_string()));
                }
                Some(_) => true,
                None => false,
            }
        };

        if expired {
            let mut storage = self.storage.write().unwrap_or_else(|e| e.into_inner());
            // Re-check: a concurrent put may have refreshed the entry
            if storage
                .get(key)
                .is_some_and(|entry| entry.is_expired(Instant::now()))
            {
                storage.remove(key);
            }
        }

        Ok(None)
    }

    fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        check_entry(key, value)?;

        let entry = MemoryEntry {
            value: Arc::from(value),
            expires_at: Instant::now().checked_add(ttl),
        };
        self.storage
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), entry);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool, CacheError> {
        if key.is_empty() {
            return Err(CacheError::EmptyKey);
        }
        Ok(self
            .storage
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key)
            .is_some())
    }

    fn clear(&self) -> Result<usize, CacheError> {
        let mut storage = self.storage.write().unwrap_or_else(|e| e.into_inner());
        let count = storage.len();
        storage.clear();
        Ok(count)
    }
}

/// On-disk representation of a file cache entry.
#[derive(Debug, Serialize, Deserialize)]
struct FileEntry {
    value: String,
    expires_at: DateTime<Utc>,
}

/// Directory-backed cache: one JSON document per key.
///
/// Writes go through a temporary file in the same directory followed by an
/// atomic rename, so a reader never sees a half-written entry.
#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        // Keys are "<namespace>:<hex>"; ':' is not portable in file names
        self.dir.join(format!("{}.json", key.replace(':', "_")))
    }
}

impl Cache for FileCache {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        if key.is_empty() {
            return Err(CacheError::EmptyKey);
        }

        let path = self.entry_path(key);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let entry: FileEntry = serde_json::from_str(&content)?;
        if Utc::now() >= entry.expires_at {
            debug!("Cache entry {} expired at {}", key, entry.expires_at);
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            return Ok(None);
        }

        Ok(Some(entry.value))
    }

    fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        check_entry(key, value)?;

        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        let expires_at = Utc::now()
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let entry = FileEntry {
            value: value.to_string(),
            expires_at,
        };
        let content = serde_json::to_string(&entry)?;

        fs::create_dir_all(&self.dir)?;
        let mut temp_file = NamedTempFile::new_in(&self.dir)?;
        temp_file.write_all(content.as_bytes())?;
        temp_file.as_file().sync_all()?;
        temp_file
            .persist(self.entry_path(key))
            .map_err(|e| CacheError::Unavailable(e.error))?;

        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool, CacheError> {
        if key.is_empty() {
            return Err(CacheError::EmptyKey);
        }
        match fs::remove_file(self.entry_path(key)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn clear(&self) -> Result<usize, CacheError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        for entry in entries {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                fs::remove_file(&path)?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// Cache that stores nothing; every read is a miss.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCache;

impl Cache for NoCache {
    fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
        Ok(None)
    }

    fn put(&self, key: &str, value: &str, _ttl: Duration) -> Result<(), CacheError> {
        check_entry(key, value)
    }

    fn delete(&self, _key: &str) -> Result<bool, CacheError> {
        Ok(false)
    }

    fn clear(&self) -> Result<usize, CacheError> {
        Ok(0)
    }
}
