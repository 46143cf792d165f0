//! Persistent profile cache
//!
//! Profiles are keyed solely by entity ID and never expire. The whole cache
//! is loaded at startup and written back as one JSON document when new
//! entries were added.
//! The in-memory side is a moka map shared by all in-flight profile builds.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use authorlink_core::{LinkError, Profile, Result};
use moka::sync::Cache;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Entity ID -> Profile store with optional durable backing file
#[derive(Clone)]
pub struct ProfileCache {
    cache: Cache<String, Profile>,
    path: Option<PathBuf>,
    dirty: Arc<AtomicBool>,
    flush_lock: Arc<Mutex<()>>,
    stats: Arc<CacheStats>,
}

impl ProfileCache {
    /// Cache without durable storage
    pub fn in_memory() -> Self {
        Self::with_path(None)
    }

    /// Load the cache file at `path`.
    ///
    /// A missing file starts empty. An unreadable or corrupt file is logged and
    /// also starts empty; it is overwritten on the next flush.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let cache = Self::with_path(Some(path.clone()));

        if !path.exists() {
            debug!(path = %path.display(), "No profile cache file, starting empty");
            return cache;
        }

        match read_snapshot(&path) {
            Ok(snapshot) => {
                for (id, profile) in snapshot {
                    cache.cache.insert(id, profile);
                }
                info!(
                    path = %path.display(),
                    entries = cache.len(),
                    "Loaded profile cache"
                );
            }
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "Profile cache unreadable, rebuilding from scratch"
                );
            }
        }
        cache
    }

    fn with_path(path: Option<PathBuf>) -> Self {
        Self {
            cache: Cache::builder().build(),
            path,
            dirty: Arc::new(AtomicBool::new(false)),
            flush_lock: Arc::new(Mutex::new(())),
            stats: Arc::new(CacheStats::default()),
        }
    }

    /// Cached profile for an entity
    pub fn get(&self, entity_id: &str) -> Option<Profile> {
        let result = self.cache.get(entity_id);
        if result.is_some() {
            self.stats.record(CacheEvent::Hit);
        } else {
            self.stats.record(CacheEvent::Miss);
        }
        result
    }

    /// Store a profile; last write wins
    pub fn insert(&self, profile: Profile) {
        self.cache.insert(profile.entity_id.clone(), profile);
        self.dirty.store(true, Ordering::Release);
        self.stats.record(CacheEvent::Write);
    }

    pub fn contains(&self, entity_id: &str) -> bool {
        self.cache.contains_key(entity_id)
    }

    pub fn len(&self) -> usize {
        self.cache.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether entries were added since the last flush
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Write the full cache to its backing file if anything changed.
    ///
    /// Returns whether a file was written. The snapshot is written to a
    /// sibling temp file and renamed into place.
    pub fn flush(&self) -> Result<bool> {
        let Some(path) = &self.path else {
            self.dirty.store(false, Ordering::Release);
            return Ok(false);
        };

        let _guard = self
            .flush_lock
            .lock()
            .map_err(|_| LinkError::Storage("profile cache flush lock poisoned".to_string()))?;

        if !self.dirty.swap(false, Ordering::AcqRel) {
            return Ok(false);
        }

        let snapshot: BTreeMap<String, Profile> = self
            .cache
            .iter()
            .map(|(id, profile)| ((*id).clone(), profile))
            .collect();

        if let Err(e) = write_snapshot(path, &snapshot) {
            self.dirty.store(true, Ordering::Release);
            return Err(e);
        }

        self.stats.record(CacheEvent::Flush);
        debug!(path = %path.display(), entries = snapshot.len(), "Flushed profile cache");
        Ok(true)
    }

    pub fn stats(&self) -> Arc<CacheStats> {
        Arc::clone(&self.stats)
    }
}

impl std::fmt::Debug for ProfileCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileCache")
            .field("path", &self.path)
            .field("entries", &self.len())
            .field("dirty", &self.is_dirty())
            .finish()
    }
}

impl Default for ProfileCache {
    fn default() -> Self {
        Self::in_memory()
    }
}

fn read_snapshot(path: &Path) -> Result<BTreeMap<String, Profile>> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

fn write_snapshot(path: &Path, snapshot: &BTreeMap<String, Profile>) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, serde_json::to_vec(snapshot)?)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[derive(Debug, Clone, Copy)]
enum CacheEvent {
    Hit,
    Miss,
    Write,
    Flush,
}

/// Lookup and persistence counters, shared by every clone of a cache
#[derive(Debug, Default)]
pub struct CacheStats {
    counters: [AtomicU64; 4],
}

impl CacheStats {
    fn record(&self, event: CacheEvent) {
        self.counters[event as usize].fetch_add(1, Ordering::Relaxed);
    }

    fn count(&self, event: CacheEvent) -> u64 {
        self.counters[event as usize].load(Ordering::Relaxed)
    }

    pub fn hits(&self) -> u64 {
        self.count(CacheEvent::Hit)
    }

    pub fn misses(&self) -> u64 {
        self.count(CacheEvent::Miss)
    }

    pub fn writes(&self) -> u64 {
        self.count(CacheEvent::Write)
    }

    pub fn flushes(&self) -> u64 {
        self.count(CacheEvent::Flush)
    }

    /// Share of lookups answered from the cache; 0.0 before any lookup
    pub fn hit_rate(&self) -> f64 {
        let (hits, misses) = (self.hits(), self.misses());
        match hits + misses {
            0 => 0.0,
            lookups => hits as f64 / lookups as f64,
        }
    }

    pub fn report(&self) -> CacheStatsReport {
        CacheStatsReport {
            hits: self.hits(),
            misses: self.misses(),
            writes: self.writes(),
            flushes: self.flushes(),
            hit_rate: self.hit_rate(),
        }
    }
}

/// Point-in-time copy of [`CacheStats`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CacheStatsReport {
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub flushes: u64,
    pub hit_rate: f64,
}
