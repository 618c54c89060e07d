//! Asset Cache
//!
//! Root object tying together the store, the loader and the sweep schedule.
//! Lookups are cache-first: a hit never touches the filesystem, a miss loads
//! the file, stores the new entry and returns it.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use arc_swap::ArcSwap;
use tracing::{debug, info, trace};

use super::store::AssetStore;
use super::sweeper::Sweeper;
use crate::asset::{load_asset, AssetEntry, AssetError, Compressible, GuessMime, LoadOptions, MimeResolver};

/// Construction parameters for [`AssetCache`]
#[derive(Clone)]
pub struct CacheOptions {
    pub root: PathBuf,
    pub ttl: Duration,
    pub sweep_interval: Duration,
    pub compressible: Compressible,
    pub mime: Arc<dyn MimeResolver>,
}

impl CacheOptions {
    /// Options with the default allow-list and `mime_guess` content types
    pub fn new(root: impl Into<PathBuf>, ttl: Duration, sweep_interval: Duration) -> Self {
        Self {
            root: root.into(),
            ttl,
            sweep_interval,
            compressible: Compressible::default(),
            mime: Arc::new(GuessMime),
        }
    }

    pub fn with_compressible(mut self, compressible: Compressible) -> Self {
        self.compressible = compressible;
        self
    }
}

/// Point-in-time cache counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub sweeping: bool,
}

/// State shared with the sweeper task
pub(crate) struct Shared {
    pub(crate) ttl: Duration,
    pub(crate) store: ArcSwap<AssetStore>,
    root: PathBuf,
    compressible: ArcSwap<Compressible>,
    mime: Arc<dyn MimeResolver>,
    hits: AtomicU64,
    misses: AtomicU64,
}

/// In-memory, time-expiring cache of files under a root directory
pub struct AssetCache {
    shared: Arc<Shared>,
    sweeper: Mutex<Option<Sweeper>>,
    interval: Mutex<Duration>,
}

impl AssetCache {
    /// Create a cache and start its sweep schedule
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    /// `NotFound` if the root directory cannot be resolved.
    pub fn new(options: CacheOptions) -> Result<Self, AssetError> {
        let root = options
            .root
            .canonicalize()
            .map_err(|_| AssetError::NotFound(options.root.clone()))?;

        let shared = Arc::new(Shared {
            ttl: options.ttl,
            store: ArcSwap::from_pointee(AssetStore::new()),
            root,
            compressible: ArcSwap::from_pointee(options.compressible),
            mime: options.mime,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        });

        let sweeper = Sweeper::spawn(Arc::clone(&shared), options.sweep_interval);

        info!(
            root = %shared.root.display(),
            ttl_secs = options.ttl.as_secs_f64(),
            interval_secs = options.sweep_interval.as_secs_f64(),
            "Asset cache initialized"
        );

        Ok(Self {
            shared,
            sweeper: Mutex::new(Some(sweeper)),
            interval: Mutex::new(options.sweep_interval),
        })
    }

    /// Absolute root all request paths are resolved against
    pub fn root(&self) -> &Path {
        &self.shared.root
    }

    pub fn ttl(&self) -> Duration {
        self.shared.ttl
    }

    pub fn interval(&self) -> Duration {
        *lock(&self.interval)
    }

    /// Join a request path onto the root
    ///
    /// `.` and `..` are resolved lexically and can never climb above the root.
    pub fn resolve(&self, request_path: &str) -> PathBuf {
        let normalized = normalize_request_path(request_path);
        let relative = normalized.trim_start_matches('/');
        if relative.is_empty() {
            self.shared.root.clone()
        } else {
            self.shared.root.join(relative)
        }
    }

    fn key(&self, request_path: &str) -> (PathBuf, String) {
        let path = self.resolve(request_path);
        let key = path.to_string_lossy().into_owned();
        (path, key)
    }

    /// Fetch an asset, loading it on a miss
    pub fn get(&self, request_path: &str) -> Result<Arc<AssetEntry>, AssetError> {
        let (_, key) = self.key(request_path);

        if let Some(entry) = self.shared.store.load().lookup(&key) {
            self.shared.hits.fetch_add(1, Ordering::Relaxed);
            trace!(key = %key, "Asset cache HIT");
            return Ok(entry);
        }

        self.shared.misses.fetch_add(1, Ordering::Relaxed);
        trace!(key = %key, "Asset cache MISS");
        self.generate(request_path)
    }

    /// Load an asset from disk and store it, replacing any cached entry
    ///
    /// The entry is stored under the key of the requested path, so a
    /// directory request is cached under the directory itself. Nothing is
    /// stored when loading fails.
    pub fn generate(&self, request_path: &str) -> Result<Arc<AssetEntry>, AssetError> {
        let (path, key) = self.key(request_path);

        let compressible = self.shared.compressible.load();
        let entry = load_asset(
            &path,
            LoadOptions {
                compressible: &compressible,
                mime: self.shared.mime.as_ref(),
            },
        )?;

        let entry = Arc::new(entry);
        self.shared.store.load().put(key, Arc::clone(&entry));
        Ok(entry)
    }

    /// Drop the cached entry for a path; the file itself is untouched
    pub fn remove(&self, request_path: &str) {
        let (_, key) = self.key(request_path);
        self.shared.store.load().delete(&key);
        debug!(key = %key, "Removed asset from cache");
    }

    /// Restart the sweep schedule with a new interval
    ///
    /// The old schedule is stopped before the new one starts. Must be called
    /// from within a tokio runtime.
    pub fn set_interval(&self, interval: Duration) {
        let mut sweeper = lock(&self.sweeper);
        if let Some(old) = sweeper.take() {
            old.stop();
        }
        *lock(&self.interval) = interval;
        *sweeper = Some(Sweeper::spawn(Arc::clone(&self.shared), interval));
    }

    /// Replace the compressible-extension allow-list
    ///
    /// Applies to entries built from now on; cached entries keep the
    /// representation they were built with.
    pub fn set_compressible(&self, compressible: Compressible) {
        self.shared.compressible.store(Arc::new(compressible));
    }

    pub fn compressible(&self) -> Arc<Compressible> {
        self.shared.compressible.load_full()
    }

    /// Stop the sweep schedule and drop every cached entry
    ///
    /// Callers still holding entries keep valid references. The cache stays
    /// usable; lookups simply start from an empty store.
    pub fn close(&self) {
        if let Some(sweeper) = lock(&self.sweeper).take() {
            sweeper.stop();
        }
        self.shared.store.store(Arc::new(AssetStore::new()));
        info!(root = %self.shared.root.display(), "Asset cache closed");
    }

    pub fn is_sweeping(&self) -> bool {
        lock(&self.sweeper)
            .as_ref()
            .is_some_and(Sweeper::is_running)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.shared.hits.load(Ordering::Relaxed),
            misses: self.shared.misses.load(Ordering::Relaxed),
            entries: self.shared.store.load().len(),
            sweeping: self.is_sweeping(),
        }
    }

    /// Log current cache metrics
    pub fn log_metrics(&self) {
        let stats = self.stats();
        let total = stats.hits + stats.misses;
        let hit_rate = if total > 0 {
            (stats.hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };

        debug!(
            hits = stats.hits,
            misses = stats.misses,
            hit_rate = format!("{:.1}%", hit_rate),
            entries = stats.entries,
            "Cache metrics"
        );
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Lexically clean an absolute URL-style path
///
/// Empty and `.` segments are dropped; `..` removes the previous segment
/// and is ignored at the top.
pub fn normalize_request_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    format!("/{}", segments.join("/"))
}
