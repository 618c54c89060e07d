//! Asset Store
//!
//! Concurrent map from normalized path to shared [`AssetEntry`], backed by
//! Moka. Expiry is driven by the sweeper, so the underlying cache is built
//! without any TTL or capacity policy.

use std::sync::Arc;

use moka::ops::compute::{CompResult, Op};
use moka::sync::Cache;
use tracing::{debug, trace};

use crate::asset::AssetEntry;

/// Concurrent key → entry mapping
#[derive(Clone)]
pub struct AssetStore {
    entries: Cache<String, Arc<AssetEntry>>,
}

impl AssetStore {
    /// Create an empty store
    pub fn new() -> Self {
        let entries = Cache::builder().name("asset_cache").build();
        Self { entries }
    }

    /// Insert or replace an entry; concurrent puts on one key are last-write-wins
    pub fn put(&self, key: String, entry: Arc<AssetEntry>) {
        debug!(key = %key, size = entry.raw_bytes().len(), "Stored asset");
        self.entries.insert(key, entry);
    }

    /// Look up an entry
    ///
    /// The returned `Arc` stays valid even if the key is evicted afterwards.
    pub fn lookup(&self, key: &str) -> Option<Arc<AssetEntry>> {
        let entry = self.entries.get(key);
        trace!(key = %key, hit = entry.is_some(), "Store lookup");
        entry
    }

    /// Remove an entry if present
    pub fn delete(&self, key: &str) {
        self.entries.invalidate(key);
        trace!(key = %key, "Deleted asset");
    }

    /// Remove `key` only while it still maps to `expected`
    ///
    /// The check and the removal are atomic for the key, so an entry stored
    /// by a concurrent put survives. Returns whether `expected` was removed.
    pub fn delete_if_same(&self, key: &str, expected: &Arc<AssetEntry>) -> bool {
        let result = self
            .entries
            .entry_by_ref(key)
            .and_compute_with(|current| match current {
                Some(current) if Arc::ptr_eq(current.value(), expected) => Op::Remove,
                _ => Op::Nop,
            });
        let removed = matches!(result, CompResult::Removed(_));
        trace!(key = %key, removed = removed, "Conditional delete");
        removed
    }

    /// Weakly consistent copy of the current entries
    ///
    /// Puts and deletes racing with the scan may or may not be reflected.
    pub fn snapshot(&self) -> Vec<(Arc<String>, Arc<AssetEntry>)> {
        self.entries.iter().collect()
    }

    /// Number of entries visible to a snapshot
    pub fn len(&self) -> usize {
        self.entries.iter().count()
    }
}

impl Default for AssetStore {
    fn default() -> Self {
        Self::new()
    }
}
