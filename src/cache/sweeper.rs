//! Expiration Sweeper
//!
//! Background tokio task that periodically evicts entries older than the
//! configured TTL. Eviction only removes; the next request for an evicted
//! path takes the miss path and reloads it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info};

use super::asset_cache::Shared;
use super::store::AssetStore;

/// Remove every entry whose age is at least `ttl` as of `now`
///
/// Works on a snapshot, so it never holds a lock across the scan and never
/// waits on a load in progress. An entry replaced after the snapshot was
/// taken is left alone. Returns the number of evicted entries.
pub fn evict_expired(store: &AssetStore, ttl: Duration, now: Instant) -> usize {
    let mut evicted = 0;
    for (key, entry) in store.snapshot() {
        if entry.is_expired(ttl, now) && store.delete_if_same(&key, &entry) {
            evicted += 1;
            debug!(key = %key, age_ms = entry.age(now).as_millis() as u64, "Evicted expired asset");
        }
    }
    evicted
}

/// Handle to a running sweep schedule
pub struct Sweeper {
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl Sweeper {
    /// Start sweeping every `interval`
    ///
    /// The first sweep happens one full interval after the call. Must be
    /// called from within a tokio runtime.
    pub(crate) fn spawn(shared: Arc<Shared>, interval: Duration) -> Self {
        // tokio panics on a zero period
        let interval = interval.max(Duration::from_millis(1));
        let (stop_tx, mut stop_rx) = oneshot::channel();

        let task = tokio::spawn(async move {
            let mut ticker = time::interval_at(time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        let store = shared.store.load();
                        let evicted = evict_expired(&store, shared.ttl, Instant::now());
                        if evicted > 0 {
                            debug!(evicted = evicted, remaining = store.len(), "Sweep complete");
                        }
                    }
                }
            }

            debug!("Sweeper stopped");
        });

        info!(interval_ms = interval.as_millis() as u64, "Sweeper started");

        Self {
            stop: Some(stop_tx),
            task,
        }
    }

    /// Signal the schedule to stop
    ///
    /// A sweep already in progress finishes its scan; no further ticks run.
    pub fn stop(mut self) {
        self.signal_stop();
    }

    /// Whether the background task is still alive
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    fn signal_stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        self.signal_stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::AssetEntry;
    use std::time::SystemTime;

    fn create_test_entry() -> Arc<AssetEntry> {
        Arc::new(AssetEntry::new(
            String::new(),
            b"x".to_vec(),
            "\"x\"".to_string(),
            None,
            SystemTime::now(),
        ))
    }

    #[test]
    fn test_evicts_at_ttl_boundary() {
        let store = AssetStore::new();
        let entry = create_test_entry();
        let t0 = entry.loaded_at();
        store.put("/srv/a".to_string(), entry);

        let ttl = Duration::from_secs(30);

        assert_eq!(evict_expired(&store, ttl, t0), 0);
        assert_eq!(evict_expired(&store, ttl, t0 + Duration::from_secs(29)), 0);
        assert!(store.lookup("/srv/a").is_some());

        assert_eq!(evict_expired(&store, ttl, t0 + ttl), 1);
        assert!(store.lookup("/srv/a").is_none());
    }

    #[test]
    fn test_keeps_fresh_entries() {
        let store = AssetStore::new();
        let old = create_test_entry();
        let t0 = old.loaded_at();
        store.put("/srv/old".to_string(), old);

        std::thread::sleep(Duration::from_millis(20));
        let fresh = create_test_entry();
        let t1 = fresh.loaded_at();
        store.put("/srv/fresh".to_string(), fresh);

        let ttl = t1 - t0;
        assert_eq!(evict_expired(&store, ttl, t1), 1);
        assert!(store.lookup("/srv/old").is_none());
        assert!(store.lookup("/srv/fresh").is_some());
    }

    #[test]
    fn test_stale_snapshot_spares_reloaded_entry() {
        let store = AssetStore::new();
        let expired = create_test_entry();
        let t0 = expired.loaded_at();
        store.put("/srv/a".to_string(), Arc::clone(&expired));
        let snapshot = store.snapshot();

        let reloaded = create_test_entry();
        store.put("/srv/a".to_string(), Arc::clone(&reloaded));

        let ttl = Duration::from_secs(1);
        let late = t0 + Duration::from_secs(5);
        for (key, entry) in snapshot {
            assert!(entry.is_expired(ttl, late));
            assert!(!store.delete_if_same(&key, &entry));
        }

        let current = store.lookup("/srv/a").unwrap();
        assert!(Arc::ptr_eq(&current, &reloaded));
    }
}
