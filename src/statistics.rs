//! Query statistics collection.
//!
//! Every operator and optimizer strategy increments named counters on a
//! [`QueryStatistics`] handle. Handles are cheap to clone and safe to share
//! across the worker pool. A process-scoped registry maps query ids to
//! statistics so the CLI can report on a query after it has run; the
//! registry is capped so long-lived processes don't accumulate entries.
//!
//! Time counters (`time_*`) are recorded in nanoseconds and reported in
//! seconds.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use parking_lot::Mutex;

const REGISTRY_CAP: usize = 50;

#[derive(Default)]
struct StatsInner {
    counters: DashMap<String, AtomicU64>,
    messages: Mutex<Vec<String>>,
}

/// Shared, thread-safe named counters for a single query
#[derive(Clone, Default)]
pub struct QueryStatistics {
    inner: Arc<StatsInner>,
}

impl QueryStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch (or create) the statistics for a query id from the
    /// process-scoped registry.
    pub fn for_query(query_id: &str) -> Self {
        static REGISTRY: OnceLock<DashMap<String, QueryStatistics>> = OnceLock::new();
        let registry = REGISTRY.get_or_init(DashMap::new);
        if let Some(existing) = registry.get(query_id) {
            return existing.clone();
        }
        if registry.len() >= REGISTRY_CAP {
            // drop an arbitrary old entry to bound the registry; the key
            // is cloned out first so no shard lock is held across the
            // removal
            let stale = registry.iter().next().map(|e| e.key().clone());
            if let Some(stale) = stale {
                registry.remove(&stale);
            }
        }
        let stats = QueryStatistics::new();
        registry.insert(query_id.to_string(), stats.clone());
        stats
    }

    /// Add `delta` to the named counter, creating it at zero if absent.
    pub fn increment(&self, name: &str, delta: u64) {
        if let Some(counter) = self.inner.counters.get(name) {
            counter.fetch_add(delta, Ordering::Relaxed);
            return;
        }
        self.inner
            .counters
            .entry(name.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(delta, Ordering::Relaxed);
    }

    /// Record elapsed nanoseconds against a `time_*` counter.
    pub fn add_time(&self, name: &str, nanoseconds: u64) {
        debug_assert!(name.starts_with("time_"));
        self.increment(name, nanoseconds);
    }

    pub fn get(&self, name: &str) -> u64 {
        self.inner
            .counters
            .get(name)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Collect warnings raised while planning or executing.
    pub fn add_message(&self, message: impl Into<String>) {
        self.inner.messages.lock().push(message.into());
    }

    pub fn messages(&self) -> Vec<String> {
        self.inner.messages.lock().clone()
    }

    /// Snapshot all counters, converting `time_*` entries to seconds.
    pub fn as_map(&self) -> BTreeMap<String, f64> {
        let mut snapshot = BTreeMap::new();
        for entry in self.inner.counters.iter() {
            let value = entry.value().load(Ordering::Relaxed);
            if entry.key().starts_with("time_") {
                snapshot.insert(entry.key().clone(), value as f64 / 1e9);
            } else {
                snapshot.insert(entry.key().clone(), value as f64);
            }
        }
        snapshot
    }
}

impl std::fmt::Debug for QueryStatistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryStatistics")
            .field("counters", &self.as_map())
            .finish()
    }
}
