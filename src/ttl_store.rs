//! String-keyed map with per-entry TTL.
//!
//! Thin wrapper over a moka future cache: each entry carries its own expiry,
//! and removal notifications are split into the two hooks callers care about
//! (wall-clock expiry vs. overwrite/drain eviction). No persistence.

use std::sync::Arc;
use std::time::{Duration, Instant};

use moka::Expiry;
use moka::future::Cache;
use moka::notification::RemovalCause;

pub type Hook<V> = Arc<dyn Fn(&str, &V) + Send + Sync>;

#[derive(Clone)]
struct Entry<V> {
    value: V,
    ttl: Duration,
}

struct PerEntryTtl;

impl<K, V> Expiry<K, Entry<V>> for PerEntryTtl {
    fn expire_after_create(&self, _key: &K, entry: &Entry<V>, _created_at: Instant) -> Option<Duration> {
        Some(entry.ttl)
    }

    // an overwrite restarts the clock with the new entry's TTL
    fn expire_after_update(
        &self,
        _key: &K,
        entry: &Entry<V>,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }
}

pub struct TtlStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    cache: Cache<String, Entry<V>>,
}

impl<V> TtlStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(max_capacity: u64, on_expire: Hook<V>, on_evict: Hook<V>) -> Self {
        let listener = move |key: Arc<String>, entry: Entry<V>, cause: RemovalCause| match cause {
            RemovalCause::Expired => on_expire(&key, &entry.value),
            RemovalCause::Replaced | RemovalCause::Explicit => on_evict(&key, &entry.value),
            RemovalCause::Size => {}
        };

        Self {
            cache: Cache::builder()
                .max_capacity(max_capacity)
                .expire_after(PerEntryTtl)
                .eviction_listener(listener)
                .build(),
        }
    }

    /// Store `value` under `key` for `ttl`. Overwriting an existing entry
    /// fires the eviction hook for the old value.
    pub async fn set(&self, key: &str, value: V, ttl: Duration) {
        self.cache.insert(key.to_string(), Entry { value, ttl }).await;
    }

    /// Fetch a live entry; expired entries are never returned.
    pub async fn get(&self, key: &str) -> Option<V> {
        self.cache.get(key).await.map(|entry| entry.value)
    }

    /// Remove every entry, firing the eviction hook for each.
    ///
    /// Entries are invalidated one by one; bulk invalidation would skip the
    /// removal notifications.
    pub async fn drain(&self) {
        let keys: Vec<_> = self.cache.iter().map(|(key, _)| key).collect();
        for key in keys {
            self.cache.invalidate(key.as_ref()).await;
        }
        self.cache.run_pending_tasks().await;
    }

    /// Snapshot of the live entries.
    pub fn entries(&self) -> Vec<(String, V)> {
        self.cache
            .iter()
            .map(|(key, entry)| (key.as_ref().clone(), entry.value))
            .collect()
    }

    /// Flush pending housekeeping so hooks and counts are current.
    pub async fn sync(&self) {
        self.cache.run_pending_tasks().await;
    }

    pub async fn len(&self) -> u64 {
        self.cache.run_pending_tasks().await;
        self.cache.entry_count()
    }
}
