//! Injected statistics cache with a time-to-live.

use chrono::{DateTime, Duration, Utc};
use mockable::Clock;
use std::collections::HashMap;
use std::hash::{BuildHasher, Hash, RandomState};
use std::sync::{Arc, RwLock};

/// Key-value cache for derived statistics.
///
/// Implementations may drop entries at any time; callers recompute on a
/// miss.
pub trait StatsCache<K, V>: Send + Sync {
    /// Returns a fresh entry for `key`.
    fn get(&self, key: &K) -> Option<V>;

    /// Stores `value` under `key`.
    fn insert(&self, key: K, value: V);

    /// Drops the entry for `key`.
    fn invalidate(&self, key: &K);
}

/// In-process cache whose entries expire after a fixed time-to-live.
#[derive(Debug)]
pub struct TtlStatsCache<K, V, C, S = RandomState> {
    ttl: Duration,
    clock: Arc<C>,
    entries: RwLock<HashMap<K, (DateTime<Utc>, V), S>>,
}

impl<K, V, C> TtlStatsCache<K, V, C>
where
    K: Eq + Hash,
{
    /// Creates an empty cache.
    #[must_use]
    pub fn new(ttl: Duration, clock: Arc<C>) -> Self {
        Self {
            ttl,
            clock,
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V, C, S> StatsCache<K, V> for TtlStatsCache<K, V, C, S>
where
    K: Eq + Hash + Send + Sync,
    V: Clone + Send + Sync,
    C: Clock + Send + Sync,
    S: BuildHasher + Send + Sync,
{
    fn get(&self, key: &K) -> Option<V> {
        let entries = self.entries.read().ok()?;
        let (stored_at, value) = entries.get(key)?;
        (self.clock.utc() - *stored_at < self.ttl).then(|| value.clone())
    }

    fn insert(&self, key: K, value: V) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(key, (self.clock.utc(), value));
        }
    }

    fn invalidate(&self, key: &K) {
        if let Ok(mut entries) = self.entries.write() {
            entries.remove(key);
        }
    }
}
