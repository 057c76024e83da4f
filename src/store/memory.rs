use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

/// A stored value together with the window during which it counts as fresh.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub stored_at: Instant,
    pub ttl: Duration,
}

impl<V> CacheEntry<V> {
    pub fn age(&self) -> Duration {
        self.stored_at.elapsed()
    }

    pub fn is_fresh(&self) -> bool {
        self.age() <= self.ttl
    }
}

/// In-memory store with a ttl per key and two read modes.
///
/// Expired entries are never dropped on read: `get_fresh` skips them while
/// `get_any` keeps serving them until they are overwritten or cleared.
pub struct CacheStore<K, V>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    inner: Mutex<HashMap<K, CacheEntry<V>>>,
}

impl<K, V> CacheStore<K, V>
where
    K: Eq + Hash + Send + Sync + Debug,
    V: Clone + Send + Sync,
{
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    pub async fn set(&self, key: K, value: V, ttl: Duration) {
        let entry = CacheEntry {
            value,
            stored_at: Instant::now(),
            ttl,
        };

        let mut cache = self.inner.lock().await;
        debug!("Cache PUT for key: {:?} (ttl {:?})", key, ttl);
        cache.insert(key, entry);
    }

    pub async fn get_fresh(&self, key: &K) -> Option<V> {
        let cache = self.inner.lock().await;
        match cache.get(key) {
            Some(entry) if entry.is_fresh() => {
                debug!("Cache HIT for key: {:?}", key);
                Some(entry.value.clone())
            }
            Some(_) => {
                debug!("Cache entry expired for key: {:?}", key);
                None
            }
            None => {
                debug!("Cache MISS for key: {:?}", key);
                None
            }
        }
    }

    /// Returns the value regardless of age, along with that age.
    pub async fn get_any(&self, key: &K) -> Option<(V, Duration)> {
        let cache = self.inner.lock().await;
        cache.get(key).map(|entry| (entry.value.clone(), entry.age()))
    }

    /// Removes `key`, or every entry when `key` is `None`.
    pub async fn clear(&self, key: Option<&K>) {
        let mut cache = self.inner.lock().await;
        match key {
            Some(key) => {
                cache.remove(key);
                debug!("Cache REMOVE for key: {:?}", key);
            }
            None => {
                cache.clear();
                debug!("Cache CLEAR");
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }
}

impl<K, V> Default for CacheStore<K, V>
where
    K: Eq + Hash + Send + Sync + Debug,
    V: Clone + Send + Sync,
{
    fn default() -> Self {
        Self::new()
    }
}
