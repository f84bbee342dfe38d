//! Keyed in-process caches with explicit invalidation.

use std::{fmt, hash::Hash, num::NonZeroUsize};

use lru::LruCache;
use tokio::sync::Mutex;

/// Default number of entries kept per cache.
pub const DEFAULT_CACHE_CAPACITY: NonZeroUsize = match NonZeroUsize::new(1_024) {
    Some(capacity) => capacity,
    None => NonZeroUsize::MIN,
};

/// Token proving that a value was loaded after the last invalidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheGeneration(u64);

struct Entries<K, V> {
    values: LruCache<K, V>,
    generation: u64,
}

/// Bounded LRU cache whose entries are replaced or removed whole.
///
/// Writers that change the backing data call [`KeyedCache::invalidate`].
/// Readers that miss take a [`CacheGeneration`] before loading and hand it
/// back to [`KeyedCache::insert`], which drops the value if an invalidation
/// happened in between.
pub struct KeyedCache<K, V> {
    name: &'static str,
    entries: Mutex<Entries<K, V>>,
}

impl<K, V> KeyedCache<K, V>
where
    K: Hash + Eq,
    V: Clone,
{
    #[must_use]
    pub fn new(name: &'static str, capacity: NonZeroUsize) -> Self {
        Self {
            name,
            entries: Mutex::new(Entries {
                values: LruCache::new(capacity),
                generation: 0,
            }),
        }
    }

    pub async fn get(&self, key: &K) -> Option<V> {
        self.entries.lock().await.values.get(key).cloned()
    }

    /// Current generation, to be taken before loading a value for insertion.
    pub async fn generation(&self) -> CacheGeneration {
        CacheGeneration(self.entries.lock().await.generation)
    }

    /// Store `value` unless the cache was invalidated after `generation`.
    ///
    /// Returns whether the value was stored.
    pub async fn insert(&self, key: K, value: V, generation: CacheGeneration) -> bool {
        let mut entries = self.entries.lock().await;

        if entries.generation != generation.0 {
            tracing::debug!(cache = self.name, "discarding value loaded before invalidation");
            return false;
        }

        entries.values.put(key, value);

        true
    }

    pub async fn invalidate(&self, key: &K) {
        let mut entries = self.entries.lock().await;

        entries.generation = entries.generation.wrapping_add(1);
        entries.values.pop(key);
    }

    pub async fn clear(&self) {
        let mut entries = self.entries.lock().await;

        entries.generation = entries.generation.wrapping_add(1);
        entries.values.clear();
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.values.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl<K, V> fmt::Debug for KeyedCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedCache")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
