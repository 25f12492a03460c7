//! Time-expiring cache of loaded semantic models.
//!
//! Keyed by `(canonical logical path, strategy name)` so the same path
//! loaded through different backends never aliases. Expiration is
//! wall-clock based with no sliding refresh: an entry inserted with TTL
//! `d` is served until `insert_time + d`, then dropped on the next
//! lookup. A save for a key must evict it before returning so the next
//! load observes the write.
//!
//! This is the only shared mutable structure in the persistence core; all
//! access goes through the interior `RwLock`, so concurrent
//! read/insert/evict from multiple callers is safe.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use crate::model::SemanticModel;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub path: String,
    pub strategy: String,
}

impl CacheKey {
    pub fn new(path: &str, strategy: &str) -> Self {
        Self {
            path: path.to_string(),
            strategy: strategy.to_string(),
        }
    }
}

struct CacheEntry {
    model: Arc<SemanticModel>,
    expires_at: Instant,
}

/// In-memory cache of previously loaded models.
pub struct ModelCache {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
}

impl ModelCache {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Return the cached model if present and unexpired. Expired entries
    /// are removed as a side effect.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<SemanticModel>> {
        {
            let entries = self.entries.read().unwrap();
            match entries.get(key) {
                Some(entry) if entry.expires_at > Instant::now() => {
                    return Some(Arc::clone(&entry.model));
                }
                Some(_) => {}
                None => return None,
            }
        }
        // expired: drop it under the write lock
        let mut entries = self.entries.write().unwrap();
        if let Some(entry) = entries.get(key) {
            if entry.expires_at > Instant::now() {
                return Some(Arc::clone(&entry.model));
            }
            entries.remove(key);
        }
        None
    }

    pub fn insert(&self, key: CacheKey, model: Arc<SemanticModel>, ttl: Duration) {
        let mut entries = self.entries.write().unwrap();
        entries.insert(
            key,
            CacheEntry {
                model,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Evict a key, if cached. Called by the repository before a save
    /// returns.
    pub fn invalidate(&self, key: &CacheKey) {
        self.entries.write().unwrap().remove(key);
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().unwrap().is_empty()
    }
}

impl Default for ModelCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(name: &str) -> Arc<SemanticModel> {
        Arc::new(SemanticModel::new(name, "test", None))
    }

    #[test]
    fn test_hit_within_ttl() {
        let cache = ModelCache::new();
        let key = CacheKey::new("/models/shop", "local-disk");
        cache.insert(key.clone(), model("shop"), Duration::from_secs(60));

        let hit = cache.get(&key).unwrap();
        assert_eq!(hit.name, "shop");
    }

    #[test]
    fn test_expired_entry_is_dropped() {
        let cache = ModelCache::new();
        let key = CacheKey::new("/models/shop", "local-disk");
        cache.insert(key.clone(), model("shop"), Duration::from_millis(0));

        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get(&key).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_strategy_name_is_part_of_key() {
        let cache = ModelCache::new();
        cache.insert(
            CacheKey::new("/models/shop", "local-disk"),
            model("shop"),
            Duration::from_secs(60),
        );

        assert!(cache.get(&CacheKey::new("/models/shop", "blob")).is_none());
    }

    #[test]
    fn test_invalidate_evicts() {
        let cache = ModelCache::new();
        let key = CacheKey::new("/models/shop", "local-disk");
        cache.insert(key.clone(), model("shop"), Duration::from_secs(60));

        cache.invalidate(&key);
        assert!(cache.get(&key).is_none());
    }
}
