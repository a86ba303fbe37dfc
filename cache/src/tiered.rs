//! Two LRU rings, hot and warm. A miss in both means the storage backend —
//! the source of truth — is consulted; `put` always lands in hot, and hot's
//! own evictions spill into warm rather than vanishing outright.
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;

pub struct TieredCache<V: Clone> {
    hot: Mutex<LruCache<String, V>>,
    warm: Mutex<LruCache<String, V>>,
}

impl<V: Clone> TieredCache<V> {
    pub fn new(hot_capacity: usize, warm_capacity: usize) -> Self {
        Self {
            hot: Mutex::new(LruCache::new(
                NonZeroUsize::new(hot_capacity.max(1)).unwrap(),
            )),
            warm: Mutex::new(LruCache::new(
                NonZeroUsize::new(warm_capacity.max(1)).unwrap(),
            )),
        }
    }

    /// Checks hot, then warm (promoting a warm hit back into hot). Returns
    /// `None` on a full miss — the caller is responsible for falling back to
    /// storage and calling [`Self::put`].
    pub fn get(&self, key: &str) -> Option<V> {
        if let Some(value) = self.hot.lock().get(key).cloned() {
            return Some(value);
        }
        let promoted = self.warm.lock().pop(key);
        if let Some(value) = promoted {
            self.hot.lock().put(key.to_string(), value.clone());
            return Some(value);
        }
        None
    }

    pub fn put(&self, key: String, value: V) {
        if let Some((evicted_key, evicted_value)) = self.hot.lock().push(key, value) {
            self.warm.lock().put(evicted_key, evicted_value);
        }
    }

    pub fn remove(&self, key: &str) {
        self.hot.lock().pop(key);
        self.warm.lock().pop(key);
    }

    pub fn clear(&self) {
        self.hot.lock().clear();
        self.warm.lock().clear();
    }

    pub fn hot_len(&self) -> usize {
        self.hot.lock().len()
    }

    pub fn warm_len(&self) -> usize {
        self.warm.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_hits_hot() {
        let cache: TieredCache<u32> = TieredCache::new(2, 2);
        cache.put("a".to_string(), 1);
        assert_eq!(cache.get("a"), Some(1));
        assert_eq!(cache.hot_len(), 1);
    }

    #[test]
    fn hot_eviction_spills_into_warm() {
        let cache: TieredCache<u32> = TieredCache::new(1, 2);
        cache.put("a".to_string(), 1);
        cache.put("b".to_string(), 2);
        assert_eq!(cache.hot_len(), 1);
        assert_eq!(cache.warm_len(), 1);
        assert_eq!(cache.get("a"), Some(1));
    }

    #[test]
    fn warm_hit_promotes_to_hot() {
        let cache: TieredCache<u32> = TieredCache::new(1, 2);
        cache.put("a".to_string(), 1);
        cache.put("b".to_string(), 2);
        assert_eq!(cache.warm_len(), 1);

        let fetched = cache.get("a");
        assert_eq!(fetched, Some(1));
        assert_eq!(cache.hot_len(), 1);
        assert_eq!(cache.warm_len(), 0);
    }

    #[test]
    fn remove_clears_both_tiers() {
        let cache: TieredCache<u32> = TieredCache::new(2, 2);
        cache.put("a".to_string(), 1);
        cache.remove("a");
        assert_eq!(cache.get("a"), None);
    }
}
