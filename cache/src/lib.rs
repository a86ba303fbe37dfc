pub mod prefetch;
pub mod tiered;

use prefetch::{PrefetchWorker, Prefetcher};
use std::sync::Arc;
use tiered::TieredCache;
use vex_storage::StorageBackend;
use vex_types::{CacheConfig, Noun, Verb};

/// Bundles the noun and verb tiered caches plus the prefetcher that keeps
/// them warm. Nouns get predictive prefetch (spec's three policies); verbs
/// are cached but not independently prefetched since they're small and
/// usually hydrated alongside their endpoint noun.
pub struct CacheManager {
    pub nouns: Arc<TieredCache<Noun>>,
    pub verbs: Arc<TieredCache<Verb>>,
    prefetcher: Prefetcher,
}

impl CacheManager {
    pub fn new<B: StorageBackend + 'static>(
        config: &CacheConfig,
        backend: Arc<B>,
    ) -> (Self, PrefetchWorker<B>) {
        let nouns = Arc::new(TieredCache::new(config.hot_capacity, config.warm_capacity));
        let verbs = Arc::new(TieredCache::new(config.hot_capacity, config.warm_capacity));
        let (prefetcher, worker) =
            Prefetcher::new(config.prefetch_strategy, nouns.clone(), backend);
        (
            Self {
                nouns,
                verbs,
                prefetcher,
            },
            worker,
        )
    }

    pub fn prefetcher(&self) -> &Prefetcher {
        &self.prefetcher
    }

    pub fn clear(&self) {
        self.nouns.clear();
        self.verbs.clear();
    }
}
