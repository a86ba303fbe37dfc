//! Binds the distance kernels, HNSW index, partitioning, cache, storage,
//! graph and statistics crates into the single query façade spec §6
//! describes: one fallible async method per operation, input validation up
//! front, and the read-only/write-only mode gate applied uniformly.
pub mod backup;
pub mod embedding;
pub mod generator;
pub mod ops;
pub mod options;
pub mod realtime;
pub mod search;
pub mod verbs;

use std::collections::hash_map::DefaultHasher;
use std::fmt::Display;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock as SyncRwLock;
use tokio::sync::RwLock;

use vex_cache::prefetch::PrefetchWorker;
use vex_cache::CacheManager;
use vex_graph::VerbStore;
use vex_partition::PartitionedIndex;
use vex_similarity::hnsw::HNSWConfig;
use vex_similarity::optimized::OptimizedIndex;
use vex_similarity::LinearAlgorithm;
use vex_stats::StatsCollector;
use vex_storage::StorageBackend;
use vex_task_manager::TaskManager;
use vex_types::{DbConfig, DistanceKernel, Error, FacadeMode, NounId, Result, Vector, VerbId};

use embedding::EmbeddingFn;

pub(crate) fn hash_id(id: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    id.hash(&mut hasher);
    hasher.finish()
}

fn linear_algorithm_from(kernel: DistanceKernel) -> LinearAlgorithm {
    match kernel {
        DistanceKernel::Euclidean => LinearAlgorithm::EuclideanDistance,
        DistanceKernel::Cosine => LinearAlgorithm::CosineSimilarity,
        DistanceKernel::DotProduct => LinearAlgorithm::DotProductSimilarity,
        DistanceKernel::Manhattan => LinearAlgorithm::ManhattanDistance,
    }
}

fn hnsw_config_from(config: &DbConfig) -> HNSWConfig {
    HNSWConfig {
        ef_construction: config.hnsw.ef_construction,
        maximum_connections: config.hnsw.m,
        maximum_connections_zero: config.hnsw.m_max0(),
        extend_candidates: config.hnsw.extend_candidates,
        keep_pruned_connections: config.hnsw.keep_pruned_connections,
    }
}

/// Either a flat optimized index or one split across partitions. Which one
/// backs a given `Database` is fixed at construction time by
/// `optimization.enable_partitioning` — per spec §9, exactly one variant is
/// active for the lifetime of an index.
pub(crate) enum IndexBackend<K: Hash + Eq + Clone + Send + Sync + Display + 'static> {
    Flat(OptimizedIndex<LinearAlgorithm, K>),
    Partitioned(PartitionedIndex<LinearAlgorithm, K>),
}

impl<K: Hash + Eq + Clone + Send + Sync + Display + 'static> IndexBackend<K> {
    fn new(config: &DbConfig, ef_search: usize, centroids: Vec<Vector>) -> Self {
        let hnsw_config = hnsw_config_from(config);
        let algorithm = linear_algorithm_from(config.hnsw.distance_kernel);
        if config.optimization.enable_partitioning {
            Self::Partitioned(PartitionedIndex::new(
                config.partition.clone(),
                hnsw_config,
                algorithm,
                centroids,
            ))
        } else {
            Self::Flat(OptimizedIndex::new(hnsw_config, algorithm, ef_search))
        }
    }

    fn insert(&self, key: K, vector: Vector) -> Result<()> {
        match self {
            Self::Flat(index) => index.insert(key, vector).map_err(Into::into),
            Self::Partitioned(index) => {
                let hash = hash_id(&key.to_string());
                index.insert(key, hash, vector)
            }
        }
    }

    fn delete(&self, key: &K) -> bool {
        match self {
            Self::Flat(index) => index.delete(key),
            Self::Partitioned(index) => index.delete(key),
        }
    }

    fn len(&self) -> usize {
        match self {
            Self::Flat(index) => index.len(),
            Self::Partitioned(index) => index.len(),
        }
    }

    async fn search(
        &self,
        query: &Vector,
        k: usize,
        coordinator_config: &vex_types::CoordinatorConfig,
    ) -> Result<Vec<(K, f32)>> {
        match self {
            Self::Flat(index) => index.knn_search(query, k).map_err(Into::into),
            Self::Partitioned(index) => index.search(query, k, coordinator_config).await,
        }
    }
}

/// The embeddable database: one façade bound to one storage backend, one
/// noun index, one verb index, a verb adjacency store, caches and counters.
///
/// `noun_index`/`verb_index` are behind `tokio::sync::RwLock` solely so
/// `clear()` can atomically swap in a fresh empty index; every other
/// operation only ever needs a read lock, since the indices themselves are
/// internally lock-free/fine-grained.
pub(crate) struct DatabaseInner<B: StorageBackend + 'static> {
    pub(crate) config: DbConfig,
    pub(crate) storage: Arc<B>,
    pub(crate) cache: CacheManager,
    pub(crate) verb_store: VerbStore,
    pub(crate) noun_index: RwLock<IndexBackend<NounId>>,
    pub(crate) verb_index: RwLock<IndexBackend<VerbId>>,
    pub(crate) stats: StatsCollector,
    pub(crate) tasks: TaskManager,
    pub(crate) embedding: SyncRwLock<Option<Arc<dyn EmbeddingFn>>>,
    pub(crate) realtime_enabled: SyncRwLock<bool>,
    pub(crate) last_poll: SyncRwLock<chrono::DateTime<chrono::Utc>>,
    pub(crate) prefetch_worker: std::sync::Mutex<Option<PrefetchWorker<B>>>,
    /// The dimension every noun vector is validated against. Starts at
    /// `config.dimension` when pinned upfront, otherwise is pinned to the
    /// first successfully inserted vector's dimension and fixed from then on.
    pub(crate) resolved_dimension: OnceLock<usize>,
}

/// Cheap to clone: a `Database` handle is an `Arc` around its shared state,
/// the way the teacher's own server handle is passed into every connection
/// task. Cloning a handle (rather than reaching for `&'static` tricks) is
/// how the realtime poller and any other background task get their own
/// owned reference to the database they watch.
pub struct Database<B: StorageBackend + 'static>(pub(crate) Arc<DatabaseInner<B>>);

impl<B: StorageBackend + 'static> Clone for Database<B> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<B: StorageBackend + 'static> std::ops::Deref for Database<B> {
    type Target = DatabaseInner<B>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<B: StorageBackend + 'static> Database<B> {
    /// Validates the config and wires up the index/cache/stats machinery.
    /// Does not touch storage yet — call [`Database::init`] for that.
    pub fn new(config: DbConfig, storage: B) -> Result<Self> {
        config.validate()?;
        let storage = Arc::new(storage);
        let (cache, prefetch_worker) = CacheManager::new(&config.cache, storage.clone());

        let ef_search = config.hnsw.ef_search;
        let noun_index = IndexBackend::new(&config, ef_search, Vec::new());
        let verb_index = IndexBackend::new(&config, ef_search, Vec::new());
        let realtime_enabled = config.realtime.enabled;
        let resolved_dimension = OnceLock::new();
        if let Some(dimension) = config.dimension {
            let _ = resolved_dimension.set(dimension);
        }

        Ok(Self(Arc::new(DatabaseInner {
            config,
            storage,
            cache,
            verb_store: VerbStore::new(),
            noun_index: RwLock::new(noun_index),
            verb_index: RwLock::new(verb_index),
            stats: StatsCollector::new(),
            tasks: TaskManager::new(),
            embedding: SyncRwLock::new(None),
            realtime_enabled: SyncRwLock::new(realtime_enabled),
            last_poll: SyncRwLock::new(chrono::Utc::now()),
            prefetch_worker: std::sync::Mutex::new(Some(prefetch_worker)),
            resolved_dimension,
        })))
    }

    /// Validates `vector` against the dimension every noun in this database
    /// must share. The first successful call with no dimension pinned yet
    /// fixes it for the lifetime of the database; every later call (and
    /// every call once `config.dimension` was set upfront) is checked
    /// against that fixed value instead.
    pub(crate) fn validate_dimension(&self, vector: &Vector) -> Result<()> {
        let expected = *self.resolved_dimension.get_or_init(|| vector.dimension());
        if vector.dimension() != expected {
            return Err(Error::DimensionMismatch {
                expected,
                got: vector.dimension(),
            });
        }
        Ok(())
    }

    pub fn with_embedding_fn(self, embedding_fn: Arc<dyn EmbeddingFn>) -> Self {
        *self.embedding.write() = Some(embedding_fn);
        self
    }

    pub fn mode(&self) -> FacadeMode {
        self.config.mode()
    }

    pub(crate) fn check_writable(&self) -> Result<()> {
        if matches!(self.mode(), FacadeMode::ReadOnly) {
            return Err(Error::ReadOnly);
        }
        Ok(())
    }

    pub(crate) fn check_readable(&self) -> Result<()> {
        if matches!(self.mode(), FacadeMode::WriteOnly) {
            return Err(Error::WriteOnly);
        }
        Ok(())
    }

    /// Loads storage, then — unless write-only — rebuilds the in-memory
    /// noun/verb indices and verb store from `get_all_nouns`/`get_all_verbs`.
    /// Starts the realtime poller if configured.
    #[tracing::instrument(skip(self))]
    pub async fn init(&self) -> Result<()> {
        self.storage.init().await?;

        if let Some(worker) = self.prefetch_worker.lock().unwrap().take() {
            self.tasks
                .spawn_task_loop(move |guard| worker.run(guard), "prefetch".to_string())
                .await;
        }

        if !matches!(self.mode(), FacadeMode::WriteOnly) {
            self.rebuild_indices().await?;
        }

        if *self.realtime_enabled.read() {
            self.spawn_realtime_poller().await;
        }

        Ok(())
    }

    /// Flushes statistics, cancels background tasks, and waits for them to
    /// finish. The caches themselves need no explicit release: dropping the
    /// `Database` drops the `Arc`s.
    #[tracing::instrument(skip(self))]
    pub async fn shut_down(&self) -> Result<()> {
        self.flush_statistics().await?;
        self.tasks.cancel_all();
        self.tasks.wait().await;
        Ok(())
    }

    pub async fn flush_statistics(&self) -> Result<()> {
        let snapshot = self.stats.snapshot();
        self.storage.flush_statistics(&snapshot).await
    }

    pub async fn get_statistics(
        &self,
        _options: options::GetStatisticsOptions,
    ) -> Result<vex_types::Statistics> {
        let mut snapshot = self.stats.snapshot();
        snapshot.hnsw_index_size = self.noun_index.read().await.len() as u64;
        Ok(snapshot)
    }

    pub async fn status(&self) -> Result<options::StatusView> {
        let status = self.storage.get_status().await?;
        Ok(options::StatusView {
            backend_kind: status.backend_kind,
            used_bytes: status.bytes_used,
            quota_bytes: status.bytes_quota,
            details: status.extra,
        })
    }

    /// Re-populates the in-memory noun/verb indices and verb store by
    /// replaying every record currently in storage. Used by [`Database::init`]
    /// and after a [`Database::restore`](crate::backup) to bring the index
    /// back in sync without requiring a stored HNSW graph representation.
    pub(crate) async fn rebuild_indices(&self) -> Result<()> {
        let noun_index = self.noun_index.read().await;
        for noun in self.storage.get_all_nouns().await? {
            noun_index.insert(noun.id.clone(), noun.vector.clone())?;
            self.cache.nouns.put(noun.id.0.clone(), noun);
        }
        drop(noun_index);

        let verb_index = self.verb_index.read().await;
        for verb in self.storage.get_all_verbs().await? {
            verb_index.insert(verb.id.clone(), verb.vector.clone())?;
            self.verb_store.insert(verb);
        }
        Ok(())
    }

    /// Purges storage and every in-memory index/cache/counter. Forbidden in
    /// read-only mode.
    #[tracing::instrument(skip(self))]
    pub async fn clear(&self) -> Result<()> {
        self.check_writable()?;
        self.storage.clear().await?;
        self.cache.clear();
        self.verb_store.clear();

        let ef_search = self.config.hnsw.ef_search;
        *self.noun_index.write().await = IndexBackend::new(&self.config, ef_search, Vec::new());
        *self.verb_index.write().await = IndexBackend::new(&self.config, ef_search, Vec::new());

        self.stats.clear();
        Ok(())
    }
}
