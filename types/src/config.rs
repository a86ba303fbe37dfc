use clap::Args;
use serde::{Deserialize, Serialize};

/// Which distance kernel a flat or partitioned index is built against.
/// Mirrors `vex_similarity::LinearAlgorithm` one-for-one; kept as its own
/// type here so `vex_types` doesn't need to depend on `vex_similarity`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum DistanceKernel {
    #[default]
    Euclidean,
    Cosine,
    DotProduct,
    Manhattan,
}

#[derive(Args, Debug, Clone, Serialize, Deserialize)]
pub struct HnswConfig {
    #[arg(long, default_value_t = 16)]
    pub m: usize,
    #[arg(long, default_value_t = 200)]
    pub ef_construction: usize,
    #[arg(long, default_value_t = 50)]
    pub ef_search: usize,
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub extend_candidates: bool,
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub keep_pruned_connections: bool,
    #[arg(long, value_enum, default_value_t = DistanceKernel::Euclidean)]
    pub distance_kernel: DistanceKernel,
}

impl HnswConfig {
    pub fn m_max0(&self) -> usize {
        self.m * 2
    }

    pub fn m_l(&self) -> f64 {
        1.0 / (self.m as f64).ln()
    }
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self {
            m: 16,
            ef_construction: 200,
            ef_search: 50,
            extend_candidates: false,
            keep_pruned_connections: false,
            distance_kernel: DistanceKernel::Euclidean,
        }
    }
}

#[derive(Args, Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationConfig {
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub enable_quantization: bool,
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub enable_partitioning: bool,
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub enable_distributed_search: bool,
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub enable_predictive_cache: bool,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            enable_quantization: false,
            enable_partitioning: false,
            enable_distributed_search: false,
            enable_predictive_cache: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum PartitionStrategy {
    Hash,
    Semantic,
    Hybrid,
}

#[derive(Args, Debug, Clone, Serialize, Deserialize)]
pub struct PartitionConfig {
    #[arg(long, default_value_t = 50_000)]
    pub max_nodes_per_partition: usize,
    #[arg(long, value_enum, default_value_t = PartitionStrategy::Hash)]
    pub strategy: PartitionStrategy,
    #[arg(long, default_value_t = 16)]
    pub semantic_clusters: usize,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            max_nodes_per_partition: 50_000,
            strategy: PartitionStrategy::Hash,
            semantic_clusters: 16,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum SearchStrategy {
    Exhaustive,
    TopT,
    Adaptive,
}

#[derive(Args, Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    #[arg(long, value_enum, default_value_t = SearchStrategy::Adaptive)]
    pub strategy: SearchStrategy,
    /// Fixed partition count for `TopT`; the upper bound for `Adaptive`.
    #[arg(long, default_value_t = 4)]
    pub top_t: usize,
    #[arg(long, default_value_t = 8)]
    pub max_partitions: usize,
    #[arg(long, default_value_t = 8)]
    pub max_concurrent_searches: usize,
    #[arg(long, default_value_t = 1.5)]
    pub overfetch: f64,
    #[arg(long, default_value_t = 50)]
    pub target_latency_ms: u64,
    #[arg(long, default_value_t = 5.0)]
    pub timeout_multiplier: f64,
    /// `Adaptive` stops admitting partitions once the next centroid's
    /// distance exceeds the closest centroid's by this multiple.
    #[arg(long, default_value_t = 3.0)]
    pub adaptive_distance_multiple: f64,
}

impl CoordinatorConfig {
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(
            (self.target_latency_ms as f64 * self.timeout_multiplier) as u64,
        )
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            strategy: SearchStrategy::Adaptive,
            top_t: 4,
            max_partitions: 8,
            max_concurrent_searches: 8,
            overfetch: 1.5,
            target_latency_ms: 50,
            timeout_multiplier: 5.0,
            adaptive_distance_multiple: 3.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum StorageBackendKind {
    Memory,
    Filesystem,
    ObjectStore,
}

#[derive(Args, Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    #[arg(long)]
    pub bucket: Option<String>,
    #[arg(long)]
    pub region: Option<String>,
    #[arg(long)]
    pub endpoint: Option<String>,
    #[arg(long)]
    pub access_key_id: Option<String>,
    #[arg(long)]
    pub secret_access_key: Option<String>,
}

#[derive(Args, Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[arg(long, value_enum, default_value_t = StorageBackendKind::Memory)]
    pub backend: StorageBackendKind,
    #[command(flatten)]
    pub s3: S3Config,
    #[arg(long)]
    pub root: Option<std::path::PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackendKind::Memory,
            s3: S3Config {
                bucket: None,
                region: None,
                endpoint: None,
                access_key_id: None,
                secret_access_key: None,
            },
            root: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum PrefetchStrategy {
    Neighborhood,
    QueryPath,
    Hybrid,
}

#[derive(Args, Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[arg(long, default_value_t = 10_000)]
    pub hot_capacity: usize,
    #[arg(long, default_value_t = 100_000)]
    pub warm_capacity: usize,
    #[arg(long, value_enum, default_value_t = PrefetchStrategy::Hybrid)]
    pub prefetch_strategy: PrefetchStrategy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            hot_capacity: 10_000,
            warm_capacity: 100_000,
            prefetch_strategy: PrefetchStrategy::Hybrid,
        }
    }
}

#[derive(Args, Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[arg(long, default_value_t = 30_000)]
    pub get_ms: u64,
    #[arg(long, default_value_t = 60_000)]
    pub add_ms: u64,
    #[arg(long, default_value_t = 30_000)]
    pub delete_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            get_ms: 30_000,
            add_ms: 60_000,
            delete_ms: 30_000,
        }
    }
}

#[derive(Args, Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[arg(long, default_value_t = 3)]
    pub max_retries: u32,
    #[arg(long, default_value_t = 1_000)]
    pub initial_delay_ms: u64,
    #[arg(long, default_value_t = 10_000)]
    pub max_delay_ms: u64,
    #[arg(long, default_value_t = 2.0)]
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 10_000,
            multiplier: 2.0,
        }
    }
}

#[derive(Args, Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub enabled: bool,
    #[arg(long, default_value_t = 1_000)]
    pub interval_ms: u64,
    #[arg(long, default_value_t = true)]
    pub update_stats: bool,
    #[arg(long, default_value_t = true)]
    pub update_index: bool,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_ms: 1_000,
            update_stats: true,
            update_index: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FacadeMode {
    ReadWrite,
    ReadOnly,
    WriteOnly,
}

impl Default for FacadeMode {
    fn default() -> Self {
        Self::ReadWrite
    }
}

/// Aggregates every configuration table in the external interface. Doubles
/// as both a programmatic config object and a set of CLI flags, the way the
/// teacher's `ServerConfig` flattens `CommandLineConfig` into itself.
#[derive(Args, Debug, Clone, Serialize, Deserialize)]
pub struct DbConfig {
    /// Fixed vector dimension; inferred from the first insert if unset.
    #[arg(long)]
    pub dimension: Option<usize>,

    #[command(flatten)]
    pub hnsw: HnswConfig,
    #[command(flatten)]
    pub optimization: OptimizationConfig,
    #[command(flatten)]
    pub partition: PartitionConfig,
    #[command(flatten)]
    pub coordinator: CoordinatorConfig,
    #[command(flatten)]
    pub storage: StorageConfig,
    #[command(flatten)]
    pub cache: CacheConfig,
    #[command(flatten)]
    pub timeouts: TimeoutConfig,
    #[command(flatten)]
    pub retry: RetryConfig,
    #[command(flatten)]
    pub realtime: RealtimeConfig,

    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub read_only: bool,
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub write_only: bool,

    #[arg(long, default_value = "512")]
    pub default_dimension: usize,

    #[arg(long, default_value_t = 300)]
    pub stats_flush_interval_secs: u64,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            dimension: None,
            hnsw: HnswConfig::default(),
            optimization: OptimizationConfig::default(),
            partition: PartitionConfig::default(),
            coordinator: CoordinatorConfig::default(),
            storage: StorageConfig::default(),
            cache: CacheConfig::default(),
            timeouts: TimeoutConfig::default(),
            retry: RetryConfig::default(),
            realtime: RealtimeConfig::default(),
            read_only: false,
            write_only: false,
            default_dimension: 512,
            stats_flush_interval_secs: 300,
        }
    }
}

impl DbConfig {
    pub fn mode(&self) -> FacadeMode {
        if self.read_only {
            FacadeMode::ReadOnly
        } else if self.write_only {
            FacadeMode::WriteOnly
        } else {
            FacadeMode::ReadWrite
        }
    }

    /// `read_only`/`write_only` are mutually exclusive per spec §6.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.read_only && self.write_only {
            return Err(crate::error::Error::InvalidInput(
                "read_only and write_only are mutually exclusive".to_string(),
            ));
        }
        Ok(())
    }
}
