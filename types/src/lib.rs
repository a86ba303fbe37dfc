pub mod changelog;
pub mod config;
pub mod error;
pub mod noun;
pub mod vector;
pub mod verb;

pub use changelog::{ChangeOp, ChangeRecord, ServiceCounters, Statistics};
pub use config::{
    CacheConfig, CoordinatorConfig, DbConfig, DistanceKernel, FacadeMode, HnswConfig,
    OptimizationConfig, PartitionConfig, PartitionStrategy, PrefetchStrategy, RealtimeConfig,
    RetryConfig, S3Config, SearchStrategy, StorageBackendKind, StorageConfig, TimeoutConfig,
};
pub use error::{Error, Result};
pub use noun::{CreatorService, Metadata, Noun, NounId, NounKind};
pub use vector::Vector;
pub use verb::{Verb, VerbDirection, VerbId, VerbKind};
