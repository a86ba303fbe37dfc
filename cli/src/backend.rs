//! Picks a concrete [`StorageBackend`] from `--backend`, wrapping whichever
//! one gets selected behind a single enum so `main` doesn't need to
//! monomorphize its whole command-dispatch path three times over.
use async_trait::async_trait;
use vex_storage::{
    ChangeLogEntry, FilesystemBackend, MemoryBackend, ObjectStoreBackend, StorageBackend, StorageStatus,
};
use vex_types::{DbConfig, Metadata, Noun, NounId, NounKind, Result, StorageBackendKind, Verb, VerbId, VerbKind};

pub enum AnyBackend {
    Memory(MemoryBackend),
    Filesystem(FilesystemBackend),
    ObjectStore(ObjectStoreBackend),
}

impl AnyBackend {
    pub fn from_config(config: &DbConfig) -> Result<Self> {
        Ok(match config.storage.backend {
            StorageBackendKind::Memory => Self::Memory(MemoryBackend::new()),
            StorageBackendKind::Filesystem => {
                let root = config
                    .storage
                    .root
                    .clone()
                    .ok_or_else(|| vex_types::Error::InvalidInput("--root is required for the filesystem backend".to_string()))?;
                Self::Filesystem(FilesystemBackend::new(root, config.retry.clone()))
            }
            StorageBackendKind::ObjectStore => {
                Self::ObjectStore(ObjectStoreBackend::new(&config.storage.s3, config.retry.clone())?)
            }
        })
    }
}

macro_rules! dispatch {
    ($self:expr, $method:ident $(, $arg:expr)*) => {
        match $self {
            AnyBackend::Memory(b) => b.$method($($arg),*).await,
            AnyBackend::Filesystem(b) => b.$method($($arg),*).await,
            AnyBackend::ObjectStore(b) => b.$method($($arg),*).await,
        }
    };
}

#[async_trait]
impl StorageBackend for AnyBackend {
    async fn init(&self) -> Result<()> {
        dispatch!(self, init)
    }

    async fn save_noun(&self, noun: &Noun) -> Result<()> {
        dispatch!(self, save_noun, noun)
    }

    async fn get_noun(&self, id: &NounId) -> Result<Option<Noun>> {
        dispatch!(self, get_noun, id)
    }

    async fn get_all_nouns(&self) -> Result<Vec<Noun>> {
        dispatch!(self, get_all_nouns)
    }

    async fn get_nouns_by_kind(&self, kind: NounKind) -> Result<Vec<Noun>> {
        dispatch!(self, get_nouns_by_kind, kind)
    }

    async fn delete_noun(&self, id: &NounId) -> Result<bool> {
        dispatch!(self, delete_noun, id)
    }

    async fn save_verb(&self, verb: &Verb) -> Result<()> {
        dispatch!(self, save_verb, verb)
    }

    async fn get_verb(&self, id: &VerbId) -> Result<Option<Verb>> {
        dispatch!(self, get_verb, id)
    }

    async fn get_all_verbs(&self) -> Result<Vec<Verb>> {
        dispatch!(self, get_all_verbs)
    }

    async fn delete_verb(&self, id: &VerbId) -> Result<bool> {
        dispatch!(self, delete_verb, id)
    }

    async fn get_verbs_by_source(&self, source: &NounId) -> Result<Vec<Verb>> {
        dispatch!(self, get_verbs_by_source, source)
    }

    async fn get_verbs_by_target(&self, target: &NounId) -> Result<Vec<Verb>> {
        dispatch!(self, get_verbs_by_target, target)
    }

    async fn get_verbs_by_kind(&self, kind: &VerbKind) -> Result<Vec<Verb>> {
        dispatch!(self, get_verbs_by_kind, kind)
    }

    async fn save_metadata(&self, id: &str, metadata: &Metadata) -> Result<()> {
        dispatch!(self, save_metadata, id, metadata)
    }

    async fn get_metadata(&self, id: &str) -> Result<Option<Metadata>> {
        dispatch!(self, get_metadata, id)
    }

    async fn clear(&self) -> Result<()> {
        dispatch!(self, clear)
    }

    async fn get_status(&self) -> Result<StorageStatus> {
        dispatch!(self, get_status)
    }

    async fn get_changes_since(
        &self,
        timestamp: chrono::DateTime<chrono::Utc>,
        limit: usize,
    ) -> Result<Option<Vec<ChangeLogEntry>>> {
        dispatch!(self, get_changes_since, timestamp, limit)
    }

    async fn append_change(&self, entry: &ChangeLogEntry) -> Result<()> {
        dispatch!(self, append_change, entry)
    }

    async fn flush_statistics(&self, stats: &vex_types::Statistics) -> Result<()> {
        dispatch!(self, flush_statistics, stats)
    }
}
