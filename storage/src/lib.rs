//! Storage backends behind one contract: `MemoryBackend` (in-process,
//! volatile), `FilesystemBackend` (one file per entity under a typed
//! directory layout), and `ObjectStoreBackend` (S3-compatible, same layout as
//! keys). Every backend's fallible operations route through [`retry`] so
//! transient failures get exponential backoff without each backend
//! reimplementing it.

pub mod filesystem;
pub mod keys;
pub mod memory;
pub mod objectstore;
pub mod retry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use vex_types::{Metadata, Noun, NounId, NounKind, Result, Verb, VerbId, VerbKind};

/// A single `{op, entity_kind, id, timestamp}` entry, the unit the change
/// log and realtime-update tailer both operate on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeLogEntry {
    pub op: vex_types::ChangeOp,
    pub entity_kind: String,
    pub id: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Reported by `get_status`; `bytes_quota` is `None` when the backend has no
/// fixed capacity to report (memory, most object stores).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageStatus {
    pub backend_kind: &'static str,
    pub bytes_used: u64,
    pub bytes_quota: Option<u64>,
    pub extra: serde_json::Value,
}

/// The shared storage contract. Not-found is not an error for `get_*`
/// methods (they return `None`); it is an error only where the operation's
/// contract requires the entity to already exist.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn init(&self) -> Result<()>;

    async fn save_noun(&self, noun: &Noun) -> Result<()>;
    async fn get_noun(&self, id: &NounId) -> Result<Option<Noun>>;
    async fn get_all_nouns(&self) -> Result<Vec<Noun>>;
    async fn get_nouns_by_kind(&self, kind: NounKind) -> Result<Vec<Noun>>;
    async fn delete_noun(&self, id: &NounId) -> Result<bool>;

    async fn save_verb(&self, verb: &Verb) -> Result<()>;
    async fn get_verb(&self, id: &VerbId) -> Result<Option<Verb>>;
    async fn get_all_verbs(&self) -> Result<Vec<Verb>>;
    async fn delete_verb(&self, id: &VerbId) -> Result<bool>;
    async fn get_verbs_by_source(&self, source: &NounId) -> Result<Vec<Verb>>;
    async fn get_verbs_by_target(&self, target: &NounId) -> Result<Vec<Verb>>;
    async fn get_verbs_by_kind(&self, kind: &VerbKind) -> Result<Vec<Verb>>;

    async fn save_metadata(&self, id: &str, metadata: &Metadata) -> Result<()>;
    async fn get_metadata(&self, id: &str) -> Result<Option<Metadata>>;

    async fn clear(&self) -> Result<()>;
    async fn get_status(&self) -> Result<StorageStatus>;

    /// Not every backend can support replication tailing; `None` signals
    /// "falls back to full rescan" to the realtime-update loop.
    async fn get_changes_since(
        &self,
        _timestamp: chrono::DateTime<chrono::Utc>,
        _limit: usize,
    ) -> Result<Option<Vec<ChangeLogEntry>>> {
        Ok(None)
    }

    async fn append_change(&self, _entry: &ChangeLogEntry) -> Result<()> {
        Ok(())
    }

    async fn flush_statistics(&self, _stats: &vex_types::Statistics) -> Result<()> {
        Ok(())
    }
}

pub use filesystem::FilesystemBackend;
pub use memory::MemoryBackend;
pub use objectstore::ObjectStoreBackend;
