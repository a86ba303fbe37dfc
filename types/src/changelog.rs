use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The kind of mutation a change record describes, mirroring the operations
/// exposed at the facade boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
pub enum ChangeOp {
    AddNoun,
    UpdateMetadata,
    DeleteNoun,
    AddVerb,
    DeleteVerb,
}

/// A single entry in the append-only change log, attributing a mutation to
/// the creator service that issued it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub op: ChangeOp,
    pub subject_id: String,
    pub created_by: String,
    pub at: chrono::DateTime<chrono::Utc>,
}

impl ChangeRecord {
    pub fn new(op: ChangeOp, subject_id: impl Into<String>, created_by: impl Into<String>) -> Self {
        Self {
            op,
            subject_id: subject_id.into(),
            created_by: created_by.into(),
            at: chrono::Utc::now(),
        }
    }
}

/// Per-creator-service counters for each mutation kind, flushed periodically
/// by the stats crate's background task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceCounters {
    pub nouns_added: u64,
    pub nouns_updated: u64,
    pub nouns_deleted: u64,
    pub verbs_added: u64,
    pub verbs_deleted: u64,
}

impl ServiceCounters {
    pub fn record(&mut self, op: ChangeOp) {
        match op {
            ChangeOp::AddNoun => self.nouns_added += 1,
            ChangeOp::UpdateMetadata => self.nouns_updated += 1,
            ChangeOp::DeleteNoun => self.nouns_deleted += 1,
            ChangeOp::AddVerb => self.verbs_added += 1,
            ChangeOp::DeleteVerb => self.verbs_deleted += 1,
        }
    }
}

/// Snapshot returned by `getStatistics`: global counts plus the per-service
/// breakdown. `noun_count`, `verb_count`, and `metadata_count` are lifetime
/// totals of add/relate/update events and are monotone over the session
/// (each equals the sum of its per-service sub-counter across
/// `by_service`); `hnsw_index_size` is the current number of nouns actually
/// resident in the index and can shrink on delete.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Statistics {
    pub noun_count: u64,
    pub verb_count: u64,
    pub metadata_count: u64,
    pub hnsw_index_size: u64,
    pub by_service: HashMap<String, ServiceCounters>,
}
