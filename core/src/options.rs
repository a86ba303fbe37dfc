//! Per-call option structs for the façade's operations, distinct from
//! `vex_types`'s persistent `DbConfig` tables — these are the `options?`
//! bags spec §6 attaches to individual calls.
use vex_types::{CreatorService, NounId, NounKind, Vector, VerbDirection, VerbId, VerbKind};

#[derive(Debug, Clone)]
pub enum AddInput {
    Vector(Vector),
    Payload(serde_json::Value),
}

#[derive(Debug, Clone, Default)]
pub struct AddOptions {
    pub force_embed: bool,
    pub id: Option<NounId>,
    pub creator_service: Option<CreatorService>,
    pub kind: Option<NounKind>,
}

#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    pub batch_size: Option<usize>,
    pub concurrency: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    Local,
    Remote,
    Combined,
}

impl Default for SearchMode {
    fn default() -> Self {
        Self::Local
    }
}

#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub force_embed: bool,
    pub noun_kinds: Option<Vec<NounKind>>,
    pub include_verbs: bool,
    pub search_mode: SearchMode,
    pub search_verbs: bool,
    pub verb_kinds: Option<Vec<VerbKind>>,
    pub search_connected_nouns: bool,
    pub verb_direction: Option<VerbDirection>,
    pub creator_service_filter: Option<CreatorService>,
}

#[derive(Debug, Clone, Default)]
pub struct FindSimilarOptions {
    pub k: usize,
    pub relation_type: Option<VerbKind>,
    pub verb_direction: Option<VerbDirection>,
}

#[derive(Debug, Clone, Default)]
pub struct AddVerbOptions {
    pub kind: Option<VerbKind>,
    pub weight: Option<f32>,
    pub metadata: Option<serde_json::Value>,
    pub auto_create_missing_nouns: bool,
    pub missing_noun_metadata: Option<serde_json::Value>,
    pub creator_service: Option<CreatorService>,
}

#[derive(Debug, Clone, Default)]
pub struct DeleteOptions {
    pub creator_service: Option<CreatorService>,
}

#[derive(Debug, Clone)]
pub struct SearchResult {
    pub id: NounId,
    pub score: f32,
    pub vector: Vector,
    pub metadata: Option<serde_json::Value>,
    /// Ids of verbs touching this noun, populated only when
    /// `SearchOptions::include_verbs` is set.
    pub connected_verbs: Vec<VerbId>,
}

#[derive(Debug, Clone)]
pub struct NounView {
    pub id: NounId,
    pub vector: Vector,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct StatusView {
    pub backend_kind: &'static str,
    pub used_bytes: u64,
    pub quota_bytes: Option<u64>,
    pub details: serde_json::Value,
}

#[derive(Debug, Clone, Default)]
pub struct GetStatisticsOptions {
    pub creator_service_filter: Option<CreatorService>,
}
