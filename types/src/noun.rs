use crate::vector::Vector;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NounId(pub String);

impl NounId {
    pub fn new_uuid() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for NounId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for NounId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for NounId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// Closed enumeration of noun kinds. Deliberately closed (unlike `VerbKind`,
/// which accepts arbitrary strings) — this asymmetry is in the upstream
/// design and is preserved here rather than "fixed" (see Open Questions in
/// DESIGN.md).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, strum::Display,
)]
pub enum NounKind {
    Person,
    Location,
    Thing,
    Event,
    Concept,
    Content,
    Collection,
    Organization,
    Document,
}

/// Opaque metadata blob. The index core never interprets this; callers may
/// layer a typed view on top via `serde_json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metadata(pub serde_json::Value);

impl Metadata {
    pub fn empty() -> Self {
        Self(serde_json::Value::Null)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_null()
    }
}

/// Opaque string identifying the logical writer of a mutation, used for
/// statistics bucketing and optional filtering.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CreatorService(pub String);

impl Default for CreatorService {
    fn default() -> Self {
        Self("unknown".to_string())
    }
}

impl fmt::Display for CreatorService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CreatorService {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// An indexed item: identifier, vector, level within the hierarchical graph,
/// per-level adjacency, and optional metadata/kind tag.
///
/// `level`/`neighbours` are populated by the ANN index at insertion time and
/// are otherwise opaque to the façade; they are carried on `Noun` itself (as
/// opposed to a side table) so backup/restore can round-trip the graph
/// structure verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Noun {
    pub id: NounId,
    pub vector: Vector,
    pub level: u8,
    pub neighbours: std::collections::BTreeMap<u16, std::collections::BTreeSet<NounId>>,
    pub kind: Option<NounKind>,
    pub metadata: Option<Metadata>,
    pub created_by: CreatorService,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl Noun {
    pub fn new(id: NounId, vector: Vector, created_by: CreatorService) -> Self {
        let now = chrono::Utc::now();
        Self {
            id,
            vector,
            level: 0,
            neighbours: Default::default(),
            kind: None,
            metadata: None,
            created_by,
            created_at: now,
            updated_at: now,
        }
    }
}
