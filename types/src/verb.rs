use crate::noun::{CreatorService, Metadata, NounId};
use crate::vector::Vector;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VerbId(pub String);

impl VerbId {
    pub fn new_uuid() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for VerbId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for VerbId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Unlike `NounKind`, verb kinds are free strings: the source material
/// validates noun kinds against a closed enumeration but accepts arbitrary
/// verb kinds, and this spec preserves that asymmetry rather than guessing
/// at intent (see DESIGN.md Open Questions).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VerbKind(pub String);

impl fmt::Display for VerbKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for VerbKind {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl VerbKind {
    pub const RELATED_TO: &'static str = "RelatedTo";
    pub const OWNS: &'static str = "Owns";
    pub const CREATES: &'static str = "Creates";
    pub const MEMBER_OF: &'static str = "MemberOf";
    pub const REPORTS_TO: &'static str = "ReportsTo";
    pub const MENTORS: &'static str = "Mentors";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerbDirection {
    Out,
    In,
    Both,
}

/// A typed directed edge between two nouns. Verbs are first-class: they
/// carry their own embedding (caller-supplied, metadata-derived, or the
/// component-wise mean of their endpoints) and are themselves indexed in
/// the ANN graph alongside nouns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verb {
    pub id: VerbId,
    pub source: NounId,
    pub target: NounId,
    pub kind: VerbKind,
    pub weight: Option<f32>,
    pub vector: Vector,
    pub metadata: Option<Metadata>,
    pub created_by: CreatorService,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl Verb {
    pub fn new(
        id: VerbId,
        source: NounId,
        target: NounId,
        kind: VerbKind,
        vector: Vector,
        created_by: CreatorService,
    ) -> Self {
        let now = chrono::Utc::now();
        Self {
            id,
            source,
            target,
            kind,
            weight: None,
            vector,
            metadata: None,
            created_by,
            created_at: now,
            updated_at: now,
        }
    }

    /// Component-wise mean of two endpoint vectors, used when a verb has no
    /// caller-supplied or metadata-derived embedding.
    pub fn mean_vector(source: &Vector, target: &Vector) -> Vector {
        let a = source.as_slice();
        let b = target.as_slice();
        let mean: Vec<f32> = a.iter().zip(b.iter()).map(|(x, y)| (x + y) / 2.0).collect();
        Vector::new(mean)
    }
}
