//! Key layout shared by the filesystem and object-store backends — both
//! address the same logical paths, just against a different root.
use vex_types::{NounId, NounKind, VerbId, VerbKind};

pub fn noun_key(id: &NounId) -> String {
    format!("nouns/{}", id.0)
}

pub fn verb_key(id: &VerbId) -> String {
    format!("verbs/{}", id.0)
}

pub fn metadata_key(id: &str) -> String {
    format!("metadata/{id}")
}

pub fn by_kind_marker(kind: NounKind, id: &NounId) -> String {
    format!("indexes/by_kind/{kind}/{}", id.0)
}

pub fn by_kind_prefix(kind: NounKind) -> String {
    format!("indexes/by_kind/{kind}/")
}

pub fn verbs_by_source_marker(source: &NounId, verb_id: &VerbId) -> String {
    format!("indexes/verbs_by_source/{}/{}", source.0, verb_id.0)
}

pub fn verbs_by_source_prefix(source: &NounId) -> String {
    format!("indexes/verbs_by_source/{}/", source.0)
}

pub fn verbs_by_target_marker(target: &NounId, verb_id: &VerbId) -> String {
    format!("indexes/verbs_by_target/{}/{}", target.0, verb_id.0)
}

pub fn verbs_by_target_prefix(target: &NounId) -> String {
    format!("indexes/verbs_by_target/{}/", target.0)
}

pub fn verbs_by_kind_marker(kind: &VerbKind, verb_id: &VerbId) -> String {
    format!("indexes/verbs_by_kind/{}/{}", kind.0, verb_id.0)
}

pub fn verbs_by_kind_prefix(kind: &VerbKind) -> String {
    format!("indexes/verbs_by_kind/{}/", kind.0)
}

pub const STATS_KEY: &str = "stats";

pub fn changelog_key(timestamp_millis: i64, sequence: u64) -> String {
    format!("changelog/{timestamp_millis}-{sequence}")
}
