//! In-process backend: lock-free concurrent maps, volatile. Fastest of the
//! three, and the default — matches the teacher's own preference for
//! lock-free maps (`flurry`/`papaya`) on the in-memory hot path.
use crate::{ChangeLogEntry, StorageBackend, StorageStatus};
use async_trait::async_trait;
use parking_lot::Mutex;
use vex_types::{Metadata, Noun, NounId, NounKind, Result, Verb, VerbId, VerbKind};

#[derive(Debug, Default)]
pub struct MemoryBackend {
    nouns: papaya::HashMap<NounId, Noun>,
    verbs: papaya::HashMap<VerbId, Verb>,
    metadata: papaya::HashMap<String, Metadata>,
    changelog: Mutex<Vec<ChangeLogEntry>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    #[tracing::instrument(skip(self, noun))]
    async fn save_noun(&self, noun: &Noun) -> Result<()> {
        self.nouns.pin().insert(noun.id.clone(), noun.clone());
        Ok(())
    }

    async fn get_noun(&self, id: &NounId) -> Result<Option<Noun>> {
        Ok(self.nouns.pin().get(id).cloned())
    }

    async fn get_all_nouns(&self) -> Result<Vec<Noun>> {
        Ok(self.nouns.pin().values().cloned().collect())
    }

    async fn get_nouns_by_kind(&self, kind: NounKind) -> Result<Vec<Noun>> {
        Ok(self
            .nouns
            .pin()
            .values()
            .filter(|n| n.kind == Some(kind))
            .cloned()
            .collect())
    }

    async fn delete_noun(&self, id: &NounId) -> Result<bool> {
        Ok(self.nouns.pin().remove(id).is_some())
    }

    #[tracing::instrument(skip(self, verb))]
    async fn save_verb(&self, verb: &Verb) -> Result<()> {
        self.verbs.pin().insert(verb.id.clone(), verb.clone());
        Ok(())
    }

    async fn get_verb(&self, id: &VerbId) -> Result<Option<Verb>> {
        Ok(self.verbs.pin().get(id).cloned())
    }

    async fn get_all_verbs(&self) -> Result<Vec<Verb>> {
        Ok(self.verbs.pin().values().cloned().collect())
    }

    async fn delete_verb(&self, id: &VerbId) -> Result<bool> {
        Ok(self.verbs.pin().remove(id).is_some())
    }

    async fn get_verbs_by_source(&self, source: &NounId) -> Result<Vec<Verb>> {
        Ok(self
            .verbs
            .pin()
            .values()
            .filter(|v| &v.source == source)
            .cloned()
            .collect())
    }

    async fn get_verbs_by_target(&self, target: &NounId) -> Result<Vec<Verb>> {
        Ok(self
            .verbs
            .pin()
            .values()
            .filter(|v| &v.target == target)
            .cloned()
            .collect())
    }

    async fn get_verbs_by_kind(&self, kind: &VerbKind) -> Result<Vec<Verb>> {
        Ok(self
            .verbs
            .pin()
            .values()
            .filter(|v| &v.kind == kind)
            .cloned()
            .collect())
    }

    async fn save_metadata(&self, id: &str, metadata: &Metadata) -> Result<()> {
        self.metadata
            .pin()
            .insert(id.to_string(), metadata.clone());
        Ok(())
    }

    async fn get_metadata(&self, id: &str) -> Result<Option<Metadata>> {
        Ok(self.metadata.pin().get(id).cloned())
    }

    async fn clear(&self) -> Result<()> {
        self.nouns.pin().clear();
        self.verbs.pin().clear();
        self.metadata.pin().clear();
        self.changelog.lock().clear();
        Ok(())
    }

    async fn get_status(&self) -> Result<StorageStatus> {
        let noun_count = self.nouns.pin().len();
        let verb_count = self.verbs.pin().len();
        Ok(StorageStatus {
            backend_kind: "memory",
            bytes_used: 0,
            bytes_quota: None,
            extra: serde_json::json!({ "noun_count": noun_count, "verb_count": verb_count }),
        })
    }

    async fn get_changes_since(
        &self,
        timestamp: chrono::DateTime<chrono::Utc>,
        limit: usize,
    ) -> Result<Option<Vec<ChangeLogEntry>>> {
        let log = self.changelog.lock();
        Ok(Some(
            log.iter()
                .filter(|e| e.timestamp > timestamp)
                .take(limit)
                .cloned()
                .collect(),
        ))
    }

    async fn append_change(&self, entry: &ChangeLogEntry) -> Result<()> {
        self.changelog.lock().push(entry.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vex_types::{CreatorService, Vector};

    fn noun(id: &str) -> Noun {
        Noun::new(
            NounId::from(id),
            Vector::new(vec![1.0, 2.0]),
            CreatorService::from("test"),
        )
    }

    #[tokio::test]
    async fn save_then_get_roundtrips() {
        let backend = MemoryBackend::new();
        backend.save_noun(&noun("n1")).await.unwrap();
        let fetched = backend.get_noun(&NounId::from("n1")).await.unwrap();
        assert!(fetched.is_some());
    }

    #[tokio::test]
    async fn get_missing_returns_none_not_error() {
        let backend = MemoryBackend::new();
        let fetched = backend.get_noun(&NounId::from("missing")).await.unwrap();
        assert!(fetched.is_none());
    }

    #[tokio::test]
    async fn delete_reports_whether_it_existed() {
        let backend = MemoryBackend::new();
        backend.save_noun(&noun("n1")).await.unwrap();
        assert!(backend.delete_noun(&NounId::from("n1")).await.unwrap());
        assert!(!backend.delete_noun(&NounId::from("n1")).await.unwrap());
    }

    #[tokio::test]
    async fn clear_empties_everything() {
        let backend = MemoryBackend::new();
        backend.save_noun(&noun("n1")).await.unwrap();
        backend.clear().await.unwrap();
        let all = backend.get_all_nouns().await.unwrap();
        assert!(all.is_empty());
    }
}
