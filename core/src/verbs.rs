//! `addVerb`/`getVerb*`/`deleteVerb`/`relate` — the typed-edge half of the
//! façade.
use vex_storage::StorageBackend;
use vex_types::{ChangeOp, Error, Metadata, Noun, NounId, Result, Verb, VerbId, VerbKind};

use crate::options::AddVerbOptions;
use crate::Database;

impl<B: StorageBackend + 'static> Database<B> {
    /// Creates a typed edge between `source_id` and `target_id`. If an
    /// endpoint is missing, either fails with `NotFound` or — when
    /// `auto_create_missing_nouns` is set — creates a placeholder zero-vector
    /// noun for it first.
    #[tracing::instrument(skip(self, vector))]
    pub async fn add_verb(
        &self,
        source_id: NounId,
        target_id: NounId,
        vector: Option<vex_types::Vector>,
        options: AddVerbOptions,
    ) -> Result<VerbId> {
        self.check_writable()?;

        let source = self.ensure_noun(&source_id, &options).await?;
        let target = self.ensure_noun(&target_id, &options).await?;

        let vector = vector.unwrap_or_else(|| Verb::mean_vector(&source.vector, &target.vector));
        let id = VerbId::new_uuid();
        let kind = options.kind.unwrap_or_else(|| VerbKind::from(VerbKind::RELATED_TO));
        let created_by = options.creator_service.unwrap_or_default();

        let mut verb = Verb::new(id.clone(), source_id, target_id, kind, vector.clone(), created_by.clone());
        verb.weight = options.weight;
        verb.metadata = options.metadata.map(Metadata);

        self.verb_index.read().await.insert(id.clone(), vector)?;
        if let Err(err) = self.storage.save_verb(&verb).await {
            self.verb_index.read().await.delete(&id);
            return Err(err);
        }
        self.verb_store.insert(verb);

        let record = self.stats.record(ChangeOp::AddVerb, id.0.clone(), created_by.0);
        let _ = self
            .storage
            .append_change(&vex_storage::ChangeLogEntry {
                op: record.op,
                entity_kind: "verb".to_string(),
                id: record.subject_id,
                timestamp: record.at,
            })
            .await;

        Ok(id)
    }

    async fn ensure_noun(&self, id: &NounId, options: &AddVerbOptions) -> Result<Noun> {
        if let Some(noun) = self.storage.get_noun(id).await? {
            return Ok(noun);
        }
        if !options.auto_create_missing_nouns {
            return Err(Error::not_found("noun", id.0.clone()));
        }
        tracing::warn!(id = %id, "auto-creating missing noun endpoint for addVerb");
        let dimension = self.resolved_dimension.get().copied().unwrap_or(self.config.default_dimension);
        let vector = vex_types::Vector::new(vec![0.0; dimension]);
        self.validate_dimension(&vector)?;
        let mut noun = Noun::new(id.clone(), vector, options.creator_service.clone().unwrap_or_default());
        noun.metadata = options.missing_noun_metadata.clone().map(Metadata);
        self.noun_index.read().await.insert(id.clone(), noun.vector.clone())?;
        self.storage.save_noun(&noun).await?;
        self.cache.nouns.put(id.0.clone(), noun.clone());
        Ok(noun)
    }

    /// Convenience wrapper over [`Database::add_verb`] for typed-edge
    /// creation without a caller-supplied embedding.
    pub async fn relate(
        &self,
        source: NounId,
        target: NounId,
        kind: VerbKind,
        metadata: Option<serde_json::Value>,
    ) -> Result<VerbId> {
        self.add_verb(
            source,
            target,
            None,
            AddVerbOptions {
                kind: Some(kind),
                metadata,
                ..Default::default()
            },
        )
        .await
    }

    pub async fn get_verb(&self, id: &VerbId) -> Result<Option<Verb>> {
        self.check_readable()?;
        if let Some(verb) = self.verb_store.get(id) {
            return Ok(Some(verb));
        }
        self.storage.get_verb(id).await
    }

    pub async fn get_all_verbs(&self) -> Result<Vec<Verb>> {
        self.check_readable()?;
        Ok(self.verb_store.all())
    }

    pub async fn get_verbs_by_source(&self, source: &NounId) -> Result<Vec<Verb>> {
        self.check_readable()?;
        Ok(self.verb_store.by_source(source))
    }

    pub async fn get_verbs_by_target(&self, target: &NounId) -> Result<Vec<Verb>> {
        self.check_readable()?;
        Ok(self.verb_store.by_target(target))
    }

    pub async fn get_verbs_by_kind(&self, kind: &VerbKind) -> Result<Vec<Verb>> {
        self.check_readable()?;
        Ok(self.verb_store.by_kind(kind))
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_verb(&self, id: &VerbId) -> Result<bool> {
        self.check_writable()?;
        let existed = self.storage.delete_verb(id).await?;
        if existed {
            self.verb_index.read().await.delete(id);
            self.verb_store.remove(id);
            let record = self.stats.record(ChangeOp::DeleteVerb, id.0.clone(), "unknown");
            let _ = self
                .storage
                .append_change(&vex_storage::ChangeLogEntry {
                    op: record.op,
                    entity_kind: "verb".to_string(),
                    id: record.subject_id,
                    timestamp: record.at,
                })
                .await;
        }
        Ok(existed)
    }
}

#[cfg(test)]
mod tests {
    use vex_storage::MemoryBackend;
    use vex_types::{DbConfig, NounId, Vector, VerbKind};

    use crate::options::{AddInput, AddOptions, AddVerbOptions};
    use crate::Database;

    async fn seeded_db() -> Database<MemoryBackend> {
        let db = Database::new(DbConfig::default(), MemoryBackend::new()).unwrap();
        db.init().await.unwrap();
        db
    }

    async fn add_noun(db: &Database<MemoryBackend>, values: Vec<f32>) -> NounId {
        db.add(AddInput::Vector(Vector::new(values)), None, AddOptions::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn relate_creates_an_edge_between_existing_nouns() {
        let db = seeded_db().await;
        let a = add_noun(&db, vec![1.0, 0.0]).await;
        let b = add_noun(&db, vec![0.0, 1.0]).await;

        let verb_id = db.relate(a.clone(), b.clone(), VerbKind::from("Likes"), None).await.unwrap();
        let verb = db.get_verb(&verb_id).await.unwrap().unwrap();
        assert_eq!(verb.source, a);
        assert_eq!(verb.target, b);
        assert_eq!(verb.kind, VerbKind::from("Likes"));
    }

    #[tokio::test]
    async fn add_verb_rejects_missing_endpoint_by_default() {
        let db = seeded_db().await;
        let a = add_noun(&db, vec![1.0, 0.0]).await;
        let missing = NounId::from("does-not-exist");
        let err = db.relate(a, missing, VerbKind::from("Likes"), None).await.unwrap_err();
        assert!(matches!(err, vex_types::Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn add_verb_auto_creates_missing_endpoint_when_configured() {
        let db = seeded_db().await;
        let a = add_noun(&db, vec![1.0, 0.0]).await;
        let missing = NounId::from("placeholder-target");
        let verb_id = db
            .add_verb(
                a,
                missing.clone(),
                None,
                AddVerbOptions { auto_create_missing_nouns: true, ..Default::default() },
            )
            .await
            .unwrap();
        assert!(db.get_verb(&verb_id).await.unwrap().is_some());
        assert!(db.get(&missing).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn delete_verb_removes_it_from_both_direction_indices() {
        let db = seeded_db().await;
        let a = add_noun(&db, vec![1.0, 0.0]).await;
        let b = add_noun(&db, vec![0.0, 1.0]).await;
        let verb_id = db.relate(a.clone(), b.clone(), VerbKind::from("Likes"), None).await.unwrap();

        assert!(db.delete_verb(&verb_id).await.unwrap());
        assert!(db.get_verbs_by_source(&a).await.unwrap().is_empty());
        assert!(db.get_verbs_by_target(&b).await.unwrap().is_empty());
        assert!(!db.delete_verb(&verb_id).await.unwrap());
    }
}
