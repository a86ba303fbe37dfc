//! `add`/`addBatch`/`get`/`delete`/`updateMetadata` — the noun half of the
//! façade's CRUD surface.
use vex_storage::StorageBackend;
use vex_types::{ChangeOp, CreatorService, Error, Noun, NounId, Result, Vector};

use crate::options::{AddInput, AddOptions, BatchOptions, DeleteOptions, NounView};
use crate::Database;

impl<B: StorageBackend + 'static> Database<B> {
    /// `force_embed` only matters for payload input: it's a no-op when the
    /// caller already supplied a vector.
    pub(crate) fn resolve_vector(&self, input: AddInput, _force_embed: bool) -> Result<Vector> {
        match input {
            AddInput::Vector(vector) => Ok(vector),
            AddInput::Payload(payload) => self.embed_payload(&payload),
        }
    }

    fn embed_payload(&self, payload: &serde_json::Value) -> Result<Vector> {
        let embedding = self.embedding.read();
        let embedding_fn = embedding
            .as_ref()
            .ok_or_else(|| Error::EmbeddingFailed("no embedding function configured".to_string()))?;
        embedding_fn.embed(payload)
    }

    /// Inserts a noun, either from a caller-supplied vector or a payload run
    /// through the configured embedding function. Rejects dimension
    /// mismatches against `config.dimension` when it's pinned.
    #[tracing::instrument(skip(self, data))]
    pub async fn add(&self, data: AddInput, metadata: Option<serde_json::Value>, options: AddOptions) -> Result<NounId> {
        self.check_writable()?;
        let vector = self.resolve_vector(data, options.force_embed)?;
        self.validate_dimension(&vector)?;

        let id = options.id.unwrap_or_else(NounId::new_uuid);
        let created_by = options.creator_service.unwrap_or_default();
        let mut noun = Noun::new(id.clone(), vector.clone(), created_by.clone());
        noun.kind = options.kind;
        noun.metadata = metadata.map(vex_types::Metadata);

        self.noun_index
            .read()
            .await
            .insert(id.clone(), vector)?;
        if let Err(err) = self.storage.save_noun(&noun).await {
            self.noun_index.read().await.delete(&id);
            return Err(err);
        }
        self.cache.nouns.put(id.0.clone(), noun);
        let record = self.stats.record(ChangeOp::AddNoun, id.0.clone(), created_by.0);
        let _ = self
            .storage
            .append_change(&vex_storage::ChangeLogEntry {
                op: record.op,
                entity_kind: "noun".to_string(),
                id: record.subject_id,
                timestamp: record.at,
            })
            .await;

        Ok(id)
    }

    /// Partitions vector-typed and payload-typed items, runs each through
    /// [`Database::add`]; `options.concurrency` bounds how many adds run at
    /// once (defaults to sequential).
    pub async fn add_batch(
        &self,
        items: Vec<(AddInput, Option<serde_json::Value>, AddOptions)>,
        options: BatchOptions,
    ) -> Result<Vec<NounId>> {
        self.check_writable()?;
        let concurrency = options.concurrency.unwrap_or(1).max(1);
        let batch_size = options.batch_size.unwrap_or(items.len()).max(1);

        let mut ids = Vec::with_capacity(items.len());
        for chunk in items.into_iter().collect::<Vec<_>>().chunks(batch_size) {
            use futures::{stream, StreamExt};
            let results: Vec<Result<NounId>> = stream::iter(chunk.to_vec())
                .map(|(data, metadata, opts)| self.add(data, metadata, opts))
                .buffer_unordered(concurrency)
                .collect()
                .await;
            for result in results {
                ids.push(result?);
            }
        }
        Ok(ids)
    }

    #[tracing::instrument(skip(self))]
    pub async fn get(&self, id: &NounId) -> Result<Option<NounView>> {
        self.check_readable()?;
        if let Some(noun) = self.cache.nouns.get(&id.0) {
            return Ok(Some(to_view(noun)));
        }
        let noun = self.storage.get_noun(id).await?;
        if let Some(noun) = &noun {
            self.cache.prefetcher().on_miss(noun);
            self.cache.nouns.put(id.0.clone(), noun.clone());
        }
        Ok(noun.map(to_view))
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, id: &NounId, options: DeleteOptions) -> Result<bool> {
        self.check_writable()?;
        let existed = self.storage.delete_noun(id).await?;
        if existed {
            self.noun_index.read().await.delete(id);
            self.cache.nouns.remove(&id.0);
            let created_by = options
                .creator_service
                .unwrap_or_default()
                .0;
            let record = self.stats.record(ChangeOp::DeleteNoun, id.0.clone(), created_by);
            let _ = self
                .storage
                .append_change(&vex_storage::ChangeLogEntry {
                    op: record.op,
                    entity_kind: "noun".to_string(),
                    id: record.subject_id,
                    timestamp: record.at,
                })
                .await;
        }
        Ok(existed)
    }

    #[tracing::instrument(skip(self, metadata))]
    pub async fn update_metadata(
        &self,
        id: &NounId,
        metadata: serde_json::Value,
        creator_service: Option<CreatorService>,
    ) -> Result<bool> {
        self.check_writable()?;
        let Some(mut noun) = self.storage.get_noun(id).await? else {
            return Ok(false);
        };
        noun.metadata = Some(vex_types::Metadata(metadata));
        noun.updated_at = chrono::Utc::now();
        self.storage.save_noun(&noun).await?;
        self.cache.nouns.put(id.0.clone(), noun);

        let created_by = creator_service.unwrap_or_default().0;
        let record = self.stats.record(ChangeOp::UpdateMetadata, id.0.clone(), created_by);
        let _ = self
            .storage
            .append_change(&vex_storage::ChangeLogEntry {
                op: record.op,
                entity_kind: "noun".to_string(),
                id: record.subject_id,
                timestamp: record.at,
            })
            .await;
        Ok(true)
    }
}

fn to_view(noun: Noun) -> NounView {
    NounView {
        id: noun.id,
        vector: noun.vector,
        metadata: noun.metadata.map(|m| m.0),
    }
}

#[cfg(test)]
mod tests {
    use vex_storage::MemoryBackend;
    use vex_types::{DbConfig, Error, Vector};

    use crate::options::{AddInput, AddOptions, BatchOptions, DeleteOptions};
    use crate::Database;

    async fn seeded_db() -> Database<MemoryBackend> {
        let db = Database::new(DbConfig::default(), MemoryBackend::new()).unwrap();
        db.init().await.unwrap();
        db
    }

    #[tokio::test]
    async fn add_then_get_roundtrips_the_vector_and_metadata() {
        let db = seeded_db().await;
        let metadata = serde_json::json!({"label": "toy"});
        let id = db
            .add(AddInput::Vector(Vector::new(vec![1.0, 2.0, 3.0])), Some(metadata.clone()), AddOptions::default())
            .await
            .unwrap();

        let view = db.get(&id).await.unwrap().unwrap();
        assert_eq!(view.vector.dimension(), 3);
        assert_eq!(view.metadata, Some(metadata));
    }

    #[tokio::test]
    async fn add_rejects_vectors_with_the_wrong_dimension() {
        let mut config = DbConfig::default();
        config.dimension = Some(4);
        let db = Database::new(config, MemoryBackend::new()).unwrap();
        db.init().await.unwrap();

        let err = db
            .add(AddInput::Vector(Vector::new(vec![1.0, 2.0])), None, AddOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { expected: 4, got: 2 }));
    }

    #[tokio::test]
    async fn delete_reports_whether_the_noun_existed_and_removes_it() {
        let db = seeded_db().await;
        let id = db.add(AddInput::Vector(Vector::new(vec![1.0])), None, AddOptions::default()).await.unwrap();

        assert!(db.delete(&id, DeleteOptions::default()).await.unwrap());
        assert!(db.get(&id).await.unwrap().is_none());
        assert!(!db.delete(&id, DeleteOptions::default()).await.unwrap());
    }

    #[tokio::test]
    async fn add_batch_inserts_every_item() {
        let db = seeded_db().await;
        let items = (0..5)
            .map(|i| (AddInput::Vector(Vector::new(vec![i as f32])), None, AddOptions::default()))
            .collect();
        let ids = db.add_batch(items, BatchOptions { concurrency: Some(4), ..Default::default() }).await.unwrap();
        assert_eq!(ids.len(), 5);
        for id in ids {
            assert!(db.get(&id).await.unwrap().is_some());
        }
    }

    #[tokio::test]
    async fn update_metadata_reports_false_for_a_missing_noun() {
        let db = seeded_db().await;
        let missing = vex_types::NounId::from("nope");
        assert!(!db.update_metadata(&missing, serde_json::json!({}), None).await.unwrap());
    }
}
