//! `search`/`searchText`/`findSimilar` — the read side of the façade.
use std::collections::HashSet;

use vex_storage::StorageBackend;
use vex_types::{NounId, Result, VerbDirection};

use crate::options::{AddInput, FindSimilarOptions, SearchMode, SearchOptions, SearchResult};
use crate::Database;

impl<B: StorageBackend + 'static> Database<B> {
    /// Resolves `query` to a vector, searches the noun index, then applies
    /// the noun-kind / creator-service filters and optional connected-noun
    /// expansion described in `options`.
    #[tracing::instrument(skip(self, query))]
    pub async fn search(&self, query: AddInput, k: usize, options: SearchOptions) -> Result<Vec<SearchResult>> {
        self.check_readable()?;
        if options.search_mode != SearchMode::Local {
            tracing::warn!(
                mode = ?options.search_mode,
                "non-local search mode is undefined upstream; falling back to local search"
            );
        }

        let vector = self.resolve_vector(query, options.force_embed)?;
        let coordinator_config = self.config.coordinator.clone();
        let noun_index = self.noun_index.read().await;
        let hits = noun_index.search(&vector, k, &coordinator_config).await?;
        drop(noun_index);

        self.cache
            .prefetcher()
            .on_query_beam(hits.iter().map(|(id, _)| id.clone()).collect());

        let mut results = Vec::with_capacity(hits.len());
        let mut seen: HashSet<NounId> = HashSet::new();
        for (id, score) in hits {
            if let Some(result) = self.hydrate_result(&id, score, &options).await? {
                seen.insert(id);
                results.push(result);
            }
        }

        if options.search_connected_nouns {
            let direction = options.verb_direction.unwrap_or(VerbDirection::Both);
            let extra_ids: Vec<NounId> = results
                .iter()
                .flat_map(|r| {
                    self.verb_store
                        .connected_nouns(&r.id, direction, None)
                })
                .filter(|id| !seen.contains(id))
                .collect();
            for id in extra_ids {
                if seen.contains(&id) {
                    continue;
                }
                if let Some(result) = self.hydrate_result(&id, f32::NAN, &options).await? {
                    seen.insert(id);
                    results.push(result);
                }
            }
        }

        if options.search_verbs {
            let direction = options.verb_direction.unwrap_or(VerbDirection::Both);
            let verb_index = self.verb_index.read().await;
            let verb_hits = verb_index.search(&vector, k, &coordinator_config).await?;
            drop(verb_index);

            for (verb_id, score) in verb_hits {
                let Some(verb) = self.verb_store.get(&verb_id) else {
                    continue;
                };
                if let Some(kinds) = &options.verb_kinds {
                    if !kinds.contains(&verb.kind) {
                        continue;
                    }
                }
                let endpoints: Vec<NounId> = match direction {
                    VerbDirection::Out => vec![verb.target.clone()],
                    VerbDirection::In => vec![verb.source.clone()],
                    VerbDirection::Both => vec![verb.source.clone(), verb.target.clone()],
                };
                for endpoint in &endpoints {
                    if seen.contains(endpoint) {
                        continue;
                    }
                    if let Some(result) = self.hydrate_result(endpoint, score, &options).await? {
                        seen.insert(endpoint.clone());
                        results.push(result);
                    }
                }
            }
        }

        results.truncate(k);
        Ok(results)
    }

    async fn hydrate_result(
        &self,
        id: &NounId,
        score: f32,
        options: &SearchOptions,
    ) -> Result<Option<SearchResult>> {
        let Some(noun) = self.get(id).await? else {
            return Ok(None);
        };
        if let Some(kinds) = &options.noun_kinds {
            let noun_record = self.storage.get_noun(id).await?;
            let kind_matches = noun_record.and_then(|n| n.kind).map(|k| kinds.contains(&k)).unwrap_or(false);
            if !kind_matches {
                return Ok(None);
            }
        }
        if let Some(filter) = &options.creator_service_filter {
            let noun_record = self.storage.get_noun(id).await?;
            let matches = noun_record.map(|n| &n.created_by == filter).unwrap_or(false);
            if !matches {
                return Ok(None);
            }
        }
        let connected_verbs = if options.include_verbs {
            let mut verbs: Vec<_> = self.verb_store.by_source(id).into_iter().map(|v| v.id).collect();
            verbs.extend(self.verb_store.by_target(id).into_iter().map(|v| v.id));
            verbs
        } else {
            Vec::new()
        };
        Ok(Some(SearchResult {
            id: noun.id,
            score,
            vector: noun.vector,
            metadata: noun.metadata,
            connected_verbs,
        }))
    }

    /// Convenience wrapper: embeds `text` through the configured embedding
    /// function, then searches.
    pub async fn search_text(
        &self,
        text: impl Into<String>,
        k: usize,
        options: SearchOptions,
    ) -> Result<Vec<SearchResult>> {
        let payload = serde_json::Value::String(text.into());
        self.search(AddInput::Payload(payload), k, options).await
    }

    /// Uses `id`'s stored vector to search for similar nouns, unless
    /// `relation_type` is set, in which case it follows typed edges instead
    /// of touching the vector index at all.
    #[tracing::instrument(skip(self))]
    pub async fn find_similar(&self, id: &NounId, options: FindSimilarOptions) -> Result<Vec<SearchResult>> {
        self.check_readable()?;
        if let Some(relation) = &options.relation_type {
            let direction = options.verb_direction.unwrap_or(VerbDirection::Out);
            let mut results = Vec::new();
            for connected in self.verb_store.connected_nouns(id, direction, Some(relation)) {
                if let Some(noun) = self.get(&connected).await? {
                    results.push(SearchResult {
                        id: noun.id,
                        score: 0.0,
                        vector: noun.vector,
                        metadata: noun.metadata,
                        connected_verbs: Vec::new(),
                    });
                }
            }
            if options.k > 0 {
                results.truncate(options.k);
            }
            return Ok(results);
        }

        let Some(noun) = self.get(id).await? else {
            return Ok(Vec::new());
        };
        let k = if options.k == 0 { 10 } else { options.k };
        let search_options = SearchOptions::default();
        let mut results = self
            .search(AddInput::Vector(noun.vector), k + 1, search_options)
            .await?;
        results.retain(|r| &r.id != id);
        results.truncate(k);
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use vex_storage::MemoryBackend;
    use vex_types::{DbConfig, Vector, VerbDirection, VerbKind};

    use crate::options::{AddInput, AddOptions, FindSimilarOptions, SearchOptions};
    use crate::Database;

    async fn seeded_db() -> Database<MemoryBackend> {
        let db = Database::new(DbConfig::default(), MemoryBackend::new()).unwrap();
        db.init().await.unwrap();
        db
    }

    #[tokio::test]
    async fn search_returns_the_nearest_noun_first() {
        let db = seeded_db().await;
        let near = db.add(AddInput::Vector(Vector::new(vec![1.0, 0.0])), None, AddOptions::default()).await.unwrap();
        let far = db.add(AddInput::Vector(Vector::new(vec![100.0, 0.0])), None, AddOptions::default()).await.unwrap();

        let results = db.search(AddInput::Vector(Vector::new(vec![1.1, 0.0])), 2, Default::default()).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, near);
        assert_eq!(results[1].id, far);
    }

    #[tokio::test]
    async fn find_similar_by_relation_type_follows_typed_edges_not_the_vector_index() {
        let db = seeded_db().await;
        let a = db.add(AddInput::Vector(Vector::new(vec![1.0, 0.0])), None, AddOptions::default()).await.unwrap();
        let b = db.add(AddInput::Vector(Vector::new(vec![50.0, 50.0])), None, AddOptions::default()).await.unwrap();
        let unrelated = db.add(AddInput::Vector(Vector::new(vec![1.05, 0.0])), None, AddOptions::default()).await.unwrap();
        db.relate(a.clone(), b.clone(), VerbKind::from("Likes"), None).await.unwrap();

        let results = db
            .find_similar(
                &a,
                FindSimilarOptions {
                    k: 10,
                    relation_type: Some(VerbKind::from("Likes")),
                    verb_direction: Some(VerbDirection::Out),
                },
            )
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, b);
        assert!(!results.iter().any(|r| r.id == unrelated));
    }

    #[tokio::test]
    async fn find_similar_without_relation_type_falls_back_to_vector_search() {
        let db = seeded_db().await;
        let a = db.add(AddInput::Vector(Vector::new(vec![1.0, 0.0])), None, AddOptions::default()).await.unwrap();
        let near = db.add(AddInput::Vector(Vector::new(vec![1.1, 0.0])), None, AddOptions::default()).await.unwrap();

        let results = db.find_similar(&a, FindSimilarOptions { k: 5, ..Default::default() }).await.unwrap();
        assert!(results.iter().any(|r| r.id == near));
        assert!(!results.iter().any(|r| r.id == a));
    }

    #[tokio::test]
    async fn search_verbs_surfaces_endpoints_of_nearby_verbs() {
        let db = seeded_db().await;
        let a = db.add(AddInput::Vector(Vector::new(vec![1.0, 0.0])), None, AddOptions::default()).await.unwrap();
        let b = db.add(AddInput::Vector(Vector::new(vec![50.0, 50.0])), None, AddOptions::default()).await.unwrap();
        db.relate(a.clone(), b.clone(), VerbKind::from("Likes"), None).await.unwrap();

        // The verb's embedding is the mean of its endpoints, so querying at
        // that midpoint should surface the verb and, through it, both `a`
        // and `b`.
        let midpoint = Vector::new(vec![25.5, 25.0]);
        let results = db
            .search(
                AddInput::Vector(midpoint),
                10,
                SearchOptions {
                    search_verbs: true,
                    verb_direction: Some(VerbDirection::Both),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(results.iter().any(|r| r.id == a));
        assert!(results.iter().any(|r| r.id == b));
    }

    #[tokio::test]
    async fn search_verbs_respects_verb_kind_filter() {
        let db = seeded_db().await;
        let a = db.add(AddInput::Vector(Vector::new(vec![1.0, 0.0])), None, AddOptions::default()).await.unwrap();
        let b = db.add(AddInput::Vector(Vector::new(vec![50.0, 50.0])), None, AddOptions::default()).await.unwrap();
        db.relate(a.clone(), b.clone(), VerbKind::from("Likes"), None).await.unwrap();

        // k=1 so the primary noun search alone only surfaces `a`; `b` can
        // only appear through the verb-kind-filtered expansion, which should
        // reject it since the relating verb's kind doesn't match.
        let results = db
            .search(
                AddInput::Vector(Vector::new(vec![1.0, 0.0])),
                1,
                SearchOptions {
                    search_verbs: true,
                    verb_kinds: Some(vec![VerbKind::from("Dislikes")]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(results.iter().any(|r| r.id == a));
        assert!(!results.iter().any(|r| r.id == b));
    }

    #[tokio::test]
    async fn include_verbs_attaches_connected_verb_ids() {
        let db = seeded_db().await;
        let a = db.add(AddInput::Vector(Vector::new(vec![1.0, 0.0])), None, AddOptions::default()).await.unwrap();
        let b = db.add(AddInput::Vector(Vector::new(vec![1.1, 0.0])), None, AddOptions::default()).await.unwrap();
        let verb_id = db.relate(a.clone(), b.clone(), VerbKind::from("Likes"), None).await.unwrap();

        let results = db
            .search(
                AddInput::Vector(Vector::new(vec![1.0, 0.0])),
                5,
                SearchOptions { include_verbs: true, ..Default::default() },
            )
            .await
            .unwrap();

        let hit = results.iter().find(|r| r.id == a).unwrap();
        assert!(hit.connected_verbs.contains(&verb_id));
    }
}
