//! Random noun/verb graph generation, for load tests and demos — grounded
//! on the teacher's `rand::random()` fixture generators in its benchmark
//! suite.
use vex_storage::StorageBackend;
use vex_types::{CreatorService, NounKind, Result, Vector, VerbKind};

use crate::options::{AddInput, AddOptions, AddVerbOptions};
use crate::Database;

const NOUN_KINDS: [NounKind; 9] = [
    NounKind::Person,
    NounKind::Location,
    NounKind::Thing,
    NounKind::Event,
    NounKind::Concept,
    NounKind::Content,
    NounKind::Collection,
    NounKind::Organization,
    NounKind::Document,
];

#[derive(Debug, Clone)]
pub struct GeneratorOptions {
    pub noun_count: usize,
    pub verb_count: usize,
    pub dimension: usize,
    pub verb_kinds: Vec<VerbKind>,
    pub creator_service: CreatorService,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self {
            noun_count: 100,
            verb_count: 200,
            dimension: 128,
            verb_kinds: vec![VerbKind::from(VerbKind::RELATED_TO)],
            creator_service: CreatorService::default(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GeneratedGraph {
    pub noun_ids: Vec<vex_types::NounId>,
    pub verb_ids: Vec<vex_types::VerbId>,
}

fn random_vector(dimension: usize) -> Vector {
    Vector::new((0..dimension).map(|_| rand::random::<f32>()).collect())
}

impl<B: StorageBackend + 'static> Database<B> {
    /// Populates this database with `options.noun_count` random nouns
    /// (evenly cycling through every [`NounKind`]) and `options.verb_count`
    /// random typed edges between them, for testing and demos.
    #[tracing::instrument(skip(self, options))]
    pub async fn generate_random_graph(&self, options: GeneratorOptions) -> Result<GeneratedGraph> {
        self.check_writable()?;
        let mut graph = GeneratedGraph::default();

        for i in 0..options.noun_count {
            let vector = random_vector(options.dimension);
            let kind = NOUN_KINDS[i % NOUN_KINDS.len()];
            let id = self
                .add(
                    AddInput::Vector(vector),
                    None,
                    AddOptions {
                        kind: Some(kind),
                        creator_service: Some(options.creator_service.clone()),
                        ..Default::default()
                    },
                )
                .await?;
            graph.noun_ids.push(id);
        }

        if graph.noun_ids.len() < 2 || options.verb_count == 0 {
            return Ok(graph);
        }

        let verb_kinds = if options.verb_kinds.is_empty() {
            vec![VerbKind::from(VerbKind::RELATED_TO)]
        } else {
            options.verb_kinds
        };

        for i in 0..options.verb_count {
            let source = &graph.noun_ids[i % graph.noun_ids.len()];
            let target = &graph.noun_ids[(i * 7 + 1) % graph.noun_ids.len()];
            if source == target {
                continue;
            }
            let kind = verb_kinds[i % verb_kinds.len()].clone();
            let id = self
                .add_verb(
                    source.clone(),
                    target.clone(),
                    None,
                    AddVerbOptions {
                        kind: Some(kind),
                        creator_service: Some(options.creator_service.clone()),
                        ..Default::default()
                    },
                )
                .await?;
            graph.verb_ids.push(id);
        }

        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use vex_storage::MemoryBackend;
    use vex_types::DbConfig;

    use super::GeneratorOptions;
    use crate::Database;

    async fn seeded_db() -> Database<MemoryBackend> {
        let db = Database::new(DbConfig::default(), MemoryBackend::new()).unwrap();
        db.init().await.unwrap();
        db
    }

    #[tokio::test]
    async fn generates_requested_noun_and_roughly_that_many_verbs() {
        let db = seeded_db().await;
        let graph = db
            .generate_random_graph(GeneratorOptions { noun_count: 20, verb_count: 30, dimension: 8, ..Default::default() })
            .await
            .unwrap();

        assert_eq!(graph.noun_ids.len(), 20);
        assert!(!graph.verb_ids.is_empty());
        assert!(graph.verb_ids.len() <= 30);
        assert_eq!(db.get_all_verbs().await.unwrap().len(), graph.verb_ids.len());
    }

    #[tokio::test]
    async fn zero_verb_count_produces_no_edges() {
        let db = seeded_db().await;
        let graph = db
            .generate_random_graph(GeneratorOptions { noun_count: 5, verb_count: 0, dimension: 4, ..Default::default() })
            .await
            .unwrap();
        assert!(graph.verb_ids.is_empty());
    }
}
