//! Integration coverage for the public façade surface, against the
//! in-memory backend.
use pretty_assertions::assert_eq;
use vex_core::options::{AddInput, AddOptions, DeleteOptions};
use vex_core::Database;
use vex_storage::{MemoryBackend, StorageBackend};
use vex_types::{DbConfig, Error, NounId, Vector, VerbKind};

async fn fresh_db() -> Database<MemoryBackend> {
    let db = Database::new(DbConfig::default(), MemoryBackend::new()).unwrap();
    db.init().await.unwrap();
    db
}

#[tokio::test]
async fn toy_insert_search_delete_round_trip() {
    let db = fresh_db().await;

    let a = db.add(AddInput::Vector(Vector::new(vec![1.0, 0.0])), None, AddOptions::default()).await.unwrap();
    let b = db.add(AddInput::Vector(Vector::new(vec![0.0, 1.0])), None, AddOptions::default()).await.unwrap();
    let c = db.add(AddInput::Vector(Vector::new(vec![1.0, 1.0])), None, AddOptions::default()).await.unwrap();

    let results = db.search(AddInput::Vector(Vector::new(vec![0.9, 0.1])), 3, Default::default()).await.unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].id, a);

    assert!(db.delete(&a, DeleteOptions::default()).await.unwrap());
    let results = db.search(AddInput::Vector(Vector::new(vec![0.9, 0.1])), 3, Default::default()).await.unwrap();
    assert!(!results.iter().any(|r| r.id == a));
    assert!(results.iter().any(|r| r.id == b));
    assert!(results.iter().any(|r| r.id == c));
}

#[tokio::test]
async fn dimension_mismatch_is_rejected_once_dimension_is_pinned() {
    let mut config = DbConfig::default();
    config.dimension = Some(3);
    let db = Database::new(config, MemoryBackend::new()).unwrap();
    db.init().await.unwrap();

    db.add(AddInput::Vector(Vector::new(vec![1.0, 2.0, 3.0])), None, AddOptions::default()).await.unwrap();

    let err = db.add(AddInput::Vector(Vector::new(vec![1.0, 2.0])), None, AddOptions::default()).await.unwrap_err();
    assert!(matches!(err, Error::DimensionMismatch { expected: 3, got: 2 }));
}

#[tokio::test]
async fn typed_edge_traversal_via_find_similar_and_relation_type() {
    let db = fresh_db().await;
    let author = db.add(AddInput::Vector(Vector::new(vec![1.0, 0.0])), None, AddOptions::default()).await.unwrap();
    let book_one = db.add(AddInput::Vector(Vector::new(vec![0.2, 0.9])), None, AddOptions::default()).await.unwrap();
    let book_two = db.add(AddInput::Vector(Vector::new(vec![0.3, 0.85])), None, AddOptions::default()).await.unwrap();
    let unrelated = db.add(AddInput::Vector(Vector::new(vec![5.0, 5.0])), None, AddOptions::default()).await.unwrap();

    db.relate(author.clone(), book_one.clone(), VerbKind::from("Wrote"), None).await.unwrap();
    db.relate(author.clone(), book_two.clone(), VerbKind::from("Wrote"), None).await.unwrap();

    let results = db
        .find_similar(
            &author,
            vex_core::options::FindSimilarOptions {
                k: 10,
                relation_type: Some(VerbKind::from("Wrote")),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let ids: Vec<NounId> = results.into_iter().map(|r| r.id).collect();
    assert!(ids.contains(&book_one));
    assert!(ids.contains(&book_two));
    assert!(!ids.contains(&unrelated));
}

#[tokio::test]
async fn backup_and_restore_preserve_search_results_on_a_larger_graph() {
    let db = fresh_db().await;
    let graph = db
        .generate_random_graph(vex_core::generator::GeneratorOptions {
            noun_count: 200,
            verb_count: 400,
            dimension: 16,
            ..Default::default()
        })
        .await
        .unwrap();

    let query = Vector::new((0..16).map(|i| i as f32 / 16.0).collect());
    let before = db.search(AddInput::Vector(query.clone()), 20, Default::default()).await.unwrap();

    let backup = db.backup().await.unwrap();
    let restored = fresh_db().await;
    restored.restore(backup, true).await.unwrap();

    let after = restored.search(AddInput::Vector(query), 20, Default::default()).await.unwrap();

    assert_eq!(before.len(), after.len());
    let before_ids: Vec<NounId> = before.into_iter().map(|r| r.id).collect();
    let after_ids: Vec<NounId> = after.into_iter().map(|r| r.id).collect();
    assert_eq!(before_ids, after_ids);
    assert!(graph.noun_ids.len() >= 20);
}

#[tokio::test]
async fn read_only_mode_rejects_writes_but_allows_reads() {
    let backend = MemoryBackend::new();
    let seed_config = DbConfig::default();
    let seed = Database::new(seed_config.clone(), backend).unwrap();
    seed.init().await.unwrap();
    let id = seed
        .add(AddInput::Vector(Vector::new(vec![1.0, 2.0])), None, AddOptions::default())
        .await
        .unwrap();
    seed.shut_down().await.unwrap();

    // Re-open the same in-memory records under a read-only façade by
    // restoring into a fresh read-only database.
    let backup = seed.backup().await.unwrap();
    let mut ro_config = seed_config;
    ro_config.read_only = true;
    let ro_storage = MemoryBackend::new();
    ro_storage.init().await.unwrap();
    for noun in &backup.nouns {
        ro_storage.save_noun(noun).await.unwrap();
    }
    let ro_db = Database::new(ro_config, ro_storage).unwrap();
    ro_db.init().await.unwrap();

    assert!(ro_db.get(&id).await.unwrap().is_some());
    let err = ro_db
        .add(AddInput::Vector(Vector::new(vec![9.0, 9.0])), None, AddOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ReadOnly));
}

#[tokio::test]
async fn realtime_check_for_updates_now_reflects_writes_made_since_last_poll() {
    let db = fresh_db().await;
    db.check_for_updates_now().await.unwrap();

    let id = db.add(AddInput::Vector(Vector::new(vec![1.0])), None, AddOptions::default()).await.unwrap();
    let applied = db.check_for_updates_now().await.unwrap();
    assert_eq!(applied, 1);
    assert!(db.get(&id).await.unwrap().is_some());
}
