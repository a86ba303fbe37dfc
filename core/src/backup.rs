//! `backup`/`restore` — full-state export and reload.
//!
//! Backups carry the raw noun/verb records (each noun already stores its own
//! HNSW level and neighbour lists) plus the active config, serialized through
//! `serde_json` rather than any bespoke binary format. Restoring writes the
//! records back to storage and then rebuilds the in-memory indices from
//! scratch the same way [`Database::init`](crate::Database::init) does — no
//! separate "index blob" is persisted.
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use vex_storage::StorageBackend;
use vex_types::{DbConfig, Noun, NounKind, Result, Verb};

use crate::Database;

/// Bumped whenever `BackupData`'s shape changes in a way a reader needs to
/// know about.
pub const BACKUP_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupData {
    pub version: u32,
    pub config: DbConfig,
    pub nouns: Vec<Noun>,
    pub verbs: Vec<Verb>,
    /// Distinct noun kinds present in `nouns`, for cheap pre-restore checks
    /// without scanning the full noun list.
    pub kinds: Vec<NounKind>,
}

impl<B: StorageBackend + 'static> Database<B> {
    /// Snapshots every noun and verb currently in storage, plus the config
    /// they were written under.
    #[tracing::instrument(skip(self))]
    pub async fn backup(&self) -> Result<BackupData> {
        self.check_readable()?;
        let nouns = self.storage.get_all_nouns().await?;
        let verbs = self.storage.get_all_verbs().await?;
        let kinds: BTreeSet<NounKind> = nouns.iter().filter_map(|n| n.kind).collect();
        Ok(BackupData {
            version: BACKUP_FORMAT_VERSION,
            config: self.config.clone(),
            nouns,
            verbs,
            kinds: kinds.into_iter().collect(),
        })
    }

    /// Writes `data`'s nouns and verbs into storage, then rebuilds the
    /// in-memory indices. `clear_existing` wipes storage (and every
    /// in-memory structure) first; otherwise restored records are merged in
    /// on top of whatever is already there.
    #[tracing::instrument(skip(self, data))]
    pub async fn restore(&self, data: BackupData, clear_existing: bool) -> Result<()> {
        self.check_writable()?;
        if clear_existing {
            self.clear().await?;
        }

        for noun in &data.nouns {
            self.storage.save_noun(noun).await?;
        }
        for verb in &data.verbs {
            self.storage.save_verb(verb).await?;
        }

        self.rebuild_indices().await
    }
}

#[cfg(test)]
mod tests {
    use vex_storage::MemoryBackend;
    use vex_types::{DbConfig, Vector};

    use crate::options::{AddInput, AddOptions};
    use crate::Database;

    async fn seeded_db() -> Database<MemoryBackend> {
        let db = Database::new(DbConfig::default(), MemoryBackend::new()).unwrap();
        db.init().await.unwrap();
        db
    }

    #[tokio::test]
    async fn restore_into_a_fresh_database_recovers_all_nouns_and_verbs() {
        let source = seeded_db().await;
        let a = source.add(AddInput::Vector(Vector::new(vec![1.0, 0.0])), None, AddOptions::default()).await.unwrap();
        let b = source.add(AddInput::Vector(Vector::new(vec![0.0, 1.0])), None, AddOptions::default()).await.unwrap();
        source.relate(a.clone(), b.clone(), vex_types::VerbKind::from("Likes"), None).await.unwrap();

        let backup = source.backup().await.unwrap();
        assert_eq!(backup.nouns.len(), 2);
        assert_eq!(backup.verbs.len(), 1);

        let target = seeded_db().await;
        target.restore(backup, false).await.unwrap();

        assert!(target.get(&a).await.unwrap().is_some());
        assert!(target.get(&b).await.unwrap().is_some());
        assert_eq!(target.get_all_verbs().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn restore_with_clear_existing_discards_prior_state() {
        let db = seeded_db().await;
        let stale = db.add(AddInput::Vector(Vector::new(vec![9.0, 9.0])), None, AddOptions::default()).await.unwrap();

        let empty_backup = super::BackupData {
            version: super::BACKUP_FORMAT_VERSION,
            config: DbConfig::default(),
            nouns: Vec::new(),
            verbs: Vec::new(),
            kinds: Vec::new(),
        };
        db.restore(empty_backup, true).await.unwrap();

        assert!(db.get(&stale).await.unwrap().is_none());
    }
}
