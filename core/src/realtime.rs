//! `enableRealtimeUpdates`/`disableRealtimeUpdates`/`checkForUpdatesNow` and
//! the background poller they control.
//!
//! Tails `storage.get_changes_since`; when a backend has no change-log
//! support (`Ok(None)`), falls back to a full rescan via
//! [`Database::rebuild_indices`].
use vex_storage::StorageBackend;
use vex_types::{ChangeOp, RealtimeConfig, Result};

use crate::Database;

impl<B: StorageBackend + 'static> Database<B> {
    /// Turns on the realtime poller, spawning it if it isn't already
    /// running. `config` overrides the database's configured interval for
    /// this run, if given.
    pub async fn enable_realtime_updates(&self, config: Option<RealtimeConfig>) -> Result<()> {
        if let Some(config) = config {
            *self.last_poll.write() = chrono::Utc::now();
            tracing::debug!(interval_ms = config.interval_ms, "realtime updates enabled with override config");
        }
        let already_running = *self.realtime_enabled.read();
        *self.realtime_enabled.write() = true;
        if !already_running {
            self.spawn_realtime_poller().await;
        }
        Ok(())
    }

    /// Turns off the realtime poller. The currently-running task loop checks
    /// this flag on its next tick and exits; already-applied changes are not
    /// rolled back.
    pub fn disable_realtime_updates(&self) {
        *self.realtime_enabled.write() = false;
    }

    /// Runs one poll cycle immediately, regardless of whether the background
    /// poller is enabled.
    #[tracing::instrument(skip(self))]
    pub async fn check_for_updates_now(&self) -> Result<usize> {
        self.apply_pending_changes().await
    }

    pub(crate) async fn spawn_realtime_poller(&self) {
        let interval_ms = self.config.realtime.interval_ms.max(1);
        let interval = std::time::Duration::from_millis(interval_ms);
        let database = self.clone();
        let task = move |guard: vex_task_manager::TaskManagerGuard| async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    biased;
                    _ = guard.is_cancelled() => {
                        tracing::info!("realtime poller stopped");
                        return;
                    }
                    _ = ticker.tick() => {
                        if !*database.realtime_enabled.read() {
                            continue;
                        }
                        if let Err(err) = database.apply_pending_changes().await {
                            tracing::warn!(error = %err, "realtime poll failed, will retry next tick");
                        }
                    }
                }
            }
        };
        self.tasks.spawn_task_loop(task, "realtime-poll".to_string()).await;
    }

    async fn apply_pending_changes(&self) -> Result<usize> {
        let since = *self.last_poll.read();
        let now = chrono::Utc::now();
        let changes = self.storage.get_changes_since(since, 10_000).await?;
        let applied = match changes {
            Some(changes) => {
                let count = changes.len();
                for change in &changes {
                    self.apply_change(change).await?;
                }
                count
            }
            None => {
                tracing::debug!("backend has no change log; falling back to a full rescan");
                self.rebuild_indices().await?;
                0
            }
        };
        *self.last_poll.write() = now;
        Ok(applied)
    }

    async fn apply_change(&self, change: &vex_storage::ChangeLogEntry) -> Result<()> {
        match (change.entity_kind.as_str(), change.op) {
            ("noun", ChangeOp::AddNoun) | ("noun", ChangeOp::UpdateMetadata) => {
                let id = vex_types::NounId::from(change.id.clone());
                if let Some(noun) = self.storage.get_noun(&id).await? {
                    let _ = self.noun_index.read().await.insert(id.clone(), noun.vector.clone());
                    self.cache.nouns.put(id.0.clone(), noun);
                }
            }
            ("noun", ChangeOp::DeleteNoun) => {
                let id = vex_types::NounId::from(change.id.clone());
                self.noun_index.read().await.delete(&id);
                self.cache.nouns.remove(&id.0);
            }
            ("verb", ChangeOp::AddVerb) => {
                let id = vex_types::VerbId::from(change.id.clone());
                if let Some(verb) = self.storage.get_verb(&id).await? {
                    let _ = self.verb_index.read().await.insert(id, verb.vector.clone());
                    self.verb_store.insert(verb);
                }
            }
            ("verb", ChangeOp::DeleteVerb) => {
                let id = vex_types::VerbId::from(change.id.clone());
                self.verb_index.read().await.delete(&id);
                self.verb_store.remove(&id);
            }
            _ => {}
        }
        Ok(())
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
    async fn check_for_updates_now_applies_changes_recorded_after_last_poll() {
        let db = seeded_db().await;
        db.add(AddInput::Vector(Vector::new(vec![1.0, 2.0])), None, AddOptions::default())
            .await
            .unwrap();

        let applied = db.check_for_updates_now().await.unwrap();
        assert_eq!(applied, 1);

        // A second poll with nothing new to apply reports zero.
        assert_eq!(db.check_for_updates_now().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn disable_then_enable_realtime_updates_round_trips_the_flag() {
        let db = seeded_db().await;
        assert!(!*db.realtime_enabled.read());
        db.enable_realtime_updates(None).await.unwrap();
        assert!(*db.realtime_enabled.read());
        db.disable_realtime_updates();
        assert!(!*db.realtime_enabled.read());
    }
}
