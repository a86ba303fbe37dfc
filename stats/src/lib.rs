//! Per-creator-service counters plus the change-record factory for the
//! append-only change log. Writes are coalesced in memory (a single dirty
//! flag, the same `write_flag` coalescing trick the teacher's persistence
//! task uses) and flushed on an interval, on `flush`, or at shutdown.
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use vex_task_manager::TaskManagerGuard;
use vex_types::{ChangeOp, ChangeRecord, ServiceCounters, Statistics};

#[derive(Default)]
struct AtomicServiceCounters {
    nouns_added: AtomicU64,
    nouns_updated: AtomicU64,
    nouns_deleted: AtomicU64,
    verbs_added: AtomicU64,
    verbs_deleted: AtomicU64,
}

impl AtomicServiceCounters {
    fn record(&self, op: ChangeOp) {
        let counter = match op {
            ChangeOp::AddNoun => &self.nouns_added,
            ChangeOp::UpdateMetadata => &self.nouns_updated,
            ChangeOp::DeleteNoun => &self.nouns_deleted,
            ChangeOp::AddVerb => &self.verbs_added,
            ChangeOp::DeleteVerb => &self.verbs_deleted,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> ServiceCounters {
        ServiceCounters {
            nouns_added: self.nouns_added.load(Ordering::Relaxed),
            nouns_updated: self.nouns_updated.load(Ordering::Relaxed),
            nouns_deleted: self.nouns_deleted.load(Ordering::Relaxed),
            verbs_added: self.verbs_added.load(Ordering::Relaxed),
            verbs_deleted: self.verbs_deleted.load(Ordering::Relaxed),
        }
    }
}

pub struct StatsCollector {
    counters: papaya::HashMap<String, AtomicServiceCounters>,
    /// Lifetime total of `AddNoun` events. Monotone over the session — never
    /// decremented on delete, per the sum-of-sub-counters invariant; the
    /// live index size is tracked separately by the index itself.
    noun_count: AtomicU64,
    /// Lifetime total of `AddVerb` events. Monotone, same reasoning as
    /// `noun_count`.
    verb_count: AtomicU64,
    /// Lifetime total of `UpdateMetadata` events. Monotone, same reasoning.
    metadata_count: AtomicU64,
    dirty: Arc<AtomicBool>,
}

impl Default for StatsCollector {
    fn default() -> Self {
        Self {
            counters: papaya::HashMap::new(),
            noun_count: AtomicU64::new(0),
            verb_count: AtomicU64::new(0),
            metadata_count: AtomicU64::new(0),
            dirty: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a mutation against `created_by`'s counters, adjusts the
    /// global noun/verb counts, marks the collector dirty, and returns the
    /// change record for the caller to persist to the change log.
    #[tracing::instrument(skip(self, subject_id, created_by))]
    pub fn record(
        &self,
        op: ChangeOp,
        subject_id: impl Into<String>,
        created_by: impl Into<String>,
    ) -> ChangeRecord {
        let created_by = created_by.into();
        let guard = self.counters.pin();
        guard
            .get_or_insert_with(created_by.clone(), AtomicServiceCounters::default)
            .record(op);

        match op {
            ChangeOp::AddNoun => {
                self.noun_count.fetch_add(1, Ordering::Relaxed);
            }
            ChangeOp::AddVerb => {
                self.verb_count.fetch_add(1, Ordering::Relaxed);
            }
            ChangeOp::UpdateMetadata => {
                self.metadata_count.fetch_add(1, Ordering::Relaxed);
            }
            ChangeOp::DeleteNoun | ChangeOp::DeleteVerb => {}
        }

        self.dirty.store(true, Ordering::SeqCst);
        ChangeRecord::new(op, subject_id, created_by)
    }

    pub fn snapshot(&self) -> Statistics {
        let by_service = self
            .counters
            .pin()
            .iter()
            .map(|(service, counters)| (service.clone(), counters.snapshot()))
            .collect();
        Statistics {
            noun_count: self.noun_count.load(Ordering::Relaxed),
            verb_count: self.verb_count.load(Ordering::Relaxed),
            metadata_count: self.metadata_count.load(Ordering::Relaxed),
            hnsw_index_size: 0,
            by_service,
        }
    }

    pub fn clear(&self) {
        self.counters.pin().clear();
        self.noun_count.store(0, Ordering::Relaxed);
        self.verb_count.store(0, Ordering::Relaxed);
        self.metadata_count.store(0, Ordering::Relaxed);
        self.dirty.store(false, Ordering::SeqCst);
    }

    fn take_dirty(&self) -> bool {
        self.dirty
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Background flush loop: every `interval_ms`, if anything changed since
    /// the last flush, calls `on_flush` with the current snapshot. Runs
    /// until `guard` reports cancellation (ctrl-c or explicit shutdown).
    pub async fn monitor<F, Fut>(&self, interval_ms: u64, guard: TaskManagerGuard, mut on_flush: F)
    where
        F: FnMut(Statistics) -> Fut,
        Fut: std::future::Future<Output = ()>,
    {
        loop {
            tokio::select! {
                _ = guard.is_cancelled() => {
                    if self.take_dirty() {
                        on_flush(self.snapshot()).await;
                    }
                    break;
                }
                _ = tokio::time::sleep(std::time::Duration::from_millis(interval_ms)) => {
                    if self.take_dirty() {
                        on_flush(self.snapshot()).await;
                    } else {
                        tracing::debug!("no stats changes during flush interval");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_updates_counts_and_by_service() {
        let stats = StatsCollector::new();
        stats.record(ChangeOp::AddNoun, "n1", "svc-a");
        stats.record(ChangeOp::AddNoun, "n2", "svc-a");
        stats.record(ChangeOp::AddVerb, "v1", "svc-b");

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.noun_count, 2);
        assert_eq!(snapshot.verb_count, 1);
        assert_eq!(snapshot.by_service["svc-a"].nouns_added, 2);
        assert_eq!(snapshot.by_service["svc-b"].verbs_added, 1);
    }

    #[test]
    fn delete_does_not_decrement_lifetime_counts() {
        let stats = StatsCollector::new();
        stats.record(ChangeOp::AddNoun, "n1", "svc-a");
        stats.record(ChangeOp::DeleteNoun, "n1", "svc-a");
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.noun_count, 1);
        assert_eq!(snapshot.by_service["svc-a"].nouns_deleted, 1);
    }

    #[test]
    fn metadata_updates_are_counted() {
        let stats = StatsCollector::new();
        stats.record(ChangeOp::AddNoun, "n1", "svc-a");
        stats.record(ChangeOp::UpdateMetadata, "n1", "svc-a");
        stats.record(ChangeOp::UpdateMetadata, "n1", "svc-a");
        assert_eq!(stats.snapshot().metadata_count, 2);
    }

    #[test]
    fn clear_resets_everything() {
        let stats = StatsCollector::new();
        stats.record(ChangeOp::AddNoun, "n1", "svc-a");
        stats.clear();
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.noun_count, 0);
        assert!(snapshot.by_service.is_empty());
    }
}
