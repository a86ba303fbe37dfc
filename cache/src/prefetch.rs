//! Predictive prefetch: on a cache miss, guess what else is about to be
//! needed and fetch it in the background so the *next* query doesn't pay a
//! storage round trip. Never blocks the query that triggered it — enqueuing
//! is a non-blocking channel send; the actual fetch happens on a task spun
//! up through [`vex_task_manager::TaskManager`].
use crate::tiered::TieredCache;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::mpsc;
use vex_storage::StorageBackend;
use vex_types::{Noun, NounId, PrefetchStrategy};

const MAX_TRACKED_BEAMS: usize = 32;
const BEAM_PREFIX_LEN: usize = 2;
const MAX_CONCURRENT_PREFETCH_GETS: usize = 50;

/// Records the last N query beams (the sequence of node ids visited during a
/// search) so a new query sharing a prefix with a recent one can prefetch
/// that beam's downstream nodes ahead of needing them.
pub struct BeamHistory {
    beams: parking_lot::Mutex<VecDeque<Vec<NounId>>>,
}

impl Default for BeamHistory {
    fn default() -> Self {
        Self {
            beams: parking_lot::Mutex::new(VecDeque::with_capacity(MAX_TRACKED_BEAMS)),
        }
    }
}

impl BeamHistory {
    /// Returns the downstream (post-prefix) ids of the most recent beam that
    /// shares a `BEAM_PREFIX_LEN`-id prefix with `beam`, if any, then records
    /// `beam` itself.
    pub fn record_and_match(&self, beam: Vec<NounId>) -> Vec<NounId> {
        let mut beams = self.beams.lock();
        let downstream = beams
            .iter()
            .find(|past| shares_prefix(past, &beam))
            .map(|past| past[beam.len().min(past.len())..].to_vec())
            .unwrap_or_default();

        if beams.len() >= MAX_TRACKED_BEAMS {
            beams.pop_front();
        }
        beams.push_back(beam);
        downstream
    }
}

fn shares_prefix(a: &[NounId], b: &[NounId]) -> bool {
    let len = BEAM_PREFIX_LEN.min(a.len()).min(b.len());
    len > 0 && a[..len] == b[..len]
}

enum PrefetchRequest {
    Ids(Vec<NounId>),
}

/// Background prefetcher: owns the high/low priority queues (neighborhood
/// always drains first, matching the hybrid policy's stated priority) and
/// the cache + storage backend it populates.
pub struct Prefetcher {
    strategy: PrefetchStrategy,
    beam_history: BeamHistory,
    high_tx: mpsc::UnboundedSender<PrefetchRequest>,
    low_tx: mpsc::UnboundedSender<PrefetchRequest>,
}

impl Prefetcher {
    pub fn new<B: StorageBackend + 'static>(
        strategy: PrefetchStrategy,
        cache: Arc<TieredCache<Noun>>,
        backend: Arc<B>,
    ) -> (Self, PrefetchWorker<B>) {
        let (high_tx, high_rx) = mpsc::unbounded_channel();
        let (low_tx, low_rx) = mpsc::unbounded_channel();
        let prefetcher = Self {
            strategy,
            beam_history: BeamHistory::default(),
            high_tx,
            low_tx,
        };
        let worker = PrefetchWorker {
            cache,
            backend,
            high_rx,
            low_rx,
        };
        (prefetcher, worker)
    }

    /// Called on a cache miss for `missed`, once its neighbours are known.
    pub fn on_miss(&self, missed: &Noun) {
        if matches!(
            self.strategy,
            PrefetchStrategy::Neighborhood | PrefetchStrategy::Hybrid
        ) {
            if let Some(level0) = missed.neighbours.get(&0) {
                let ids: Vec<NounId> = level0.iter().cloned().collect();
                if !ids.is_empty() {
                    let _ = self.high_tx.send(PrefetchRequest::Ids(ids));
                }
            }
        }
    }

    /// Called with the full set of node ids visited while answering a
    /// search, in traversal order.
    pub fn on_query_beam(&self, beam: Vec<NounId>) {
        if !matches!(
            self.strategy,
            PrefetchStrategy::QueryPath | PrefetchStrategy::Hybrid
        ) {
            return;
        }
        let downstream = self.beam_history.record_and_match(beam);
        if !downstream.is_empty() {
            let _ = self.low_tx.send(PrefetchRequest::Ids(downstream));
        }
    }
}

pub struct PrefetchWorker<B: StorageBackend> {
    cache: Arc<TieredCache<Noun>>,
    backend: Arc<B>,
    high_rx: mpsc::UnboundedReceiver<PrefetchRequest>,
    low_rx: mpsc::UnboundedReceiver<PrefetchRequest>,
}

impl<B: StorageBackend + 'static> PrefetchWorker<B> {
    /// Drains both queues until `guard` reports cancellation, fetching each
    /// batch with bounded concurrency and populating the cache.
    pub async fn run(mut self, guard: vex_task_manager::TaskManagerGuard) {
        loop {
            let request = tokio::select! {
                biased;
                _ = guard.is_cancelled() => break,
                Some(req) = self.high_rx.recv() => req,
                Some(req) = self.low_rx.recv() => req,
                else => break,
            };
            let PrefetchRequest::Ids(ids) = request;
            self.fetch_and_cache(ids).await;
        }
    }

    async fn fetch_and_cache(&self, ids: Vec<NounId>) {
        use futures::{stream, StreamExt};
        let fetched: Vec<Option<Noun>> = stream::iter(ids)
            .map(|id| async move { self.backend.get_noun(&id).await.ok().flatten() })
            .buffer_unordered(MAX_CONCURRENT_PREFETCH_GETS)
            .collect()
            .await;
        for noun in fetched.into_iter().flatten() {
            self.cache.put(noun.id.0.clone(), noun);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_prefix_returns_downstream() {
        let history = BeamHistory::default();
        let first = vec![
            NounId::from("a"),
            NounId::from("b"),
            NounId::from("c"),
            NounId::from("d"),
        ];
        history.record_and_match(first);

        let second = vec![NounId::from("a"), NounId::from("b"), NounId::from("x")];
        let downstream = history.record_and_match(second);
        assert_eq!(downstream, vec![NounId::from("c"), NounId::from("d")]);
    }

    #[test]
    fn no_shared_prefix_returns_empty() {
        let history = BeamHistory::default();
        history.record_and_match(vec![NounId::from("a"), NounId::from("b")]);
        let downstream = history.record_and_match(vec![NounId::from("z"), NounId::from("y")]);
        assert!(downstream.is_empty());
    }
}
