//! Fans a query out to the partitions the router thinks are relevant, bounds
//! the fan-out with a global timeout, and merges what comes back. Mirrors the
//! teacher's own use of `tokio_util::sync::CancellationToken` for
//! "stop whatever hasn't finished, keep what has" shutdown semantics, applied
//! here per-search instead of per-process.
use std::collections::HashSet;
use std::hash::Hash;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use vex_similarity::hnsw::index::HNSW;
use vex_similarity::DistanceFn;
use vex_types::{CoordinatorConfig, Error, SearchStrategy, Vector};

use crate::router::PartitionRouter;

fn select_partitions(ranked: &[(usize, f32)], config: &CoordinatorConfig) -> Vec<usize> {
    match config.strategy {
        SearchStrategy::Exhaustive => ranked.iter().map(|(p, _)| *p).collect(),
        SearchStrategy::TopT => ranked
            .iter()
            .take(config.top_t.min(config.max_partitions).max(1))
            .map(|(p, _)| *p)
            .collect(),
        SearchStrategy::Adaptive => {
            let Some(&(first_partition, first_distance)) = ranked.first() else {
                return Vec::new();
            };
            let threshold = first_distance.max(f32::EPSILON) * config.adaptive_distance_multiple as f32;
            let mut selected = vec![first_partition];
            for &(partition, distance) in ranked.iter().skip(1) {
                if selected.len() >= config.max_partitions {
                    break;
                }
                if distance > threshold {
                    break;
                }
                selected.push(partition);
            }
            selected
        }
    }
}

/// Runs the distributed search described in the partition manager's
/// fan-out/merge contract: rank, select T partitions, search them
/// concurrently (bounded by `max_concurrent_searches`) each for
/// `k' = ceil(k * overfetch)`, apply a global timeout that cancels and
/// discards whatever hasn't returned, then merge/dedupe/sort/truncate to k.
pub async fn coordinate_search<D, K>(
    partitions: &[Arc<HNSW<D, K>>],
    router: &PartitionRouter,
    query: &Vector,
    k: usize,
    config: &CoordinatorConfig,
) -> Result<Vec<(K, f32)>, Error>
where
    D: DistanceFn + 'static,
    K: Hash + Eq + Clone + Send + Sync + 'static,
{
    if partitions.is_empty() || k == 0 {
        return Ok(Vec::new());
    }

    let ranked = router.rank_partitions(query.as_slice());
    let selected = select_partitions(&ranked, config);
    let k_prime = ((k as f64) * config.overfetch).ceil().max(1.0) as usize;

    let semaphore = Arc::new(Semaphore::new(config.max_concurrent_searches.max(1)));
    let token = CancellationToken::new();
    let mut set: JoinSet<Option<Vec<(K, f32)>>> = JoinSet::new();

    for partition_idx in selected {
        let Some(index) = partitions.get(partition_idx).cloned() else {
            continue;
        };
        let query = query.clone();
        let semaphore = semaphore.clone();
        let token = token.clone();
        set.spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok()?;
            if token.is_cancelled() {
                return None;
            }
            index.knn_search(&query, k_prime, None).ok()
        });
    }

    let deadline = config.timeout();
    let mut merged: Vec<(K, f32)> = Vec::new();
    let sleep = tokio::time::sleep(deadline);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            biased;
            _ = &mut sleep => {
                token.cancel();
                let dropped = set.len();
                set.abort_all();
                if dropped > 0 {
                    tracing::warn!(dropped, "distributed search timed out, discarding partial partitions");
                }
                break;
            }
            joined = set.join_next() => {
                match joined {
                    None => break,
                    Some(Ok(Some(results))) => merged.extend(results),
                    Some(Ok(None)) => {}
                    Some(Err(join_error)) if join_error.is_cancelled() => {}
                    Some(Err(join_error)) => {
                        tracing::warn!(error = %join_error, "partition search task panicked");
                    }
                }
            }
        }
    }

    merged.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
    let mut seen = HashSet::with_capacity(merged.len());
    merged.retain(|(key, _)| seen.insert(key.clone()));
    merged.truncate(k);
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(strategy: SearchStrategy) -> CoordinatorConfig {
        CoordinatorConfig {
            strategy,
            ..CoordinatorConfig::default()
        }
    }

    #[test]
    fn exhaustive_selects_every_ranked_partition() {
        let ranked = vec![(0, 1.0), (1, 2.0), (2, 3.0)];
        let selected = select_partitions(&ranked, &config(SearchStrategy::Exhaustive));
        assert_eq!(selected, vec![0, 1, 2]);
    }

    #[test]
    fn top_t_caps_at_configured_count() {
        let ranked = vec![(0, 1.0), (1, 2.0), (2, 3.0)];
        let mut cfg = config(SearchStrategy::TopT);
        cfg.top_t = 2;
        let selected = select_partitions(&ranked, &cfg);
        assert_eq!(selected, vec![0, 1]);
    }

    #[test]
    fn adaptive_stops_once_distance_exceeds_multiple_of_first() {
        let ranked = vec![(0, 1.0), (1, 1.5), (2, 100.0)];
        let mut cfg = config(SearchStrategy::Adaptive);
        cfg.adaptive_distance_multiple = 3.0;
        cfg.max_partitions = 8;
        let selected = select_partitions(&ranked, &cfg);
        assert_eq!(selected, vec![0, 1]);
    }

    #[test]
    fn adaptive_respects_max_partitions_bound() {
        let ranked = vec![(0, 1.0), (1, 1.0), (2, 1.0), (3, 1.0)];
        let mut cfg = config(SearchStrategy::Adaptive);
        cfg.max_partitions = 2;
        let selected = select_partitions(&ranked, &cfg);
        assert_eq!(selected.len(), 2);
    }
}
