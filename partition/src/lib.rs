//! Splits one logical index into `P` sub-indices so no single HNSW graph
//! grows past `max_nodes_per_partition`, and coordinates fanning a query out
//! across whichever subset of them the active strategy picks.
pub mod coordinator;
pub mod router;

use std::hash::Hash;
use std::sync::Arc;

use vex_similarity::hnsw::index::HNSW;
use vex_similarity::hnsw::HNSWConfig;
use vex_similarity::DistanceFn;
use vex_types::{CoordinatorConfig, Error, PartitionConfig, Vector};

pub use coordinator::coordinate_search;
pub use router::PartitionRouter;

/// Trains `k` centroids over `samples` with a fixed number of Lloyd
/// iterations, the same iterate-assign-then-average loop the optimized
/// index's product quantizer uses for its per-subvector codebooks, just
/// applied to whole vectors instead of chunks.
pub fn train_centroids(samples: &[Vector], k: usize) -> Vec<Vector> {
    let k = k.min(samples.len()).max(1);
    if samples.is_empty() {
        return Vec::new();
    }
    let dim = samples[0].dimension();
    let mut centroids: Vec<Vec<f32>> = samples
        .iter()
        .step_by((samples.len() / k).max(1))
        .take(k)
        .map(|v| v.as_slice().to_vec())
        .collect();
    while centroids.len() < k {
        centroids.push(vec![0.0; dim]);
    }

    for _ in 0..8 {
        let mut assignments = vec![0usize; samples.len()];
        for (i, sample) in samples.iter().enumerate() {
            assignments[i] = nearest(sample.as_slice(), &centroids);
        }

        let mut sums = vec![vec![0.0f32; dim]; centroids.len()];
        let mut counts = vec![0usize; centroids.len()];
        for (sample, &assignment) in samples.iter().zip(&assignments) {
            counts[assignment] += 1;
            for (s, &v) in sums[assignment].iter_mut().zip(sample.as_slice()) {
                *s += v;
            }
        }
        for (centroid, (sum, count)) in centroids.iter_mut().zip(sums.into_iter().zip(counts)) {
            if count > 0 {
                for (c, s) in centroid.iter_mut().zip(sum) {
                    *c = s / count as f32;
                }
            }
        }
    }

    centroids.into_iter().map(Vector::new).collect()
}

fn nearest(point: &[f32], centroids: &[Vec<f32>]) -> usize {
    centroids
        .iter()
        .enumerate()
        .map(|(i, c)| (i, vex_similarity::distance::squared_euclidean_distance(point, c)))
        .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// A globally-keyed index split across `P` sub-graphs. Ids stay unique
/// across partitions; `locations` remembers which partition owns a key so
/// deletes and updates don't have to probe every partition.
pub struct PartitionedIndex<D: DistanceFn, K> {
    partitions: Vec<Arc<HNSW<D, K>>>,
    router: PartitionRouter,
    locations: papaya::HashMap<K, usize>,
    config: PartitionConfig,
}

impl<D: DistanceFn, K: Hash + Eq + Clone + Send + Sync> PartitionedIndex<D, K> {
    pub fn new(
        config: PartitionConfig,
        hnsw_config: HNSWConfig,
        distance_algorithm: D,
        centroids: Vec<Vector>,
    ) -> Self {
        let router = PartitionRouter::from_config(&config, centroids);
        let partitions = (0..router.partition_count())
            .map(|_| Arc::new(HNSW::new_with_config(hnsw_config, distance_algorithm)))
            .collect();
        Self {
            partitions,
            router,
            locations: papaya::HashMap::new(),
            config,
        }
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    pub fn max_nodes_per_partition(&self) -> usize {
        self.config.max_nodes_per_partition
    }

    pub fn len(&self) -> usize {
        self.partitions.iter().map(|p| p.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Routes `key` to a partition by `key_hash` (hash strategy) and/or
    /// `vector` (semantic/hybrid strategy), and inserts it there.
    #[tracing::instrument(skip(self, vector))]
    pub fn insert(&self, key: K, key_hash: u64, vector: Vector) -> Result<(), Error> {
        let partition = self.router.route(key_hash, vector.as_slice());
        self.partitions[partition].insert(key.clone(), vector)?;
        self.locations.pin().insert(key, partition);
        Ok(())
    }

    pub fn delete(&self, key: &K) -> bool {
        let guard = self.locations.pin();
        let Some(&partition) = guard.get(key) else {
            return false;
        };
        let removed = self.partitions[partition].delete(key);
        guard.remove(key);
        removed
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.locations.pin().contains_key(key)
    }

    /// Ranks partitions by predicted relevance, selects however many the
    /// coordinator's strategy calls for, searches them concurrently bounded
    /// by `max_concurrent_searches`, and merges/dedupes/truncates to `k`.
    pub async fn search(
        &self,
        query: &Vector,
        k: usize,
        coordinator_config: &CoordinatorConfig,
    ) -> Result<Vec<(K, f32)>, Error>
    where
        D: 'static,
        K: 'static,
    {
        coordinate_search(&self.partitions, &self.router, query, k, coordinator_config).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vex_similarity::LinearAlgorithm;
    use vex_types::PartitionStrategy;

    fn hash_config(max_nodes: usize) -> PartitionConfig {
        PartitionConfig {
            max_nodes_per_partition: max_nodes,
            strategy: PartitionStrategy::Hash,
            semantic_clusters: 1,
        }
    }

    #[test]
    fn train_centroids_converges_to_cluster_means() {
        let samples = vec![
            Vector::new(vec![0.0, 0.0]),
            Vector::new(vec![0.1, 0.1]),
            Vector::new(vec![10.0, 10.0]),
            Vector::new(vec![10.1, 10.1]),
        ];
        let centroids = train_centroids(&samples, 2);
        assert_eq!(centroids.len(), 2);
        let near_origin = centroids
            .iter()
            .any(|c| c.as_slice()[0] < 1.0 && c.as_slice()[1] < 1.0);
        let near_ten = centroids
            .iter()
            .any(|c| c.as_slice()[0] > 9.0 && c.as_slice()[1] > 9.0);
        assert!(near_origin && near_ten);
    }

    #[test]
    fn insert_then_delete_removes_from_its_partition() {
        let index: PartitionedIndex<LinearAlgorithm, String> = PartitionedIndex::new(
            hash_config(4),
            HNSWConfig::default(),
            LinearAlgorithm::EuclideanDistance,
            Vec::new(),
        );
        index
            .insert("a".to_string(), 7, Vector::new(vec![1.0, 2.0]))
            .unwrap();
        assert!(index.contains_key(&"a".to_string()));
        assert_eq!(index.len(), 1);

        assert!(index.delete(&"a".to_string()));
        assert!(!index.contains_key(&"a".to_string()));
        assert_eq!(index.len(), 0);
    }

    #[tokio::test]
    async fn search_finds_inserted_vectors_across_partitions() {
        let index: PartitionedIndex<LinearAlgorithm, String> = PartitionedIndex::new(
            hash_config(4),
            HNSWConfig::default(),
            LinearAlgorithm::EuclideanDistance,
            Vec::new(),
        );
        for i in 0..20u64 {
            index
                .insert(format!("n{i}"), i, Vector::new(vec![i as f32, i as f32]))
                .unwrap();
        }

        let results = index
            .search(
                &Vector::new(vec![5.0, 5.0]),
                3,
                &CoordinatorConfig::default(),
            )
            .await
            .unwrap();
        assert_eq!(results.len(), 3);
        assert!(results.iter().any(|(id, _)| id == "n5"));
    }
}
