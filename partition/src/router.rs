//! Routes an item to a partition. Hash routing is uniform load with no
//! locality; semantic routes to the nearest of a small set of trained
//! centroids so a query can fan out to only the closest few; hybrid is
//! semantic for the bulk plus a catch-all hash partition for outliers (points
//! far from every centroid).
use vex_similarity::distance::squared_euclidean_distance;
use vex_types::{PartitionConfig, PartitionStrategy, Vector};

/// How far a vector has to be from its nearest centroid (relative to the
/// average inter-centroid spacing) before hybrid routing treats it as an
/// outlier and sends it to the catch-all partition instead.
const OUTLIER_THRESHOLD: f32 = 2.0;

pub struct PartitionRouter {
    strategy: PartitionStrategy,
    partition_count: usize,
    centroids: Vec<Vector>,
}

impl PartitionRouter {
    pub fn hash(partition_count: usize) -> Self {
        Self {
            strategy: PartitionStrategy::Hash,
            partition_count: partition_count.max(1),
            centroids: Vec::new(),
        }
    }

    /// `centroids.len()` partitions are dedicated to semantic clusters; a
    /// hybrid router gets one additional trailing catch-all partition.
    pub fn semantic(centroids: Vec<Vector>) -> Self {
        let partition_count = centroids.len().max(1);
        Self {
            strategy: PartitionStrategy::Semantic,
            partition_count,
            centroids,
        }
    }

    pub fn hybrid(centroids: Vec<Vector>) -> Self {
        let partition_count = centroids.len() + 1;
        Self {
            strategy: PartitionStrategy::Hybrid,
            partition_count,
            centroids,
        }
    }

    pub fn from_config(config: &PartitionConfig, centroids: Vec<Vector>) -> Self {
        match config.strategy {
            PartitionStrategy::Hash => Self::hash(config.max_nodes_per_partition.max(1)),
            PartitionStrategy::Semantic => Self::semantic(centroids),
            PartitionStrategy::Hybrid => Self::hybrid(centroids),
        }
    }

    pub fn partition_count(&self) -> usize {
        self.partition_count
    }

    pub fn catch_all_partition(&self) -> Option<usize> {
        matches!(self.strategy, PartitionStrategy::Hybrid).then(|| self.partition_count - 1)
    }

    /// Picks a partition for an item keyed by `key_hash` (used by hash
    /// routing) whose embedding is `vector` (used by semantic/hybrid
    /// routing).
    pub fn route(&self, key_hash: u64, vector: &[f32]) -> usize {
        match self.strategy {
            PartitionStrategy::Hash => (key_hash as usize) % self.partition_count,
            PartitionStrategy::Semantic => self.nearest_centroid(vector),
            PartitionStrategy::Hybrid => {
                let (nearest, distance) = self.nearest_centroid_with_distance(vector);
                if self.is_outlier(distance) {
                    self.catch_all_partition().unwrap_or(nearest)
                } else {
                    nearest
                }
            }
        }
    }

    /// Ranks partitions by predicted relevance for a query: centroid
    /// distance ascending for semantic/hybrid, all equally ranked for hash.
    pub fn rank_partitions(&self, query: &[f32]) -> Vec<(usize, f32)> {
        match self.strategy {
            PartitionStrategy::Hash => (0..self.partition_count).map(|p| (p, 0.0)).collect(),
            PartitionStrategy::Semantic | PartitionStrategy::Hybrid => {
                let mut ranked: Vec<(usize, f32)> = self
                    .centroids
                    .iter()
                    .enumerate()
                    .map(|(i, c)| (i, squared_euclidean_distance(query, c.as_slice())))
                    .collect();
                ranked.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
                if let Some(catch_all) = self.catch_all_partition() {
                    ranked.push((catch_all, f32::INFINITY));
                }
                ranked
            }
        }
    }

    fn nearest_centroid(&self, vector: &[f32]) -> usize {
        self.nearest_centroid_with_distance(vector).0
    }

    fn nearest_centroid_with_distance(&self, vector: &[f32]) -> (usize, f32) {
        self.centroids
            .iter()
            .enumerate()
            .map(|(i, c)| (i, squared_euclidean_distance(vector, c.as_slice())))
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .unwrap_or((0, 0.0))
    }

    fn is_outlier(&self, distance: f32) -> bool {
        if self.centroids.len() < 2 {
            return false;
        }
        let mean_spacing = self.mean_centroid_spacing();
        mean_spacing > 0.0 && distance > mean_spacing * OUTLIER_THRESHOLD
    }

    fn mean_centroid_spacing(&self) -> f32 {
        if self.centroids.len() < 2 {
            return 0.0;
        }
        let mut total = 0.0;
        let mut pairs = 0;
        for i in 0..self.centroids.len() {
            for j in (i + 1)..self.centroids.len() {
                total +=
                    squared_euclidean_distance(self.centroids[i].as_slice(), self.centroids[j].as_slice())
                        .sqrt();
                pairs += 1;
            }
        }
        if pairs == 0 {
            0.0
        } else {
            total / pairs as f32
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_routing_is_stable_for_same_hash() {
        let router = PartitionRouter::hash(4);
        assert_eq!(router.route(10, &[]), router.route(10, &[]));
    }

    #[test]
    fn semantic_routing_picks_nearest_centroid() {
        let router = PartitionRouter::semantic(vec![
            Vector::new(vec![0.0, 0.0]),
            Vector::new(vec![100.0, 100.0]),
        ]);
        assert_eq!(router.route(0, &[1.0, 1.0]), 0);
        assert_eq!(router.route(0, &[99.0, 99.0]), 1);
    }

    #[test]
    fn hybrid_routes_outliers_to_catch_all() {
        let router = PartitionRouter::hybrid(vec![
            Vector::new(vec![0.0, 0.0]),
            Vector::new(vec![1.0, 1.0]),
        ]);
        let catch_all = router.catch_all_partition().unwrap();
        assert_eq!(router.route(0, &[1000.0, 1000.0]), catch_all);
    }
}
