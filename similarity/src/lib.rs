pub mod distance;
pub mod error;
pub mod heap;
pub mod hnsw;
pub mod optimized;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::num::NonZeroUsize;

/// The distance/similarity function a vector index is built against.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub enum LinearAlgorithm {
    EuclideanDistance,
    CosineSimilarity,
    DotProductSimilarity,
    ManhattanDistance,
}

impl DistanceFn for LinearAlgorithm {
    fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            LinearAlgorithm::EuclideanDistance => distance::euclidean_distance(a, b),
            LinearAlgorithm::CosineSimilarity => distance::cosine_similarity(a, b),
            LinearAlgorithm::DotProductSimilarity => distance::dot_product(a, b),
            LinearAlgorithm::ManhattanDistance => distance::manhattan_distance(a, b),
        }
    }

    /// Euclidean and Manhattan distance order ascending (closer = smaller);
    /// the two similarity measures order descending (closer = larger), so
    /// search code that wants "closer first" needs to know which way to sort.
    fn closer_is_smaller(&self) -> bool {
        matches!(
            self,
            LinearAlgorithm::EuclideanDistance | LinearAlgorithm::ManhattanDistance
        )
    }
}

/// A distance/similarity function over two equal-length vectors. `Copy` so
/// index structures can hold it by value and pass it freely across threads.
pub trait DistanceFn: Send + Sync + Copy {
    fn distance(&self, a: &[f32], b: &[f32]) -> f32;
    fn closer_is_smaller(&self) -> bool {
        true
    }
}

/// A non-linear (graph- or tree-based) index keyed by an opaque external
/// identifier `K`, used wherever an index needs to resolve caller-facing ids
/// rather than raw vectors.
pub trait NonLinearIndex<K> {
    fn insert(&self, key: K, vector: vex_types::Vector) -> Result<(), error::Error>;
    fn delete(&self, key: &K) -> Result<bool, error::Error>;
    fn n_nearest(
        &self,
        reference_point: &[f32],
        n: NonZeroUsize,
        accept_list: Option<&HashSet<K>>,
    ) -> Result<Vec<(K, f32)>, error::Error>;
    fn size(&self) -> usize;
}
