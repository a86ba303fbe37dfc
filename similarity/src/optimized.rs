//! Memory-reduced variant of the base HNSW index: vectors are quantized
//! before being stored in the graph, trading a small amount of recall for a
//! large reduction in resident memory. Mirrors the base index's external
//! shape (insert/delete/knn_search) so callers can switch between the two
//! without changing call sites, which is the same seam the teacher exposes
//! via `NonLinearAlgorithmWithIndexImpl`.

use crate::error::Error;
use crate::hnsw::index::HNSW;
use crate::hnsw::{HNSWConfig, VectorCodec};
use crate::DistanceFn;
use parking_lot::Mutex;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use vex_types::Vector;

/// 8-bit scalar quantizer: each component is linearly mapped from
/// `[min, max]` onto `0..=255`. Cheap to build, cheap to apply, and a
/// reasonable default when no training pass is practical.
#[derive(Debug, Clone)]
pub struct ScalarQuantizer {
    min: f32,
    max: f32,
}

impl ScalarQuantizer {
    pub fn train(samples: &[Vector]) -> Self {
        let mut min = f32::INFINITY;
        let mut max = f32::NEG_INFINITY;
        for sample in samples {
            for &v in sample.as_slice() {
                min = min.min(v);
                max = max.max(v);
            }
        }
        if !min.is_finite() || !max.is_finite() || min == max {
            return Self { min: -1.0, max: 1.0 };
        }
        Self { min, max }
    }

    pub fn encode(&self, vector: &[f32]) -> Vec<u8> {
        let scale = 255.0 / (self.max - self.min);
        vector
            .iter()
            .map(|&v| (((v - self.min) * scale).clamp(0.0, 255.0)) as u8)
            .collect()
    }

    pub fn decode(&self, codes: &[u8]) -> Vector {
        let scale = (self.max - self.min) / 255.0;
        let values: Vec<f32> = codes
            .iter()
            .map(|&c| self.min + (c as f32) * scale)
            .collect();
        Vector::new(values)
    }
}

impl VectorCodec for ScalarQuantizer {
    fn encode(&self, vector: &[f32]) -> Vec<u8> {
        self.encode(vector)
    }

    fn decode(&self, code: &[u8]) -> Vector {
        self.decode(code)
    }
}

/// Product quantizer: splits each vector into `n_subvectors` chunks and
/// k-means-clusters each chunk independently into `n_centroids` codewords,
/// giving an asymmetric-distance approximation that is far cheaper to store
/// than a full scalar encoding at the cost of additional training time.
#[derive(Debug, Clone)]
pub struct ProductQuantizer {
    n_subvectors: usize,
    n_centroids: usize,
    /// `codebooks[subvector][centroid]` is the centroid vector for that chunk.
    codebooks: Vec<Vec<Vec<f32>>>,
}

impl ProductQuantizer {
    /// Trains codebooks via a small fixed number of Lloyd iterations per
    /// subvector. Deliberately simple (no kd-tree acceleration) since this
    /// runs once at index-build time, not on the query hot path.
    pub fn train(samples: &[Vector], n_subvectors: usize, n_centroids: usize) -> Option<Self> {
        let dim = samples.first()?.dimension();
        if dim % n_subvectors != 0 || samples.is_empty() {
            return None;
        }
        let chunk_size = dim / n_subvectors;
        let mut codebooks = Vec::with_capacity(n_subvectors);

        for sub in 0..n_subvectors {
            let start = sub * chunk_size;
            let end = start + chunk_size;
            let chunks: Vec<&[f32]> = samples.iter().map(|s| &s.as_slice()[start..end]).collect();
            codebooks.push(Self::train_chunk(&chunks, n_centroids, chunk_size));
        }

        Some(Self {
            n_subvectors,
            n_centroids,
            codebooks,
        })
    }

    fn train_chunk(chunks: &[&[f32]], n_centroids: usize, chunk_size: usize) -> Vec<Vec<f32>> {
        let k = n_centroids.min(chunks.len()).max(1);
        let mut centroids: Vec<Vec<f32>> = chunks
            .iter()
            .step_by((chunks.len() / k).max(1))
            .take(k)
            .map(|c| c.to_vec())
            .collect();
        while centroids.len() < n_centroids {
            centroids.push(vec![0.0; chunk_size]);
        }

        for _ in 0..8 {
            let mut assignments = vec![0usize; chunks.len()];
            for (i, chunk) in chunks.iter().enumerate() {
                assignments[i] = Self::nearest_centroid(chunk, &centroids);
            }

            let mut sums = vec![vec![0.0f32; chunk_size]; centroids.len()];
            let mut counts = vec![0usize; centroids.len()];
            for (chunk, &assignment) in chunks.iter().zip(&assignments) {
                counts[assignment] += 1;
                for (s, &v) in sums[assignment].iter_mut().zip(chunk.iter()) {
                    *s += v;
                }
            }
            for (centroid, (sum, count)) in centroids.iter_mut().zip(sums.into_iter().zip(counts))
            {
                if count > 0 {
                    for (c, s) in centroid.iter_mut().zip(sum) {
                        *c = s / count as f32;
                    }
                }
            }
        }

        centroids
    }

    fn nearest_centroid(chunk: &[f32], centroids: &[Vec<f32>]) -> usize {
        centroids
            .iter()
            .enumerate()
            .map(|(i, c)| (i, crate::distance::squared_euclidean_distance(chunk, c)))
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(i, _)| i)
            .unwrap_or(0)
    }

    pub fn encode(&self, vector: &[f32]) -> Vec<u8> {
        let chunk_size = vector.len() / self.n_subvectors;
        (0..self.n_subvectors)
            .map(|sub| {
                let chunk = &vector[sub * chunk_size..(sub + 1) * chunk_size];
                Self::nearest_centroid(chunk, &self.codebooks[sub]) as u8
            })
            .collect()
    }

    pub fn decode(&self, codes: &[u8]) -> Vector {
        let mut values = Vec::new();
        for (sub, &code) in codes.iter().enumerate() {
            values.extend_from_slice(&self.codebooks[sub][code as usize]);
        }
        Vector::new(values)
    }

    pub fn n_centroids(&self) -> usize {
        self.n_centroids
    }
}

impl VectorCodec for ProductQuantizer {
    fn encode(&self, vector: &[f32]) -> Vec<u8> {
        self.encode(vector)
    }

    fn decode(&self, code: &[u8]) -> Vector {
        self.decode(code)
    }
}

/// Adaptive `ef_search`: tracks an exponential moving average of recent
/// search latency and nudges `ef` up or down to hold it near a target.
pub struct AdaptiveEf {
    current: AtomicU64,
    ema_micros: Mutex<f64>,
    target_micros: f64,
    floor: usize,
    ceiling: usize,
}

impl AdaptiveEf {
    pub fn new(initial: usize, floor: usize, ceiling: usize, target_micros: f64) -> Self {
        Self {
            current: AtomicU64::new(initial as u64),
            ema_micros: Mutex::new(target_micros),
            target_micros,
            floor,
            ceiling,
        }
    }

    pub fn current(&self) -> usize {
        self.current.load(Ordering::Relaxed) as usize
    }

    /// Folds in a fresh latency sample and adjusts `ef` for next time.
    pub fn record(&self, elapsed_micros: f64) {
        const ALPHA: f64 = 0.2;
        let mut ema = self.ema_micros.lock();
        *ema = ALPHA * elapsed_micros + (1.0 - ALPHA) * *ema;

        let current = self.current.load(Ordering::Relaxed) as usize;
        let adjusted = if *ema > self.target_micros * 1.2 {
            current.saturating_sub((current / 10).max(1))
        } else if *ema < self.target_micros * 0.8 {
            current + (current / 10).max(1)
        } else {
            current
        };
        self.current.store(
            adjusted.clamp(self.floor, self.ceiling) as u64,
            Ordering::Relaxed,
        );
    }
}

/// Optimized index: a base HNSW graph that, once a quantizer is trained,
/// stores layer-0-only vectors as compact codes and keeps full precision
/// only for the hot subset that also appears at level >= 1 — plus an
/// adaptive `ef_search`. Distances against a coded node are computed
/// directly between the raw float query and that node's decoded code
/// (asymmetric distance computation); the code itself is what the
/// `storage`/`cache` crates page to disk, never a dequantized vector.
pub struct OptimizedIndex<D: DistanceFn, K> {
    base: HNSW<D, K>,
    adaptive_ef: AdaptiveEf,
}

impl<D: DistanceFn, K: Hash + Eq + Clone + Send + Sync> OptimizedIndex<D, K> {
    pub fn new(config: HNSWConfig, distance_algorithm: D, ef_search: usize) -> Self {
        Self {
            base: HNSW::new_with_config(config, distance_algorithm),
            adaptive_ef: AdaptiveEf::new(ef_search, ef_search / 4, ef_search * 8, 2_000.0),
        }
    }

    /// Trains an 8-bit scalar quantizer against a sample of existing
    /// vectors and installs it. From this point on, every insert whose
    /// deterministic level keeps it out of the hot subset is stored as a
    /// quantized code instead of a full-precision vector; previously
    /// inserted vectors keep whatever representation they already have
    /// until reinserted.
    pub fn retrain_scalar_quantizer(&self, samples: &[Vector]) {
        self.base
            .set_quantizer(Some(Arc::new(ScalarQuantizer::train(samples))));
    }

    /// Trains a product quantizer the same way as
    /// [`Self::retrain_scalar_quantizer`], for a coarser but more
    /// recall-accurate code at the same byte budget. Leaves the previously
    /// installed quantizer in place if `samples` can't be split evenly into
    /// `n_subvectors` chunks.
    pub fn retrain_product_quantizer(&self, samples: &[Vector], n_subvectors: usize, n_centroids: usize) {
        if let Some(pq) = ProductQuantizer::train(samples, n_subvectors, n_centroids) {
            self.base.set_quantizer(Some(Arc::new(pq)));
        }
    }

    pub fn clear_quantizer(&self) {
        self.base.set_quantizer(None);
    }

    pub fn has_quantizer(&self) -> bool {
        self.base.has_quantizer()
    }

    pub fn insert(&self, key: K, vector: Vector) -> Result<(), Error> {
        self.base.insert(key, vector)
    }

    pub fn delete(&self, key: &K) -> bool {
        self.base.delete(key)
    }

    pub fn knn_search(&self, query: &Vector, k: usize) -> Result<Vec<(K, f32)>, Error> {
        let started = std::time::Instant::now();
        let ef = self.adaptive_ef.current();
        let result = self.base.knn_search(query, k, Some(ef));
        self.adaptive_ef
            .record(started.elapsed().as_micros() as f64);
        result
    }

    pub fn len(&self) -> usize {
        self.base.len()
    }

    pub fn is_empty(&self) -> bool {
        self.base.is_empty()
    }

    pub fn current_ef_search(&self) -> usize {
        self.adaptive_ef.current()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_quantizer_roundtrips_within_tolerance() {
        let samples = vec![Vector::new(vec![0.0, 5.0]), Vector::new(vec![10.0, -5.0])];
        let q = ScalarQuantizer::train(&samples);
        let encoded = q.encode(&[5.0, 0.0]);
        let decoded = q.decode(&encoded);
        for (a, b) in decoded.as_slice().iter().zip([5.0, 0.0].iter()) {
            assert!((a - b).abs() < 1.0, "expected {b}, got {a}");
        }
    }

    #[test]
    fn product_quantizer_trains_and_encodes() {
        let samples: Vec<Vector> = (0..16)
            .map(|i| Vector::new(vec![i as f32, (i * 2) as f32, (i * 3) as f32, (i * 4) as f32]))
            .collect();
        let pq = ProductQuantizer::train(&samples, 2, 4).unwrap();
        let codes = pq.encode(samples[0].as_slice());
        assert_eq!(codes.len(), 2);
        let decoded = pq.decode(&codes);
        assert_eq!(decoded.dimension(), 4);
    }

    #[test]
    fn adaptive_ef_shrinks_when_latency_is_high() {
        let ef = AdaptiveEf::new(100, 10, 1000, 1_000.0);
        for _ in 0..5 {
            ef.record(5_000.0);
        }
        assert!(ef.current() < 100);
    }

    #[test]
    fn optimized_index_insert_and_search() {
        use crate::LinearAlgorithm;
        let idx: OptimizedIndex<LinearAlgorithm, String> = OptimizedIndex::new(
            HNSWConfig::default(),
            LinearAlgorithm::EuclideanDistance,
            20,
        );
        idx.insert("a".to_string(), Vector::new(vec![0.0, 0.0]))
            .unwrap();
        idx.insert("b".to_string(), Vector::new(vec![9.0, 9.0]))
            .unwrap();

        let results = idx
            .knn_search(&Vector::new(vec![0.5, 0.5]), 1)
            .unwrap();
        assert_eq!(results[0].0, "a");
    }

    #[test]
    fn quantized_search_still_finds_the_nearer_point() {
        use crate::LinearAlgorithm;
        let idx: OptimizedIndex<LinearAlgorithm, String> = OptimizedIndex::new(
            HNSWConfig::default(),
            LinearAlgorithm::EuclideanDistance,
            20,
        );
        let samples = vec![
            Vector::new(vec![0.0, 0.0]),
            Vector::new(vec![9.0, 9.0]),
            Vector::new(vec![4.5, 4.5]),
        ];
        idx.retrain_scalar_quantizer(&samples);
        assert!(idx.has_quantizer());

        for (i, sample) in samples.into_iter().enumerate() {
            idx.insert(format!("p{i}"), sample).unwrap();
        }

        let results = idx.knn_search(&Vector::new(vec![0.5, 0.5]), 1).unwrap();
        assert_eq!(results[0].0, "p0");
    }
}
