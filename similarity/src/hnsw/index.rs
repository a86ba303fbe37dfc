// Hierarchical Navigable Small Worlds establishes a localised list of
// closest nodes based on a distance function, then navigates between these
// localised lists layer by layer until it finds the neighbourhood it needs.
#![allow(dead_code)]
use crate::{
    DistanceFn,
    error::Error,
    hnsw::{HNSWConfig, MinHeapQueue},
};

use super::{LayerIndex, Node, NodeId, NodeIdHashSet, OrderedNode, VectorCodec, compute_node_level, get_node_id, node_pair_distance};
use crate::heap::BoundedMinHeap;

use papaya::HashSet;
use parking_lot::RwLock;
use smallvec::{SmallVec, smallvec};
use std::{
    cmp::{Reverse, min},
    hash::Hash,
    num::NonZeroUsize,
    sync::Arc,
    sync::atomic::{AtomicU8, Ordering},
};
use vex_types::Vector;

/// Nodes at this level or above keep full precision even when a quantizer
/// is configured; only layer-0-only nodes are ever stored as codes.
const HOT_LEVEL: u8 = 1;

/// HNSW represents a Hierarchical Navigable Small World graph over items
/// identified by an opaque, caller-facing key `K` (a noun or verb id).
///
/// The graph is organized into multiple layers. Each layer contains a set of
/// node ids, and each node holds its neighbours per layer along with its
/// embedding vector. A second concurrent map resolves `K` to the node id
/// assigned to it, so lookups and deletes by caller-facing key stay O(1)
/// without walking the graph.
///
/// Uses papaya's concurrent HashMap for lock-free concurrent read access to
/// nodes and graph layers. The entry point is protected by a parking_lot
/// RwLock, and the top-most layer uses an AtomicU8 for lock-free reads.
/// Concurrent reads (knn_search, search_layer) are lock-free; writes
/// (insert, delete) take the per-node papaya guards plus the entry-point
/// lock only around the brief window where the entry point itself changes.
#[derive(Debug)]
pub struct HNSW<D: DistanceFn, K> {
    pub ef_construction: usize,
    top_most_layer: AtomicU8,
    pub maximum_connections: usize,
    pub maximum_connections_zero: usize,
    pub inv_log_m: f64,

    graph: papaya::HashMap<LayerIndex, papaya::HashSet<NodeId>>,
    nodes: papaya::HashMap<NodeId, Node<K>>,
    /// Resolves a caller-facing key to the node id it currently owns.
    keys: papaya::HashMap<K, NodeId>,

    enter_point: RwLock<SmallVec<[NodeId; 1]>>,
    distance_algorithm: D,
    keep_pruned_connections: bool,
    extend_candidates: bool,
    /// When set, newly inserted nodes below [`HOT_LEVEL`] are stored as
    /// quantized codes instead of full-precision vectors.
    quantizer: RwLock<Option<Arc<dyn VectorCodec>>>,
}

impl<D: DistanceFn, K: Hash + Eq + Clone + Send + Sync> HNSW<D, K> {
    pub fn new(distance_algorithm: D) -> Self {
        Self::new_with_config(HNSWConfig::default(), distance_algorithm)
    }

    pub fn new_with_config(config: HNSWConfig, distance_algorithm: D) -> Self {
        assert!(config.maximum_connections > 1, "M must be > 1");

        Self {
            ef_construction: config.ef_construction,
            top_most_layer: AtomicU8::new(0),
            maximum_connections: config.maximum_connections,
            maximum_connections_zero: config.maximum_connections_zero,
            inv_log_m: 1.0 / (config.maximum_connections as f64).ln(),
            graph: papaya::HashMap::new(),
            nodes: papaya::HashMap::new(),
            keys: papaya::HashMap::new(),
            enter_point: RwLock::new(SmallVec::new()),
            distance_algorithm,
            keep_pruned_connections: config.keep_pruned_connections,
            extend_candidates: config.extend_candidates,
            quantizer: RwLock::new(None),
        }
    }

    /// Installs (or clears, via `None`) the codec used to compress nodes
    /// below [`HOT_LEVEL`] on every insert from this point forward.
    /// Previously inserted nodes keep whatever representation they were
    /// built with until reinserted.
    pub fn set_quantizer(&self, codec: Option<Arc<dyn VectorCodec>>) {
        *self.quantizer.write() = codec;
    }

    pub fn has_quantizer(&self) -> bool {
        self.quantizer.read().is_some()
    }

    pub fn top_layer(&self) -> u8 {
        self.top_most_layer.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.nodes.pin().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.keys.pin().contains_key(key)
    }

    pub fn get_vector(&self, key: &K) -> Option<Vector> {
        let keys = self.keys.pin();
        let node_id = keys.get(key)?;
        let codec = self.quantizer.read().clone();
        self.nodes
            .pin()
            .get(node_id)
            .map(|n| n.materialize(codec.as_deref()))
    }

    /// Insert or replace the item under `key` with a fresh embedding. When a
    /// quantizer is installed, the node is stored as a quantized code unless
    /// its deterministic level places it in the hot subset (`>= HOT_LEVEL`),
    /// which always keeps full precision.
    pub fn insert(&self, key: K, vector: Vector) -> Result<(), Error> {
        if self.keys.pin().contains_key(&key) {
            self.delete(&key);
        }
        let node_id = get_node_id(&key, vector.as_slice());
        let level = compute_node_level(&node_id, self.maximum_connections);
        let codec = self.quantizer.read().clone();
        let node = match &codec {
            Some(c) if level < HOT_LEVEL => Node::new_coded(key, &vector, c.as_ref()),
            _ => Node::new(key, vector.clone()),
        };
        self.insert_node(node, &vector)
    }

    /// Remove the item under `key`; returns whether anything was removed.
    pub fn delete(&self, key: &K) -> bool {
        let node_id = match self.keys.pin().get(key) {
            Some(id) => *id,
            None => return false,
        };
        self.delete_node(&node_id);
        self.keys.pin().remove(key);
        true
    }

    /// Insert a new element into the HNSW graph (Algorithm 1, INSERT).
    ///
    /// If an item with this key was already present it must be deleted
    /// first by the caller (see `insert`); `insert_node` itself only guards
    /// against the node-id already being occupied, which happens when the
    /// same key+vector pair is inserted twice.
    ///
    /// `query_vector` is always the full-precision embedding the caller
    /// started with, used for every distance computation during insertion
    /// regardless of how `value` ends up stored — quantization only affects
    /// what is kept resident afterwards, never how the graph is built.
    pub fn insert_node(&self, value: Node<K>, query_vector: &Vector) -> Result<(), Error> {
        let nodes = self.nodes.pin();
        let graph = self.graph.pin();
        let top_layer = self.top_most_layer.load(Ordering::Acquire);

        if nodes.contains_key(value.id()) {
            return Ok(());
        }

        let codec = self.quantizer.read().clone();
        let inital_ef = 1;
        let mut enter_point = self.enter_point.read().clone();
        let new_elements_lvl = value.level(self.maximum_connections);

        for level_current in (new_elements_lvl + 1..=top_layer).rev() {
            let nearest_neighbours = self.search_layer(
                query_vector,
                &enter_point,
                inital_ef,
                &LayerIndex(level_current as u16),
            )?;

            let nearest_ele = MinHeapQueue::from_nodes(
                nearest_neighbours
                    .iter()
                    .filter_map(|node_id| nodes.get(node_id)),
                query_vector,
                self.distance_algorithm,
                codec.clone(),
            )
            .pop()
            .map(|ele| ele.0.0)
            .ok_or(Error::NotFound("nearest element not found".to_string()))?;

            enter_point = smallvec![nearest_ele];
        }

        for level_current in (0..=min(top_layer, new_elements_lvl)).rev() {
            let layer_index = LayerIndex(level_current as u16);

            let nearest_neighbours = self.search_layer(
                query_vector,
                &enter_point,
                self.ef_construction,
                &layer_index,
            )?;

            let neighbours = self.select_neighbours_heuristic(
                query_vector,
                &nearest_neighbours,
                self.maximum_connections,
                &layer_index,
                self.extend_candidates,
                self.keep_pruned_connections,
            )?;

            let value_id = *value.id();
            for neighbour_id in neighbours.iter() {
                let neighbour_node = nodes
                    .get(neighbour_id)
                    .ok_or(Error::NotFound("neighbour ref not found".to_string()))?;

                neighbour_node.add_neighbour(layer_index, value_id);
                value.add_neighbour(layer_index, *neighbour_id);
            }

            graph
                .get_or_insert(layer_index, HashSet::from([value_id]))
                .pin()
                .insert(value_id);

            for neighbour in neighbours.iter() {
                let maximum_connections = if level_current == 0 {
                    self.maximum_connections_zero
                } else {
                    self.maximum_connections
                };

                let neighbour_node = nodes
                    .get(neighbour)
                    .ok_or(Error::NotFound("neighbour ref not found".to_string()))?;

                let nn_guard = neighbour_node.neighbours.pin();
                let e_conn = match nn_guard.get(&layer_index) {
                    Some(e_conn) => e_conn,
                    None => continue,
                };

                if e_conn.pin().len() > maximum_connections {
                    let e_conn_vec: Vec<NodeId> = e_conn.pin().iter().copied().collect();
                    let neighbour_vector = neighbour_node.materialize(codec.as_deref());
                    let new_neighbour_connections = self.select_neighbours_heuristic(
                        &neighbour_vector,
                        &e_conn_vec,
                        maximum_connections,
                        &layer_index,
                        false,
                        false,
                    )?;

                    neighbour_node
                        .neighbours
                        .pin()
                        .insert(layer_index, HashSet::from_iter(new_neighbour_connections));
                }
            }

            enter_point = match self.find_best_entry_point(query_vector, &nearest_neighbours)? {
                None => enter_point,
                Some(new_enter_point) => smallvec![new_enter_point],
            };
        }

        let value_id = *value.id();
        nodes.insert(*value.id(), value);
        self.keys.pin().insert(
            nodes
                .get(&value_id)
                .expect("just inserted")
                .key()
                .clone(),
            value_id,
        );

        {
            let mut ep = self.enter_point.write();
            let current_top = self.top_most_layer.load(Ordering::Acquire);
            if new_elements_lvl > current_top || nodes.len() == 1 {
                self.top_most_layer
                    .store(new_elements_lvl, Ordering::Release);
                *ep = smallvec![value_id];
            }
        }
        Ok(())
    }

    /// Search for `ef` nearest neighbours in a specific layer (Algorithm 2,
    /// SEARCH-LAYER).
    pub fn search_layer(
        &self,
        query: &Vector,
        entry_points: &[NodeId],
        ef: usize,
        layer: &LayerIndex,
    ) -> Result<Vec<NodeId>, Error> {
        let nodes = self.nodes.pin();
        let codec = self.quantizer.read().clone();
        let mut visited_items: NodeIdHashSet = entry_points.iter().copied().collect();

        let mut candidates = MinHeapQueue::from_nodes(
            entry_points.iter().filter_map(|id| nodes.get(id)),
            query,
            self.distance_algorithm,
            codec.clone(),
        );

        let ef_nonzero = NonZeroUsize::new(ef).unwrap_or(NonZeroUsize::new(1).unwrap());
        let mut nearest_neighbours: BoundedMinHeap<OrderedNode> = BoundedMinHeap::new(ef_nonzero);
        for node in entry_points.iter().filter_map(|id| nodes.get(id)) {
            let distance = node.distance_to(query.as_slice(), self.distance_algorithm, codec.as_deref());
            nearest_neighbours.push(OrderedNode((*node.id(), distance)));
        }

        while !candidates.is_empty() {
            let OrderedNode((nearest_id, nearest_dist)) =
                candidates.pop().ok_or(Error::QueueEmpty)?;

            if let Some(OrderedNode((_, furthest_dist))) = nearest_neighbours.peek() {
                if nearest_dist > *furthest_dist {
                    break;
                }
            }

            let visited_node = nodes
                .get(&nearest_id)
                .ok_or(Error::NotFound("node not found".to_string()))?;

            let vn_neighbours_guard = visited_node.neighbours.pin();
            if let Some(visited_node_neighbours) = vn_neighbours_guard.get(layer) {
                for neighbour_id in visited_node_neighbours.pin().iter() {
                    if visited_items.contains(neighbour_id) {
                        continue;
                    }
                    visited_items.insert(*neighbour_id);

                    let neighbour_node = nodes
                        .get(neighbour_id)
                        .ok_or(Error::NotFound("neighbour not found".to_string()))?;

                    let neighbour_dist =
                        neighbour_node.distance_to(query.as_slice(), self.distance_algorithm, codec.as_deref());

                    let should_add =
                        if let Some(OrderedNode((_, worst_dist))) = nearest_neighbours.peek() {
                            neighbour_dist < *worst_dist || nearest_neighbours.len() < ef
                        } else {
                            true
                        };

                    if should_add {
                        candidates.push(neighbour_node);
                        nearest_neighbours
                            .push(OrderedNode((*neighbour_node.id(), neighbour_dist)));
                    }
                }
            }
        }

        Ok(nearest_neighbours
            .iter()
            .map(|OrderedNode((node_id, _))| *node_id)
            .collect())
    }

    /// Select M neighbours using heuristic for diversity and pruning
    /// (Algorithm 4, SELECT-NEIGHBOURS-HEURISTIC).
    pub fn select_neighbours_heuristic(
        &self,
        query: &Vector,
        candidates: &[NodeId],
        m: usize,
        layer: &LayerIndex,
        extend_candidates: bool,
        keep_pruned_connections: bool,
    ) -> Result<Vec<NodeId>, Error> {
        let nodes = self.nodes.pin();
        let codec = self.quantizer.read().clone();

        let mut response =
            MinHeapQueue::from_nodes(std::iter::empty(), query, self.distance_algorithm, codec.clone());

        let mut working_queue = MinHeapQueue::from_nodes(
            candidates.iter().filter_map(|id| nodes.get(id)),
            query,
            self.distance_algorithm,
            codec.clone(),
        );

        if extend_candidates {
            for candidate in candidates.iter() {
                let candidate_node = nodes
                    .get(candidate)
                    .ok_or(Error::NotFound("node ref not found".to_string()))?;

                let cn_guard = candidate_node.neighbours.pin();
                let neighbours_at = match cn_guard.get(layer) {
                    Some(n) => n,
                    None => continue,
                };

                for neighbour_id in neighbours_at.pin().iter() {
                    if !working_queue.contains(neighbour_id) {
                        if let Some(neighbour_node) = nodes.get(neighbour_id) {
                            working_queue.push(neighbour_node);
                        }
                    }
                }
            }
        }

        let mut discarded_candidates =
            MinHeapQueue::from_nodes(std::iter::empty(), query, self.distance_algorithm, codec.clone());

        while !working_queue.is_empty() && response.len() < m {
            let OrderedNode((candidate_id, dist_to_query)) =
                working_queue.pop().ok_or(Error::QueueEmpty)?;

            if response.is_empty() {
                let node = nodes
                    .get(&candidate_id)
                    .ok_or(Error::NotFound("node ref not found".to_string()))?;
                response.push(node);
                continue;
            }

            let candidate_node = nodes
                .get(&candidate_id)
                .ok_or(Error::NotFound("node ref not found".to_string()))?;
            let mut is_diverse = true;
            for Reverse(OrderedNode((selected_id, _))) in response.heap.iter() {
                let selected_node = nodes
                    .get(selected_id)
                    .ok_or(Error::NotFound("selected node not found".to_string()))?;

                let dist_to_selected = node_pair_distance(
                    candidate_node,
                    selected_node,
                    self.distance_algorithm,
                    codec.as_deref(),
                );

                if dist_to_selected < dist_to_query {
                    is_diverse = false;
                    break;
                }
            }

            if is_diverse {
                response.push(candidate_node);
            } else {
                discarded_candidates.push(candidate_node);
            }
        }

        if keep_pruned_connections {
            while !discarded_candidates.is_empty() && response.len() < m {
                let OrderedNode((nearest_from_wd_to_q, _)) =
                    discarded_candidates.pop().ok_or(Error::QueueEmpty)?;

                let node = nodes
                    .get(&nearest_from_wd_to_q)
                    .ok_or(Error::NotFound("node ref not found".to_string()))?;
                response.push(node);
            }
        }

        Ok(response
            .heap
            .iter()
            .map(|Reverse(OrderedNode((node_id, _)))| *node_id)
            .collect::<Vec<NodeId>>())
    }

    /// K-nearest-neighbour search (Algorithm 5, K-NN-SEARCH).
    ///
    /// `ef` defaults to `max(k, 50)` when `None`; larger values improve
    /// recall at the cost of search time.
    pub fn knn_search(
        &self,
        query_vector: &Vector,
        k: usize,
        ef: Option<usize>,
    ) -> Result<Vec<(K, f32)>, Error> {
        if self.is_empty() {
            return Ok(Vec::new());
        }
        let nodes = self.nodes.pin();
        let codec = self.quantizer.read().clone();
        let valid_len = NonZeroUsize::new(k).ok_or(Error::NotFound("k must be non-zero".to_string()))?;

        let ef = ef.unwrap_or_else(|| k.max(50)).max(k);

        let (mut enter_point, ep_level) = {
            let ep = self.enter_point.read();
            (ep.clone(), self.top_most_layer.load(Ordering::Acquire))
        };

        for level_current in (1..=ep_level).rev() {
            let layer = LayerIndex(level_current as u16);
            let searched = self.search_layer(query_vector, &enter_point, 1, &layer)?;
            let ep = MinHeapQueue::from_nodes(
                searched.iter().filter_map(|id| nodes.get(id)),
                query_vector,
                self.distance_algorithm,
                codec.clone(),
            )
            .peek()
            .map(|OrderedNode((node_id, _))| *node_id)
            .ok_or(Error::QueueEmpty)?;
            enter_point = smallvec![ep];
        }

        let level_zero = self.search_layer(query_vector, &enter_point, ef, &LayerIndex(0))?;
        let mut current_nearest_elements = MinHeapQueue::from_nodes(
            level_zero.iter().filter_map(|id| nodes.get(id)),
            query_vector,
            self.distance_algorithm,
            codec,
        );

        Ok(current_nearest_elements
            .pop_n(valid_len)
            .into_iter()
            .filter_map(|OrderedNode((node_id, dist))| {
                nodes.get(&node_id).map(|n| (n.key().clone(), dist))
            })
            .collect())
    }

    /// Delete a single element from the HNSW graph by its internal node id,
    /// fixing up back-links on every referring neighbour.
    pub fn delete_node(&self, node_id: &NodeId) {
        let nodes = self.nodes.pin();
        let graph = self.graph.pin();

        if let Some(node) = nodes.get(node_id) {
            for backlink in &node.back_links.pin() {
                let related = match nodes.get(backlink) {
                    Some(r) => r,
                    None => continue,
                };

                let guard = related.neighbours.pin();
                for layer_index in guard.keys() {
                    if let Some(set) = guard.get(layer_index) {
                        set.pin().remove(node_id);
                    }
                    if let Some(layer_set) = graph.get(layer_index) {
                        layer_set.pin().remove(node_id);
                    }
                }
                related.back_links.pin().remove(node_id);
            }

            nodes.remove(node_id);
        }
    }

    fn find_best_entry_point(
        &self,
        query: &Vector,
        candidates: &[NodeId],
    ) -> Result<Option<NodeId>, Error> {
        let nodes = self.nodes.pin();
        let codec = self.quantizer.read().clone();

        if candidates.is_empty() {
            Ok(None)
        } else {
            let enter_point = MinHeapQueue::from_nodes(
                candidates.iter().filter_map(|node_id| nodes.get(node_id)),
                query,
                self.distance_algorithm,
                codec,
            )
            .pop()
            .map(|OrderedNode((node_id, _))| node_id)
            .ok_or(Error::NotFound("nearest element not found".to_string()))?;

            Ok(Some(enter_point))
        }
    }

    #[cfg(test)]
    fn get_node(&self, id: &NodeId) -> Option<Node<K>> {
        self.nodes.pin().get(id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LinearAlgorithm;

    fn vector(values: &[f32]) -> Vector {
        Vector::new(values.to_vec())
    }

    #[test]
    fn insert_then_search_finds_nearest() {
        let hnsw: HNSW<LinearAlgorithm, String> = HNSW::new(LinearAlgorithm::EuclideanDistance);
        hnsw.insert("near".to_string(), vector(&[0.0])).unwrap();
        hnsw.insert("far".to_string(), vector(&[10.0])).unwrap();

        let results = hnsw.knn_search(&vector(&[1.0]), 1, Some(10)).unwrap();
        assert_eq!(results[0].0, "near");
    }

    #[test]
    fn distinct_keys_with_identical_vectors_both_survive() {
        let hnsw: HNSW<LinearAlgorithm, String> = HNSW::new(LinearAlgorithm::EuclideanDistance);
        hnsw.insert("a".to_string(), vector(&[1.0, 2.0])).unwrap();
        hnsw.insert("b".to_string(), vector(&[1.0, 2.0])).unwrap();

        assert_eq!(hnsw.len(), 2, "identical embeddings must not collide");
        assert!(hnsw.contains_key(&"a".to_string()));
        assert!(hnsw.contains_key(&"b".to_string()));
    }

    #[test]
    fn delete_removes_back_links() {
        let hnsw: HNSW<LinearAlgorithm, String> = HNSW::new(LinearAlgorithm::EuclideanDistance);
        hnsw.insert("a".to_string(), vector(&[0.0])).unwrap();
        hnsw.insert("b".to_string(), vector(&[1.0])).unwrap();

        let b_id = *hnsw
            .get_node(&crate::hnsw::get_node_id(&"b".to_string(), &[1.0]))
            .unwrap()
            .id();
        assert!(hnsw.delete(&"b".to_string()));
        assert!(!hnsw.contains_key(&"b".to_string()));

        let a_id = crate::hnsw::get_node_id(&"a".to_string(), &[0.0]);
        let a_node = hnsw.get_node(&a_id).unwrap();
        assert!(
            a_node
                .neighbours
                .pin()
                .iter()
                .all(|(_, s)| !s.pin().contains(&b_id))
        );
    }

    #[test]
    fn level_assignment_is_deterministic() {
        let key = "stable".to_string();
        let vec = vector(&[1.0, 2.0, 3.0]);
        let node1 = Node::new(key.clone(), vec.clone());
        let node2 = Node::new(key, vec);

        assert_eq!(node1.id(), node2.id());
        assert_eq!(node1.level(16), node2.level(16));
    }

    #[test]
    fn reinsert_under_same_key_replaces_vector() {
        let hnsw: HNSW<LinearAlgorithm, String> = HNSW::new(LinearAlgorithm::EuclideanDistance);
        hnsw.insert("a".to_string(), vector(&[0.0])).unwrap();
        hnsw.insert("a".to_string(), vector(&[5.0])).unwrap();

        assert_eq!(hnsw.len(), 1);
        assert_eq!(
            hnsw.get_vector(&"a".to_string()).unwrap().as_slice(),
            &[5.0]
        );
    }

    #[test]
    fn knn_search_on_empty_index_returns_empty() {
        let hnsw: HNSW<LinearAlgorithm, String> = HNSW::new(LinearAlgorithm::EuclideanDistance);
        let results = hnsw.knn_search(&vector(&[1.0]), 5, None).unwrap();
        assert!(results.is_empty());
    }
}
