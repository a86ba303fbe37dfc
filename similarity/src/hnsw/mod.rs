#![allow(dead_code)]

pub mod index;

/// Hierarchical Navigable Small Worlds establishes a localised list of
/// closest nodes based on a distance function, then navigates between these
/// localised lists layer by layer until it finds the neighbourhood it needs.
use crate::DistanceFn;
use papaya::{HashMap, HashSet};
use std::{cmp::Reverse, collections::BinaryHeap, hash::Hasher, num::NonZeroUsize, sync::Arc};
use vex_types::Vector;

/// A pass-through hasher for NodeId.
///
/// NodeId already contains a well-distributed hash (computed via ahash), so
/// re-hashing it with SipHash in std::collections::HashSet is wasted work.
/// This hasher just passes the u64 through directly.
#[derive(Default)]
pub(crate) struct PassThroughHasher(u64);

impl Hasher for PassThroughHasher {
    #[inline]
    fn write_u64(&mut self, n: u64) {
        self.0 = n;
    }

    #[inline]
    fn write(&mut self, _bytes: &[u8]) {
        unreachable!("PassThroughHasher only supports write_u64");
    }

    #[inline]
    fn finish(&self) -> u64 {
        self.0
    }
}

pub(crate) type NodeIdBuildHasher = std::hash::BuildHasherDefault<PassThroughHasher>;
pub(crate) type NodeIdHashSet = std::collections::HashSet<NodeId, NodeIdBuildHasher>;

/// Wrapper around u16 representing a layer in HNSW.
#[derive(Debug, Clone, Copy, PartialEq, Hash)]
pub struct LayerIndex(pub u16);

impl Eq for LayerIndex {}

impl PartialOrd for LayerIndex {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for LayerIndex {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&(other.0))
    }
}

/// NodeId wraps a u64 hash of the node's external key and embedding, used to
/// uniquely identify a node across all layers.
///
/// Hashing the external key alongside the embedding (rather than the
/// embedding alone) keeps distinct items that happen to share a vector from
/// colliding onto the same node — two people with an identical embedding
/// must still be two nouns in the graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u64);

/// Compute deterministic node id from an external key and its embedding.
pub fn get_node_id<K: std::hash::Hash>(key: &K, value: &[f32]) -> NodeId {
    use ahash::RandomState;
    use std::hash::{BuildHasher, Hash};
    // Fixed seed so the id is deterministic across restarts and platforms.
    let mut hasher = RandomState::with_seeds(0, 0, 0, 0).build_hasher();
    key.hash(&mut hasher);
    for element in value.iter() {
        hasher.write_u32(element.to_bits());
    }
    NodeId(hasher.finish())
}

/// Encodes a full-precision embedding into a compact code and reconstructs
/// an approximate embedding back from it. Implemented by the scalar and
/// product quantizers in `crate::optimized`.
pub trait VectorCodec: std::fmt::Debug + Send + Sync {
    fn encode(&self, vector: &[f32]) -> Vec<u8>;
    fn decode(&self, code: &[u8]) -> Vector;
}

/// Compute deterministic level for a node based on its id hash.
///
/// Uses exponential distribution: P(level >= l) ≈ (1/M)^l. This ensures a
/// hierarchical structure with exponentially fewer nodes at higher levels,
/// and since the id is content-derived, levels survive serialization.
pub(crate) fn compute_node_level(node_id: &NodeId, m: usize) -> u8 {
    let inv_log_m = 1.0 / (m as f64).ln();
    let hash_bits = node_id.0;
    let uniform_bits = hash_bits & ((1u64 << 53) - 1);
    let unif: f64 = (uniform_bits as f64) / ((1u64 << 53) as f64);
    let adjusted_unif = if unif < 1e-10 { 1e-10 } else { unif };
    let level = (-adjusted_unif.ln() * inv_log_m).floor();
    level.min(255.0) as u8
}

/// How a node's embedding is actually stored: full precision, or a compact
/// quantized code that must be decoded through a [`VectorCodec`] before it
/// can be compared against anything.
#[derive(Debug, Clone)]
enum NodeValue {
    Full(Vector),
    Coded(Vec<u8>),
}

/// A single element in the HNSW graph: its content-derived id, the
/// caller-facing key it was inserted under, its embedding (full precision or
/// quantized), its per-layer neighbour sets, and the back-links used to
/// maintain the graph on delete.
#[derive(Debug, Clone)]
pub struct Node<K> {
    id: NodeId,
    key: K,
    value: NodeValue,
    neighbours: HashMap<LayerIndex, HashSet<NodeId>>,
    back_links: HashSet<NodeId>,
}

impl<K: std::hash::Hash + Clone> Node<K> {
    pub fn new(key: K, value: Vector) -> Self {
        let id = get_node_id(&key, value.as_slice());
        Self {
            id,
            key,
            value: NodeValue::Full(value),
            neighbours: HashMap::new(),
            back_links: HashSet::with_capacity(1),
        }
    }

    /// Like [`Node::new`], but stores `codec.encode(value)` in place of the
    /// raw embedding. `value` still drives the node's id and level, so a
    /// coded node and a full one built from the same key+vector land on the
    /// same id.
    pub fn new_coded(key: K, value: &Vector, codec: &dyn VectorCodec) -> Self {
        let id = get_node_id(&key, value.as_slice());
        Self {
            id,
            key,
            value: NodeValue::Coded(codec.encode(value.as_slice())),
            neighbours: HashMap::new(),
            back_links: HashSet::with_capacity(1),
        }
    }

    pub fn level(&self, m: usize) -> u8 {
        compute_node_level(&self.id, m)
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn is_coded(&self) -> bool {
        matches!(self.value, NodeValue::Coded(_))
    }

    /// Reconstructs this node's embedding at full precision. `codec` is
    /// required (and used) only when the node stores a quantized code;
    /// passing `None` for a coded node panics, since that would mean the
    /// index lost track of the quantizer a coded node was built with.
    pub fn materialize(&self, codec: Option<&dyn VectorCodec>) -> Vector {
        match &self.value {
            NodeValue::Full(v) => v.clone(),
            NodeValue::Coded(code) => codec
                .expect("coded node requires a codec to materialize")
                .decode(code),
        }
    }

    /// Distance from this node to a raw query vector, decoding through
    /// `codec` first when this node's embedding is quantized.
    pub fn distance_to<D: DistanceFn>(&self, query: &[f32], algo: D, codec: Option<&dyn VectorCodec>) -> f32 {
        match &self.value {
            NodeValue::Full(v) => algo.distance(v.as_slice(), query),
            NodeValue::Coded(code) => {
                let decoded = codec
                    .expect("coded node requires a codec to materialize")
                    .decode(code);
                algo.distance(decoded.as_slice(), query)
            }
        }
    }

    pub fn add_neighbour(&self, layer: LayerIndex, neighbour: NodeId) {
        let guard = self.neighbours.pin();
        let set = guard.get_or_insert_with(layer, HashSet::new);
        set.pin().insert(neighbour);
    }

    pub fn remove_neighbour(&self, layer: LayerIndex, neighbour: NodeId) {
        let guard = self.neighbours.pin();
        if let Some(set) = guard.get(&layer) {
            set.pin().remove(&neighbour);
        }
    }
}

/// Distance between two nodes, decoding through `codec` on whichever side
/// (or both) stores a quantized code rather than a full-precision vector.
pub(crate) fn node_pair_distance<K, D: DistanceFn>(
    a: &Node<K>,
    b: &Node<K>,
    algo: D,
    codec: Option<&dyn VectorCodec>,
) -> f32 {
    match (&a.value, &b.value) {
        (NodeValue::Full(va), _) => b.distance_to(va.as_slice(), algo, codec),
        (_, NodeValue::Full(vb)) => a.distance_to(vb.as_slice(), algo, codec),
        (NodeValue::Coded(_), NodeValue::Coded(_)) => {
            let decoded_a = a.materialize(codec);
            b.distance_to(decoded_a.as_slice(), algo, codec)
        }
    }
}

pub(crate) struct OrderedNode(pub(crate) (NodeId, f32));

impl PartialEq for OrderedNode {
    fn eq(&self, other: &Self) -> bool {
        ((self.0).0) == ((other.0).0)
    }
}

impl Eq for OrderedNode {}

impl PartialOrd for OrderedNode {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderedNode {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.0)
            .1
            .partial_cmp(&(other.0).1)
            .unwrap_or(std::cmp::Ordering::Less)
            .then_with(|| (self.0).0.cmp(&(other.0).0))
    }
}

pub(crate) struct MaxHeapQueue<F, K>
where
    F: DistanceFn,
{
    heap: BinaryHeap<OrderedNode>,
    distance_algorithm: F,
    query: Vector,
    codec: Option<Arc<dyn VectorCodec>>,
    _key: std::marker::PhantomData<K>,
}

impl<F: DistanceFn, K: std::hash::Hash + Clone> MaxHeapQueue<F, K> {
    fn from_nodes<'a>(
        nodes: impl Iterator<Item = &'a Node<K>>,
        query: &Vector,
        distance_algorithm: F,
        codec: Option<Arc<dyn VectorCodec>>,
    ) -> Self
    where
        K: 'a,
    {
        let heap = nodes
            .map(|node| {
                let similarity = node.distance_to(query.as_slice(), distance_algorithm, codec.as_deref());
                OrderedNode((node.id, similarity))
            })
            .collect::<BinaryHeap<_>>();
        Self {
            heap,
            distance_algorithm,
            query: query.clone(),
            codec,
            _key: std::marker::PhantomData,
        }
    }

    fn pop(&mut self) -> Option<OrderedNode> {
        self.heap.pop()
    }

    fn pop_n(&mut self, n: NonZeroUsize) -> Vec<OrderedNode> {
        (0..n.get()).filter_map(|_| self.heap.pop()).collect()
    }

    fn len(&self) -> usize {
        self.heap.len()
    }

    fn peek(&self) -> Option<&OrderedNode> {
        self.heap.peek()
    }

    fn push(&mut self, node: &Node<K>) {
        let distance = node.distance_to(self.query.as_slice(), self.distance_algorithm, self.codec.as_deref());
        let ordered = OrderedNode((node.id, distance));
        self.heap.push(ordered)
    }

    fn contains(&self, node_id: &NodeId) -> bool {
        self.heap.iter().any(|x| &(x.0.0) == node_id)
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

pub(crate) struct MinHeapQueue<F, K>
where
    F: DistanceFn,
{
    heap: BinaryHeap<Reverse<OrderedNode>>,
    distance_algorithm: F,
    query: Vector,
    codec: Option<Arc<dyn VectorCodec>>,
    _key: std::marker::PhantomData<K>,
}

impl<F: DistanceFn, K: std::hash::Hash + Clone> MinHeapQueue<F, K> {
    fn from_nodes<'a>(
        nodes: impl Iterator<Item = &'a Node<K>>,
        query: &Vector,
        distance_algorithm: F,
        codec: Option<Arc<dyn VectorCodec>>,
    ) -> Self
    where
        K: 'a,
    {
        let heap = nodes
            .map(|node| {
                let similarity = node.distance_to(query.as_slice(), distance_algorithm, codec.as_deref());
                Reverse(OrderedNode((node.id, similarity)))
            })
            .collect::<BinaryHeap<_>>();
        Self {
            heap,
            distance_algorithm,
            query: query.clone(),
            codec,
            _key: std::marker::PhantomData,
        }
    }

    fn push(&mut self, node: &Node<K>) {
        let distance = node.distance_to(self.query.as_slice(), self.distance_algorithm, self.codec.as_deref());
        let ordered = OrderedNode((node.id, distance));
        self.heap.push(Reverse(ordered))
    }

    fn pop(&mut self) -> Option<OrderedNode> {
        self.heap.pop().map(|popped| popped.0)
    }

    fn pop_n(&mut self, n: NonZeroUsize) -> Vec<OrderedNode> {
        (0..n.get())
            .filter_map(|_| self.heap.pop().map(|popped| popped.0))
            .collect()
    }

    fn len(&self) -> usize {
        self.heap.len()
    }

    fn peek(&self) -> Option<&OrderedNode> {
        self.heap.peek().map(|popped| &popped.0)
    }

    fn contains(&self, node_id: &NodeId) -> bool {
        self.heap.iter().any(|x| &(x.0.0.0) == node_id)
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[derive(Clone, Copy)]
pub struct HNSWConfig {
    pub ef_construction: usize,
    pub maximum_connections: usize,
    pub maximum_connections_zero: usize,
    pub extend_candidates: bool,
    pub keep_pruned_connections: bool,
}

impl Default for HNSWConfig {
    fn default() -> Self {
        let maximum_connections = 16;
        Self {
            ef_construction: 200,
            maximum_connections,
            maximum_connections_zero: maximum_connections * 2,
            extend_candidates: false,
            keep_pruned_connections: false,
        }
    }
}

impl From<&vex_types::HnswConfig> for HNSWConfig {
    fn from(value: &vex_types::HnswConfig) -> Self {
        Self {
            ef_construction: value.ef_construction,
            maximum_connections: value.m,
            maximum_connections_zero: value.m_max0(),
            extend_candidates: value.extend_candidates,
            keep_pruned_connections: value.keep_pruned_connections,
        }
    }
}
