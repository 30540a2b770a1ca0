//! In-memory HNSW (Hierarchical Navigable Small World) graph.
//!
//! Hand-rolled rather than delegated to lancedb's index so the auto-tuner
//! (`tuner`) can control `m`/`ef_construction`/`ef_search` directly and so
//! exact-search fallback below `exact_search_threshold` is a first-class path
//! rather than a backend-specific quirk. Persistence of the raw vectors is a
//! separate concern (`VectorStoreBackend`); this type only ever holds the
//! graph structure and the vectors needed to traverse it.

use std::collections::{BinaryHeap, HashMap, HashSet};

use uuid::Uuid;

use crate::adapters::Random;
use crate::config::HnswConfig;
use crate::types::cosine_similarity;

#[derive(Debug, Clone, Copy, PartialEq)]
struct ScoredId {
    score: f32,
    id: Uuid,
}

impl Eq for ScoredId {}
impl Ord for ScoredId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.score.partial_cmp(&other.score).unwrap_or(std::cmp::Ordering::Equal)
    }
}
impl PartialOrd for ScoredId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Reverses ordering so a `BinaryHeap<Reverse<ScoredId>>` acts as a min-heap
/// on score, used to keep only the best `ef` candidates during a layer scan.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Reverse(ScoredId);
impl Eq for Reverse {}
impl Ord for Reverse {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other.0.cmp(&self.0)
    }
}
impl PartialOrd for Reverse {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

struct Node {
    vector: Vec<f32>,
    /// `neighbors[layer]` holds this node's edges at that layer.
    neighbors: Vec<Vec<Uuid>>,
}

/// An immutable, queryable HNSW graph. Builds are done via `HnswBuilder` and
/// the result is swapped into `VectorStore` as a whole, giving the
/// shadow-segment concurrency model described in spec.md §5: readers always
/// see either the old or the new graph, never a partially built one.
pub struct HnswGraph {
    nodes: HashMap<Uuid, Node>,
    entry_point: Option<Uuid>,
    config: HnswConfig,
}

impl HnswGraph {
    pub fn empty(config: HnswConfig) -> Self {
        Self { nodes: HashMap::new(), entry_point: None, config }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Approximate k-NN search. Falls back to brute force below
    /// `exact_search_threshold`, per spec.md §4.1 — an HNSW graph with a
    /// handful of nodes degenerates to a scan anyway, so skip the overhead.
    pub fn search(&self, query: &[f32], k: usize, ef_search: Option<usize>) -> Vec<(Uuid, f32)> {
        if self.nodes.is_empty() {
            return Vec::new();
        }
        if self.nodes.len() <= self.config.exact_search_threshold {
            return self.brute_force(query, k);
        }
        let ef = ef_search.unwrap_or(self.config.ef_search).max(k);
        let Some(entry) = self.entry_point else { return Vec::new() };
        let top_layer = self.nodes[&entry].neighbors.len().saturating_sub(1);

        let mut current = entry;
        let mut current_score = cosine_similarity(query, &self.nodes[&current].vector);
        for layer in (1..=top_layer).rev() {
            loop {
                let mut improved = false;
                if let Some(node) = self.nodes.get(&current) {
                    if let Some(layer_neighbors) = node.neighbors.get(layer) {
                        for &candidate in layer_neighbors {
                            if let Some(cnode) = self.nodes.get(&candidate) {
                                let score = cosine_similarity(query, &cnode.vector);
                                if score > current_score {
                                    current = candidate;
                                    current_score = score;
                                    improved = true;
                                }
                            }
                        }
                    }
                }
                if !improved {
                    break;
                }
            }
        }

        let candidates = self.search_layer(query, current, ef, 0);
        let mut results: Vec<(Uuid, f32)> =
            candidates.into_iter().map(|c| (c.id, c.score)).collect();
        sort_scored(&mut results);
        results.truncate(k);
        results
    }

    fn brute_force(&self, query: &[f32], k: usize) -> Vec<(Uuid, f32)> {
        let mut scored: Vec<(Uuid, f32)> = self
            .nodes
            .iter()
            .map(|(id, node)| (*id, cosine_similarity(query, &node.vector)))
            .collect();
        sort_scored(&mut scored);
        scored.truncate(k);
        scored
    }

    /// Greedy best-first search within a single layer, bounded to `ef`
    /// candidates, starting from `entry`.
    fn search_layer(&self, query: &[f32], entry: Uuid, ef: usize, layer: usize) -> Vec<ScoredId> {
        let mut visited = HashSet::new();
        visited.insert(entry);
        let entry_score = cosine_similarity(query, &self.nodes[&entry].vector);
        let entry_scored = ScoredId { score: entry_score, id: entry };

        let mut candidates: BinaryHeap<ScoredId> = BinaryHeap::new();
        candidates.push(entry_scored);
        let mut results: BinaryHeap<Reverse> = BinaryHeap::new();
        results.push(Reverse(entry_scored));

        while let Some(current) = candidates.pop() {
            let worst_result = results.peek().map(|r| r.0.score).unwrap_or(f32::NEG_INFINITY);
            if current.score < worst_result && results.len() >= ef {
                break;
            }
            let Some(node) = self.nodes.get(&current.id) else { continue };
            let Some(layer_neighbors) = node.neighbors.get(layer) else { continue };
            for &neighbor_id in layer_neighbors {
                if !visited.insert(neighbor_id) {
                    continue;
                }
                let Some(neighbor) = self.nodes.get(&neighbor_id) else { continue };
                let score = cosine_similarity(query, &neighbor.vector);
                let scored = ScoredId { score, id: neighbor_id };
                let worst_result = results.peek().map(|r| r.0.score).unwrap_or(f32::NEG_INFINITY);
                if results.len() < ef || score > worst_result {
                    candidates.push(scored);
                    results.push(Reverse(scored));
                    if results.len() > ef {
                        results.pop();
                    }
                }
            }
        }

        results.into_iter().map(|r| r.0).collect()
    }
}

/// Orders by descending score, breaking ties by id so a fixed corpus and
/// query always return the same order (spec.md §4.1: "ties break on id").
fn sort_scored(results: &mut [(Uuid, f32)]) {
    results.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.0.cmp(&b.0)));
}

/// Builds an `HnswGraph` from scratch. Used both for the initial graph and by
/// `VectorStore::optimize` to rebuild into a shadow segment before swapping.
pub struct HnswBuilder<'a> {
    config: HnswConfig,
    random: &'a dyn Random,
}

impl<'a> HnswBuilder<'a> {
    pub fn new(config: HnswConfig, random: &'a dyn Random) -> Self {
        Self { config, random }
    }

    pub fn build(&self, records: Vec<(Uuid, Vec<f32>)>) -> HnswGraph {
        let mut graph = HnswGraph::empty(self.config.clone());
        for (id, vector) in records {
            self.insert(&mut graph, id, vector);
        }
        graph
    }

    /// Random level assignment following the standard HNSW exponential decay
    /// distribution with `m_l = 1 / ln(m)`.
    fn random_level(&self) -> usize {
        let m_l = 1.0 / (self.config.m as f64).ln().max(1e-9);
        let r = self.random.gen_f64().max(1e-9);
        (-r.ln() * m_l).floor() as usize
    }

    fn insert(&self, graph: &mut HnswGraph, id: Uuid, vector: Vec<f32>) {
        let level = self.random_level();
        let node = Node { vector: vector.clone(), neighbors: vec![Vec::new(); level + 1] };

        let Some(entry) = graph.entry_point else {
            graph.nodes.insert(id, node);
            graph.entry_point = Some(id);
            return;
        };

        graph.nodes.insert(id, node);

        let entry_top_layer = graph.nodes[&entry].neighbors.len().saturating_sub(1);
        let mut current = entry;
        for layer in ((level + 1)..=entry_top_layer).rev() {
            loop {
                let mut improved = false;
                let current_score = cosine_similarity(&vector, &graph.nodes[&current].vector);
                if let Some(layer_neighbors) = graph.nodes[&current].neighbors.get(layer).cloned()
                {
                    for candidate in layer_neighbors {
                        let score = cosine_similarity(&vector, &graph.nodes[&candidate].vector);
                        if score > current_score {
                            current = candidate;
                            improved = true;
                        }
                    }
                }
                if !improved {
                    break;
                }
            }
        }

        for layer in (0..=level.min(entry_top_layer)).rev() {
            let candidates = graph.search_layer(&vector, current, self.config.ef_construction, layer);
            let m_for_layer = if layer == 0 { self.config.m * 2 } else { self.config.m };
            let mut selected: Vec<ScoredId> = candidates;
            selected.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
            selected.truncate(m_for_layer);

            for neighbor in &selected {
                graph.nodes.get_mut(&id).unwrap().neighbors[layer].push(neighbor.id);
                let nlayer_len = if let Some(nnode) = graph.nodes.get_mut(&neighbor.id) {
                    if let Some(nlayer) = nnode.neighbors.get_mut(layer) {
                        nlayer.push(id);
                        nlayer.sort_by_cached_key(|_| 0); // stable no-op, pruning below is score-based
                        Some(nlayer.len())
                    } else {
                        None
                    }
                } else {
                    None
                };
                if let Some(len) = nlayer_len {
                    if len > m_for_layer {
                        // Prune to the m_for_layer closest neighbors by
                        // re-scoring against this node's own vector.
                        let own_vector = graph.nodes[&neighbor.id].vector.clone();
                        let candidate_ids: Vec<Uuid> = graph.nodes[&neighbor.id].neighbors[layer].clone();
                        let mut scored: Vec<(Uuid, f32)> = candidate_ids
                            .iter()
                            .filter_map(|nid| {
                                graph.nodes.get(nid).map(|n| {
                                    (*nid, cosine_similarity(&own_vector, &n.vector))
                                })
                            })
                            .collect();
                        scored.sort_by(|a, b| {
                            b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal)
                        });
                        scored.truncate(m_for_layer);
                        let pruned: Vec<Uuid> = scored.into_iter().map(|(nid, _)| nid).collect();
                        graph.nodes.get_mut(&neighbor.id).unwrap().neighbors[layer] = pruned;
                    }
                }
            }

            if let Some(&best) = selected.first().map(|s| &s.id) {
                current = best;
            }
        }

        if level > entry_top_layer {
            graph.entry_point = Some(id);
        }
    }
}
