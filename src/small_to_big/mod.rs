//! Small-to-Big Retriever component: expands a matched chunk into its
//! surrounding context before it's handed to reranking.
//!
//! The hierarchical mode's bounded hop expansion is grounded in the
//! teacher's `graph/knowledge_graph.rs` (`get_related_doc_ids`): a
//! `petgraph::DiGraph` walked breadth-first with an explicit visited set, so
//! a relationship cycle can never cause unbounded expansion.

use std::collections::{HashMap, HashSet, VecDeque};

use petgraph::graph::{DiGraph, NodeIndex};
use uuid::Uuid;

use crate::analyzer::QueryComplexity;
use crate::config::SmallToBigConfig;
use crate::error::{RagError, RagResult};
use crate::repository::ChunkRepository;
use crate::types::Chunk;

#[derive(Debug, Clone)]
pub struct ExpandedWindow {
    pub seed_chunk_id: Uuid,
    pub chunk_ids: Vec<Uuid>,
    pub combined_text: String,
    pub quality_score: f32,
    /// Count of chunks each enabled channel contributed, keyed by channel
    /// name ("sequential" / "hierarchical" / "semantic").
    pub expansion_breakdown: HashMap<String, usize>,
}

pub struct SmallToBigRetriever {
    config: SmallToBigConfig,
}

impl SmallToBigRetriever {
    pub fn new(config: SmallToBigConfig) -> Self {
        Self { config }
    }

    /// Window size table from spec.md §4.8: Simple→1, Moderate→2, Complex→3,
    /// VeryComplex→4, scaled by the configured base/max so deployments can
    /// shift the whole table without changing the shape.
    fn window_for(&self, complexity: QueryComplexity) -> u32 {
        let span = self.config.max_window.saturating_sub(self.config.base_window);
        let step = match complexity {
            QueryComplexity::Simple => 0,
            QueryComplexity::Moderate => 1,
            QueryComplexity::Complex => 2,
            QueryComplexity::VeryComplex => 3,
        };
        (self.config.base_window + step.min(span)).min(self.config.max_window)
    }

    /// Runs every independently-enabled channel against each seed chunk,
    /// merges their candidates (deduped by chunk id), then dedupes
    /// near-duplicate windows across seeds.
    pub async fn expand(
        &self,
        repository: &ChunkRepository,
        seeds: &[Uuid],
        complexity: QueryComplexity,
    ) -> RagResult<Vec<ExpandedWindow>> {
        let window = self.window_for(complexity);
        let mut windows = Vec::with_capacity(seeds.len());

        for &seed_id in seeds {
            let Some(seed) = repository.get(seed_id).await? else { continue };
            let mut breakdown: HashMap<String, usize> = HashMap::new();
            let mut all_ids: HashSet<Uuid> = HashSet::new();
            all_ids.insert(seed_id);

            if self.config.sequential {
                let ids = self.sequential_candidates(repository, &seed, window).await?;
                breakdown.insert("sequential".to_string(), ids.iter().filter(|id| all_ids.insert(**id)).count());
            }
            if self.config.hierarchical {
                let ids = self.hierarchical_candidates(repository, &seed).await?;
                breakdown.insert("hierarchical".to_string(), ids.iter().filter(|id| all_ids.insert(**id)).count());
            }
            if self.config.semantic {
                let ids = self.semantic_candidates(repository, &seed).await?;
                breakdown.insert("semantic".to_string(), ids.iter().filter(|id| all_ids.insert(**id)).count());
            }

            let mut chunks = repository.get_many(&all_ids.into_iter().collect::<Vec<_>>()).await?;
            chunks.sort_by_key(|c| c.index);

            let combined_text = chunks.iter().map(|c| c.text.as_str()).collect::<Vec<_>>().join("\n\n");
            let quality_score = average_quality(&chunks);

            windows.push(ExpandedWindow {
                seed_chunk_id: seed_id,
                chunk_ids: chunks.iter().map(|c| c.id).collect(),
                combined_text,
                quality_score,
                expansion_breakdown: breakdown,
            });
        }

        Ok(dedup_windows(windows, self.config.dedup_similarity_threshold))
    }

    async fn sequential_candidates(
        &self,
        repository: &ChunkRepository,
        seed: &Chunk,
        window: u32,
    ) -> RagResult<Vec<Uuid>> {
        let siblings = repository.get_by_document(seed.document_id).await?;
        let low = seed.index.saturating_sub(window);
        let high = seed.index.saturating_add(window);
        Ok(siblings.into_iter().filter(|c| c.index >= low && c.index <= high).map(|c| c.id).collect())
    }

    async fn hierarchical_candidates(
        &self,
        repository: &ChunkRepository,
        seed: &Chunk,
    ) -> RagResult<Vec<Uuid>> {
        let siblings = repository.get_by_document(seed.document_id).await?;
        let mut graph: DiGraph<Uuid, f32> = DiGraph::new();
        let mut node_index: HashMap<Uuid, NodeIndex> = HashMap::new();
        for chunk in &siblings {
            node_index.insert(chunk.id, graph.add_node(chunk.id));
        }
        for chunk in &siblings {
            for relationship in repository.get_relationships(chunk.id).await? {
                if let (Some(&from), Some(&to)) =
                    (node_index.get(&relationship.from_chunk), node_index.get(&relationship.to_chunk))
                {
                    graph.add_edge(from, to, relationship.strength);
                }
            }
        }

        let Some(&start) = node_index.get(&seed.id) else { return Ok(vec![seed.id]) };
        let mut visited: HashSet<NodeIndex> = HashSet::new();
        visited.insert(start);
        let mut frontier = VecDeque::new();
        frontier.push_back((start, 0u32));
        let mut result = vec![seed.id];

        while let Some((node, hops)) = frontier.pop_front() {
            if hops >= self.config.max_hops {
                continue;
            }
            for neighbor in graph.neighbors(node) {
                if visited.insert(neighbor) {
                    result.push(graph[neighbor]);
                    frontier.push_back((neighbor, hops + 1));
                }
            }
        }

        Ok(result)
    }

    async fn semantic_candidates(&self, repository: &ChunkRepository, seed: &Chunk) -> RagResult<Vec<Uuid>> {
        let Some(seed_embedding) = &seed.embedding else { return Ok(vec![seed.id]) };
        let siblings = repository.get_by_document(seed.document_id).await?;
        let mut candidates = vec![seed.id];
        for sibling in siblings {
            if sibling.id == seed.id {
                continue;
            }
            if let Some(embedding) = &sibling.embedding {
                if seed_embedding.cosine_similarity(embedding) >= self.config.semantic_similarity_threshold {
                    candidates.push(sibling.id);
                }
            }
        }
        Ok(candidates)
    }
}

fn average_quality(chunks: &[Chunk]) -> f32 {
    if chunks.is_empty() {
        return 0.0;
    }
    let weights = crate::types::QualityWeights::default();
    chunks.iter().map(|c| c.quality.aggregate(&weights)).sum::<f32>() / chunks.len() as f32
}

fn jaccard(a: &str, b: &str) -> f32 {
    let set_a: HashSet<&str> = a.split_whitespace().collect();
    let set_b: HashSet<&str> = b.split_whitespace().collect();
    if set_a.is_empty() && set_b.is_empty() {
        return 1.0;
    }
    let intersection = set_a.intersection(&set_b).count() as f32;
    let union = set_a.union(&set_b).count().max(1) as f32;
    intersection / union
}

/// Merges windows whose combined text is near-identical (overlapping
/// expansions from nearby seeds), keeping the higher-quality one.
fn dedup_windows(windows: Vec<ExpandedWindow>, threshold: f32) -> Vec<ExpandedWindow> {
    let mut kept: Vec<ExpandedWindow> = Vec::new();
    'outer: for window in windows {
        for existing in &mut kept {
            if jaccard(&existing.combined_text, &window.combined_text) >= threshold {
                if window.quality_score > existing.quality_score {
                    *existing = window;
                }
                continue 'outer;
            }
        }
        kept.push(window);
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::memory_backend::MemoryRepositoryBackend;
    use crate::types::RelationshipType;
    use chrono::Utc;
    use std::sync::Arc;

    async fn seeded_repo() -> (ChunkRepository, Uuid, Vec<Uuid>) {
        let repo = ChunkRepository::new(Arc::new(MemoryRepositoryBackend::new()));
        let doc = Uuid::new_v4();
        let now = Utc::now();
        let chunks: Vec<Chunk> = (0..5).map(|i| Chunk::new(doc, i, format!("chunk {i}"), now)).collect();
        let ids: Vec<Uuid> = chunks.iter().map(|c| c.id).collect();
        repo.put_batch(chunks).await.unwrap();
        (repo, doc, ids)
    }

    /// S4: sequential-only expansion of window 1 around a middle chunk
    /// yields exactly its immediate neighbors in order, with hierarchical
    /// and semantic channels both disabled.
    #[tokio::test]
    async fn s4_sequential_only_expansion_respects_window() {
        let (repo, _doc, ids) = seeded_repo().await;
        let retriever = SmallToBigRetriever::new(SmallToBigConfig {
            sequential: true,
            hierarchical: false,
            semantic: false,
            base_window: 1,
            max_window: 1,
            ..Default::default()
        });
        let windows = retriever.expand(&repo, &[ids[2]], QueryComplexity::Simple).await.unwrap();
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].chunk_ids.len(), 3);
        assert_eq!(windows[0].expansion_breakdown.get("hierarchical"), None);
    }

    #[tokio::test]
    async fn hierarchical_expansion_respects_max_hops() {
        let (repo, _doc, ids) = seeded_repo().await;
        for pair in ids.windows(2) {
            repo.put_relationship(crate::types::ChunkRelationship::new(
                pair[0],
                pair[1],
                RelationshipType::Sequential,
                1.0,
            ))
            .await
            .unwrap();
        }
        let retriever = SmallToBigRetriever::new(SmallToBigConfig {
            sequential: false,
            hierarchical: true,
            semantic: false,
            max_hops: 1,
            ..Default::default()
        });
        let windows = retriever.expand(&repo, &[ids[0]], QueryComplexity::Simple).await.unwrap();
        // seed + 1 hop neighbor only, never the whole chain.
        assert_eq!(windows[0].chunk_ids.len(), 2);
    }

    #[tokio::test]
    async fn combining_channels_merges_their_candidates() {
        let (repo, _doc, ids) = seeded_repo().await;
        repo.put_relationship(crate::types::ChunkRelationship::new(
            ids[0],
            ids[4],
            RelationshipType::Semantic,
            0.9,
        ))
        .await
        .unwrap();
        let retriever = SmallToBigRetriever::new(SmallToBigConfig {
            sequential: true,
            hierarchical: true,
            semantic: false,
            base_window: 1,
            max_window: 1,
            max_hops: 1,
            ..Default::default()
        });
        let windows = retriever.expand(&repo, &[ids[0]], QueryComplexity::Simple).await.unwrap();
        // sequential contributes ids[1]; hierarchical contributes ids[4] via the edge.
        assert!(windows[0].chunk_ids.contains(&ids[1]));
        assert!(windows[0].chunk_ids.contains(&ids[4]));
    }

    #[test]
    fn jaccard_of_identical_text_is_one() {
        assert_eq!(jaccard("a b c", "a b c"), 1.0);
    }

    #[test]
    fn dedup_keeps_higher_quality_window() {
        let low = ExpandedWindow {
            seed_chunk_id: Uuid::new_v4(),
            chunk_ids: vec![],
            combined_text: "shared overlapping text here".to_string(),
            quality_score: 0.2,
            expansion_breakdown: HashMap::new(),
        };
        let high = ExpandedWindow {
            seed_chunk_id: Uuid::new_v4(),
            chunk_ids: vec![],
            combined_text: "shared overlapping text here".to_string(),
            quality_score: 0.8,
            expansion_breakdown: HashMap::new(),
        };
        let result = dedup_windows(vec![low, high], 0.5);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].quality_score, 0.8);
    }
}
