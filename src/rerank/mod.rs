//! Reranker component: reorders a candidate set using a sharper, more
//! expensive signal than whatever produced the candidates (fusion scores are
//! cheap but coarse; reranking spends more compute on a shorter list).

pub mod llm;

use std::collections::HashMap;

use uuid::Uuid;

use crate::adapters::TextCompletionService;
use crate::config::{RerankConfig, RerankStrategy};
use crate::types::{ChunkQuality, Embedding, QualityWeights};

#[derive(Debug, Clone)]
pub struct RerankCandidate {
    pub id: Uuid,
    pub text: String,
    pub embedding: Option<Embedding>,
    pub quality: ChunkQuality,
    pub original_rank: usize,
}

#[derive(Debug, Clone)]
pub struct RerankedResult {
    pub id: Uuid,
    pub score: f32,
    /// Per-signal contributions that made up `score`, e.g. `"semantic"`,
    /// `"quality"`, `"position"` — spec.md §4.9's `EnhancedSearchResult`
    /// contract names this breakdown explicitly.
    pub components: HashMap<String, f32>,
}

pub struct Reranker {
    config: RerankConfig,
    quality_weights: QualityWeights,
}

impl Reranker {
    pub fn new(config: RerankConfig, quality_weights: QualityWeights) -> Self {
        Self { config, quality_weights }
    }

    pub fn semantic(&self, candidates: &[RerankCandidate], query_embedding: &Embedding) -> Vec<RerankedResult> {
        let mut scored: Vec<RerankedResult> = candidates
            .iter()
            .map(|c| {
                let semantic = c.embedding.as_ref().map(|e| query_embedding.cosine_similarity(e)).unwrap_or(0.0);
                RerankedResult { id: c.id, score: semantic, components: HashMap::from([("semantic".to_string(), semantic)]) }
            })
            .collect();
        sort_desc(&mut scored);
        scored
    }

    pub fn quality(&self, candidates: &[RerankCandidate]) -> Vec<RerankedResult> {
        let mut scored: Vec<RerankedResult> = candidates
            .iter()
            .map(|c| {
                let quality = c.quality.aggregate(&self.quality_weights);
                RerankedResult { id: c.id, score: quality, components: HashMap::from([("quality".to_string(), quality)]) }
            })
            .collect();
        sort_desc(&mut scored);
        scored
    }

    /// Blends semantic relevance, static quality, and a mild decay favoring
    /// candidates that were already ranked highly upstream — "contextual" in
    /// the sense that it trusts the retrieval context, not just one signal.
    pub fn contextual(&self, candidates: &[RerankCandidate], query_embedding: &Embedding) -> Vec<RerankedResult> {
        let max_rank = candidates.len().max(1) as f32;
        let mut scored: Vec<RerankedResult> = candidates
            .iter()
            .map(|c| {
                let semantic = c.embedding.as_ref().map(|e| query_embedding.cosine_similarity(e)).unwrap_or(0.0);
                let quality = c.quality.aggregate(&self.quality_weights);
                let position = 1.0 - (c.original_rank as f32 / max_rank);
                RerankedResult {
                    id: c.id,
                    score: semantic * 0.5 + quality * 0.3 + position * 0.2,
                    components: HashMap::from([
                        ("semantic".to_string(), semantic),
                        ("quality".to_string(), quality),
                        ("position".to_string(), position),
                    ]),
                }
            })
            .collect();
        sort_desc(&mut scored);
        scored
    }

    pub fn hybrid(&self, candidates: &[RerankCandidate], query_embedding: &Embedding) -> Vec<RerankedResult> {
        let semantic = self.semantic(candidates, query_embedding);
        let quality = self.quality(candidates);
        let quality_by_id: HashMap<Uuid, f32> = quality.into_iter().map(|r| (r.id, r.score)).collect();
        let mut scored: Vec<RerankedResult> = semantic
            .into_iter()
            .map(|r| {
                let q = quality_by_id.get(&r.id).copied().unwrap_or(0.0);
                RerankedResult {
                    id: r.id,
                    score: r.score * 0.6 + q * 0.4,
                    components: HashMap::from([("semantic".to_string(), r.score), ("quality".to_string(), q)]),
                }
            })
            .collect();
        sort_desc(&mut scored);
        scored
    }

    pub async fn llm(
        &self,
        candidates: &[RerankCandidate],
        query: &str,
        completion: &dyn TextCompletionService,
    ) -> Vec<RerankedResult> {
        let pairs: Vec<(Uuid, String)> = candidates.iter().map(|c| (c.id, c.text.clone())).collect();
        let order = llm::llm_rerank(completion, query, &pairs, self.config.llm_timeout_ms).await;
        let len = order.len().max(1) as f32;
        order
            .into_iter()
            .enumerate()
            .map(|(rank, id)| {
                let score = 1.0 - (rank as f32 / len);
                RerankedResult { id, score, components: HashMap::from([("llm_rank".to_string(), score)]) }
            })
            .collect()
    }

    /// Dispatches per `RerankConfig::strategy`. `Adaptive` prefers `Llm` when
    /// a completion service is available and falls back to `Hybrid`
    /// otherwise — never silently drops to `Quality` alone, since that
    /// ignores the query entirely.
    pub async fn rerank(
        &self,
        candidates: &[RerankCandidate],
        query: &str,
        query_embedding: &Embedding,
        completion: Option<&dyn TextCompletionService>,
    ) -> Vec<RerankedResult> {
        let strategy = match self.config.strategy {
            RerankStrategy::Adaptive if completion.is_some() => RerankStrategy::Llm,
            RerankStrategy::Adaptive => RerankStrategy::Hybrid,
            other => other,
        };

        let mut results = match strategy {
            RerankStrategy::Semantic => self.semantic(candidates, query_embedding),
            RerankStrategy::Quality => self.quality(candidates),
            RerankStrategy::Contextual => self.contextual(candidates, query_embedding),
            RerankStrategy::Hybrid => self.hybrid(candidates, query_embedding),
            RerankStrategy::Llm => match completion {
                Some(service) => self.llm(candidates, query, service).await,
                None => self.hybrid(candidates, query_embedding),
            },
            RerankStrategy::Adaptive => unreachable!("resolved above"),
        };

        results.truncate(self.config.top_k);
        results
    }
}

fn sort_desc(results: &mut [RerankedResult]) {
    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: Uuid, vector: Vec<f32>, quality: f32, rank: usize) -> RerankCandidate {
        let mut q = ChunkQuality::default();
        q.completeness = quality;
        q.information_density = quality;
        q.coherence = quality;
        q.authority = quality;
        q.freshness = quality;
        RerankCandidate {
            id,
            text: "text".to_string(),
            embedding: Some(Embedding::new(vector)),
            quality: q,
            original_rank: rank,
        }
    }

    #[test]
    fn semantic_prefers_closer_embedding() {
        let reranker = Reranker::new(RerankConfig::default(), QualityWeights::default());
        let close = Uuid::new_v4();
        let far = Uuid::new_v4();
        let candidates = vec![
            candidate(far, vec![1.0, 0.0], 0.5, 0),
            candidate(close, vec![0.0, 1.0], 0.5, 1),
        ];
        let query = Embedding::new(vec![0.0, 1.0]);
        let results = reranker.semantic(&candidates, &query);
        assert_eq!(results[0].id, close);
    }

    #[test]
    fn quality_prefers_higher_quality_regardless_of_embedding() {
        let reranker = Reranker::new(RerankConfig::default(), QualityWeights::default());
        let high = Uuid::new_v4();
        let low = Uuid::new_v4();
        let candidates = vec![candidate(low, vec![0.0, 1.0], 0.1, 0), candidate(high, vec![1.0, 0.0], 0.9, 1)];
        let results = reranker.quality(&candidates);
        assert_eq!(results[0].id, high);
    }

    #[test]
    fn contextual_components_break_down_into_the_three_signals() {
        let reranker = Reranker::new(RerankConfig::default(), QualityWeights::default());
        let candidates = vec![candidate(Uuid::new_v4(), vec![1.0, 0.0], 0.5, 0)];
        let query = Embedding::new(vec![1.0, 0.0]);
        let results = reranker.contextual(&candidates, &query);
        let components = &results[0].components;
        assert!(components.contains_key("semantic"));
        assert!(components.contains_key("quality"));
        assert!(components.contains_key("position"));
        let sum = components["semantic"] * 0.5 + components["quality"] * 0.3 + components["position"] * 0.2;
        assert!((sum - results[0].score).abs() < 1e-5);
    }

    #[tokio::test]
    async fn adaptive_without_completion_falls_back_to_hybrid_not_quality_only() {
        let reranker = Reranker::new(
            RerankConfig { strategy: RerankStrategy::Adaptive, ..Default::default() },
            QualityWeights::default(),
        );
        let relevant = Uuid::new_v4();
        let candidates = vec![candidate(relevant, vec![0.0, 1.0], 0.5, 0)];
        let query = Embedding::new(vec![0.0, 1.0]);
        let results = reranker.rerank(&candidates, "q", &query, None).await;
        assert_eq!(results[0].id, relevant);
    }
}
