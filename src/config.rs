//! Crate-wide configuration.
//!
//! Mirrors the teacher's `RAGConfig` (validate + `from_file` + serde round
//! trip) but re-scoped to the components this crate actually has: vector
//! store tuning, sparse index BM25 params, fusion weights, Small-to-Big
//! expansion, reranking strategy, the semantic cache, and the ANN tuner.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, RagResult};
use crate::types::QualityWeights;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HnswConfig {
    pub m: usize,
    pub ef_construction: usize,
    pub ef_search: usize,
    /// Below this many vectors, search falls back to brute-force exact scan —
    /// building a graph for a handful of vectors is pure overhead.
    pub exact_search_threshold: usize,
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self { m: 16, ef_construction: 200, ef_search: 64, exact_search_threshold: 1_000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    pub dimension: usize,
    pub hnsw: HnswConfig,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self { dimension: 768, hnsw: HnswConfig::default() }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Bm25Params {
    pub k1: f32,
    pub b: f32,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.2, b: 0.75 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SparseIndexConfig {
    pub bm25: Bm25Params,
    /// Number of mutations between automatic segment compaction.
    pub compaction_interval: u64,
}

impl Default for SparseIndexConfig {
    fn default() -> Self {
        Self { bm25: Bm25Params::default(), compaction_interval: 10_000 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FusionStrategy {
    ReciprocalRank,
    WeightedSum,
    Product,
    HarmonicMean,
    Maximum,
}

/// Per spec.md §4.7's "Auto strategy": when enabled, `vector_weight`/
/// `sparse_weight` are overridden by query length before fusion runs —
/// the configured `FusionStrategy` itself is never changed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AutoStrategyConfig {
    pub enabled: bool,
}

impl Default for AutoStrategyConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HybridConfig {
    pub strategy: FusionStrategy,
    pub vector_weight: f32,
    pub sparse_weight: f32,
    /// `k` in the RRF formula `1 / (k + rank)`.
    pub rrf_k: f32,
    pub auto_strategy: AutoStrategyConfig,
}

impl Default for HybridConfig {
    fn default() -> Self {
        Self {
            strategy: FusionStrategy::ReciprocalRank,
            vector_weight: 0.7,
            sparse_weight: 0.3,
            rrf_k: 60.0,
            auto_strategy: AutoStrategyConfig::default(),
        }
    }
}

/// Each channel is independently enable-able per spec.md §4.8: a caller may
/// combine sequential, hierarchical, and semantic expansion on the same
/// primary chunk, not just pick one.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SmallToBigConfig {
    pub sequential: bool,
    pub hierarchical: bool,
    pub semantic: bool,
    /// Bounds hierarchical hop depth (`MaxExpansionDistance`, default 2).
    pub max_hops: u32,
    /// Window size for a `Simple` query; scaled up per complexity by
    /// `window_for`.
    pub base_window: u32,
    pub max_window: u32,
    /// Above this Jaccard similarity, two expanded windows are merged.
    pub dedup_similarity_threshold: f32,
    /// Cosine floor for the semantic expansion channel.
    pub semantic_similarity_threshold: f32,
}

impl Default for SmallToBigConfig {
    fn default() -> Self {
        Self {
            sequential: true,
            hierarchical: true,
            semantic: false,
            max_hops: 2,
            base_window: 1,
            max_window: 4,
            dedup_similarity_threshold: 0.9,
            semantic_similarity_threshold: 0.75,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RerankStrategy {
    Semantic,
    Quality,
    Contextual,
    Hybrid,
    Llm,
    /// Picks among the above based on query intent/confidence, falling back
    /// to `Semantic` when the chosen strategy's dependency is unavailable.
    Adaptive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankConfig {
    pub strategy: RerankStrategy,
    pub top_k: usize,
    pub llm_timeout_ms: u64,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self { strategy: RerankStrategy::Adaptive, top_k: 10, llm_timeout_ms: 20_000 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvictionPolicy {
    Lru,
    Lfu,
    Ttl,
    SimilarityBased,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub enabled: bool,
    pub similarity_threshold: f32,
    pub max_entries: usize,
    pub ttl_seconds: Option<u64>,
    pub eviction_policy: EvictionPolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            similarity_threshold: 0.92,
            max_entries: 10_000,
            ttl_seconds: Some(3_600),
            eviction_policy: EvictionPolicy::Lru,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TunerProfile {
    Speed,
    Accuracy,
    Memory,
    Balanced,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunerConfig {
    pub enabled: bool,
    pub profile: TunerProfile,
    /// Maximum fractional recall regression tolerated against the last
    /// accepted baseline before a candidate configuration is rejected.
    pub max_recall_regression: f32,
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self { enabled: false, profile: TunerProfile::Balanced, max_recall_regression: 0.02 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbTestConfig {
    pub enabled: bool,
    /// Fraction of queries, in `[0, 1]`, that also run the shadow strategy.
    pub sample_rate: f32,
    pub shadow_strategy: Option<crate::analyzer::RetrievalStrategy>,
}

impl Default for AbTestConfig {
    fn default() -> Self {
        Self { enabled: false, sample_rate: 0.05, shadow_strategy: None }
    }
}

/// Per spec.md §4.6: a transformed artifact (HyDE passage, QuOTE expansion)
/// scoring below `quality_threshold` is discarded and the caller uses the
/// original query instead.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TransformConfig {
    pub quality_threshold: f32,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self { quality_threshold: 0.4 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryAnalyzerConfig {
    /// Below this confidence, the analyzer's classification is treated as
    /// `Low` confidence and the orchestrator falls back to a conservative
    /// strategy rather than trusting the classification.
    pub min_confidence: f32,
}

impl Default for QueryAnalyzerConfig {
    fn default() -> Self {
        Self { min_confidence: 0.55 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    pub vector_store: VectorStoreConfig,
    pub sparse_index: SparseIndexConfig,
    pub hybrid: HybridConfig,
    pub small_to_big: SmallToBigConfig,
    pub rerank: RerankConfig,
    pub cache: CacheConfig,
    pub tuner: TunerConfig,
    pub query_analyzer: QueryAnalyzerConfig,
    pub ab_test: AbTestConfig,
    pub quality_weights: QualityWeights,
    pub transform: TransformConfig,
    /// Free-form, component-specific overrides that don't warrant a typed
    /// field yet (mirrors the teacher's `FeatureFlags` escape hatch).
    pub feature_flags: HashMap<String, bool>,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            vector_store: VectorStoreConfig::default(),
            sparse_index: SparseIndexConfig::default(),
            hybrid: HybridConfig::default(),
            small_to_big: SmallToBigConfig::default(),
            rerank: RerankConfig::default(),
            cache: CacheConfig::default(),
            tuner: TunerConfig::default(),
            query_analyzer: QueryAnalyzerConfig::default(),
            ab_test: AbTestConfig::default(),
            quality_weights: QualityWeights::default(),
            transform: TransformConfig::default(),
            feature_flags: HashMap::new(),
        }
    }
}

impl RagConfig {
    pub fn from_file(path: impl AsRef<Path>) -> RagResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref())
            .map_err(|e| RagError::input(format!("cannot read config file: {e}")))?;
        let config: RagConfig = serde_json::from_str(&raw)
            .map_err(|e| RagError::input(format!("invalid config file: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> RagResult<()> {
        if self.vector_store.dimension == 0 {
            return Err(RagError::input("vector_store.dimension must be > 0"));
        }
        if self.vector_store.hnsw.m == 0 {
            return Err(RagError::input("vector_store.hnsw.m must be > 0"));
        }
        if self.vector_store.hnsw.ef_search < self.vector_store.hnsw.m {
            return Err(RagError::input("vector_store.hnsw.ef_search must be >= m"));
        }
        if !(0.0..=2.0).contains(&self.sparse_index.bm25.k1) {
            return Err(RagError::input("sparse_index.bm25.k1 must be in [0, 2]"));
        }
        if !(0.0..=1.0).contains(&self.sparse_index.bm25.b) {
            return Err(RagError::input("sparse_index.bm25.b must be in [0, 1]"));
        }
        let weight_sum = self.hybrid.vector_weight + self.hybrid.sparse_weight;
        if (weight_sum - 1.0).abs() > 1e-3 {
            return Err(RagError::input("hybrid.vector_weight + sparse_weight must sum to 1.0"));
        }
        if !(0.0..=1.0).contains(&self.cache.similarity_threshold) {
            return Err(RagError::input("cache.similarity_threshold must be in [0, 1]"));
        }
        if self.small_to_big.base_window > self.small_to_big.max_window {
            return Err(RagError::input("small_to_big.base_window must be <= max_window"));
        }
        if !(0.0..=1.0).contains(&self.ab_test.sample_rate) {
            return Err(RagError::input("ab_test.sample_rate must be in [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.transform.quality_threshold) {
            return Err(RagError::input("transform.quality_threshold must be in [0, 1]"));
        }
        Ok(())
    }
}
