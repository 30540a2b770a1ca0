//! Core data model: chunks, documents, embeddings, and their derived metadata.
//!
//! These types are the currency every component in the crate trades in. They are
//! plain data — no component owns behavior on them beyond what is exposed through
//! the component modules (`repository`, `vector_store`, `enrichment`, ...).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Common shape for anything that can be merged/deduped/re-ranked by
/// identity and a relevance score: search hits, fusion results, rerank
/// candidates. Lets `transform::merge_results` and friends stay generic
/// instead of re-implementing round-robin merge per result type.
pub trait HasIdAndScore {
    fn id(&self) -> Uuid;
    fn score(&self) -> f32;
}

/// A dense embedding vector. Equality is by value; cosine similarity is the
/// canonical distance metric used throughout the crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    pub model: Option<String>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values, model: None }
    }

    pub fn with_model(values: Vec<f32>, model: impl Into<String>) -> Self {
        Self { values, model: Some(model.into()) }
    }

    pub fn dimension(&self) -> usize {
        self.values.len()
    }

    /// Cosine similarity against another embedding of the same dimension.
    /// Returns 0.0 for zero-norm vectors rather than dividing by zero.
    pub fn cosine_similarity(&self, other: &Embedding) -> f32 {
        cosine_similarity(&self.values, &other.values)
    }
}

/// Cosine similarity between two raw vectors. Dimension mismatch returns 0.0 —
/// callers that need to treat mismatch as fatal check dimensions explicitly
/// before calling (see `vector_store::VectorStore::put`).
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Confidence marker attached to degraded/fallback results (enrichment failures,
/// LLM timeouts, low-confidence classification).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Confidence {
    Low,
    Medium,
    High,
}

/// Structural and semantic metadata derived for a chunk. Regenerable from
/// `text + neighbors + document_metadata` — see `enrichment::MetadataEnricher`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMetadata {
    // text metrics
    pub char_count: usize,
    pub estimated_token_count: usize,
    pub sentence_count: usize,
    pub readability: f32,
    pub language: String,

    // semantic
    pub keywords: Vec<(String, f32)>,
    pub entities: Vec<String>,
    pub topics: Vec<String>,
    pub content_type: String,

    // structural
    pub section_level: u32,
    pub section_title: Option<String>,
    pub preceding_context: Option<String>,
    pub following_context: Option<String>,
    pub heading_path: Vec<String>,

    // retrieval
    pub importance_score: f32,
    pub searchable_terms: Vec<String>,

    pub confidence: Confidence,
    /// Keys from `ChunkIngestInput::properties` not covered by the fixed set
    /// documented in spec.md §9 (`quality_score`, `chunking_strategy`,
    /// `boundary_quality`, `overlap_size`) are preserved verbatim here.
    pub extra_properties: HashMap<String, serde_json::Value>,
}

impl Default for ChunkMetadata {
    fn default() -> Self {
        Self {
            char_count: 0,
            estimated_token_count: 0,
            sentence_count: 0,
            readability: 0.0,
            language: "und".to_string(),
            keywords: Vec::new(),
            entities: Vec::new(),
            topics: Vec::new(),
            content_type: "text".to_string(),
            section_level: 0,
            section_title: None,
            preceding_context: None,
            following_context: None,
            heading_path: Vec::new(),
            importance_score: 0.0,
            searchable_terms: Vec::new(),
            confidence: Confidence::Medium,
            extra_properties: HashMap::new(),
        }
    }
}

/// Weights for `ChunkQuality::aggregate`. Defaults per spec.md §9's second Open
/// Question; deployments may override via `RagConfig`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QualityWeights {
    pub completeness: f32,
    pub information_density: f32,
    pub coherence: f32,
    pub authority: f32,
    pub freshness: f32,
    pub query_relevance: f32,
}

impl Default for QualityWeights {
    fn default() -> Self {
        Self {
            completeness: 0.25,
            information_density: 0.20,
            coherence: 0.20,
            authority: 0.15,
            freshness: 0.10,
            query_relevance: 0.10,
        }
    }
}

/// Composite chunk-quality score. Sub-dimensions are each in `[0, 1]` except the
/// two counters, which are monotone (see invariant 5 in spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkQuality {
    pub completeness: f32,
    pub information_density: f32,
    pub coherence: f32,
    pub authority: f32,
    pub freshness: f32,
    pub query_relevance: f32,
    pub click_through_rate: f32,
    pub user_rating: f32,
    pub retrieval_count: u64,
    pub last_accessed: Option<DateTime<Utc>>,
}

impl Default for ChunkQuality {
    fn default() -> Self {
        Self {
            completeness: 0.5,
            information_density: 0.5,
            coherence: 0.5,
            authority: 0.5,
            freshness: 0.5,
            query_relevance: 0.0,
            click_through_rate: 0.0,
            user_rating: 0.0,
            retrieval_count: 0,
            last_accessed: None,
        }
    }
}

impl ChunkQuality {
    /// Minimal quality object used when enrichment degrades (LLM failure etc.),
    /// per spec.md §4.4: "quality = 0.1 and a confidence = Low marker".
    pub fn degraded() -> Self {
        Self {
            completeness: 0.1,
            information_density: 0.1,
            coherence: 0.1,
            authority: 0.1,
            freshness: 0.1,
            query_relevance: 0.0,
            click_through_rate: 0.0,
            user_rating: 0.0,
            retrieval_count: 0,
            last_accessed: None,
        }
    }

    /// Weighted mean aggregate over the `[0,1]` sub-dimensions. The two
    /// counters (`click_through_rate` rolled in as a soft signal,
    /// `retrieval_count`/`last_accessed` excluded) do not participate directly;
    /// `click_through_rate` and `user_rating` are blended in at a fixed 50/50
    /// split against the weighted core to avoid needing yet more configurable
    /// weights for signals that are frequently absent (cold chunks).
    pub fn aggregate(&self, weights: &QualityWeights) -> f32 {
        let core = weights.completeness * self.completeness
            + weights.information_density * self.information_density
            + weights.coherence * self.coherence
            + weights.authority * self.authority
            + weights.freshness * self.freshness
            + weights.query_relevance * self.query_relevance;
        let engagement = (self.click_through_rate + self.user_rating) / 2.0;
        (core * 0.8 + engagement * 0.2).clamp(0.0, 1.0)
    }

    /// Record a retrieval event: monotone counter, forward-only timestamp.
    pub fn record_access(&mut self, at: DateTime<Utc>) {
        self.retrieval_count = self.retrieval_count.saturating_add(1);
        self.last_accessed = Some(match self.last_accessed {
            Some(prev) if prev >= at => prev,
            _ => at,
        });
    }
}

/// Directed edge type between two chunks. See spec.md §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationshipType {
    Sequential,
    Semantic,
    Reference,
    Causal,
    Hierarchical,
    Similarity,
    Contradiction,
    Supplementary,
}

/// A directed, weighted edge in the chunk relationship graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRelationship {
    pub from_chunk: Uuid,
    pub to_chunk: Uuid,
    pub relationship_type: RelationshipType,
    pub strength: f32,
}

impl ChunkRelationship {
    pub fn new(from: Uuid, to: Uuid, relationship_type: RelationshipType, strength: f32) -> Self {
        Self {
            from_chunk: from,
            to_chunk: to,
            relationship_type,
            strength: strength.clamp(0.0, 1.0),
        }
    }

    /// Two relationships are the "same edge" for idempotent insertion when
    /// from/to/type match (spec.md §3 invariant 2), regardless of strength.
    pub fn same_edge(&self, other: &ChunkRelationship) -> bool {
        self.from_chunk == other.from_chunk
            && self.to_chunk == other.to_chunk
            && self.relationship_type == other.relationship_type
    }
}

/// The atomic indexing unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: Uuid,
    pub document_id: Uuid,
    pub index: u32,
    pub text: String,
    pub embedding: Option<Embedding>,
    pub metadata: ChunkMetadata,
    pub quality: ChunkQuality,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Chunk {
    pub fn new(document_id: Uuid, index: u32, text: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            document_id,
            index,
            text: text.into(),
            embedding: None,
            metadata: ChunkMetadata::default(),
            quality: ChunkQuality::default(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Raw chunk input as handed to `index_chunks`, mirroring the dynamic
/// `ChunkIngestInput` described in spec.md §9: the core never introspects
/// `properties` beyond the documented fixed keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkIngestInput {
    pub content: String,
    pub index: u32,
    pub properties: HashMap<String, serde_json::Value>,
}

impl ChunkIngestInput {
    pub fn quality_score_hint(&self) -> Option<f32> {
        self.properties.get("quality_score").and_then(|v| v.as_f64()).map(|v| v as f32)
    }

    pub fn chunking_strategy(&self) -> Option<&str> {
        self.properties.get("chunking_strategy").and_then(|v| v.as_str())
    }

    pub fn boundary_quality(&self) -> Option<f32> {
        self.properties.get("boundary_quality").and_then(|v| v.as_f64()).map(|v| v as f32)
    }

    pub fn overlap_size(&self) -> Option<u64> {
        self.properties.get("overlap_size").and_then(|v| v.as_u64())
    }

    const KNOWN_KEYS: [&'static str; 4] =
        ["quality_score", "chunking_strategy", "boundary_quality", "overlap_size"];

    /// Unknown keys are preserved verbatim into `ChunkMetadata::extra_properties`.
    pub fn unknown_properties(&self) -> HashMap<String, serde_json::Value> {
        self.properties
            .iter()
            .filter(|(k, _)| !Self::KNOWN_KEYS.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// Lifecycle status of a logical document grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentStatus {
    Pending,
    Processing,
    Indexed,
    Failed,
    Deleted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub file_name: Option<String>,
    pub chunk_ids: Vec<Uuid>,
    pub metadata: HashMap<String, String>,
    pub status: DocumentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    pub fn new(id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id,
            file_name: None,
            chunk_ids: Vec::new(),
            metadata: HashMap::new(),
            status: DocumentStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A semantic-cache entry. `cached_result_payload` is opaque JSON so the cache
/// never needs to know the shape of search results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub original_query: String,
    pub query_embedding: Embedding,
    pub cached_result_payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub hit_count: u64,
    pub last_accessed: DateTime<Utc>,
}

impl CacheEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(expiry) if now >= expiry)
    }
}

/// A cache hit: the matched entry plus the similarity that produced the
/// match, per spec.md §4.11's `CacheResult` contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheResult {
    pub original_query: String,
    pub similarity_score: f32,
    pub results: serde_json::Value,
    pub cached_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub hit_count: u64,
    pub last_accessed: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_similarity_identical_vectors_is_one() {
        let a = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_orthogonal_vectors_is_zero() {
        assert!((cosine_similarity(&[1.0, 0.0], &[0.0, 1.0])).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_dimension_mismatch_is_zero_not_panic() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]), 0.0);
    }

    #[test]
    fn quality_record_access_is_monotone() {
        let mut q = ChunkQuality::default();
        let t1 = Utc::now();
        let t2 = t1 + chrono::Duration::seconds(10);
        q.record_access(t2);
        q.record_access(t1);
        assert_eq!(q.retrieval_count, 2);
        assert_eq!(q.last_accessed, Some(t2));
    }

    #[test]
    fn relationship_same_edge_ignores_strength() {
        let a_id = Uuid::new_v4();
        let b_id = Uuid::new_v4();
        let r1 = ChunkRelationship::new(a_id, b_id, RelationshipType::Semantic, 0.8);
        let r2 = ChunkRelationship::new(a_id, b_id, RelationshipType::Semantic, 0.4);
        assert!(r1.same_edge(&r2));
    }
}
