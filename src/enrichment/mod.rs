//! Metadata Enricher component: derives `ChunkMetadata`, quality scores, and
//! inter-chunk relationships.
//!
//! All metadata here must be regenerable from `text + neighbors +
//! document_metadata` alone (spec.md §3, invariant 4) — nothing is sourced
//! from state the enricher doesn't take as input.

pub mod tfidf;

use rayon::prelude::*;

use crate::adapters::TextCompletionService;
use crate::types::{
    Chunk, ChunkMetadata, ChunkQuality, ChunkRelationship, Confidence, QualityWeights,
    RelationshipType,
};

pub struct MetadataEnricher {
    quality_weights: QualityWeights,
}

impl MetadataEnricher {
    pub fn new(quality_weights: QualityWeights) -> Self {
        Self { quality_weights }
    }

    /// Derives structural/semantic metadata for a single chunk. `completion`
    /// is consulted for entity/topic extraction when present; on failure or
    /// absence this falls back to the TF-IDF heuristic and marks the result
    /// `Confidence::Low`, per spec.md §4.4.
    pub async fn enrich(
        &self,
        text: &str,
        document_metadata: &std::collections::HashMap<String, String>,
        completion: Option<&dyn TextCompletionService>,
    ) -> ChunkMetadata {
        let keywords = tfidf::extract_keywords(text, 10);
        let sentence_count = tfidf::count_sentences(text);
        let readability = tfidf::estimate_readability(text);

        let mut metadata = ChunkMetadata {
            char_count: text.chars().count(),
            estimated_token_count: (text.split_whitespace().count() as f32 * 1.3) as usize,
            sentence_count,
            readability,
            language: "en".to_string(),
            keywords: keywords.clone(),
            entities: Vec::new(),
            topics: Vec::new(),
            content_type: "text".to_string(),
            section_level: 0,
            section_title: document_metadata.get("section_title").cloned(),
            preceding_context: None,
            following_context: None,
            heading_path: Vec::new(),
            importance_score: 0.0,
            searchable_terms: keywords.iter().map(|(term, _)| term.clone()).collect(),
            confidence: Confidence::High,
            extra_properties: Default::default(),
        };

        if let Some(completion) = completion {
            match self.extract_entities_and_topics(text, completion).await {
                Ok((entities, topics)) => {
                    metadata.entities = entities;
                    metadata.topics = topics;
                    metadata.confidence = Confidence::High;
                }
                Err(_) => {
                    metadata.confidence = Confidence::Low;
                }
            }
        } else {
            metadata.confidence = Confidence::Medium;
        }

        metadata.importance_score = self.estimate_importance(&metadata);
        metadata
    }

    async fn extract_entities_and_topics(
        &self,
        text: &str,
        completion: &dyn TextCompletionService,
    ) -> anyhow::Result<(Vec<String>, Vec<String>)> {
        let prompt = format!(
            "Extract up to 5 named entities and 3 topics from this text as JSON \
             {{\"entities\": [...], \"topics\": [...]}}. Text: {text}"
        );
        let timeout = tokio::time::Duration::from_secs(10);
        let raw = tokio::time::timeout(timeout, completion.complete(&prompt)).await??;
        let parsed: serde_json::Value = serde_json::from_str(&raw)
            .or_else(|_| crate::adapters::completion::extract_json_object(&raw))?;
        let entities = parsed
            .get("entities")
            .and_then(|v| v.as_array())
            .map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect())
            .unwrap_or_default();
        let topics = parsed
            .get("topics")
            .and_then(|v| v.as_array())
            .map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect())
            .unwrap_or_default();
        Ok((entities, topics))
    }

    fn estimate_importance(&self, metadata: &ChunkMetadata) -> f32 {
        let density = (metadata.keywords.len() as f32 / 10.0).min(1.0);
        let length_factor = (metadata.char_count as f32 / 500.0).min(1.0);
        (density * 0.6 + length_factor * 0.4).clamp(0.0, 1.0)
    }

    /// Derives `Sequential` edges between consecutive chunks of the same
    /// document, plus `Semantic` edges between chunks whose embeddings are
    /// close enough to be considered related. Grounded in the teacher's
    /// `graph/knowledge_graph.rs` edge-building pattern, generalized from
    /// entities to embeddings since this crate has no separate entity graph.
    pub fn analyze_relationships(&self, chunks: &[Chunk], similarity_threshold: f32) -> Vec<ChunkRelationship> {
        let mut relationships = Vec::new();
        let mut sorted: Vec<&Chunk> = chunks.iter().collect();
        sorted.sort_by_key(|c| c.index);

        for window in sorted.windows(2) {
            let (a, b) = (window[0], window[1]);
            if a.document_id == b.document_id {
                relationships.push(ChunkRelationship::new(a.id, b.id, RelationshipType::Sequential, 1.0));
            }
        }

        // The pairwise comparison below is O(n^2) in the chunk count; farm
        // the outer loop out to rayon's pool since each row is independent
        // and embeddings are only ever read, never mutated.
        let semantic: Vec<ChunkRelationship> = (0..sorted.len())
            .into_par_iter()
            .flat_map_iter(|i| {
                let sorted = &sorted;
                (i + 1..sorted.len()).filter_map(move |j| {
                    let (a, b) = (sorted[i], sorted[j]);
                    let (ea, eb) = (a.embedding.as_ref()?, b.embedding.as_ref()?);
                    let similarity = ea.cosine_similarity(eb);
                    (similarity >= similarity_threshold)
                        .then(|| ChunkRelationship::new(a.id, b.id, RelationshipType::Semantic, similarity))
                })
            })
            .collect();
        relationships.extend(semantic);

        relationships
    }

    /// Scores a chunk against an optional query context. With no query
    /// context, `query_relevance` stays at its default and the score reduces
    /// to static quality signals only.
    pub fn evaluate_quality(&self, chunk: &Chunk, query_embedding: Option<&crate::types::Embedding>) -> ChunkQuality {
        let mut quality = chunk.quality.clone();
        quality.completeness = (chunk.metadata.char_count as f32 / 800.0).min(1.0);
        quality.information_density = (chunk.metadata.keywords.len() as f32 / 8.0).min(1.0);
        quality.coherence = (chunk.metadata.readability / 100.0).clamp(0.0, 1.0);

        if let (Some(query), Some(chunk_embedding)) = (query_embedding, &chunk.embedding) {
            quality.query_relevance = query.cosine_similarity(chunk_embedding).clamp(0.0, 1.0);
        }

        quality
    }

    pub fn aggregate_score(&self, quality: &ChunkQuality) -> f32 {
        quality.aggregate(&self.quality_weights)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap;
    use uuid::Uuid;

    struct FailingCompletion;
    #[async_trait::async_trait]
    impl TextCompletionService for FailingCompletion {
        async fn complete(&self, _prompt: &str) -> anyhow::Result<String> {
            Err(anyhow::anyhow!("provider unavailable"))
        }
    }

    struct JsonCompletion;
    #[async_trait::async_trait]
    impl TextCompletionService for JsonCompletion {
        async fn complete(&self, _prompt: &str) -> anyhow::Result<String> {
            Ok(r#"{"entities": ["Rust"], "topics": ["systems programming"]}"#.to_string())
        }
    }

    #[tokio::test]
    async fn enrich_falls_back_to_low_confidence_on_completion_failure() {
        let enricher = MetadataEnricher::new(QualityWeights::default());
        let metadata = enricher.enrich("some text about rust", &HashMap::new(), Some(&FailingCompletion)).await;
        assert_eq!(metadata.confidence, Confidence::Low);
        assert!(metadata.entities.is_empty());
    }

    #[tokio::test]
    async fn enrich_without_completion_is_medium_confidence() {
        let enricher = MetadataEnricher::new(QualityWeights::default());
        let metadata = enricher.enrich("some text", &HashMap::new(), None).await;
        assert_eq!(metadata.confidence, Confidence::Medium);
    }

    #[tokio::test]
    async fn enrich_with_completion_extracts_entities() {
        let enricher = MetadataEnricher::new(QualityWeights::default());
        let metadata = enricher.enrich("Rust is great", &HashMap::new(), Some(&JsonCompletion)).await;
        assert_eq!(metadata.entities, vec!["Rust".to_string()]);
        assert_eq!(metadata.confidence, Confidence::High);
    }

    #[test]
    fn analyze_relationships_links_consecutive_chunks_sequentially() {
        let enricher = MetadataEnricher::new(QualityWeights::default());
        let doc = Uuid::new_v4();
        let now = Utc::now();
        let chunks = vec![Chunk::new(doc, 0, "a", now), Chunk::new(doc, 1, "b", now)];
        let relationships = enricher.analyze_relationships(&chunks, 0.9);
        assert!(relationships.iter().any(|r| r.relationship_type == RelationshipType::Sequential));
    }
}
