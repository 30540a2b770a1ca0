//! Top-level facade wiring every component into the two operations callers
//! actually need: `index_chunks` and `search`. Grounded in the teacher's
//! `rag_engine.rs`, which plays the same role tying its storage, search, and
//! reranking layers together behind a small public surface.

use std::sync::Arc;

use uuid::Uuid;

use crate::adapters::{Clock, EmbeddingService, Random, TextCompletionService};
use crate::analyzer::{QueryAnalyzer, RetrievalStrategy};
use crate::cache::SemanticCache;
use crate::config::RagConfig;
use crate::enrichment::MetadataEnricher;
use crate::error::{RagError, RagResult};
use crate::hybrid;
use crate::rerank::{RerankCandidate, Reranker};
use crate::repository::ChunkRepository;
use crate::small_to_big::SmallToBigRetriever;
use crate::sparse_index::SparseIndex;
use crate::transform::QueryTransformer;
use crate::types::{Chunk, ChunkIngestInput, Document, DocumentStatus, Embedding};
use crate::vector_store::VectorStore;

pub struct RagEngine {
    vector_store: VectorStore,
    sparse_index: SparseIndex,
    repository: ChunkRepository,
    enricher: MetadataEnricher,
    analyzer: QueryAnalyzer,
    transformer: QueryTransformer,
    small_to_big: SmallToBigRetriever,
    reranker: Reranker,
    cache: SemanticCache,
    embedding_service: Arc<dyn EmbeddingService>,
    completion_service: Option<Arc<dyn TextCompletionService>>,
    clock: Arc<dyn Clock>,
    random: Arc<dyn Random>,
    config: RagConfig,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SearchResult {
    pub chunk_id: Uuid,
    pub text: String,
    pub score: f32,
}

pub struct RagEngineParts {
    pub vector_store: VectorStore,
    pub sparse_index: SparseIndex,
    pub repository: ChunkRepository,
    pub embedding_service: Arc<dyn EmbeddingService>,
    pub completion_service: Option<Arc<dyn TextCompletionService>>,
    pub clock: Arc<dyn Clock>,
    pub random: Arc<dyn Random>,
    pub config: RagConfig,
}

impl RagEngine {
    pub fn new(parts: RagEngineParts) -> Self {
        Self {
            vector_store: parts.vector_store,
            sparse_index: parts.sparse_index,
            repository: parts.repository,
            enricher: MetadataEnricher::new(parts.config.quality_weights),
            analyzer: QueryAnalyzer::new(parts.config.query_analyzer.clone()),
            transformer: QueryTransformer::new(parts.config.transform.clone()),
            small_to_big: SmallToBigRetriever::new(parts.config.small_to_big.clone()),
            reranker: Reranker::new(parts.config.rerank.clone(), parts.config.quality_weights),
            cache: SemanticCache::new(Arc::new(crate::cache::memory_backend::MemoryCacheBackend::new()), parts.config.cache.clone()),
            embedding_service: parts.embedding_service,
            completion_service: parts.completion_service,
            clock: parts.clock,
            random: parts.random,
            config: parts.config,
        }
    }

    /// Ingests a batch of chunks belonging to one document: embeds, enriches,
    /// derives relationships, and commits to all three stores. On a failure
    /// partway through, already-written chunks for this batch are rolled
    /// back from whichever stores succeeded, per spec.md §5's cross-store
    /// consistency invariant.
    pub async fn index_chunks(&self, document_id: Uuid, inputs: Vec<ChunkIngestInput>) -> RagResult<Vec<Uuid>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let now = self.clock.now();
        let texts: Vec<String> = inputs.iter().map(|i| i.content.clone()).collect();
        let embeddings = self.embedding_service.embed_batch(&texts).await.map_err(RagError::from)?;
        if embeddings.len() != inputs.len() {
            return Err(RagError::consistency("embedding provider returned a different count than requested"));
        }

        let mut chunks = Vec::with_capacity(inputs.len());
        for (input, embedding) in inputs.iter().zip(embeddings.into_iter()) {
            let mut chunk = Chunk::new(document_id, input.index, input.content.clone(), now);
            let mut metadata = self.enricher.enrich(&input.content, &Default::default(), self.completion_service.as_deref()).await;
            metadata.extra_properties = input.unknown_properties();
            chunk.metadata = metadata;
            if let Some(hint) = input.quality_score_hint() {
                chunk.quality.completeness = hint.clamp(0.0, 1.0);
            }
            chunk.embedding = Some(embedding);
            chunks.push(chunk);
        }

        let relationships = self.enricher.analyze_relationships(&chunks, 0.85);
        let chunk_ids: Vec<Uuid> = chunks.iter().map(|c| c.id).collect();
        let vector_records: Vec<(Uuid, Vec<f32>)> = chunks
            .iter()
            .filter_map(|c| c.embedding.as_ref().map(|e| (c.id, e.values.clone())))
            .collect();
        let text_records: Vec<(Uuid, String)> = chunks.iter().map(|c| (c.id, c.text.clone())).collect();

        if let Err(err) = self.repository.put_batch(chunks).await {
            return Err(err);
        }

        if let Err(err) = self.vector_store.put_batch(vector_records, self.random.as_ref()).await {
            tracing::warn!(document_id = %document_id, %err, "vector store write failed, rolling back repository writes");
            self.rollback_chunks(&chunk_ids).await;
            return Err(RagError::consistency(format!("vector store write failed, rolled back: {err}")));
        }

        if let Err(err) = self.sparse_index.index_batch(&text_records) {
            tracing::warn!(document_id = %document_id, %err, "sparse index write failed, rolling back repository and vector writes");
            self.rollback_chunks(&chunk_ids).await;
            for id in &chunk_ids {
                let _ = self.vector_store.delete(*id, self.random.as_ref()).await;
            }
            return Err(RagError::consistency(format!("sparse index write failed, rolled back: {err}")));
        }

        for relationship in relationships {
            self.repository.put_relationship(relationship).await?;
        }

        let mut document = self.repository.get_document(document_id).await?.unwrap_or_else(|| Document::new(document_id, now));
        document.chunk_ids.extend(chunk_ids.iter().copied());
        document.status = DocumentStatus::Indexed;
        document.updated_at = now;
        self.repository.put_document(document).await?;

        tracing::info!(document_id = %document_id, chunk_count = chunk_ids.len(), "ingest commit complete");
        Ok(chunk_ids)
    }

    async fn rollback_chunks(&self, ids: &[Uuid]) {
        for id in ids {
            let _ = self.repository.delete(*id).await;
        }
    }

    /// Full search pipeline: cache lookup, analysis, dense+sparse retrieval,
    /// optional decomposition/expansion, reranking, cache write-through.
    pub async fn search(&self, query: &str, k: usize) -> RagResult<Vec<SearchResult>> {
        self.search_internal(query, k, None, true).await
    }

    /// Runs the pipeline under a caller-chosen strategy instead of the
    /// analyzer's recommendation, bypassing the cache. Used by the
    /// orchestrator's A/B shadow runs, which must never read or overwrite
    /// the primary strategy's cached result for the same query embedding.
    pub async fn search_with_strategy(
        &self,
        query: &str,
        k: usize,
        strategy: RetrievalStrategy,
    ) -> RagResult<Vec<SearchResult>> {
        self.search_internal(query, k, Some(strategy), false).await
    }

    /// Like `search`, but lets the orchestrator's per-query-type preference
    /// table override the analyzer's own recommendation while still reading
    /// and writing through the semantic cache.
    pub async fn search_preferring(
        &self,
        query: &str,
        k: usize,
        preferred_strategy: Option<RetrievalStrategy>,
    ) -> RagResult<Vec<SearchResult>> {
        self.search_internal(query, k, preferred_strategy, true).await
    }

    pub fn analyze(&self, query: &str) -> crate::analyzer::QueryAnalysis {
        self.analyzer.analyze(query)
    }

    /// The Transformer's multi-label intent read (spec.md §4.6 `intent()`),
    /// exposed alongside `analyze` for callers that want the ranked view
    /// rather than the single strategy-selecting classification.
    pub fn classify_intent(&self, query: &str) -> crate::transform::IntentResult {
        self.transformer.intent(query)
    }

    async fn search_internal(
        &self,
        query: &str,
        k: usize,
        strategy_override: Option<RetrievalStrategy>,
        use_cache: bool,
    ) -> RagResult<Vec<SearchResult>> {
        let query_embedding = self.embedding_service.embed_one(query).await.map_err(RagError::from)?;

        if use_cache {
            let threshold = self.config.cache.similarity_threshold;
            if let Some(cached) = self.cache.get(&query_embedding, threshold, k, self.clock.as_ref()).await? {
                if let Ok(results) = serde_json::from_value::<Vec<SearchResult>>(cached.results) {
                    tracing::trace!(%query, similarity_score = cached.similarity_score, "semantic cache hit");
                    return Ok(results);
                }
            }
        }

        let mut analysis = self.analyzer.analyze(query);
        if let Some(strategy) = strategy_override {
            tracing::debug!(?strategy, "strategy overridden by caller");
            analysis.recommended_strategy = strategy;
        }
        let fused = self.retrieve(query, &query_embedding, &analysis, k).await?;

        let candidates = self.build_rerank_candidates(&fused).await?;
        let reranked = self
            .reranker
            .rerank(&candidates, query, &query_embedding, self.completion_service.as_deref())
            .await;

        let mut results = Vec::with_capacity(reranked.len());
        for r in reranked {
            if let Some(chunk) = self.repository.get(r.id).await? {
                let mut quality = chunk.quality.clone();
                quality.record_access(self.clock.now());
                let mut updated = chunk.clone();
                updated.quality = quality;
                self.repository.put(updated).await?;
                results.push(SearchResult { chunk_id: r.id, text: chunk.text, score: r.score });
            }
        }

        if use_cache {
            if let Ok(payload) = serde_json::to_value(&results) {
                self.cache.set(query.to_string(), query_embedding, payload, self.clock.as_ref()).await?;
            }
        }

        Ok(results)
    }

    async fn retrieve(
        &self,
        query: &str,
        query_embedding: &crate::types::Embedding,
        analysis: &crate::analyzer::QueryAnalysis,
        k: usize,
    ) -> RagResult<Vec<hybrid::HybridResult>> {
        match analysis.recommended_strategy {
            RetrievalStrategy::VectorOnly => {
                let vector_hits = self.vector_store.search(&query_embedding.values, k, f32::NEG_INFINITY)?;
                Ok(vector_hits
                    .into_iter()
                    .enumerate()
                    .map(|(rank, (id, score))| hybrid::HybridResult {
                        id,
                        vector_rank: Some(rank + 1),
                        sparse_rank: None,
                        fused_score: score,
                        vector_score: Some(score),
                        sparse_score: None,
                        matched_terms: Vec::new(),
                        source: hybrid::HybridSource::Vector,
                    })
                    .collect())
            }
            RetrievalStrategy::SparseOnly => {
                let sparse_hits = self.sparse_index.search(query, k);
                Ok(sparse_hits
                    .into_iter()
                    .enumerate()
                    .map(|(rank, (id, score))| hybrid::HybridResult {
                        id,
                        vector_rank: None,
                        sparse_rank: Some(rank + 1),
                        fused_score: score,
                        vector_score: None,
                        sparse_score: Some(score),
                        matched_terms: self.sparse_index.matched_terms(query, id),
                        source: hybrid::HybridSource::Sparse,
                    })
                    .collect())
            }
            RetrievalStrategy::Hybrid => self.hybrid_search(query, query_embedding, analysis.word_count, k),
            RetrievalStrategy::DecomposeThenHybrid => {
                let decomposed = self.transformer.decompose(query);
                let mut result_lists = Vec::with_capacity(decomposed.sub_queries.len());
                for sub_query in &decomposed.sub_queries {
                    let sub_embedding = self.embedding_service.embed_one(sub_query).await.map_err(RagError::from)?;
                    let fused = self.hybrid_search(sub_query, &sub_embedding, analysis.word_count, k)?;
                    result_lists.push(fused);
                }
                Ok(crate::transform::merge_results(result_lists))
            }
            RetrievalStrategy::HybridThenExpand => {
                let fused = self.hybrid_search(query, query_embedding, analysis.word_count, k)?;
                let seed_ids: Vec<Uuid> = fused.iter().map(|r| r.id).collect();
                let windows = self.small_to_big.expand(&self.repository, &seed_ids, analysis.complexity).await?;
                let expanded: Vec<hybrid::HybridResult> = windows
                    .into_iter()
                    .map(|w| hybrid::HybridResult {
                        id: w.seed_chunk_id,
                        vector_rank: None,
                        sparse_rank: None,
                        fused_score: w.quality_score,
                        vector_score: None,
                        sparse_score: None,
                        matched_terms: Vec::new(),
                        source: hybrid::HybridSource::Both,
                    })
                    .collect();
                Ok(if expanded.is_empty() { fused } else { expanded })
            }
            RetrievalStrategy::HyDE => {
                let search_embedding = match self.completion_service.as_deref() {
                    Some(completion) => {
                        let hyde = self.transformer.hyde(query, completion).await;
                        self.embedding_service
                            .embed_one(&hyde.hypothetical_document)
                            .await
                            .map_err(RagError::from)?
                    }
                    // No completion service configured: fail open to the raw
                    // query embedding rather than error out.
                    None => query_embedding.clone(),
                };
                self.hybrid_search(query, &search_embedding, analysis.word_count, k)
            }
            RetrievalStrategy::StepBack => {
                Err(RagError::input("retrieval strategy StepBack has no executor"))
            }
            RetrievalStrategy::SelfRag => {
                Err(RagError::input("retrieval strategy SelfRag has no executor"))
            }
        }
    }

    fn hybrid_search(
        &self,
        query: &str,
        query_embedding: &crate::types::Embedding,
        word_count: usize,
        k: usize,
    ) -> RagResult<Vec<hybrid::HybridResult>> {
        let vector_hits = self.vector_store.search(&query_embedding.values, k, f32::NEG_INFINITY)?;
        let sparse_hits = self.sparse_index.search(query, k);
        let mut results = hybrid::fuse(&vector_hits, &sparse_hits, word_count, &self.config.hybrid);
        for result in &mut results {
            if result.sparse_score.is_some() {
                result.matched_terms = self.sparse_index.matched_terms(query, result.id);
            }
        }
        Ok(results)
    }

    async fn build_rerank_candidates(&self, fused: &[hybrid::HybridResult]) -> RagResult<Vec<RerankCandidate>> {
        let mut candidates = Vec::with_capacity(fused.len());
        for (rank, result) in fused.iter().enumerate() {
            if let Some(chunk) = self.repository.get(result.id).await? {
                candidates.push(RerankCandidate {
                    id: chunk.id,
                    text: chunk.text,
                    embedding: chunk.embedding,
                    quality: chunk.quality,
                    original_rank: rank,
                });
            }
        }
        Ok(candidates)
    }

    pub async fn update_chunk(&self, chunk_id: Uuid, new_text: String) -> RagResult<()> {
        let Some(mut chunk) = self.repository.get(chunk_id).await? else {
            return Err(RagError::input(format!("chunk {chunk_id} does not exist")));
        };
        let now = self.clock.now();
        let embedding = self.embedding_service.embed_one(&new_text).await.map_err(RagError::from)?;
        let metadata = self.enricher.enrich(&new_text, &Default::default(), self.completion_service.as_deref()).await;

        chunk.text = new_text.clone();
        chunk.embedding = Some(embedding.clone());
        chunk.metadata = metadata;
        chunk.updated_at = now;

        self.vector_store.put(chunk_id, embedding.values.clone(), self.random.as_ref()).await?;
        self.sparse_index.index(chunk_id, &new_text)?;
        self.repository.put(chunk).await?;
        Ok(())
    }

    pub async fn delete_document(&self, document_id: Uuid) -> RagResult<u64> {
        let chunks = self.repository.get_by_document(document_id).await?;
        for chunk in &chunks {
            self.sparse_index.delete(chunk.id)?;
        }
        let deleted_vectors = self.vector_store.delete_by_document(document_id, self.random.as_ref()).await?;
        let deleted_chunks = self.repository.delete_document(document_id).await?;
        self.repository.delete_document_record(document_id).await?;
        Ok(deleted_vectors.max(deleted_chunks))
    }

    pub async fn get_statistics(&self) -> RagResult<EngineStatistics> {
        let vector_stats = self.vector_store.stats().await?;
        let cache_stats = self.cache.statistics().await?;
        Ok(EngineStatistics {
            vector_count: vector_stats.vector_count,
            sparse_document_count: self.sparse_index.len() as u64,
            cache_entry_count: cache_stats.entry_count as u64,
            cache_hits: cache_stats.hits,
            cache_misses: cache_stats.misses,
        })
    }

    /// Best-effort pattern invalidation (spec.md §6 `invalidate_cache(pattern)`).
    /// An empty pattern clears the whole cache rather than matching every
    /// entry's text one at a time.
    pub async fn invalidate_cache(&self, pattern: &str) -> RagResult<u64> {
        if pattern.is_empty() {
            let count = self.cache.statistics().await?.entry_count as u64;
            self.cache.clear().await?;
            return Ok(count);
        }
        self.cache.invalidate(pattern).await
    }

    /// QuOTE-style query expansion for callers that want to widen recall
    /// themselves (e.g. presenting "related questions" in a UI) without
    /// running a full search. Returns the literal query as its only
    /// expansion when no completion service is configured.
    pub async fn expand_query(&self, query: &str) -> crate::transform::QuoteResult {
        match self.completion_service.as_deref() {
            Some(completion) => self.transformer.quote(query, completion).await,
            None => crate::transform::QuoteResult::literal(query),
        }
    }

    /// Records explicit user feedback (click-through or an explicit rating)
    /// against a chunk's quality signal, feeding future reranking.
    pub async fn record_feedback(&self, chunk_id: Uuid, clicked: bool, rating: Option<f32>) -> RagResult<()> {
        let Some(mut chunk) = self.repository.get(chunk_id).await? else {
            return Err(RagError::input(format!("chunk {chunk_id} does not exist")));
        };
        if clicked {
            let n = chunk.quality.retrieval_count.max(1) as f32;
            chunk.quality.click_through_rate = (chunk.quality.click_through_rate * (n - 1.0) + 1.0) / n;
        }
        if let Some(rating) = rating {
            chunk.quality.user_rating = rating.clamp(0.0, 1.0);
        }
        chunk.quality.record_access(self.clock.now());
        self.repository.put(chunk).await
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EngineStatistics {
    pub vector_count: u64,
    pub sparse_document_count: u64,
    pub cache_entry_count: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::clock::test_support::{FixedClock, ScriptedRandom};
    use crate::config::{RagConfig, SparseIndexConfig, VectorStoreConfig};
    use crate::repository::memory_backend::MemoryRepositoryBackend;
    use crate::sparse_index::SparseIndex;
    use crate::vector_store::memory_backend::MemoryVectorBackend;
    use chrono::Utc;
    use std::collections::HashMap;

    struct TestEmbeddingService;

    #[async_trait::async_trait]
    impl EmbeddingService for TestEmbeddingService {
        async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Embedding>> {
            Ok(texts.iter().map(|t| Embedding::new(vector_for(t))).collect())
        }

        fn dimension(&self) -> usize {
            2
        }
    }

    /// Fixed, hand-picked vectors for the exact strings the scenario tests
    /// below use, standing in for a real embedding model: same-topic text
    /// gets a near-identical vector, unrelated text gets an orthogonal one.
    fn vector_for(text: &str) -> Vec<f32> {
        match text {
            "how to extend smartphone battery life" => vec![1.0, 0.0],
            "make my phone last longer" => vec![1.0, 0.0],
            "cooking recipes for pasta" => vec![0.0, 1.0],
            _ => vec![0.5, 0.5],
        }
    }

    async fn test_engine() -> (RagEngine, Arc<FixedClock>, Arc<ScriptedRandom>) {
        let random = Arc::new(ScriptedRandom::new(vec![0.9, 0.8, 0.7, 0.6, 0.5]));
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let dimension_config = VectorStoreConfig { dimension: 2, ..Default::default() };
        let vector_store = VectorStore::new(
            Arc::new(MemoryVectorBackend::new()),
            dimension_config.clone(),
            random.as_ref(),
        )
        .await
        .unwrap();
        let sparse_index = SparseIndex::in_memory(SparseIndexConfig::default());
        let repository = ChunkRepository::new(Arc::new(MemoryRepositoryBackend::new()));
        let config = RagConfig { vector_store: dimension_config, ..Default::default() };

        let engine = RagEngine::new(RagEngineParts {
            vector_store,
            sparse_index,
            repository,
            embedding_service: Arc::new(TestEmbeddingService),
            completion_service: None,
            clock: clock.clone(),
            random: random.clone(),
            config,
        });
        (engine, clock, random)
    }

    fn input(content: &str, index: u32) -> ChunkIngestInput {
        ChunkIngestInput { content: content.to_string(), index, properties: HashMap::new() }
    }

    /// S1 — exact hit via BM25: a lexical-only query should surface the one
    /// chunk sharing its vocabulary regardless of embedding noise on the rest.
    #[tokio::test]
    async fn s1_exact_hit_via_bm25() {
        let (engine, _clock, _random) = test_engine().await;
        let doc = Uuid::new_v4();
        engine
            .index_chunks(
                doc,
                vec![
                    input("The quick brown fox", 0),
                    input("Lorem ipsum dolor", 1),
                    input("Battery lifetime optimization guide", 2),
                ],
            )
            .await
            .unwrap();

        let results = engine.search_with_strategy("battery", 3, RetrievalStrategy::SparseOnly).await.unwrap();
        assert_eq!(results[0].text, "Battery lifetime optimization guide");
    }

    /// S2 — dense win on paraphrase: no shared vocabulary with the relevant
    /// chunk, so only the embedding signal can surface it.
    #[tokio::test]
    async fn s2_dense_win_on_paraphrase() {
        let (engine, _clock, _random) = test_engine().await;
        let doc = Uuid::new_v4();
        engine
            .index_chunks(
                doc,
                vec![input("how to extend smartphone battery life", 0), input("cooking recipes for pasta", 1)],
            )
            .await
            .unwrap();

        let results =
            engine.search_with_strategy("make my phone last longer", 2, RetrievalStrategy::Hybrid).await.unwrap();
        assert_eq!(results[0].text, "how to extend smartphone battery life");
    }

    #[tokio::test]
    async fn empty_corpus_search_returns_empty_without_error() {
        let (engine, _clock, _random) = test_engine().await;
        let results = engine.search("anything", 5).await.unwrap();
        assert!(results.is_empty());
    }

    /// Invariant 5: after delete_document, no chunk from that document
    /// appears in search output.
    #[tokio::test]
    async fn delete_document_removes_its_chunks_from_search() {
        let (engine, _clock, _random) = test_engine().await;
        let doc = Uuid::new_v4();
        engine
            .index_chunks(doc, vec![input("how to extend smartphone battery life", 0)])
            .await
            .unwrap();
        engine.delete_document(doc).await.unwrap();

        let results = engine.search_with_strategy("battery", 5, RetrievalStrategy::SparseOnly).await.unwrap();
        assert!(results.is_empty());
    }

    /// Invariant 1: every chunk returned by search is retrievable from the
    /// repository with matching content.
    #[tokio::test]
    async fn searched_chunks_round_trip_through_the_repository() {
        let (engine, _clock, _random) = test_engine().await;
        let doc = Uuid::new_v4();
        engine.index_chunks(doc, vec![input("Battery lifetime optimization guide", 0)]).await.unwrap();

        let results = engine.search_with_strategy("battery", 5, RetrievalStrategy::SparseOnly).await.unwrap();
        assert_eq!(results.len(), 1);
        let stored = engine.repository.get(results[0].chunk_id).await.unwrap().unwrap();
        assert_eq!(stored.text, results[0].text);
    }

    struct FixedPassageCompletion(String);

    #[async_trait::async_trait]
    impl TextCompletionService for FixedPassageCompletion {
        async fn complete(&self, _prompt: &str) -> anyhow::Result<String> {
            Ok(self.0.clone())
        }
    }

    async fn test_engine_with_completion(passage: &str) -> RagEngine {
        let random = Arc::new(ScriptedRandom::new(vec![0.9, 0.8, 0.7, 0.6, 0.5]));
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(Utc::now()));
        let dimension_config = VectorStoreConfig { dimension: 2, ..Default::default() };
        let vector_store = VectorStore::new(
            Arc::new(MemoryVectorBackend::new()),
            dimension_config.clone(),
            random.as_ref(),
        )
        .await
        .unwrap();
        let sparse_index = SparseIndex::in_memory(SparseIndexConfig::default());
        let repository = ChunkRepository::new(Arc::new(MemoryRepositoryBackend::new()));
        // The fake completion below returns a fixed short passage that must
        // embed to the exact vector `vector_for` maps it to; a nonzero
        // quality floor would reject it purely for being short and fall back
        // to the literal query, defeating the point of this fixture.
        let transform = crate::config::TransformConfig { quality_threshold: 0.0 };
        let config = RagConfig { vector_store: dimension_config, transform, ..Default::default() };

        RagEngine::new(RagEngineParts {
            vector_store,
            sparse_index,
            repository,
            embedding_service: Arc::new(TestEmbeddingService),
            completion_service: Some(Arc::new(FixedPassageCompletion(passage.to_string()))),
            clock,
            random,
            config,
        })
    }

    /// Resolves the "union of SearchStrategy enumerations" open question:
    /// HyDE has a real executor (it embeds a generated passage instead of
    /// the raw query) while StepBack/SelfRag have none yet and must fail
    /// with a typed, non-retryable error rather than silently degrading.
    #[tokio::test]
    async fn hyde_strategy_embeds_the_generated_passage_not_the_query() {
        let engine = test_engine_with_completion("cooking recipes for pasta").await;
        let doc = Uuid::new_v4();
        engine
            .index_chunks(
                doc,
                vec![input("how to extend smartphone battery life", 0), input("cooking recipes for pasta", 1)],
            )
            .await
            .unwrap();

        // The literal query embeds toward "battery"; only the hypothetical
        // passage the fake completion service returns points at "pasta".
        let results = engine.search_with_strategy("unrelated query text", 2, RetrievalStrategy::HyDE).await.unwrap();
        assert_eq!(results[0].text, "cooking recipes for pasta");
    }

    #[tokio::test]
    async fn expand_query_without_completion_service_returns_literal_query() {
        let (engine, _clock, _random) = test_engine().await;
        let result = engine.expand_query("how does HNSW work").await;
        assert_eq!(result.expanded_queries, vec!["how does HNSW work"]);
    }

    #[tokio::test]
    async fn step_back_and_self_rag_strategies_are_unsupported() {
        let (engine, _clock, _random) = test_engine().await;
        let step_back = engine.search_with_strategy("anything", 1, RetrievalStrategy::StepBack).await;
        let self_rag = engine.search_with_strategy("anything", 1, RetrievalStrategy::SelfRag).await;
        assert!(matches!(step_back, Err(RagError::Input(_))));
        assert!(matches!(self_rag, Err(RagError::Input(_))));
    }
}
