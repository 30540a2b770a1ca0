//! Adaptive Search Orchestrator: the public entry point callers should use
//! instead of calling `RagEngine::search` directly when they want per-strategy
//! metrics and A/B shadow testing.
//!
//! The metrics map is grounded in the teacher's `agent::monitor::AgentMonitor`
//! (`Arc<DashMap<..>>` for fine-grained per-key locking instead of one big
//! `Mutex<HashMap<..>>`). Shadow A/B runs use a stable hash of the normalized
//! query the same way a consistent-hashing router would, so the same query
//! always lands on the same side of the sample rate within a given config.

use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;

use crate::analyzer::{QueryAnalysis, QueryIntent, RetrievalStrategy};
use crate::config::AbTestConfig;
use crate::engine::{RagEngine, SearchResult};
use crate::error::RagResult;

#[derive(Debug, Clone, Copy, Default)]
pub struct StrategyMetrics {
    pub requests: u64,
    pub errors: u64,
    pub total_latency_ms: u64,
    /// Weighted-mean user satisfaction in `[0, 1]`, updated by
    /// `update_feedback`. `None` until the first feedback arrives.
    pub average_satisfaction: Option<f32>,
    feedback_count: u64,
}

impl StrategyMetrics {
    pub fn average_latency_ms(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            self.total_latency_ms as f64 / self.requests as f64
        }
    }

    /// Folds a new satisfaction sample into the running weighted mean,
    /// giving later feedback more say as the sample count grows (so one
    /// early bad rating doesn't stick around forever) while still damping
    /// single-sample swings.
    fn record_satisfaction(&mut self, satisfaction: f32) {
        self.feedback_count += 1;
        let weight = 1.0 / self.feedback_count as f32;
        let satisfaction = satisfaction.clamp(0.0, 1.0);
        self.average_satisfaction = Some(match self.average_satisfaction {
            Some(prev) => prev + weight * (satisfaction - prev),
            None => satisfaction,
        });
    }
}

#[derive(Debug, Clone)]
pub struct StrategyPerformanceReport {
    pub per_strategy: Vec<(RetrievalStrategy, StrategyMetrics)>,
    pub preferred_by_query_type: Vec<(QueryIntent, RetrievalStrategy)>,
}

pub struct AdaptiveOrchestrator {
    engine: Arc<RagEngine>,
    ab_test: AbTestConfig,
    metrics: DashMap<RetrievalStrategy, StrategyMetrics>,
    /// Per-query-type preferred strategy, consulted before the analyzer's
    /// own recommendation per spec.md §4.10 step 3. Empty until feedback
    /// has accumulated enough to recompute a preference.
    preferences: DashMap<QueryIntent, RetrievalStrategy>,
}

impl AdaptiveOrchestrator {
    pub fn new(engine: Arc<RagEngine>, ab_test: AbTestConfig) -> Self {
        Self { engine, ab_test, metrics: DashMap::new(), preferences: DashMap::new() }
    }

    /// Runs the primary search. Strategy selection order: `force_strategy`
    /// overrides everything; otherwise a per-query-type preference learned
    /// from feedback overrides the analyzer; otherwise the analyzer's own
    /// recommendation stands. Records latency/error metrics keyed by
    /// whichever strategy actually ran, and — when A/B testing is enabled
    /// and this query samples into the test — spawns a non-blocking shadow
    /// run under `ab_test.shadow_strategy` purely for metrics comparison.
    pub async fn search(&self, query: &str, k: usize, force_strategy: Option<RetrievalStrategy>) -> RagResult<Vec<SearchResult>> {
        let mut analysis = self.engine.analyze(query);
        let preferred = force_strategy.or_else(|| self.preferences.get(&analysis.intent).map(|e| *e));
        if let Some(strategy) = preferred {
            analysis.recommended_strategy = strategy;
        }
        self.maybe_spawn_shadow(query, k, &analysis);

        let start = Instant::now();
        let result = self.engine.search_preferring(query, k, preferred).await;
        self.record(analysis.recommended_strategy, start.elapsed(), result.is_err());
        result
    }

    fn maybe_spawn_shadow(&self, query: &str, k: usize, analysis: &QueryAnalysis) {
        let Some(shadow_strategy) = self.ab_test.shadow_strategy else { return };
        if !self.ab_test.enabled || shadow_strategy == analysis.recommended_strategy {
            return;
        }
        if !samples_into_test(query, self.ab_test.sample_rate) {
            return;
        }

        let engine = self.engine.clone();
        let query = query.to_string();
        tokio::spawn(async move {
            let _ = engine.search_with_strategy(&query, k, shadow_strategy).await;
        });
    }

    fn record(&self, strategy: RetrievalStrategy, elapsed: std::time::Duration, errored: bool) {
        let mut entry = self.metrics.entry(strategy).or_default();
        entry.requests += 1;
        entry.total_latency_ms += elapsed.as_millis() as u64;
        if errored {
            entry.errors += 1;
        }
    }

    pub fn metrics_snapshot(&self) -> Vec<(RetrievalStrategy, StrategyMetrics)> {
        self.metrics.iter().map(|entry| (*entry.key(), *entry.value())).collect()
    }

    pub async fn record_feedback(&self, chunk_id: uuid::Uuid, clicked: bool, rating: Option<f32>) -> RagResult<()> {
        self.engine.record_feedback(chunk_id, clicked, rating).await
    }

    /// Updates per-strategy satisfaction from explicit query-level feedback,
    /// then recomputes `query_type`'s preferred strategy as whichever
    /// strategy currently has the best `(avg_satisfaction, -avg_latency)`
    /// pair among strategies with at least one feedback sample, per
    /// spec.md §4.10's feedback loop.
    pub fn update_feedback(&self, query_type: QueryIntent, strategy: RetrievalStrategy, satisfaction: f32) {
        self.metrics.entry(strategy).or_default().record_satisfaction(satisfaction);
        self.recompute_preference(query_type);
    }

    fn recompute_preference(&self, query_type: QueryIntent) {
        let best = self
            .metrics
            .iter()
            .filter(|entry| entry.value().average_satisfaction.is_some())
            .max_by(|a, b| {
                let a = a.value();
                let b = b.value();
                a.average_satisfaction
                    .unwrap()
                    .partial_cmp(&b.average_satisfaction.unwrap())
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| b.average_latency_ms().partial_cmp(&a.average_latency_ms()).unwrap_or(std::cmp::Ordering::Equal))
            })
            .map(|entry| *entry.key());

        if let Some(strategy) = best {
            tracing::debug!(?query_type, ?strategy, "recomputed preferred strategy from feedback");
            self.preferences.insert(query_type, strategy);
        }
    }

    pub fn performance_report(&self) -> StrategyPerformanceReport {
        StrategyPerformanceReport {
            per_strategy: self.metrics_snapshot(),
            preferred_by_query_type: self.preferences.iter().map(|e| (*e.key(), *e.value())).collect(),
        }
    }
}

/// Deterministic per-query sampling: the same normalized query always falls
/// on the same side of `sample_rate`, so shadow metrics for a given query
/// don't flicker between runs.
fn samples_into_test(query: &str, sample_rate: f32) -> bool {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    query.trim().to_lowercase().hash(&mut hasher);
    let bucket = (hasher.finish() % 10_000) as f32 / 10_000.0;
    bucket < sample_rate
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sampling_is_deterministic_for_same_query() {
        let a = samples_into_test("what is hybrid search", 0.5);
        let b = samples_into_test("what is hybrid search", 0.5);
        assert_eq!(a, b);
    }

    #[test]
    fn zero_sample_rate_never_samples() {
        assert!(!samples_into_test("anything", 0.0));
    }

    #[test]
    fn full_sample_rate_always_samples() {
        assert!(samples_into_test("anything", 1.0));
    }

    use crate::adapters::clock::test_support::{FixedClock, ScriptedRandom};
    use crate::adapters::{Clock, EmbeddingService};
    use crate::config::{RagConfig, VectorStoreConfig};
    use crate::engine::RagEngineParts;
    use crate::repository::memory_backend::MemoryRepositoryBackend;
    use crate::repository::ChunkRepository;
    use crate::sparse_index::SparseIndex;
    use crate::types::Embedding;
    use crate::vector_store::memory_backend::MemoryVectorBackend;
    use crate::vector_store::VectorStore;

    struct FlatEmbeddingService;

    #[async_trait::async_trait]
    impl EmbeddingService for FlatEmbeddingService {
        async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Embedding>> {
            Ok(texts.iter().map(|_| Embedding::new(vec![1.0, 0.0])).collect())
        }
        fn dimension(&self) -> usize {
            2
        }
    }

    async fn test_orchestrator() -> AdaptiveOrchestrator {
        let random = Arc::new(ScriptedRandom::new(vec![0.9, 0.8, 0.7]));
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(chrono::Utc::now()));
        let dimension_config = VectorStoreConfig { dimension: 2, ..Default::default() };
        let vector_store =
            VectorStore::new(Arc::new(MemoryVectorBackend::new()), dimension_config.clone(), random.as_ref())
                .await
                .unwrap();
        let engine = RagEngine::new(RagEngineParts {
            vector_store,
            sparse_index: SparseIndex::in_memory(Default::default()),
            repository: ChunkRepository::new(Arc::new(MemoryRepositoryBackend::new())),
            embedding_service: Arc::new(FlatEmbeddingService),
            completion_service: None,
            clock,
            random,
            config: RagConfig { vector_store: dimension_config, ..Default::default() },
        });
        AdaptiveOrchestrator::new(Arc::new(engine), AbTestConfig::default())
    }

    #[tokio::test]
    async fn feedback_recomputes_preferred_strategy_by_query_type() {
        let orchestrator = test_orchestrator().await;
        orchestrator.update_feedback(QueryIntent::Factual, RetrievalStrategy::VectorOnly, 0.9);
        orchestrator.update_feedback(QueryIntent::Factual, RetrievalStrategy::Hybrid, 0.3);

        let report = orchestrator.performance_report();
        assert_eq!(
            report.preferred_by_query_type.iter().find(|(t, _)| *t == QueryIntent::Factual).map(|(_, s)| *s),
            Some(RetrievalStrategy::VectorOnly)
        );
    }

    #[tokio::test]
    async fn search_consults_preference_table_before_analyzer_recommendation() {
        let orchestrator = test_orchestrator().await;
        // "battery" alone classifies as Conceptual with low confidence,
        // which the analyzer would send to Hybrid; force a learned
        // preference for SparseOnly and confirm it wins instead.
        orchestrator.update_feedback(QueryIntent::Conceptual, RetrievalStrategy::SparseOnly, 1.0);
        let results = orchestrator.search("battery", 5, None).await.unwrap();
        assert!(results.is_empty());
        let snapshot = orchestrator.metrics_snapshot();
        assert!(snapshot.iter().any(|(s, m)| *s == RetrievalStrategy::SparseOnly && m.requests >= 1));
    }
}
