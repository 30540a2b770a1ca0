//! Query Analyzer component: classifies a raw query into an intent and
//! recommends a retrieval strategy for the orchestrator to dispatch on.
//!
//! Classification rules are grounded in the teacher's
//! `rag/retrieval_decision.rs` (`QueryIntent`/`RetrievalStrategy` taxonomy and
//! its regex-based heuristics), generalized to the strategy set this crate
//! actually implements (`hybrid`, `small_to_big`, `transform`).

use std::sync::LazyLock;

use regex::Regex;

use crate::config::QueryAnalyzerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum QueryIntent {
    Factual,
    Conceptual,
    Procedural,
    Comparative,
    Exploratory,
    Navigational,
}

/// A 4-level ordinal per spec.md §4.5, derived from token count, clause
/// count, and entity count rather than a single signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub enum QueryComplexity {
    Simple,
    Moderate,
    Complex,
    VeryComplex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum RetrievalStrategy {
    /// Short, precise lookups — dense search alone is usually enough.
    VectorOnly,
    /// Keyword-heavy or code/identifier-bearing queries favor lexical match.
    SparseOnly,
    /// The default: fuse dense and sparse.
    Hybrid,
    /// Multi-part queries benefit from decomposition before fusion.
    DecomposeThenHybrid,
    /// Queries needing surrounding context expand via Small-to-Big after an
    /// initial hybrid pass.
    HybridThenExpand,
    /// Embed a generated hypothetical answer instead of the raw query —
    /// only reachable via an explicit caller override, never recommended
    /// automatically since it needs a completion service.
    HyDE,
    /// Reformulate toward a more general query before retrieving. No
    /// executor yet; dispatching this strategy returns an error.
    StepBack,
    /// Reflective retrieve-evaluate-requery loop. No executor yet;
    /// dispatching this strategy returns an error.
    SelfRag,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct QueryAnalysis {
    pub intent: QueryIntent,
    pub complexity: QueryComplexity,
    pub confidence: ConfidenceLevel,
    pub recommended_strategy: RetrievalStrategy,
    pub word_count: usize,
}

static QUESTION_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(what|who|when|where|which)\b").unwrap());
static PROCEDURAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(how to|steps to|guide|tutorial|walkthrough)\b").unwrap());
static COMPARATIVE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(vs\.?|versus|compared to|difference between|better than)\b").unwrap());
static EXPLORATORY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(why|explain|overview of|understand)\b").unwrap());
static NAVIGATIONAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(find|locate|go to|open|show me)\b").unwrap());
static CONJUNCTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\band\b|\balso\b|;").unwrap());
static ENUMERATED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(first|second|third|\d+\.)\b").unwrap());

pub struct QueryAnalyzer {
    config: QueryAnalyzerConfig,
}

impl QueryAnalyzer {
    pub fn new(config: QueryAnalyzerConfig) -> Self {
        Self { config }
    }

    pub fn analyze(&self, query: &str) -> QueryAnalysis {
        let word_count = query.split_whitespace().count();
        let (intent, base_confidence) = self.classify_intent(query);
        let complexity = self.classify_complexity(query, word_count);
        let confidence = if base_confidence < self.config.min_confidence {
            ConfidenceLevel::Low
        } else if base_confidence < 0.8 {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::High
        };

        let recommended_strategy = self.recommend_strategy(intent, complexity, confidence);

        QueryAnalysis { intent, complexity, confidence, recommended_strategy, word_count }
    }

    fn classify_intent(&self, query: &str) -> (QueryIntent, f32) {
        if PROCEDURAL.is_match(query) {
            return (QueryIntent::Procedural, 0.85);
        }
        if COMPARATIVE.is_match(query) {
            return (QueryIntent::Comparative, 0.85);
        }
        if NAVIGATIONAL.is_match(query) {
            return (QueryIntent::Navigational, 0.8);
        }
        if EXPLORATORY.is_match(query) {
            return (QueryIntent::Exploratory, 0.75);
        }
        if QUESTION_WORD.is_match(query) {
            return (QueryIntent::Factual, 0.7);
        }
        (QueryIntent::Conceptual, 0.5)
    }

    /// Derives the 4-level ordinal from three independent signals: token
    /// count, clause count (conjunctions/semicolons/enumerated markers), and
    /// a coarse entity count (capitalized-word runs). None of the three
    /// alone determines the level; each contributes one point toward it.
    fn classify_complexity(&self, query: &str, word_count: usize) -> QueryComplexity {
        let clause_count = CONJUNCTION.find_iter(query).count() + ENUMERATED.find_iter(query).count();
        let entity_count = count_capitalized_runs(query);

        let mut level = 0u8;
        if word_count > 8 {
            level += 1;
        }
        if word_count > 20 {
            level += 1;
        }
        if clause_count >= 1 {
            level += 1;
        }
        if clause_count >= 2 {
            level += 1;
        }
        if entity_count >= 2 {
            level += 1;
        }

        match level {
            0 => QueryComplexity::Simple,
            1 => QueryComplexity::Moderate,
            2 | 3 => QueryComplexity::Complex,
            _ => QueryComplexity::VeryComplex,
        }
    }

    /// Maps (intent, complexity, confidence) to a retrieval strategy. A
    /// `Low` confidence classification always falls back to plain `Hybrid`
    /// rather than trusting a shaky intent signal to pick something fancier.
    fn recommend_strategy(
        &self,
        intent: QueryIntent,
        complexity: QueryComplexity,
        confidence: ConfidenceLevel,
    ) -> RetrievalStrategy {
        if confidence == ConfidenceLevel::Low {
            tracing::trace!(?intent, ?complexity, "low classification confidence, falling back to plain hybrid");
            return RetrievalStrategy::Hybrid;
        }

        match complexity {
            QueryComplexity::VeryComplex | QueryComplexity::Complex => RetrievalStrategy::DecomposeThenHybrid,
            QueryComplexity::Moderate => match intent {
                QueryIntent::Comparative => RetrievalStrategy::DecomposeThenHybrid,
                _ => RetrievalStrategy::HybridThenExpand,
            },
            QueryComplexity::Simple => match intent {
                QueryIntent::Factual | QueryIntent::Navigational => RetrievalStrategy::VectorOnly,
                QueryIntent::Procedural | QueryIntent::Exploratory => RetrievalStrategy::HybridThenExpand,
                QueryIntent::Comparative => RetrievalStrategy::DecomposeThenHybrid,
                QueryIntent::Conceptual => RetrievalStrategy::Hybrid,
            },
        }
    }
}

/// Coarse named-entity-count proxy: counts maximal runs of capitalized
/// words, which is the cheapest local signal available without an LLM or
/// NER model (the Enricher's own entity extraction is the real thing; the
/// analyzer only needs a ballpark count to weigh complexity).
fn count_capitalized_runs(query: &str) -> usize {
    let mut runs = 0;
    let mut in_run = false;
    for word in query.split_whitespace() {
        let starts_upper = word.chars().next().is_some_and(|c| c.is_uppercase());
        if starts_upper {
            if !in_run {
                runs += 1;
                in_run = true;
            }
        } else {
            in_run = false;
        }
    }
    runs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer() -> QueryAnalyzer {
        QueryAnalyzer::new(QueryAnalyzerConfig::default())
    }

    #[test]
    fn procedural_query_is_classified_correctly() {
        let analysis = analyzer().analyze("how to configure the vector store");
        assert_eq!(analysis.intent, QueryIntent::Procedural);
    }

    #[test]
    fn comparative_query_prefers_decompose_then_hybrid() {
        let analysis = analyzer().analyze("HNSW versus IVF for approximate nearest neighbor search");
        assert_eq!(analysis.intent, QueryIntent::Comparative);
        assert_eq!(analysis.recommended_strategy, RetrievalStrategy::DecomposeThenHybrid);
    }

    #[test]
    fn enumerated_multi_clause_query_is_very_complex() {
        let analysis = analyzer().analyze("first explain BM25, second explain RRF, third explain HNSW");
        assert_eq!(analysis.complexity, QueryComplexity::VeryComplex);
    }

    #[test]
    fn short_query_is_simple() {
        let analysis = analyzer().analyze("battery life");
        assert_eq!(analysis.complexity, QueryComplexity::Simple);
    }

    #[test]
    fn vague_query_has_low_confidence_and_falls_back_to_hybrid() {
        let analysis = analyzer().analyze("stuff");
        assert_eq!(analysis.confidence, ConfidenceLevel::Low);
        assert_eq!(analysis.recommended_strategy, RetrievalStrategy::Hybrid);
    }
}
