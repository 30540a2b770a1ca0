//! QuOTE (Question-Oriented Transformation/Expansion): ask the completion
//! service for alternate phrasings and related questions of the query, used
//! to widen recall before fusion the same way HyDE narrows it toward a
//! hypothetical answer.
//!
//! Same fail-open shape as `hyde`: a bounded timeout, a defensive JSON parse,
//! and a quality floor (spec.md §4.6) below which the result falls back to
//! the literal query with no expansions rather than blocking retrieval.

use std::collections::HashMap;
use std::time::Duration;

use crate::adapters::completion::extract_json_object;
use crate::adapters::TextCompletionService;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct QuoteResult {
    pub expanded_queries: Vec<String>,
    pub related_questions: Vec<String>,
    /// Per-expansion weight in `[0, 1]`; unweighted phrasings default to 1.0.
    pub query_weights: HashMap<String, f32>,
    /// `[0, 1]`; see `score_quality` for how it's derived.
    pub quality_score: f32,
}

impl QuoteResult {
    /// A no-op expansion: just the original query at full weight. Used when
    /// no completion service is configured, generation fails, or a generated
    /// expansion doesn't clear the quality floor.
    pub fn literal(query: &str) -> Self {
        let mut query_weights = HashMap::new();
        query_weights.insert(query.to_string(), 1.0);
        Self {
            expanded_queries: vec![query.to_string()],
            related_questions: Vec::new(),
            query_weights,
            quality_score: 0.0,
        }
    }
}

/// More expansions and related questions signal a more useful widening of
/// the query; caps at a target of 3 of each, matching what the prompt asks
/// the provider to produce.
fn score_quality(expanded_queries: &[String], related_questions: &[String]) -> f32 {
    let total = (expanded_queries.len() + related_questions.len()) as f32;
    (total / 6.0).min(1.0)
}

pub async fn expand_query(
    query: &str,
    completion: &dyn TextCompletionService,
    quality_threshold: f32,
) -> QuoteResult {
    let prompt = format!(
        "Given the search query \"{query}\", produce JSON of the form \
         {{\"expanded_queries\": [...up to 3 alternate phrasings...], \
         \"related_questions\": [...up to 3 related questions a user might also ask...]}}. \
         Respond with ONLY the JSON object."
    );

    let raw = match tokio::time::timeout(DEFAULT_TIMEOUT, completion.complete(&prompt)).await {
        Ok(Ok(text)) => text,
        _ => return QuoteResult::literal(query),
    };

    match parse_quote(&raw, query) {
        Some(result) if result.quality_score >= quality_threshold => result,
        _ => QuoteResult::literal(query),
    }
}

fn parse_quote(raw: &str, original: &str) -> Option<QuoteResult> {
    let value: serde_json::Value =
        serde_json::from_str(raw.trim()).ok().or_else(|| extract_json_object(raw).ok())?;

    let expanded_queries: Vec<String> = value
        .get("expanded_queries")
        .and_then(|v| v.as_array())
        .map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect())
        .unwrap_or_default();
    let related_questions: Vec<String> = value
        .get("related_questions")
        .and_then(|v| v.as_array())
        .map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect())
        .unwrap_or_default();

    if expanded_queries.is_empty() {
        return None;
    }

    let mut query_weights = HashMap::new();
    query_weights.insert(original.to_string(), 1.0);
    for (rank, q) in expanded_queries.iter().enumerate() {
        query_weights.insert(q.clone(), 1.0 - (rank as f32 * 0.15).min(0.6));
    }

    let quality_score = score_quality(&expanded_queries, &related_questions);
    Some(QuoteResult { expanded_queries, related_questions, query_weights, quality_score })
}
