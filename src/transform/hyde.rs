//! HyDE (Hypothetical Document Embeddings): ask the completion service to
//! write a plausible answer passage, then embed that passage instead of the
//! raw query. Useful for short queries whose embedding otherwise sits far
//! from the answer chunks' embeddings in vector space.
//!
//! Fails open to the original query text, matching the fail-open pattern the
//! teacher uses for `reranking/llm_reranker.rs`: an LLM outage degrades
//! retrieval quality, it never blocks it. Per spec.md §4.6, a generated
//! passage also fails open when its quality score doesn't clear a
//! configurable floor, not just on a hard provider error.

use std::time::Duration;

use crate::adapters::TextCompletionService;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Outcome of a HyDE generation attempt, mirroring spec.md §4.6's
/// `HyDEResult` contract.
#[derive(Debug, Clone)]
pub struct HyDEResult {
    pub hypothetical_document: String,
    /// `[0, 1]`; see `score_quality` for how it's derived.
    pub quality_score: f32,
    pub tokens_used: usize,
    pub generation_ms: u64,
}

impl HyDEResult {
    /// The no-op result used when generation fails or the caller falls back
    /// to the literal query: quality 0, no tokens spent.
    fn fallback(query: &str) -> Self {
        Self { hypothetical_document: query.to_string(), quality_score: 0.0, tokens_used: 0, generation_ms: 0 }
    }
}

/// A plausible answer passage scores well when it's substantive and not just
/// an echo of the query itself; length alone is a weak proxy for "answers the
/// question" but it's the only signal available without a second LLM call.
fn score_quality(query: &str, passage: &str) -> f32 {
    let trimmed = passage.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(query.trim()) {
        return 0.0;
    }
    let word_count = trimmed.split_whitespace().count() as f32;
    (word_count / 25.0).min(1.0)
}

/// Generates a hypothetical answer passage and embeds it in place of the
/// query, provided it clears `quality_threshold` (spec.md §4.6). On timeout,
/// provider error, or a sub-threshold passage, falls back to the literal
/// query with `quality_score: 0.0`.
pub async fn generate_hypothetical_document(
    query: &str,
    completion: &dyn TextCompletionService,
    quality_threshold: f32,
) -> HyDEResult {
    let prompt = format!(
        "Write a short, factual passage that directly answers this question. \
         Do not mention the question itself. Question: {query}"
    );

    let started = std::time::Instant::now();
    let passage = match tokio::time::timeout(DEFAULT_TIMEOUT, completion.complete(&prompt)).await {
        Ok(Ok(passage)) if !passage.trim().is_empty() => passage,
        _ => return HyDEResult::fallback(query),
    };
    let generation_ms = started.elapsed().as_millis() as u64;

    let quality_score = score_quality(query, &passage);
    if quality_score < quality_threshold {
        return HyDEResult::fallback(query);
    }

    let tokens_used = completion.count_tokens(&prompt) + completion.count_tokens(&passage);
    HyDEResult { hypothetical_document: passage, quality_score, tokens_used, generation_ms }
}
