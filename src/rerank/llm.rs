//! LLM-based reranking: ask a completion model to return the candidate order
//! that best answers the query.
//!
//! Adapted from the teacher's `reranking/llm_reranker.rs`: numbered-snippet
//! prompt, a bounded timeout, and a three-tier defensive parse of whatever
//! comes back — direct JSON array, a `[...]` substring inside prose, or a
//! last-resort scan for bare integers. Any parse failure or timeout fails
//! open to the original order, exactly like the teacher's reranker.

use std::time::Duration;

use uuid::Uuid;

use crate::adapters::TextCompletionService;

pub async fn llm_rerank(
    completion: &dyn TextCompletionService,
    query: &str,
    candidates: &[(Uuid, String)],
    timeout_ms: u64,
) -> Vec<Uuid> {
    let original_order: Vec<Uuid> = candidates.iter().map(|(id, _)| *id).collect();
    if candidates.is_empty() {
        return original_order;
    }

    let prompt = build_prompt(query, candidates);
    let timeout = Duration::from_millis(timeout_ms);

    let raw = match tokio::time::timeout(timeout, completion.complete(&prompt)).await {
        Ok(Ok(text)) => text,
        _ => return original_order,
    };

    match parse_ranking(&raw, candidates.len()) {
        Some(order) => order.into_iter().map(|i| candidates[i].0).collect(),
        None => original_order,
    }
}

fn build_prompt(query: &str, candidates: &[(Uuid, String)]) -> String {
    let mut prompt = format!(
        "Rank the following passages by relevance to the query: \"{query}\".\n\
         Respond with ONLY a JSON array of 0-based indices, most relevant first.\n\n"
    );
    for (i, (_, text)) in candidates.iter().enumerate() {
        prompt.push_str(&format!("[{i}] {text}\n"));
    }
    prompt
}

/// Three-tier parse, most to least strict. `expected_len` bounds and
/// de-duplicates the result so a malformed or partial response can't produce
/// an out-of-range or repeated index.
fn parse_ranking(raw: &str, expected_len: usize) -> Option<Vec<usize>> {
    let direct: Option<Vec<usize>> = serde_json::from_str(raw.trim()).ok();
    let from_substring = direct.or_else(|| {
        let start = raw.find('[')?;
        let end = raw.rfind(']')?;
        if end <= start {
            return None;
        }
        serde_json::from_str(&raw[start..=end]).ok()
    });
    let candidate = from_substring.or_else(|| {
        let numbers: Vec<usize> = raw
            .split(|c: char| !c.is_ascii_digit())
            .filter(|s| !s.is_empty())
            .filter_map(|s| s.parse().ok())
            .collect();
        if numbers.is_empty() {
            None
        } else {
            Some(numbers)
        }
    })?;

    let mut seen = std::collections::HashSet::new();
    let mut cleaned: Vec<usize> = candidate.into_iter().filter(|i| *i < expected_len && seen.insert(*i)).collect();
    for i in 0..expected_len {
        if seen.insert(i) {
            cleaned.push(i);
        }
    }
    Some(cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct JsonCompletion(&'static str);
    #[async_trait::async_trait]
    impl TextCompletionService for JsonCompletion {
        async fn complete(&self, _prompt: &str) -> anyhow::Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct FailingCompletion;
    #[async_trait::async_trait]
    impl TextCompletionService for FailingCompletion {
        async fn complete(&self, _prompt: &str) -> anyhow::Result<String> {
            Err(anyhow::anyhow!("down"))
        }
    }

    struct HangingCompletion;
    #[async_trait::async_trait]
    impl TextCompletionService for HangingCompletion {
        async fn complete(&self, _prompt: &str) -> anyhow::Result<String> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok("[0]".to_string())
        }
    }

    fn candidates(n: usize) -> Vec<(Uuid, String)> {
        (0..n).map(|i| (Uuid::new_v4(), format!("passage {i}"))).collect()
    }

    #[tokio::test]
    async fn direct_json_array_reorders_candidates() {
        let candidates = candidates(3);
        let expected_second = candidates[1].0;
        let result = llm_rerank(&JsonCompletion("[1, 0, 2]"), "q", &candidates, 1_000).await;
        assert_eq!(result[0], expected_second);
    }

    #[tokio::test]
    async fn json_embedded_in_prose_is_extracted() {
        let candidates = candidates(2);
        let expected_first = candidates[1].0;
        let result = llm_rerank(&JsonCompletion("Sure, here you go: [1, 0] is the order."), "q", &candidates, 1_000).await;
        assert_eq!(result[0], expected_first);
    }

    #[tokio::test]
    async fn completion_failure_fails_open_to_original_order() {
        let candidates = candidates(3);
        let original: Vec<Uuid> = candidates.iter().map(|(id, _)| *id).collect();
        let result = llm_rerank(&FailingCompletion, "q", &candidates, 1_000).await;
        assert_eq!(result, original);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_fails_open_to_original_order() {
        let candidates = candidates(2);
        let original: Vec<Uuid> = candidates.iter().map(|(id, _)| *id).collect();
        let result = llm_rerank(&HangingCompletion, "q", &candidates, 50).await;
        assert_eq!(result, original);
    }
}
