use async_trait::async_trait;

/// Optional generation parameters for `complete_with_options`. Providers that
/// ignore one or both (the default impl below) just fall back to `complete`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompletionOptions {
    pub max_tokens: Option<usize>,
    pub temperature: Option<f32>,
}

/// External text-completion provider, used by LLM-backed reranking and query
/// transforms (HyDE, decomposition confirmation). Grounded in the teacher's
/// `reranking/llm_reranker.rs` caller shape: a single prompt in, a single
/// completion out, with timeout/fail-open handled by the caller, not here.
#[async_trait]
pub trait TextCompletionService: Send + Sync {
    async fn complete(&self, prompt: &str) -> anyhow::Result<String>;

    /// `complete` with an explicit token budget/temperature, where the
    /// underlying provider supports them. Defaults to ignoring both and
    /// falling back to `complete`.
    async fn complete_with_options(
        &self,
        prompt: &str,
        _options: CompletionOptions,
    ) -> anyhow::Result<String> {
        self.complete(prompt).await
    }

    /// Calls `complete`, then parses the response as JSON, tolerating a
    /// response wrapped in prose (falls back to the first `{...}` span) the
    /// way LLM completions often come back.
    async fn complete_json(&self, prompt: &str) -> anyhow::Result<serde_json::Value> {
        let raw = self.complete(prompt).await?;
        serde_json::from_str(&raw).or_else(|_| extract_json_object(&raw))
    }

    /// Rough token estimate used for budgeting when the provider doesn't
    /// expose an exact tokenizer.
    fn count_tokens(&self, text: &str) -> usize {
        (text.split_whitespace().count() as f32 * 1.3) as usize
    }
}

/// Finds and parses the first `{...}` span in `raw`, for providers that wrap
/// JSON in surrounding prose despite being asked for JSON alone.
pub(crate) fn extract_json_object(raw: &str) -> anyhow::Result<serde_json::Value> {
    let start = raw.find('{').ok_or_else(|| anyhow::anyhow!("no JSON object found"))?;
    let end = raw.rfind('}').ok_or_else(|| anyhow::anyhow!("no JSON object found"))?;
    if end <= start {
        return Err(anyhow::anyhow!("malformed JSON object bounds"));
    }
    Ok(serde_json::from_str(&raw[start..=end])?)
}
