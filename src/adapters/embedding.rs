use async_trait::async_trait;

use crate::types::Embedding;

/// External embedding provider. Grounded in the teacher's `EmbeddingModel`
/// trait (`embeddings/mod.rs`), generalized to batch-first since every caller
/// in this crate embeds chunks or queries in groups.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    /// Embed a batch of texts, preserving input order. Implementations that
    /// call out to a provider should chunk internally if the provider has a
    /// smaller max-batch size than `texts.len()`.
    async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Embedding>>;

    async fn embed_one(&self, text: &str) -> anyhow::Result<Embedding> {
        let mut result = self.embed_batch(std::slice::from_ref(&text.to_string())).await?;
        result
            .pop()
            .ok_or_else(|| anyhow::anyhow!("embedding provider returned no vectors for 1 input"))
    }

    /// Output dimensionality, used to validate against `VectorStoreConfig`
    /// before any vectors are written.
    fn dimension(&self) -> usize;

    /// Identifies which model produced the embedding, for metadata/logging.
    /// Defaults to `"unknown"` for providers that don't report one.
    fn model_name(&self) -> &str {
        "unknown"
    }

    /// Maximum input tokens the provider accepts per text. Defaults to a
    /// conservative figure typical of current embedding models; providers
    /// with a smaller or larger limit should override.
    fn max_tokens(&self) -> usize {
        8192
    }

    /// Rough token estimate used to check a text against `max_tokens` before
    /// a call, since exact tokenization is provider-specific.
    fn count_tokens(&self, text: &str) -> usize {
        (text.split_whitespace().count() as f32 * 1.3) as usize
    }
}
