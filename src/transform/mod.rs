//! Query Transformer component: rewrites a raw query into one or more forms
//! better suited to retrieval — decomposition for compound queries, HyDE for
//! short under-specified ones.

pub mod decompose;
pub mod hyde;
pub mod intent;
pub mod quote;

use crate::adapters::TextCompletionService;
use crate::config::TransformConfig;

pub use decompose::{decompose_query, merge_results, DecomposedQuery, DecompositionStrategy};
pub use hyde::HyDEResult;
pub use intent::IntentResult;
pub use quote::QuoteResult;

pub struct QueryTransformer {
    config: TransformConfig,
}

impl QueryTransformer {
    pub fn new(config: TransformConfig) -> Self {
        Self { config }
    }

    pub fn decompose(&self, query: &str) -> DecomposedQuery {
        decompose_query(query)
    }

    pub async fn hyde(&self, query: &str, completion: &dyn TextCompletionService) -> HyDEResult {
        hyde::generate_hypothetical_document(query, completion, self.config.quality_threshold).await
    }

    pub async fn quote(&self, query: &str, completion: &dyn TextCompletionService) -> QuoteResult {
        quote::expand_query(query, completion, self.config.quality_threshold).await
    }

    /// Spec.md §4.6's `intent()` contract operation: a ranked, multi-label
    /// read on the query's intent plus a coarse domain guess, distinct from
    /// the single-label classification `QueryAnalyzer::analyze` uses to pick
    /// a retrieval strategy.
    pub fn intent(&self, query: &str) -> IntentResult {
        intent::classify_intent(query)
    }
}

impl Default for QueryTransformer {
    fn default() -> Self {
        Self { config: TransformConfig::default() }
    }
}
