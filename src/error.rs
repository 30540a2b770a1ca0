//! Error taxonomy shared by every component.
//!
//! Variants map directly onto spec.md §7: `Input` and `Consistency` are fatal,
//! `Capacity` and `Transient` are retryable, `Quality` is absorbed locally by
//! the component that raised it and should rarely escape to a caller.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RagError {
    /// Malformed or semantically invalid caller input. Never retryable.
    #[error("invalid input: {0}")]
    Input(String),

    /// A resource limit was hit (queue full, store at capacity). Retryable
    /// after backoff; callers should treat this as backpressure, not failure.
    #[error("capacity exceeded: {0}")]
    Capacity(String),

    /// A dependency (embedding provider, LLM, backend store) failed in a way
    /// that is expected to be transient. Bounded retry is appropriate.
    #[error("transient failure: {0}")]
    Transient(String),

    /// Cross-store invariant violated (vector store and repository disagree
    /// about what exists). Fatal to the operation; triggers compensation.
    #[error("consistency violation: {0}")]
    Consistency(String),

    /// A quality gate failed (reranker produced nothing usable, enrichment
    /// degraded below threshold). Callers may proceed with degraded output.
    #[error("quality degraded: {0}")]
    Quality(String),
}

impl RagError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, RagError::Capacity(_) | RagError::Transient(_))
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, RagError::Input(_) | RagError::Consistency(_))
    }

    pub fn input(msg: impl Into<String>) -> Self {
        RagError::Input(msg.into())
    }

    pub fn capacity(msg: impl Into<String>) -> Self {
        RagError::Capacity(msg.into())
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        RagError::Transient(msg.into())
    }

    pub fn consistency(msg: impl Into<String>) -> Self {
        RagError::Consistency(msg.into())
    }

    pub fn quality(msg: impl Into<String>) -> Self {
        RagError::Quality(msg.into())
    }
}

/// Adapter failures (embedding providers, LLM completion, external stores) are
/// almost always transient from the core's point of view — the provider owns
/// the distinction between "down" and "misconfigured", we just back off.
impl From<anyhow::Error> for RagError {
    fn from(err: anyhow::Error) -> Self {
        RagError::Transient(err.to_string())
    }
}

pub type RagResult<T> = std::result::Result<T, RagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_and_transient_are_retryable() {
        assert!(RagError::capacity("full").is_retryable());
        assert!(RagError::transient("timeout").is_retryable());
        assert!(!RagError::input("bad").is_retryable());
    }

    #[test]
    fn input_and_consistency_are_fatal() {
        assert!(RagError::input("bad").is_fatal());
        assert!(RagError::consistency("mismatch").is_fatal());
        assert!(!RagError::quality("low").is_fatal());
    }
}
