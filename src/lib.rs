//! Core retrieval engine for hybrid dense+sparse RAG indexing.
//!
//! A single library crate with a flat module tree, one module per component
//! named in the design: chunk storage and its relationship graph
//! (`repository`), dense (`vector_store`) and lexical (`sparse_index`)
//! retrieval fused by `hybrid`, context expansion (`small_to_big`),
//! reranking (`rerank`), a similarity-keyed result cache (`cache`), query
//! understanding (`analyzer`, `transform`), derived metadata (`enrichment`),
//! ANN parameter tuning (`tuner`), and the `engine`/`orchestrator` facades
//! that tie everything together.

pub mod adapters;
pub mod analyzer;
pub mod cache;
pub mod config;
pub mod engine;
pub mod enrichment;
pub mod error;
pub mod hybrid;
pub mod orchestrator;
pub mod rerank;
pub mod repository;
pub mod small_to_big;
pub mod sparse_index;
pub mod transform;
pub mod tuner;
pub mod types;
pub mod vector_store;

pub use adapters::{CacheBackend, Clock, DocumentRepositoryBackend, EmbeddingService, Random, SystemClock, TextCompletionService, ThreadRandom, VectorStoreBackend};
pub use config::RagConfig;
pub use engine::{EngineStatistics, RagEngine, RagEngineParts, SearchResult};
pub use error::{RagError, RagResult};
pub use orchestrator::{AdaptiveOrchestrator, StrategyPerformanceReport};
pub use transform::{HyDEResult, IntentResult, QuoteResult};
pub use types::{
    CacheResult, Chunk, ChunkIngestInput, ChunkMetadata, ChunkQuality, ChunkRelationship, Document,
    Embedding, RelationshipType,
};

pub use uuid::Uuid;
